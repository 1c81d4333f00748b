//! Presents one torrent's file list as a tree: blocks once on the handle's
//! "got-info" signal, builds a flattened `{vpath -> file index}` map with
//! exclusion and padding already applied, and serves reads through
//! deadline-bounded calls into the [`TorrentHandle`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::engine::{TorrentFileInfo, TorrentHandle, TorrentSummary};
use crate::error::{VfsError, VfsResult};
use crate::meta::MetaRepository;
use crate::storage::PieceStorage;
use crate::vfs::{File, FileInfo, Filesystem, VPath};

struct FileMap {
    entries: HashMap<String, usize>,
}

pub struct TorrentFs {
    handle: Arc<dyn TorrentHandle>,
    repository: Arc<MetaRepository>,
    storage: Arc<PieceStorage>,
    deadline: Duration,
    map: Mutex<Option<FileMap>>,
}

impl TorrentFs {
    pub fn new(
        handle: Arc<dyn TorrentHandle>,
        repository: Arc<MetaRepository>,
        storage: Arc<PieceStorage>,
        deadline: Duration,
    ) -> Self {
        Self {
            handle,
            repository,
            storage,
            deadline,
            map: Mutex::new(None),
        }
    }

    /// Builds the file map on first call, with padding stripped and the
    /// torrent name prefix flattened off. The map itself is never rebuilt
    /// or mutated afterwards; a later exclusion is not retroactively
    /// removed from it. Instead, every lookup re-checks the Meta
    /// Repository's exclusion set on each call, so `unlink` is visible
    /// immediately without needing to rebuild the (possibly expensive)
    /// file map.
    fn ensure_map(&self) -> VfsResult<()> {
        let mut guard = self.map.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        let files = self.handle.files()?;
        let flatten_prefix = format!("{}/", self.handle.display_name());

        let mut entries = HashMap::new();
        for (idx, f) in files.iter().enumerate() {
            if f.path.contains("/.pad/") || f.path.starts_with(".pad/") {
                continue;
            }
            let flattened = f.path.strip_prefix(&flatten_prefix).unwrap_or(&f.path);
            entries.insert(flattened.to_string(), idx);
        }
        *guard = Some(FileMap { entries });
        Ok(())
    }

    /// The file's raw path as it appears in `handle.files()`, needed to
    /// check exclusion against both the flattened and unflattened forms.
    fn raw_path_for(&self, idx: usize, files: &[TorrentFileInfo]) -> String {
        files.get(idx).map(|f| f.path.clone()).unwrap_or_default()
    }
}

impl Filesystem for TorrentFs {
    fn open(&self, path: &VPath) -> VfsResult<Box<dyn File>> {
        self.ensure_map()?;
        let guard = self.map.lock().unwrap();
        let map = guard.as_ref().unwrap();
        let key = path.as_str().trim_start_matches('/');
        let excluded = self.repository.excluded(&self.handle.info_hash())?;
        if let Some(&idx) = map.entries.get(key) {
            let files = self.handle.files()?;
            if excluded.contains(key) || excluded.contains(&self.raw_path_for(idx, &files)) {
                return Err(VfsError::not_exist(path.as_str()));
            }
            let info = files
                .get(idx)
                .cloned()
                .ok_or_else(|| VfsError::backend(path.as_str(), "torrent.files", "index out of range"))?;
            let torrent_offset: u64 = files[..idx].iter().map(|f| f.length).sum();
            return Ok(Box::new(TorrentFile::new(
                Arc::clone(&self.handle),
                info,
                torrent_offset,
                self.deadline,
            )));
        }
        if path.is_root() {
            return Ok(Box::new(DirHandle));
        }
        let prefix = format!("{key}/");
        if map
            .entries
            .keys()
            .any(|k| k.starts_with(&prefix) && !excluded.contains(k.as_str()))
        {
            return Ok(Box::new(DirHandle));
        }
        Err(VfsError::not_exist(path.as_str()))
    }

    fn stat(&self, path: &VPath) -> VfsResult<FileInfo> {
        self.ensure_map()?;
        let guard = self.map.lock().unwrap();
        let map = guard.as_ref().unwrap();
        let key = path.as_str().trim_start_matches('/');
        let excluded = self.repository.excluded(&self.handle.info_hash())?;
        if let Some(&idx) = map.entries.get(key) {
            let files = self.handle.files()?;
            if excluded.contains(key) || excluded.contains(&self.raw_path_for(idx, &files)) {
                return Err(VfsError::not_exist(path.as_str()));
            }
            let length = files.get(idx).map(|f| f.length).unwrap_or(0);
            return Ok(FileInfo::new_file(path.name(), length));
        }
        if path.is_root() {
            return Ok(FileInfo::new_dir("/"));
        }
        let prefix = format!("{key}/");
        if map
            .entries
            .keys()
            .any(|k| k.starts_with(&prefix) && !excluded.contains(k.as_str()))
        {
            return Ok(FileInfo::new_dir(path.name()));
        }
        Err(VfsError::not_exist(path.as_str()))
    }

    fn read_dir(&self, path: &VPath) -> VfsResult<Vec<FileInfo>> {
        self.ensure_map()?;
        let guard = self.map.lock().unwrap();
        let map = guard.as_ref().unwrap();
        let files = self.handle.files()?;
        let excluded = self.repository.excluded(&self.handle.info_hash())?;
        let pairs: Vec<(String, u64)> = map
            .entries
            .iter()
            .filter(|(p, &idx)| !excluded.contains(p.as_str()) && !excluded.contains(&self.raw_path_for(idx, &files)))
            .map(|(p, &idx)| (p.clone(), files.get(idx).map(|f| f.length).unwrap_or(0)))
            .collect();
        Ok(crate::vfs::synthesize_read_dir(
            pairs.iter().map(|(p, s)| (p.as_str(), *s)),
            path,
        ))
    }

    /// Persists the exclusion, then reclaims the backing bytes. The
    /// in-memory file map is left untouched — see `ensure_map`.
    fn unlink(&self, path: &VPath) -> VfsResult<()> {
        self.ensure_map()?;
        let key = path.as_str().trim_start_matches('/').to_string();
        let file_info = {
            let guard = self.map.lock().unwrap();
            let map = guard.as_ref().unwrap();
            let idx = *map
                .entries
                .get(&key)
                .ok_or_else(|| VfsError::not_exist(path.as_str()))?;
            let files = self.handle.files()?;
            files
                .get(idx)
                .cloned()
                .ok_or_else(|| VfsError::backend(path.as_str(), "torrent.files", "index out of range"))?
        };
        let info_hash = self.handle.info_hash();
        self.repository.exclude(&info_hash, &[key.as_str()])?;
        self.storage
            .delete_file(&info_hash, &self.handle.display_name(), &file_info)?;
        Ok(())
    }
}

enum HandleState {
    Created,
    Streaming,
    Released,
}

/// One torrent file's handle. `torrent_offset` is the file's starting byte
/// offset within the torrent's concatenated file space, needed to turn a
/// within-file `read_at` into the torrent-space offset the handle expects.
pub struct TorrentFile {
    handle: Arc<dyn TorrentHandle>,
    info: TorrentFileInfo,
    torrent_offset: u64,
    deadline: Duration,
    state: HandleState,
    cursor: u64,
}

impl TorrentFile {
    fn new(handle: Arc<dyn TorrentHandle>, info: TorrentFileInfo, torrent_offset: u64, deadline: Duration) -> Self {
        Self {
            handle,
            info,
            torrent_offset,
            deadline,
            state: HandleState::Created,
            cursor: 0,
        }
    }
}

impl File for TorrentFile {
    fn size(&self) -> i64 {
        self.info.length as i64
    }

    fn is_dir(&self) -> bool {
        false
    }

    fn stat(&self) -> VfsResult<FileInfo> {
        Ok(FileInfo::new_file(self.info.path.clone(), self.info.length))
    }

    fn read(&mut self, buf: &mut [u8]) -> VfsResult<usize> {
        let cursor = self.cursor as i64;
        let n = self.read_at(buf, cursor)?;
        self.cursor += n as u64;
        Ok(n)
    }

    /// Seeks the implicit reader to `off`, then issues deadline-bounded
    /// reads in a loop until `buf` is filled or the handle reports
    /// end-of-file. Each inner call gets the full configured deadline, so
    /// a short read restarts the clock rather than inheriting an
    /// exhausted one.
    fn read_at(&mut self, buf: &mut [u8], off: i64) -> VfsResult<usize> {
        if matches!(self.state, HandleState::Released) {
            return Err(VfsError::invalid_argument(&self.info.path, "read after close"));
        }
        self.state = HandleState::Streaming;
        if off < 0 {
            return Err(VfsError::invalid_argument(&self.info.path, "negative offset"));
        }
        let off = off as u64;
        if off >= self.info.length {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(self.info.length - off) as usize;
        let mut filled = 0usize;
        while filled < want {
            let torrent_off = self.torrent_offset + off + filled as u64;
            let n = self
                .handle
                .read_at(&mut buf[filled..want], torrent_off, self.deadline)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    fn close(&mut self) -> VfsResult<()> {
        self.state = HandleState::Released;
        Ok(())
    }
}

struct DirHandle;

impl File for DirHandle {
    fn size(&self) -> i64 {
        0
    }

    fn is_dir(&self) -> bool {
        true
    }

    fn stat(&self) -> VfsResult<FileInfo> {
        Ok(FileInfo::new_dir(""))
    }

    fn read(&mut self, _buf: &mut [u8]) -> VfsResult<usize> {
        Ok(0)
    }

    fn read_at(&mut self, _buf: &mut [u8], _off: i64) -> VfsResult<usize> {
        Ok(0)
    }
}

/// Builds the resolver's `.torrent` pivot factory: given the opened host
/// `.torrent` file, computes its info-hash and looks it up in a snapshot of
/// the engine's torrent list taken at startup. The lookup is a plain map
/// read rather than a fresh control-API call, so the factory stays
/// synchronous even though the resolver calls it from inside a mutex.
pub fn torrent_factory(
    known: Arc<HashMap<[u8; 20], TorrentSummary>>,
    client: Arc<crate::engine::EngineClient>,
    repository: Arc<MetaRepository>,
    storage: Arc<PieceStorage>,
    deadline: Duration,
    runtime: tokio::runtime::Handle,
) -> crate::vfs::resolver::FsFactory {
    use crate::engine::torrent_file;

    Box::new(move |mut file: Box<dyn File>| -> VfsResult<Box<dyn Filesystem>> {
        let mut bytes = Vec::new();
        let mut chunk = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..n]);
        }

        let hash = torrent_file::info_hash(&bytes)?;
        let summary = known
            .get(&hash)
            .cloned()
            .ok_or_else(|| VfsError::backend("", "torrent.resolve", "torrent not known to engine"))?;

        let _guard = runtime.enter();
        let handle = crate::engine::EngineHandle::spawn(Arc::clone(&client), summary);
        Ok(Box::new(TorrentFs::new(handle, Arc::clone(&repository), Arc::clone(&storage), deadline)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockHandle {
        info_hash: [u8; 20],
        name: String,
        files: Arc<Vec<TorrentFileInfo>>,
        data: Vec<u8>,
    }

    impl TorrentHandle for MockHandle {
        fn info_hash(&self) -> [u8; 20] {
            self.info_hash
        }

        fn display_name(&self) -> String {
            self.name.clone()
        }

        fn files(&self) -> VfsResult<Arc<Vec<TorrentFileInfo>>> {
            Ok(Arc::clone(&self.files))
        }

        fn read_at(&self, buf: &mut [u8], off: u64, _deadline: Duration) -> VfsResult<usize> {
            let off = off as usize;
            if off >= self.data.len() {
                return Ok(0);
            }
            let n = buf.len().min(self.data.len() - off);
            buf[..n].copy_from_slice(&self.data[off..off + n]);
            Ok(n)
        }
    }

    struct Fixture {
        handle: Arc<MockHandle>,
        repo: Arc<MetaRepository>,
        storage: Arc<PieceStorage>,
        _dir: tempfile::TempDir,
    }

    fn fixture_with(files: Vec<TorrentFileInfo>, data: Vec<u8>, info_hash: [u8; 20]) -> Fixture {
        let handle = Arc::new(MockHandle {
            info_hash,
            name: "Movie".into(),
            files: Arc::new(files),
            data,
        });
        let dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(MetaRepository::open(dir.path().join("excluded.redb")).unwrap());
        let storage = Arc::new(
            PieceStorage::open(dir.path().join("files"), dir.path().join("completion.redb")).unwrap(),
        );
        Fixture {
            handle,
            repo,
            storage,
            _dir: dir,
        }
    }

    fn two_file_fixture() -> Fixture {
        let movie = b"movie bytes".to_vec();
        let subs = b"subtitle bytes".to_vec();
        let mut data = movie.clone();
        data.extend_from_slice(&subs);
        let files = vec![
            TorrentFileInfo {
                path: "movie.mkv".into(),
                length: movie.len() as u64,
                begin_piece: 0,
                end_piece: 1,
            },
            TorrentFileInfo {
                path: "subs.srt".into(),
                length: subs.len() as u64,
                begin_piece: 1,
                end_piece: 2,
            },
        ];
        fixture_with(files, data, [9u8; 20])
    }

    #[test]
    fn lists_files_without_the_torrent_name_prefix() {
        let fx = two_file_fixture();
        let fs = TorrentFs::new(
            Arc::clone(&fx.handle) as Arc<dyn TorrentHandle>,
            Arc::clone(&fx.repo),
            Arc::clone(&fx.storage),
            Duration::from_secs(1),
        );
        let mut names: Vec<_> = fs.read_dir(&VPath::root()).unwrap().into_iter().map(|e| e.name).collect();
        names.sort();
        assert_eq!(names, vec!["movie.mkv", "subs.srt"]);
    }

    #[test]
    fn reads_file_content_through_the_handle() {
        let fx = two_file_fixture();
        let fs = TorrentFs::new(
            Arc::clone(&fx.handle) as Arc<dyn TorrentHandle>,
            Arc::clone(&fx.repo),
            Arc::clone(&fx.storage),
            Duration::from_secs(1),
        );
        let mut f = fs.open(&VPath::clean("/subs.srt")).unwrap();
        let mut buf = [0u8; 8];
        let n = f.read_at(&mut buf, 0).unwrap();
        assert_eq!(&buf[..n], b"subtitle");
    }

    #[test]
    fn size_matches_stat_size_for_every_open_file() {
        let fx = two_file_fixture();
        let fs = TorrentFs::new(
            Arc::clone(&fx.handle) as Arc<dyn TorrentHandle>,
            Arc::clone(&fx.repo),
            Arc::clone(&fx.storage),
            Duration::from_secs(1),
        );
        let f = fs.open(&VPath::clean("/movie.mkv")).unwrap();
        assert_eq!(f.size(), f.stat().unwrap().size as i64);
    }

    #[test]
    fn scenario_five_exclude_then_verify() {
        let fx = two_file_fixture();
        let backing = fx._dir.path().join("files").join("Movie").join("movie.mkv");
        std::fs::create_dir_all(backing.parent().unwrap()).unwrap();
        std::fs::write(&backing, b"movie bytes").unwrap();
        fx.storage.mark_complete(&fx.handle.info_hash(), 0).unwrap();

        let fs = TorrentFs::new(
            Arc::clone(&fx.handle) as Arc<dyn TorrentHandle>,
            Arc::clone(&fx.repo),
            Arc::clone(&fx.storage),
            Duration::from_secs(1),
        );
        fs.unlink(&VPath::clean("/movie.mkv")).unwrap();

        let names: Vec<_> = fs.read_dir(&VPath::root()).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["subs.srt"]);
        assert!(matches!(
            fs.open(&VPath::clean("/movie.mkv")),
            Err(VfsError::NotExist { .. })
        ));
        assert!(!fx.storage.completion_flag(&fx.handle.info_hash(), 0).unwrap());
        assert!(!backing.exists());
        assert!(fx.repo.excluded(&fx.handle.info_hash()).unwrap().contains("movie.mkv"));
    }

    #[test]
    fn unlink_of_unknown_path_is_not_exist() {
        let fx = two_file_fixture();
        let fs = TorrentFs::new(
            Arc::clone(&fx.handle) as Arc<dyn TorrentHandle>,
            Arc::clone(&fx.repo),
            Arc::clone(&fx.storage),
            Duration::from_secs(1),
        );
        assert!(matches!(
            fs.unlink(&VPath::clean("/missing.txt")),
            Err(VfsError::NotExist { .. })
        ));
    }

    #[test]
    fn exclusion_is_visible_without_rebuilding_the_file_map() {
        let fx = two_file_fixture();
        let fs = TorrentFs::new(
            Arc::clone(&fx.handle) as Arc<dyn TorrentHandle>,
            Arc::clone(&fx.repo),
            Arc::clone(&fx.storage),
            Duration::from_secs(1),
        );
        // Force the map to be built before the exclusion exists.
        fs.read_dir(&VPath::root()).unwrap();
        fx.repo.exclude(&fx.handle.info_hash(), &["movie.mkv"]).unwrap();

        let names: Vec<_> = fs.read_dir(&VPath::root()).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["subs.srt"]);
        assert!(matches!(
            fs.open(&VPath::clean("/movie.mkv")),
            Err(VfsError::NotExist { .. })
        ));
    }

    #[test]
    fn padding_files_are_hidden_from_the_listing() {
        let files = vec![
            TorrentFileInfo {
                path: "movie.mkv".into(),
                length: 4,
                begin_piece: 0,
                end_piece: 1,
            },
            TorrentFileInfo {
                path: ".pad/0".into(),
                length: 4,
                begin_piece: 1,
                end_piece: 2,
            },
        ];
        let fx = fixture_with(files, vec![0u8; 8], [3u8; 20]);
        let fs = TorrentFs::new(
            Arc::clone(&fx.handle) as Arc<dyn TorrentHandle>,
            Arc::clone(&fx.repo),
            Arc::clone(&fx.storage),
            Duration::from_secs(1),
        );
        let names: Vec<_> = fs.read_dir(&VPath::root()).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["movie.mkv"]);
    }

    #[test]
    fn read_at_end_of_file_returns_zero_bytes() {
        let fx = two_file_fixture();
        let fs = TorrentFs::new(
            Arc::clone(&fx.handle) as Arc<dyn TorrentHandle>,
            Arc::clone(&fx.repo),
            Arc::clone(&fx.storage),
            Duration::from_secs(1),
        );
        let mut f = fs.open(&VPath::clean("/movie.mkv")).unwrap();
        let mut buf = [0u8; 4];
        let n = f.read_at(&mut buf, f.size()).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn read_after_close_errors() {
        let fx = two_file_fixture();
        let fs = TorrentFs::new(
            Arc::clone(&fx.handle) as Arc<dyn TorrentHandle>,
            Arc::clone(&fx.repo),
            Arc::clone(&fx.storage),
            Duration::from_secs(1),
        );
        let mut f = fs.open(&VPath::clean("/movie.mkv")).unwrap();
        f.close().unwrap();
        let mut buf = [0u8; 4];
        assert!(f.read_at(&mut buf, 0).is_err());
    }
}
