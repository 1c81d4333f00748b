//! Layered configuration: defaults, then a config file, then environment
//! variables, then CLI flags, each overriding the last, followed by
//! validation. Mirrors the teacher's `Config::load_with_cli` precedence
//! chain and file-extension dispatch.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ValidationIssue, VfsError, VfsResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub mount: MountConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for the external BT engine's control API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub url: String,
    pub read_timeout_secs: u64,
}

/// On-disk layout roots. `data_dir` holds piece bytes and the completion
/// store; `metadata_dir` holds the peer identity and the exclude-set
/// repository, kept separate so metadata can live on smaller/faster
/// storage than the piece bytes it describes. `torrents_dir` is the host
/// directory a user drops `.torrent` files into; it is a sibling of
/// `data_dir` rather than a subdirectory of it, so the pieces backing
/// store never shows up inside the mounted tree the Host FS serves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub data_dir: PathBuf,
    pub metadata_dir: PathBuf,
    pub torrents_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    pub mount_point: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub metadata_ttl_secs: u64,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:3030".to_string(),
            read_timeout_secs: 30,
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/torrent-vfs/data"),
            metadata_dir: PathBuf::from("/var/lib/torrent-vfs/metadata"),
            torrents_dir: PathBuf::from("/var/lib/torrent-vfs/torrents"),
        }
    }
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            mount_point: PathBuf::from("/mnt/torrents"),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            metadata_ttl_secs: 60,
            max_entries: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// The on-disk layout derived from a validated [`DataConfig`]: the concrete
/// paths the Piece Storage Backend and Meta Repository open.
pub struct DataLayout {
    pub piece_completion_db: PathBuf,
    pub files_dir: PathBuf,
    pub excluded_files_db: PathBuf,
    pub peer_id_path: PathBuf,
    pub torrents_dir: PathBuf,
}

impl DataLayout {
    pub fn new(data: &DataConfig) -> Self {
        Self {
            piece_completion_db: data.data_dir.join("piece-completion").join("completion.redb"),
            files_dir: data.data_dir.join("files"),
            excluded_files_db: data.metadata_dir.join("excluded-files").join("excluded.redb"),
            peer_id_path: data.metadata_dir.join("ID"),
            torrents_dir: data.torrents_dir.clone(),
        }
    }

    /// Creates every directory this layout needs and generates a random
    /// 20-byte peer identity on first run, matching the original system's
    /// `<metadata>/ID` file.
    pub fn ensure(&self) -> VfsResult<[u8; 20]> {
        let dirs: [Option<&std::path::Path>; 5] = [
            self.piece_completion_db.parent(),
            Some(self.files_dir.as_path()),
            self.excluded_files_db.parent(),
            self.peer_id_path.parent(),
            Some(self.torrents_dir.as_path()),
        ];
        for dir in dirs.into_iter().flatten() {
            std::fs::create_dir_all(dir)?;
        }

        if let Ok(existing) = std::fs::read(&self.peer_id_path) {
            if let Ok(id) = <[u8; 20]>::try_from(existing.as_slice()) {
                return Ok(id);
            }
        }
        let id: [u8; 20] = rand::random();
        std::fs::write(&self.peer_id_path, id)?;
        Ok(id)
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &PathBuf) -> VfsResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());
        match ext.as_deref() {
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Ok(toml::from_str(&content)?),
        }
    }

    pub fn from_default_locations() -> VfsResult<Self> {
        let candidates = [
            dirs::config_dir().map(|d| d.join("torrent-vfs/config.toml")),
            Some(PathBuf::from("/etc/torrent-vfs/config.toml")),
            Some(PathBuf::from("./torrent-vfs.toml")),
        ];

        for path in candidates.iter().flatten() {
            if path.exists() {
                tracing::info!(path = %path.display(), "loading config file");
                return Self::from_file(path);
            }
        }
        Ok(Self::default())
    }

    pub fn merge_from_env(mut self) -> VfsResult<Self> {
        if let Ok(val) = std::env::var("TORRENT_VFS_ENGINE_URL") {
            self.engine.url = val;
        }
        if let Ok(val) = std::env::var("TORRENT_VFS_DATA_DIR") {
            self.data.data_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("TORRENT_VFS_METADATA_DIR") {
            self.data.metadata_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("TORRENT_VFS_MOUNT_POINT") {
            self.mount.mount_point = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("TORRENT_VFS_READ_TIMEOUT") {
            self.engine.read_timeout_secs = val
                .parse()
                .map_err(|_| VfsError::ParseError {
                    message: "TORRENT_VFS_READ_TIMEOUT has invalid format".into(),
                })?;
        }
        if let Ok(val) = std::env::var("TORRENT_VFS_LOG_LEVEL") {
            self.logging.level = val;
        }
        Ok(self)
    }

    pub fn merge_from_cli(mut self, cli: &CliArgs) -> Self {
        if let Some(ref url) = cli.engine_url {
            self.engine.url = url.clone();
        }
        if let Some(ref torrents_dir) = cli.torrents_dir {
            self.data.torrents_dir = torrents_dir.clone();
        }
        if let Some(ref mount_point) = cli.mount_point {
            self.mount.mount_point = mount_point.clone();
        }
        self
    }

    pub fn load() -> VfsResult<Self> {
        Self::from_default_locations()?.merge_from_env()
    }

    pub fn load_with_cli(cli: &CliArgs) -> VfsResult<Self> {
        Ok(Self::from_default_locations()?
            .merge_from_env()?
            .merge_from_cli(cli))
    }

    pub fn validate(&self) -> VfsResult<()> {
        let mut issues = Vec::new();

        if self.engine.url.is_empty() {
            issues.push(ValidationIssue {
                field: "engine.url".into(),
                message: "URL cannot be empty".into(),
            });
        } else if let Err(e) = reqwest::Url::parse(&self.engine.url) {
            issues.push(ValidationIssue {
                field: "engine.url".into(),
                message: format!("invalid URL: {e}"),
            });
        }

        if !self.data.data_dir.is_absolute() {
            issues.push(ValidationIssue {
                field: "data.data_dir".into(),
                message: "data directory must be an absolute path".into(),
            });
        }
        if !self.data.metadata_dir.is_absolute() {
            issues.push(ValidationIssue {
                field: "data.metadata_dir".into(),
                message: "metadata directory must be an absolute path".into(),
            });
        }
        if !self.data.torrents_dir.is_absolute() {
            issues.push(ValidationIssue {
                field: "data.torrents_dir".into(),
                message: "torrents directory must be an absolute path".into(),
            });
        }
        if !self.mount.mount_point.is_absolute() {
            issues.push(ValidationIssue {
                field: "mount.mount_point".into(),
                message: "mount point must be an absolute path".into(),
            });
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            issues.push(ValidationIssue {
                field: "logging.level".into(),
                message: format!(
                    "invalid log level '{}', expected one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(VfsError::ValidationError(issues))
        }
    }
}

/// CLI overrides, merged on top of file and environment configuration.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub engine_url: Option<String>,
    pub torrents_dir: Option<PathBuf>,
    pub mount_point: Option<PathBuf>,
}
