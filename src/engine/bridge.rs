//! Bridges the async [`EngineClient`] to [`TorrentHandle`]'s synchronous
//! contract. Uses the same request/response channel shape the teacher's
//! `fs/async_bridge.rs` uses to cross the FUSE sync/async boundary: an
//! async `tokio::sync::mpsc` request channel feeding a background worker
//! task, paired with a `std::sync::mpsc` response channel so the
//! synchronous caller can block with a timeout via `recv_timeout`.

use std::sync::mpsc as sync_mpsc;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::engine::client::EngineClient;
use crate::engine::types::{TorrentFileInfo, TorrentSummary};
use crate::engine::TorrentHandle;
use crate::error::{VfsError, VfsResult};

struct ReadRequest {
    file_index: usize,
    offset: u64,
    len: usize,
    response_tx: sync_mpsc::Sender<VfsResult<Vec<u8>>>,
}

/// A `TorrentHandle` backed by a live engine connection. Construction
/// takes an already-fetched [`TorrentSummary`] (post-info only — the
/// control API only lists torrents whose info dictionary is known), so
/// `info_hash`/`display_name`/`files` never block.
pub struct EngineHandle {
    info_hash: [u8; 20],
    display_name: String,
    files: Arc<Vec<TorrentFileInfo>>,
    request_tx: mpsc::Sender<ReadRequest>,
}

impl EngineHandle {
    /// Spawns the background worker task on the calling Tokio runtime.
    pub fn spawn(client: Arc<EngineClient>, summary: TorrentSummary) -> Arc<Self> {
        let (request_tx, mut request_rx) = mpsc::channel::<ReadRequest>(64);
        let torrent_id = summary.id;
        tokio::spawn(async move {
            while let Some(req) = request_rx.recv().await {
                let result = client
                    .read_range(torrent_id, req.file_index, req.offset, req.len)
                    .await;
                let _ = req.response_tx.send(result);
            }
        });

        Arc::new(Self {
            info_hash: summary.info_hash,
            display_name: summary.name,
            files: Arc::new(summary.files),
            request_tx,
        })
    }

    /// Translates a torrent-space (concatenated-file) offset into the
    /// `(file_index, file_offset)` pair the control API's per-file stream
    /// endpoint addresses by.
    fn locate(&self, off: u64) -> VfsResult<(usize, u64)> {
        let mut remaining = off;
        for (idx, f) in self.files.iter().enumerate() {
            if remaining < f.length {
                return Ok((idx, remaining));
            }
            remaining -= f.length;
        }
        Err(VfsError::invalid_argument(
            &self.display_name,
            "read offset beyond torrent length",
        ))
    }
}

impl TorrentHandle for EngineHandle {
    fn info_hash(&self) -> [u8; 20] {
        self.info_hash
    }

    fn display_name(&self) -> String {
        self.display_name.clone()
    }

    fn files(&self) -> VfsResult<Arc<Vec<TorrentFileInfo>>> {
        Ok(Arc::clone(&self.files))
    }

    fn read_at(&self, buf: &mut [u8], off: u64, deadline: Duration) -> VfsResult<usize> {
        let (file_index, file_offset) = self.locate(off)?;

        let (response_tx, response_rx) = sync_mpsc::channel();
        self.request_tx
            .try_send(ReadRequest {
                file_index,
                offset: file_offset,
                len: buf.len(),
                response_tx,
            })
            .map_err(|_| VfsError::backend(&self.display_name, "engine.read_at", "worker queue full"))?;

        let data = response_rx.recv_timeout(deadline).map_err(|_| VfsError::Timeout {
            path: self.display_name.clone(),
            millis: deadline.as_millis() as u64,
        })??;

        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn read_at_translates_offset_into_the_right_file_and_delivers_bytes() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/torrents/1/stream/1"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_bytes(b"subtitle bytes".to_vec()))
            .mount(&server)
            .await;

        let client = Arc::new(EngineClient::new(server.uri(), Duration::from_secs(5)).unwrap());
        let summary = TorrentSummary {
            id: 1,
            info_hash: [1u8; 20],
            name: "Movie".into(),
            piece_length: 1 << 16,
            files: vec![
                TorrentFileInfo {
                    path: "movie.mkv".into(),
                    length: 11,
                    begin_piece: 0,
                    end_piece: 1,
                },
                TorrentFileInfo {
                    path: "subs.srt".into(),
                    length: 15,
                    begin_piece: 1,
                    end_piece: 2,
                },
            ],
        };
        let handle = EngineHandle::spawn(client, summary);

        let mut buf = [0u8; 8];
        let n = handle.read_at(&mut buf, 11, Duration::from_secs(1)).unwrap();
        assert_eq!(&buf[..n], b"subtitle");
    }

    #[tokio::test]
    async fn read_at_beyond_torrent_length_is_invalid_argument() {
        let client = Arc::new(EngineClient::new("http://127.0.0.1:0", Duration::from_secs(1)).unwrap());
        let summary = TorrentSummary {
            id: 1,
            info_hash: [2u8; 20],
            name: "Movie".into(),
            piece_length: 1 << 16,
            files: vec![TorrentFileInfo {
                path: "movie.mkv".into(),
                length: 10,
                begin_piece: 0,
                end_piece: 1,
            }],
        };
        let handle = EngineHandle::spawn(client, summary);
        let mut buf = [0u8; 4];
        assert!(matches!(
            handle.read_at(&mut buf, 100, Duration::from_millis(50)),
            Err(VfsError::InvalidArgument { .. })
        ));
    }
}
