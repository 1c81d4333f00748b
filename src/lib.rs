//! # torrent-vfs
//!
//! A read-only virtual filesystem engine over BitTorrent swarms and nested
//! archives, exported through FUSE. A user drops `.torrent` files under a
//! host data directory; the mounted tree turns each one into a directory of
//! the files inside the torrent, fetched on demand from peers through an
//! external BT engine's control API. ZIP/RAR/7Z files anywhere in that tree
//! behave the same way, recursively.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     User Filesystem                          │
//! │  /mnt/torrents/                                              │
//! │  ├── ubuntu-24.04.iso.torrent/   (from the engine)           │
//! │  └── archive.zip/                (nested container)          │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    FUSE Export (VfsFuse)                      │
//! │  inode table · file handles · fuser::Filesystem callbacks     │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Resolver FS  over  Host FS                      │
//! │  pivots: .torrent → Torrent FS, .zip/.rar/.7z → Archive FS     │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  Engine Client (reqwest)  │  Piece Storage  │  Meta Repository│
//! │  talks to the external BT engine's local control API           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`vfs`] - the capability set (`Filesystem`/`File`) and every backend:
//!   host, resolver, archive, torrent, memory (test double)
//! - [`engine`] - the external BT engine collaborator: HTTP client, the
//!   sync/async bridge, and wire types
//! - [`storage`] - piece-addressable backing store for downloaded bytes
//! - [`meta`] - the durable per-torrent exclude-set repository
//! - [`fs`] - the FUSE export (`VfsFuse`), its inode table, and macros
//! - [`config`] - layered configuration (defaults, file, env, CLI)
//! - [`metrics`] - FUSE/engine call counters, logged periodically
//! - [`types`] - FUSE-facing attribute conversion and file handle table
//!
//! ## Error Handling
//!
//! Every fallible operation below the CLI boundary returns [`error::VfsResult`].
//! [`error::VfsError`] carries a fixed taxonomy (`NotExist`, `NotImplemented`,
//! `InvalidArgument`, `Timeout`, `Backend`, `Corruption`, plus engine-facing
//! variants) with a `to_errno()` conversion the FUSE export uses directly.
//! The top-level [`run`] function uses `anyhow` only at the process boundary,
//! to attach operator-facing context to a `VfsError` before it becomes an
//! exit code.
//!
//! ## Concurrency
//!
//! FUSE dispatch is synchronous; the engine client is async. `VfsFuse::read`
//! is the only callback that crosses that boundary, via
//! `tokio::task::spawn_blocking`, so a slow peer-bound read never stalls the
//! dispatch loop for any other in-flight request. See
//! [`engine::bridge::EngineHandle`] for how the async/sync boundary is
//! crossed again one layer down, from `TorrentHandle::read_at` into the
//! engine's Tokio runtime.

pub mod config;
pub mod engine;
pub mod error;
pub mod fs;
pub mod meta;
pub mod metrics;
pub mod mount;
pub mod sharded_counter;
pub mod storage;
pub mod types;
pub mod vfs;

pub use config::{CliArgs, Config};
pub use fs::filesystem::VfsFuse;
pub use metrics::Metrics;
pub use sharded_counter::ShardedCounter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::DataLayout;
use crate::engine::{EngineClient, TorrentSummary};
use crate::meta::MetaRepository;
use crate::storage::PieceStorage;
use crate::vfs::archive::{rar_factory, sevenzip_factory, zip_factory};
use crate::vfs::host::HostFs;
use crate::vfs::resolver::ResolverFs;
use crate::vfs::torrent::torrent_factory;
use crate::vfs::Filesystem;

/// Per-read deadline for a torrent-backed file: how long a FUSE `read` will
/// wait on the engine before giving up with `ETIMEDOUT`.
const READ_DEADLINE: Duration = Duration::from_secs(60);

/// Assembles the composed filesystem tree described in the module
/// documentation: a Host FS rooted at the configured torrents directory,
/// wrapped in a Resolver FS that pivots `.torrent` into the engine-backed
/// Torrent FS and `.zip`/`.rar`/`.7z` into the Archive FS.
async fn build_root(config: &Config, engine: Arc<EngineClient>) -> Result<Arc<dyn Filesystem>> {
    let layout = DataLayout::new(&config.data);
    layout.ensure().context("failed to prepare on-disk layout")?;

    let repository = Arc::new(MetaRepository::open(&layout.excluded_files_db).context("failed to open exclude-set repository")?);
    let storage = Arc::new(
        PieceStorage::open(layout.files_dir.clone(), &layout.piece_completion_db)
            .context("failed to open piece storage backend")?,
    );

    let summaries = engine.list_torrents().await.context("failed to list torrents from the engine")?;
    tracing::info!(count = summaries.len(), "fetched torrent list from engine");
    let known: HashMap<[u8; 20], TorrentSummary> = summaries.into_iter().map(|s| (s.info_hash, s)).collect();

    let host = HostFs::new(layout.torrents_dir.clone());
    let mut resolver = ResolverFs::new(Arc::new(host));
    resolver.register(
        ".torrent",
        torrent_factory(
            Arc::new(known),
            Arc::clone(&engine),
            Arc::clone(&repository),
            Arc::clone(&storage),
            READ_DEADLINE,
            tokio::runtime::Handle::current(),
        ),
    );
    resolver.register(".zip", zip_factory());
    resolver.register(".rar", rar_factory());
    resolver.register(".7z", sevenzip_factory());

    Ok(Arc::new(resolver))
}

/// Validates the mount point exists, is a directory, and is not already
/// mounted, mirroring the teacher's pre-mount sanity check.
fn validate_mount_point(path: &std::path::Path) -> Result<()> {
    let meta = std::fs::metadata(path).with_context(|| format!("mount point {} does not exist", path.display()))?;
    if !meta.is_dir() {
        anyhow::bail!("mount point {} is not a directory", path.display());
    }
    if mount::is_mount_point(&path.to_path_buf()).unwrap_or(false) {
        anyhow::bail!("mount point {} is already mounted", path.display());
    }
    Ok(())
}

/// Runs the torrent virtual filesystem: builds the composed tree, mounts it
/// at `config.mount.mount_point`, and blocks until unmounted.
///
/// This function blocks until the filesystem is unmounted. It handles
/// SIGINT/SIGTERM the way `fuser::mount2` does natively: an unmount of the
/// mount point causes `mount2` to return.
pub async fn run(config: Config) -> Result<()> {
    tracing::info!(operation = "startup", message = "torrent-vfs starting");
    tracing::debug!(config = ?config, "configuration loaded");

    config.validate().context("invalid configuration")?;
    validate_mount_point(&config.mount.mount_point)?;

    let metrics = Arc::new(Metrics::new());
    let engine = Arc::new(
        EngineClient::new(config.engine.url.clone(), Duration::from_secs(config.engine.read_timeout_secs))
            .context("failed to construct engine client")?
            .with_metrics(Arc::clone(&metrics.api)),
    );

    let root = build_root(&config, Arc::clone(&engine)).await?;

    let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let _periodic = metrics.spawn_periodic_logging(60, Arc::clone(&stop));

    let runtime = tokio::runtime::Handle::current();
    let vfs_fuse = VfsFuse::new(root, Arc::clone(&metrics), runtime)
        .with_max_inodes(config.cache.max_entries.max(1) * 64)
        .with_max_handles(4096);

    let mount_point = config.mount.mount_point.clone();
    let mount_result = tokio::task::spawn_blocking(move || vfs_fuse.mount(&mount_point))
        .await
        .context("mount task panicked")?;

    stop.store(true, std::sync::atomic::Ordering::Relaxed);
    metrics.log_full_summary();

    mount_result.context("failed to mount filesystem")?;
    Ok(())
}

/// Checks configuration validity and engine connectivity without mounting,
/// backing the `serve-check` CLI subcommand.
pub async fn serve_check(config: &Config) -> Result<()> {
    config.validate().context("invalid configuration")?;
    let metrics = Arc::new(crate::metrics::ApiMetrics::new());
    let engine = EngineClient::new(config.engine.url.clone(), Duration::from_secs(config.engine.read_timeout_secs))
        .context("failed to construct engine client")?
        .with_metrics(Arc::clone(&metrics));
    let summaries = engine.list_torrents().await.context("engine is not reachable")?;
    tracing::info!(count = summaries.len(), url = %config.engine.url, "engine reachable");
    metrics.log_summary();
    Ok(())
}
