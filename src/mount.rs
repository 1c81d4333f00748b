use anyhow::{Context, Result};
use std::path::PathBuf;

pub fn setup_logging(verbose: u8, quiet: bool) -> Result<()> {
    use tracing_subscriber::fmt;

    if quiet {
        let subscriber = fmt()
            .with_max_level(tracing::Level::ERROR)
            .without_time()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let level = match verbose {
            0 => tracing::Level::INFO,
            1 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let subscriber = fmt().with_max_level(level).with_target(true).finish();

        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

pub fn is_mount_point(path: &PathBuf) -> Result<bool> {
    use std::process::Command;

    let output = Command::new("mount")
        .output()
        .with_context(|| "Failed to run mount command")?;

    if !output.status.success() {
        anyhow::bail!("mount command failed");
    }

    let mount_output = String::from_utf8_lossy(&output.stdout);
    let path_str = path.to_string_lossy();

    for line in mount_output.lines() {
        if line.contains(&*path_str) {
            return Ok(true);
        }
    }

    if cfg!(target_os = "linux") {
        use std::os::unix::fs::MetadataExt;
        let path_meta = std::fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        let root = PathBuf::from("/");
        let parent = path.parent().unwrap_or(&root);
        let parent_meta = std::fs::metadata(parent)
            .with_context(|| format!("Failed to stat parent of {}", path.display()))?;

        return Ok(path_meta.dev() != parent_meta.dev());
    }

    Ok(false)
}
