//! Log setup: daily rolling file plus warnings on stderr

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_FILE_BASENAME: &str = "obs-remote.log";
const LOG_DIR_ENV: &str = "OBS_REMOTE_LOG_PATH";
const LOG_RETENTION_DAYS: u64 = 7;

/// Install the global subscriber
///
/// The file layer honours `RUST_LOG` (default `info`); stderr only carries
/// warnings so it does not fight the console UI. Keep the returned guard
/// alive until exit or buffered lines are lost.
pub fn init_logging() -> Result<WorkerGuard> {
    let log_dir = resolve_log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {:?}", log_dir))?;

    prune_old_logs(
        &log_dir,
        Duration::from_secs(60 * 60 * 24 * LOG_RETENTION_DAYS),
    );

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_BASENAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_filter(env_filter);

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

/// Directory the log files go to
pub fn resolve_log_dir() -> Result<PathBuf> {
    if let Ok(override_path) = std::env::var(LOG_DIR_ENV) {
        return Ok(PathBuf::from(override_path));
    }

    let proj_dirs = ProjectDirs::from("dev", "obs-remote", "obs-remote")
        .context("Failed to determine project directories for log path")?;

    let base = proj_dirs
        .state_dir()
        .unwrap_or_else(|| proj_dirs.data_local_dir());
    Ok(base.join("logs"))
}

/// Delete our own log files last modified before `max_age` ago
fn prune_old_logs(log_dir: &Path, max_age: Duration) {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return;
    };
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_ours = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(LOG_FILE_BASENAME))
            .unwrap_or(false);
        if !is_ours || !path.is_file() {
            continue;
        }

        let modified = entry.metadata().and_then(|m| m.modified());
        if matches!(modified, Ok(modified) if modified < cutoff) {
            let _ = std::fs::remove_file(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_keeps_fresh_and_foreign_files() {
        let dir = std::env::temp_dir().join(format!("obs-remote-logs-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let ours = dir.join(format!("{}.2026-10-01", LOG_FILE_BASENAME));
        let foreign = dir.join("other.log");
        std::fs::write(&ours, "line\n").unwrap();
        std::fs::write(&foreign, "line\n").unwrap();

        // Nothing is older than a day yet
        prune_old_logs(&dir, Duration::from_secs(60 * 60 * 24));
        assert!(ours.exists());

        // Everything is older than zero seconds, but only our files go
        std::thread::sleep(Duration::from_millis(20));
        prune_old_logs(&dir, Duration::from_millis(1));
        assert!(!ours.exists());
        assert!(foreign.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
