use crate::util::config::LoggingConfig;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::fmt::format::Format;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::EnvFilter, Layer, Registry};

/// 访问日志 target，单独落到 `{prefix}-access` 文件
pub const ACCESS_TARGET: &str = "http.server";

static ACCESS_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// 按配置初始化日志，返回主日志文件的 guard
///
/// 文件日志按天滚动，启用时会先清理超过保留天数的旧文件。
pub fn log_init_with_config(
    file_prefix: &str,
    config: &LoggingConfig,
) -> anyhow::Result<Option<WorkerGuard>> {
    let level_filter = parse_level(&config.level);
    let filter_expression = level_filter_to_str(level_filter);
    let use_json = config.structured;

    let stdout_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_expression));

    if !config.file.enabled {
        if use_json {
            let stdout_layer = layer()
                .json()
                .with_target(false)
                .with_writer(io::stdout)
                .with_filter(stdout_filter);
            Registry::default().with(stdout_layer).init();
        } else {
            let stdout_layer = layer()
                .event_format(console_format())
                .with_writer(io::stdout)
                .with_filter(stdout_filter);
            Registry::default().with(stdout_layer).init();
        }

        tracing::info!(
            event = "log.init",
            level = %config.level,
            console = true,
            file = false,
            structured = use_json
        );
        return Ok(None);
    }

    let log_dir = resolve_log_dir(&config.file.directory);
    std::fs::create_dir_all(&log_dir)?;

    if let Some(retention) = config.file.retention_days {
        cleanup_old_logs(&log_dir, file_prefix, retention)?;
    }

    let main_filter_expr = format!("{},{}=off", filter_expression, ACCESS_TARGET);
    let access_filter_expr = format!("{}={}", ACCESS_TARGET, filter_expression);

    let file_filter = EnvFilter::try_new(main_filter_expr.as_str())
        .unwrap_or_else(|_| EnvFilter::new(filter_expression));
    let access_filter = EnvFilter::try_new(access_filter_expr.as_str())
        .unwrap_or_else(|_| EnvFilter::new(format!("{}=info", ACCESS_TARGET)));

    let file_appender = daily(&log_dir, format!("{}-info", file_prefix));
    let (no_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let access_appender = daily(&log_dir, format!("{}-access", file_prefix));
    let (access_nb, access_guard) = tracing_appender::non_blocking(access_appender);
    let _ = ACCESS_GUARD.set(access_guard);

    if use_json {
        let stdout_layer = layer()
            .json()
            .with_target(false)
            .with_writer(io::stdout)
            .with_filter(stdout_filter);
        let file_layer = layer()
            .json()
            .with_ansi(false)
            .with_writer(no_blocking)
            .with_filter(file_filter);
        let access_layer = layer()
            .json()
            .with_target(false)
            .with_ansi(false)
            .with_writer(access_nb)
            .with_filter(access_filter);

        Registry::default()
            .with(stdout_layer)
            .with(file_layer)
            .with(access_layer)
            .init();
    } else {
        let stdout_layer = layer()
            .event_format(console_format())
            .with_writer(io::stdout)
            .with_filter(stdout_filter);
        let file_layer = layer()
            .event_format(Format::default().with_target(true))
            .with_ansi(false)
            .with_writer(no_blocking)
            .with_filter(file_filter);
        let access_layer = layer()
            .event_format(Format::default().with_target(false))
            .with_ansi(false)
            .with_writer(access_nb)
            .with_filter(access_filter);

        Registry::default()
            .with(stdout_layer)
            .with(file_layer)
            .with(access_layer)
            .init();
    }

    tracing::info!(
        event = "log.init",
        level = %config.level,
        console = true,
        file = true,
        directory = %log_dir.display(),
        rotation = "daily",
        structured = use_json,
        access_file = format!("{}-access", file_prefix)
    );
    if let Some(retention) = config.file.retention_days {
        tracing::info!(event = "log.retention", days = retention);
    }

    Ok(Some(guard))
}

fn console_format() -> Format {
    Format::default()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
}

/// 相对路径基于工作目录；在 bin 目录下启动时使用上级目录
fn resolve_log_dir(directory: &str) -> PathBuf {
    let path = Path::new(directory);
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if current_dir.file_name() == Some(std::ffi::OsStr::new("bin")) {
        if let Some(parent) = current_dir.parent() {
            return parent.join(directory);
        }
    }
    current_dir.join(directory)
}

/// 删除超过保留天数的日志文件，只处理带前缀的文件
pub fn cleanup_old_logs(log_dir: &Path, file_prefix: &str, retention_days: u32) -> anyhow::Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let retention = std::time::Duration::from_secs(retention_days as u64 * 24 * 60 * 60);
    let cutoff = match std::time::SystemTime::now().checked_sub(retention) {
        Some(cutoff) => cutoff,
        None => return Ok(0),
    };

    let mut deleted_count = 0;
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.starts_with(file_prefix))
            .unwrap_or(false);
        if !is_log {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) if metadata.is_file() => metadata,
            _ => continue,
        };
        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(_) => continue,
        };
        if modified < cutoff {
            match std::fs::remove_file(&path) {
                Ok(()) => deleted_count += 1,
                Err(e) => eprintln!("删除日志文件失败: {} - {}", path.display(), e),
            }
        }
    }

    Ok(deleted_count)
}

fn parse_level(level: &str) -> LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

fn level_filter_to_str(level: LevelFilter) -> &'static str {
    match level {
        LevelFilter::OFF => "off",
        LevelFilter::ERROR => "error",
        LevelFilter::WARN => "warn",
        LevelFilter::INFO => "info",
        LevelFilter::DEBUG => "debug",
        LevelFilter::TRACE => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), LevelFilter::DEBUG);
        assert_eq!(parse_level("verbose"), LevelFilter::INFO);
        assert_eq!(level_filter_to_str(parse_level("warn")), "warn");
    }

    #[test]
    fn test_cleanup_only_touches_prefixed_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("edcp-server-info.2024-01-01"), "x").unwrap();
        std::fs::write(dir.path().join("other.txt"), "x").unwrap();

        // 保留 0 天：所有带前缀的文件都已过期
        std::thread::sleep(std::time::Duration::from_millis(20));
        let deleted = cleanup_old_logs(dir.path(), "edcp-server", 0).unwrap();
        assert_eq!(deleted, 1);
        assert!(dir.path().join("other.txt").exists());

        let deleted = cleanup_old_logs(dir.path(), "edcp-server", 7).unwrap();
        assert_eq!(deleted, 0);
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let deleted = cleanup_old_logs(Path::new("/nonexistent/edcp-logs"), "edcp-server", 7).unwrap();
        assert_eq!(deleted, 0);
    }

    #[test]
    fn test_resolve_absolute_dir() {
        assert_eq!(resolve_log_dir("/var/log/edcp"), PathBuf::from("/var/log/edcp"));
    }
}
