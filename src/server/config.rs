//! 配置管理模块
//! 负责配置文件的定位、加载、按角色验证和日志初始化

use crate::util::config::{Config, ConfigLoader, ConfigValidator, ValidationReport, CONFIG_FILE_NAME};
use crate::util::log::log_init_with_config;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// 日志文件名前缀
pub const LOG_FILE_PREFIX: &str = "edcp-server";

/// 配置管理器
pub struct ConfigManager;

impl ConfigManager {
    /// 加载配置（配置文件 + 环境变量）
    ///
    /// 配置文件不存在时使用默认值，存在但无法解析则报错。
    pub fn load() -> Result<Config> {
        let config_path = Self::find_config_file_path(CONFIG_FILE_NAME);
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Config> {
        if !config_path.exists() {
            eprintln!(
                "[warn] 配置文件不存在，使用默认配置与环境变量: {}",
                config_path.display()
            );
            return Ok(ConfigLoader::apply_env_overrides(Config::default()));
        }
        ConfigLoader::load_with_env_overrides(config_path)
    }

    /// 按部署角色验证，存在错误时中止启动
    pub fn validate(config: &Config) -> Result<ValidationReport> {
        let report = ConfigValidator::ensure_valid(config)?;
        for issue in &report.warnings {
            warn!("[warn] 配置警告 {}: {}", issue.field, issue.message);
        }
        for issue in &report.info {
            info!("配置信息 {}: {}", issue.field, issue.message);
        }
        info!("[ok] 配置验证通过 (角色: {})", config.deployment.role);
        Ok(report)
    }

    /// 初始化日志系统
    pub fn initialize_logging(config: &Config) -> Result<Option<WorkerGuard>> {
        let log_guard = log_init_with_config(LOG_FILE_PREFIX, &config.logging)?;
        info!("[ok] 日志系统初始化完成");
        Ok(log_guard)
    }

    /// 查找配置文件路径，适应开发和生产环境
    pub fn find_config_file_path(filename: &str) -> PathBuf {
        let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

        // 当前目录的 config/ 子目录（开发环境或部署根目录）
        let config_in_current = current_dir.join("config").join(filename);
        if config_in_current.exists() {
            return config_in_current;
        }

        // 在 bin/ 目录启动时使用上级目录的 config/
        if let Some(parent) = current_dir.parent() {
            let config_in_parent = parent.join("config").join(filename);
            if config_in_parent.exists() {
                return config_in_parent;
            }
        }

        // 可执行文件位于 bin/ 时检查部署根目录
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            if exe_dir.file_name() == Some(std::ffi::OsStr::new("bin")) {
                if let Some(project_root) = exe_dir.parent() {
                    let config_in_root = project_root.join("config").join(filename);
                    if config_in_root.exists() {
                        return config_in_root;
                    }
                }
            }
        }

        current_dir.join(filename)
    }
}
