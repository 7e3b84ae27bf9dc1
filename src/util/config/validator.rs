//! 配置验证模块
//! 按部署角色检查启动所需的配置项

use super::types::*;
use crate::db::sqlite::schemas::SchemaManager;
use crate::pipeline::PipelineError;
use url::Url;

/// 配置验证器
pub struct ConfigValidator;

impl ConfigValidator {
    /// 按部署角色验证配置
    ///
    /// 接入需要原始层存储、状态表和队列；worker 另需处理层存储和通知 topic。
    pub fn validate_for_role(config: &Config) -> ValidationReport {
        let mut report = ValidationReport::new();
        let role = config.deployment.role;

        if role.runs_intake() {
            Self::validate_server_config(&config.server, &mut report);
        }

        Self::validate_storage_config(&config.storage, role, &mut report);
        Self::validate_database_config(&config.database, &mut report);
        Self::validate_queue_config(&config.task_queue, role, &mut report);

        if role.runs_worker() {
            Self::validate_notification_config(config, &mut report);
        }

        Self::validate_logging_config(&config.logging, &mut report);

        report.add_info("deployment.role", role.as_str());
        report
    }

    /// 验证并转换为启动错误
    pub fn ensure_valid(config: &Config) -> Result<ValidationReport, PipelineError> {
        let report = Self::validate_for_role(config);
        if report.has_errors() {
            let summary = report
                .errors
                .iter()
                .map(|issue| format!("{}: {}", issue.field, issue.message))
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PipelineError::Configuration(summary));
        }
        Ok(report)
    }

    fn validate_server_config(server: &ServerConfig, report: &mut ValidationReport) {
        if server.port == 0 {
            report.add_error("server.port", &format!("无效的端口号: {}", server.port));
        }
        if server.max_body_bytes == 0 {
            report.add_error("server.max_body_bytes", "请求体上限必须大于0");
        }
        if server.request_timeout_secs == 0 {
            report.add_warning("server.request_timeout_secs", "请求超时为0，将使用默认值");
        }
    }

    fn validate_storage_config(
        storage: &StorageConfig,
        role: DeploymentRole,
        report: &mut ValidationReport,
    ) {
        if storage.raw_bucket.trim().is_empty() {
            report.add_error("storage.raw_bucket", "未配置原始层存储标识");
        }

        if role.runs_worker() && storage.processed_bucket.trim().is_empty() {
            report.add_error("storage.processed_bucket", "worker 需要配置处理层存储标识");
        }

        if !storage.raw_bucket.is_empty() && storage.raw_bucket == storage.processed_bucket {
            report.add_warning(
                "storage.processed_bucket",
                "原始层与处理层使用同一存储，依靠 raw/ 与 silver/ 前缀区分",
            );
        }

        match storage.driver {
            StorageDriver::Oss => match &storage.oss {
                Some(oss) => {
                    if oss.endpoint.trim().is_empty() {
                        report.add_error("storage.oss.endpoint", "OSS端点为空");
                    }
                    if oss.access_key_id.is_empty() || oss.access_key_secret.is_empty() {
                        report.add_error("storage.oss", "OSS访问密钥未配置");
                    }
                }
                None => report.add_error("storage.oss", "OSS驱动缺少 oss 配置段"),
            },
            StorageDriver::Local => {
                if storage.local.base_path.trim().is_empty() {
                    report.add_error("storage.local.base_path", "本地存储路径为空");
                }
            }
            StorageDriver::Memory => {
                report.add_warning("storage.driver", "内存存储不持久化，仅用于测试");
            }
        }
    }

    fn validate_database_config(database: &DatabaseConfig, report: &mut ValidationReport) {
        if database.events_table.trim().is_empty() {
            report.add_error("database.events_table", "未配置状态表名");
        } else if SchemaManager::validate_table_name(&database.events_table).is_err() {
            report.add_error(
                "database.events_table",
                &format!("状态表名只允许字母、数字和下划线: {}", database.events_table),
            );
        }

        match database.driver {
            StatusStoreDriver::Sqlite => {
                if database.sqlite.path.trim().is_empty() {
                    report.add_error("database.sqlite.path", "SQLite 路径为空");
                }
                if database.sqlite.max_connections == 0 {
                    report.add_error("database.sqlite.max_connections", "连接数必须大于0");
                }
            }
            StatusStoreDriver::Memory => {
                report.add_warning("database.driver", "内存状态存储不持久化，仅用于测试");
            }
        }
    }

    fn validate_queue_config(
        queue: &TaskQueueConfig,
        role: DeploymentRole,
        report: &mut ValidationReport,
    ) {
        match queue.driver {
            TaskQueueDriver::Local => {
                if role != DeploymentRole::Standalone {
                    report.add_error(
                        "task_queue.driver",
                        &format!("{} 角色需要跨进程队列，local 仅适用于 standalone", role),
                    );
                }
                if queue.local.max_batch == 0 {
                    report.add_error("task_queue.local.max_batch", "批大小必须大于0");
                }
            }
            TaskQueueDriver::Nats => match &queue.nats {
                Some(nats) => {
                    Self::validate_nats_url("task_queue.nats.server_url", &nats.server_url, report);
                    if nats.subject.trim().is_empty() {
                        report.add_error("task_queue.nats.subject", "未配置队列 subject");
                    }
                    if nats.stream.trim().is_empty() {
                        report.add_error("task_queue.nats.stream", "未配置 JetStream stream");
                    }
                    if nats.max_deliver < 1 {
                        report.add_error("task_queue.nats.max_deliver", "最大投递次数必须至少为1");
                    }
                    if nats.max_batch == 0 {
                        report.add_error("task_queue.nats.max_batch", "批大小必须大于0");
                    }
                }
                None => report.add_error("task_queue.nats", "NATS 驱动缺少 nats 配置段"),
            },
        }
    }

    fn validate_notification_config(config: &Config, report: &mut ValidationReport) {
        let notification = &config.notification;
        if notification.topic.trim().is_empty() {
            report.add_error("notification.topic", "worker 需要配置通知 topic");
        }

        if notification.driver == NotificationDriver::Nats {
            match notification.nats_url.as_deref() {
                Some(url) if !url.trim().is_empty() => {
                    Self::validate_nats_url("notification.nats_url", url, report)
                }
                _ => report.add_error("notification.nats_url", "NATS 通知总线缺少服务器地址"),
            }
        }
    }

    fn validate_nats_url(field: &str, value: &str, report: &mut ValidationReport) {
        match Url::parse(value) {
            Ok(url) if matches!(url.scheme(), "nats" | "tls" | "ws" | "wss") => {}
            Ok(url) => report.add_error(
                field,
                &format!("不支持的 NATS 协议: {}", url.scheme()),
            ),
            Err(e) => report.add_error(field, &format!("NATS 地址解析失败: {}", e)),
        }
    }

    fn validate_logging_config(config: &LoggingConfig, report: &mut ValidationReport) {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.level.to_ascii_lowercase().as_str()) {
            report.add_warning("logging.level", &format!("未知的日志级别: {}", config.level));
        }
        if config.file.enabled && config.file.directory.trim().is_empty() {
            report.add_error("logging.file.directory", "日志目录为空");
        }
    }
}

/// 验证报告
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
    pub info: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, field: &str, message: &str) {
        self.errors.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn add_info(&mut self, field: &str, message: &str) {
        self.info.push(ValidationIssue {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn is_valid(&self) -> bool {
        !self.has_errors()
    }

    fn has_error_for(&self, field: &str) -> bool {
        self.errors.iter().any(|issue| issue.field == field)
    }
}

/// 验证问题
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config(role: DeploymentRole) -> Config {
        let mut config = Config::default();
        config.deployment.role = role;
        config.storage.raw_bucket = "bronze".to_string();
        config.storage.processed_bucket = "silver".to_string();
        config.database.events_table = "event_status".to_string();
        config.notification.topic = "edcp-bus".to_string();
        if role != DeploymentRole::Standalone {
            config.task_queue.driver = TaskQueueDriver::Nats;
            config.task_queue.nats = Some(NatsQueueConfig {
                subject: "edcp.events".to_string(),
                ..NatsQueueConfig::default()
            });
        }
        config
    }

    #[test]
    fn test_complete_configs_are_valid() {
        for role in [
            DeploymentRole::Standalone,
            DeploymentRole::Intake,
            DeploymentRole::Worker,
        ] {
            let report = ConfigValidator::validate_for_role(&base_config(role));
            assert!(report.is_valid(), "{}: {:?}", role, report.errors);
        }
    }

    #[test]
    fn test_intake_requirements() {
        let mut config = base_config(DeploymentRole::Intake);
        config.storage.raw_bucket.clear();
        config.storage.processed_bucket.clear();
        config.database.events_table.clear();
        config.notification.topic.clear();
        config.task_queue.nats = None;

        let report = ConfigValidator::validate_for_role(&config);
        assert!(report.has_error_for("storage.raw_bucket"));
        assert!(report.has_error_for("database.events_table"));
        assert!(report.has_error_for("task_queue.nats"));
        // 接入节点不需要处理层和通知配置
        assert!(!report.has_error_for("storage.processed_bucket"));
        assert!(!report.has_error_for("notification.topic"));
    }

    #[test]
    fn test_worker_requirements() {
        let mut config = base_config(DeploymentRole::Worker);
        config.storage.processed_bucket.clear();
        config.notification.topic.clear();

        let report = ConfigValidator::validate_for_role(&config);
        assert!(report.has_error_for("storage.processed_bucket"));
        assert!(report.has_error_for("notification.topic"));
    }

    #[test]
    fn test_local_queue_only_for_standalone() {
        let mut config = base_config(DeploymentRole::Worker);
        config.task_queue.driver = TaskQueueDriver::Local;
        let report = ConfigValidator::validate_for_role(&config);
        assert!(report.has_error_for("task_queue.driver"));
    }

    #[test]
    fn test_rejects_unsafe_table_and_bad_nats_url() {
        let mut config = base_config(DeploymentRole::Intake);
        config.database.events_table = "events; DROP TABLE x".to_string();
        if let Some(nats) = config.task_queue.nats.as_mut() {
            nats.server_url = "http://queue:4222".to_string();
        }
        let report = ConfigValidator::validate_for_role(&config);
        assert!(report.has_error_for("database.events_table"));
        assert!(report.has_error_for("task_queue.nats.server_url"));
    }

    #[test]
    fn test_ensure_valid_returns_configuration_error() {
        let mut config = base_config(DeploymentRole::Standalone);
        config.storage.raw_bucket.clear();
        let err = ConfigValidator::ensure_valid(&config).unwrap_err();
        match err {
            PipelineError::Configuration(message) => {
                assert!(message.contains("storage.raw_bucket"))
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
