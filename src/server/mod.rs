//! 服务器模块
//!
//! - 配置管理 (config.rs)
//! - HTTP服务器设置 (http.rs)
//!
//! 按部署角色组装管道：standalone 同进程运行接入与 worker，
//! intake 只接收事件，worker 只消费队列。

pub mod config;
pub mod http;

pub use config::ConfigManager;
pub use http::{HttpServer, ServerManager};

use crate::build_info;
use crate::db::{create_status_store, StatusStore};
use crate::pipeline::{Clock, IntakeService, ProcessingWorker, SystemClock, WorkerSettings};
use crate::storage::{create_durable_store, DurableStore};
use crate::util::config::{Config, DeploymentRole};
use crate::util::notification::create_notification_bus;
use crate::util::task_queue::{initialize_task_queue, start_queue_worker, BatchHandler};
use crate::AppState;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;

/// 服务器引导程序 - 统一的启动入口
pub struct ServerBootstrap {
    config: Config,
    _log_guard: Option<WorkerGuard>,
}

impl ServerBootstrap {
    /// 加载配置、初始化日志并按角色验证
    pub async fn new() -> Result<Self> {
        let config = ConfigManager::load()?;
        let log_guard = ConfigManager::initialize_logging(&config)?;
        ConfigManager::validate(&config)?;

        Ok(Self {
            config,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 按部署角色启动
    pub async fn start(self) -> Result<()> {
        info!("=== EDCP服务启动 ===");
        info!("版本信息: {}", build_info::summary());
        info!(
            "部署角色: {} (节点: {})",
            self.config.deployment.role, self.config.deployment.node_id
        );

        match self.config.deployment.role {
            DeploymentRole::Standalone | DeploymentRole::Intake => self.serve_http().await,
            DeploymentRole::Worker => run_worker(&self.config).await,
        }
    }

    async fn serve_http(&self) -> Result<()> {
        let components = PipelineComponents::build(&self.config).await?;
        let app_state = build_app_state(&self.config, components).await?;
        let server = ServerManager::create_server(&self.config.server, app_state).await?;
        info!("服务地址: http://{}", server.local_addr());
        ServerManager::start_server(server).await
    }
}

/// 管道共用的存储与时钟
#[derive(Clone)]
pub struct PipelineComponents {
    pub store: DurableStore,
    pub status: Arc<dyn StatusStore>,
    pub clock: Arc<dyn Clock>,
}

impl PipelineComponents {
    pub async fn build(config: &Config) -> Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = create_durable_store(&config.storage).context("初始化持久化存储失败")?;
        let status = create_status_store(&config.database, clock.clone())
            .await
            .context("初始化状态存储失败")?;
        Ok(Self {
            store,
            status,
            clock,
        })
    }
}

/// 创建处理层 worker
pub async fn build_worker(
    config: &Config,
    components: &PipelineComponents,
) -> Result<Arc<ProcessingWorker>> {
    let bus = create_notification_bus(&config.notification)
        .await
        .context("初始化通知总线失败")?;
    let settings = WorkerSettings {
        topic: config.notification.topic.clone(),
        policy: config.worker.failure_policy,
        max_deliver: config.task_queue.max_deliver(),
    };
    info!(
        "[ok] worker 就绪: 策略={:?}, 最大投递次数={}, 通知 topic={}",
        settings.policy, settings.max_deliver, settings.topic
    );
    Ok(Arc::new(ProcessingWorker::new(
        components.store.clone(),
        components.status.clone(),
        bus,
        components.clock.clone(),
        settings,
    )))
}

/// 组装 HTTP 接入所需的应用状态
///
/// standalone 角色同时在进程内挂载 worker 作为队列消费者。
pub async fn build_app_state(config: &Config, components: PipelineComponents) -> Result<AppState> {
    let role = config.deployment.role;

    let handler: Option<Arc<dyn BatchHandler>> = match role {
        DeploymentRole::Standalone => {
            Some(build_worker(config, &components).await? as Arc<dyn BatchHandler>)
        }
        _ => None,
    };

    let queue = initialize_task_queue(&config.task_queue, handler)
        .await
        .context("初始化任务队列失败")?;
    info!("[ok] 任务队列就绪: {}", queue.driver());

    let intake = role.runs_intake().then(|| {
        IntakeService::new(
            components.store.clone(),
            components.status.clone(),
            queue.clone(),
            components.clock.clone(),
        )
    });

    Ok(AppState {
        intake,
        status: components.status,
        store: components.store,
        queue: Some(queue),
        role,
    })
}

/// 独立 worker 进程：持续消费队列直到收到退出信号
pub async fn run_worker(config: &Config) -> Result<()> {
    let components = PipelineComponents::build(config).await?;
    let worker = build_worker(config, &components).await?;

    tokio::select! {
        result = start_queue_worker(&config.task_queue, worker) => result,
        _ = http::shutdown_signal() => {
            info!("worker 收到退出信号，停止消费");
            Ok(())
        }
    }
}

/// 启动服务（按配置中的部署角色）
pub async fn start_server() -> Result<()> {
    let bootstrap = ServerBootstrap::new().await?;
    bootstrap.start().await
}

/// 以 worker 角色启动，忽略配置中的角色声明
pub async fn start_worker() -> Result<()> {
    let mut config = ConfigManager::load()?;
    if config.deployment.role != DeploymentRole::Worker {
        eprintln!(
            "[warn] 配置声明的角色为 {}，按 worker 启动",
            config.deployment.role
        );
        config.deployment.role = DeploymentRole::Worker;
    }
    let _log_guard = ConfigManager::initialize_logging(&config)?;
    ConfigManager::validate(&config)?;

    info!("=== EDCP Worker 启动 ===");
    info!("版本信息: {}", build_info::summary());
    run_worker(&config).await
}

/// 系统健康检查报告
#[derive(Debug, Clone)]
pub struct SystemHealthReport {
    pub overall_healthy: bool,
    pub status_store_healthy: bool,
    pub storage_healthy: bool,
}

/// 一次性检查状态存储与持久化存储
pub async fn check_system_health() -> Result<SystemHealthReport> {
    let config = ConfigManager::load()?;
    let components = PipelineComponents::build(&config).await?;

    let status_store_healthy = match components.status.health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            warn!("状态存储健康检查失败: {}", e);
            false
        }
    };
    let storage_healthy = match components.store.health_check().await {
        Ok(healthy) => healthy,
        Err(e) => {
            warn!("存储健康检查失败: {:#}", e);
            false
        }
    };

    Ok(SystemHealthReport {
        overall_healthy: status_store_healthy && storage_healthy,
        status_store_healthy,
        storage_healthy,
    })
}
