use std::sync::Arc;

pub mod api;
pub mod build_info;
pub mod db;
pub mod model;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod util;

use db::StatusStore;
use pipeline::IntakeService;
use storage::DurableStore;
use util::config::DeploymentRole;
use util::task_queue::WorkQueue;

/// 应用状态结构
///
/// 各能力以 trait object 注入，测试中可替换为内存实现。
#[derive(Clone)]
pub struct AppState {
    /// 仅 standalone / intake 角色存在
    pub intake: Option<IntakeService>,
    pub status: Arc<dyn StatusStore>,
    pub store: DurableStore,
    pub queue: Option<Arc<dyn WorkQueue>>,
    pub role: DeploymentRole,
}
