//! 配置管理模块
//!
//! - types: 配置数据结构定义
//! - loader: 配置加载和环境变量处理
//! - validator: 按部署角色验证

pub mod loader;
pub mod types;
pub mod validator;

pub use loader::{ConfigLoader, CONFIG_FILE_NAME};
pub use types::*;
pub use validator::{ConfigValidator, ValidationIssue, ValidationReport};

impl Config {
    /// 从YAML文件读取配置
    pub fn read_yaml(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        ConfigLoader::read_yaml(path)
    }
}
