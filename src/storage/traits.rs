use anyhow::Result;
use async_trait::async_trait;

/// 结构化内容类型
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// 存储后端trait，每个实例对应一个存储标识（bucket / 目录）
#[async_trait]
pub trait Storage: Send + Sync {
    /// 存储标识，作为 ObjectLocation.bucket 写入状态记录
    fn location(&self) -> &str;

    /// 写入对象，已存在时覆盖
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()>;

    /// 读取完整对象，不存在时返回 None
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 删除对象
    async fn delete(&self, key: &str) -> Result<()>;

    /// 检查对象是否存在
    async fn exists(&self, key: &str) -> Result<bool>;

    /// 健康检查
    async fn health_check(&self) -> Result<bool>;
}
