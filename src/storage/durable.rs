use anyhow::{bail, Context, Result};
use std::fmt;
use std::sync::Arc;

use super::traits::Storage;
use crate::model::ObjectLocation;

/// 逻辑命名空间：原始层与处理层
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Raw,
    Processed,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Raw => "raw",
            Namespace::Processed => "processed",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 双命名空间持久化存储
///
/// 原始层只写一次：同一路径重复写入相同内容视为成功，内容不同则拒绝。
/// 处理层允许幂等覆盖。
#[derive(Clone)]
pub struct DurableStore {
    raw: Arc<dyn Storage>,
    processed: Arc<dyn Storage>,
}

impl DurableStore {
    pub fn new(raw: Arc<dyn Storage>, processed: Arc<dyn Storage>) -> Self {
        Self { raw, processed }
    }

    fn backend(&self, namespace: Namespace) -> &Arc<dyn Storage> {
        match namespace {
            Namespace::Raw => &self.raw,
            Namespace::Processed => &self.processed,
        }
    }

    /// 命名空间对应的存储标识
    pub fn location_of(&self, namespace: Namespace) -> &str {
        self.backend(namespace).location()
    }

    pub async fn put(
        &self,
        namespace: Namespace,
        key: &str,
        data: &[u8],
        content_type: &str,
    ) -> Result<ObjectLocation> {
        let backend = self.backend(namespace);

        if namespace == Namespace::Raw {
            if let Some(existing) = backend
                .get(key)
                .await
                .with_context(|| format!("Failed to check existing {} object {}", namespace, key))?
            {
                if existing == data {
                    tracing::debug!(namespace = %namespace, key = %key, "原始对象已存在且内容一致，跳过写入");
                    return Ok(ObjectLocation::new(backend.location(), key));
                }
                bail!(
                    "refusing to overwrite {} object {}/{} with different content",
                    namespace,
                    backend.location(),
                    key
                );
            }
        }

        backend
            .put(key, data, content_type)
            .await
            .with_context(|| format!("Failed to write {} object {}/{}", namespace, backend.location(), key))?;

        Ok(ObjectLocation::new(backend.location(), key))
    }

    /// 按位置读取完整对象
    ///
    /// 位置中的 bucket 必须是本实例管理的某个命名空间，对象不存在视为错误。
    pub async fn get(&self, location: &ObjectLocation) -> Result<Vec<u8>> {
        let backend = if location.bucket == self.raw.location() {
            &self.raw
        } else if location.bucket == self.processed.location() {
            &self.processed
        } else {
            bail!("unknown store location: {}", location.bucket);
        };

        backend
            .get(&location.key)
            .await
            .with_context(|| format!("Failed to read object {}", location))?
            .ok_or_else(|| anyhow::Error::new(ObjectMissing(location.clone())))
    }

    pub async fn health_check(&self) -> Result<bool> {
        let raw = self.raw.health_check().await?;
        let processed = self.processed.health_check().await?;
        Ok(raw && processed)
    }
}

/// 对象不存在，调用方可通过 downcast 区分
#[derive(Debug, Clone, thiserror::Error)]
#[error("object not found: {0}")]
pub struct ObjectMissing(pub ObjectLocation);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::traits::CONTENT_TYPE_JSON;

    fn store() -> (DurableStore, Arc<MemoryStorage>, Arc<MemoryStorage>) {
        let raw = Arc::new(MemoryStorage::new("bronze"));
        let processed = Arc::new(MemoryStorage::new("silver"));
        (
            DurableStore::new(raw.clone(), processed.clone()),
            raw,
            processed,
        )
    }

    #[tokio::test]
    async fn test_raw_is_write_once() {
        let (store, raw, _) = store();
        let location = store
            .put(Namespace::Raw, "raw/t/e-1.json", b"{\"a\":1}", CONTENT_TYPE_JSON)
            .await
            .unwrap();
        assert_eq!(location, ObjectLocation::new("bronze", "raw/t/e-1.json"));
        assert_eq!(raw.object("raw/t/e-1.json").unwrap().content_type, CONTENT_TYPE_JSON);

        // 相同内容幂等
        store
            .put(Namespace::Raw, "raw/t/e-1.json", b"{\"a\":1}", CONTENT_TYPE_JSON)
            .await
            .unwrap();

        // 不同内容拒绝
        let err = store
            .put(Namespace::Raw, "raw/t/e-1.json", b"{\"a\":2}", CONTENT_TYPE_JSON)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("refusing to overwrite"));
        assert_eq!(raw.get("raw/t/e-1.json").await.unwrap().unwrap(), b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_processed_overwrites() {
        let (store, _, processed) = store();
        store
            .put(Namespace::Processed, "silver/t/e-1.json", b"1", CONTENT_TYPE_JSON)
            .await
            .unwrap();
        store
            .put(Namespace::Processed, "silver/t/e-1.json", b"2", CONTENT_TYPE_JSON)
            .await
            .unwrap();
        assert_eq!(processed.object("silver/t/e-1.json").unwrap().data, b"2");
    }

    #[tokio::test]
    async fn test_get_missing_and_unknown() {
        let (store, _, _) = store();
        let err = store
            .get(&ObjectLocation::new("bronze", "raw/t/none.json"))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ObjectMissing>().is_some());

        let err = store
            .get(&ObjectLocation::new("elsewhere", "raw/t/none.json"))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<ObjectMissing>().is_none());
    }
}
