use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::traits::Storage;

/// 本地文件系统存储实现
///
/// 每个存储标识对应 `base_path/<location>` 目录。内容类型不单独落盘，
/// 读取方按约定按 JSON 解析。
pub struct LocalStorage {
    location: String,
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl AsRef<Path>, location: &str) -> Result<Self> {
        let root = base_path.as_ref().join(location);

        // 确保存储目录存在
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create storage directory: {}", root.display()))?;

        Ok(Self {
            location: location.to_string(),
            root,
        })
    }

    /// 获取对象的完整路径，拒绝跳出根目录的 key
    fn get_full_path(&self, key: &str) -> Result<PathBuf> {
        let relative = key.trim_start_matches('/');
        if relative.split('/').any(|segment| segment == "..") {
            anyhow::bail!("Invalid storage key: {}", key);
        }
        Ok(self.root.join(relative))
    }

    async fn ensure_parent_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create parent directory")?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    fn location(&self) -> &str {
        &self.location
    }

    async fn put(&self, key: &str, data: &[u8], _content_type: &str) -> Result<()> {
        let path = self.get_full_path(key)?;
        self.ensure_parent_dir(&path).await?;

        // 先写临时文件再重命名，读取方不会看到半截内容
        let tmp_path = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        fs::write(&tmp_path, data)
            .await
            .with_context(|| format!("Failed to write file: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .await
            .with_context(|| format!("Failed to finalize file: {}", path.display()))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.get_full_path(key)?;

        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read file: {}", path.display())),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.get_full_path(key)?;

        match fs::remove_file(&path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("Failed to delete file"),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.get_full_path(key)?;
        fs::try_exists(&path)
            .await
            .context("Failed to check file existence")
    }

    async fn health_check(&self) -> Result<bool> {
        self.root
            .try_exists()
            .context("Failed to check storage directory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_storage() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path(), "bronze").unwrap();
        assert_eq!(storage.location(), "bronze");

        let key = "raw/order.created/e-1.json";
        let data = br#"{"eventType":"order.created"}"#;

        storage.put(key, data, "application/json").await.unwrap();
        assert!(storage.exists(key).await.unwrap());
        assert!(temp_dir.path().join("bronze").join(key).exists());

        let retrieved = storage.get(key).await.unwrap().unwrap();
        assert_eq!(retrieved, data);

        storage.delete(key).await.unwrap();
        assert!(!storage.exists(key).await.unwrap());
        assert!(storage.get(key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejects_parent_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path(), "bronze").unwrap();
        assert!(storage.put("../escape.json", b"{}", "application/json").await.is_err());
    }
}
