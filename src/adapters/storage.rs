use crate::domain::ports::Storage;
use crate::utils::error::Result;
use std::path::{Path, PathBuf};

/// 本機檔案儲存，用於寫入資料快照
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub async fn exists(&self, path: &str) -> bool {
        tokio::fs::try_exists(self.base_path.join(path))
            .await
            .unwrap_or(false)
    }
}

impl Storage for LocalStorage {
    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.base_path.join(path);
        let data = tokio::fs::read(full_path).await?;
        Ok(data)
    }

    async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
        let full_path = self.base_path.join(path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // 先寫暫存檔再改名，避免中斷時留下半份快照
        let tmp_path = full_path.with_extension("tmp");
        tokio::fs::write(&tmp_path, data).await?;
        tokio::fs::rename(&tmp_path, &full_path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_then_read_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        storage
            .write_file("nested/snapshot.json", b"{\"ok\":true}")
            .await
            .unwrap();

        assert!(storage.exists("nested/snapshot.json").await);
        assert!(!storage.exists("nested/snapshot.tmp").await);
        let data = storage.read_file("nested/snapshot.json").await.unwrap();
        assert_eq!(data, b"{\"ok\":true}");
    }

    #[tokio::test]
    async fn test_read_missing_file_is_io_error() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalStorage::new(temp_dir.path());

        let err = storage.read_file("missing.json").await.unwrap_err();
        assert!(matches!(err, crate::utils::error::MarktError::IoError(_)));
    }
}
