// storage/src/file.rs

use crate::{validate_name, DEFAULT_EXTENSION};
use async_trait::async_trait;
use session::{PersistenceError, SourceStore};
use std::path::PathBuf;
use tokio::fs;

/// Stores each source as `<root>/<name>.<extension>`
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    extension: String,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.{}", name, self.extension))
    }

    fn io_error(name: &str, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            name: name.to_string(),
            source,
        }
    }
}

#[async_trait]
impl SourceStore for FileStore {
    async fn load_all(&self) -> Result<Vec<(String, String)>, PersistenceError> {
        if !fs::try_exists(&self.root).await.unwrap_or(false) {
            tracing::debug!("Workspace {} does not exist yet", self.root.display());
            return Ok(Vec::new());
        }

        let root = self.root.display().to_string();
        let mut entries = fs::read_dir(&self.root)
            .await
            .map_err(|e| Self::io_error(&root, e))?;

        let mut sources = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Self::io_error(&root, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension.as_str()) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_name(name).is_err() {
                continue;
            }

            let code = fs::read_to_string(&path)
                .await
                .map_err(|e| Self::io_error(name, e))?;
            sources.push((name.to_string(), code));
        }

        sources.sort_by(|a, b| a.0.cmp(&b.0));
        tracing::info!("Loaded {} sources from {}", sources.len(), root);
        Ok(sources)
    }

    async fn update(&self, name: &str, code: &str) -> Result<(), PersistenceError> {
        validate_name(name)?;

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Self::io_error(name, e))?;

        // Write then rename so readers never see a partial file
        let target = self.path_for(name);
        let temp = self.root.join(format!(".{}.{}.tmp", name, self.extension));
        fs::write(&temp, code)
            .await
            .map_err(|e| Self::io_error(name, e))?;
        fs::rename(&temp, &target)
            .await
            .map_err(|e| Self::io_error(name, e))?;

        tracing::debug!("Wrote {} bytes to {}", code.len(), target.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        store.update("Counter", "contract Counter ()").await.unwrap();
        store.update("Auction", "contract Auction ()").await.unwrap();
        store.update("Counter", "contract Counter (x : Uint32)").await.unwrap();

        let sources = store.load_all().await.unwrap();
        assert_eq!(
            sources,
            vec![
                ("Auction".to_string(), "contract Auction ()".to_string()),
                ("Counter".to_string(), "contract Counter (x : Uint32)".to_string()),
            ]
        );
        assert!(dir.path().join("Counter.scilla").exists());
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("not-yet"));

        assert!(store.load_all().await.unwrap().is_empty());

        store.update("A", "contract A ()").await.unwrap();
        assert_eq!(store.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join(".hidden.scilla"), "contract H ()").unwrap();

        let store = FileStore::new(dir.path());
        store.update("A", "contract A ()").await.unwrap();

        let names: Vec<_> = store
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["A"]);
    }

    #[tokio::test]
    async fn test_rejects_path_like_names() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path());

        for bad in ["../escape", "nested/name", ".hidden", ""] {
            assert!(matches!(
                store.update(bad, "x").await,
                Err(PersistenceError::InvalidName(_))
            ));
        }
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_extension() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).with_extension("scillib");

        store.update("Lib", "library Lib").await.unwrap();
        assert_eq!(store.path_for("Lib"), dir.path().join("Lib.scillib"));
        assert!(store.path_for("Lib").exists());
    }
}
