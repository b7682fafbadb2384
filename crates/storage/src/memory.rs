// storage/src/memory.rs

use crate::validate_name;
use async_trait::async_trait;
use session::{PersistenceError, SourceStore};
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

/// In-process source store; contents are lost when dropped
#[derive(Debug, Default)]
pub struct MemoryStore {
    sources: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sources<N, C>(sources: impl IntoIterator<Item = (N, C)>) -> Self
    where
        N: Into<String>,
        C: Into<String>,
    {
        Self {
            sources: Mutex::new(
                sources
                    .into_iter()
                    .map(|(name, code)| (name.into(), code.into()))
                    .collect(),
            ),
        }
    }

    pub fn get(&self, name: &str) -> Option<String> {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<(String, String)>, PersistenceError> {
        let sources = self.sources.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(sources
            .iter()
            .map(|(name, code)| (name.clone(), code.clone()))
            .collect())
    }

    async fn update(&self, name: &str, code: &str) -> Result<(), PersistenceError> {
        validate_name(name)?;
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), code.to_string());
        Ok(())
    }
}
