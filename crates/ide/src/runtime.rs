// ide/src/runtime.rs
use crate::IdeConfig;
use session::{Collaborators, ContractSession, SourceStore};
use simulator::{SimulatedChain, SimulatedChecker};
use std::sync::Arc;
use storage::FileStore;
use tokio::task::JoinHandle;
use tokio::time::Duration;

/// A session wired to the simulated chain and checker
pub struct Ide {
    config: IdeConfig,
    session: ContractSession,
    chain: SimulatedChain,
    producer: Option<JoinHandle<()>>,
}

impl Ide {
    pub fn new(config: IdeConfig, store: Arc<dyn SourceStore>) -> Self {
        tracing::info!("Initializing IDE components");

        let chain = SimulatedChain::new(&config.chain);
        let checker = SimulatedChecker::new(&config.checker);
        let session = ContractSession::new(
            config.session.clone(),
            Collaborators {
                checker: Arc::new(checker),
                store,
                backend: Arc::new(chain.clone()),
                chain: Arc::new(chain.clone()),
            },
        );

        Self {
            config,
            session,
            chain,
            producer: None,
        }
    }

    /// Sources persisted under the configured workspace directory
    pub fn with_workspace(config: IdeConfig) -> Self {
        let store = Arc::new(FileStore::new(&config.workspace_dir));
        Self::new(config, store)
    }

    /// Load the workspace and start block production
    pub async fn start(&mut self) -> anyhow::Result<usize> {
        let loaded = self.session.load_workspace().await?;

        let block_time = self.config.chain.block_time_ms;
        if block_time > 0 && self.producer.is_none() {
            self.producer = Some(
                self.chain
                    .spawn_block_producer(Duration::from_millis(block_time)),
            );
            tracing::info!("✓ Block producer started: every {}ms", block_time);
        }

        tracing::info!(
            "✓ IDE ready: {} sources in {}",
            loaded,
            self.config.workspace_dir
        );
        Ok(loaded)
    }

    pub fn stop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
            tracing::info!("Block producer stopped");
        }
    }

    pub fn config(&self) -> &IdeConfig {
        &self.config
    }

    pub fn session(&self) -> &ContractSession {
        &self.session
    }

    pub fn chain(&self) -> &SimulatedChain {
        &self.chain
    }
}

impl Drop for Ide {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storage::MemoryStore;

    #[tokio::test]
    async fn test_start_loads_sources() {
        let config = IdeConfig {
            chain: simulator::ChainConfig {
                block_time_ms: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        let store = Arc::new(MemoryStore::with_sources([("A", "contract A ()")]));
        let mut ide = Ide::new(config, store);

        assert_eq!(ide.start().await.unwrap(), 1);
        assert!(ide.session().read(|s| s.file("A").is_some()));
        assert_eq!(ide.session().chain().accounts.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_producer_runs_until_stopped() {
        let config = IdeConfig {
            chain: simulator::ChainConfig {
                block_time_ms: 100,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut ide = Ide::new(config, Arc::new(MemoryStore::new()));
        ide.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(ide.chain().block_num() >= 2);

        ide.stop();
        let height = ide.chain().block_num();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ide.chain().block_num(), height);
    }
}
