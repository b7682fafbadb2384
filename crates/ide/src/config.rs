// ide/src/config.rs
use serde::{Deserialize, Serialize};
use session::SessionConfig;
use simulator::{ChainConfig, CheckerConfig};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdeConfig {
    /// Directory holding the contract sources
    pub workspace_dir: String,
    pub session: SessionConfig,
    pub chain: ChainConfig,
    pub checker: CheckerConfig,
}

impl Default for IdeConfig {
    fn default() -> Self {
        Self {
            workspace_dir: "./contracts".into(),
            session: SessionConfig::default(),
            chain: ChainConfig::default(),
            checker: CheckerConfig::default(),
        }
    }
}

impl IdeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use session::CheckPolicy;
    use simulator::GenesisAccount;

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = IdeConfig::default();
        config.session.check_policy = CheckPolicy::Reject;
        config.chain.accounts.push(GenesisAccount {
            address: "0x00000000000000000000000000000000000000aa".into(),
            balance: 500,
        });
        config.to_file(&path).unwrap();

        assert_eq!(IdeConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: IdeConfig = toml::from_str(
            r#"
            workspace_dir = "./src"

            [chain]
            account_count = 1
            block_time_ms = 0

            [session]
            check_policy = "reject"
            "#,
        )
        .unwrap();

        assert_eq!(config.workspace_dir, "./src");
        assert_eq!(config.chain.account_count, 1);
        assert_eq!(config.chain.initial_balance, ChainConfig::default().initial_balance);
        assert_eq!(config.session.check_policy, CheckPolicy::Reject);
        assert_eq!(config.session.history_limit, 100);
        assert_eq!(config.checker, CheckerConfig::default());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(IdeConfig::from_file("/nonexistent/contract-ide.toml").is_err());
    }
}
