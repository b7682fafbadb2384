// simulator/src/checker.rs

use crate::parse::check_source;
use async_trait::async_trait;
use diagnostics::CheckResult;
use serde::{Deserialize, Serialize};
use session::Checker;
use tokio::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerConfig {
    /// Artificial delay before every check
    pub latency_ms: u64,
}

/// Type-checker backed by the local source analyser
#[derive(Debug, Clone, Default)]
pub struct SimulatedChecker {
    latency: Duration,
}

impl SimulatedChecker {
    pub fn new(config: &CheckerConfig) -> Self {
        Self {
            latency: Duration::from_millis(config.latency_ms),
        }
    }
}

#[async_trait]
impl Checker for SimulatedChecker {
    async fn check(&self, code: &str) -> CheckResult {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let result = check_source(code);
        tracing::debug!(
            "Checked {} bytes: {} diagnostics",
            code.len(),
            result.diagnostics().len()
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diagnostics::Diagnostic;

    #[tokio::test]
    async fn test_reports_diagnostics() {
        let checker = SimulatedChecker::default();

        let result = checker.check("contract A ()\ntransition T ()\n").await;
        assert_eq!(
            result,
            CheckResult::fail(vec![Diagnostic::new(
                2,
                1,
                "'transition' is missing its 'end'"
            )])
        );
        assert_eq!(result.to_error().unwrap()[0].line, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_applied() {
        let checker = SimulatedChecker::new(&CheckerConfig { latency_ms: 250 });
        let started = tokio::time::Instant::now();

        assert!(checker.check("contract A ()").await.is_success());
        assert!(started.elapsed() >= Duration::from_millis(250));
    }
}
