use anyhow::Result;
use async_trait::async_trait;

/// Text generation backend used by the agent.
///
/// Both calls may be slow (seconds) and may fail; callers decide how
/// failures are masked.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PlanGenerator: Send + Sync {
    /// Produce a study plan for `query`, given the prepared conversation context.
    async fn generate_plan(&self, query: &str, context: &str) -> Result<String>;

    /// Condense serialized history into a short summary.
    async fn generate_summary(&self, history: &str) -> Result<String>;
}
