pub mod agent;
pub mod conversation;
pub mod generator;
pub mod llm_service;
pub mod prompts;

pub use agent::{AgentError, AgentStats, TaskAgent};
pub use generator::PlanGenerator;
pub use llm_service::LlmService;
