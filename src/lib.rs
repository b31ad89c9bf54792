//! webpilot CLI library surface.

pub mod cli_config;
pub mod errors;
pub mod report;

pub use agent_core::{AgentConfig, Orchestrator, RunResult};
pub use cli_config::CliConfig;
pub use errors::CliError;
pub use report::RunReporter;
