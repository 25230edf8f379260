//! HTTP clients for agents and the directory, spoken through a tunnel proxy

pub mod agent;
pub mod directory;

pub use agent::{AgentClient, AskOutcome};
pub use directory::{spawn_heartbeat_task, DirectoryClient};
