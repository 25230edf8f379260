//! HTTP surfaces
//!
//! Raw hyper http1 servers with hand-rolled routing, one module per
//! surface: the agent's consultation endpoint and the directory.

pub mod agent;
pub mod directory;
pub mod http;

pub use agent::{handle_agent_request, AgentState};
pub use directory::{handle_directory_request, DirectoryState};
pub use http::serve;
