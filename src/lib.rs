//! Colloquy - peer-to-peer consultation gateway
//!
//! Turns an agent's distilled working knowledge into a queryable expert
//! reachable over a tunnel, and runs a directory where such experts
//! register, heartbeat, and get discovered.
//!
//! ## Services
//!
//! - **Agent**: payment-gated consultation over retrieved knowledge artifacts
//! - **Directory**: agent registry with liveness sweeps and relevance-ranked
//!   discovery
//! - **Tunnel**: lifecycle management over a pluggable transport

pub mod client;
pub mod config;
pub mod consult;
pub mod discovery;
pub mod knowledge;
pub mod logging;
pub mod payment;
pub mod reasoning;
pub mod registry;
pub mod retrieval;
pub mod server;
pub mod sessions;
pub mod tunnel;
pub mod types;
pub mod wallet;

pub use config::{DirectoryArgs, ServeArgs};
pub use types::{ColloquyError, Result};
