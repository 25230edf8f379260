//! Consultation orchestration
//!
//! One gated question: retrieve relevant artifacts, resolve the
//! conversation session, synthesize an answer through the reasoning
//! collaborator, record the exchange.

pub mod handler;
pub mod synthesis;

pub use handler::{ConsultationHandler, ConsultationReply, ConsultationRequest};
