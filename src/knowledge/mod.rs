//! Knowledge artifact and expertise index models
//!
//! Both are produced offline (by the distillation pipeline and index
//! builder) and are read-only to the serving path.

pub mod artifact;
pub mod index;

pub use artifact::{ConfidenceLevel, KnowledgeArtifact, Outcome, CANONICAL_SECTIONS};
pub use index::{Depth, ExpertiseDomain, ExpertiseIndex};
