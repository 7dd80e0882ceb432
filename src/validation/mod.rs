pub mod audit;
pub mod confidence;
pub mod database;
pub mod format;
pub mod matcher;

pub use audit::{AuditLog, JsonLinesAuditLog, MemoryAuditLog};
pub use confidence::ConfidenceScorer;
pub use database::{InMemoryRegistry, Registry};
pub use format::FormatValidator;
pub use matcher::{token_set_similarity, CandidateMatcher};
