use thiserror::Error;

pub type Result<T> = std::result::Result<T, KbError>;

#[derive(Error, Debug)]
pub enum KbError {
    #[error("Failed to read knowledge base {path}: {reason}")]
    ReadFailed { path: String, reason: String },

    #[error("Invalid knowledge base {path}: {reason}")]
    InvalidFormat { path: String, reason: String },

    #[error("Duplicate chunk id '{id}' with conflicting content ({first} vs {second})")]
    DuplicateId {
        id: String,
        first: String,
        second: String,
    },
}
