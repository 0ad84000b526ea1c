//! Error types shared by the cache, the builders and the record/replay log
//!
//! Three failure families exist: a backend rejecting a description
//! ([`ResourceError::BuildFailure`]), a description violating one of its own
//! invariants ([`ResourceError::InvalidDescription`]) and a recorded log that
//! cannot be decoded ([`ResourceError::MalformedLog`]). Unsupported records found
//! during replay are not errors; see [`crate::record::UnsupportedRecord`].

use ash::vk;
use thiserror::Error;

use crate::record::ResourceType;
use crate::resources::ResourceId;

/// Error reported by a [`crate::backend::Backend`] when it cannot create a native object
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} ({code:?})")]
pub struct BackendError {
    /// Native result code, propagated untouched
    pub code: vk::Result,
    /// Human readable description of the failure
    pub message: String,
}

impl BackendError {
    /// Create a backend error from a result code and a message
    pub fn new(code: vk::Result, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<vk::Result> for BackendError {
    fn from(code: vk::Result) -> Self {
        Self::new(code, "Vulkan call failed")
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Reasons a recorded log cannot be replayed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedLog {
    /// The stream ended in the middle of a record
    #[error("stream truncated at byte {offset}: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        /// Byte offset where the read started
        offset: usize,
        /// Number of bytes the read required
        needed: usize,
        /// Number of bytes left in the stream
        remaining: usize,
    },

    /// A back-reference points past the objects replayed so far
    #[error("{resource_type} index {index} out of range ({len} replayed)")]
    IndexOutOfRange {
        /// Table the index was resolved against
        resource_type: ResourceType,
        /// The recorded index
        index: u64,
        /// Number of entries in the table at resolution time
        len: usize,
    },

    /// A string field is not valid UTF-8
    #[error("invalid UTF-8 string at byte {offset}")]
    InvalidUtf8 {
        /// Byte offset of the string payload
        offset: usize,
    },

    /// A boolean field holds something other than 0 or 1
    #[error("invalid boolean {value} at byte {offset}")]
    InvalidBool {
        /// Byte offset of the field
        offset: usize,
        /// The raw value found
        value: u32,
    },

    /// Strict replay found a tag it has no handler for
    #[error("unsupported record tag {tag} at byte {offset}")]
    UnsupportedTag {
        /// The raw tag value
        tag: u32,
        /// Byte offset of the tag
        offset: usize,
    },
}

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The backend rejected a description; nothing was cached
    #[error("{operation}: {source}")]
    BuildFailure {
        /// Name of the failed operation, e.g. "Cannot create RenderPass"
        operation: &'static str,
        /// Error returned by the backend
        #[source]
        source: BackendError,
    },

    /// The description violates one of its validity invariants
    #[error("Invalid description: {reason}")]
    InvalidDescription {
        /// Which invariant was violated
        reason: String,
    },

    /// A recording referenced an object this recording session never indexed
    #[error("{resource_type} {id} has no index in this recording")]
    UnrecordedResource {
        /// Type of the referenced object
        resource_type: ResourceType,
        /// Identity of the referenced object
        id: ResourceId,
    },

    /// The recorded log could not be decoded
    #[error("Malformed log: {0}")]
    MalformedLog(#[from] MalformedLog),
}

impl ResourceError {
    /// Shorthand for [`ResourceError::InvalidDescription`]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidDescription {
            reason: reason.into(),
        }
    }

    /// Whether retrying the same request may succeed
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::BuildFailure { .. })
    }
}

/// Result type for cache, record and replay operations
pub type ResourceResult<T> = Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_failure_names_operation() {
        let error = ResourceError::BuildFailure {
            operation: "Cannot create RenderPass",
            source: BackendError::new(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY, "device lost its memory"),
        };

        let message = error.to_string();
        assert!(message.starts_with("Cannot create RenderPass"));
        assert!(message.contains("device lost its memory"));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_malformed_log_is_not_retryable() {
        let error: ResourceError = MalformedLog::IndexOutOfRange {
            resource_type: ResourceType::ShaderModule,
            index: 4,
            len: 2,
        }
        .into();

        assert!(!error.is_retryable());
        assert!(error.to_string().contains("index 4"));
    }
}
