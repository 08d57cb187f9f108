//! Error types for headless context creation and binding

use crate::api::Backend;
use crate::config::ConfigError;
use thiserror::Error;

/// Headless context errors
///
/// None of these are fatal; callers decide whether to try another backend,
/// degrade, or abort startup.
#[derive(Error, Debug)]
pub enum HeadlessError {
    /// The native API could not produce a device (no GPU, driver refusal,
    /// missing loader)
    #[error("headless: failed to create {backend} device: {reason}")]
    DeviceUnavailable {
        /// Backend that was being constructed
        backend: Backend,
        /// Native error description
        reason: String,
    },

    /// The device was created but its command queue was not
    #[error("headless: failed to create {backend} queue: {reason}")]
    QueueCreation {
        /// Backend that was being constructed
        backend: Backend,
        /// Native error description
        reason: String,
    },

    /// A thread-affine context could not be bound to the calling thread
    #[error("headless: failed to make {backend} context current: {reason}")]
    MakeCurrent {
        /// Backend of the context
        backend: Backend,
        /// Native error description
        reason: String,
    },

    /// Bind attempted on a context that was already released
    #[error("headless: {0} context used after release")]
    ContextReleased(Backend),

    /// The requested backend is not part of this build
    #[error("headless: {0} backend is not compiled into this build")]
    BackendNotCompiled(Backend),

    /// Every backend in the probe order failed
    #[error("headless: no usable backend{}", summarize(.0))]
    NoBackend(Vec<HeadlessError>),

    /// Configuration could not be loaded or is invalid
    #[error("headless: configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl HeadlessError {
    pub(crate) fn device(backend: Backend, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            backend,
            reason: reason.into(),
        }
    }

    pub(crate) fn queue(backend: Backend, reason: impl Into<String>) -> Self {
        Self::QueueCreation {
            backend,
            reason: reason.into(),
        }
    }

    pub(crate) fn make_current(backend: Backend, reason: impl Into<String>) -> Self {
        Self::MakeCurrent {
            backend,
            reason: reason.into(),
        }
    }

    /// Backend the error is about, when it concerns a single one
    pub const fn backend(&self) -> Option<Backend> {
        match self {
            Self::DeviceUnavailable { backend, .. }
            | Self::QueueCreation { backend, .. }
            | Self::MakeCurrent { backend, .. } => Some(*backend),
            Self::ContextReleased(backend) | Self::BackendNotCompiled(backend) => Some(*backend),
            Self::NoBackend(_) | Self::Config(_) => None,
        }
    }
}

fn summarize(errors: &[HeadlessError]) -> String {
    if errors.is_empty() {
        return " (no backend was tried)".to_string();
    }
    let causes: Vec<String> = errors.iter().map(ToString::to_string).collect();
    format!(": {}", causes.join("; "))
}

/// Result type for headless operations
pub type HeadlessResult<T> = Result<T, HeadlessError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_mentions_device() {
        let error = HeadlessError::device(Backend::Metal, "no GPU");
        let message = error.to_string();
        assert!(message.contains("device"));
        assert!(message.contains("Metal"));
        assert!(message.starts_with("headless:"));
        assert_eq!(error.backend(), Some(Backend::Metal));
    }

    #[test]
    fn test_no_backend_lists_every_cause() {
        let error = HeadlessError::NoBackend(vec![
            HeadlessError::device(Backend::Vulkan, "loader missing"),
            HeadlessError::queue(Backend::Gl, "context refused"),
        ]);
        let message = error.to_string();
        assert!(message.contains("loader missing"));
        assert!(message.contains("context refused"));
        assert_eq!(error.backend(), None);
    }

    #[test]
    fn test_empty_no_backend_message() {
        let message = HeadlessError::NoBackend(Vec::new()).to_string();
        assert!(message.contains("no backend was tried"));
    }
}
