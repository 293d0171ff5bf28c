//! Command recording error types.

use std::fmt;

/// Errors that can occur while recording or submitting GPU commands.
///
/// Bookkeeping mistakes made by the caller (an out-of-range subresource index,
/// a contradictory state set) are not represented here: they panic at the
/// point of staging. Everything in this enum comes from the platform or from
/// using a context in the wrong lifecycle phase, and is fatal for the frame
/// being recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphicsError {
    /// Failed to initialize a backend object (command pool, fence, ...).
    InitializationFailed(String),
    /// Out of GPU or host memory.
    OutOfMemory,
    /// The GPU device was lost.
    DeviceLost,
    /// An invalid parameter was provided.
    InvalidParameter(String),
    /// The operation is not allowed in the current state of the object,
    /// e.g. recording into a closed context.
    InvalidOperation(String),
    /// The platform rejected a recorded command.
    CommandRecordingFailed(String),
    /// Submitting command lists to the queue failed.
    SubmissionFailed(String),
    /// An internal error occurred.
    Internal(String),
}

impl fmt::Display for GraphicsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::OutOfMemory => write!(f, "out of GPU memory"),
            Self::DeviceLost => write!(f, "GPU device lost"),
            Self::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Self::InvalidOperation(msg) => write!(f, "invalid operation: {msg}"),
            Self::CommandRecordingFailed(msg) => write!(f, "command recording failed: {msg}"),
            Self::SubmissionFailed(msg) => write!(f, "submission failed: {msg}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for GraphicsError {}

#[cfg(feature = "vulkan-backend")]
impl From<ash::vk::Result> for GraphicsError {
    fn from(result: ash::vk::Result) -> Self {
        use ash::vk;
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => {
                Self::OutOfMemory
            }
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            other => Self::Internal(format!("vulkan call failed: {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = GraphicsError::OutOfMemory;
        assert_eq!(err.to_string(), "out of GPU memory");

        let err = GraphicsError::InvalidOperation("context is closed".to_string());
        assert_eq!(err.to_string(), "invalid operation: context is closed");
    }

    #[cfg(feature = "vulkan-backend")]
    #[test]
    fn test_vulkan_result_mapping() {
        use ash::vk;
        assert_eq!(
            GraphicsError::from(vk::Result::ERROR_DEVICE_LOST),
            GraphicsError::DeviceLost
        );
        assert_eq!(
            GraphicsError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            GraphicsError::OutOfMemory
        );
    }
}
