//! Exposes the deimos error type

use thiserror::Error;

/// Error type that deimos can return.
///
/// Per-frame errors are never retried internally: the scheduler assumes steady-state
/// success, and anything outside the recognized non-fatal presentation statuses
/// invalidates the device as a whole. Errors during [`shutdown()`](crate::FrameScheduler::shutdown)
/// are logged and swallowed instead, since nothing can usefully recover at that point.
#[derive(Error, Debug)]
pub enum Error {
    /// A required GPU object could not be created during scheduler initialization.
    /// Everything created before the failure has already been released.
    #[error("Failed to create {0} during scheduler initialization.")]
    InitFailed(&'static str),
    /// The device stopped responding or was removed. Continuing to submit work to a
    /// lost device is undefined behavior, so this is a hard stop.
    #[error("GPU device lost.")]
    DeviceLost,
    /// The presentation surface was invalidated, typically by a window resize.
    /// Swapchain recreation is the caller's responsibility; the scheduler only
    /// guarantees its slot state stays consistent when this is returned.
    #[error("Presentation surface is out of date.")]
    SurfaceOutOfDate,
    /// The presentation surface is gone entirely (e.g. the window was destroyed).
    #[error("Presentation surface was lost.")]
    SurfaceLost,
    /// The requested frame-in-flight window does not fit the presentation target.
    /// There must be at least one slot, and no more slots than presentable images.
    #[error("Invalid frame count {requested} for a presentation target with {images} images.")]
    InvalidFrameCount {
        /// Number of frame slots requested.
        requested: usize,
        /// Number of presentable images the backend exposes.
        images: usize,
    },
    /// The scheduler was already shut down; no further frames can be rendered.
    #[error("Frame scheduler was already shut down.")]
    ShutDown,
    /// Generic Vulkan error type.
    #[cfg(feature = "vulkan")]
    #[error("Vulkan error: `{0}`")]
    VkError(ash::vk::Result),
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

#[cfg(feature = "vulkan")]
impl From<ash::vk::Result> for Error {
    fn from(value: ash::vk::Result) -> Self {
        Error::VkError(value)
    }
}

// Backend errors cross thread boundaries in test harnesses and applications alike.
static_assertions::assert_impl_all!(Error: Send, Sync);
