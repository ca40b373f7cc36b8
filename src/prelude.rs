//! Re-exports the most commonly used types of the crate.

#[cfg(feature = "vulkan")]
pub use ash::vk;

pub use crate::error::Error;

pub use crate::backend::{
    AcquireOutcome, GpuBackend, ImageIndex, ImageState, PresentOutcome,
};
#[cfg(feature = "vulkan")]
pub use crate::backend::vulkan::VulkanBackend;

pub use crate::scheduler::{FrameInfo, FrameScheduler, FrameStatus, FRAMES_IN_FLIGHT};
