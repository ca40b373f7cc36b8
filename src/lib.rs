//! Frame pacing and swapchain lifecycle management for explicit graphics APIs
//!
//! Modern explicit graphics APIs leave CPU/GPU frame synchronization entirely to the
//! application: how many frames may be recorded ahead of the GPU, when a backbuffer
//! image may be written to, and in what order resources may be torn down. Getting any
//! of this wrong produces validation errors at best and device loss at worst, and the
//! same fence/semaphore dance tends to get copy-pasted into every render loop.
//!
//! Deimos collapses that pattern into one parameterized implementation: a
//! [`FrameScheduler`] that owns the frame-in-flight window, the per-slot
//! synchronization primitives and the acquire → record → submit → present cycle.
//! Everything API-specific sits behind the [`GpuBackend`] trait, so the same
//! scheduler drives a Vulkan-style API (explicit semaphores) and a D3D12-style API
//! (a single stamped fence) with a single capability switch.
//!
//! # Example
//!
//! Driving a frame loop looks like this. The backend here is the [`ash`]-based
//! [`VulkanBackend`](crate::backend::vulkan::VulkanBackend), wrapping device and
//! swapchain handles the application created during startup.
//! ```no_run
//! # #[cfg(feature = "vulkan")]
//! # fn example(backend: deimos::backend::vulkan::VulkanBackend) -> anyhow::Result<()> {
//! use deimos::prelude::*;
//!
//! let mut scheduler = FrameScheduler::new(backend, 2)?;
//! loop {
//!     // The closure records this frame's commands. The scheduler has already
//!     // transitioned the acquired image to a renderable state, and will
//!     // transition it back to a presentable one after the closure returns.
//!     let status = scheduler.render_frame(|backend, cmd, frame| {
//!         // record draws / clears through the backend here
//!         Ok(())
//!     })?;
//!     if status == FrameStatus::SuboptimalSurface {
//!         // Non-fatal; the frame was still presented.
//!     }
//! #   break;
//! }
//! // Drains all in-flight GPU work before releasing anything.
//! scheduler.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! For further reading, check out the following modules
//! - [`scheduler`] for the frame scheduler itself and its slot model.
//! - [`backend`] for the collaborator interface a graphics API must implement.
//! - [`error`] for the error taxonomy.

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod backend;
pub mod error;
pub mod scheduler;
