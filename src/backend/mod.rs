//! The collaborator interface between the frame scheduler and a concrete graphics API.
//!
//! The scheduler never talks to a graphics API directly. Everything it needs — a
//! presentation target that hands out images, a queue that accepts submissions, and
//! the synchronization primitives tying the two together — is consumed through the
//! [`GpuBackend`] trait. The trait is statically resolved: an application picks its
//! backend at build/config time and the scheduler monomorphizes over it, since the
//! backend never changes after startup.
//!
//! The one real difference between the two explicit API styles is captured by
//! [`GpuBackend::GPU_ORDERING_SEMAPHORES`]. Vulkan-style APIs order GPU work against
//! the presentation engine with explicit binary semaphores; D3D12-style APIs rely on
//! queue submission order plus a single monotonically stamped fence. The scheduler
//! creates semaphores only when the capability is set, and the rest of the protocol
//! is shared.

#[cfg(feature = "vulkan")]
pub mod vulkan;

use anyhow::Result;

/// Index of a presentable image, chosen by the presentation engine on acquire.
///
/// This index is independent of the scheduler's frame slot index and may repeat out
/// of round-robin order; only the presentation engine knows which image is free.
pub type ImageIndex = u32;

/// Logical state of a presentable image, as tracked by the scheduler.
///
/// An image must be transitioned to [`RenderTarget`](ImageState::RenderTarget)
/// before any command references it, and back to
/// [`PresentReady`](ImageState::PresentReady) before it is presented. The
/// [`Undefined`](ImageState::Undefined) state only ever appears as the source of an
/// image's very first transition; transitioning from a state the image was never
/// actually in is a validation error on both API styles.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ImageState {
    /// Never touched by the GPU. The initial state of every swapchain image.
    Undefined,
    /// Writable as a color target.
    RenderTarget,
    /// Handed over to the presentation engine.
    PresentReady,
}

/// Outcome of acquiring the next presentable image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is available for rendering.
    Acquired(ImageIndex),
    /// The surface was invalidated (e.g. window resize). No image was acquired.
    OutOfDate,
    /// The surface is gone. No image was acquired.
    Lost,
}

/// Outcome of presenting an image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The frame was presented.
    Optimal,
    /// The frame was presented, but the surface no longer matches the swapchain
    /// exactly. Safe to ignore and continue.
    Suboptimal,
    /// The surface was invalidated. The frame's GPU work was still submitted.
    OutOfDate,
    /// The surface is gone.
    Lost,
}

/// Interface the frame scheduler consumes from a graphics API.
///
/// Implementations provide three groups of operations: synchronization primitives
/// (fences and, where the API uses them, semaphores), command recording, and the
/// presentation target. All resource creation happens during scheduler
/// initialization and all destruction during shutdown; the per-frame hot path only
/// waits, records, submits and presents.
///
/// The scheduler is driven by a single thread, so all methods take `&mut self`.
pub trait GpuBackend {
    /// CPU-waitable completion token, signaled by the GPU.
    type Fence;
    /// GPU-GPU ordering token. Never CPU-waitable.
    type Semaphore;
    /// Reusable command-recording buffer.
    type CommandList;

    /// Whether this API expresses GPU-GPU ordering with explicit semaphores.
    ///
    /// When `false`, the scheduler creates no semaphores and passes `None` for every
    /// wait/signal argument: queue submission order together with the stamped fence
    /// is assumed to order rendering against presentation (D3D12 style).
    const GPU_ORDERING_SEMAPHORES: bool;

    /// Number of presentable images owned by the presentation target.
    fn image_count(&self) -> usize;

    /// Create a fence, optionally in the already-signaled state.
    fn create_fence(&mut self, signaled: bool) -> Result<Self::Fence>;

    /// Create a semaphore. Only called when [`GPU_ORDERING_SEMAPHORES`](Self::GPU_ORDERING_SEMAPHORES) is set.
    fn create_semaphore(&mut self) -> Result<Self::Semaphore>;

    /// Create a command list. One is created per frame slot at initialization.
    fn create_command_list(&mut self) -> Result<Self::CommandList>;

    /// Block the calling thread until `fence` is signaled. Infinite timeout.
    fn wait_fence(&mut self, fence: &Self::Fence) -> Result<()>;

    /// Reset `fence` to the unsignaled state. Only legal after a successful wait.
    fn reset_fence(&mut self, fence: &Self::Fence) -> Result<()>;

    /// Request the next presentable image, signaling `signal` when it is actually
    /// available to the GPU. Non-fatal surface conditions are reported through
    /// [`AcquireOutcome`]; only device-level failures are errors.
    fn acquire_next_image(&mut self, signal: Option<&Self::Semaphore>)
        -> Result<AcquireOutcome>;

    /// Reset `cmd` and begin recording into it.
    ///
    /// Must only be called once the owning slot's previous submission has been
    /// observed complete through [`wait_fence`](Self::wait_fence); resetting a
    /// command list the GPU is still reading from is undefined behavior.
    fn begin_commands(&mut self, cmd: &mut Self::CommandList) -> Result<()>;

    /// Record a resource-state transition for `image` into `cmd`.
    fn cmd_transition(
        &mut self,
        cmd: &mut Self::CommandList,
        image: ImageIndex,
        from: ImageState,
        to: ImageState,
    );

    /// Finish recording `cmd`.
    fn end_commands(&mut self, cmd: &mut Self::CommandList) -> Result<()>;

    /// Enqueue `cmd` on the GPU queue.
    ///
    /// The GPU must wait on `wait` before executing and signal `signal` and `fence`
    /// when done. `stamp` is the frame counter at submission time; fence-value style
    /// APIs use it as the value to signal, binary-fence APIs ignore it. Failure here
    /// means the device is lost.
    fn submit(
        &mut self,
        cmd: &Self::CommandList,
        wait: Option<&Self::Semaphore>,
        signal: Option<&Self::Semaphore>,
        fence: &Self::Fence,
        stamp: u64,
    ) -> Result<()>;

    /// Ask the presentation target to show `image`, after the GPU waited on `wait`.
    fn present(&mut self, image: ImageIndex, wait: Option<&Self::Semaphore>)
        -> Result<PresentOutcome>;

    /// Destroy a fence. Only called with fences whose last submission was drained.
    fn destroy_fence(&mut self, fence: Self::Fence);

    /// Destroy a semaphore.
    fn destroy_semaphore(&mut self, semaphore: Self::Semaphore);

    /// Destroy a command list.
    fn destroy_command_list(&mut self, cmd: Self::CommandList);
}
