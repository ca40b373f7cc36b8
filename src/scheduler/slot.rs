use crate::backend::GpuBackend;

/// Lifecycle of a frame slot's most recent submission.
///
/// `Recording` is not represented: it only exists inside a single
/// `render_frame` call and is never observable between calls.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum SlotState {
    /// No unwaited GPU work references this slot's resources.
    Idle,
    /// The GPU has this slot's work; the CPU has not yet observed completion.
    Submitted,
}

/// Information stored for each in-flight frame: one frame's worth of CPU-side
/// resources plus the fence that guards their reuse.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub(crate) struct FrameSlot<B: GpuBackend> {
    /// Signaled by the GPU when this slot's submission has been fully processed.
    /// Created signaled so the slot's first frame does not block.
    #[derivative(Debug = "ignore")]
    pub fence: B::Fence,
    /// Signaled by the presentation engine when the acquired image is ready.
    /// `None` on API styles without GPU-ordering semaphores.
    #[derivative(Debug = "ignore")]
    pub acquire_semaphore: Option<B::Semaphore>,
    /// Signaled by the GPU when all commands for the frame have been processed.
    /// Presentation waits on this so it never races ahead of rendering.
    #[derivative(Debug = "ignore")]
    pub submit_semaphore: Option<B::Semaphore>,
    /// Command list exclusively owned by this slot, reset and reused every N-th
    /// frame. Must never be reset while its prior submission is unfenced.
    #[derivative(Debug = "ignore")]
    pub commands: B::CommandList,
    pub state: SlotState,
}
