//! Contains all the logic responsible for frame synchronization and presentation pacing.
//!
//! Every frame should be contained in a call to [`FrameScheduler::render_frame`],
//! which takes a closure that is called when the frame's slot is ready to record.
//! The closure receives the backend, the slot's command list (already begun, with
//! the acquired image transitioned to a renderable state) and a [`FrameInfo`]
//! describing the current frame.
//!
//! The scheduler enforces the bounded-concurrency invariant at the heart of every
//! explicit-API render loop: at most N frame slots' worth of GPU work is ever
//! outstanding, where N is chosen at construction. Within one slot, frame `f + N`
//! may not begin recording until frame `f`'s fence has been observed signaled; this
//! is the sole inter-frame ordering rule. There is no ordering between different
//! slots beyond what the presentation engine enforces through the acquire and
//! submit semaphores.

mod slot;

use anyhow::{Context, Result};

use crate::backend::{AcquireOutcome, GpuBackend, ImageIndex, ImageState, PresentOutcome};
use crate::error::Error;
use crate::scheduler::slot::{FrameSlot, SlotState};

/// The recommended number of frames in flight. A frame in flight is a frame that is
/// rendering on the GPU or scheduled to do so. With two frames in flight, we can
/// prepare a frame on the CPU while one frame is rendering on the GPU. This gives a
/// good amount of parallelization while avoiding input lag; a third slot absorbs the
/// occasional slow CPU frame at the cost of one more frame of latency.
pub const FRAMES_IN_FLIGHT: usize = 2;

/// Per-frame data handed to the record callback of [`FrameScheduler::render_frame`].
#[derive(Debug, Copy, Clone)]
pub struct FrameInfo {
    /// The frame slot being recorded, always `frame_number mod N`.
    pub slot_index: usize,
    /// The presentable image acquired for this frame. Chosen by the presentation
    /// engine, independent of `slot_index`.
    pub image_index: ImageIndex,
    /// Whether this frame touches `image_index` for the first time ever.
    pub first_use: bool,
    /// Monotonic frame counter, starting at 0. Never resets.
    pub frame_number: u64,
}

/// Result of a successfully presented frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was presented normally.
    Presented,
    /// The frame was presented, but the surface reported itself suboptimal.
    /// Safe to ignore and continue rendering.
    SuboptimalSurface,
}

/// Responsible for presentation, frame-frame synchronization and per-frame resources.
///
/// Owns the backend and everything created through it; construction and teardown are
/// explicit and ordered, so there is no reliance on destruction order of globals.
/// Must be driven by a single thread — the scheduler is not reentrant.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct FrameScheduler<B: GpuBackend> {
    #[derivative(Debug = "ignore")]
    backend: B,
    #[derivative(Debug = "ignore")]
    slots: Vec<FrameSlot<B>>,
    /// Counts submitted frames. Selects the slot (`mod N`) and stamps submissions.
    frame_counter: u64,
    current_image: ImageIndex,
    /// Tracked per presentable image, so the Undefined -> renderable transition is
    /// requested exactly once per image for its lifetime.
    image_states: Vec<ImageState>,
    shut_down: bool,
}

impl<B: GpuBackend> FrameScheduler<B> {
    /// Initialize a scheduler with `frames_in_flight` frame slots.
    ///
    /// Each slot gets a fence created in the signaled state (the very first frame
    /// must not block) and, on API styles with GPU-ordering semaphores, one acquire
    /// and one submit semaphore, plus a command list. If any resource creation
    /// fails, everything created before it is released and the error is propagated;
    /// no partially initialized scheduler is ever returned.
    pub fn new(mut backend: B, frames_in_flight: usize) -> Result<Self> {
        let images = backend.image_count();
        if frames_in_flight == 0 || frames_in_flight > images {
            return Err(Error::InvalidFrameCount {
                requested: frames_in_flight,
                images,
            }
            .into());
        }

        let mut slots: Vec<FrameSlot<B>> = Vec::with_capacity(frames_in_flight);
        for index in 0..frames_in_flight {
            match Self::create_slot(&mut backend, index) {
                Ok(slot) => slots.push(slot),
                Err(err) => {
                    while let Some(slot) = slots.pop() {
                        Self::destroy_slot(&mut backend, slot);
                    }
                    return Err(err);
                }
            }
        }

        info!(
            "frame scheduler initialized: {} frames in flight, {} presentable images",
            frames_in_flight, images
        );

        Ok(FrameScheduler {
            backend,
            slots,
            frame_counter: 0,
            current_image: 0,
            image_states: vec![ImageState::Undefined; images],
            shut_down: false,
        })
    }

    /// Record, submit and present one frame.
    ///
    /// Blocks until the current slot's previous submission (if any) has completed,
    /// which is what bounds in-flight GPU work to the slot window. The `record`
    /// closure is called with the image already transitioned to a renderable state;
    /// it should record the frame's commands and nothing else. After it returns the
    /// scheduler transitions the image back to a presentable state, submits, and
    /// presents.
    ///
    /// A [`SurfaceOutOfDate`](Error::SurfaceOutOfDate) or
    /// [`SurfaceLost`](Error::SurfaceLost) error leaves the slot state consistent:
    /// it is valid to call [`shutdown()`](Self::shutdown), or to call
    /// `render_frame` again once the surface has been dealt with. Any other error
    /// means the device is unusable.
    pub fn render_frame<F>(&mut self, record: F) -> Result<FrameStatus>
    where
        F: FnOnce(&mut B, &mut B::CommandList, &FrameInfo) -> Result<()>,
    {
        if self.shut_down {
            return Err(Error::ShutDown.into());
        }

        let slot_index = (self.frame_counter % self.slots.len() as u64) as usize;

        // Throttle. After this wait the slot's command list and fence are free to
        // reuse; before it they may still be referenced by the GPU.
        {
            let slot = &mut self.slots[slot_index];
            self.backend
                .wait_fence(&slot.fence)
                .context("waiting for frame slot fence")?;
            #[cfg(feature = "log-slots")]
            trace!("slot {slot_index}: {:?} -> Idle", slot.state);
            slot.state = SlotState::Idle;
        }

        // Acquire. The presentation engine picks the image; its index may repeat
        // out of round-robin order.
        let image_index = {
            let signal = self.slots[slot_index].acquire_semaphore.as_ref();
            match self.backend.acquire_next_image(signal)? {
                AcquireOutcome::Acquired(index) => index,
                // Nothing was recorded and the fence was not reset, so the slot
                // stays consistent for a later shutdown or retry.
                AcquireOutcome::OutOfDate => return Err(Error::SurfaceOutOfDate.into()),
                AcquireOutcome::Lost => return Err(Error::SurfaceLost.into()),
            }
        };
        self.current_image = image_index;

        let previous_state = self.image_states[image_index as usize];
        let frame = FrameInfo {
            slot_index,
            image_index,
            first_use: previous_state == ImageState::Undefined,
            frame_number: self.frame_counter,
        };

        // Record. The first touch of an image transitions it out of Undefined;
        // every later frame finds it in PresentReady.
        {
            let slot = &mut self.slots[slot_index];
            self.backend.begin_commands(&mut slot.commands)?;
            self.backend.cmd_transition(
                &mut slot.commands,
                image_index,
                previous_state,
                ImageState::RenderTarget,
            );
            record(&mut self.backend, &mut slot.commands, &frame)?;
            self.backend.cmd_transition(
                &mut slot.commands,
                image_index,
                ImageState::RenderTarget,
                ImageState::PresentReady,
            );
            self.backend.end_commands(&mut slot.commands)?;
        }
        self.image_states[image_index as usize] = ImageState::PresentReady;

        // Submit. The GPU waits on the acquire semaphore before executing and
        // signals the submit semaphore and the slot fence when done. The stamp is
        // what fence-value style APIs signal.
        {
            let slot = &mut self.slots[slot_index];
            debug_assert_eq!(
                slot.state,
                SlotState::Idle,
                "slot resubmitted without an intervening fence wait"
            );
            self.backend.reset_fence(&slot.fence)?;
            self.backend
                .submit(
                    &slot.commands,
                    slot.acquire_semaphore.as_ref(),
                    slot.submit_semaphore.as_ref(),
                    &slot.fence,
                    self.frame_counter + 1,
                )
                .map_err(|err| err.context(Error::DeviceLost))?;
            #[cfg(feature = "log-slots")]
            trace!("slot {slot_index}: Idle -> Submitted");
            slot.state = SlotState::Submitted;
        }

        // Present, then advance. The counter advances even when presentation
        // reports a surface condition: the GPU work was submitted either way, so
        // the slot bookkeeping has to move on with it.
        let outcome = self
            .backend
            .present(image_index, self.slots[slot_index].submit_semaphore.as_ref());
        self.frame_counter += 1;

        match outcome? {
            PresentOutcome::Optimal => Ok(FrameStatus::Presented),
            PresentOutcome::Suboptimal => Ok(FrameStatus::SuboptimalSurface),
            PresentOutcome::OutOfDate => Err(Error::SurfaceOutOfDate.into()),
            PresentOutcome::Lost => Err(Error::SurfaceLost.into()),
        }
    }

    /// Drain all in-flight GPU work, then release every slot's resources in strict
    /// reverse-of-creation order.
    ///
    /// Draining first is mandatory, not an optimization: releasing a resource the
    /// GPU still references is undefined behavior on both API styles. Errors during
    /// shutdown are logged and swallowed, since nothing can usefully recover at
    /// this point. Idempotent; rendering after shutdown returns
    /// [`Error::ShutDown`].
    ///
    /// Device- and instance-level objects live in the backend and are released by
    /// whoever owns it, strictly after this returns.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }

        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Err(err) = self.backend.wait_fence(&slot.fence) {
                warn!("shutdown: draining slot {index} failed: {err:#}");
            }
            slot.state = SlotState::Idle;
        }

        while let Some(slot) = self.slots.pop() {
            Self::destroy_slot(&mut self.backend, slot);
        }

        self.shut_down = true;
        info!("frame scheduler shut down after {} frames", self.frame_counter);
    }

    /// Access the backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable access to the backend.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Number of frame slots.
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Number of frames submitted so far.
    pub fn frame_number(&self) -> u64 {
        self.frame_counter
    }

    /// The image index acquired by the most recent frame.
    pub fn current_image(&self) -> ImageIndex {
        self.current_image
    }

    fn create_slot(backend: &mut B, index: usize) -> Result<FrameSlot<B>> {
        let fence = backend
            .create_fence(true)
            .context(Error::InitFailed("frame fence"))?;

        let acquire_semaphore = if B::GPU_ORDERING_SEMAPHORES {
            match backend
                .create_semaphore()
                .context(Error::InitFailed("acquire semaphore"))
            {
                Ok(semaphore) => Some(semaphore),
                Err(err) => {
                    backend.destroy_fence(fence);
                    return Err(err);
                }
            }
        } else {
            None
        };

        let submit_semaphore = if B::GPU_ORDERING_SEMAPHORES {
            match backend
                .create_semaphore()
                .context(Error::InitFailed("submit semaphore"))
            {
                Ok(semaphore) => Some(semaphore),
                Err(err) => {
                    if let Some(semaphore) = acquire_semaphore {
                        backend.destroy_semaphore(semaphore);
                    }
                    backend.destroy_fence(fence);
                    return Err(err);
                }
            }
        } else {
            None
        };

        let commands = match backend
            .create_command_list()
            .context(Error::InitFailed("command list"))
        {
            Ok(commands) => commands,
            Err(err) => {
                if let Some(semaphore) = submit_semaphore {
                    backend.destroy_semaphore(semaphore);
                }
                if let Some(semaphore) = acquire_semaphore {
                    backend.destroy_semaphore(semaphore);
                }
                backend.destroy_fence(fence);
                return Err(err);
            }
        };

        trace!("created frame slot {index}");
        Ok(FrameSlot {
            fence,
            acquire_semaphore,
            submit_semaphore,
            commands,
            state: SlotState::Idle,
        })
    }

    // Reverse of creation order within the slot.
    fn destroy_slot(backend: &mut B, slot: FrameSlot<B>) {
        backend.destroy_command_list(slot.commands);
        if let Some(semaphore) = slot.submit_semaphore {
            backend.destroy_semaphore(semaphore);
        }
        if let Some(semaphore) = slot.acquire_semaphore {
            backend.destroy_semaphore(semaphore);
        }
        backend.destroy_fence(slot.fence);
    }
}

impl<B: GpuBackend> Drop for FrameScheduler<B> {
    fn drop(&mut self) {
        if !self.shut_down {
            warn!("frame scheduler dropped without an explicit shutdown, draining in-flight work");
            self.shutdown();
        }
    }
}

static_assertions::assert_impl_all!(FrameInfo: Send, Copy);
