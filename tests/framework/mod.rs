//! Mock GPU backend for driving the frame scheduler in automated tests.
//!
//! The mock keeps all state behind an [`Arc`] so a [`MockHandle`] can observe and
//! steer it from the test thread while the scheduler owns the backend itself.
//! Fences can complete immediately on submit (the "infinitely fast GPU") or be
//! completed one at a time from the test, which is what makes throttling and
//! drain behavior observable.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use anyhow::Result;

use deimos::backend::{AcquireOutcome, GpuBackend, ImageIndex, ImageState, PresentOutcome};
use deimos::error::Error;

/// Route scheduler logs to the test output. Safe to call from every test.
pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

/// Mock with explicit GPU-ordering semaphores (Vulkan style).
pub type VulkanStyleMock = MockGpu<true>;
/// Mock with a single stamped fence per slot (D3D12 style).
pub type D3d12StyleMock = MockGpu<false>;

/// Everything the backend was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    WaitReturned {
        fence: usize,
    },
    Acquired {
        image: ImageIndex,
    },
    BeginCommands {
        commands: usize,
    },
    Transition {
        image: ImageIndex,
        from: ImageState,
        to: ImageState,
    },
    Submitted {
        commands: usize,
        fence: usize,
        stamp: u64,
        wait: Option<usize>,
        signal: Option<usize>,
    },
    Presented {
        image: ImageIndex,
        wait: Option<usize>,
    },
    FenceDestroyed {
        fence: usize,
    },
    SemaphoreDestroyed {
        semaphore: usize,
    },
    CommandsDestroyed {
        commands: usize,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MockFence(usize);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MockSemaphore(usize);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MockCommands(usize);

struct CommandListState {
    recording: bool,
    /// Fence of this list's most recent submission. Reset is only legal once it
    /// has been signaled.
    last_fence: Option<usize>,
}

#[derive(Default)]
struct State {
    events: Vec<Event>,
    /// Signaled flag per fence id.
    fences: Vec<bool>,
    command_lists: Vec<CommandListState>,
    semaphores_created: usize,
    live_fences: usize,
    live_semaphores: usize,
    live_command_lists: usize,
    /// Submitted but unsignaled fences, oldest first.
    pending: VecDeque<usize>,
    outstanding: usize,
    max_outstanding: usize,
    submissions: usize,
    /// Threads currently blocked inside `wait_fence`.
    waiters: usize,
    next_image: u32,
    /// When non-empty, overrides the round-robin acquire outcome.
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    /// Signal fences directly at submit time.
    auto_complete: bool,
    /// Remaining successful creations before a scripted failure, per kind.
    fences_until_failure: Option<usize>,
    semaphores_until_failure: Option<usize>,
    command_lists_until_failure: Option<usize>,
}

struct Shared {
    state: Mutex<State>,
    cond: Condvar,
}

/// Mock GPU backend. The const parameter selects the API style.
pub struct MockGpu<const SEMAPHORES: bool = true> {
    shared: Arc<Shared>,
    image_count: usize,
}

impl<const SEMAPHORES: bool> MockGpu<SEMAPHORES> {
    /// A mock whose submissions complete instantly.
    pub fn new(image_count: usize) -> Self {
        Self::build(image_count, true)
    }

    /// A mock whose submissions stay outstanding until the test completes them
    /// through [`MockHandle::complete_next`].
    pub fn manual(image_count: usize) -> Self {
        Self::build(image_count, false)
    }

    fn build(image_count: usize, auto_complete: bool) -> Self {
        let state = State {
            auto_complete,
            ..Default::default()
        };
        MockGpu {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                cond: Condvar::new(),
            }),
            image_count,
        }
    }

    /// Observer/control handle, valid after the backend moved into the scheduler.
    pub fn handle(&self) -> MockHandle {
        MockHandle {
            shared: self.shared.clone(),
        }
    }
}

/// Test-side view of a [`MockGpu`]'s state.
#[derive(Clone)]
pub struct MockHandle {
    shared: Arc<Shared>,
}

impl MockHandle {
    pub fn events(&self) -> Vec<Event> {
        self.shared.state.lock().unwrap().events.clone()
    }

    /// Submissions whose fence has not been signaled yet.
    pub fn outstanding(&self) -> usize {
        self.shared.state.lock().unwrap().outstanding
    }

    /// High-water mark of concurrently outstanding submissions.
    pub fn max_outstanding(&self) -> usize {
        self.shared.state.lock().unwrap().max_outstanding
    }

    pub fn submissions(&self) -> usize {
        self.shared.state.lock().unwrap().submissions
    }

    /// Fences, semaphores and command lists not yet destroyed.
    pub fn live_objects(&self) -> usize {
        let state = self.shared.state.lock().unwrap();
        state.live_fences + state.live_semaphores + state.live_command_lists
    }

    /// Signal the oldest outstanding submission's fence. Returns false when
    /// nothing is outstanding.
    pub fn complete_next(&self) -> bool {
        let mut state = self.shared.state.lock().unwrap();
        match state.pending.pop_front() {
            Some(fence) => {
                state.fences[fence] = true;
                state.outstanding -= 1;
                self.shared.cond.notify_all();
                true
            }
            None => false,
        }
    }

    /// Block until some thread is parked inside `wait_fence`.
    pub fn wait_until_waiting(&self) {
        let mut state = self.shared.state.lock().unwrap();
        while state.waiters == 0 {
            state = self.shared.cond.wait(state).unwrap();
        }
    }

    /// Queue acquire outcomes that override the default round-robin image choice.
    pub fn script_acquire(&self, outcomes: impl IntoIterator<Item = AcquireOutcome>) {
        let mut state = self.shared.state.lock().unwrap();
        state.acquire_script.extend(outcomes);
    }

    /// Queue present outcomes. When exhausted, presents report `Optimal`.
    pub fn script_present(&self, outcomes: impl IntoIterator<Item = PresentOutcome>) {
        let mut state = self.shared.state.lock().unwrap();
        state.present_script.extend(outcomes);
    }

    /// Let the next `n` fence creations succeed, then fail one.
    pub fn fail_fence_creation_after(&self, n: usize) {
        self.shared.state.lock().unwrap().fences_until_failure = Some(n);
    }

    /// Let the next `n` semaphore creations succeed, then fail one.
    pub fn fail_semaphore_creation_after(&self, n: usize) {
        self.shared.state.lock().unwrap().semaphores_until_failure = Some(n);
    }

    /// Let the next `n` command list creations succeed, then fail one.
    pub fn fail_command_list_creation_after(&self, n: usize) {
        self.shared.state.lock().unwrap().command_lists_until_failure = Some(n);
    }
}

fn scripted_failure(counter: &mut Option<usize>, what: &'static str) -> Result<()> {
    if let Some(remaining) = counter {
        if *remaining == 0 {
            anyhow::bail!("scripted {what} creation failure");
        }
        *remaining -= 1;
    }
    Ok(())
}

impl<const SEMAPHORES: bool> GpuBackend for MockGpu<SEMAPHORES> {
    type Fence = MockFence;
    type Semaphore = MockSemaphore;
    type CommandList = MockCommands;

    const GPU_ORDERING_SEMAPHORES: bool = SEMAPHORES;

    fn image_count(&self) -> usize {
        self.image_count
    }

    fn create_fence(&mut self, signaled: bool) -> Result<Self::Fence> {
        let mut state = self.shared.state.lock().unwrap();
        scripted_failure(&mut state.fences_until_failure, "fence")?;
        let id = state.fences.len();
        state.fences.push(signaled);
        state.live_fences += 1;
        Ok(MockFence(id))
    }

    fn create_semaphore(&mut self) -> Result<Self::Semaphore> {
        assert!(
            SEMAPHORES,
            "semaphore created on an API style without GPU-ordering semaphores"
        );
        let mut state = self.shared.state.lock().unwrap();
        scripted_failure(&mut state.semaphores_until_failure, "semaphore")?;
        let id = state.semaphores_created;
        state.semaphores_created += 1;
        state.live_semaphores += 1;
        Ok(MockSemaphore(id))
    }

    fn create_command_list(&mut self) -> Result<Self::CommandList> {
        let mut state = self.shared.state.lock().unwrap();
        scripted_failure(&mut state.command_lists_until_failure, "command list")?;
        let id = state.command_lists.len();
        state.command_lists.push(CommandListState {
            recording: false,
            last_fence: None,
        });
        state.live_command_lists += 1;
        Ok(MockCommands(id))
    }

    fn wait_fence(&mut self, fence: &Self::Fence) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        while !state.fences[fence.0] {
            state.waiters += 1;
            self.shared.cond.notify_all();
            state = self.shared.cond.wait(state).unwrap();
            state.waiters -= 1;
        }
        state.events.push(Event::WaitReturned { fence: fence.0 });
        Ok(())
    }

    fn reset_fence(&mut self, fence: &Self::Fence) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        assert!(
            state.fences[fence.0],
            "fence reset without a preceding successful wait"
        );
        state.fences[fence.0] = false;
        Ok(())
    }

    fn acquire_next_image(
        &mut self,
        _signal: Option<&Self::Semaphore>,
    ) -> Result<AcquireOutcome> {
        let mut state = self.shared.state.lock().unwrap();
        let outcome = match state.acquire_script.pop_front() {
            Some(outcome) => outcome,
            None => {
                let image = state.next_image % self.image_count as u32;
                state.next_image += 1;
                AcquireOutcome::Acquired(image)
            }
        };
        if let AcquireOutcome::Acquired(image) = outcome {
            state.events.push(Event::Acquired { image });
        }
        Ok(outcome)
    }

    fn begin_commands(&mut self, cmd: &mut Self::CommandList) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        if let Some(fence) = state.command_lists[cmd.0].last_fence {
            if !state.fences[fence] {
                return Err(Error::Uncategorized(
                    "command list reset while its previous submission is still in flight",
                )
                .into());
            }
        }
        state.command_lists[cmd.0].recording = true;
        state.events.push(Event::BeginCommands { commands: cmd.0 });
        Ok(())
    }

    fn cmd_transition(
        &mut self,
        cmd: &mut Self::CommandList,
        image: ImageIndex,
        from: ImageState,
        to: ImageState,
    ) {
        let mut state = self.shared.state.lock().unwrap();
        assert!(
            state.command_lists[cmd.0].recording,
            "transition recorded outside begin/end"
        );
        state.events.push(Event::Transition { image, from, to });
    }

    fn end_commands(&mut self, cmd: &mut Self::CommandList) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        assert!(state.command_lists[cmd.0].recording);
        state.command_lists[cmd.0].recording = false;
        Ok(())
    }

    fn submit(
        &mut self,
        cmd: &Self::CommandList,
        wait: Option<&Self::Semaphore>,
        signal: Option<&Self::Semaphore>,
        fence: &Self::Fence,
        stamp: u64,
    ) -> Result<()> {
        let mut state = self.shared.state.lock().unwrap();
        assert!(
            !state.fences[fence.0],
            "submission signals a fence that is already signaled"
        );
        state.command_lists[cmd.0].last_fence = Some(fence.0);
        state.submissions += 1;
        state.events.push(Event::Submitted {
            commands: cmd.0,
            fence: fence.0,
            stamp,
            wait: wait.map(|s| s.0),
            signal: signal.map(|s| s.0),
        });
        if state.auto_complete {
            state.fences[fence.0] = true;
        } else {
            state.pending.push_back(fence.0);
            state.outstanding += 1;
            state.max_outstanding = state.max_outstanding.max(state.outstanding);
        }
        Ok(())
    }

    fn present(&mut self, image: ImageIndex, wait: Option<&Self::Semaphore>) -> Result<PresentOutcome> {
        let mut state = self.shared.state.lock().unwrap();
        state.events.push(Event::Presented {
            image,
            wait: wait.map(|s| s.0),
        });
        Ok(state
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Optimal))
    }

    fn destroy_fence(&mut self, fence: Self::Fence) {
        let mut state = self.shared.state.lock().unwrap();
        assert!(
            !state.pending.contains(&fence.0),
            "fence destroyed while its submission is still outstanding"
        );
        state.live_fences -= 1;
        state.events.push(Event::FenceDestroyed { fence: fence.0 });
    }

    fn destroy_semaphore(&mut self, semaphore: Self::Semaphore) {
        let mut state = self.shared.state.lock().unwrap();
        state.live_semaphores -= 1;
        state.events.push(Event::SemaphoreDestroyed {
            semaphore: semaphore.0,
        });
    }

    fn destroy_command_list(&mut self, cmd: Self::CommandList) {
        let mut state = self.shared.state.lock().unwrap();
        state.live_command_lists -= 1;
        state.events.push(Event::CommandsDestroyed { commands: cmd.0 });
    }
}
