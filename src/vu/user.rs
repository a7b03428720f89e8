use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum VuState {
    Idle = 0,
    Running = 1,
    /// Finishes its current iteration, then returns to the pool.
    Stopping = 2,
    Stopped = 3,
}

impl VuState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => VuState::Idle,
            1 => VuState::Running,
            2 => VuState::Stopping,
            _ => VuState::Stopped,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            VuState::Idle => "idle",
            VuState::Running => "running",
            VuState::Stopping => "stopping",
            VuState::Stopped => "stopped",
        }
    }
}

/// Lifecycle flag shared between a VU and whoever schedules it.
#[derive(Debug)]
pub struct VuControl {
    state: AtomicU8,
}

impl VuControl {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(VuState::Idle as u8),
        }
    }

    #[must_use]
    pub fn state(&self) -> VuState {
        VuState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(super) fn set(&self, state: VuState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Ask a running VU to stop after its current iteration. Returns false
    /// if it was not running.
    pub fn request_stop(&self) -> bool {
        self.state
            .compare_exchange(
                VuState::Running as u8,
                VuState::Stopping as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    #[must_use]
    pub fn should_stop(&self) -> bool {
        matches!(self.state(), VuState::Stopping | VuState::Stopped)
    }
}

/// One worker execution context. Owned by the pool while idle and by its
/// task while running.
#[derive(Debug)]
pub struct VirtualUser {
    index: usize,
    control: Arc<VuControl>,
    iterations: u64,
}

impl VirtualUser {
    pub(super) fn new(index: usize) -> Self {
        Self {
            index,
            control: Arc::new(VuControl::new()),
            iterations: 0,
        }
    }

    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub fn state(&self) -> VuState {
        self.control.state()
    }

    #[must_use]
    pub const fn control(&self) -> &Arc<VuControl> {
        &self.control
    }

    /// Iterations this VU completed over the whole run.
    #[must_use]
    pub const fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn complete_iteration(&mut self) {
        self.iterations = self.iterations.saturating_add(1);
    }
}
