use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::PoolBounds;
use crate::error::{CapacityExceeded, RunError};

use super::user::{VirtualUser, VuControl, VuState};

#[derive(Debug)]
struct RunningVu {
    control: Arc<VuControl>,
    task: Option<JoinHandle<()>>,
}

#[derive(Debug, Default)]
struct PoolState {
    /// VUs created so far; only ever grows.
    cap: usize,
    idle: Vec<VirtualUser>,
    running: BTreeMap<usize, RunningVu>,
    violation: Option<String>,
    closed: bool,
}

/// Outcome of [`VuPool::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolShutdown {
    /// Every in-flight iteration finished before the timeout.
    pub drained: bool,
    /// Stragglers cancelled after the timeout.
    pub aborted: usize,
}

/// Owner of every virtual user of a run.
///
/// `acquire` never blocks: an exhausted pool answers with
/// [`CapacityExceeded`] and the caller decides whether to grow. Pool size
/// changes take this lock only; sample recording never touches it.
#[derive(Debug)]
pub struct VuPool {
    max: usize,
    state: Mutex<PoolState>,
    drained: Notify,
}

impl VuPool {
    #[must_use]
    pub fn new(bounds: PoolBounds) -> Self {
        Self {
            max: bounds.max,
            state: Mutex::new(PoolState::default()),
            drained: Notify::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, PoolState>, RunError> {
        self.state
            .lock()
            .map_err(|_poison| RunError::InvariantViolation {
                detail: "VU pool lock poisoned".to_owned(),
            })
    }

    /// Create VUs until the pool holds `n` (bounded by the maximum).
    ///
    /// # Errors
    ///
    /// Returns an error if the pool lock is poisoned.
    pub fn preallocate(&self, n: usize) -> Result<usize, RunError> {
        self.grow_to(n)
    }

    /// Grow the pool to `n` VUs, never beyond the maximum and never
    /// shrinking. Returns the resulting size.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool lock is poisoned.
    pub fn grow_to(&self, n: usize) -> Result<usize, RunError> {
        let mut state = self.lock()?;
        if state.closed {
            return Ok(state.cap);
        }
        let target = n.min(self.max);
        while state.cap < target {
            let index = state.cap;
            state.idle.push(VirtualUser::new(index));
            state.cap = state.cap.saturating_add(1);
        }
        Ok(state.cap)
    }

    /// Hand out an idle VU in the Running state.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityExceeded`] when no VU is idle, including after
    /// shutdown.
    pub fn acquire(&self) -> Result<VirtualUser, CapacityExceeded> {
        let Ok(mut state) = self.state.lock() else {
            return Err(CapacityExceeded {
                running: 0,
                cap: 0,
            });
        };
        let busy = CapacityExceeded {
            running: state.running.len(),
            cap: state.cap,
        };
        if state.closed {
            return Err(busy);
        }
        let Some(vu) = state.idle.pop() else {
            return Err(busy);
        };
        vu.control().set(VuState::Running);
        state.running.insert(
            vu.index(),
            RunningVu {
                control: Arc::clone(vu.control()),
                task: None,
            },
        );
        Ok(vu)
    }

    /// Run `work` on its own task; the VU it hands back is released.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool lock is poisoned or `vu` was not
    /// acquired from this pool.
    pub fn start<F, Fut>(self: &Arc<Self>, vu: VirtualUser, work: F) -> Result<(), RunError>
    where
        F: FnOnce(VirtualUser) -> Fut + Send + 'static,
        Fut: Future<Output = VirtualUser> + Send + 'static,
    {
        let index = vu.index();
        let pool = Arc::clone(self);
        // Held across spawn so the task cannot release before it is registered.
        let mut state = self.lock()?;
        if !state.running.contains_key(&index) {
            let detail = format!("VU {} started without being acquired", index);
            state.violation = Some(detail.clone());
            return Err(RunError::InvariantViolation { detail });
        }
        let handle = tokio::spawn(async move {
            let vu = work(vu).await;
            if let Err(err) = pool.release(vu) {
                warn!("{}", err);
            }
        });
        if let Some(running) = state.running.get_mut(&index) {
            running.task = Some(handle);
        }
        Ok(())
    }

    /// Return a VU to the idle set.
    ///
    /// # Errors
    ///
    /// Returns an error, and records a violation, if the VU was not running.
    pub fn release(&self, vu: VirtualUser) -> Result<(), RunError> {
        let mut state = self.lock()?;
        if state.running.remove(&vu.index()).is_none() {
            if state.closed {
                // Finished while shutdown was cancelling it; already written off.
                vu.control().set(VuState::Stopped);
                return Ok(());
            }
            let detail = format!(
                "VU {} released while {}",
                vu.index(),
                vu.state().as_str()
            );
            state.violation = Some(detail.clone());
            return Err(RunError::InvariantViolation { detail });
        }
        if state.closed {
            vu.control().set(VuState::Stopped);
        } else {
            vu.control().set(VuState::Idle);
        }
        state.idle.push(vu);
        if state.running.is_empty() {
            self.drained.notify_waiters();
        }
        Ok(())
    }

    /// Ask every running VU to finish its current iteration and stop.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool lock is poisoned.
    pub fn stop_all(&self) -> Result<usize, RunError> {
        let state = self.lock()?;
        Ok(state
            .running
            .values()
            .filter(|running| running.control.request_stop())
            .count())
    }

    /// Resolves once no VU is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.running() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop every VU: let in-flight iterations finish for up to `timeout`,
    /// then cancel the rest. The pool hands out nothing afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool lock is poisoned.
    pub async fn shutdown(&self, timeout: Duration) -> Result<PoolShutdown, RunError> {
        let stopping = self.stop_all()?;
        debug!("Draining {} running VUs.", stopping);
        let drained = tokio::time::timeout(timeout, self.wait_idle()).await.is_ok();

        let stragglers = {
            let mut state = self.lock()?;
            state.closed = true;
            let running = std::mem::take(&mut state.running);
            for vu in &state.idle {
                vu.control().set(VuState::Stopped);
            }
            // Cancelled VUs are gone; keep the size accounting consistent.
            state.cap = state.cap.saturating_sub(running.len());
            running
        };

        let aborted = stragglers.len();
        for running in stragglers.into_values() {
            running.control.set(VuState::Stopped);
            if let Some(task) = running.task {
                task.abort();
                // Wait for the task to drop so its cancelled iteration is
                // recorded before the caller freezes the streams.
                if let Err(err) = task.await
                    && !err.is_cancelled()
                {
                    warn!("VU task failed during shutdown: {}", err);
                }
            }
        }
        if aborted > 0 {
            warn!("Cancelled {} VUs still running after {:?}.", aborted, timeout);
        }
        Ok(PoolShutdown { drained, aborted })
    }

    /// # Errors
    ///
    /// Returns an error if a release or start mismatch was recorded, or the
    /// running/idle accounting no longer adds up.
    pub fn check_invariants(&self) -> Result<(), RunError> {
        let state = self.lock()?;
        if let Some(detail) = state.violation.as_ref() {
            return Err(RunError::InvariantViolation {
                detail: detail.clone(),
            });
        }
        let accounted = state.idle.len().saturating_add(state.running.len());
        if state.cap > self.max || state.running.len() > state.cap || accounted != state.cap {
            return Err(RunError::InvariantViolation {
                detail: format!(
                    "VU pool accounting off: {} running, {} idle, cap {}, max {}",
                    state.running.len(),
                    state.idle.len(),
                    state.cap,
                    self.max
                ),
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn running(&self) -> usize {
        self.state
            .lock()
            .map(|state| state.running.len())
            .unwrap_or(0)
    }

    #[must_use]
    pub fn idle(&self) -> usize {
        self.state.lock().map(|state| state.idle.len()).unwrap_or(0)
    }

    /// VUs created so far.
    #[must_use]
    pub fn cap(&self) -> usize {
        self.state.lock().map(|state| state.cap).unwrap_or(0)
    }

    #[must_use]
    pub const fn max(&self) -> usize {
        self.max
    }
}
