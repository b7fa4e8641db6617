//! # Runner: single-slot unit execution.
//!
//! Exactly one unit runs at a time. Each run gets a dedicated worker thread,
//! a fresh [`StopToken`], and a timeout timer armed *before* the worker
//! starts, so there is no window where a unit runs unbudgeted:
//!
//! ```text
//!  run()                    worker thread                timer task
//!    │ vacate slot             │                            │
//!    │ load fresh entry        │                            │
//!    │ arm timer ─────────────────────────────────────────► │ sleep(budget)
//!    │ spawn worker ─────────► │ publish UnitStarted        │
//!    │ record state            │ entry(token, capability)   │ cancel token
//!    ▼                         │ abort timer ◄──────────────┘
//!                              │ release capability
//!                              │ publish UnitFinished / UnitError
//!                              │ signal done
//! ```
//!
//! ## Rules
//! - There is **no forced termination**. Stopping means cancelling the
//!   token and waiting; a unit that ignores it is logged and abandoned
//!   (its thread is detached), never killed.
//! - The finish reason is derived solely from the token: `"timeout"` when
//!   cancelled (by timer or by a stop request), `"normal"` otherwise.
//! - The worker never takes the runner's state lock, so a unit can never
//!   deadlock a concurrent `run`/`stop`.
//! - A panicking entry is caught and reported as a `UnitError` event; the
//!   slot frees normally.

mod token;

pub use token::StopToken;

use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use log::{error, info, warn};
use serde_json::{Map, Value};

use crate::capability::Capability;
use crate::catalog::Descriptor;
use crate::error::UnitError;
use crate::events::{panic_message, Bus, EventType};
use crate::loader::UnitLoader;

/// Extra wait granted to a replaced unit after the stop window expires.
const REPLACE_GRACE: Duration = Duration::from_secs(2);

type TimerSlot = Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>;

/// Bookkeeping for the unit currently occupying the slot.
struct RunState {
    unit_id: String,
    token: StopToken,
    worker: thread::JoinHandle<()>,
    done_rx: mpsc::Receiver<()>,
    timer: TimerSlot,
}

/// Owns the single execution slot.
pub struct Runner {
    bus: Bus,
    loader: Arc<dyn UnitLoader>,
    stop_timeout: Duration,
    state: Mutex<Option<RunState>>,
}

impl Runner {
    pub fn new(bus: Bus, loader: Arc<dyn UnitLoader>, stop_timeout: Duration) -> Self {
        Self {
            bus,
            loader,
            stop_timeout,
            state: Mutex::new(None),
        }
    }

    /// Launches a unit with its descriptor's timeout budget, vacating the
    /// slot first if occupied.
    ///
    /// Must be called from within the tokio runtime (the timeout timer is a
    /// spawned task).
    pub fn run(
        &self,
        unit_id: &str,
        unit_dir: &Path,
        descriptor: &Descriptor,
        capability: Capability,
    ) -> Result<(), UnitError> {
        self.launch(unit_id, unit_dir, descriptor, capability, descriptor.timeout())
    }

    fn launch(
        &self,
        unit_id: &str,
        unit_dir: &Path,
        descriptor: &Descriptor,
        capability: Capability,
        timeout: Duration,
    ) -> Result<(), UnitError> {
        self.vacate_slot();

        // Fresh entry per run; load failures surface before anything starts.
        let entry = self.loader.load(unit_id, unit_dir, descriptor)?;

        let token = StopToken::new();
        let (done_tx, done_rx) = mpsc::channel();
        let timer: TimerSlot = Arc::new(Mutex::new(None));

        {
            let token = token.clone();
            let unit = unit_id.to_string();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                warn!("unit {unit} exceeded its {:.1}s budget; requesting stop", timeout.as_secs_f64());
                token.cancel();
            });
            if let Ok(mut slot) = timer.lock() {
                *slot = Some(handle);
            }
        }

        let bus = self.bus.clone();
        let unit = unit_id.to_string();
        let display_name = descriptor.effective_display_name(unit_id).to_string();
        let worker_token = token.clone();
        let worker_timer = timer.clone();

        let worker = thread::Builder::new()
            .name(format!("unit-{unit_id}"))
            .spawn(move || {
                info!("unit {unit} starting as {display_name:?}");
                let mut payload = Map::new();
                payload.insert("unit".to_string(), Value::String(unit.clone()));
                payload.insert("display_name".to_string(), Value::String(display_name));
                bus.publish_threadsafe(EventType::UnitStarted, payload);

                let entry_token = worker_token.clone();
                let entry_cap = capability.clone();
                let outcome =
                    std::panic::catch_unwind(AssertUnwindSafe(move || entry(entry_token, entry_cap)));

                if let Ok(mut slot) = worker_timer.lock() {
                    if let Some(handle) = slot.take() {
                        handle.abort();
                    }
                }
                capability.release();

                let reason = if worker_token.is_cancelled() { "timeout" } else { "normal" };
                match outcome {
                    Ok(Ok(())) => {
                        info!("unit {unit} finished ({reason})");
                        let mut payload = Map::new();
                        payload.insert("unit".to_string(), Value::String(unit.clone()));
                        payload.insert("reason".to_string(), Value::String(reason.to_string()));
                        bus.publish_threadsafe(EventType::UnitFinished, payload);
                    }
                    Ok(Err(e)) => {
                        error!("unit {unit} failed: {e}");
                        let mut payload = Map::new();
                        payload.insert("unit".to_string(), Value::String(unit.clone()));
                        payload.insert("error".to_string(), Value::String(e.to_string()));
                        bus.publish_threadsafe(EventType::UnitError, payload);
                    }
                    Err(panic_err) => {
                        let msg = panic_message(panic_err.as_ref());
                        error!("unit {unit} panicked: {msg}");
                        let mut payload = Map::new();
                        payload.insert("unit".to_string(), Value::String(unit.clone()));
                        payload.insert("error".to_string(), Value::String(format!("panicked: {msg}")));
                        bus.publish_threadsafe(EventType::UnitError, payload);
                    }
                }
                let _ = done_tx.send(());
            })
            .map_err(|e| UnitError::Load {
                unit: unit_id.to_string(),
                reason: format!("failed to spawn worker thread: {e}"),
            })?;

        if let Ok(mut state) = self.state.lock() {
            *state = Some(RunState {
                unit_id: unit_id.to_string(),
                token,
                worker,
                done_rx,
                timer,
            });
        }
        Ok(())
    }

    /// Stops the current unit, if any. Returns `true` when the slot is free
    /// afterwards because the unit stopped (or none was running); `false`
    /// when the unit ignored the stop request and was abandoned.
    pub fn stop(&self) -> bool {
        let current = self.state.lock().ok().and_then(|mut state| state.take());
        let Some(state) = current else {
            return true;
        };
        let unit_id = state.unit_id.clone();
        match stop_state(state, self.stop_timeout) {
            Ok(()) => {
                info!("unit {unit_id} stopped");
                true
            }
            Err(_abandoned) => {
                warn!(
                    "unit {unit_id} did not stop within {:.1}s; abandoning its thread",
                    self.stop_timeout.as_secs_f64()
                );
                false
            }
        }
    }

    /// Whether a unit currently occupies the slot.
    pub fn is_running(&self) -> bool {
        match self.state.lock() {
            Ok(state) => state.as_ref().is_some_and(|s| !s.worker.is_finished()),
            Err(_) => false,
        }
    }

    /// Unit id of the current occupant, if it is still running.
    pub fn running_unit(&self) -> Option<String> {
        match self.state.lock() {
            Ok(state) => state
                .as_ref()
                .filter(|s| !s.worker.is_finished())
                .map(|s| s.unit_id.clone()),
            Err(_) => None,
        }
    }

    /// Frees the slot ahead of a new launch: stop window, then a short
    /// grace period, then launch anyway with the old thread abandoned.
    fn vacate_slot(&self) {
        let current = self.state.lock().ok().and_then(|mut state| state.take());
        let Some(state) = current else {
            return;
        };
        if state.worker.is_finished() {
            abort_timer(&state.timer);
            let _ = state.worker.join();
            return;
        }

        info!("replacing running unit {}", state.unit_id);
        match stop_state(state, self.stop_timeout) {
            Ok(()) => {}
            Err(state) => {
                warn!(
                    "unit {} still running after stop window; granting {:.1}s more",
                    state.unit_id,
                    REPLACE_GRACE.as_secs_f64()
                );
                match state.done_rx.recv_timeout(REPLACE_GRACE) {
                    Ok(()) => {
                        let _ = state.worker.join();
                    }
                    Err(_) => {
                        error!("unit {} refused to stop; launching anyway", state.unit_id);
                    }
                }
            }
        }
    }
}

/// Cancels the token, disarms the timer, and waits for the worker to signal
/// done. Returns the state back when the worker outlives the window.
fn stop_state(state: RunState, timeout: Duration) -> Result<(), RunState> {
    state.token.cancel();
    abort_timer(&state.timer);
    match state.done_rx.recv_timeout(timeout) {
        Ok(()) => {
            let _ = state.worker.join();
            Ok(())
        }
        Err(_) => Err(state),
    }
}

fn abort_timer(timer: &TimerSlot) {
    if let Ok(mut slot) = timer.lock() {
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}
