// Copyright 2026 Hypermesh Foundation. All rights reserved.
// Orbital Grid Simulation Suite - Clock and Shared Handle

//! Thread-safe access to a [`Simulation`].
//!
//! [`EngineHandle`] serialises every mutation behind one lock and publishes an
//! immutable [`Snapshot`] after each tick or control operation, so readers
//! never observe a half-applied tick. [`SimulationClock`] drives ticks from a
//! background thread at the configured cadence.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ConfigPatch, SimConfig};
use crate::error::{DropReason, EngineError};
use crate::events::{EventBus, EventLog, EventSink, SimEvent};
use crate::simulation::Simulation;
use crate::types::{Snapshot, TaskSpec, TickSummary};
use crate::units::{CarrierId, NodeId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockState {
    Idle,
    Running,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    #[error("clock already running")]
    AlreadyRunning,
    #[error("clock not running")]
    NotRunning,
    #[error("failed to spawn tick thread: {0}")]
    Spawn(String),
    #[error("tick thread panicked")]
    Join,
}

struct Shared {
    core: Mutex<Simulation>,
    snapshot: RwLock<Arc<Snapshot>>,
    last_summary: RwLock<Option<TickSummary>>,
    bus: RwLock<EventBus>,
    log: Arc<EventLog>,
    running: AtomicBool,
}

/// Cloneable, `Send + Sync` handle to one simulation.
#[derive(Clone)]
pub struct EngineHandle {
    inner: Arc<Shared>,
}

impl EngineHandle {
    pub fn new(config: SimConfig) -> Result<Self, EngineError> {
        Ok(Self::from_simulation(Simulation::new(config)?))
    }

    /// The handle keeps its own [`EventLog`] of `event_log_capacity` entries.
    pub fn from_simulation(sim: Simulation) -> Self {
        let snapshot = Arc::new(sim.snapshot());
        let log = Arc::new(EventLog::new(sim.config().event_log_capacity));
        let mut bus = EventBus::new();
        bus.subscribe(log.clone());
        Self {
            inner: Arc::new(Shared {
                core: Mutex::new(sim),
                snapshot: RwLock::new(snapshot),
                last_summary: RwLock::new(None),
                bus: RwLock::new(bus),
                log,
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Register a sink for every event published from now on.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.inner.bus.write().subscribe(sink);
    }

    /// Newest `limit` published events, oldest first.
    pub fn recent_events(&self, limit: usize) -> Vec<SimEvent> {
        self.inner.log.recent(limit)
    }

    pub fn state(&self) -> ClockState {
        if self.inner.running.load(Ordering::Acquire) {
            ClockState::Running
        } else {
            ClockState::Idle
        }
    }

    /// Latest published snapshot. Cheap: clones an `Arc`.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot.read().clone()
    }

    pub fn last_summary(&self) -> Option<TickSummary> {
        self.inner.last_summary.read().clone()
    }

    pub fn config(&self) -> SimConfig {
        self.inner.core.lock().config().clone()
    }

    /// Run `f` against the core under its lock.
    pub fn with_core<R>(&self, f: impl FnOnce(&Simulation) -> R) -> R {
        f(&self.inner.core.lock())
    }

    /// Advance one tick and publish its snapshot and events.
    pub fn step(&self) -> TickSummary {
        let mut core = self.inner.core.lock();
        let result = core.tick_core();
        *self.inner.last_summary.write() = Some(result.summary.clone());
        self.publish(&core, &result.events);
        result.summary
    }

    pub fn inject_task(&self, spec: TaskSpec) -> Result<TaskId, DropReason> {
        self.mutate(|core| core.inject_task(spec))
    }

    /// Validated now, applied at the next tick boundary.
    pub fn set_config(&self, patch: &ConfigPatch) -> Result<(), EngineError> {
        self.inner.core.lock().set_config(patch)
    }

    pub fn apply_config(&self, config: SimConfig) -> Result<(), EngineError> {
        self.inner.core.lock().apply_config(config)
    }

    pub fn launch_carrier(&self, count: usize, node_id: &NodeId) -> Result<Vec<CarrierId>, EngineError> {
        self.mutate(|core| core.launch_carrier(count, node_id))
    }

    pub fn reset(&self) {
        self.mutate(|core| core.reset());
        *self.inner.last_summary.write() = None;
    }

    pub fn reset_with_config(&self, config: SimConfig) -> Result<(), EngineError> {
        let result = self.mutate(|core| core.reset_with_config(config));
        if result.is_ok() {
            *self.inner.last_summary.write() = None;
        }
        result
    }

    /// Apply a control operation, then republish the snapshot.
    fn mutate<R>(&self, op: impl FnOnce(&mut Simulation) -> R) -> R {
        let mut core = self.inner.core.lock();
        let result = op(&mut core);
        let events = core.take_events();
        self.publish(&core, &events);
        result
    }

    /// Publish while the core lock is held, so snapshots and events from
    /// concurrent writers land in the order they were produced.
    fn publish(&self, core: &Simulation, events: &[SimEvent]) {
        *self.inner.snapshot.write() = Arc::new(core.snapshot());
        if !events.is_empty() {
            self.inner.bus.read().publish_all(events);
        }
    }
}

// ─── Background clock ───────────────────────────────────────────────────────

#[cfg(not(target_arch = "wasm32"))]
pub use self::native::SimulationClock;

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::sync::atomic::Ordering;
    use std::sync::mpsc;
    use std::thread::{self, JoinHandle};
    use std::time::{Duration, Instant};

    use tracing::{info, warn};

    use super::{ClockError, EngineHandle};

    /// Ticks an [`EngineHandle`] every `tick_ms` on a dedicated thread.
    ///
    /// The interval is re-read each tick, so a staged `tick_ms` change takes
    /// effect without restarting the clock.
    pub struct SimulationClock {
        handle: EngineHandle,
        stop_tx: Option<mpsc::Sender<()>>,
        worker: Option<JoinHandle<()>>,
    }

    impl SimulationClock {
        pub fn new(handle: EngineHandle) -> Self {
            Self { handle, stop_tx: None, worker: None }
        }

        /// Convenience: build and start in one call.
        pub fn spawn(handle: EngineHandle) -> Result<Self, ClockError> {
            let mut clock = Self::new(handle);
            clock.start()?;
            Ok(clock)
        }

        pub fn handle(&self) -> &EngineHandle {
            &self.handle
        }

        pub fn start(&mut self) -> Result<(), ClockError> {
            let shared = &self.handle.inner;
            if shared.running.swap(true, Ordering::AcqRel) {
                return Err(ClockError::AlreadyRunning);
            }

            let handle = self.handle.clone();
            let (stop_tx, stop_rx) = mpsc::channel::<()>();
            let worker = thread::Builder::new()
                .name("orbital-clock".into())
                .spawn(move || {
                    loop {
                        let started = Instant::now();
                        handle.step();
                        let interval = Duration::from_millis(handle.config().tick_ms);
                        let wait = interval.saturating_sub(started.elapsed());
                        match stop_rx.recv_timeout(wait) {
                            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                            Err(mpsc::RecvTimeoutError::Timeout) => {}
                        }
                    }
                    handle.inner.running.store(false, Ordering::Release);
                })
                .map_err(|err| {
                    shared.running.store(false, Ordering::Release);
                    ClockError::Spawn(err.to_string())
                })?;

            info!(tick_ms = self.handle.config().tick_ms, "clock started");
            self.stop_tx = Some(stop_tx);
            self.worker = Some(worker);
            Ok(())
        }

        /// Stop after the tick in progress, if any, completes.
        pub fn stop(&mut self) -> Result<(), ClockError> {
            let Some(worker) = self.worker.take() else {
                return Err(ClockError::NotRunning);
            };
            if let Some(stop_tx) = self.stop_tx.take() {
                let _ = stop_tx.send(());
            }
            worker.join().map_err(|_| ClockError::Join)?;
            self.handle.inner.running.store(false, Ordering::Release);
            info!("clock stopped");
            Ok(())
        }
    }

    impl Drop for SimulationClock {
        fn drop(&mut self) {
            if self.worker.is_some() {
                if let Err(err) = self.stop() {
                    warn!(%err, "clock did not stop cleanly");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;
    use std::thread;

    fn handle() -> EngineHandle {
        EngineHandle::new(SimConfig::default()).unwrap()
    }

    #[test]
    fn step_publishes_snapshot_and_events() {
        let h = handle();
        let log = Arc::new(EventLog::new(100));
        h.subscribe(log.clone());

        assert_eq!(h.snapshot().tick, 0);
        let summary = h.step();
        assert_eq!(summary.tick, 1);
        assert_eq!(h.snapshot().tick, 1);
        assert_eq!(h.last_summary(), Some(summary));
        assert_eq!(log.recent(1)[0].kind.name(), "tick");
    }

    #[test]
    fn control_events_are_published_immediately() {
        let h = handle();
        let log = Arc::new(EventLog::new(100));
        h.subscribe(log.clone());

        h.inject_task(TaskSpec { energy_need: 1.0, processing_power_needed: 5.0, priority: Priority::High })
            .unwrap();
        assert_eq!(log.recent(10)[0].kind.name(), "task.created");

        h.launch_carrier(1, &NodeId::from("sat-03")).unwrap();
        let names: Vec<_> = log.recent(10).iter().map(|e| e.kind.name()).collect();
        assert!(names.contains(&"carrier.launched"));
        assert_eq!(h.snapshot().carriers.iter().filter(|c| c.target.is_some()).count(), 1);
    }

    #[test]
    fn readers_see_whole_ticks_only() {
        let h = handle();
        let writer = {
            let h = h.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    h.step();
                }
            })
        };
        let mut last = 0;
        for _ in 0..200 {
            let snap = h.snapshot();
            assert!(snap.tick >= last);
            assert!(snap.nodes.iter().all(|n| n.energy >= 0.0 && n.energy <= n.max_energy));
            last = snap.tick;
        }
        writer.join().unwrap();
        assert_eq!(h.snapshot().tick, 50);
    }

    #[test]
    fn concurrent_writers_publish_in_tick_order() {
        let h = handle();
        let writers: Vec<_> = (0..3)
            .map(|_| {
                let h = h.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        h.step();
                        let _ = h.inject_task(TaskSpec {
                            energy_need: 2.0,
                            processing_power_needed: 50.0,
                            priority: Priority::Low,
                        });
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }

        let events = h.recent_events(usize::MAX);
        assert!(events.windows(2).all(|pair| pair[0].tick <= pair[1].tick));

        let published = h.snapshot();
        let (tick, pending) = h.with_core(|core| (core.tick(), core.world().pending.len()));
        assert_eq!(published.tick, tick);
        assert_eq!(published.pending_tasks.len(), pending);
    }

    #[test]
    fn handle_log_is_bounded_by_config() {
        let cfg = SimConfig { event_log_capacity: 5, ..SimConfig::default() };
        let h = EngineHandle::new(cfg).unwrap();
        for _ in 0..10 {
            h.step();
        }
        let events = h.recent_events(100);
        assert_eq!(events.len(), 5);
        assert_eq!(events.last().map(|e| e.kind.name()), Some("tick"));
        assert_eq!(events.last().map(|e| e.tick), Some(10));
    }

    #[test]
    fn rejected_config_leaves_handle_untouched() {
        let h = handle();
        let bad = ConfigPatch { window_ticks: Some(0), ..Default::default() };
        assert!(h.set_config(&bad).is_err());
        h.step();
        assert_eq!(h.config(), SimConfig::default());
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn clock_runs_until_stopped() {
        let cfg = SimConfig { tick_ms: 1, ..SimConfig::default() };
        let h = EngineHandle::new(cfg).unwrap();
        let mut clock = SimulationClock::spawn(h.clone()).unwrap();
        assert_eq!(h.state(), ClockState::Running);
        assert_eq!(SimulationClock::new(h.clone()).start(), Err(ClockError::AlreadyRunning));

        while h.snapshot().tick < 5 {
            thread::yield_now();
        }
        h.set_config(&ConfigPatch { harvest_rate: Some(6.0), ..Default::default() }).unwrap();
        while h.config().harvest_rate != 6.0 {
            thread::yield_now();
        }

        clock.stop().unwrap();
        assert_eq!(h.state(), ClockState::Idle);
        let stopped_at = h.snapshot().tick;
        thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(h.snapshot().tick, stopped_at);
        assert_eq!(clock.stop(), Err(ClockError::NotRunning));
    }
}
