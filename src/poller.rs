//! Input Poller (spec §4.2): drives every open physical device at a fixed
//! rate on a dedicated worker thread, emitting change-filtered [`Sample`]s.
//!
//! Grounded on the fixed-interval poll loop in
//! `other_examples/.../Rust-vJoy-Manager/src/input/mod.rs`
//! (measure-then-sleep-remainder pattern), combined with the teacher's
//! per-device draining convention in `backends/windows/hid_device.rs`
//! (`MAX_REPORTS_PER_TICK`).

use crate::device::DeviceRegistry;
use crate::event::Sample;
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub const DEFAULT_RATE_HZ: u32 = 500;
const JITTER_EPSILON: f32 = 0.01;

/// Which enumeration backend feeds the registry this run (spec §4.2 "Two
/// backends are supported and independently selectable per run").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputBackend {
    Hid,
    XInput,
    Both,
}

pub enum PollerEvent {
    InputReceived(Sample),
    DeviceConnected(String),
    DeviceDisconnected(String),
}

struct SharedState {
    last_samples: HashMap<String, Sample>,
}

/// Background worker driving the poll loop. Stopping is bounded by one
/// poll period: the loop checks the stop flag once per tick (spec §5
/// "stop_async returns ... bounded by one poll period").
pub struct InputPoller {
    registry: Arc<Mutex<DeviceRegistry>>,
    shared: Arc<Mutex<SharedState>>,
    only_fire_on_change: bool,
    handle: Option<JoinHandle<()>>,
    stop_tx: Option<mpsc::Sender<()>>,
    events_rx: Option<mpsc::Receiver<PollerEvent>>,
}

impl InputPoller {
    pub fn new(registry: Arc<Mutex<DeviceRegistry>>) -> Self {
        Self {
            registry,
            shared: Arc::new(Mutex::new(SharedState {
                last_samples: HashMap::new(),
            })),
            only_fire_on_change: false,
            handle: None,
            stop_tx: None,
            events_rx: None,
        }
    }

    pub fn set_only_fire_on_change(&mut self, value: bool) {
        self.only_fire_on_change = value;
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawn the worker thread at `rate_hz` (spec §4.2 "500-1000 Hz
    /// expected; default 500").
    pub fn start(&mut self, rate_hz: u32) -> mpsc::Receiver<PollerEvent> {
        let rate_hz = rate_hz.max(1);
        let period = Duration::from_secs_f64(1.0 / rate_hz as f64);
        let (stop_tx, stop_rx) = mpsc::channel();
        let (events_tx, events_rx) = mpsc::channel();
        let registry = Arc::clone(&self.registry);
        let shared = Arc::clone(&self.shared);
        let only_fire_on_change = self.only_fire_on_change;

        let handle = std::thread::spawn(move || {
            run_loop(registry, shared, period, only_fire_on_change, stop_rx, events_tx);
        });

        self.handle = Some(handle);
        self.stop_tx = Some(stop_tx);
        events_rx
    }

    /// Signal the worker to stop and block until it has released control
    /// of the thread (spec §4.2 `stop`).
    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Non-blocking cancellation request; poll [`InputPoller::is_running`]
    /// or join the returned handle to observe completion (spec §4.2
    /// `stop_async`).
    pub fn stop_async(&mut self) -> Option<JoinHandle<()>> {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        self.handle.take()
    }

    pub fn get_device_state(&self, device_id: &str) -> Option<Sample> {
        self.shared
            .lock()
            .unwrap()
            .last_samples
            .get(device_id)
            .cloned()
    }
}

fn run_loop(
    registry: Arc<Mutex<DeviceRegistry>>,
    shared: Arc<Mutex<SharedState>>,
    period: Duration,
    only_fire_on_change: bool,
    stop_rx: mpsc::Receiver<()>,
    events_tx: mpsc::Sender<PollerEvent>,
) {
    let mut known_open: std::collections::HashSet<String> = std::collections::HashSet::new();
    loop {
        let tick_start = Instant::now();
        if stop_rx.try_recv().is_ok() {
            break;
        }

        let open_ids = {
            let reg = registry.lock().unwrap();
            reg.open_device_ids()
        };

        for id in &open_ids {
            if known_open.insert(id.clone()) {
                let _ = events_tx.send(PollerEvent::DeviceConnected(id.clone()));
            }
            let events = {
                let mut reg = registry.lock().unwrap();
                reg.poll_device(id)
            };
            let mut sample = Sample::empty(id.clone());
            for ev in &events {
                sample.apply(ev);
            }

            let mut state = shared.lock().unwrap();
            let suppress = only_fire_on_change
                && state
                    .last_samples
                    .get(id)
                    .map(|prev| prev.within_jitter(&sample, JITTER_EPSILON))
                    .unwrap_or(false);
            state.last_samples.insert(id.clone(), sample.clone());
            drop(state);

            if !suppress {
                let _ = events_tx.send(PollerEvent::InputReceived(sample));
            }
        }

        for stale in known_open.clone() {
            if !open_ids.contains(&stale) {
                known_open.remove(&stale);
                let _ = events_tx.send(PollerEvent::DeviceDisconnected(stale));
            }
        }

        let elapsed = tick_start.elapsed();
        if elapsed < period {
            std::thread::sleep(period - elapsed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InputKind;

    #[test]
    fn get_device_state_reflects_last_sample_without_worker() {
        let registry = Arc::new(Mutex::new(DeviceRegistry::new()));
        let poller = InputPoller::new(registry);
        assert!(poller.get_device_state("missing").is_none());
    }

    #[test]
    fn jitter_suppression_matches_sample_within_jitter() {
        let mut a = Sample::empty("dev");
        a.apply(&InputKind::AxisMoved { axis: 0, value: 0.5 });
        let mut b = a.clone();
        b.apply(&InputKind::AxisMoved { axis: 0, value: 0.505 });
        assert!(a.within_jitter(&b, JITTER_EPSILON));
        let mut c = a.clone();
        c.apply(&InputKind::AxisMoved { axis: 0, value: 0.6 });
        assert!(!a.within_jitter(&c, JITTER_EPSILON));
    }
}
