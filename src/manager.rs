//! Top-level orchestrator wiring the Device Registry, Input Poller,
//! Mapping Engine, Profile Store, Input-Detection Service, and App
//! Settings together into the single façade a UI or headless host drives
//! (spec §2 "System Overview", §9 "one obvious owner of shared state").
//!
//! Grounded on the teacher's original `DeviceManager` (HID discovery +
//! `poll_all`/`snapshot`) for the overall shape of "one struct owns every
//! device handle, lives on one thread, and is polled or pumped from the
//! caller's loop" — rewritten because the teacher's version had no
//! profile/mapping concept, and its discovery was tangled directly into
//! the struct constructor rather than an explicit `rescan`.

use crate::detection::{DetectedInput, DetectionError, DetectionFilter, InputDetectionService};
use crate::device::DeviceRegistry;
use crate::error::Result;
use crate::event::Sample;
use crate::keystroke::KeySender;
use crate::mapping::engine::MappingEngine;
use crate::mapping::MappingProfile;
use crate::poller::{InputPoller, PollerEvent};
use crate::profile_store::ProfileStore;
use crate::settings::AppSettings;
use crate::virtual_sink::VirtualDeviceSink;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Surfaced to the caller's pump loop: device topology changes, input
/// routed through the active profile, or a detection result.
pub enum ManagerEvent {
    DeviceConnected(String),
    DeviceDisconnected(String),
    DetectionResolved(Option<DetectedInput>),
}

/// Owns every device handle and lives on one thread (spec §5 "single
/// owner"); a UI or headless host drives it by calling [`Manager::pump`]
/// from its own event loop.
pub struct Manager<V: VirtualDeviceSink, K: KeySender> {
    registry: Arc<Mutex<DeviceRegistry>>,
    poller: InputPoller,
    events_rx: Option<mpsc::Receiver<PollerEvent>>,
    engine: MappingEngine<V, K>,
    detection: InputDetectionService,
    samples: HashMap<String, Sample>,
    pub profiles: ProfileStore,
    pub settings: AppSettings,
    settings_path: PathBuf,
}

impl<V: VirtualDeviceSink, K: KeySender> Manager<V, K> {
    pub fn new(
        profiles_root: impl Into<PathBuf>,
        settings_path: impl Into<PathBuf>,
        active_profile: MappingProfile,
        sink: V,
        key_sender: K,
    ) -> Self {
        let settings_path = settings_path.into();
        let settings = AppSettings::load_or_default(&settings_path);
        let registry = Arc::new(Mutex::new(DeviceRegistry::new()));
        Self {
            poller: InputPoller::new(Arc::clone(&registry)),
            registry,
            events_rx: None,
            engine: MappingEngine::new(active_profile, sink, key_sender),
            detection: InputDetectionService::new(),
            samples: HashMap::new(),
            profiles: ProfileStore::new(profiles_root),
            settings,
            settings_path,
        }
    }

    /// Re-enumerate physical devices for the given backend selection
    /// (spec §4.2 "independently selectable per run"), merging into the
    /// existing registry by identity (spec §4.1), and open every touched
    /// device for polling. Returns the ids touched by this scan.
    #[cfg(windows)]
    pub fn rescan(&mut self, backend: crate::poller::InputBackend) -> Result<Vec<String>> {
        let api = hidapi::HidApi::new()
            .map_err(|e| crate::error::AsteriqError::DeviceEnumerationFailure(e.to_string()))?;
        let found = crate::backends::windows::probe_for_backend(&api, backend);
        let mut registry = self.registry.lock().unwrap();
        let touched = registry.enumerate(found);
        for id in &touched {
            registry.open(id);
        }
        Ok(touched)
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    pub fn save_settings(&self) -> Result<()> {
        self.settings.save(&self.settings_path)
    }

    /// Start the poller thread and the mapping engine together (they
    /// start/stop as a unit from the caller's perspective).
    pub fn start(&mut self, rate_hz: u32) -> std::result::Result<(), String> {
        self.events_rx = Some(self.poller.start(rate_hz));
        self.engine.start(None)
    }

    pub fn stop(&mut self) {
        self.poller.stop();
        self.events_rx = None;
        self.engine.stop();
    }

    /// Drain every poller event currently queued, routing input through
    /// the mapping engine and the detection service, without blocking.
    pub fn pump(&mut self) -> Vec<ManagerEvent> {
        let mut out = Vec::new();
        let Some(rx) = self.events_rx.as_ref() else {
            return out;
        };
        while let Ok(event) = rx.try_recv() {
            match event {
                PollerEvent::InputReceived(sample) => {
                    if let Some(resolved) = self.detection.feed(&sample) {
                        out.push(ManagerEvent::DetectionResolved(resolved));
                    }
                    self.engine.process_input(&mut self.samples, sample);
                }
                PollerEvent::DeviceConnected(id) => out.push(ManagerEvent::DeviceConnected(id)),
                PollerEvent::DeviceDisconnected(id) => {
                    out.push(ManagerEvent::DeviceDisconnected(id))
                }
            }
        }
        out
    }

    pub fn load_profile(&mut self, id: &str) -> Result<()> {
        let profile = self.profiles.load(id)?;
        self.engine
            .load_profile(profile)
            .map_err(crate::error::AsteriqError::ProfileFormatError)?;
        self.settings.last_used_profile_id = Some(id.to_string());
        Ok(())
    }

    pub fn begin_detection(
        &mut self,
        timeout: Duration,
        filter: DetectionFilter,
    ) -> std::result::Result<(), DetectionError> {
        self.detection.begin(timeout, filter)
    }

    pub fn cancel_detection(&mut self) {
        self.detection.cancel();
    }

    pub fn device_state(&self, device_id: &str) -> Option<Sample> {
        self.samples.get(device_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystroke::KeySender;
    use crate::virtual_sink::FakeVirtualSink;

    struct NullSender;
    impl KeySender for NullSender {
        fn send_key_down(&mut self, _vk: u16, _extended: bool) {}
        fn send_key_up(&mut self, _vk: u16, _extended: bool) {}
    }

    fn empty_profile() -> MappingProfile {
        MappingProfile {
            id: "p1".into(),
            name: "test".into(),
            description: String::new(),
            created_at: String::new(),
            modified_at: String::new(),
            slot_assignments: Vec::new(),
            shift_layers: Vec::new(),
            axis_mappings: Vec::new(),
            button_mappings: Vec::new(),
            hat_mappings: Vec::new(),
            axis_to_button_mappings: Vec::new(),
            button_to_axis_mappings: Vec::new(),
        }
    }

    #[test]
    fn pump_with_no_poller_running_returns_empty() {
        let tmp = std::env::temp_dir().join(format!("asteriq-manager-test-{}", std::process::id()));
        let settings_path = tmp.join("appsettings.json");
        let mut mgr = Manager::new(
            tmp.join("profiles"),
            settings_path,
            empty_profile(),
            FakeVirtualSink::default(),
            NullSender,
        );
        assert!(mgr.pump().is_empty());
        std::fs::remove_dir_all(&tmp).ok();
    }
}
