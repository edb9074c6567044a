//! Input-Detection Service (spec §4.7): briefly listen across every open
//! device for the next meaningful input event, for use by a "press a
//! button to bind" UI flow.
//!
//! Grounded on the teacher's `backends/windows/hidp_parser.rs` warmup/quirk
//! pattern of discarding the first few samples before trusting a device's
//! reported range, generalized here into an explicit baseline-capture
//! phase; driven by [`crate::event::Sample`] the same way the Mapping
//! Engine is.

use crate::event::{ChannelKind, InputSource, Sample};
use std::collections::HashMap;
use std::time::{Duration, Instant};

const WARMUP_SAMPLES: usize = 3;
const BASELINE_SAMPLES: usize = 15;
const DEFLECTION_THRESHOLD: f32 = 0.70;
const CONFIRM_SAMPLES: u32 = 3;
/// An axis whose baseline samples vary by more than this is treated as
/// "high-variance" and compared against its instantaneous value rather
/// than its mean (spec §4.7 "High-variance axes").
const HIGH_VARIANCE_SPREAD: f32 = 0.15;

/// What channel kinds a caller is willing to have reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionFilter {
    Buttons,
    Axes,
    Hats,
    Any,
}

impl DetectionFilter {
    fn allows(&self, kind: ChannelKind) -> bool {
        match self {
            DetectionFilter::Any => true,
            DetectionFilter::Buttons => kind == ChannelKind::Button,
            DetectionFilter::Axes => kind == ChannelKind::Axis,
            DetectionFilter::Hats => kind == ChannelKind::Hat,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedInput {
    pub source: InputSource,
    pub value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Warmup,
    Baseline,
    Armed,
}

struct AxisBaseline {
    samples: Vec<f32>,
    mean: f32,
    high_variance: bool,
    consecutive: u32,
}

/// One in-flight `wait_for_input` call's accumulated state. Owned
/// exclusively by [`InputDetectionService`] so a second concurrent call is
/// rejected with `DetectionBusy` (spec §4.7 "Only one detection may be in
/// flight").
struct Session {
    filter: DetectionFilter,
    deadline: Instant,
    phase: Phase,
    warmup_seen: usize,
    baseline: HashMap<(String, u16), AxisBaseline>,
    baseline_button: HashMap<(String, u16), bool>,
    baseline_hat: HashMap<(String, u16), i16>,
}

impl Session {
    fn new(filter: DetectionFilter, timeout: Duration) -> Self {
        Self {
            filter,
            deadline: Instant::now() + timeout,
            phase: Phase::Warmup,
            warmup_seen: 0,
            baseline: HashMap::new(),
            baseline_button: HashMap::new(),
            baseline_hat: HashMap::new(),
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Feed one sample through the session's state machine. Returns
    /// `Some` once an event crosses an activation threshold.
    fn feed(&mut self, sample: &Sample) -> Option<DetectedInput> {
        match self.phase {
            Phase::Warmup => {
                self.warmup_seen += 1;
                if self.warmup_seen >= WARMUP_SAMPLES {
                    self.phase = Phase::Baseline;
                }
                None
            }
            Phase::Baseline => {
                self.accumulate_baseline(sample);
                if self.baseline_ready() {
                    self.finalize_baseline();
                    self.phase = Phase::Armed;
                }
                None
            }
            Phase::Armed => self.check_armed(sample),
        }
    }

    fn accumulate_baseline(&mut self, sample: &Sample) {
        for (idx, &v) in sample.axes.iter().enumerate() {
            let key = (sample.device_id.clone(), idx as u16);
            let entry = self.baseline.entry(key).or_insert_with(|| AxisBaseline {
                samples: Vec::with_capacity(BASELINE_SAMPLES),
                mean: 0.0,
                high_variance: false,
                consecutive: 0,
            });
            if entry.samples.len() < BASELINE_SAMPLES {
                entry.samples.push(v);
            }
        }
        for (idx, &v) in sample.buttons.iter().enumerate() {
            self.baseline_button
                .entry((sample.device_id.clone(), idx as u16))
                .or_insert(v);
        }
        for (idx, &v) in sample.hats.iter().enumerate() {
            self.baseline_hat
                .entry((sample.device_id.clone(), idx as u16))
                .or_insert(v);
        }
    }

    fn baseline_ready(&self) -> bool {
        self.baseline
            .values()
            .all(|b| b.samples.len() >= BASELINE_SAMPLES)
    }

    fn finalize_baseline(&mut self) {
        for b in self.baseline.values_mut() {
            let n = b.samples.len().max(1) as f32;
            b.mean = b.samples.iter().sum::<f32>() / n;
            let spread = b
                .samples
                .iter()
                .cloned()
                .fold(0.0_f32, f32::max)
                - b.samples.iter().cloned().fold(0.0_f32, f32::min);
            b.high_variance = spread > HIGH_VARIANCE_SPREAD;
        }
    }

    fn check_armed(&mut self, sample: &Sample) -> Option<DetectedInput> {
        if self.filter.allows(ChannelKind::Button) {
            for (idx, &v) in sample.buttons.iter().enumerate() {
                let key = (sample.device_id.clone(), idx as u16);
                let was_held = self.baseline_button.get(&key).copied().unwrap_or(false);
                if v && !was_held {
                    return Some(DetectedInput {
                        source: InputSource {
                            device_id: sample.device_id.clone(),
                            kind: ChannelKind::Button,
                            index: idx as u16,
                        },
                        value: 1.0,
                    });
                }
            }
        }
        if self.filter.allows(ChannelKind::Hat) {
            for (idx, &v) in sample.hats.iter().enumerate() {
                let key = (sample.device_id.clone(), idx as u16);
                let baseline = self.baseline_hat.get(&key).copied().unwrap_or(-1);
                if v >= 0 && v != baseline {
                    return Some(DetectedInput {
                        source: InputSource {
                            device_id: sample.device_id.clone(),
                            kind: ChannelKind::Hat,
                            index: idx as u16,
                        },
                        value: v as f32,
                    });
                }
            }
        }
        if self.filter.allows(ChannelKind::Axis) {
            for (idx, &v) in sample.axes.iter().enumerate() {
                let key = (sample.device_id.clone(), idx as u16);
                let Some(b) = self.baseline.get_mut(&key) else {
                    continue;
                };
                let reference = if b.high_variance { v } else { b.mean };
                let deflection = (v - reference).abs();
                if deflection >= DEFLECTION_THRESHOLD {
                    b.consecutive += 1;
                } else {
                    b.consecutive = 0;
                }
                if b.consecutive >= CONFIRM_SAMPLES {
                    return Some(DetectedInput {
                        source: InputSource {
                            device_id: sample.device_id.clone(),
                            kind: ChannelKind::Axis,
                            index: idx as u16,
                        },
                        value: v,
                    });
                }
            }
        }
        None
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("a detection is already in flight")]
    Busy,
}

/// Blocking "bind the next input" helper. A caller supplies samples one at
/// a time (via a poller callback, a channel, or a test harness); the
/// service owns no thread of its own (spec §9 "pick one idiomatic form" —
/// the blocking-with-timeout shape was chosen here).
#[derive(Default)]
pub struct InputDetectionService {
    session: Option<Session>,
}

impl InputDetectionService {
    pub fn new() -> Self {
        Self { session: None }
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_some()
    }

    /// Begin a detection window. Fails with [`DetectionError::Busy`] if one
    /// is already active.
    pub fn begin(
        &mut self,
        timeout: Duration,
        filter: DetectionFilter,
    ) -> Result<(), DetectionError> {
        if self.session.is_some() {
            return Err(DetectionError::Busy);
        }
        self.session = Some(Session::new(filter, timeout));
        Ok(())
    }

    /// Immediately abandon the in-flight session; the caller's pending
    /// `wait_for_input` resolves to `None` (spec §4.7 "Cancellation is
    /// immediate").
    pub fn cancel(&mut self) {
        self.session = None;
    }

    /// Feed one sample to the in-flight session, if any. Returns
    /// `Some(detected)` the moment an activation threshold is crossed, or
    /// `Some(None)` once the session times out (distinguishing "still
    /// waiting" from "timed out with nothing found").
    pub fn feed(&mut self, sample: &Sample) -> Option<Option<DetectedInput>> {
        let session = self.session.as_mut()?;
        if let Some(found) = session.feed(sample) {
            self.session = None;
            return Some(Some(found));
        }
        if session.expired() {
            self.session = None;
            return Some(None);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_with_axis(device: &str, value: f32) -> Sample {
        let mut s = Sample::empty(device);
        s.axes = vec![value];
        s
    }

    #[test]
    fn baseline_then_deflection_detects_axis() {
        let mut svc = InputDetectionService::new();
        svc.begin(Duration::from_secs(5), DetectionFilter::Axes).unwrap();

        for _ in 0..WARMUP_SAMPLES {
            assert!(svc.feed(&sample_with_axis("stick", 0.0)).is_none());
        }
        for _ in 0..BASELINE_SAMPLES {
            assert!(svc.feed(&sample_with_axis("stick", 0.0)).is_none());
        }

        // Two confirming samples: not yet 3 consecutive.
        assert!(svc.feed(&sample_with_axis("stick", 0.9)).is_none());
        assert!(svc.feed(&sample_with_axis("stick", 0.9)).is_none());
        let result = svc.feed(&sample_with_axis("stick", 0.9));
        let detected = result.unwrap().unwrap();
        assert_eq!(detected.source.kind, ChannelKind::Axis);
        assert_eq!(detected.source.index, 0);
    }

    #[test]
    fn busy_rejects_second_call() {
        let mut svc = InputDetectionService::new();
        svc.begin(Duration::from_secs(5), DetectionFilter::Buttons)
            .unwrap();
        assert!(matches!(
            svc.begin(Duration::from_secs(5), DetectionFilter::Buttons),
            Err(DetectionError::Busy)
        ));
    }

    #[test]
    fn cancel_clears_in_flight_session() {
        let mut svc = InputDetectionService::new();
        svc.begin(Duration::from_secs(5), DetectionFilter::Buttons)
            .unwrap();
        svc.cancel();
        assert!(!svc.is_busy());
    }

    #[test]
    fn button_press_edge_detected_immediately() {
        let mut svc = InputDetectionService::new();
        svc.begin(Duration::from_secs(5), DetectionFilter::Buttons)
            .unwrap();
        let mut s = Sample::empty("pad");
        s.buttons = vec![false];
        for _ in 0..(WARMUP_SAMPLES + BASELINE_SAMPLES) {
            assert!(svc.feed(&s).is_none());
        }
        let mut pressed = Sample::empty("pad");
        pressed.buttons = vec![true];
        let result = svc.feed(&pressed).unwrap().unwrap();
        assert_eq!(result.source.kind, ChannelKind::Button);
    }
}
