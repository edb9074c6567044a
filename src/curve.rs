//! Curve/Deadzone Math (spec §4.4): pure, stateless transformation
//! primitives on normalized floats.
//!
//! Grounded on the teacher's `binding.rs` `AxisTransform::apply` pipeline
//! shape (deadzone → invert → curve → gain → clamp), generalized to the
//! exact 4-edge deadzone / saturation / curve-kind formulas required here.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    Linear,
    SCurve,
    Exponential,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadzoneMode {
    Centered,
    EndOnly,
}

/// One (input, output) control point for the `Custom` curve, both in `[0,1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlPoint {
    pub input: f32,
    pub output: f32,
}

/// Full axis-curve descriptor (spec §3 "Axis Curve").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisCurve {
    pub curve_kind: CurveKind,
    /// Curvature in `[-1, 1]`. Ignored for `Linear` and `Custom`.
    pub curvature: f32,
    pub deadzone_mode: DeadzoneMode,
    pub low: f32,
    pub center_low: f32,
    pub center_high: f32,
    pub high: f32,
    pub saturation: f32,
    pub inverted: bool,
    /// Only meaningful for `CurveKind::Custom`. Must be anchored at
    /// `(0,0)` and `(1,1)` with strictly increasing `input`.
    pub control_points: Vec<ControlPoint>,
}

impl Default for AxisCurve {
    fn default() -> Self {
        Self {
            curve_kind: CurveKind::Linear,
            curvature: 0.0,
            deadzone_mode: DeadzoneMode::Centered,
            low: -1.0,
            center_low: 0.0,
            center_high: 0.0,
            high: 1.0,
            saturation: 1.0,
            inverted: false,
            control_points: Vec::new(),
        }
    }
}

impl AxisCurve {
    /// Evaluate the 5-step axis transform in the exact order spec §4.4.1
    /// requires: deadzone → saturation → curve → inversion → sign.
    pub fn apply(&self, v: f32) -> f32 {
        let v = v.clamp(-1.0, 1.0);
        let after_deadzone = self.deadzone(v);
        let saturated = Self::saturate(after_deadzone, self.saturation);
        let magnitude = saturated.abs();
        let curved = self.curve(magnitude);
        let curved = if self.inverted { 1.0 - curved } else { curved };
        curved.clamp(0.0, 1.0) * saturated.signum()
    }

    fn deadzone(&self, v: f32) -> f32 {
        match self.deadzone_mode {
            DeadzoneMode::Centered => {
                if v >= 0.0 {
                    ((v - self.center_high) / (self.high - self.center_high)).clamp(0.0, 1.0)
                } else {
                    ((v - self.center_low) / (self.low - self.center_low).abs()).clamp(-1.0, 0.0)
                }
            }
            DeadzoneMode::EndOnly => {
                let u = (v + 1.0) / 2.0;
                let lo = (self.low + 1.0) / 2.0;
                let hi = (self.high + 1.0) / 2.0;
                let clamped = if u <= lo {
                    0.0
                } else if u >= hi {
                    1.0
                } else if hi > lo {
                    (u - lo) / (hi - lo)
                } else {
                    0.0
                };
                clamped * 2.0 - 1.0
            }
        }
    }

    fn saturate(v: f32, s: f32) -> f32 {
        if s <= 0.0 {
            return v.signum();
        }
        if v.abs() >= s {
            v.signum()
        } else {
            v / s
        }
    }

    fn curve(&self, magnitude: f32) -> f32 {
        let x = magnitude.clamp(0.0, 1.0);
        match self.curve_kind {
            CurveKind::Linear => x,
            CurveKind::SCurve => {
                let c = self.curvature;
                if c >= 0.0 {
                    x.powf(1.0 + 2.0 * c)
                } else {
                    x.powf(1.0 / (1.0 - 2.0 * c))
                }
            }
            CurveKind::Exponential => {
                let c = self.curvature.clamp(-1.0, 1.0);
                x.powf(1.0 + 2.0 * c)
            }
            CurveKind::Custom => catmull_rom_spline(&self.control_points, x),
        }
    }
}

/// Piecewise Catmull-Rom spline across sorted control points, anchored at
/// `(0,0)`/`(1,1)`, with reflected virtual endpoints and linear
/// extrapolation outside `[0,1]` (spec §4.4.1 step 3, Custom).
fn catmull_rom_spline(points: &[ControlPoint], x: f32) -> f32 {
    if points.len() < 2 {
        return x;
    }
    if x <= points[0].input {
        return points[0].output;
    }
    if x >= points[points.len() - 1].input {
        return points[points.len() - 1].output;
    }

    let i = match points
        .windows(2)
        .position(|w| x >= w[0].input && x <= w[1].input)
    {
        Some(i) => i,
        None => return x,
    };

    let p1 = points[i];
    let p2 = points[i + 1];
    // Reflect virtual endpoints when there is no neighbor.
    let p0 = if i == 0 {
        ControlPoint {
            input: p1.input - (p2.input - p1.input),
            output: p1.output - (p2.output - p1.output),
        }
    } else {
        points[i - 1]
    };
    let p3 = if i + 2 >= points.len() {
        ControlPoint {
            input: p2.input + (p2.input - p1.input),
            output: p2.output + (p2.output - p1.output),
        }
    } else {
        points[i + 2]
    };

    let span = p2.input - p1.input;
    if span <= 0.0 {
        return p1.output;
    }
    let t = (x - p1.input) / span;
    let t2 = t * t;
    let t3 = t2 * t;

    0.5 * ((2.0 * p1.output)
        + (-p0.output + p2.output) * t
        + (2.0 * p0.output - 5.0 * p1.output + 4.0 * p2.output - p3.output) * t2
        + (-p0.output + 3.0 * p1.output - 3.0 * p2.output + p3.output) * t3)
}

/// Multi-input merge operator (spec §4.3 "Multi-input merge operator on N
/// values"). Empty input is a no-op represented here as `0.0`; callers must
/// check `values.is_empty()` themselves when a no-op should skip the write
/// entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOp {
    Average,
    Minimum,
    Maximum,
    Sum,
}

impl MergeOp {
    pub fn apply(&self, values: &[f32]) -> f32 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            MergeOp::Average => values.iter().sum::<f32>() / values.len() as f32,
            MergeOp::Minimum => values.iter().cloned().fold(f32::INFINITY, f32::min),
            MergeOp::Maximum => values.iter().cloned().fold(f32::NEG_INFINITY, f32::max),
            // Open question (b): full sum, then clamp; no short-circuit.
            MergeOp::Sum => values.iter().sum::<f32>().clamp(-1.0, 1.0),
        }
    }
}

/// Four cardinal directions a discrete POV can resolve to (spec §4.3
/// "Quadrant encoding").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    North,
    East,
    South,
    West,
}

/// Map a POV angle in degrees (`0` = up, growing clockwise) to a cardinal
/// quadrant, or `None` when `angle_deg < 0` (neutral).
///
/// Boundaries (45/135/225/315) map to the clockwise-next quadrant per
/// invariant 13; `359°` and `0°` both map to North.
pub fn quadrant_of(angle_deg: f32) -> Option<Quadrant> {
    if angle_deg < 0.0 {
        return None;
    }
    let a = angle_deg.rem_euclid(360.0);
    Some(if a < 45.0 || a >= 315.0 {
        Quadrant::North
    } else if a < 135.0 {
        Quadrant::East
    } else if a < 225.0 {
        Quadrant::South
    } else {
        Quadrant::West
    })
}

/// Button activation mode (spec §4.4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonMode {
    Normal,
    Toggle,
    Pulse,
    HoldToActivate,
}

/// Runtime state for one button mapping's mode state machine. Reset on
/// `load_profile` and `stop` (spec §4.4.2 "All runtime state is reset").
#[derive(Debug, Clone, Default)]
pub struct ButtonModeState {
    pub toggle_latch: bool,
    pub timer_start: Option<std::time::Instant>,
    was_held: bool,
}

impl ButtonModeState {
    /// Advance the state machine by one sample and return the sink-visible
    /// output for this sample.
    pub fn step(
        &mut self,
        mode: ButtonMode,
        held: bool,
        pulse_ms: u64,
        hold_ms: u64,
        now: std::time::Instant,
    ) -> bool {
        let rising = held && !self.was_held;
        let falling = !held && self.was_held;
        self.was_held = held;

        let out = match mode {
            ButtonMode::Normal => held,
            ButtonMode::Toggle => {
                if rising {
                    self.toggle_latch = !self.toggle_latch;
                }
                self.toggle_latch
            }
            ButtonMode::Pulse => {
                if rising {
                    self.timer_start = Some(now);
                }
                if falling {
                    self.timer_start = None;
                }
                match self.timer_start {
                    Some(t0) => (now.duration_since(t0).as_millis() as u64) < pulse_ms,
                    None => false,
                }
            }
            ButtonMode::HoldToActivate => {
                if rising {
                    self.timer_start = Some(now);
                }
                if falling {
                    self.timer_start = None;
                }
                match self.timer_start {
                    Some(t0) => (now.duration_since(t0).as_millis() as u64) >= hold_ms,
                    None => false,
                }
            }
        };
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_a_curve() -> AxisCurve {
        AxisCurve {
            curve_kind: CurveKind::Linear,
            curvature: 0.0,
            deadzone_mode: DeadzoneMode::Centered,
            low: -1.0,
            center_low: -0.05,
            center_high: 0.05,
            high: 1.0,
            saturation: 1.0,
            inverted: false,
            control_points: Vec::new(),
        }
    }

    #[test]
    fn scenario_a_centered_deadzone() {
        let c = scenario_a_curve();
        let inputs = [-1.0f32, -0.04, 0.0, 0.04, 0.5, 1.0];
        let expected = [-1.0f32, 0.0, 0.0, 0.0, 0.4737, 1.0];
        for (v, e) in inputs.iter().zip(expected.iter()) {
            assert!((c.apply(*v) - e).abs() < 1e-3, "v={v} got={}", c.apply(*v));
        }
    }

    #[test]
    fn invariant_1_zero_inside_centered_deadzone() {
        let c = scenario_a_curve();
        for tenth in -49..=49 {
            let v = tenth as f32 / 1000.0; // within (-0.05, 0.05)
            assert_eq!(c.apply(v), 0.0);
        }
    }

    #[test]
    fn invariant_2_bounded_and_sign_preserving() {
        let c = scenario_a_curve();
        for i in -100..=100 {
            let v = i as f32 / 100.0;
            let out = c.apply(v);
            assert!(out.abs() <= 1.0 + 1e-6);
            if v.abs() > 0.05 {
                assert_eq!(out.signum(), v.signum(), "v={v} out={out}");
            }
        }
    }

    #[test]
    fn invariant_11_saturation_boundary() {
        let mut c = scenario_a_curve();
        c.saturation = 0.8;
        assert!((c.apply(0.8) - 1.0).abs() < 1e-5);
        assert!((c.apply(-0.8) + 1.0).abs() < 1e-5);
    }

    #[test]
    fn invariant_12_center_high_boundary_continuous() {
        let c = scenario_a_curve();
        assert_eq!(c.apply(0.05), 0.0);
        let just_above = c.apply(0.0501);
        assert!(just_above > 0.0 && just_above < 0.01);
    }

    #[test]
    fn invariant_13_quadrant_boundaries() {
        assert_eq!(quadrant_of(0.0), Some(Quadrant::North));
        assert_eq!(quadrant_of(359.0), Some(Quadrant::North));
        assert_eq!(quadrant_of(44.9), Some(Quadrant::North));
        assert_eq!(quadrant_of(45.0), Some(Quadrant::East));
        assert_eq!(quadrant_of(135.0), Some(Quadrant::South));
        assert_eq!(quadrant_of(225.0), Some(Quadrant::West));
        assert_eq!(quadrant_of(315.0), Some(Quadrant::North));
        assert_eq!(quadrant_of(-1.0), None);
    }

    #[test]
    fn invariant_14_custom_two_point_identity_is_linear() {
        let mut c = scenario_a_curve();
        c.curve_kind = CurveKind::Custom;
        c.deadzone_mode = DeadzoneMode::EndOnly;
        c.low = -1.0;
        c.high = 1.0;
        c.control_points = vec![
            ControlPoint { input: 0.0, output: 0.0 },
            ControlPoint { input: 1.0, output: 1.0 },
        ];
        for i in 0..=10 {
            let v = i as f32 / 10.0;
            assert!((c.apply(v) - v).abs() < 1e-4, "v={v} got={}", c.apply(v));
        }
    }

    #[test]
    fn invariant_15_sum_merge_clamps() {
        let op = MergeOp::Sum;
        assert_eq!(op.apply(&[0.7, 0.7, 0.7]), 1.0);
        assert_eq!(op.apply(&[-0.7, -0.7]), -1.0);
        assert_eq!(op.apply(&[0.2, 0.2]), 0.4);
    }

    #[test]
    fn button_mode_toggle_scenario_b() {
        let mut st = ButtonModeState::default();
        let t0 = std::time::Instant::now();
        let edges = [true, true, false, false, true, true, false, false, true, true, false, false];
        let mut outs = Vec::new();
        for held in edges {
            outs.push(st.step(ButtonMode::Toggle, held, 0, 0, t0));
        }
        // rising-edge transitions occur at positions 0, 4, 8 (true after a false)
        assert_eq!(outs[0], true);
        assert_eq!(outs[1], true);
        assert_eq!(outs[4], false);
        assert_eq!(outs[5], false);
        assert_eq!(outs[8], true);
        assert_eq!(outs[9], true);
    }

    #[test]
    fn button_mode_hold_to_activate_scenario_c() {
        let mut st = ButtonModeState::default();
        let t0 = std::time::Instant::now();
        assert_eq!(st.step(ButtonMode::HoldToActivate, true, 0, 500, t0), false);
        let mid = t0 + std::time::Duration::from_millis(300);
        assert_eq!(st.step(ButtonMode::HoldToActivate, true, 0, 500, mid), false);
        let after = t0 + std::time::Duration::from_millis(550);
        assert_eq!(st.step(ButtonMode::HoldToActivate, true, 0, 500, after), true);
        let released = t0 + std::time::Duration::from_millis(600);
        assert_eq!(st.step(ButtonMode::HoldToActivate, false, 0, 500, released), false);
    }
}
