//! Journey progress, easing and marker placement.

use bevy::math::DVec2;
use serde::{Deserialize, Serialize};

use super::trail::Segment;

/// Easing applied to the linear progress fraction before placing a marker.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    Linear,
    #[default]
    CubicInOut,
    EaseOut,
}

impl Easing {
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Easing::Linear => t,
            Easing::CubicInOut => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            Easing::EaseOut => 1.0 - (1.0 - t).powi(3),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Easing::Linear => "linear",
            Easing::CubicInOut => "cubic in-out",
            Easing::EaseOut => "ease-out",
        }
    }

    /// Cycle used by the keyboard toggle.
    pub fn next(self) -> Self {
        match self {
            Easing::Linear => Easing::CubicInOut,
            Easing::CubicInOut => Easing::EaseOut,
            Easing::EaseOut => Easing::Linear,
        }
    }
}

/// Linear progress of a journey at `now_ms`, clamped to `[0, 1]`.
///
/// A journey whose arrival is not after its departure counts as arrived.
pub fn progress(departure_ms: i64, arrival_ms: i64, now_ms: i64) -> f64 {
    let span = arrival_ms.saturating_sub(departure_ms);
    if span <= 0 {
        return 1.0;
    }
    (now_ms.saturating_sub(departure_ms) as f64 / span as f64).clamp(0.0, 1.0)
}

/// World position of the ship flying `segment` at `now_ms`.
pub fn position_at(segment: &Segment, now_ms: i64, easing: Easing) -> DVec2 {
    let t = easing.apply(progress(segment.departure_ms, segment.arrival_ms, now_ms));
    segment.from.lerp(segment.to, t)
}

/// Angle in radians of travel from `from` to `to`, or `None` for a
/// zero-length hop.
pub fn heading(from: DVec2, to: DVec2) -> Option<f64> {
    let d = to - from;
    if d.length_squared() <= f64::EPSILON {
        return None;
    }
    Some(d.y.atan2(d.x))
}

/// Milliseconds until arrival, never negative.
pub fn remaining_ms(segment: &Segment, now_ms: i64) -> i64 {
    segment.arrival_ms.saturating_sub(now_ms).max(0)
}
