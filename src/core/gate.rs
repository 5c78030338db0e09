/// Hold-to-advance gesture validator.
///
/// While the hold input is down, each frame's pointer delta either extends
/// the current upward streak or breaks it. Once the streak covers the
/// required distance the gate latches; the advance itself only happens
/// when the hold is released.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Accumulated vertical distance needed to latch.
    pub required_distance: f32,
    /// Upward samples may drift sideways by at most this fraction of
    /// their vertical movement.
    pub max_horizontal_ratio: f32,
    /// Vertical movement at or below this counts as standing still.
    pub min_vertical_for_ratio: f32,
    /// Sideways tolerance while standing still, scaled by `sensitivity_x`.
    pub max_horizontal_when_still: f32,
    pub sensitivity_y: f32,
    pub sensitivity_x: f32,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            required_distance: 50.0,
            max_horizontal_ratio: 0.5,
            min_vertical_for_ratio: 0.01,
            max_horizontal_when_still: 0.01,
            sensitivity_y: 10.0,
            sensitivity_x: 10.0,
        }
    }
}

/// Raw movement below this on both axes is treated as no movement.
const RAW_MOVEMENT_EPSILON: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateEvent {
    None,
    /// The streak just reached the required distance.
    Reached,
    /// The streak was broken and the accumulator reset.
    StreakBroken,
}

#[derive(Debug, Clone)]
pub struct ProgressionGate {
    config: GateConfig,
    holding: bool,
    accumulated: f32,
    reached: bool,
}

impl ProgressionGate {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            holding: false,
            accumulated: 0.0,
            reached: false,
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn is_holding(&self) -> bool {
        self.holding
    }

    pub fn accumulated(&self) -> f32 {
        self.accumulated
    }

    pub fn reached(&self) -> bool {
        self.reached
    }

    /// Hold input went down. Returns false if a hold was already active.
    pub fn press(&mut self) -> bool {
        if self.holding {
            return false;
        }
        self.holding = true;
        self.accumulated = 0.0;
        self.reached = false;
        true
    }

    /// Feed one frame of raw pointer movement. Ignored unless holding.
    pub fn sample(&mut self, raw_dx: f32, raw_dy: f32) -> GateEvent {
        if !self.holding {
            return GateEvent::None;
        }

        let dy = raw_dy * self.config.sensitivity_y;
        let dx = raw_dx * self.config.sensitivity_x;

        let valid = if dy < 0.0 {
            false
        } else if dy > self.config.min_vertical_for_ratio {
            dx.abs() <= dy * self.config.max_horizontal_ratio
        } else {
            dx.abs() <= self.config.max_horizontal_when_still * self.config.sensitivity_x
        };

        let mut event = GateEvent::None;
        if valid && dy > 0.0 {
            self.accumulated += dy;
        } else if !valid
            && (raw_dx.abs() > RAW_MOVEMENT_EPSILON || raw_dy.abs() > RAW_MOVEMENT_EPSILON)
        {
            if self.accumulated > 0.0 {
                event = GateEvent::StreakBroken;
            }
            self.accumulated = 0.0;
        }

        if self.accumulated >= self.config.required_distance && !self.reached {
            self.reached = true;
            event = GateEvent::Reached;
        }
        event
    }

    /// Hold input went up. Returns true if the gesture completed and the
    /// caller should advance.
    pub fn release(&mut self) -> bool {
        if !self.holding {
            return false;
        }
        let advance = self.reached;
        self.reset();
        advance
    }

    /// Abort the hold without advancing.
    pub fn cancel(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.holding = false;
        self.accumulated = 0.0;
        self.reached = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> ProgressionGate {
        ProgressionGate::new(GateConfig::default())
    }

    #[test]
    fn six_upward_frames_latch() {
        let mut g = gate();
        g.press();
        let mut reached_at = None;
        for frame in 0..6 {
            if g.sample(0.0, 1.0) == GateEvent::Reached {
                reached_at = Some(frame);
            }
        }
        assert_eq!(g.accumulated(), 60.0);
        assert!(g.reached());
        // 5 * 10 = 50 already meets the threshold
        assert_eq!(reached_at, Some(4));
    }

    #[test]
    fn fires_only_once() {
        let mut g = gate();
        g.press();
        let events: Vec<_> = (0..10).map(|_| g.sample(0.0, 1.0)).collect();
        assert_eq!(events.iter().filter(|e| **e == GateEvent::Reached).count(), 1);
    }

    #[test]
    fn downward_frame_resets_streak() {
        let mut g = gate();
        g.press();
        g.sample(0.0, 1.0);
        g.sample(0.0, 1.0);
        assert_eq!(g.accumulated(), 20.0);
        assert_eq!(g.sample(0.0, -1.0), GateEvent::StreakBroken);
        assert_eq!(g.accumulated(), 0.0);
        assert!(!g.reached());
    }

    #[test]
    fn sideways_drift_breaks_streak() {
        let mut g = gate();
        g.press();
        g.sample(0.0, 1.0);
        // dy = 10, dx = 6 > 10 * 0.5
        g.sample(0.6, 1.0);
        assert_eq!(g.accumulated(), 0.0);
        // dx = 4 <= 5 is tolerated
        g.sample(0.4, 1.0);
        assert_eq!(g.accumulated(), 10.0);
    }

    #[test]
    fn sideways_while_still() {
        let mut g = gate();
        g.press();
        g.sample(0.0, 1.0);
        // dy = 0, dx = 0.05 <= 0.01 * 10
        g.sample(0.005, 0.0);
        assert_eq!(g.accumulated(), 10.0);
        // dy = 0, dx = 5 > 0.1
        g.sample(0.5, 0.0);
        assert_eq!(g.accumulated(), 0.0);
    }

    #[test]
    fn tiny_jitter_is_not_a_break() {
        let config = GateConfig {
            max_horizontal_when_still: 0.0,
            ..GateConfig::default()
        };
        let mut g = ProgressionGate::new(config);
        g.press();
        g.sample(0.0, 1.0);
        // invalid but below the raw movement epsilon
        g.sample(0.0005, 0.0);
        assert_eq!(g.accumulated(), 10.0);
    }

    #[test]
    fn release_after_latch_advances() {
        let mut g = gate();
        g.press();
        for _ in 0..5 {
            g.sample(0.0, 1.0);
        }
        assert!(g.release());
        assert!(!g.is_holding());
        assert_eq!(g.accumulated(), 0.0);
        assert!(!g.reached());
    }

    #[test]
    fn early_release_does_not_advance() {
        let mut g = gate();
        g.press();
        g.sample(0.0, 1.0);
        assert!(!g.release());
        assert_eq!(g.accumulated(), 0.0);
    }

    #[test]
    fn cancel_discards_latch() {
        let mut g = gate();
        g.press();
        for _ in 0..6 {
            g.sample(0.0, 1.0);
        }
        g.cancel();
        assert!(!g.release());
    }

    #[test]
    fn samples_ignored_when_not_holding() {
        let mut g = gate();
        assert_eq!(g.sample(0.0, 10.0), GateEvent::None);
        assert_eq!(g.accumulated(), 0.0);
        assert!(g.press());
        assert!(!g.press());
    }
}
