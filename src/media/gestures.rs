//! Tap handling and control auto-hide for the player surface

use std::time::{Duration, Instant};

/// Second tap within this window counts as a double tap
pub const DOUBLE_TAP_WINDOW: Duration = Duration::from_millis(300);
/// Seconds skipped by a double tap
pub const SEEK_STEP_SECS: f64 = 10.0;
/// Idle time before controls hide while playing
pub const CONTROLS_HIDE_AFTER: Duration = Duration::from_millis(3500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapAction {
    Single,
    SeekBackward,
    SeekForward,
}

#[derive(Debug, Default)]
pub struct GestureTracker {
    last_tap: Option<Instant>,
}

impl GestureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// `x_fraction` is the tap position across the surface, 0.0 = left edge
    pub fn tap(&mut self, x_fraction: f32, now: Instant) -> TapAction {
        let is_double = self
            .last_tap
            .is_some_and(|prev| now.saturating_duration_since(prev) <= DOUBLE_TAP_WINDOW);

        if is_double {
            // a third tap starts a fresh sequence
            self.last_tap = None;
            if x_fraction < 0.5 {
                TapAction::SeekBackward
            } else {
                TapAction::SeekForward
            }
        } else {
            self.last_tap = Some(now);
            TapAction::Single
        }
    }
}

#[derive(Debug)]
pub struct ControlsVisibility {
    visible: bool,
    last_activity: Instant,
}

impl ControlsVisibility {
    pub fn new(now: Instant) -> Self {
        Self { visible: true, last_activity: now }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// User activity: show controls and restart the idle timer
    pub fn touch(&mut self, now: Instant) {
        self.visible = true;
        self.last_activity = now;
    }

    pub fn toggle(&mut self, now: Instant) {
        if self.visible {
            self.visible = false;
        } else {
            self.touch(now);
        }
    }

    /// Hide after the idle timeout while playing; paused playback keeps controls up
    pub fn update(&mut self, now: Instant, playing: bool) {
        if !playing {
            if !self.visible {
                self.touch(now);
            }
            return;
        }
        if self.visible && now.saturating_duration_since(self.last_activity) >= CONTROLS_HIDE_AFTER {
            self.visible = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_tap_sides() {
        let t0 = Instant::now();
        let mut tracker = GestureTracker::new();
        assert_eq!(tracker.tap(0.2, t0), TapAction::Single);
        assert_eq!(tracker.tap(0.2, t0 + Duration::from_millis(150)), TapAction::SeekBackward);

        assert_eq!(tracker.tap(0.8, t0 + Duration::from_secs(2)), TapAction::Single);
        assert_eq!(tracker.tap(0.9, t0 + Duration::from_millis(2300)), TapAction::SeekForward);
    }

    #[test]
    fn test_slow_taps_are_singles() {
        let t0 = Instant::now();
        let mut tracker = GestureTracker::new();
        assert_eq!(tracker.tap(0.7, t0), TapAction::Single);
        assert_eq!(tracker.tap(0.7, t0 + Duration::from_millis(301)), TapAction::Single);
    }

    #[test]
    fn test_triple_tap_resets_sequence() {
        let t0 = Instant::now();
        let mut tracker = GestureTracker::new();
        tracker.tap(0.9, t0);
        assert_eq!(tracker.tap(0.9, t0 + Duration::from_millis(100)), TapAction::SeekForward);
        assert_eq!(tracker.tap(0.9, t0 + Duration::from_millis(200)), TapAction::Single);
    }

    #[test]
    fn test_controls_hide_after_idle_while_playing() {
        let t0 = Instant::now();
        let mut controls = ControlsVisibility::new(t0);
        controls.update(t0 + Duration::from_millis(3400), true);
        assert!(controls.is_visible());
        controls.update(t0 + Duration::from_millis(3500), true);
        assert!(!controls.is_visible());
    }

    #[test]
    fn test_activity_restarts_timer_and_pause_shows_controls() {
        let t0 = Instant::now();
        let mut controls = ControlsVisibility::new(t0);
        controls.touch(t0 + Duration::from_secs(3));
        controls.update(t0 + Duration::from_secs(5), true);
        assert!(controls.is_visible());

        controls.update(t0 + Duration::from_secs(7), true);
        assert!(!controls.is_visible());
        controls.update(t0 + Duration::from_secs(8), false);
        assert!(controls.is_visible());
        controls.update(t0 + Duration::from_secs(60), false);
        assert!(controls.is_visible());
    }
}
