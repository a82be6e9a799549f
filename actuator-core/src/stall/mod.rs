//! Stall and collision detection for an active motion phase.
//!
//! The detector compares successive yaw samples inside a sliding window and
//! reports one of three faults:
//!
//! * wrong-direction travel: the absolute yaw moves against the phase
//!   direction by more than the noise epsilon,
//! * oscillation: the per-tick increment changes sign repeatedly,
//! * plateau: the yaw stays within a small band for the full plateau window.
//!
//! Nothing is reported during the settle interval that follows phase entry.
//! Any fault invalidates the window so the next phase starts from scratch.

use core::fmt;

use crate::config::StallConfig;
use crate::motion::Direction;
use crate::time::ControlInstant;

/// Fault reported by [`StallDetector::check`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StallFault {
    WrongDirection,
    Oscillation,
    Plateau,
}

impl StallFault {
    const WRONG_DIRECTION_CODE: u8 = 0x01;
    const OSCILLATION_CODE: u8 = 0x02;
    const PLATEAU_CODE: u8 = 0x03;

    /// Compact discriminant for telemetry transport.
    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            StallFault::WrongDirection => Self::WRONG_DIRECTION_CODE,
            StallFault::Oscillation => Self::OSCILLATION_CODE,
            StallFault::Plateau => Self::PLATEAU_CODE,
        }
    }
}

impl fmt::Display for StallFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StallFault::WrongDirection => "wrong-direction",
            StallFault::Oscillation => "oscillation",
            StallFault::Plateau => "plateau",
        })
    }
}

/// Sliding comparison window for one active phase.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StallWindow<TInstant> {
    pub start_angle: f32,
    pub start_time: TInstant,
    pub last_angle: f32,
    pub last_increment: f32,
    pub last_magnitude: f32,
    pub direction_changes: u8,
    pub motion_errors: u8,
}

impl<TInstant: ControlInstant> StallWindow<TInstant> {
    fn open(yaw: f32, now: TInstant) -> Self {
        Self {
            start_angle: yaw,
            start_time: now,
            last_angle: yaw,
            last_increment: 0.0,
            last_magnitude: yaw.abs(),
            direction_changes: 0,
            motion_errors: 0,
        }
    }

    fn rebase(&mut self, yaw: f32, now: TInstant) {
        self.start_angle = yaw;
        self.start_time = now;
        self.direction_changes = 0;
        self.motion_errors = 0;
    }
}

/// Per-phase stall/collision detector.
#[derive(Clone, Debug)]
pub struct StallDetector<TInstant> {
    config: StallConfig,
    window: Option<StallWindow<TInstant>>,
}

impl<TInstant: ControlInstant> StallDetector<TInstant> {
    pub const fn new(config: StallConfig) -> Self {
        Self {
            config,
            window: None,
        }
    }

    /// Drops the current window; the next post-settle sample opens a new one.
    pub fn invalidate(&mut self) {
        self.window = None;
    }

    /// Returns the active window, if one is open.
    pub fn window(&self) -> Option<&StallWindow<TInstant>> {
        self.window.as_ref()
    }

    /// Feeds one yaw sample for a phase moving in `direction` that started at
    /// `phase_started_at`.
    pub fn check(
        &mut self,
        direction: Direction,
        yaw: f32,
        phase_started_at: TInstant,
        now: TInstant,
    ) -> Option<StallFault> {
        if now.saturating_duration_since(phase_started_at) < self.config.settle {
            return None;
        }

        let Some(window) = self.window.as_mut() else {
            self.window = Some(StallWindow::open(yaw, now));
            return None;
        };

        let epsilon = self.config.epsilon_deg;
        let magnitude = yaw.abs();
        let slip = match direction {
            Direction::Forward => window.last_magnitude - magnitude,
            Direction::Reverse => magnitude - window.last_magnitude,
        };
        if slip > epsilon {
            window.motion_errors = window.motion_errors.saturating_add(1);
        }
        if window.motion_errors >= self.config.wrong_direction_limit {
            return self.trip(StallFault::WrongDirection);
        }

        let increment = yaw - window.last_angle;
        if increment.abs() > epsilon
            && window.last_increment.abs() > epsilon
            && increment.signum() != window.last_increment.signum()
        {
            window.direction_changes = window.direction_changes.saturating_add(1);
            if window.direction_changes >= self.config.oscillation_limit {
                return self.trip(StallFault::Oscillation);
            }
        }

        window.last_angle = yaw;
        window.last_increment = increment;
        window.last_magnitude = magnitude;

        if (yaw - window.start_angle).abs() > self.config.plateau_threshold_deg {
            window.rebase(yaw, now);
            return None;
        }

        if now.saturating_duration_since(window.start_time) >= self.config.plateau_window {
            return self.trip(StallFault::Plateau);
        }

        None
    }

    fn trip(&mut self, fault: StallFault) -> Option<StallFault> {
        self.window = None;
        Some(fault)
    }
}
