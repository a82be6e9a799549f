//! Tunables for the control loop.
//!
//! The actuator has no runtime configuration surface; firmware and host
//! targets build a [`ControllerConfig`] once at boot, usually from
//! [`ControllerConfig::new`].

use core::time::Duration;

use crate::command::SpeedLevel;

/// Nominal control tick.
pub const TICK_PERIOD: Duration = Duration::from_millis(10);
/// Proportional gain applied to the yaw error.
pub const PROPORTIONAL_GAIN: f32 = 40.0;
/// Yaw gap that must be exceeded before a requested phase may start.
pub const ENTRY_DEADBAND_DEG: f32 = 2.0;
/// Yaw distance treated as "arrived".
pub const ARRIVAL_TOLERANCE_DEG: f32 = 5.0;
/// How far past the origin the reverse phase aims.
pub const REVERSE_MARGIN_DEG: f32 = 3.0;
/// Motor axis addressed by every drive command.
pub const MOTOR_AXIS: u8 = 0x01;
/// Acceleration parameter sent with closed-loop drive commands.
pub const DRIVE_ACCEL: u8 = 20;
/// Monitor slot the bus-current sampler reads from.
pub const BUS_CURRENT_SLOT: u8 = 2;
/// Hold-power keepalive expiry.
pub const KEEPALIVE_TIMEOUT: Duration = Duration::from_millis(100);
/// Inactivity window before the actuator sleeps or auto-closes.
pub const IDLE_WINDOW: Duration = Duration::from_millis(15_000);
/// Yaw band around the origin considered "closed" for idle sleep.
pub const IDLE_ZERO_BAND_DEG: f32 = 10.0;

/// Absolute speed caps selected by the command speed level.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SpeedTable {
    pub low: i16,
    pub medium: i16,
    pub high: i16,
}

impl SpeedTable {
    pub const fn new() -> Self {
        Self {
            low: 600,
            medium: 1_200,
            high: 2_000,
        }
    }

    /// Returns the cap associated with `level`.
    #[must_use]
    pub const fn cap(&self, level: SpeedLevel) -> i16 {
        match level {
            SpeedLevel::Low => self.low,
            SpeedLevel::Medium => self.medium,
            SpeedLevel::High => self.high,
        }
    }
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Thresholds used by the stall/collision detector.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct StallConfig {
    /// Detection is suppressed for this long after a phase starts.
    pub settle: Duration,
    /// No-progress interval that counts as a plateau.
    pub plateau_window: Duration,
    /// Displacement at or below which the window is considered stationary.
    pub plateau_threshold_deg: f32,
    /// Increments at or below this magnitude are treated as noise.
    pub epsilon_deg: f32,
    /// Wrong-direction samples tolerated before a fault.
    pub wrong_direction_limit: u8,
    /// Increment sign flips tolerated before a fault.
    pub oscillation_limit: u8,
}

impl StallConfig {
    pub const fn new() -> Self {
        Self {
            settle: Duration::from_millis(1_500),
            plateau_window: Duration::from_millis(1_500),
            plateau_threshold_deg: 0.1,
            epsilon_deg: 0.01,
            wrong_direction_limit: 1,
            oscillation_limit: 2,
        }
    }
}

impl Default for StallConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Control-loop configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    pub tick_period: Duration,
    pub proportional_gain: f32,
    pub entry_deadband_deg: f32,
    pub arrival_tolerance_deg: f32,
    pub reverse_margin_deg: f32,
    pub motor_axis: u8,
    pub drive_accel: u8,
    pub bus_current_slot: u8,
    pub speed_caps: SpeedTable,
    pub keepalive_timeout: Duration,
    pub idle_window: Duration,
    pub idle_zero_band_deg: f32,
    /// Retry budget for the origin-reset handshake; `None` retries forever.
    pub origin_reset_attempts: Option<u16>,
    pub stall: StallConfig,
}

impl ControllerConfig {
    pub const fn new() -> Self {
        Self {
            tick_period: TICK_PERIOD,
            proportional_gain: PROPORTIONAL_GAIN,
            entry_deadband_deg: ENTRY_DEADBAND_DEG,
            arrival_tolerance_deg: ARRIVAL_TOLERANCE_DEG,
            reverse_margin_deg: REVERSE_MARGIN_DEG,
            motor_axis: MOTOR_AXIS,
            drive_accel: DRIVE_ACCEL,
            bus_current_slot: BUS_CURRENT_SLOT,
            speed_caps: SpeedTable::new(),
            keepalive_timeout: KEEPALIVE_TIMEOUT,
            idle_window: IDLE_WINDOW,
            idle_zero_band_deg: IDLE_ZERO_BAND_DEG,
            origin_reset_attempts: None,
            stall: StallConfig::new(),
        }
    }

    /// Caps the origin-reset handshake at `attempts` tries.
    #[must_use]
    pub const fn with_origin_reset_attempts(mut self, attempts: u16) -> Self {
        self.origin_reset_attempts = Some(attempts);
        self
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_table_orders_levels() {
        let table = SpeedTable::new();
        assert_eq!(table.cap(SpeedLevel::Low), 600);
        assert_eq!(table.cap(SpeedLevel::Medium), 1_200);
        assert_eq!(table.cap(SpeedLevel::High), 2_000);
    }

    #[test]
    fn origin_reset_is_unbounded_by_default() {
        let config = ControllerConfig::new();
        assert_eq!(config.origin_reset_attempts, None);
        assert_eq!(
            config.with_origin_reset_attempts(3).origin_reset_attempts,
            Some(3)
        );
    }
}
