//! Board collaborator traits consumed by the control loop.
//!
//! Each trait covers one peripheral concern and exposes simple synchronous
//! operations. Firmware implements them on top of the MCU peripherals, the
//! emulator on top of a simulated plant, and the integration tests on a
//! recording mock. [`ActuatorBoard`] bundles them so the controller takes a
//! single `&mut` board per tick.

use core::fmt;

use crate::command::RawFrame;

/// The yaw sensor did not acknowledge an origin reset yet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct OriginBusy;

impl fmt::Display for OriginBusy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("yaw origin reset not acknowledged")
    }
}

/// Failures reported by non-volatile calibration storage.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StorageError {
    /// Erasing the storage page failed.
    Erase,
    /// Programming the record failed.
    Write,
    /// Read-back did not match what was written.
    Verify,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StorageError::Erase => "calibration erase failed",
            StorageError::Write => "calibration write failed",
            StorageError::Verify => "calibration verify failed",
        })
    }
}

/// Calibrated travel of the actuator.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CalibrationState {
    /// Accumulated yaw of the fully open position.
    pub target_sum: f32,
    pub is_calibrated: bool,
}

impl CalibrationState {
    /// Value used when nothing has been persisted yet.
    pub const UNCALIBRATED: Self = Self {
        target_sum: 0.0,
        is_calibrated: false,
    };

    #[must_use]
    pub const fn new(target_sum: f32, is_calibrated: bool) -> Self {
        Self {
            target_sum,
            is_calibrated,
        }
    }
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self::UNCALIBRATED
    }
}

/// Wireless channel a frame arrived on.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RadioChannel {
    /// Long-range packet link.
    LongRange,
    /// Short-range link, also the target of AT commands.
    ShortRange,
}

impl RadioChannel {
    /// Polling order used by the control loop.
    pub const POLL_ORDER: [RadioChannel; 2] = [RadioChannel::LongRange, RadioChannel::ShortRange];

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            RadioChannel::LongRange => "long-range",
            RadioChannel::ShortRange => "short-range",
        }
    }
}

/// Manual push/pull triggers latched by sensors outside the control loop.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TriggerFlags {
    pub manual_forward: bool,
    pub manual_reverse: bool,
}

impl TriggerFlags {
    #[must_use]
    pub const fn any(self) -> bool {
        self.manual_forward || self.manual_reverse
    }
}

pub trait YawSource {
    /// Latest yaw reading in degrees.
    fn current_angle(&mut self) -> f32;

    fn reset_origin(&mut self) -> Result<(), OriginBusy>;

    fn enter_low_power(&mut self);
}

pub trait MotorDriver {
    fn drive(&mut self, axis: u8, speed: i16, accel: u8);

    fn stop(&mut self);

    /// Enables the driver's speed loop ahead of the first drive of a phase.
    fn prime_speed_loop(&mut self);

    fn set_bus_current_slot(&mut self, slot: u8);

    /// Bus current in amperes, when the monitor has a fresh reading.
    fn read_bus_current(&mut self) -> Option<f32>;
}

pub trait FrameSource {
    /// Takes the frame that arrived on `channel` since the last poll.
    fn poll_new_frame(&mut self, channel: RadioChannel) -> Option<RawFrame>;
}

pub trait LinkControl {
    fn send_at_command(&mut self, command: &str);
}

pub trait PowerRails {
    fn set_main_power(&mut self, on: bool);

    /// Drives the sensor-select pin pair into (`true`) or out of its sleep
    /// configuration.
    fn set_sensor_select(&mut self, asserted: bool);
}

pub trait InertialSensor {
    fn enter_sleep(&mut self);
}

pub trait RangingDevice {
    fn set_distance_threshold_and_persist(&mut self, threshold: u16);
}

pub trait LowPowerSignal {
    /// Raises the flag the power manager uses to enter low-power mode.
    fn request_low_power(&mut self);
}

pub trait TriggerSource {
    /// Reads and clears the latched manual triggers.
    fn take_triggers(&mut self) -> TriggerFlags;

    /// Reads and clears a debounced edge on the manual input.
    fn take_edge(&mut self) -> bool;
}

pub trait CalibrationStore {
    fn load(&mut self) -> Option<CalibrationState>;

    fn save(&mut self, state: CalibrationState) -> Result<(), StorageError>;
}

/// External calibration routine run while the actuator is uncalibrated.
pub trait Calibrator {
    /// Runs one calibration pass and returns the resulting state.
    fn calibrate(&mut self, current: CalibrationState) -> CalibrationState;
}

/// Everything the controller needs from the board.
pub trait ActuatorBoard:
    YawSource
    + MotorDriver
    + FrameSource
    + LinkControl
    + PowerRails
    + InertialSensor
    + RangingDevice
    + LowPowerSignal
    + TriggerSource
    + CalibrationStore
    + Calibrator
{
}

impl<T> ActuatorBoard for T where
    T: YawSource
        + MotorDriver
        + FrameSource
        + LinkControl
        + PowerRails
        + InertialSensor
        + RangingDevice
        + LowPowerSignal
        + TriggerSource
        + CalibrationStore
        + Calibrator
{
}
