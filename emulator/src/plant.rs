//! Simulated door and board peripherals driven by the control core.

use actuator_core::command::{FRAME_LEN, RawFrame, frame_from_bytes};
use actuator_core::hal::{
    CalibrationState, CalibrationStore, Calibrator, FrameSource, InertialSensor, LinkControl,
    LowPowerSignal, MotorDriver, OriginBusy, PowerRails, RadioChannel, RangingDevice,
    StorageError, TriggerFlags, TriggerSource, YawSource,
};

/// Degrees of travel per drive unit per control tick.
pub const DEGREES_PER_UNIT: f32 = 0.001;
/// Mechanical stop behind the closed position.
pub const CLOSED_STOP_DEG: f32 = -10.0;
/// Smallest travel accepted when capturing the open position.
pub const MIN_CAPTURE_DEG: f32 = 10.0;

const IDLE_CURRENT_A: f32 = 0.05;
const AMPS_PER_UNIT: f32 = 0.000_5;
const BLOCKED_CURRENT_A: f32 = 1.5;

/// Rejected frame text.
#[derive(Debug, Eq, PartialEq)]
pub struct FrameTooLong(pub usize);

#[derive(Debug)]
pub struct DoorPlant {
    yaw: f32,
    commanded: i16,
    obstacle: Option<f32>,
    blocked: bool,
    main_power: bool,
    sensor_select: bool,
    speed_loop_primed: bool,
    bus_slot: Option<u8>,
    long_range: Option<RawFrame>,
    short_range: Option<RawFrame>,
    triggers: TriggerFlags,
    edge: bool,
    stored: Option<CalibrationState>,
    low_power: bool,
    notes: Vec<String>,
}

impl DoorPlant {
    pub fn new(stored: Option<CalibrationState>) -> Self {
        Self {
            yaw: 0.0,
            commanded: 0,
            obstacle: None,
            blocked: false,
            main_power: false,
            sensor_select: false,
            speed_loop_primed: false,
            bus_slot: None,
            long_range: None,
            short_range: None,
            triggers: TriggerFlags::default(),
            edge: false,
            stored,
            low_power: false,
            notes: Vec::new(),
        }
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn set_yaw(&mut self, yaw: f32) {
        self.yaw = yaw;
    }

    pub fn commanded_speed(&self) -> i16 {
        self.commanded
    }

    pub fn main_power(&self) -> bool {
        self.main_power
    }

    /// Reads and clears the low-power request.
    pub fn take_low_power(&mut self) -> bool {
        std::mem::take(&mut self.low_power)
    }

    /// Whether a frame or manual input is waiting for the controller.
    pub fn input_pending(&self) -> bool {
        self.long_range.is_some()
            || self.short_range.is_some()
            || self.triggers != TriggerFlags::default()
            || self.edge
    }

    pub fn stored(&self) -> Option<CalibrationState> {
        self.stored
    }

    pub fn obstacle(&self) -> Option<f32> {
        self.obstacle
    }

    /// Places an obstruction at `yaw` degrees, or clears it.
    pub fn set_obstacle(&mut self, yaw: Option<f32>) {
        self.obstacle = yaw;
    }

    /// Replaces the pending frame on `channel`; the newest frame wins.
    pub fn queue_frame(&mut self, channel: RadioChannel, text: &str) -> Result<(), FrameTooLong> {
        if text.len() > FRAME_LEN {
            return Err(FrameTooLong(text.len()));
        }
        let slot = match channel {
            RadioChannel::LongRange => &mut self.long_range,
            RadioChannel::ShortRange => &mut self.short_range,
        };
        *slot = Some(frame_from_bytes(text.as_bytes()));
        Ok(())
    }

    pub fn press_push(&mut self) {
        self.triggers.manual_forward = true;
    }

    pub fn press_pull(&mut self) {
        self.triggers.manual_reverse = true;
    }

    pub fn press_edge(&mut self) {
        self.edge = true;
    }

    /// Moves the door by the commanded speed for one tick.
    pub fn advance(&mut self) {
        if !self.main_power || self.commanded == 0 {
            self.blocked = false;
            return;
        }

        let mut next = self.yaw + f32::from(self.commanded) * DEGREES_PER_UNIT;
        self.blocked = false;
        if let Some(limit) = self.obstacle {
            if self.commanded > 0 && self.yaw <= limit && next > limit {
                next = limit;
                self.blocked = true;
            }
        }
        if next < CLOSED_STOP_DEG {
            next = CLOSED_STOP_DEG;
            self.blocked = true;
        }
        self.yaw = next;
    }

    /// Board activity recorded since the last call.
    pub fn take_notes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notes)
    }

    fn note(&mut self, line: String) {
        self.notes.push(line);
    }
}

impl YawSource for DoorPlant {
    fn current_angle(&mut self) -> f32 {
        self.yaw
    }

    fn reset_origin(&mut self) -> Result<(), OriginBusy> {
        self.note(format!("yaw origin reset at {:.2}", self.yaw));
        self.yaw = 0.0;
        Ok(())
    }

    fn enter_low_power(&mut self) {
        self.note("yaw sensor sleep".to_string());
    }
}

impl MotorDriver for DoorPlant {
    fn drive(&mut self, axis: u8, speed: i16, accel: u8) {
        if speed.signum() != self.commanded.signum() {
            self.note(format!("motor {axis:#04x} drive {speed} accel {accel}"));
        }
        self.commanded = speed;
    }

    fn stop(&mut self) {
        if self.commanded != 0 || self.speed_loop_primed {
            self.note("motor stop".to_string());
        }
        self.commanded = 0;
        self.speed_loop_primed = false;
    }

    fn prime_speed_loop(&mut self) {
        self.speed_loop_primed = true;
        self.note("motor speed loop enabled".to_string());
    }

    fn set_bus_current_slot(&mut self, slot: u8) {
        self.bus_slot = Some(slot);
    }

    fn read_bus_current(&mut self) -> Option<f32> {
        self.bus_slot?;
        if !self.main_power {
            return Some(0.0);
        }
        if self.blocked {
            return Some(BLOCKED_CURRENT_A);
        }
        Some(IDLE_CURRENT_A + f32::from(self.commanded.unsigned_abs()) * AMPS_PER_UNIT)
    }
}

impl FrameSource for DoorPlant {
    fn poll_new_frame(&mut self, channel: RadioChannel) -> Option<RawFrame> {
        match channel {
            RadioChannel::LongRange => self.long_range.take(),
            RadioChannel::ShortRange => self.short_range.take(),
        }
    }
}

impl LinkControl for DoorPlant {
    fn send_at_command(&mut self, command: &str) {
        self.note(format!("short-range link {command}"));
    }
}

impl PowerRails for DoorPlant {
    fn set_main_power(&mut self, on: bool) {
        if on != self.main_power {
            self.note(format!("main power {}", if on { "on" } else { "off" }));
        }
        self.main_power = on;
        if !on {
            self.commanded = 0;
        }
    }

    fn set_sensor_select(&mut self, asserted: bool) {
        self.sensor_select = asserted;
        self.note(format!("sensor select {}", if asserted { "high" } else { "low" }));
    }
}

impl InertialSensor for DoorPlant {
    fn enter_sleep(&mut self) {
        self.note("inertial sensor sleep".to_string());
    }
}

impl RangingDevice for DoorPlant {
    fn set_distance_threshold_and_persist(&mut self, threshold: u16) {
        self.note(format!("ranging threshold {threshold} saved"));
    }
}

impl LowPowerSignal for DoorPlant {
    fn request_low_power(&mut self) {
        self.low_power = true;
        self.note("low-power requested".to_string());
    }
}

impl TriggerSource for DoorPlant {
    fn take_triggers(&mut self) -> TriggerFlags {
        std::mem::take(&mut self.triggers)
    }

    fn take_edge(&mut self) -> bool {
        std::mem::take(&mut self.edge)
    }
}

impl CalibrationStore for DoorPlant {
    fn load(&mut self) -> Option<CalibrationState> {
        self.stored
    }

    fn save(&mut self, state: CalibrationState) -> Result<(), StorageError> {
        self.stored = Some(state);
        self.note(format!("calibration saved target={:.2}", state.target_sum));
        Ok(())
    }
}

impl Calibrator for DoorPlant {
    fn calibrate(&mut self, current: CalibrationState) -> CalibrationState {
        if self.yaw.is_finite() && self.yaw >= MIN_CAPTURE_DEG {
            CalibrationState::new(self.yaw, true)
        } else {
            current
        }
    }
}
