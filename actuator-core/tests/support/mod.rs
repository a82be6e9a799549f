#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use actuator_core::command::{RawFrame, frame_from_bytes};
use actuator_core::config::ControllerConfig;
use actuator_core::hal::{
    CalibrationState, CalibrationStore, Calibrator, FrameSource, InertialSensor, LinkControl,
    LowPowerSignal, MotorDriver, OriginBusy, PowerRails, RadioChannel, RangingDevice,
    StorageError, TriggerFlags, TriggerSource, YawSource,
};
use actuator_core::telemetry::TelemetryEventKind;
use actuator_core::{Controller, Micros, TickReport};

pub const TICK: Duration = Duration::from_millis(10);

/// Board operations observed by the mock, in call order.
#[derive(Clone, Debug, PartialEq)]
pub enum BoardCall {
    Drive { axis: u8, speed: i16, accel: u8 },
    Stop,
    Prime,
    MainPower(bool),
    SensorSelect(bool),
    YawLowPower,
    AtCommand(String),
    InertialSleep,
    RangingThreshold(u16),
    LowPower,
    ResetOrigin { acknowledged: bool },
    Calibrate,
    Save(CalibrationState),
}

/// Recording board with scriptable sensor inputs.
#[derive(Debug)]
pub struct MockBoard {
    pub yaw: f32,
    pub long_range: VecDeque<RawFrame>,
    pub short_range: VecDeque<RawFrame>,
    pub triggers: TriggerFlags,
    pub edge: bool,
    pub stored: Option<CalibrationState>,
    pub save_result: Result<(), StorageError>,
    pub calibration_result: Option<CalibrationState>,
    pub origin_busy_attempts: u32,
    pub bus_current: Option<f32>,
    pub main_power: bool,
    pub bus_slot: Option<u8>,
    pub calls: Vec<BoardCall>,
}

impl MockBoard {
    pub fn new() -> Self {
        Self {
            yaw: 0.0,
            long_range: VecDeque::new(),
            short_range: VecDeque::new(),
            triggers: TriggerFlags::default(),
            edge: false,
            stored: None,
            save_result: Ok(()),
            calibration_result: None,
            origin_busy_attempts: 0,
            bus_current: None,
            main_power: false,
            bus_slot: None,
            calls: Vec::new(),
        }
    }

    pub fn calibrated(target: f32) -> Self {
        let mut board = Self::new();
        board.stored = Some(CalibrationState::new(target, true));
        board
    }

    pub fn push_frame(&mut self, channel: RadioChannel, text: &str) {
        let frame = frame_from_bytes(text.as_bytes());
        match channel {
            RadioChannel::LongRange => self.long_range.push_back(frame),
            RadioChannel::ShortRange => self.short_range.push_back(frame),
        }
    }

    pub fn drives(&self) -> impl Iterator<Item = i16> + '_ {
        self.calls.iter().filter_map(|call| match call {
            BoardCall::Drive { speed, .. } => Some(*speed),
            _ => None,
        })
    }

    pub fn calls_since(&self, mark: usize) -> &[BoardCall] {
        &self.calls[mark..]
    }
}

impl YawSource for MockBoard {
    fn current_angle(&mut self) -> f32 {
        self.yaw
    }

    fn reset_origin(&mut self) -> Result<(), OriginBusy> {
        if self.origin_busy_attempts > 0 {
            self.origin_busy_attempts -= 1;
            self.calls
                .push(BoardCall::ResetOrigin { acknowledged: false });
            Err(OriginBusy)
        } else {
            self.calls.push(BoardCall::ResetOrigin { acknowledged: true });
            Ok(())
        }
    }

    fn enter_low_power(&mut self) {
        self.calls.push(BoardCall::YawLowPower);
    }
}

impl MotorDriver for MockBoard {
    fn drive(&mut self, axis: u8, speed: i16, accel: u8) {
        self.calls.push(BoardCall::Drive { axis, speed, accel });
    }

    fn stop(&mut self) {
        self.calls.push(BoardCall::Stop);
    }

    fn prime_speed_loop(&mut self) {
        self.calls.push(BoardCall::Prime);
    }

    fn set_bus_current_slot(&mut self, slot: u8) {
        self.bus_slot = Some(slot);
    }

    fn read_bus_current(&mut self) -> Option<f32> {
        self.bus_current
    }
}

impl FrameSource for MockBoard {
    fn poll_new_frame(&mut self, channel: RadioChannel) -> Option<RawFrame> {
        match channel {
            RadioChannel::LongRange => self.long_range.pop_front(),
            RadioChannel::ShortRange => self.short_range.pop_front(),
        }
    }
}

impl LinkControl for MockBoard {
    fn send_at_command(&mut self, command: &str) {
        self.calls.push(BoardCall::AtCommand(command.to_owned()));
    }
}

impl PowerRails for MockBoard {
    fn set_main_power(&mut self, on: bool) {
        self.main_power = on;
        self.calls.push(BoardCall::MainPower(on));
    }

    fn set_sensor_select(&mut self, asserted: bool) {
        self.calls.push(BoardCall::SensorSelect(asserted));
    }
}

impl InertialSensor for MockBoard {
    fn enter_sleep(&mut self) {
        self.calls.push(BoardCall::InertialSleep);
    }
}

impl RangingDevice for MockBoard {
    fn set_distance_threshold_and_persist(&mut self, threshold: u16) {
        self.calls.push(BoardCall::RangingThreshold(threshold));
    }
}

impl LowPowerSignal for MockBoard {
    fn request_low_power(&mut self) {
        self.calls.push(BoardCall::LowPower);
    }
}

impl TriggerSource for MockBoard {
    fn take_triggers(&mut self) -> TriggerFlags {
        std::mem::take(&mut self.triggers)
    }

    fn take_edge(&mut self) -> bool {
        std::mem::take(&mut self.edge)
    }
}

impl CalibrationStore for MockBoard {
    fn load(&mut self) -> Option<CalibrationState> {
        self.stored
    }

    fn save(&mut self, state: CalibrationState) -> Result<(), StorageError> {
        self.calls.push(BoardCall::Save(state));
        if self.save_result.is_ok() {
            self.stored = Some(state);
        }
        self.save_result
    }
}

impl Calibrator for MockBoard {
    fn calibrate(&mut self, current: CalibrationState) -> CalibrationState {
        self.calls.push(BoardCall::Calibrate);
        self.calibration_result.unwrap_or(current)
    }
}

/// Controller, board, and a hand-stepped clock.
pub struct Rig {
    pub controller: Controller<Micros>,
    pub board: MockBoard,
    pub now: Micros,
}

impl Rig {
    pub fn new(board: MockBoard) -> Self {
        Self::with_config(board, ControllerConfig::new())
    }

    pub fn with_config(mut board: MockBoard, config: ControllerConfig) -> Self {
        let now = Micros::ZERO;
        let mut controller = Controller::new(config, now);
        controller.start(&mut board, now);
        Self {
            controller,
            board,
            now,
        }
    }

    /// Ticks at the current instant, then advances the clock by one period.
    pub fn tick(&mut self) -> TickReport {
        let report = self.controller.tick(&mut self.board, self.now);
        self.now = self.now + TICK;
        report
    }

    /// Ticks until `done` holds or `limit` ticks have elapsed.
    pub fn tick_until(
        &mut self,
        limit: usize,
        mut done: impl FnMut(&TickReport, &MockBoard) -> bool,
    ) -> Option<TickReport> {
        for _ in 0..limit {
            let report = self.tick();
            if done(&report, &self.board) {
                return Some(report);
            }
        }
        None
    }

    /// Ticks while a sequence is in flight.
    pub fn settle(&mut self, limit: usize) {
        for _ in 0..limit {
            if self.controller.sequence().is_none() {
                return;
            }
            self.tick();
        }
        panic!("sequence still running after {limit} ticks");
    }

    /// Applies the last drive command to the simulated yaw.
    pub fn follow_drive(&mut self, report: &TickReport, degrees_per_unit: f32) {
        if let Some(speed) = report.drive {
            self.board.yaw += f32::from(speed) * degrees_per_unit;
        }
    }

    pub fn events(&self) -> Vec<TelemetryEventKind> {
        self.controller
            .telemetry()
            .oldest_first()
            .map(|record| record.event)
            .collect()
    }
}
