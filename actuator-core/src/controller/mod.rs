//! Periodic control loop.
//!
//! [`Controller`] owns every piece of per-tick state: both motion phases, the
//! stall window, the keepalive, the command decoder, the cached calibration,
//! and any in-flight [`SequenceRun`]. Firmware and the emulator call
//! [`Controller::tick`] once per period with the board and the current time.
//!
//! A tick runs in this order:
//!
//! 1. sample the motor bus current,
//! 2. advance an in-flight sequence; while it is running nothing else happens,
//! 3. sample yaw,
//! 4. uncalibrated: hand any arriving frame to the calibration routine and stop,
//! 5. inactivity: sleep near the origin or arm an auto-close elsewhere,
//! 6. decode frames from both channels and apply the commands,
//! 7. keepalive bookkeeping,
//! 8. forward phase, then reverse phase,
//! 9. manual edge.

use heapless::Vec;

use crate::command::{Command, FrameDecoder, RawFrame};
use crate::config::ControllerConfig;
use crate::hal::{ActuatorBoard, CalibrationState, RadioChannel};
use crate::keepalive::{KeepaliveEvent, PowerKeepalive};
use crate::motion::{Direction, MotionState, Phase, PhaseGeometry, PhaseStep, StopReason};
use crate::sequencer::{RunStatus, SequenceRun, StepOutcome};
use crate::sequences::{
    FORWARD_STOP_TEMPLATE, IDLE_SETTLE_TEMPLATE, ORIGIN_RESET_TEMPLATE, PHASE_ENTRY_TEMPLATE,
    REVERSE_ABORT_TEMPLATE, REVERSE_CLOSE_TEMPLATE, SLEEP_TEMPLATE, SequenceAction, SequenceKind,
    SequenceTemplate,
};
use crate::stall::StallDetector;
use crate::telemetry::{TelemetryEventKind, TelemetryPayload, TelemetryRecorder};
use crate::time::ControlInstant;

/// Plan run after a clean close.
pub const CLEAN_CLOSE_PLAN: [SequenceTemplate; 3] =
    [REVERSE_CLOSE_TEMPLATE, SLEEP_TEMPLATE, ORIGIN_RESET_TEMPLATE];
/// Plan run after the inactivity window elapses near the origin.
pub const IDLE_SLEEP_PLAN: [SequenceTemplate; 2] = [SLEEP_TEMPLATE, IDLE_SETTLE_TEMPLATE];

/// Why the current sequence run was started.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunPurpose {
    PhaseEntry(Direction),
    PhaseStop(Direction),
    CleanClose,
    IdleSleep,
}

#[derive(Clone, Debug)]
struct ActiveRun<TInstant> {
    run: SequenceRun<TInstant>,
    purpose: RunPurpose,
}

/// Summary of one tick.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TickReport {
    pub motion: MotionState,
    /// Sequence still in flight after the tick, if any.
    pub sequence: Option<SequenceKind>,
    /// Closed-loop drive command issued this tick.
    pub drive: Option<i16>,
    /// Yaw sample the tick acted on.
    pub yaw: f32,
}

/// Owned control-loop state.
pub struct Controller<TInstant>
where
    TInstant: ControlInstant,
{
    config: ControllerConfig,
    decoder: FrameDecoder,
    calibration: CalibrationState,
    forward: Phase<TInstant>,
    reverse: Phase<TInstant>,
    stall: StallDetector<TInstant>,
    keepalive: PowerKeepalive<TInstant>,
    run: Option<ActiveRun<TInstant>>,
    pending_close: bool,
    wake_at: TInstant,
    yaw: f32,
    bus_current: f32,
    telemetry: TelemetryRecorder<TInstant>,
}

impl<TInstant> Controller<TInstant>
where
    TInstant: ControlInstant,
{
    pub fn new(config: ControllerConfig, now: TInstant) -> Self {
        Self {
            config,
            decoder: FrameDecoder::new(),
            calibration: CalibrationState::UNCALIBRATED,
            forward: Phase::new(Direction::Forward),
            reverse: Phase::new(Direction::Reverse),
            stall: StallDetector::new(config.stall),
            keepalive: PowerKeepalive::new(config.keepalive_timeout),
            run: None,
            pending_close: false,
            wake_at: now,
            yaw: 0.0,
            bus_current: 0.0,
            telemetry: TelemetryRecorder::new(),
        }
    }

    /// Boot: stop the motor, restore calibration, and drop the motor rail
    /// when a calibration is available.
    pub fn start<B: ActuatorBoard>(&mut self, board: &mut B, now: TInstant) {
        board.stop();
        self.calibration = board.load().unwrap_or_default();
        if self.calibration.is_calibrated {
            board.set_main_power(false);
        }
        self.wake_at = now;
    }

    pub const fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub const fn calibration(&self) -> CalibrationState {
        self.calibration
    }

    pub const fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    pub const fn keepalive(&self) -> &PowerKeepalive<TInstant> {
        &self.keepalive
    }

    pub const fn telemetry(&self) -> &TelemetryRecorder<TInstant> {
        &self.telemetry
    }

    pub const fn phase(&self, direction: Direction) -> &Phase<TInstant> {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Reverse => &self.reverse,
        }
    }

    pub const fn pending_close(&self) -> bool {
        self.pending_close
    }

    /// Last time activity pushed the inactivity window out.
    pub const fn wake_at(&self) -> TInstant {
        self.wake_at
    }

    /// Restarts the inactivity window after the host resumes from a doze.
    pub fn wake(&mut self, now: TInstant) {
        self.wake_at = now;
    }

    /// Last bus-current reading; zeroed at phase entry.
    pub const fn bus_current(&self) -> f32 {
        self.bus_current
    }

    pub const fn last_yaw(&self) -> f32 {
        self.yaw
    }

    /// Sequence currently in flight.
    pub fn sequence(&self) -> Option<SequenceKind> {
        self.run.as_ref().and_then(|active| active.run.current())
    }

    pub fn run_purpose(&self) -> Option<RunPurpose> {
        self.run.as_ref().map(|active| active.purpose)
    }

    pub const fn motion_state(&self) -> MotionState {
        if self.forward.is_active() {
            MotionState::MovingForward
        } else if self.reverse.is_active() {
            MotionState::MovingReverse
        } else {
            MotionState::Idle
        }
    }

    /// Runs one control tick.
    pub fn tick<B: ActuatorBoard>(&mut self, board: &mut B, now: TInstant) -> TickReport {
        board.set_bus_current_slot(self.config.bus_current_slot);
        if let Some(current) = board.read_bus_current() {
            self.bus_current = current;
        }

        if self.advance_run(board, now) == RunStatus::Running {
            return self.report(None);
        }

        self.yaw = board.current_angle();
        let yaw = self.yaw;

        if !self.calibration.is_calibrated {
            self.tick_uncalibrated(board, now);
            return self.report(None);
        }

        if self.forward.is_active() || self.reverse.is_active() {
            self.wake_at = now;
        }

        if now.elapsed_beyond(self.wake_at, self.config.idle_window) {
            if yaw.abs() < self.config.idle_zero_band_deg {
                self.start_run(board, &IDLE_SLEEP_PLAN, RunPurpose::IdleSleep, now);
                return self.report(None);
            }
            self.wake_at = now;
            self.reverse.arm();
            self.telemetry.record(
                TelemetryEventKind::AutoCloseArmed,
                TelemetryPayload::None,
                now,
            );
        }

        let mut preempt_reverse = false;
        for (channel, frame) in poll_frames(board) {
            preempt_reverse |= self.apply_frame(board, channel, &frame, now);
        }
        if self.run.is_some() || !self.calibration.is_calibrated {
            return self.report(None);
        }

        let triggers = board.take_triggers();
        if triggers.manual_forward {
            self.forward.trigger_manual();
        }
        if triggers.manual_reverse {
            self.reverse.trigger_manual();
        }

        let in_use = self.forward.is_active() || self.reverse.is_active() || triggers.any();
        if self.keepalive.poll(now, in_use) == KeepaliveEvent::Expired {
            board.set_main_power(false);
            self.telemetry.record(
                TelemetryEventKind::KeepaliveExpired,
                TelemetryPayload::None,
                now,
            );
        }

        let mut drive = self.step_phase(board, Direction::Forward, yaw, false, now);
        if self.run.is_some() {
            return self.report(drive);
        }

        if let Some(speed) = self.step_phase(board, Direction::Reverse, yaw, preempt_reverse, now) {
            drive = Some(speed);
        }
        if self.run.is_some() {
            return self.report(drive);
        }

        if board.take_edge() && !self.forward.is_active() && !self.reverse.is_active() {
            self.forward.arm();
        }

        self.report(drive)
    }

    fn report(&self, drive: Option<i16>) -> TickReport {
        TickReport {
            motion: self.motion_state(),
            sequence: self.sequence(),
            drive,
            yaw: self.yaw,
        }
    }

    /// Any frame hands control to the calibration routine; phases, keepalive
    /// and manual inputs are ignored until the actuator is calibrated.
    fn tick_uncalibrated<B: ActuatorBoard>(&mut self, board: &mut B, now: TInstant) {
        let _ = board.take_triggers();
        let _ = board.take_edge();

        let frames = poll_frames(board);
        if frames.is_empty() {
            return;
        }

        let updated = board.calibrate(self.calibration);
        self.pending_close = false;
        self.wake_at = now;

        if updated == self.calibration {
            return;
        }
        self.calibration = updated;
        match board.save(updated) {
            Ok(()) => self.telemetry.record(
                TelemetryEventKind::CalibrationSaved,
                TelemetryPayload::Calibration(updated),
                now,
            ),
            Err(error) => self.telemetry.record(
                TelemetryEventKind::CalibrationSaveFailed,
                TelemetryPayload::Storage(error),
                now,
            ),
        };
    }

    /// Decodes and applies one frame. Returns `true` when the command
    /// preempts an active reverse phase.
    fn apply_frame<B: ActuatorBoard>(
        &mut self,
        board: &mut B,
        channel: RadioChannel,
        frame: &RawFrame,
        now: TInstant,
    ) -> bool {
        self.keepalive.note_frame(now);

        let command = self.decoder.decode(frame);
        self.telemetry.record_command(channel, command, now);

        match command {
            Command::HoldPower => {
                board.set_main_power(true);
                self.keepalive.hold(now);
                self.telemetry.record(
                    TelemetryEventKind::KeepaliveHeld,
                    TelemetryPayload::None,
                    now,
                );
            }
            Command::Move { angle, .. } => {
                self.forward.request(Some(angle));
                if self.reverse.is_active() {
                    self.forward.arm();
                    return true;
                }
            }
            Command::CloseRequest => self.pending_close = true,
            Command::ResetRequest => {
                self.keepalive.release();
                self.calibration.is_calibrated = false;
                self.telemetry.record(
                    TelemetryEventKind::CalibrationInvalidated,
                    TelemetryPayload::Calibration(self.calibration),
                    now,
                );
                if self.forward.is_active() || self.reverse.is_active() {
                    self.abort_motion(board, now);
                } else {
                    board.set_main_power(false);
                }
            }
            Command::Unrecognized => {}
        }

        false
    }

    /// Stops whichever phase is active without the close niceties.
    fn abort_motion<B: ActuatorBoard>(&mut self, board: &mut B, now: TInstant) {
        for direction in [Direction::Forward, Direction::Reverse] {
            let phase = match direction {
                Direction::Forward => &mut self.forward,
                Direction::Reverse => &mut self.reverse,
            };
            if phase.is_active() {
                let started_at = phase.started_at();
                phase.finish();
                self.telemetry.record_phase_stopped(
                    direction,
                    StopReason::Preempted,
                    self.yaw,
                    started_at,
                    now,
                );
            }
        }
        self.stall.invalidate();
        self.start_run(
            board,
            &[FORWARD_STOP_TEMPLATE],
            RunPurpose::PhaseStop(Direction::Forward),
            now,
        );
    }

    fn geometry(&self, direction: Direction) -> PhaseGeometry {
        let (limit, margin) = match direction {
            Direction::Forward => (self.calibration.target_sum, 0.0),
            Direction::Reverse => (0.0, self.config.reverse_margin_deg),
        };
        PhaseGeometry {
            limit,
            entry_deadband: self.config.entry_deadband_deg,
            arrival_tolerance: self.config.arrival_tolerance_deg,
            margin,
            gain: self.config.proportional_gain,
            speed_cap: self.config.speed_caps.cap(self.decoder.speed_level()),
        }
    }

    /// Evaluates one phase and performs its board I/O. Returns the drive
    /// command issued, if any.
    fn step_phase<B: ActuatorBoard>(
        &mut self,
        board: &mut B,
        direction: Direction,
        yaw: f32,
        preempted: bool,
        now: TInstant,
    ) -> Option<i16> {
        let geometry = self.geometry(direction);
        let (phase, other) = match direction {
            Direction::Forward => (&mut self.forward, &self.reverse),
            Direction::Reverse => (&mut self.reverse, &self.forward),
        };
        let blocked = other.is_active();
        let started_at = phase.started_at();
        let stall = &mut self.stall;

        let step = phase.plan(&geometry, yaw, blocked, preempted, || {
            started_at.and_then(|start| stall.check(direction, yaw, start, now))
        });

        match step {
            PhaseStep::Idle => {
                if direction == Direction::Forward && self.pending_close {
                    self.pending_close = false;
                    self.reverse.arm();
                }
                None
            }
            PhaseStep::Enter => {
                self.enter_phase(board, direction, yaw, now);
                None
            }
            PhaseStep::Drive { speed } => {
                self.wake_at = now;
                board.drive(self.config.motor_axis, speed, self.config.drive_accel);
                Some(speed)
            }
            PhaseStep::Stop(reason) => {
                self.stop_phase(board, direction, reason, yaw, started_at, now);
                None
            }
        }
    }

    fn enter_phase<B: ActuatorBoard>(
        &mut self,
        board: &mut B,
        direction: Direction,
        yaw: f32,
        now: TInstant,
    ) {
        match direction {
            Direction::Forward => self.forward.activate(now),
            Direction::Reverse => self.reverse.activate(now),
        }
        self.wake_at = now;
        self.bus_current = 0.0;
        self.stall.invalidate();
        self.telemetry.record_phase_started(direction, yaw, now);
        self.start_run(
            board,
            &[PHASE_ENTRY_TEMPLATE],
            RunPurpose::PhaseEntry(direction),
            now,
        );
    }

    fn stop_phase<B: ActuatorBoard>(
        &mut self,
        board: &mut B,
        direction: Direction,
        reason: StopReason,
        yaw: f32,
        started_at: Option<TInstant>,
        now: TInstant,
    ) {
        self.stall.invalidate();
        self.telemetry
            .record_phase_stopped(direction, reason, yaw, started_at, now);

        match direction {
            Direction::Forward => {
                self.forward.finish();
                if self.pending_close {
                    self.pending_close = false;
                    self.reverse.arm();
                }
                self.start_run(
                    board,
                    &[FORWARD_STOP_TEMPLATE],
                    RunPurpose::PhaseStop(direction),
                    now,
                );
            }
            Direction::Reverse => {
                self.reverse.finish();
                self.pending_close = false;
                if reason.is_clean() {
                    self.start_run(board, &CLEAN_CLOSE_PLAN, RunPurpose::CleanClose, now);
                } else {
                    self.start_run(
                        board,
                        &[REVERSE_ABORT_TEMPLATE],
                        RunPurpose::PhaseStop(direction),
                        now,
                    );
                }
            }
        }
    }

    fn start_run<B: ActuatorBoard>(
        &mut self,
        board: &mut B,
        plan: &[SequenceTemplate],
        purpose: RunPurpose,
        now: TInstant,
    ) {
        match SequenceRun::new(plan, self.config.origin_reset_attempts) {
            Ok(run) => {
                self.run = Some(ActiveRun { run, purpose });
                self.advance_run(board, now);
            }
            Err(error) => {
                if let Some(template) = plan.first() {
                    self.telemetry.record(
                        TelemetryEventKind::SequenceFailed(template.kind),
                        TelemetryPayload::Sequence(error),
                        now,
                    );
                }
            }
        }
    }

    fn advance_run<B: ActuatorBoard>(&mut self, board: &mut B, now: TInstant) -> RunStatus {
        let Some(active) = self.run.as_mut() else {
            return RunStatus::Complete;
        };

        let purpose = active.purpose;
        let axis = self.config.motor_axis;
        let telemetry = &mut self.telemetry;

        let status = active.run.advance(
            now,
            |action| apply_action(board, action, axis),
            |event| {
                telemetry.record_sequence_event(event, now);
            },
        );

        if status == RunStatus::Complete {
            self.run = None;
            if purpose == RunPurpose::IdleSleep {
                self.wake_at = now;
            }
        }
        status
    }
}

fn poll_frames<B: ActuatorBoard>(board: &mut B) -> Vec<(RadioChannel, RawFrame), 2> {
    let mut frames = Vec::new();
    for channel in RadioChannel::POLL_ORDER {
        if let Some(frame) = board.poll_new_frame(channel) {
            // Capacity matches the channel count.
            let _ = frames.push((channel, frame));
        }
    }
    frames
}

/// Performs one sequence action on the board. Template drives go out as
/// written; the speed cap only bounds the closed-loop phase law.
fn apply_action<B: ActuatorBoard>(board: &mut B, action: SequenceAction, axis: u8) -> StepOutcome {
    match action {
        SequenceAction::MainPower(on) => board.set_main_power(on),
        SequenceAction::SensorSelect(asserted) => board.set_sensor_select(asserted),
        SequenceAction::YawLowPower => board.enter_low_power(),
        SequenceAction::LinkCommand(command) => board.send_at_command(command),
        SequenceAction::InertialSleep => board.enter_sleep(),
        SequenceAction::RangingThreshold(threshold) => {
            board.set_distance_threshold_and_persist(threshold);
        }
        SequenceAction::RaiseLowPower => board.request_low_power(),
        SequenceAction::StopMotor => board.stop(),
        SequenceAction::PrimeMotor => board.prime_speed_loop(),
        SequenceAction::Drive { speed, accel } => board.drive(axis, speed, accel),
        SequenceAction::ResetOrigin => {
            return match board.reset_origin() {
                Ok(()) => StepOutcome::Done,
                Err(_) => StepOutcome::Busy,
            };
        }
    }
    StepOutcome::Done
}
