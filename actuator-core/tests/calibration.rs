mod support;

use actuator_core::config::ControllerConfig;
use actuator_core::hal::{CalibrationState, RadioChannel, StorageError, TriggerFlags};
use actuator_core::motion::{Direction, MotionState};
use actuator_core::sequences::SequenceKind;
use actuator_core::telemetry::TelemetryEventKind;

use support::{BoardCall, MockBoard, Rig};

const CALIBRATED: CalibrationState = CalibrationState::new(45.0, true);

#[test]
fn boot_restores_calibration_and_drops_rail() {
    let rig = Rig::new(MockBoard::calibrated(30.0));

    assert_eq!(
        rig.controller.calibration(),
        CalibrationState::new(30.0, true)
    );
    assert_eq!(rig.board.calls, [BoardCall::Stop, BoardCall::MainPower(false)]);
}

#[test]
fn boot_without_record_stays_uncalibrated() {
    let rig = Rig::new(MockBoard::new());

    assert_eq!(rig.controller.calibration(), CalibrationState::UNCALIBRATED);
    assert_eq!(rig.board.calls, [BoardCall::Stop]);
}

#[test]
fn frame_while_uncalibrated_runs_calibration_and_saves() {
    let mut board = MockBoard::new();
    board.calibration_result = Some(CALIBRATED);
    let mut rig = Rig::new(board);

    rig.board.push_frame(RadioChannel::LongRange, "AA00");
    let report = rig.tick();

    assert_eq!(report.motion, MotionState::Idle);
    assert_eq!(rig.controller.calibration(), CALIBRATED);
    assert_eq!(rig.board.stored, Some(CALIBRATED));
    assert_eq!(
        rig.board.calls_since(1),
        &[BoardCall::Calibrate, BoardCall::Save(CALIBRATED)]
    );
    assert!(!rig.controller.keepalive().is_enabled());
    assert!(rig.events().contains(&TelemetryEventKind::CalibrationSaved));
}

#[test]
fn unchanged_calibration_is_not_saved() {
    let mut rig = Rig::new(MockBoard::new());

    rig.board.push_frame(RadioChannel::ShortRange, "AA21");
    rig.tick();

    assert_eq!(rig.board.calls_since(1), &[BoardCall::Calibrate]);
    assert_eq!(rig.controller.calibration(), CalibrationState::UNCALIBRATED);
}

#[test]
fn save_failure_keeps_calibration_in_memory() {
    let mut board = MockBoard::new();
    board.calibration_result = Some(CALIBRATED);
    board.save_result = Err(StorageError::Write);
    let mut rig = Rig::new(board);

    rig.board.push_frame(RadioChannel::LongRange, "AA00");
    rig.tick();

    assert_eq!(rig.controller.calibration(), CALIBRATED);
    assert_eq!(rig.board.stored, None);
    assert!(
        rig.events()
            .contains(&TelemetryEventKind::CalibrationSaveFailed)
    );

    rig.board.push_frame(RadioChannel::LongRange, "AA21");
    assert_eq!(rig.tick().motion, MotionState::MovingForward);
}

#[test]
fn uncalibrated_ticks_discard_manual_inputs() {
    let mut rig = Rig::new(MockBoard::new());
    rig.board.triggers = TriggerFlags {
        manual_forward: true,
        manual_reverse: true,
    };
    rig.board.edge = true;

    let report = rig.tick();

    assert_eq!(report.motion, MotionState::Idle);
    assert_eq!(rig.board.triggers, TriggerFlags::default());
    assert!(!rig.board.edge);
    assert_eq!(rig.board.drives().count(), 0);
    for direction in [Direction::Forward, Direction::Reverse] {
        assert!(!rig.controller.phase(direction).intent().is_pending());
    }
}

#[test]
fn reset_request_forces_recalibration() {
    let mut board = MockBoard::calibrated(30.0);
    board.calibration_result = Some(CalibrationState::new(30.0, true));
    let mut rig = Rig::new(board);

    rig.board.push_frame(RadioChannel::LongRange, "AARE");
    rig.tick();
    assert!(!rig.controller.calibration().is_calibrated);
    assert_eq!(
        rig.board.stored,
        Some(CalibrationState::new(30.0, true)),
        "reset only invalidates the in-memory copy"
    );
    assert!(
        rig.events()
            .contains(&TelemetryEventKind::CalibrationInvalidated)
    );

    let mark = rig.board.calls.len();
    rig.board.push_frame(RadioChannel::LongRange, "AA21");
    let report = rig.tick();

    assert_eq!(report.motion, MotionState::Idle);
    assert_eq!(
        rig.board.calls_since(mark),
        &[
            BoardCall::Calibrate,
            BoardCall::Save(CalibrationState::new(30.0, true))
        ]
    );
    assert!(rig.controller.calibration().is_calibrated);
}

#[test]
fn reset_request_stops_active_motion() {
    let mut rig = Rig::new(MockBoard::calibrated(30.0));
    rig.board.push_frame(RadioChannel::LongRange, "AA13");
    for _ in 0..4 {
        rig.tick();
    }
    assert_eq!(rig.controller.motion_state(), MotionState::MovingForward);

    let mark = rig.board.calls.len();
    rig.board.push_frame(RadioChannel::ShortRange, "AARE");
    let report = rig.tick();

    assert_eq!(report.motion, MotionState::Idle);
    assert_eq!(report.sequence, Some(SequenceKind::ForwardStop));
    rig.settle(10);
    assert_eq!(
        rig.board.calls_since(mark),
        &[BoardCall::Stop, BoardCall::MainPower(false)]
    );
}

#[test]
fn capped_origin_reset_gives_up() {
    let mut board = MockBoard::calibrated(30.0);
    board.yaw = 2.0;
    board.origin_busy_attempts = 10;
    let mut rig = Rig::with_config(board, ControllerConfig::new().with_origin_reset_attempts(2));

    rig.board.push_frame(RadioChannel::LongRange, "AAOF");
    rig.tick_until(20, |report, _| {
        report.sequence == Some(SequenceKind::ReverseClose)
    })
    .expect("clean close never started");
    rig.settle(300);

    let resets = rig
        .board
        .calls
        .iter()
        .filter(|call| matches!(call, BoardCall::ResetOrigin { .. }))
        .count();
    assert_eq!(resets, 2);
    assert_eq!(rig.board.origin_busy_attempts, 8);
    assert!(
        rig.events()
            .contains(&TelemetryEventKind::SequenceFailed(SequenceKind::OriginReset))
    );
}
