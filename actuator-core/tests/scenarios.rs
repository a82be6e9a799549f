mod support;

use actuator_core::hal::{RadioChannel, TriggerFlags};
use actuator_core::motion::{Direction, MotionState, StopReason};
use actuator_core::sequences::SequenceKind;
use actuator_core::stall::StallFault;
use actuator_core::telemetry::{TelemetryEventKind, TelemetryPayload};

use support::{BoardCall, MockBoard, Rig};

/// Simulated plant response: degrees of travel per drive unit per tick.
const PLANT_GAIN: f32 = 0.001;

fn stop_reason(rig: &Rig, direction: Direction) -> Option<StopReason> {
    rig.controller
        .telemetry()
        .oldest_first()
        .filter(|record| record.event == TelemetryEventKind::PhaseStopped(direction))
        .filter_map(|record| match record.details {
            TelemetryPayload::Phase(details) => details.reason,
            _ => None,
        })
        .last()
}

#[test]
fn quiet_inputs_never_drive() {
    let mut rig = Rig::new(MockBoard::calibrated(30.0));

    for step in 0..500u16 {
        rig.board.yaw = f32::from(step % 99) / 10.0 - 4.9;
        let report = rig.tick();
        assert_eq!(report.motion, MotionState::Idle);
        assert_eq!(report.drive, None);
    }
    assert_eq!(rig.board.drives().count(), 0);
}

#[test]
fn hold_power_frame_enables_rail() {
    let mut rig = Rig::new(MockBoard::calibrated(30.0));
    rig.tick();
    assert!(!rig.board.main_power);

    let arrival = rig.now;
    rig.board.push_frame(RadioChannel::LongRange, "AA00");
    rig.tick();

    assert!(rig.board.main_power);
    assert!(rig.controller.keepalive().is_enabled());
    assert_eq!(rig.controller.keepalive().last_activity(), Some(arrival));
}

#[test]
fn move_frame_starts_forward_phase() {
    let mut rig = Rig::new(MockBoard::calibrated(30.0));
    rig.board.push_frame(RadioChannel::LongRange, "AA21");

    let report = rig.tick();
    assert_eq!(report.motion, MotionState::MovingForward);
    assert_eq!(report.sequence, Some(SequenceKind::PhaseEntry));
    assert!(rig.board.main_power);

    rig.settle(10);
    let report = rig.tick();
    assert_eq!(report.drive, Some(400));
    assert_eq!(
        rig.board.calls.last(),
        Some(&BoardCall::Drive {
            axis: 0x01,
            speed: 400,
            accel: 20,
        })
    );
}

#[test]
fn forward_phase_respects_speed_cap_and_arrives() {
    let mut rig = Rig::new(MockBoard::calibrated(30.0));
    rig.board.push_frame(RadioChannel::LongRange, "AA21");

    let mut stopped = false;
    for _ in 0..200 {
        let report = rig.tick();
        rig.follow_drive(&report, PLANT_GAIN);
        if rig.controller.motion_state() == MotionState::Idle && report.drive.is_none() {
            stopped = rig.board.drives().count() > 0;
            if stopped {
                break;
            }
        }
    }
    assert!(stopped, "forward phase never finished");

    for speed in rig.board.drives() {
        assert!(speed > 0, "unexpected reverse drive {speed}");
        assert!(speed <= 1_200, "speed {speed} above medium cap");
    }
    assert_eq!(stop_reason(&rig, Direction::Forward), Some(StopReason::Arrived));

    let stopped_at = rig.controller.last_yaw();
    assert!((10.0 - stopped_at).abs() < 5.0, "stopped at {stopped_at}");

    rig.settle(10);
    assert!(!rig.board.main_power);
    assert!(
        rig.board
            .calls
            .iter()
            .all(|call| !matches!(call, BoardCall::Drive { speed: -1_000, .. }))
    );
}

#[test]
fn backward_slip_aborts_forward_phase() {
    let mut rig = Rig::new(MockBoard::calibrated(90.0));
    rig.board.push_frame(RadioChannel::ShortRange, "AA33");

    for _ in 0..170 {
        let report = rig.tick();
        if report.drive.is_some() {
            rig.board.yaw += 0.2;
        }
    }
    assert_eq!(rig.controller.motion_state(), MotionState::MovingForward);

    rig.board.yaw -= 0.5;
    let mark = rig.board.calls.len();
    let report = rig.tick();

    assert_eq!(report.motion, MotionState::Idle);
    assert_eq!(
        stop_reason(&rig, Direction::Forward),
        Some(StopReason::Stalled(StallFault::WrongDirection))
    );

    rig.settle(10);
    assert_eq!(
        rig.board.calls_since(mark),
        &[BoardCall::Stop, BoardCall::MainPower(false)]
    );
}

#[test]
fn clean_close_runs_unstick_and_sleep() {
    let mut board = MockBoard::calibrated(30.0);
    board.yaw = 20.0;
    board.origin_busy_attempts = 3;
    let mut rig = Rig::new(board);
    rig.board.push_frame(RadioChannel::LongRange, "AAOF");

    let report = rig.tick();
    assert_eq!(report.motion, MotionState::MovingReverse);

    let mut mark = None;
    for _ in 0..100 {
        let before = rig.board.calls.len();
        let report = rig.tick();
        if let Some(speed) = report.drive {
            assert!(speed < 0);
            rig.follow_drive(&report, PLANT_GAIN);
        }
        if report.motion == MotionState::Idle {
            mark = Some(before);
            break;
        }
    }
    let mark = mark.expect("reverse phase never stopped");
    assert_eq!(stop_reason(&rig, Direction::Reverse), Some(StopReason::Arrived));
    assert_eq!(
        rig.controller.sequence(),
        Some(SequenceKind::ReverseClose)
    );

    rig.settle(500);

    let expected = vec![
        BoardCall::Drive {
            axis: 0x01,
            speed: -1_000,
            accel: 5,
        },
        BoardCall::Stop,
        BoardCall::MainPower(false),
        BoardCall::MainPower(false),
        BoardCall::SensorSelect(true),
        BoardCall::YawLowPower,
        BoardCall::AtCommand("AT+DISCONN=1".into()),
        BoardCall::AtCommand("AT+DISCONN=0".into()),
        BoardCall::AtCommand("AT+DISCONN=1".into()),
        BoardCall::AtCommand("AT+DISCONN=0".into()),
        BoardCall::SensorSelect(false),
        BoardCall::InertialSleep,
        BoardCall::RangingThreshold(512),
        BoardCall::LowPower,
        BoardCall::ResetOrigin {
            acknowledged: false,
        },
        BoardCall::ResetOrigin {
            acknowledged: false,
        },
        BoardCall::ResetOrigin {
            acknowledged: false,
        },
        BoardCall::ResetOrigin { acknowledged: true },
    ];
    assert_eq!(rig.board.calls_since(mark), expected.as_slice());

    let retries = rig
        .events()
        .into_iter()
        .filter(|event| *event == TelemetryEventKind::OriginResetRetry)
        .count();
    assert_eq!(retries, 3);
    assert!(
        rig.events()
            .contains(&TelemetryEventKind::SequenceComplete(SequenceKind::OriginReset))
    );
}

#[test]
fn reverse_stall_skips_unstick_and_sleep() {
    let mut board = MockBoard::calibrated(30.0);
    board.yaw = 20.0;
    let mut rig = Rig::new(board);
    rig.board.push_frame(RadioChannel::LongRange, "AAOF");

    let mut mark = None;
    for _ in 0..400 {
        let before = rig.board.calls.len();
        let report = rig.tick();
        if report.motion == MotionState::Idle {
            mark = Some(before);
            break;
        }
    }
    let mark = mark.expect("stalled reverse phase never stopped");
    assert_eq!(
        stop_reason(&rig, Direction::Reverse),
        Some(StopReason::Stalled(StallFault::Plateau))
    );

    rig.settle(50);
    assert_eq!(
        rig.board.calls_since(mark),
        &[BoardCall::Stop, BoardCall::MainPower(false)]
    );
}

#[test]
fn move_preempts_reverse_and_reopens() {
    let mut board = MockBoard::calibrated(30.0);
    board.yaw = 20.0;
    let mut rig = Rig::new(board);
    rig.board.push_frame(RadioChannel::LongRange, "AAOF");

    for _ in 0..5 {
        rig.tick();
    }
    assert_eq!(rig.controller.motion_state(), MotionState::MovingReverse);

    rig.board.push_frame(RadioChannel::ShortRange, "AA31");
    let mark = rig.board.calls.len();
    let report = rig.tick();

    assert_eq!(report.motion, MotionState::Idle);
    assert_eq!(report.sequence, Some(SequenceKind::ReverseAbort));
    assert_eq!(stop_reason(&rig, Direction::Reverse), Some(StopReason::Preempted));

    let report = rig
        .tick_until(20, |report, _| {
            report.sequence != Some(SequenceKind::ReverseAbort)
        })
        .expect("abort sequence never finished");
    assert_eq!(report.motion, MotionState::MovingForward);
    assert_eq!(report.sequence, Some(SequenceKind::PhaseEntry));
    assert_eq!(
        rig.board.calls_since(mark),
        &[
            BoardCall::Stop,
            BoardCall::MainPower(false),
            BoardCall::MainPower(true)
        ]
    );
}

#[test]
fn preemption_wins_over_arrival_on_the_same_tick() {
    let mut board = MockBoard::calibrated(30.0);
    board.yaw = 20.0;
    let mut rig = Rig::new(board);
    rig.board.push_frame(RadioChannel::LongRange, "AAOF");

    for _ in 0..5 {
        rig.tick();
    }
    assert_eq!(rig.controller.motion_state(), MotionState::MovingReverse);

    // Inside the arrival tolerance, but a Move lands on the same tick.
    rig.board.yaw = 3.0;
    rig.board.push_frame(RadioChannel::ShortRange, "AA33");
    let report = rig.tick();

    assert_eq!(report.motion, MotionState::Idle);
    assert_eq!(report.sequence, Some(SequenceKind::ReverseAbort));
    assert_eq!(stop_reason(&rig, Direction::Reverse), Some(StopReason::Preempted));

    rig.tick_until(20, |report, _| {
        report.sequence != Some(SequenceKind::ReverseAbort)
    })
    .expect("abort sequence never finished");
    assert!(rig.board.drives().all(|speed| speed != -1_000));
    assert!(!rig.board.calls.contains(&BoardCall::LowPower));
    assert!(
        !rig.board
            .calls
            .iter()
            .any(|call| matches!(call, BoardCall::ResetOrigin { .. }))
    );
}

#[test]
fn unstick_pulse_ignores_the_speed_cap() {
    let mut board = MockBoard::calibrated(30.0);
    board.yaw = 20.0;
    let mut rig = Rig::new(board);

    // Low speed, with an angle the open door already exceeds.
    rig.board.push_frame(RadioChannel::LongRange, "AA11");
    assert_eq!(rig.tick().motion, MotionState::Idle);

    rig.board.push_frame(RadioChannel::LongRange, "AAOF");
    assert_eq!(rig.tick().motion, MotionState::MovingReverse);

    let mut mark = None;
    for _ in 0..200 {
        let before = rig.board.calls.len();
        let report = rig.tick();
        if let Some(speed) = report.drive {
            assert!((-600..0).contains(&speed), "reverse drive {speed}");
            rig.follow_drive(&report, PLANT_GAIN);
        }
        if report.motion == MotionState::Idle {
            mark = Some(before);
            break;
        }
    }
    let mark = mark.expect("reverse phase never stopped");
    assert_eq!(stop_reason(&rig, Direction::Reverse), Some(StopReason::Arrived));

    rig.settle(500);
    assert_eq!(
        rig.board.calls_since(mark).first(),
        Some(&BoardCall::Drive {
            axis: 0x01,
            speed: -1_000,
            accel: 5,
        })
    );
}

#[test]
fn oscillation_aborts_forward_phase() {
    let mut board = MockBoard::calibrated(30.0);
    board.yaw = 0.04;
    let mut rig = Rig::new(board);
    rig.board.push_frame(RadioChannel::LongRange, "AA33");

    // Past the settle time, short of the plateau window.
    for _ in 0..170 {
        assert_eq!(rig.tick().motion, MotionState::MovingForward);
    }

    for yaw in [-0.04, 0.04] {
        rig.board.yaw = yaw;
        assert_eq!(rig.tick().motion, MotionState::MovingForward);
    }

    rig.board.yaw = -0.04;
    let mark = rig.board.calls.len();
    let report = rig.tick();
    assert_eq!(report.motion, MotionState::Idle);
    assert_eq!(
        stop_reason(&rig, Direction::Forward),
        Some(StopReason::Stalled(StallFault::Oscillation))
    );

    rig.settle(50);
    assert_eq!(
        rig.board.calls_since(mark),
        &[BoardCall::Stop, BoardCall::MainPower(false)]
    );
}

#[test]
fn manual_edge_arms_forward_inside_deadband() {
    let mut board = MockBoard::calibrated(30.0);
    board.yaw = 29.0;
    let mut rig = Rig::new(board);

    rig.board.edge = true;
    let report = rig.tick();
    assert_eq!(report.motion, MotionState::Idle);
    assert!(rig.controller.phase(Direction::Forward).intent().armed);

    let report = rig.tick();
    assert_eq!(report.motion, MotionState::MovingForward);

    rig.settle(10);
    let report = rig.tick();
    assert_eq!(report.motion, MotionState::Idle);
    assert_eq!(stop_reason(&rig, Direction::Forward), Some(StopReason::Arrived));
}

#[test]
fn manual_trigger_requests_gated_entry() {
    let mut board = MockBoard::calibrated(30.0);
    board.yaw = 29.0;
    let mut rig = Rig::new(board);

    rig.board.triggers = TriggerFlags {
        manual_forward: true,
        manual_reverse: false,
    };
    assert_eq!(rig.tick().motion, MotionState::Idle);

    rig.board.yaw = 0.0;
    rig.board.triggers.manual_forward = true;
    assert_eq!(rig.tick().motion, MotionState::MovingForward);
}

#[test]
fn phase_entry_zeroes_bus_current() {
    let mut board = MockBoard::calibrated(30.0);
    board.bus_current = Some(0.4);
    let mut rig = Rig::new(board);

    rig.tick();
    assert_eq!(rig.controller.bus_current(), 0.4);
    assert_eq!(rig.board.bus_slot, Some(2));

    rig.board.bus_current = None;
    rig.board.push_frame(RadioChannel::LongRange, "AA11");
    rig.tick();
    assert_eq!(rig.controller.bus_current(), 0.0);
}
