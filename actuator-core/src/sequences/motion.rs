//! Phase entry and exit sequences.
//!
//! Entry powers the motor rail and primes the speed loop before the first
//! closed-loop drive command. The exits differ: a forward stop just cuts
//! power, while a completed close first backs the motor off the end stop with
//! a short reverse pulse so the latch does not stay under tension.

use core::time::Duration;

use super::{SequenceAction, SequenceKind, SequenceStep, SequenceTemplate};

/// Settle after switching the main rail on.
pub const RAIL_SETTLE: Duration = Duration::from_millis(10);
/// Settle after enabling the speed loop.
pub const PRIME_SETTLE: Duration = Duration::from_millis(10);
/// Settle after a stop command before the rail drops.
pub const STOP_SETTLE: Duration = Duration::from_millis(10);
/// Drive value of the unstick pulse issued at the end of a close.
pub const UNSTICK_SPEED: i16 = -1_000;
/// Acceleration parameter of the unstick pulse.
pub const UNSTICK_ACCEL: u8 = 5;
/// Duration the unstick pulse is held.
pub const UNSTICK_HOLD: Duration = Duration::from_millis(1_000);
/// Rail-off settle after the reverse phase ends.
pub const REVERSE_POWER_DOWN_SETTLE: Duration = Duration::from_millis(100);

pub const PHASE_ENTRY_STEPS: [SequenceStep; 2] = [
    SequenceStep::new(SequenceAction::MainPower(true), RAIL_SETTLE),
    SequenceStep::new(SequenceAction::PrimeMotor, PRIME_SETTLE),
];

pub const FORWARD_STOP_STEPS: [SequenceStep; 2] = [
    SequenceStep::new(SequenceAction::StopMotor, STOP_SETTLE),
    SequenceStep::new(SequenceAction::MainPower(false), Duration::ZERO),
];

/// Reverse exit on stall or preemption: no unstick pulse and no sleep.
pub const REVERSE_ABORT_STEPS: [SequenceStep; 2] = [
    SequenceStep::new(SequenceAction::StopMotor, Duration::ZERO),
    SequenceStep::new(SequenceAction::MainPower(false), REVERSE_POWER_DOWN_SETTLE),
];

pub const REVERSE_CLOSE_STEPS: [SequenceStep; 3] = [
    SequenceStep::new(
        SequenceAction::Drive {
            speed: UNSTICK_SPEED,
            accel: UNSTICK_ACCEL,
        },
        UNSTICK_HOLD,
    ),
    SequenceStep::new(SequenceAction::StopMotor, Duration::ZERO),
    SequenceStep::new(SequenceAction::MainPower(false), REVERSE_POWER_DOWN_SETTLE),
];

pub const PHASE_ENTRY_TEMPLATE: SequenceTemplate =
    SequenceTemplate::new(SequenceKind::PhaseEntry, &PHASE_ENTRY_STEPS);

pub const FORWARD_STOP_TEMPLATE: SequenceTemplate =
    SequenceTemplate::new(SequenceKind::ForwardStop, &FORWARD_STOP_STEPS);

pub const REVERSE_ABORT_TEMPLATE: SequenceTemplate =
    SequenceTemplate::new(SequenceKind::ReverseAbort, &REVERSE_ABORT_STEPS);

pub const REVERSE_CLOSE_TEMPLATE: SequenceTemplate =
    SequenceTemplate::new(SequenceKind::ReverseClose, &REVERSE_CLOSE_STEPS);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_powers_before_priming() {
        let steps = PHASE_ENTRY_TEMPLATE.steps();
        assert_eq!(steps[0].action, SequenceAction::MainPower(true));
        assert_eq!(steps[1].action, SequenceAction::PrimeMotor);
        assert_eq!(
            PHASE_ENTRY_TEMPLATE.nominal_duration(),
            Duration::from_millis(20)
        );
    }

    #[test]
    fn close_pulses_before_power_down() {
        let steps = REVERSE_CLOSE_TEMPLATE.steps();
        assert_eq!(
            steps[0].action,
            SequenceAction::Drive {
                speed: -1_000,
                accel: 5
            }
        );
        assert_eq!(steps[0].hold_for, Duration::from_millis(1_000));
        assert_eq!(steps[2].action, SequenceAction::MainPower(false));
    }

    #[test]
    fn abort_skips_unstick_pulse() {
        assert!(
            REVERSE_ABORT_TEMPLATE
                .steps()
                .iter()
                .all(|step| !matches!(step.action, SequenceAction::Drive { .. }))
        );
    }
}
