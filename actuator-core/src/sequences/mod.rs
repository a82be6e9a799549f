//! Timed step sequences shared by firmware and host targets.
//!
//! Every wait the control loop performs lives in one of these templates
//! instead of inline delays. The sequencer walks the steps, applies each
//! action to the board, and holds for the step's duration before moving on.
//! Everything in this module is `no_std` friendly so the same data compiles
//! for the MCU and the host emulator.

use core::time::Duration;

pub mod motion;
pub mod sleep;

pub use motion::{
    FORWARD_STOP_TEMPLATE, PHASE_ENTRY_TEMPLATE, REVERSE_ABORT_TEMPLATE, REVERSE_CLOSE_TEMPLATE,
};
pub use sleep::{IDLE_SETTLE_TEMPLATE, ORIGIN_RESET_TEMPLATE, SLEEP_TEMPLATE};

/// Longest sequence we encode (Sleep) plus one step of headroom.
pub const MAX_SEQUENCE_STEPS: usize = 12;

/// Board operation applied when a step starts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SequenceAction {
    /// Switch the main (motor) power rail.
    MainPower(bool),
    /// Drive the sensor-select pins; `true` selects the sleep configuration.
    SensorSelect(bool),
    /// Put the yaw sensor into its low-power mode.
    YawLowPower,
    /// Send an AT command to the short-range link module.
    LinkCommand(&'static str),
    /// Put the inertial sensor to sleep.
    InertialSleep,
    /// Persist a presence threshold into the ranging device.
    RangingThreshold(u16),
    /// Raise the low-power flag consumed by the power manager.
    RaiseLowPower,
    StopMotor,
    /// Enable the motor's speed loop ahead of the first drive command.
    PrimeMotor,
    /// Open-loop drive command with an explicit acceleration parameter.
    Drive { speed: i16, accel: u8 },
    /// Zero the yaw reference; may need several attempts.
    ResetOrigin,
}

/// How a step reports completion back to the sequencer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StepCompletion {
    /// The action is applied once and the step ends after `hold_for`.
    AfterDuration,
    /// The action is retried every `backoff` until the board acknowledges it.
    UntilAcknowledged { backoff: Duration },
}

/// Ordered operation the sequencer applies to the board.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SequenceStep {
    pub action: SequenceAction,
    pub hold_for: Duration,
    pub completion: StepCompletion,
}

impl SequenceStep {
    pub const fn new(action: SequenceAction, hold_for: Duration) -> Self {
        Self {
            action,
            hold_for,
            completion: StepCompletion::AfterDuration,
        }
    }

    pub const fn until_acknowledged(action: SequenceAction, backoff: Duration) -> Self {
        Self {
            action,
            hold_for: Duration::ZERO,
            completion: StepCompletion::UntilAcknowledged { backoff },
        }
    }
}

/// The type of sequence described by a template.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SequenceKind {
    PhaseEntry,
    ForwardStop,
    ReverseAbort,
    ReverseClose,
    Sleep,
    OriginReset,
    IdleSettle,
}

impl SequenceKind {
    const PHASE_ENTRY_CODE: u8 = 0x01;
    const FORWARD_STOP_CODE: u8 = 0x02;
    const REVERSE_ABORT_CODE: u8 = 0x03;
    const REVERSE_CLOSE_CODE: u8 = 0x04;
    const SLEEP_CODE: u8 = 0x05;
    const ORIGIN_RESET_CODE: u8 = 0x06;
    const IDLE_SETTLE_CODE: u8 = 0x07;

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            SequenceKind::PhaseEntry => Self::PHASE_ENTRY_CODE,
            SequenceKind::ForwardStop => Self::FORWARD_STOP_CODE,
            SequenceKind::ReverseAbort => Self::REVERSE_ABORT_CODE,
            SequenceKind::ReverseClose => Self::REVERSE_CLOSE_CODE,
            SequenceKind::Sleep => Self::SLEEP_CODE,
            SequenceKind::OriginReset => Self::ORIGIN_RESET_CODE,
            SequenceKind::IdleSettle => Self::IDLE_SETTLE_CODE,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            SequenceKind::PhaseEntry => "phase-entry",
            SequenceKind::ForwardStop => "forward-stop",
            SequenceKind::ReverseAbort => "reverse-abort",
            SequenceKind::ReverseClose => "reverse-close",
            SequenceKind::Sleep => "sleep",
            SequenceKind::OriginReset => "origin-reset",
            SequenceKind::IdleSettle => "idle-settle",
        }
    }
}

/// Immutable step sequence shared across targets.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SequenceTemplate {
    pub kind: SequenceKind,
    pub steps: &'static [SequenceStep],
}

impl SequenceTemplate {
    pub const fn new(kind: SequenceKind, steps: &'static [SequenceStep]) -> Self {
        Self { kind, steps }
    }

    /// Returns the ordered steps that make up the sequence.
    pub const fn steps(&self) -> &'static [SequenceStep] {
        self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Sum of the fixed holds; retrying steps contribute nothing.
    pub fn nominal_duration(&self) -> Duration {
        self.steps
            .iter()
            .fold(Duration::ZERO, |total, step| total + step.hold_for)
    }
}
