//! Low-power entry.
//!
//! The order matters: the motor rail drops first, peripherals are parked
//! while the sensor-select pins hold the sleep configuration, the short-range
//! link is forced to disconnect twice, and the low-power flag goes up last.

use core::time::Duration;

use super::{SequenceAction, SequenceKind, SequenceStep, SequenceTemplate};

/// Settle between best-effort peripheral commands.
pub const PERIPHERAL_SETTLE: Duration = Duration::from_millis(10);
/// Presence threshold written to the ranging device before sleeping.
pub const RANGING_SLEEP_THRESHOLD: u16 = 512;
/// Link command forcing a disconnect.
pub const LINK_DISCONNECT: &str = "AT+DISCONN=1";
/// Link command re-enabling connections.
pub const LINK_RECONNECT: &str = "AT+DISCONN=0";
/// Interval between origin-reset attempts.
pub const ORIGIN_RESET_BACKOFF: Duration = Duration::from_millis(10);
/// Hold after an inactivity sleep before normal ticks resume.
pub const IDLE_SETTLE_HOLD: Duration = Duration::from_millis(1_000);

pub const SLEEP_STEPS: [SequenceStep; 11] = [
    SequenceStep::new(SequenceAction::MainPower(false), Duration::ZERO),
    SequenceStep::new(SequenceAction::SensorSelect(true), PERIPHERAL_SETTLE),
    SequenceStep::new(SequenceAction::YawLowPower, PERIPHERAL_SETTLE),
    SequenceStep::new(SequenceAction::LinkCommand(LINK_DISCONNECT), PERIPHERAL_SETTLE),
    SequenceStep::new(SequenceAction::LinkCommand(LINK_RECONNECT), PERIPHERAL_SETTLE),
    SequenceStep::new(SequenceAction::LinkCommand(LINK_DISCONNECT), PERIPHERAL_SETTLE),
    SequenceStep::new(SequenceAction::LinkCommand(LINK_RECONNECT), Duration::ZERO),
    SequenceStep::new(SequenceAction::SensorSelect(false), Duration::ZERO),
    SequenceStep::new(SequenceAction::InertialSleep, PERIPHERAL_SETTLE),
    SequenceStep::new(
        SequenceAction::RangingThreshold(RANGING_SLEEP_THRESHOLD),
        Duration::ZERO,
    ),
    SequenceStep::new(SequenceAction::RaiseLowPower, Duration::ZERO),
];

pub const ORIGIN_RESET_STEPS: [SequenceStep; 1] = [SequenceStep::until_acknowledged(
    SequenceAction::ResetOrigin,
    ORIGIN_RESET_BACKOFF,
)];

pub const IDLE_SETTLE_STEPS: [SequenceStep; 1] = [SequenceStep::new(
    SequenceAction::MainPower(false),
    IDLE_SETTLE_HOLD,
)];

pub const SLEEP_TEMPLATE: SequenceTemplate =
    SequenceTemplate::new(SequenceKind::Sleep, &SLEEP_STEPS);

pub const ORIGIN_RESET_TEMPLATE: SequenceTemplate =
    SequenceTemplate::new(SequenceKind::OriginReset, &ORIGIN_RESET_STEPS);

pub const IDLE_SETTLE_TEMPLATE: SequenceTemplate =
    SequenceTemplate::new(SequenceKind::IdleSettle, &IDLE_SETTLE_STEPS);
