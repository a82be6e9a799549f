//! Telemetry event catalog and the fixed-capacity recorder owned by the
//! controller.
//!
//! The core never prints. Every notable transition is recorded as a
//! [`TelemetryRecord`] with a monotonically increasing id so firmware and the
//! emulator can drain new records after each tick and forward them to their
//! own log sinks. Event kinds serialize to compact numeric codes for
//! transport.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::command::Command;
use crate::hal::{CalibrationState, RadioChannel, StorageError};
use crate::motion::{Direction, StopReason};
use crate::sequencer::{SequenceError, SequenceEvent};
use crate::sequences::SequenceKind;
use crate::time::ControlInstant;

/// Identifier assigned to each recorded event.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    CommandDecoded,
    FrameDropped,
    PhaseStarted(Direction),
    PhaseStopped(Direction),
    KeepaliveHeld,
    KeepaliveExpired,
    SequenceStarted(SequenceKind),
    SequenceComplete(SequenceKind),
    SequenceFailed(SequenceKind),
    OriginResetRetry,
    CalibrationSaved,
    CalibrationSaveFailed,
    CalibrationInvalidated,
    AutoCloseArmed,
}

impl TelemetryEventKind {
    const COMMAND_DECODED_CODE: u16 = 0x0001;
    const FRAME_DROPPED_CODE: u16 = 0x0002;
    const PHASE_STARTED_BASE: u16 = 0x0010;
    const PHASE_STOPPED_BASE: u16 = 0x0018;
    const KEEPALIVE_HELD_CODE: u16 = 0x0020;
    const KEEPALIVE_EXPIRED_CODE: u16 = 0x0021;
    const SEQUENCE_STARTED_BASE: u16 = 0x0030;
    const SEQUENCE_COMPLETE_BASE: u16 = 0x0040;
    const SEQUENCE_FAILED_BASE: u16 = 0x0050;
    const ORIGIN_RESET_RETRY_CODE: u16 = 0x0060;
    const CALIBRATION_SAVED_CODE: u16 = 0x0070;
    const CALIBRATION_SAVE_FAILED_CODE: u16 = 0x0071;
    const CALIBRATION_INVALIDATED_CODE: u16 = 0x0072;
    const AUTO_CLOSE_ARMED_CODE: u16 = 0x0080;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::CommandDecoded => Self::COMMAND_DECODED_CODE,
            TelemetryEventKind::FrameDropped => Self::FRAME_DROPPED_CODE,
            TelemetryEventKind::PhaseStarted(direction) => {
                Self::PHASE_STARTED_BASE + u16::from(direction.to_raw())
            }
            TelemetryEventKind::PhaseStopped(direction) => {
                Self::PHASE_STOPPED_BASE + u16::from(direction.to_raw())
            }
            TelemetryEventKind::KeepaliveHeld => Self::KEEPALIVE_HELD_CODE,
            TelemetryEventKind::KeepaliveExpired => Self::KEEPALIVE_EXPIRED_CODE,
            TelemetryEventKind::SequenceStarted(kind) => {
                Self::SEQUENCE_STARTED_BASE + u16::from(kind.to_raw())
            }
            TelemetryEventKind::SequenceComplete(kind) => {
                Self::SEQUENCE_COMPLETE_BASE + u16::from(kind.to_raw())
            }
            TelemetryEventKind::SequenceFailed(kind) => {
                Self::SEQUENCE_FAILED_BASE + u16::from(kind.to_raw())
            }
            TelemetryEventKind::OriginResetRetry => Self::ORIGIN_RESET_RETRY_CODE,
            TelemetryEventKind::CalibrationSaved => Self::CALIBRATION_SAVED_CODE,
            TelemetryEventKind::CalibrationSaveFailed => Self::CALIBRATION_SAVE_FAILED_CODE,
            TelemetryEventKind::CalibrationInvalidated => Self::CALIBRATION_INVALIDATED_CODE,
            TelemetryEventKind::AutoCloseArmed => Self::AUTO_CLOSE_ARMED_CODE,
        }
    }

    /// `true` for events that indicate something went wrong.
    #[must_use]
    pub const fn is_warning(self) -> bool {
        matches!(
            self,
            TelemetryEventKind::SequenceFailed(_) | TelemetryEventKind::CalibrationSaveFailed
        )
    }
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::CommandDecoded => f.write_str("command-decoded"),
            TelemetryEventKind::FrameDropped => f.write_str("frame-dropped"),
            TelemetryEventKind::PhaseStarted(direction) => {
                write!(f, "phase-started {}", direction.label())
            }
            TelemetryEventKind::PhaseStopped(direction) => {
                write!(f, "phase-stopped {}", direction.label())
            }
            TelemetryEventKind::KeepaliveHeld => f.write_str("keepalive-held"),
            TelemetryEventKind::KeepaliveExpired => f.write_str("keepalive-expired"),
            TelemetryEventKind::SequenceStarted(kind) => {
                write!(f, "sequence-started {}", kind.label())
            }
            TelemetryEventKind::SequenceComplete(kind) => {
                write!(f, "sequence-complete {}", kind.label())
            }
            TelemetryEventKind::SequenceFailed(kind) => {
                write!(f, "sequence-failed {}", kind.label())
            }
            TelemetryEventKind::OriginResetRetry => f.write_str("origin-reset-retry"),
            TelemetryEventKind::CalibrationSaved => f.write_str("calibration-saved"),
            TelemetryEventKind::CalibrationSaveFailed => f.write_str("calibration-save-failed"),
            TelemetryEventKind::CalibrationInvalidated => f.write_str("calibration-invalidated"),
            TelemetryEventKind::AutoCloseArmed => f.write_str("auto-close-armed"),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    Command(CommandTelemetry),
    Phase(PhaseTelemetry),
    /// Attempt number of a retried step.
    Retry(u16),
    Sequence(SequenceError),
    Calibration(CalibrationState),
    Storage(StorageError),
}

/// Decoded frame metadata.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CommandTelemetry {
    pub channel: RadioChannel,
    pub command: Command,
}

/// Phase transition metadata.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PhaseTelemetry {
    pub yaw: f32,
    /// How long the phase ran; `None` on entry.
    pub elapsed: Option<Duration>,
    pub reason: Option<StopReason>,
}

impl fmt::Display for TelemetryPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryPayload::None => Ok(()),
            TelemetryPayload::Command(details) => {
                write!(f, "{} via {}", details.command, details.channel.label())
            }
            TelemetryPayload::Phase(details) => {
                write!(f, "yaw={:.2}", details.yaw)?;
                if let Some(elapsed) = details.elapsed {
                    write!(f, " after={}ms", elapsed.as_millis())?;
                }
                if let Some(reason) = details.reason {
                    write!(f, " reason={reason}")?;
                }
                Ok(())
            }
            TelemetryPayload::Retry(attempt) => write!(f, "attempt={attempt}"),
            TelemetryPayload::Sequence(error) => write!(f, "{error}"),
            TelemetryPayload::Calibration(state) => write!(
                f,
                "target={:.2} calibrated={}",
                state.target_sum, state.is_calibrated
            ),
            TelemetryPayload::Storage(error) => write!(f, "{error}"),
        }
    }
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: ControlInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Records newer than `cursor`, oldest first. `None` yields everything
    /// still retained.
    pub fn since(
        &self,
        cursor: Option<EventId>,
    ) -> impl Iterator<Item = &TelemetryRecord<TInstant>> + '_ {
        self.oldest_first()
            .filter(move |record| cursor.is_none_or(|seen| record.id > seen))
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }

    pub fn record_command(
        &mut self,
        channel: RadioChannel,
        command: Command,
        timestamp: TInstant,
    ) -> EventId {
        let event = match command {
            Command::Unrecognized => TelemetryEventKind::FrameDropped,
            _ => TelemetryEventKind::CommandDecoded,
        };
        self.record(
            event,
            TelemetryPayload::Command(CommandTelemetry { channel, command }),
            timestamp,
        )
    }

    pub fn record_phase_started(
        &mut self,
        direction: Direction,
        yaw: f32,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::PhaseStarted(direction),
            TelemetryPayload::Phase(PhaseTelemetry {
                yaw,
                elapsed: None,
                reason: None,
            }),
            timestamp,
        )
    }

    /// Records a phase stop and how long the phase ran.
    pub fn record_phase_stopped(
        &mut self,
        direction: Direction,
        reason: StopReason,
        yaw: f32,
        started_at: Option<TInstant>,
        timestamp: TInstant,
    ) -> EventId {
        let elapsed = started_at.map(|start| timestamp.saturating_duration_since(start));
        self.record(
            TelemetryEventKind::PhaseStopped(direction),
            TelemetryPayload::Phase(PhaseTelemetry {
                yaw,
                elapsed,
                reason: Some(reason),
            }),
            timestamp,
        )
    }

    /// Translates a sequencer notification into a record.
    pub fn record_sequence_event(&mut self, event: SequenceEvent, timestamp: TInstant) -> EventId {
        let (kind, payload) = match event {
            SequenceEvent::Started(kind) => (
                TelemetryEventKind::SequenceStarted(kind),
                TelemetryPayload::None,
            ),
            SequenceEvent::Completed(kind) => (
                TelemetryEventKind::SequenceComplete(kind),
                TelemetryPayload::None,
            ),
            SequenceEvent::Retry { attempt, .. } => (
                TelemetryEventKind::OriginResetRetry,
                TelemetryPayload::Retry(attempt),
            ),
            SequenceEvent::Failed { kind, error } => (
                TelemetryEventKind::SequenceFailed(kind),
                TelemetryPayload::Sequence(error),
            ),
        };
        self.record(kind, payload, timestamp)
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: ControlInstant,
{
    fn default() -> Self {
        Self::new()
    }
}
