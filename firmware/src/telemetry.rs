//! Forwards controller telemetry to the log sinks.
//!
//! The controller keeps its own bounded ring. After every tick the control
//! task drains the records it has not seen yet and mirrors them to defmt on
//! the MCU, or stdout on host builds.

use actuator_core::ControlInstant;
use actuator_core::telemetry::{EventId, TelemetryRecord, TelemetryRecorder};

use crate::instant::FirmwareInstant;

/// Remembers the newest record already forwarded.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct TelemetryDrain {
    cursor: Option<EventId>,
}

impl TelemetryDrain {
    pub const fn new() -> Self {
        Self { cursor: None }
    }

    /// Passes every record newer than the cursor to `sink`, oldest first.
    /// Returns how many records were forwarded.
    pub fn drain<TInstant, F>(
        &mut self,
        recorder: &TelemetryRecorder<TInstant>,
        mut sink: F,
    ) -> usize
    where
        TInstant: ControlInstant,
        F: FnMut(&TelemetryRecord<TInstant>),
    {
        let mut forwarded = 0;
        for record in recorder.since(self.cursor) {
            sink(record);
            self.cursor = Some(record.id);
            forwarded += 1;
        }
        forwarded
    }
}

/// Logs one record with its timestamp in microseconds.
pub fn log_record(record: &TelemetryRecord<FirmwareInstant>) {
    emit_log(record, record.timestamp.as_micros());
}

#[cfg(target_os = "none")]
fn emit_log(record: &TelemetryRecord<FirmwareInstant>, timestamp_us: u64) {
    use defmt::Display2Format;

    if record.event.is_warning() {
        defmt::warn!(
            "telemetry:{} #{} t={}us {}",
            Display2Format(&record.event),
            record.id,
            timestamp_us,
            Display2Format(&record.details)
        );
    } else {
        defmt::info!(
            "telemetry:{} #{} t={}us {}",
            Display2Format(&record.event),
            record.id,
            timestamp_us,
            Display2Format(&record.details)
        );
    }
}

#[cfg(not(target_os = "none"))]
fn emit_log(record: &TelemetryRecord<FirmwareInstant>, timestamp_us: u64) {
    let level = if record.event.is_warning() {
        "WARN"
    } else {
        "INFO"
    };
    println!(
        "{level} telemetry:{} #{} t={timestamp_us}us {}",
        record.event, record.id, record.details
    );
}
