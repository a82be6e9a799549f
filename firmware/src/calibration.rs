//! Calibration persistence and capture.
//!
//! The record occupies the last flash page:
//!
//! | bytes | field |
//! |---|---|
//! | 0..4 | magic `CAL1` |
//! | 4..6 | layout version |
//! | 6..8 | flags (bit 0: calibrated) |
//! | 8..12 | open-position target, `f32` |
//! | 12..16 | CRC-32 of bytes 0..12 |
//!
//! All fields are little-endian. A record that fails any check is treated as
//! absent so the controller boots uncalibrated.

use actuator_core::hal::CalibrationState;
use crc32fast::Hasher;
use winnow::Parser;
use winnow::binary::{le_f32, le_u16, le_u32};
use winnow::error::ModalResult;

pub const RECORD_LEN: usize = 16;
const RECORD_MAGIC: u32 = u32::from_le_bytes(*b"CAL1");
const RECORD_VERSION: u16 = 1;
const FLAG_CALIBRATED: u16 = 0x0001;
const BODY_LEN: usize = 12;

/// Smallest travel accepted as a calibrated open position.
pub const MIN_TRAVEL_DEG: f32 = 10.0;

pub type RecordBytes = [u8; RECORD_LEN];

fn crc32(body: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(body);
    hasher.finalize()
}

pub fn encode_record(state: CalibrationState) -> RecordBytes {
    let flags = if state.is_calibrated {
        FLAG_CALIBRATED
    } else {
        0
    };

    let mut record = [0u8; RECORD_LEN];
    record[0..4].copy_from_slice(&RECORD_MAGIC.to_le_bytes());
    record[4..6].copy_from_slice(&RECORD_VERSION.to_le_bytes());
    record[6..8].copy_from_slice(&flags.to_le_bytes());
    record[8..12].copy_from_slice(&state.target_sum.to_le_bytes());
    let crc = crc32(&record[..BODY_LEN]);
    record[12..16].copy_from_slice(&crc.to_le_bytes());
    record
}

fn record_fields(input: &mut &[u8]) -> ModalResult<(u32, u16, u16, f32, u32)> {
    (le_u32, le_u16, le_u16, le_f32, le_u32).parse_next(input)
}

pub fn decode_record(record: &RecordBytes) -> Option<CalibrationState> {
    let mut input = record.as_slice();
    let (magic, version, flags, target_sum, crc) = record_fields(&mut input).ok()?;

    let valid = magic == RECORD_MAGIC
        && version == RECORD_VERSION
        && crc == crc32(&record[..BODY_LEN])
        && target_sum.is_finite();
    valid.then(|| CalibrationState::new(target_sum, flags & FLAG_CALIBRATED != 0))
}

/// Captures the current yaw as the open position once the actuator has been
/// moved far enough from the origin; otherwise keeps `current`.
pub fn capture_open_position(yaw: f32, current: CalibrationState) -> CalibrationState {
    if yaw.is_finite() && yaw >= MIN_TRAVEL_DEG {
        CalibrationState::new(yaw, true)
    } else {
        current
    }
}

#[cfg(target_os = "none")]
pub use flash_store::FlashCalibrationStore;

#[cfg(target_os = "none")]
mod flash_store {
    use actuator_core::hal::{CalibrationState, StorageError};
    use embassy_stm32::flash::{Blocking, Flash};

    use super::{RECORD_LEN, RecordBytes, decode_record, encode_record};

    /// Offset of the last 2 KiB page of the 512 KiB bank.
    const RECORD_OFFSET: u32 = 0x7_F800;
    const PAGE_SIZE: u32 = 0x800;

    pub struct FlashCalibrationStore {
        flash: Flash<'static, Blocking>,
    }

    impl FlashCalibrationStore {
        pub fn new(flash: Flash<'static, Blocking>) -> Self {
            Self { flash }
        }

        pub fn load(&mut self) -> Option<CalibrationState> {
            let mut record: RecordBytes = [0; RECORD_LEN];
            self.flash.blocking_read(RECORD_OFFSET, &mut record).ok()?;
            decode_record(&record)
        }

        pub fn save(&mut self, state: CalibrationState) -> Result<(), StorageError> {
            let record = encode_record(state);
            self.flash
                .blocking_erase(RECORD_OFFSET, RECORD_OFFSET + PAGE_SIZE)
                .map_err(|_| StorageError::Erase)?;
            self.flash
                .blocking_write(RECORD_OFFSET, &record)
                .map_err(|_| StorageError::Write)?;

            let mut readback: RecordBytes = [0; RECORD_LEN];
            self.flash
                .blocking_read(RECORD_OFFSET, &mut readback)
                .map_err(|_| StorageError::Verify)?;
            if readback == record {
                Ok(())
            } else {
                Err(StorageError::Verify)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_survives_encoding() {
        let state = CalibrationState::new(87.5, true);
        assert_eq!(decode_record(&encode_record(state)), Some(state));
    }

    #[test]
    fn erased_flash_is_absent() {
        assert_eq!(decode_record(&[0xFF; RECORD_LEN]), None);
    }

    #[test]
    fn corrupted_target_fails_crc() {
        let mut record = encode_record(CalibrationState::new(42.0, true));
        record[9] ^= 0x01;
        assert_eq!(decode_record(&record), None);
    }

    #[test]
    fn uncalibrated_flag_round_trips() {
        let state = CalibrationState::new(30.0, false);
        let decoded = decode_record(&encode_record(state)).expect("valid record");
        assert!(!decoded.is_calibrated);
    }

    #[test]
    fn capture_requires_minimum_travel() {
        let current = CalibrationState::UNCALIBRATED;
        assert_eq!(capture_open_position(4.0, current), current);
        assert_eq!(capture_open_position(-35.0, current), current);
        assert_eq!(
            capture_open_position(62.0, current),
            CalibrationState::new(62.0, true)
        );
    }
}
