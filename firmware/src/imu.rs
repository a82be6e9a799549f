//! Wire codec for the serial attitude sensor that supplies yaw.
//!
//! The sensor streams 11-byte packets: `0x55`, a packet type, four
//! little-endian 16-bit words, and an 8-bit additive checksum over the first
//! ten bytes. Angle packets (type `0x53`) carry roll, pitch, and yaw scaled so
//! that `i16::MAX` is 180 degrees. Configuration commands are 5-byte
//! `FF AA reg lo hi` writes.

use heapless::Vec;
use winnow::Parser;
use winnow::binary::{le_i16, le_u16, u8 as byte};
use winnow::error::ModalResult;
use winnow::token::literal;

pub const PACKET_LEN: usize = 11;
const PACKET_HEADER: u8 = 0x55;
const ANGLE_HEADER: &[u8; 2] = &[PACKET_HEADER, 0x53];
const FULL_SCALE_DEG: f32 = 180.0;

/// Zeroes the yaw axis at the current heading.
pub const RESET_YAW: [u8; 5] = [0xFF, 0xAA, 0x76, 0x00, 0x00];
/// Puts the sensor into its sleep state until the next byte arrives.
pub const SLEEP: [u8; 5] = [0xFF, 0xAA, 0x22, 0x01, 0x00];

/// One decoded angle packet, in degrees.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AngleSample {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

fn scale(raw: i16) -> f32 {
    f32::from(raw) / 32_768.0 * FULL_SCALE_DEG
}

fn angle_packet(input: &mut &[u8]) -> ModalResult<AngleSample> {
    (literal(ANGLE_HEADER), le_i16, le_i16, le_i16, le_u16, byte)
        .map(|(_, roll, pitch, yaw, _version, _checksum)| AngleSample {
            roll: scale(roll),
            pitch: scale(pitch),
            yaw: scale(yaw),
        })
        .parse_next(input)
}

fn checksum_matches(packet: &[u8]) -> bool {
    let Some((&expected, body)) = packet.split_last() else {
        return false;
    };
    body.iter().fold(0u8, |sum, value| sum.wrapping_add(*value)) == expected
}

/// Reassembles packets from the byte stream and yields angle samples.
pub struct PacketDecoder {
    buffer: Vec<u8, PACKET_LEN>,
}

impl PacketDecoder {
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn push(&mut self, value: u8) -> Option<AngleSample> {
        if self.buffer.is_empty() && value != PACKET_HEADER {
            return None;
        }
        // Never full here: a complete packet is consumed right after the push.
        let _ = self.buffer.push(value);
        if !self.buffer.is_full() {
            return None;
        }

        let sample = if checksum_matches(&self.buffer) {
            let mut input = self.buffer.as_slice();
            angle_packet(&mut input).ok()
        } else {
            None
        };
        self.buffer.clear();
        sample
    }
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(kind: u8, words: [i16; 4]) -> [u8; PACKET_LEN] {
        let mut bytes = [0u8; PACKET_LEN];
        bytes[0] = PACKET_HEADER;
        bytes[1] = kind;
        for (index, word) in words.iter().enumerate() {
            let [lo, hi] = word.to_le_bytes();
            bytes[2 + index * 2] = lo;
            bytes[3 + index * 2] = hi;
        }
        bytes[10] = bytes[..10]
            .iter()
            .fold(0u8, |sum, value| sum.wrapping_add(*value));
        bytes
    }

    fn feed(decoder: &mut PacketDecoder, bytes: &[u8]) -> Option<AngleSample> {
        bytes.iter().fold(None, |last, value| decoder.push(*value).or(last))
    }

    #[test]
    fn decodes_angle_packet() {
        let mut decoder = PacketDecoder::new();
        let sample = feed(&mut decoder, &packet(0x53, [0, -8_192, 16_384, 0]))
            .expect("angle packet");

        assert_eq!(sample.roll, 0.0);
        assert_eq!(sample.pitch, -45.0);
        assert_eq!(sample.yaw, 90.0);
    }

    #[test]
    fn skips_noise_before_header() {
        let mut decoder = PacketDecoder::new();
        let mut stream = std::vec![0x00, 0x13, 0xFE];
        stream.extend_from_slice(&packet(0x53, [0, 0, -16_384, 0]));

        let sample = feed(&mut decoder, &stream).expect("angle packet");
        assert_eq!(sample.yaw, -90.0);
    }

    #[test]
    fn ignores_other_packet_types() {
        let mut decoder = PacketDecoder::new();
        assert_eq!(feed(&mut decoder, &packet(0x52, [1, 2, 3, 4])), None);

        let sample = feed(&mut decoder, &packet(0x53, [0, 0, 8_192, 0]));
        assert_eq!(sample.map(|sample| sample.yaw), Some(45.0));
    }

    #[test]
    fn rejects_bad_checksum() {
        let mut decoder = PacketDecoder::new();
        let mut corrupted = packet(0x53, [0, 0, 16_384, 0]);
        corrupted[10] = corrupted[10].wrapping_add(1);

        assert_eq!(feed(&mut decoder, &corrupted), None);
    }
}
