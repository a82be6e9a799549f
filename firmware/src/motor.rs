//! Serial protocol of the closed-loop motor driver.
//!
//! Every frame starts with the axis address and ends with the `0x6B`
//! terminator. Speed is sent as a direction byte plus an unsigned magnitude,
//! so the signed drive command of the core is split here.

use heapless::Vec;
use winnow::Parser;
use winnow::binary::{be_u16, u8 as byte};
use winnow::error::ModalResult;
use winnow::token::literal;

const TERMINATOR: u8 = 0x6B;
const SPEED_MODE: u8 = 0xF6;
const STOP: [u8; 2] = [0xFE, 0x98];
const ENABLE: [u8; 3] = [0xF3, 0xAB, 0x01];
const READ_BUS_CURRENT: u8 = 0x27;
const BUS_CURRENT_TAG: &[u8; 1] = &[READ_BUS_CURRENT];
const TERMINATOR_TAG: &[u8; 1] = &[TERMINATOR];
const NO_SYNC: u8 = 0x00;
const CLOCKWISE: u8 = 0x00;
const COUNTER_CLOCKWISE: u8 = 0x01;

/// Longest frame this module emits.
pub const MAX_FRAME_LEN: usize = 8;

pub type MotorFrame = Vec<u8, MAX_FRAME_LEN>;

fn frame(axis: u8, body: &[u8]) -> MotorFrame {
    let mut frame = MotorFrame::new();
    // Bodies are at most six bytes, leaving room for address and terminator.
    let _ = frame.push(axis);
    let _ = frame.extend_from_slice(body);
    let _ = frame.push(TERMINATOR);
    frame
}

/// Speed-mode command. Positive speeds turn clockwise.
pub fn drive(axis: u8, speed: i16, accel: u8) -> MotorFrame {
    let direction = if speed < 0 {
        COUNTER_CLOCKWISE
    } else {
        CLOCKWISE
    };
    let [hi, lo] = speed.unsigned_abs().to_be_bytes();
    frame(axis, &[SPEED_MODE, direction, hi, lo, accel, NO_SYNC])
}

/// Immediate stop.
pub fn stop(axis: u8) -> MotorFrame {
    frame(axis, &[STOP[0], STOP[1], NO_SYNC])
}

/// Enables the driver's speed loop.
pub fn enable(axis: u8) -> MotorFrame {
    frame(axis, &[ENABLE[0], ENABLE[1], ENABLE[2], NO_SYNC])
}

/// Requests the bus current of monitor `slot`.
pub fn query_bus_current(axis: u8, slot: u8) -> MotorFrame {
    frame(axis, &[READ_BUS_CURRENT, slot])
}

/// Bus-current reply: `axis 0x27 milliamps(be16) 0x6B`.
fn bus_current_reply(input: &mut &[u8]) -> ModalResult<(u8, f32)> {
    (byte, literal(BUS_CURRENT_TAG), be_u16, literal(TERMINATOR_TAG))
        .map(|(axis, _, milliamps, _)| (axis, f32::from(milliamps) / 1_000.0))
        .parse_next(input)
}

const REPLY_LEN: usize = 5;

/// Reassembles replies from the driver and yields bus-current readings in
/// amperes for `axis`.
pub struct ReplyDecoder {
    axis: u8,
    buffer: Vec<u8, REPLY_LEN>,
}

impl ReplyDecoder {
    pub const fn new(axis: u8) -> Self {
        Self {
            axis,
            buffer: Vec::new(),
        }
    }

    pub fn push(&mut self, value: u8) -> Option<f32> {
        if self.buffer.is_empty() && value != self.axis {
            return None;
        }
        let _ = self.buffer.push(value);
        if !self.buffer.is_full() {
            return None;
        }

        let mut input = self.buffer.as_slice();
        let reading = bus_current_reply(&mut input).ok();
        self.buffer.clear();
        reading.map(|(_, amperes)| amperes)
    }
}
