//! Command decoding for frames arriving over either wireless channel.
//!
//! Both the long-range packet link and the short-range link deliver the same
//! fixed-size ASCII frames: a two-byte marker followed by a two-byte payload.
//! The decoder keeps the last valid speed and angle levels so a frame that
//! carries an out-of-range digit falls back to the previous selection.

use core::fmt;

use winnow::error::ModalResult;
use winnow::prelude::*;
use winnow::token::{any, literal};

/// Size of the raw frame buffer shared by both radio channels.
pub const FRAME_LEN: usize = 8;

/// Raw frame as delivered by a radio channel.
pub type RawFrame = [u8; FRAME_LEN];

/// Marker every actuator frame starts with.
pub const FRAME_MARKER: &[u8] = b"AA";

const HOLD_POWER_PAIR: (u8, u8) = (b'0', b'0');
const CLOSE_PAIR: (u8, u8) = (b'O', b'F');
const RESET_PAIR: (u8, u8) = (b'R', b'E');

/// Speed level carried in the third frame byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SpeedLevel {
    Low,
    Medium,
    High,
}

impl SpeedLevel {
    /// Parses an ASCII digit `'1'..='3'`.
    #[must_use]
    pub const fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            b'1' => Some(Self::Low),
            b'2' => Some(Self::Medium),
            b'3' => Some(Self::High),
            _ => None,
        }
    }
}

/// Opening angle level carried in the fourth frame byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AngleLevel {
    /// A third of the calibrated travel.
    Narrow,
    /// Half of the calibrated travel.
    Half,
    /// Full calibrated travel.
    Full,
}

impl AngleLevel {
    /// Parses an ASCII digit `'1'..='3'`.
    #[must_use]
    pub const fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            b'1' => Some(Self::Narrow),
            b'2' => Some(Self::Half),
            b'3' => Some(Self::Full),
            _ => None,
        }
    }

    /// Divisor applied to the calibration target.
    #[must_use]
    pub const fn divisor(self) -> f32 {
        match self {
            Self::Narrow => 3.0,
            Self::Half => 2.0,
            Self::Full => 1.0,
        }
    }

    /// Forward threshold for a calibrated travel of `target`.
    #[must_use]
    pub fn threshold(self, target: f32) -> f32 {
        target / self.divisor()
    }
}

/// Typed command produced from a raw frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    HoldPower,
    Move {
        speed: SpeedLevel,
        angle: AngleLevel,
    },
    CloseRequest,
    ResetRequest,
    Unrecognized,
}

impl Command {
    /// Short label used by telemetry and logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Command::HoldPower => "hold-power",
            Command::Move { .. } => "move",
            Command::CloseRequest => "close",
            Command::ResetRequest => "reset",
            Command::Unrecognized => "unrecognized",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Move { speed, angle } => write!(f, "move {speed:?}/{angle:?}"),
            other => f.write_str(other.label()),
        }
    }
}

/// Failure to find the frame marker and payload.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FrameError {
    MissingMarker,
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::MissingMarker => f.write_str("frame marker missing"),
        }
    }
}

fn marked_pair(input: &mut &[u8]) -> ModalResult<(u8, u8)> {
    (literal(FRAME_MARKER), any, any)
        .map(|(_, speed, angle)| (speed, angle))
        .parse_next(input)
}

/// Extracts the two payload bytes following the frame marker.
pub fn frame_payload(frame: &[u8]) -> Result<(u8, u8), FrameError> {
    let mut input = frame;
    marked_pair(&mut input).map_err(|_| FrameError::MissingMarker)
}

/// Stateful decoder retaining the last valid speed and angle levels.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FrameDecoder {
    speed: SpeedLevel,
    angle: AngleLevel,
}

impl FrameDecoder {
    /// Power-on selection: fastest speed, narrowest opening.
    pub const fn new() -> Self {
        Self {
            speed: SpeedLevel::High,
            angle: AngleLevel::Narrow,
        }
    }

    /// Current speed level selection.
    pub const fn speed_level(&self) -> SpeedLevel {
        self.speed
    }

    /// Current angle level selection.
    pub const fn angle_level(&self) -> AngleLevel {
        self.angle
    }

    /// Decodes one frame. A valid angle digit is remembered even when the
    /// speed digit is not; such a frame still yields
    /// [`Command::Unrecognized`] and leaves the speed level untouched.
    pub fn decode(&mut self, frame: &[u8]) -> Command {
        let Ok(pair) = frame_payload(frame) else {
            return Command::Unrecognized;
        };

        match pair {
            HOLD_POWER_PAIR => Command::HoldPower,
            CLOSE_PAIR => Command::CloseRequest,
            RESET_PAIR => Command::ResetRequest,
            (speed_digit, angle_digit) => {
                if let Some(angle) = AngleLevel::from_digit(angle_digit) {
                    self.angle = angle;
                }
                match SpeedLevel::from_digit(speed_digit) {
                    Some(speed) => {
                        self.speed = speed;
                        Command::Move {
                            speed: self.speed,
                            angle: self.angle,
                        }
                    }
                    None => Command::Unrecognized,
                }
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies `text` into a zero-padded frame buffer, truncating if necessary.
#[must_use]
pub fn frame_from_bytes(text: &[u8]) -> RawFrame {
    let mut frame = [0u8; FRAME_LEN];
    let len = text.len().min(FRAME_LEN);
    frame[..len].copy_from_slice(&text[..len]);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_power_frame() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.decode(&frame_from_bytes(b"AA00")), Command::HoldPower);
    }

    #[test]
    fn move_frame_selects_levels() {
        let mut decoder = FrameDecoder::new();
        let command = decoder.decode(&frame_from_bytes(b"AA21"));

        assert_eq!(
            command,
            Command::Move {
                speed: SpeedLevel::Medium,
                angle: AngleLevel::Narrow,
            }
        );
        assert_eq!(decoder.speed_level(), SpeedLevel::Medium);
    }

    #[test]
    fn out_of_range_angle_digit_is_sticky() {
        let mut decoder = FrameDecoder::new();
        decoder.decode(&frame_from_bytes(b"AA13"));
        let command = decoder.decode(&frame_from_bytes(b"AA29"));

        assert_eq!(
            command,
            Command::Move {
                speed: SpeedLevel::Medium,
                angle: AngleLevel::Full,
            }
        );
    }

    #[test]
    fn angle_digit_applies_without_a_valid_speed() {
        let mut decoder = FrameDecoder::new();
        decoder.decode(&frame_from_bytes(b"AA21"));

        assert_eq!(decoder.decode(&frame_from_bytes(b"AA92")), Command::Unrecognized);
        assert_eq!(decoder.angle_level(), AngleLevel::Half);
        assert_eq!(decoder.speed_level(), SpeedLevel::Medium);
    }

    #[test]
    fn close_and_reset_pairs() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(
            decoder.decode(&frame_from_bytes(b"AAOF")),
            Command::CloseRequest
        );
        assert_eq!(
            decoder.decode(&frame_from_bytes(b"AARE")),
            Command::ResetRequest
        );
    }

    #[test]
    fn unrecognized_frames_do_not_touch_levels() {
        let mut decoder = FrameDecoder::new();
        let before = decoder;

        for _ in 0..2 {
            assert_eq!(
                decoder.decode(&frame_from_bytes(b"BB21")),
                Command::Unrecognized
            );
            assert_eq!(
                decoder.decode(&frame_from_bytes(b"AA92")),
                Command::Unrecognized
            );
            assert_eq!(decoder, before);
        }
    }

    #[test]
    fn short_frames_are_rejected() {
        assert_eq!(frame_payload(b"AA1"), Err(FrameError::MissingMarker));
        assert_eq!(frame_payload(b""), Err(FrameError::MissingMarker));
    }

    #[test]
    fn angle_threshold_divides_target() {
        assert_eq!(AngleLevel::Narrow.threshold(30.0), 10.0);
        assert_eq!(AngleLevel::Half.threshold(30.0), 15.0);
        assert_eq!(AngleLevel::Full.threshold(30.0), 30.0);
    }
}
