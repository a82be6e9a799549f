//! Text command lines for the short-range link module and the ranging sensor.

use core::fmt::Write as _;

use heapless::String;

pub const MAX_LINE_LEN: usize = 32;

pub type CommandLine = String<MAX_LINE_LEN>;

/// Persists the ranging configuration to the sensor's own flash.
pub const RANGING_SAVE: &str = "AT+SAVE\r\n";

/// The command does not fit in a [`CommandLine`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LineTooLong;

/// Terminates an AT command for the link module.
pub fn at_line(command: &str) -> Result<CommandLine, LineTooLong> {
    let mut line = CommandLine::new();
    line.push_str(command).map_err(|_| LineTooLong)?;
    line.push_str("\r\n").map_err(|_| LineTooLong)?;
    Ok(line)
}

/// Sets the ranging sensor's detection threshold.
pub fn ranging_threshold(threshold: u16) -> Result<CommandLine, LineTooLong> {
    let mut line = CommandLine::new();
    write!(line, "AT+THRESHOLD={threshold}\r\n").map_err(|_| LineTooLong)?;
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_line_appends_crlf() {
        let line = at_line("AT+DISCONN=1").expect("fits");
        assert_eq!(line.as_str(), "AT+DISCONN=1\r\n");
    }

    #[test]
    fn oversized_command_is_rejected() {
        assert_eq!(at_line(&"A".repeat(MAX_LINE_LEN)), Err(LineTooLong));
    }

    #[test]
    fn threshold_line() {
        let line = ranging_threshold(512).expect("fits");
        assert_eq!(line.as_str(), "AT+THRESHOLD=512\r\n");
    }
}
