use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use actuator_core::config::ControllerConfig;
use actuator_core::hal::{CalibrationState, RadioChannel};
use actuator_core::motion::MotionState;
use actuator_core::telemetry::{EventId, TelemetryRecord};
use actuator_core::{Controller, Micros};

use crate::plant::{DoorPlant, FrameTooLong};

/// Longest span a single `run` may cover.
const MAX_RUN: Duration = Duration::from_secs(600);

/// Calibrated travel used when the session starts calibrated.
pub const DEFAULT_TARGET_DEG: f32 = 90.0;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    (
        "lora",
        "lora <frame>                 - deliver a frame on the long-range link",
    ),
    (
        "ble",
        "ble <frame>                  - deliver a frame on the short-range link",
    ),
    (
        "push",
        "push                         - latch the manual push trigger",
    ),
    (
        "pull",
        "pull                         - latch the manual pull trigger",
    ),
    (
        "edge",
        "edge                         - pulse the manual edge input",
    ),
    (
        "run",
        "run <duration>               - advance the control loop (500ms, 2s, ...)",
    ),
    (
        "yaw",
        "yaw <degrees>                - move the door by hand",
    ),
    (
        "obstacle",
        "obstacle <degrees>|off       - block forward travel past an angle",
    ),
    (
        "status",
        "status                       - display controller and plant state",
    ),
    (
        "events",
        "events                       - dump the telemetry ring",
    ),
    (
        "help",
        "help [topic]                 - show help for a command",
    ),
];

/// Startup options for a session.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Calibration record present at boot, if any.
    pub stored: Option<CalibrationState>,
    pub transcript: Option<PathBuf>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            stored: Some(CalibrationState::new(DEFAULT_TARGET_DEG, true)),
            transcript: None,
        }
    }
}

/// Controller and simulated plant stepped on a virtual clock.
pub struct Session {
    controller: Controller<Micros>,
    plant: DoorPlant,
    now: Micros,
    dozing: bool,
    cursor: Option<EventId>,
    transcript: Option<TranscriptLogger>,
}

impl Session {
    pub fn new(options: SessionOptions) -> io::Result<Self> {
        let transcript = options
            .transcript
            .as_deref()
            .map(TranscriptLogger::new)
            .transpose()?;
        let now = Micros::ZERO;

        Ok(Self {
            controller: Controller::new(ControllerConfig::new(), now),
            plant: DoorPlant::new(options.stored),
            now,
            dozing: false,
            cursor: None,
            transcript,
        })
    }

    /// Runs the boot path and returns what it reported.
    pub fn boot(&mut self) -> io::Result<Vec<String>> {
        self.controller.start(&mut self.plant, self.now);
        let mut lines = Vec::new();
        self.collect_output(&mut lines);
        let calibration = self.controller.calibration();
        lines.push(format!(
            "OK boot calibrated={} target={:.2}",
            calibration.is_calibrated, calibration.target_sum
        ));
        self.record_output(&lines)?;
        Ok(lines)
    }

    pub fn plant(&self) -> &DoorPlant {
        &self.plant
    }

    pub fn controller(&self) -> &Controller<Micros> {
        &self.controller
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(self.now, TranscriptRole::Host, trimmed)?;
        }

        let (verb, argument) = match trimmed.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (trimmed, ""),
        };

        let lines = match verb.to_ascii_lowercase().as_str() {
            "help" => help_lines(argument),
            "lora" => self.queue_frame(RadioChannel::LongRange, argument),
            "ble" => self.queue_frame(RadioChannel::ShortRange, argument),
            "push" => {
                self.plant.press_push();
                vec!["OK push latched".to_string()]
            }
            "pull" => {
                self.plant.press_pull();
                vec!["OK pull latched".to_string()]
            }
            "edge" => {
                self.plant.press_edge();
                vec!["OK edge latched".to_string()]
            }
            "run" => match parse_duration(argument) {
                Ok(span) => self.run_for(span),
                Err(message) => vec![format!("ERR syntax {message}")],
            },
            "yaw" => match argument.parse::<f32>() {
                Ok(yaw) if yaw.is_finite() => {
                    self.plant.set_yaw(yaw);
                    vec![format!("OK yaw={yaw:.2}")]
                }
                _ => vec![format!("ERR syntax invalid angle `{argument}`")],
            },
            "obstacle" => self.set_obstacle(argument),
            "status" => self.status_lines(),
            "events" => self.event_lines(),
            _ => vec![format!("ERR unknown command `{verb}` (try `help`)")],
        };

        self.record_output(&lines)?;
        Ok(lines)
    }

    /// Steps the controller for `span`. Once low power is requested on an idle
    /// tick the loop dozes and only the clock moves, until a frame or trigger
    /// is queued.
    pub fn run_for(&mut self, span: Duration) -> Vec<String> {
        let period = self.controller.config().tick_period;
        let ticks = span.as_micros() / period.as_micros().max(1);
        let ticks = usize::try_from(ticks).unwrap_or(usize::MAX);

        let mut lines = Vec::new();
        let mut active = 0usize;
        for _ in 0..ticks {
            if self.dozing {
                if !self.plant.input_pending() {
                    self.now = self.now + period;
                    continue;
                }
                self.dozing = false;
                self.controller.wake(self.now);
                lines.push(format!("[+{:>6} ms] board awake", self.now.as_millis()));
            }
            let report = self.controller.tick(&mut self.plant, self.now);
            self.plant.advance();
            self.collect_output(&mut lines);
            self.dozing = report.sequence.is_none()
                && self.plant.take_low_power()
                && report.motion == MotionState::Idle;
            self.now = self.now + period;
            active += 1;
        }

        lines.push(format!(
            "OK ran {active}/{ticks} ticks now=+{}ms state={:?} yaw={:.2}",
            self.now.as_millis(),
            self.controller.motion_state(),
            self.plant.yaw()
        ));
        lines
    }

    fn queue_frame(&mut self, channel: RadioChannel, text: &str) -> Vec<String> {
        if text.is_empty() {
            return vec!["ERR syntax missing frame text".to_string()];
        }
        match self.plant.queue_frame(channel, text) {
            Ok(()) => vec![format!("OK queued {text:?} on {}", channel.label())],
            Err(FrameTooLong(len)) => vec![format!("ERR frame too long ({len} bytes)")],
        }
    }

    fn set_obstacle(&mut self, argument: &str) -> Vec<String> {
        if argument.eq_ignore_ascii_case("off") {
            self.plant.set_obstacle(None);
            return vec!["OK obstacle cleared".to_string()];
        }
        match argument.parse::<f32>() {
            Ok(yaw) if yaw.is_finite() => {
                self.plant.set_obstacle(Some(yaw));
                vec![format!("OK obstacle at {yaw:.2}")]
            }
            _ => vec![format!("ERR syntax invalid angle `{argument}`")],
        }
    }

    fn status_lines(&self) -> Vec<String> {
        let calibration = self.controller.calibration();
        let keepalive = self.controller.keepalive();
        let sequence = self
            .controller
            .sequence()
            .map_or("none", |kind| kind.label());
        let obstacle = self
            .plant
            .obstacle()
            .map_or_else(|| "none".to_string(), |yaw| format!("{yaw:.2}"));

        vec![
            format!(
                "state={:?} sequence={sequence} now=+{}ms",
                self.controller.motion_state(),
                self.now.as_millis()
            ),
            format!(
                "yaw={:.2} speed={} bus-current={:.3}A obstacle={obstacle}",
                self.plant.yaw(),
                self.plant.commanded_speed(),
                self.controller.bus_current()
            ),
            format!(
                "calibrated={} target={:.2} stored={}",
                calibration.is_calibrated,
                calibration.target_sum,
                self.plant.stored().is_some()
            ),
            format!(
                "main-power={} keepalive={} dozing={} wake-at=+{}ms",
                self.plant.main_power(),
                keepalive.is_enabled(),
                self.dozing,
                self.controller.wake_at().as_millis()
            ),
        ]
    }

    fn event_lines(&self) -> Vec<String> {
        let telemetry = self.controller.telemetry();
        if telemetry.is_empty() {
            return vec!["no events recorded".to_string()];
        }
        telemetry.oldest_first().map(describe_record).collect()
    }

    fn collect_output(&mut self, lines: &mut Vec<String>) {
        let at = self.now.as_millis();
        for note in self.plant.take_notes() {
            lines.push(format!("[+{at:>6} ms] board {note}"));
        }
        for record in self.controller.telemetry().since(self.cursor) {
            lines.push(describe_record(record));
            self.cursor = Some(record.id);
        }
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        if let Some(transcript) = self.transcript.as_mut() {
            for line in lines {
                transcript.append_line(self.now, TranscriptRole::Emulator, line)?;
            }
        }
        Ok(())
    }
}

fn describe_record(record: &TelemetryRecord<Micros>) -> String {
    let level = if record.event.is_warning() {
        "WARN"
    } else {
        "INFO"
    };
    format!(
        "[+{:>6} ms] {level} {} #{} {}",
        record.timestamp.as_millis(),
        record.event,
        record.id,
        record.details
    )
    .trim_end()
    .to_string()
}

fn help_lines(topic: &str) -> Vec<String> {
    let mut lines = Vec::new();
    if topic.is_empty() {
        lines.push("Available commands:".to_string());
        for (_, detail) in HELP_TOPICS {
            lines.push(format!("  {detail}"));
        }
        lines.push("Type `help <topic>` for a specific command.".to_string());
    } else if let Some((_, detail)) = HELP_TOPICS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(topic))
    {
        lines.push((*detail).to_string());
    } else {
        lines.push(format!("No help available for `{topic}`."));
        lines.push(format!("Available topics: {}", help_topic_list()));
    }
    lines
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parses `500ms`, `2s`, `1.5s`, or a bare millisecond count.
fn parse_duration(text: &str) -> Result<Duration, String> {
    let (number, scale) = if let Some(millis) = text.strip_suffix("ms") {
        (millis, 1.0e-3)
    } else if let Some(secs) = text.strip_suffix('s') {
        (secs, 1.0)
    } else {
        (text, 1.0e-3)
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration `{text}`"))?;
    let span = Duration::try_from_secs_f64(value * scale)
        .map_err(|_| format!("invalid duration `{text}`"))?;
    if span > MAX_RUN {
        return Err(format!("duration above {}s", MAX_RUN.as_secs()));
    }
    Ok(span)
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        logger.write_header()?;
        Ok(logger)
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.writer, "# Actuator emulator transcript")?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds of simulated control time"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(&mut self, now: Micros, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            now.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
