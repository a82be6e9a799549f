//! Directional motion phases.
//!
//! The actuator runs two phases: forward opens toward the calibrated target
//! and reverse closes toward the origin. Both share one engine parameterized
//! by [`Direction`]; the direction supplies the travel limit, the sign of the
//! overshoot test, and how far past the setpoint the control law aims.
//!
//! A phase only decides. It reports what should happen this tick through
//! [`PhaseStep`] and the controller performs the board I/O.

use core::fmt;

use crate::command::AngleLevel;
use crate::stall::StallFault;
use crate::time::ControlInstant;

/// Direction of travel for a phase.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Direction {
    /// Toward the calibrated open position.
    Forward,
    /// Toward the origin.
    Reverse,
}

impl Direction {
    /// Sign applied to "distance still to travel" for this direction.
    #[must_use]
    pub const fn sign(self) -> f32 {
        match self {
            Direction::Forward => 1.0,
            Direction::Reverse => -1.0,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Reverse => "reverse",
        }
    }

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            Direction::Forward => 0x01,
            Direction::Reverse => 0x02,
        }
    }
}

/// Combined motion state across both phases. At most one phase drives the
/// motor, so the two moving states are mutually exclusive.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MotionState {
    Idle,
    MovingForward,
    MovingReverse,
}

/// Lifecycle of a single phase.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PhaseState<TInstant> {
    Idle,
    Active { started_at: TInstant },
}

/// Pending reasons for a phase to start.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct PhaseIntent {
    /// Set by a decoded command.
    pub requested: bool,
    /// Set by a latched manual trigger.
    pub manual: bool,
    /// Enter on the next evaluation regardless of the entry deadband.
    pub armed: bool,
    /// Angle scaling carried by the requesting command, if any.
    pub angle: Option<AngleLevel>,
}

impl PhaseIntent {
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.requested || self.manual || self.armed
    }
}

/// Why an active phase stopped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StopReason {
    /// Within tolerance of the setpoint or the travel limit.
    Arrived,
    /// Travelled past the travel limit.
    Overshoot,
    /// The stall/collision detector fired.
    Stalled(StallFault),
    /// A new command took over before the phase finished.
    Preempted,
}

impl StopReason {
    /// `true` for stops that end a travel normally.
    #[must_use]
    pub const fn is_clean(self) -> bool {
        matches!(self, StopReason::Arrived | StopReason::Overshoot)
    }

    #[must_use]
    pub const fn to_raw(self) -> u8 {
        match self {
            StopReason::Arrived => 0x01,
            StopReason::Overshoot => 0x02,
            StopReason::Stalled(fault) => 0x10 | fault.to_raw(),
            StopReason::Preempted => 0x20,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Arrived => f.write_str("arrived"),
            StopReason::Overshoot => f.write_str("overshoot"),
            StopReason::Stalled(fault) => write!(f, "stalled ({fault})"),
            StopReason::Preempted => f.write_str("preempted"),
        }
    }
}

/// Geometry and gains for one evaluation of a phase.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PhaseGeometry {
    /// Hard travel limit: the calibration target going forward, zero going back.
    pub limit: f32,
    pub entry_deadband: f32,
    pub arrival_tolerance: f32,
    /// Distance past the setpoint the control law aims for.
    pub margin: f32,
    pub gain: f32,
    /// Absolute speed cap for the current speed level.
    pub speed_cap: i16,
}

/// What the controller should do for a phase on this tick.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum PhaseStep {
    /// Nothing to do.
    Idle,
    /// Start the phase: run the entry sequence before the first drive.
    Enter,
    /// Keep driving at `speed`.
    Drive { speed: i16 },
    /// Stop for `reason`.
    Stop(StopReason),
}

/// One directional phase.
#[derive(Clone, Debug)]
pub struct Phase<TInstant> {
    direction: Direction,
    state: PhaseState<TInstant>,
    intent: PhaseIntent,
}

impl<TInstant: ControlInstant> Phase<TInstant> {
    pub const fn new(direction: Direction) -> Self {
        Self {
            direction,
            state: PhaseState::Idle,
            intent: PhaseIntent {
                requested: false,
                manual: false,
                armed: false,
                angle: None,
            },
        }
    }

    pub const fn direction(&self) -> Direction {
        self.direction
    }

    pub const fn state(&self) -> PhaseState<TInstant> {
        self.state
    }

    pub const fn intent(&self) -> PhaseIntent {
        self.intent
    }

    pub const fn is_active(&self) -> bool {
        matches!(self.state, PhaseState::Active { .. })
    }

    /// Instant the active phase started.
    pub const fn started_at(&self) -> Option<TInstant> {
        match self.state {
            PhaseState::Active { started_at } => Some(started_at),
            PhaseState::Idle => None,
        }
    }

    /// Records a command request, optionally scaling the travel by `angle`.
    pub fn request(&mut self, angle: Option<AngleLevel>) {
        self.intent.requested = true;
        self.intent.angle = angle;
    }

    pub fn trigger_manual(&mut self) {
        self.intent.manual = true;
    }

    /// Forces entry on the next evaluation.
    pub fn arm(&mut self) {
        self.intent.armed = true;
    }

    /// Setpoint the control law drives toward.
    #[must_use]
    pub fn setpoint(&self, limit: f32) -> f32 {
        match self.direction {
            Direction::Forward => self
                .intent
                .angle
                .map_or(limit, |angle| angle.threshold(limit)),
            Direction::Reverse => limit,
        }
    }

    /// Entry gate: a pending intent plus enough distance left to travel in
    /// this direction. Armed phases skip the distance check.
    #[must_use]
    pub fn should_enter(&self, geometry: &PhaseGeometry, yaw: f32) -> bool {
        if self.intent.armed {
            return true;
        }
        if !(self.intent.requested || self.intent.manual) {
            return false;
        }
        let remaining = geometry.limit - yaw;
        remaining.abs() > geometry.entry_deadband && self.direction.sign() * remaining > 0.0
    }

    /// Proportional speed command clamped to the speed cap.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn control_speed(&self, geometry: &PhaseGeometry, yaw: f32) -> i16 {
        let aim = self.setpoint(geometry.limit) + self.direction.sign() * geometry.margin;
        let cap = f32::from(geometry.speed_cap);
        (geometry.gain * (aim - yaw)).clamp(-cap, cap) as i16
    }

    /// Evaluates the exit conditions. Preemption wins over everything else,
    /// then arrival, stall and overshoot. `stall` is only consulted when the
    /// phase has neither been preempted nor arrived.
    pub fn exit_reason<F>(
        &self,
        geometry: &PhaseGeometry,
        yaw: f32,
        preempted: bool,
        stall: F,
    ) -> Option<StopReason>
    where
        F: FnOnce() -> Option<StallFault>,
    {
        if preempted {
            return Some(StopReason::Preempted);
        }
        let tolerance = geometry.arrival_tolerance;
        let setpoint = self.setpoint(geometry.limit);
        if (setpoint - yaw).abs() < tolerance || (geometry.limit - yaw).abs() < tolerance {
            return Some(StopReason::Arrived);
        }
        if let Some(fault) = stall() {
            return Some(StopReason::Stalled(fault));
        }
        (self.direction.sign() * (yaw - geometry.limit) > 0.0).then_some(StopReason::Overshoot)
    }

    /// Plans this tick for the phase. `blocked` holds an idle phase back
    /// without dropping its intent.
    pub fn plan<F>(
        &mut self,
        geometry: &PhaseGeometry,
        yaw: f32,
        blocked: bool,
        preempted: bool,
        stall: F,
    ) -> PhaseStep
    where
        F: FnOnce() -> Option<StallFault>,
    {
        if self.is_active() {
            return match self.exit_reason(geometry, yaw, preempted, stall) {
                Some(reason) => PhaseStep::Stop(reason),
                None => PhaseStep::Drive {
                    speed: self.control_speed(geometry, yaw),
                },
            };
        }

        if blocked {
            return PhaseStep::Idle;
        }

        if self.should_enter(geometry, yaw) {
            PhaseStep::Enter
        } else {
            self.intent = PhaseIntent::default();
            PhaseStep::Idle
        }
    }

    /// Marks the phase active from `now`.
    pub fn activate(&mut self, now: TInstant) {
        self.state = PhaseState::Active { started_at: now };
    }

    /// Returns the phase to idle and clears every per-phase flag.
    pub fn finish(&mut self) {
        self.state = PhaseState::Idle;
        self.intent = PhaseIntent::default();
    }
}
