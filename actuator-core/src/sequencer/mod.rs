//! Step-by-step execution of a plan of [`SequenceTemplate`]s.
//!
//! A [`SequenceRun`] never blocks. Each call to [`SequenceRun::advance`]
//! applies every step that is due at `now`, then returns so the caller can
//! come back on its next tick. Steps with a zero hold chain within the same
//! call; a non-zero hold parks the run until its deadline passes.

use core::fmt;

use heapless::Vec;

use crate::sequences::{SequenceAction, SequenceKind, SequenceStep, SequenceTemplate, StepCompletion};
use crate::time::ControlInstant;

/// Maximum number of templates chained in one plan.
pub const MAX_PLAN_TEMPLATES: usize = 4;

/// Result of applying one action to the board.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StepOutcome {
    Done,
    /// The board could not complete the action yet; retrying steps try again.
    Busy,
}

/// Progress notifications emitted while a run advances.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SequenceEvent {
    Started(SequenceKind),
    Completed(SequenceKind),
    Retry { kind: SequenceKind, attempt: u16 },
    Failed { kind: SequenceKind, error: SequenceError },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SequenceError {
    /// More templates were chained than a plan can hold.
    PlanFull,
    /// The origin reset stayed busy for the whole retry budget.
    OriginResetExhausted,
}

impl fmt::Display for SequenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceError::PlanFull => f.write_str("sequence plan is full"),
            SequenceError::OriginResetExhausted => f.write_str("origin reset retries exhausted"),
        }
    }
}

/// Whether the run still has work left.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RunStatus {
    Running,
    Complete,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Cursor<TInstant> {
    Pending,
    Holding { until: TInstant },
    Retrying { at: TInstant, attempts: u16 },
}

/// In-flight execution of a chained plan.
#[derive(Clone, Debug)]
pub struct SequenceRun<TInstant> {
    plan: Vec<SequenceTemplate, MAX_PLAN_TEMPLATES>,
    template_index: usize,
    step_index: usize,
    cursor: Cursor<TInstant>,
    attempt_limit: Option<u16>,
}

impl<TInstant: ControlInstant> SequenceRun<TInstant> {
    /// Builds a run for `plan`. `attempt_limit` caps retrying steps; `None`
    /// retries until acknowledged.
    pub fn new(
        plan: &[SequenceTemplate],
        attempt_limit: Option<u16>,
    ) -> Result<Self, SequenceError> {
        let mut templates = Vec::new();
        for template in plan {
            templates
                .push(*template)
                .map_err(|_| SequenceError::PlanFull)?;
        }
        Ok(Self {
            plan: templates,
            template_index: 0,
            step_index: 0,
            cursor: Cursor::Pending,
            attempt_limit,
        })
    }

    /// Template currently executing, if any.
    pub fn current(&self) -> Option<SequenceKind> {
        self.plan.get(self.template_index).map(|template| template.kind)
    }

    pub fn is_complete(&self) -> bool {
        self.template_index >= self.plan.len()
    }

    /// Applies every step due at `now`.
    pub fn advance<A, N>(&mut self, now: TInstant, mut apply: A, mut notify: N) -> RunStatus
    where
        A: FnMut(SequenceAction) -> StepOutcome,
        N: FnMut(SequenceEvent),
    {
        loop {
            let Some(template) = self.plan.get(self.template_index).copied() else {
                return RunStatus::Complete;
            };

            let Some(step) = template.steps().get(self.step_index).copied() else {
                notify(SequenceEvent::Completed(template.kind));
                self.template_index += 1;
                self.step_index = 0;
                self.cursor = Cursor::Pending;
                continue;
            };

            match self.cursor {
                Cursor::Pending => {
                    if self.step_index == 0 {
                        notify(SequenceEvent::Started(template.kind));
                    }
                    let outcome = apply(step.action);
                    self.settle(template.kind, step, outcome, 1, now, &mut notify);
                }
                Cursor::Holding { until } => {
                    if now < until {
                        return RunStatus::Running;
                    }
                    self.step_index += 1;
                    self.cursor = Cursor::Pending;
                }
                Cursor::Retrying { at, attempts } => {
                    if now < at {
                        return RunStatus::Running;
                    }
                    let attempt = attempts.saturating_add(1);
                    let outcome = apply(step.action);
                    self.settle(template.kind, step, outcome, attempt, now, &mut notify);
                }
            }
        }
    }

    fn settle<N>(
        &mut self,
        kind: SequenceKind,
        step: SequenceStep,
        outcome: StepOutcome,
        attempt: u16,
        now: TInstant,
        notify: &mut N,
    ) where
        N: FnMut(SequenceEvent),
    {
        let hold = Cursor::Holding {
            until: now + step.hold_for,
        };

        self.cursor = match (step.completion, outcome) {
            (StepCompletion::AfterDuration, _) | (_, StepOutcome::Done) => hold,
            (StepCompletion::UntilAcknowledged { backoff }, StepOutcome::Busy) => {
                if self.attempt_limit.is_some_and(|limit| attempt >= limit) {
                    notify(SequenceEvent::Failed {
                        kind,
                        error: SequenceError::OriginResetExhausted,
                    });
                    hold
                } else {
                    notify(SequenceEvent::Retry { kind, attempt });
                    Cursor::Retrying {
                        at: now + backoff,
                        attempts: attempt,
                    }
                }
            }
        };
    }
}
