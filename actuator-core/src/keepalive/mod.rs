//! Hold-power keepalive.
//!
//! A "hold power" frame enables the keepalive and turns the main rail on.
//! While enabled, any received frame refreshes the activity stamp. Once no
//! frame has arrived for longer than the timeout the keepalive disables
//! itself and the caller drops the rail.

use core::time::Duration;

use crate::time::ControlInstant;

/// Outcome of one keepalive poll.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KeepaliveEvent {
    /// Keepalive is not enabled; nothing to do.
    Inactive,
    /// Still within the timeout; the rail should stay on.
    Sustained,
    /// Timed out this poll; the rail should turn off.
    Expired,
}

#[derive(Clone, Debug)]
pub struct PowerKeepalive<TInstant> {
    timeout: Duration,
    enabled: bool,
    last_activity: Option<TInstant>,
}

impl<TInstant: ControlInstant> PowerKeepalive<TInstant> {
    pub const fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            enabled: false,
            last_activity: None,
        }
    }

    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub const fn last_activity(&self) -> Option<TInstant> {
        self.last_activity
    }

    /// Enables the keepalive and stamps `now` as the latest activity.
    pub fn hold(&mut self, now: TInstant) {
        self.enabled = true;
        self.last_activity = Some(now);
    }

    /// Records frame activity; only meaningful while enabled.
    pub fn note_frame(&mut self, now: TInstant) {
        if self.enabled {
            self.last_activity = Some(now);
        }
    }

    pub fn release(&mut self) {
        self.enabled = false;
    }

    /// Evaluates the keepalive at `now`. `activity` marks a frame received in
    /// the current tick.
    pub fn poll(&mut self, now: TInstant, activity: bool) -> KeepaliveEvent {
        if !self.enabled {
            return KeepaliveEvent::Inactive;
        }

        if activity {
            self.last_activity = Some(now);
        }

        let expired = self
            .last_activity
            .is_none_or(|stamp| now.elapsed_beyond(stamp, self.timeout));

        if expired {
            self.enabled = false;
            KeepaliveEvent::Expired
        } else {
            KeepaliveEvent::Sustained
        }
    }
}
