//! Per-command retry and verification state machine.
//!
//! One [`RetrySession`] exists per in-flight command intent. The machine is
//! pure: it is advanced by explicit events (frame dispatched, status
//! received, deadline elapsed) and returns verdicts telling the controller
//! what to do next. All timing and I/O stay in the controller, which keeps
//! the retry logic deterministic under test.

use std::time::Duration;

use uuid::Uuid;

use crate::capabilities::Capability;
use crate::device::{ColorState, DeviceState};
use crate::types::Color;

/// Per-channel slack when comparing a reported RGB color against the
/// commanded one; devices round internally.
const RGB_TOLERANCE: u8 = 5;
/// Kelvin slack for the same reason.
const KELVIN_TOLERANCE: u16 = 100;

/// The condition a reported status must satisfy to confirm a command.
///
/// Predicates compare against what the device says, never against what was
/// sent, with small tolerances for values devices are known to round.
#[derive(Debug, Clone, PartialEq)]
pub enum StatePredicate {
    PowerIs(bool),
    BrightnessIs(u8),
    ColorIs(Color),
    TemperatureIs(u16),
    /// Scene confirmation. Firmware does not reliably echo the active
    /// scene, so a status without a scene field counts as confirmation;
    /// a status that does carry one must match.
    SceneIs(String),
}

impl StatePredicate {
    pub fn matches(&self, state: &DeviceState) -> bool {
        match self {
            StatePredicate::PowerIs(on) => state.power == *on,
            StatePredicate::BrightnessIs(value) => state.brightness.value() == *value,
            StatePredicate::ColorIs(target) => match state.color {
                Some(ColorState::Rgb(reported)) => {
                    channel_close(reported.red(), target.red())
                        && channel_close(reported.green(), target.green())
                        && channel_close(reported.blue(), target.blue())
                }
                _ => false,
            },
            StatePredicate::TemperatureIs(target) => match state.color {
                Some(ColorState::Temperature(reported)) => {
                    reported.kelvin().abs_diff(*target) <= KELVIN_TOLERANCE
                }
                _ => false,
            },
            StatePredicate::SceneIs(name) => {
                state.scene.as_deref().is_none_or(|reported| reported == name)
            }
        }
    }
}

fn channel_close(reported: u8, target: u8) -> bool {
    reported.abs_diff(target) <= RGB_TOLERANCE
}

/// States of one command intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Queued, waiting for the device to be free.
    Pending,
    /// Frame transmitted, deadline timer running.
    Sent,
    /// Listening for the next status response.
    AwaitingConfirmation,
    /// Mismatch or deadline hit with attempts remaining.
    Retrying,
    /// Terminal: the device reported the expected state.
    Confirmed,
    /// Terminal: attempts exhausted.
    Failed,
}

/// What the controller should do after feeding an event to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionVerdict {
    /// Resolve the intent as confirmed.
    Confirmed,
    /// Sleep the given backoff, then re-send the same frame.
    Retry(Duration),
    /// Resolve the intent as failed.
    Failed,
}

/// Bookkeeping for one in-flight command intent.
#[derive(Debug)]
pub struct RetrySession {
    intent_id: Uuid,
    device_id: String,
    capability: Capability,
    predicate: StatePredicate,
    state: SessionState,
    attempts: u32,
    max_attempts: u32,
    backoff: Vec<Duration>,
    last_observed: Option<DeviceState>,
}

impl RetrySession {
    pub fn new(
        device_id: impl Into<String>,
        capability: Capability,
        predicate: StatePredicate,
        max_attempts: u32,
        backoff: &[Duration],
    ) -> Self {
        RetrySession {
            intent_id: Uuid::new_v4(),
            device_id: device_id.into(),
            capability,
            predicate,
            state: SessionState::Pending,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            backoff: backoff.to_vec(),
            last_observed: None,
        }
    }

    pub fn intent_id(&self) -> Uuid {
        self.intent_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frames transmitted so far. Never exceeds the configured maximum.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_observed(&self) -> Option<&DeviceState> {
        self.last_observed.as_ref()
    }

    /// The command frame was put on the wire; the deadline timer starts.
    pub fn on_dispatched(&mut self) {
        debug_assert!(matches!(
            self.state,
            SessionState::Pending | SessionState::Retrying
        ));
        self.attempts += 1;
        self.state = SessionState::Sent;
    }

    /// The engine is now listening for the device's next status response.
    pub fn on_listening(&mut self) {
        debug_assert_eq!(self.state, SessionState::Sent);
        self.state = SessionState::AwaitingConfirmation;
    }

    /// A status response arrived while awaiting confirmation.
    pub fn on_status(&mut self, status: &DeviceState) -> SessionVerdict {
        self.last_observed = Some(status.clone());
        if self.predicate.matches(status) {
            self.state = SessionState::Confirmed;
            SessionVerdict::Confirmed
        } else {
            self.retry_or_fail()
        }
    }

    /// The deadline elapsed without any status response.
    pub fn on_deadline(&mut self) -> SessionVerdict {
        self.retry_or_fail()
    }

    fn retry_or_fail(&mut self) -> SessionVerdict {
        if self.attempts >= self.max_attempts {
            self.state = SessionState::Failed;
            SessionVerdict::Failed
        } else {
            self.state = SessionState::Retrying;
            SessionVerdict::Retry(self.next_backoff())
        }
    }

    // Backoff grows per attempt; the schedule's last entry caps it.
    fn next_backoff(&self) -> Duration {
        if self.backoff.is_empty() {
            return Duration::ZERO;
        }
        let idx = ((self.attempts as usize).saturating_sub(1)).min(self.backoff.len() - 1);
        self.backoff[idx]
    }

    /// The terminal outcome of this session. Only meaningful once the
    /// machine has reached `Confirmed` or `Failed`.
    pub fn outcome(&self) -> Outcome {
        match (&self.state, &self.last_observed) {
            (SessionState::Confirmed, Some(state)) => Outcome::Confirmed {
                intent_id: self.intent_id,
                device_id: self.device_id.clone(),
                capability: self.capability,
                attempts: self.attempts,
                state: state.clone(),
            },
            _ => Outcome::Failed {
                intent_id: self.intent_id,
                device_id: self.device_id.clone(),
                capability: self.capability,
                attempts: self.attempts,
                last_observed: self.last_observed.clone(),
            },
        }
    }
}

/// Terminal result of one command intent, surfaced to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The device reported the expected state.
    Confirmed {
        intent_id: Uuid,
        device_id: String,
        capability: Capability,
        /// Frames transmitted before confirmation.
        attempts: u32,
        /// The confirming state as reported by the device.
        state: DeviceState,
    },
    /// Retries were exhausted without confirmation. Carries enough context
    /// for the host to present an actionable message; this is distinct
    /// from [`crate::Error::NotFound`], which means the device id is not
    /// known at all.
    Failed {
        intent_id: Uuid,
        device_id: String,
        capability: Capability,
        attempts: u32,
        /// The most recent state the device reported during the session,
        /// if it reported anything at all.
        last_observed: Option<DeviceState>,
    },
}

impl Outcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Outcome::Confirmed { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Outcome::Confirmed { attempts, .. } | Outcome::Failed { attempts, .. } => *attempts,
        }
    }
}
