//! Lifecycle of a single spot bid.
//!
//! ```text
//! submitted -> polling -> active
//!                      -> failed | price_rejected | timed_out
//! ```

use crate::shared::types::{SpotRequestDescription, SpotRequestState};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpotRequestPhase {
    Submitted,
    Polling {
        attempt: u32,
    },
    Active {
        instance_id: String,
    },
    Failed {
        state: SpotRequestState,
        status_code: Option<String>,
    },
    PriceRejected {
        status_code: String,
    },
    TimedOut {
        attempts: u32,
    },
}

impl SpotRequestPhase {
    /// Next phase after observing `description` on poll number `attempt`
    /// (1-based). `None` means the request was not visible on this poll.
    pub fn advance(
        description: Option<&SpotRequestDescription>,
        attempt: u32,
        retry_count: u32,
    ) -> Self {
        if let Some(description) = description {
            if description.price_rejected() {
                return SpotRequestPhase::PriceRejected {
                    status_code: description.status_code.clone().unwrap_or_default(),
                };
            }
            if description.state.is_failure() {
                return SpotRequestPhase::Failed {
                    state: description.state,
                    status_code: description.status_code.clone(),
                };
            }
            if description.state == SpotRequestState::Active {
                if let Some(instance_id) = description.instance_id.as_ref() {
                    return SpotRequestPhase::Active {
                        instance_id: instance_id.clone(),
                    };
                }
            }
        }

        if attempt >= retry_count {
            SpotRequestPhase::TimedOut { attempts: attempt }
        } else {
            SpotRequestPhase::Polling { attempt }
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            SpotRequestPhase::Submitted | SpotRequestPhase::Polling { .. }
        )
    }

    /// Operator-facing reason for a failed phase.
    pub fn failure_reason(&self, spot_request_id: &str) -> Option<String> {
        match self {
            SpotRequestPhase::Failed { state, status_code } => Some(format!(
                "Spot instance request {spot_request_id} entered state {state} (status: {})",
                status_code.as_deref().unwrap_or("none")
            )),
            SpotRequestPhase::PriceRejected { status_code } => Some(format!(
                "Spot instance request {spot_request_id} bid price was rejected (status: {status_code})"
            )),
            SpotRequestPhase::TimedOut { attempts } => Some(format!(
                "Timed out waiting for spot instance request {spot_request_id} to become active after {attempts} checks"
            )),
            _ => None,
        }
    }
}
