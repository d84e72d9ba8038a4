use serde::{Deserialize, Serialize};

use crate::domain::RouteKey;

/// One named step of the transition pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Appear,
    Preload,
    Fetch,
    Leave,
    Enter,
}

/// Discrete events published to the notification channel at defined points
/// of a transition. Consumers (loading bars, analytics) must not assume any
/// timing beyond the documented phase ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum TransitionEvent {
    TransitionStart {
        key: RouteKey,
        same_route: bool,
        meta: Option<serde_json::Value>,
    },
    EnterStart {
        same_route: bool,
    },
    EnterFinish {
        same_route: bool,
    },
    LeaveStart {
        same_route: bool,
    },
    LeaveFinish {
        same_route: bool,
    },
    /// A preload/fetch/lifecycle hook failed. The pipeline still advances;
    /// this event is the only place the failure reason is observable.
    PhaseFailed {
        phase: Phase,
        reason: String,
    },
    /// Payload forwarded from a route's fetch step via its notifier handle.
    FetchNotice {
        payload: serde_json::Value,
    },
}

/// Loading-indicator state folded over the event stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionIndicator {
    pub enter: bool,
    pub leave: bool,
    pub is_active: bool,
}

impl TransitionIndicator {
    pub fn apply(&mut self, event: &TransitionEvent) {
        match event {
            TransitionEvent::TransitionStart { .. } => self.is_active = true,
            TransitionEvent::EnterStart { .. } => self.enter = true,
            TransitionEvent::EnterFinish { .. } => {
                self.enter = false;
                self.is_active = false;
            }
            TransitionEvent::LeaveStart { .. } => self.leave = true,
            TransitionEvent::LeaveFinish { .. } => self.leave = false,
            TransitionEvent::PhaseFailed { .. } | TransitionEvent::FetchNotice { .. } => {}
        }
    }
}
