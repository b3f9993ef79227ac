//! Short-lived server-side state for code-gated actions.
//!
//! A flow is started for one action and one email, marked verified once the
//! emailed code checks out, and completed exactly once.

use dashmap::DashMap;
use thiserror::Error;
use ulid::Ulid;

use crate::engine::random_token;
use crate::limits::*;
use crate::model::Ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    Registration,
    Booking,
    InfoEdit { reservation_id: Ulid },
}

impl FlowAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowAction::Registration => "registration",
            FlowAction::Booking => "booking",
            FlowAction::InfoEdit { .. } => "info_edit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flow {
    pub action: FlowAction,
    pub email: String,
    pub verified: bool,
    pub expires_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlowError {
    #[error("flow not found")]
    NotFound,
    #[error("flow expired")]
    Expired,
    #[error("email not verified")]
    NotVerified,
    #[error("flow was started for {0}")]
    WrongAction(&'static str),
    #[error("too many pending flows")]
    LimitExceeded,
}

#[derive(Debug, Default)]
pub struct FlowStore {
    flows: DashMap<String, Flow>,
}

impl FlowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, action: FlowAction, email: &str, now: Ms) -> Result<String, FlowError> {
        if self.flows.len() >= MAX_FLOWS {
            return Err(FlowError::LimitExceeded);
        }
        let token = random_token(ACCESS_TOKEN_LEN);
        self.flows.insert(
            token.clone(),
            Flow {
                action,
                email: email.trim().to_string(),
                verified: false,
                expires_at: now + FLOW_TTL_MS,
            },
        );
        Ok(token)
    }

    pub fn get(&self, token: &str, now: Ms) -> Result<Flow, FlowError> {
        let flow = self.flows.get(token).ok_or(FlowError::NotFound)?;
        if now >= flow.expires_at {
            return Err(FlowError::Expired);
        }
        Ok(flow.clone())
    }

    pub fn mark_verified(&self, token: &str, now: Ms) -> Result<Flow, FlowError> {
        let mut flow = self.flows.get_mut(token).ok_or(FlowError::NotFound)?;
        if now >= flow.expires_at {
            return Err(FlowError::Expired);
        }
        flow.verified = true;
        Ok(flow.clone())
    }

    /// Consume a verified flow for `action`, returning its email. The removal
    /// is atomic, so a second completion sees `NotFound`.
    pub fn complete(&self, token: &str, action: FlowAction, now: Ms) -> Result<String, FlowError> {
        let removed = self.flows.remove_if(token, |_, f| {
            f.action == action && f.verified && now < f.expires_at
        });
        if let Some((_, flow)) = removed {
            return Ok(flow.email);
        }
        let flow = self.flows.get(token).ok_or(FlowError::NotFound)?;
        if now >= flow.expires_at {
            Err(FlowError::Expired)
        } else if flow.action != action {
            Err(FlowError::WrongAction(flow.action.as_str()))
        } else {
            Err(FlowError::NotVerified)
        }
    }

    /// Put back a flow whose completion was followed by a rejected submission,
    /// so the visitor can correct the form without a new code.
    pub fn reinstate(&self, token: String, flow: Flow) {
        self.flows.insert(token, flow);
    }

    pub fn purge_expired(&self, now: Ms) -> usize {
        let before = self.flows.len();
        self.flows.retain(|_, f| now < f.expires_at);
        before.saturating_sub(self.flows.len())
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }
}
