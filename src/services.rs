//! The engine together with its outside collaborators, as the admin and
//! front-desk operations see them.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;

use crate::calendar::Calendar;
use crate::engine::{Engine, EngineError};
use crate::flows::{FlowError, FlowStore};
use crate::mail::{Mail, Mailer, deliver};
use crate::model::Meeting;
use crate::remote::RemoteError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Flow(#[from] FlowError),
    #[error("verification code does not match")]
    CodeMismatch,
    #[error("verification code expired")]
    CodeExpired,
    #[error("no verification code was issued for this address")]
    CodeNotFound,
    #[error("email does not match the verified address")]
    EmailMismatch,
    #[error("access token is not valid for this address")]
    AccessDenied,
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Base for links mailed to visitors, without a trailing slash.
    pub public_url: String,
    /// Copied on approval mail.
    pub approval_cc: Option<String>,
}

pub struct Services {
    pub engine: Arc<Engine>,
    pub calendar: Arc<dyn Calendar>,
    pub mailer: Arc<dyn Mailer>,
    pub flows: FlowStore,
    pub settings: Settings,
}

impl Services {
    pub fn new(
        engine: Arc<Engine>,
        calendar: Arc<dyn Calendar>,
        mailer: Arc<dyn Mailer>,
        settings: Settings,
    ) -> Self {
        Self {
            engine,
            calendar,
            mailer,
            flows: FlowStore::new(),
            settings,
        }
    }

    /// Returns whether the mail went out.
    pub(crate) async fn notify(&self, mail: Mail) -> bool {
        deliver(self.mailer.as_ref(), mail).await.is_ok()
    }

    /// Best-effort calendar cleanup. Returns whether an event was removed.
    pub(crate) async fn cancel_meeting(&self, meeting: Option<Meeting>) -> bool {
        let Some(meeting) = meeting else {
            return false;
        };
        match self.calendar.delete_meeting(&meeting.event_id).await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(event_id = %meeting.event_id, "failed to cancel meeting: {e}");
                false
            }
        }
    }

    pub fn booking_url(&self, access_token: &str) -> String {
        format!("{}/book?token={access_token}", self.settings.public_url)
    }

    pub fn link_url(&self, token: &str) -> String {
        format!("{}/link?token={token}", self.settings.public_url)
    }
}
