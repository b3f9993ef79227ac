use tracing::info;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    /// Replace the active invite code. Setting the current code again is a no-op.
    pub async fn set_invite_code(&self, code: &str, now: Ms) -> Result<InviteCode, EngineError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(EngineError::Validation(vec!["invite code is required".into()]));
        }
        if code.len() > MAX_INVITE_CODE_LEN || code.chars().any(char::is_whitespace) {
            return Err(EngineError::Validation(vec!["invite code is not valid".into()]));
        }
        let _gate = self.write_gate.read().await;
        let mut guard = self.invite.write().await;
        if let Some(current) = guard.as_ref().filter(|c| c.code == code) {
            return Ok(current.clone());
        }
        let invite = InviteCode {
            code: code.to_string(),
            set_at: now,
        };
        self.wal_append(&Event::InviteCodeSet { invite: invite.clone() })
            .await?;
        *guard = Some(invite.clone());
        info!("invite code changed");
        Ok(invite)
    }

    pub async fn active_invite_code(&self) -> Option<InviteCode> {
        self.invite.read().await.clone()
    }

    /// True only while `code` is the active one.
    pub async fn invite_code_matches(&self, code: &str) -> bool {
        self.invite
            .read()
            .await
            .as_ref()
            .is_some_and(|active| active.code == code.trim())
    }
}
