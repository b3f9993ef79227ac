use std::sync::Arc;

use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio::sync::RwLock;
use tracing::info;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

/// URL-safe random token.
pub(crate) fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

impl Engine {
    pub async fn create_link(&self, name: &str, now: Ms) -> Result<String, EngineError> {
        let name = name.trim();
        if name.is_empty() || name.len() > MAX_LINK_NAME_LEN {
            return Err(EngineError::Validation(vec![format!(
                "link name must be 1..={MAX_LINK_NAME_LEN} characters"
            )]));
        }
        let _gate = self.write_gate.read().await;
        if self.links.len() >= MAX_LINKS {
            return Err(EngineError::LimitExceeded("too many booking links"));
        }
        let token = random_token(LINK_TOKEN_LEN);
        let link = BookingLink::new(token.clone(), name.to_string(), now);
        self.wal_append(&Event::LinkCreated { link: link.clone() })
            .await?;
        self.links.insert(token.clone(), Arc::new(RwLock::new(link)));
        info!(name, "booking link created");
        Ok(token)
    }

    /// Open a link. The first access arms it; later ones return the same
    /// deadline. Returns `expires_at`.
    pub async fn access_link(&self, token: &str, now: Ms) -> Result<Ms, EngineError> {
        let result = self.access_link_inner(token, now).await;
        let outcome = match &result {
            Ok(_) => "allowed",
            Err(EngineError::Expired) => "expired",
            Err(EngineError::AlreadyUsed) => "used",
            Err(EngineError::Revoked) => "revoked",
            Err(_) => "error",
        };
        metrics::counter!(crate::observability::LINK_ACCESSES_TOTAL, "outcome" => outcome)
            .increment(1);
        result
    }

    async fn access_link_inner(&self, token: &str, now: Ms) -> Result<Ms, EngineError> {
        let _gate = self.write_gate.read().await;
        let row = self
            .get_link(token)
            .ok_or_else(|| EngineError::NotFound("booking link".into()))?;
        // Write lock even for repeat visits: the first access is set-if-unset,
        // and every racer must observe the winner's deadline.
        let mut guard = row.write().await;
        match guard.state(now) {
            LinkState::Armed { expires_at } => Ok(expires_at),
            LinkState::Created => {
                let expires_at = now + LINK_ACCESS_WINDOW_MS;
                let event = Event::LinkArmed {
                    token: token.to_string(),
                    at: now,
                    expires_at,
                };
                self.persist_and_apply(&mut *guard, &event).await?;
                info!(name = %guard.name, expires_at, "booking link armed");
                Ok(expires_at)
            }
            LinkState::Expired => Err(EngineError::Expired),
            LinkState::Used => Err(EngineError::AlreadyUsed),
            LinkState::Revoked => Err(EngineError::Revoked),
        }
    }

    pub async fn set_link_active(&self, token: &str, active: bool) -> Result<(), EngineError> {
        let _gate = self.write_gate.read().await;
        let row = self
            .get_link(token)
            .ok_or_else(|| EngineError::NotFound("booking link".into()))?;
        let mut guard = row.write().await;
        if guard.active == active {
            return Ok(());
        }
        let event = Event::LinkActiveSet {
            token: token.to_string(),
            active,
        };
        self.persist_and_apply(&mut *guard, &event).await?;
        info!(name = %guard.name, active, "booking link toggled");
        Ok(())
    }

    pub async fn link_state(&self, token: &str, now: Ms) -> Option<LinkState> {
        let row = self.get_link(token)?;
        let guard = row.read().await;
        Some(guard.state(now))
    }
}
