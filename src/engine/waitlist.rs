use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::links::random_token;
use super::reservations::valid_email;
use super::{Engine, EngineError};

impl Engine {
    /// One waitlist entry per email address.
    pub async fn register_waitlist(&self, email: &str, now: Ms) -> Result<Ulid, EngineError> {
        let email = email.trim();
        if !valid_email(email) {
            return Err(EngineError::Validation(vec!["email address is not valid".into()]));
        }
        let _gate = self.write_gate.read().await;
        if self.waitlist.len() >= MAX_WAITLIST {
            return Err(EngineError::LimitExceeded("waitlist is full"));
        }
        let id = Ulid::new();
        // Reserve the email before the append so concurrent registrations
        // of the same address cannot both succeed.
        match self.waitlist_by_email.entry(email.to_string()) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(email.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }
        let entry = WaitlistEntry {
            id,
            email: email.to_string(),
            status: WaitlistStatus::Pending,
            access_token: None,
            created_at: now,
        };
        if let Err(e) = self
            .wal_append(&Event::WaitlistRegistered { entry: entry.clone() })
            .await
        {
            self.waitlist_by_email.remove(email);
            return Err(e);
        }
        self.waitlist.insert(id, Arc::new(RwLock::new(entry)));
        info!(%id, "waitlist registration");
        Ok(id)
    }

    /// Mint an access token. Approving twice returns the existing token.
    pub async fn approve_waitlist(&self, id: Ulid) -> Result<WaitlistEntry, EngineError> {
        let _gate = self.write_gate.read().await;
        let row = self
            .get_waitlist_entry(&id)
            .ok_or_else(|| EngineError::NotFound(format!("waitlist entry {id}")))?;
        let mut guard = row.write().await;
        if guard.status == WaitlistStatus::Approved {
            return Ok(guard.clone());
        }
        let access_token = random_token(ACCESS_TOKEN_LEN);
        let event = Event::WaitlistApproved { id, access_token: access_token.clone() };
        self.persist_and_apply(&mut *guard, &event).await?;
        self.waitlist_by_token.insert(access_token, id);
        info!(%id, "waitlist entry approved");
        Ok(guard.clone())
    }

    pub async fn reject_waitlist(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.write_gate.read().await;
        let row = self
            .get_waitlist_entry(&id)
            .ok_or_else(|| EngineError::NotFound(format!("waitlist entry {id}")))?;
        let mut guard = row.write().await;
        if guard.status == WaitlistStatus::Rejected {
            return Ok(());
        }
        let revoked = guard.access_token.clone();
        self.persist_and_apply(&mut *guard, &Event::WaitlistRejected { id })
            .await?;
        if let Some(token) = revoked {
            self.waitlist_by_token.remove(&token);
        }
        info!(%id, "waitlist entry rejected");
        Ok(())
    }

    /// The approved entry holding `token`, if any.
    pub async fn waitlist_by_token(&self, token: &str) -> Option<WaitlistEntry> {
        let id = *self.waitlist_by_token.get(token)?.value();
        let row = self.get_waitlist_entry(&id)?;
        let guard = row.read().await;
        (guard.status == WaitlistStatus::Approved).then(|| guard.clone())
    }
}
