use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info};

use crate::limits::*;
use crate::model::*;

use super::reservations::valid_email;
use super::{Engine, EngineError, SharedCodes};

fn random_code() -> String {
    let bound = 10u32.pow(CODE_DIGITS);
    let n = rand::thread_rng().gen_range(0..bound);
    format!("{n:0width$}", width = CODE_DIGITS as usize)
}

impl Engine {
    /// Issue a fresh code for `email`. Earlier codes stay on record but only
    /// the newest one is ever checked.
    pub async fn issue_code(&self, email: &str, now: Ms) -> Result<String, EngineError> {
        let email = email.trim();
        if !valid_email(email) {
            return Err(EngineError::Validation(vec!["email address is not valid".into()]));
        }
        let code = VerificationCode {
            email: email.to_string(),
            code: random_code(),
            expires_at: now + CODE_TTL_MS,
            created_at: now,
            verified: false,
        };

        let _gate = self.write_gate.read().await;
        // The purge may unlink an emptied row; retry until we hold the live one.
        let mut guard = loop {
            let row: SharedCodes = self.codes.entry(email.to_string()).or_default().clone();
            let guard = row.clone().write_owned().await;
            if self.codes.get(email).is_some_and(|e| Arc::ptr_eq(e.value(), &row)) {
                break guard;
            }
        };
        let issued = code.code.clone();
        self.persist_and_apply(&mut *guard, &Event::CodeIssued { code })
            .await?;
        metrics::counter!(crate::observability::CODES_ISSUED_TOTAL).increment(1);
        info!(email, "verification code issued");
        Ok(issued)
    }

    /// Check `code` against the newest code for `email`. A mismatch leaves the
    /// code usable; a match keeps matching until it expires.
    pub async fn verify_code(
        &self,
        email: &str,
        code: &str,
        now: Ms,
    ) -> Result<Verification, EngineError> {
        let email = email.trim();
        let _gate = self.write_gate.read().await;
        let Some(row) = self.codes.get(email).map(|e| e.value().clone()) else {
            return Ok(Verification::NotFound);
        };
        let mut guard = row.write().await;
        let Some(latest) = guard.iter().max_by_key(|c| c.created_at).cloned() else {
            return Ok(Verification::NotFound);
        };
        if now > latest.expires_at {
            return Ok(Verification::Expired);
        }
        if latest.code != code.trim() {
            return Ok(Verification::Mismatch);
        }
        if !latest.verified {
            let event = Event::CodeVerified {
                email: email.to_string(),
                created_at: latest.created_at,
            };
            self.persist_and_apply(&mut *guard, &event).await?;
        }
        Ok(Verification::Verified)
    }

    /// Drop expired codes from memory. Compaction leaves them out of the log.
    pub async fn purge_expired_codes(&self, now: Ms) -> usize {
        let rows: Vec<(String, SharedCodes)> = self
            .codes
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let mut purged = 0;
        for (email, row) in rows {
            let mut guard = row.write().await;
            let before = guard.len();
            guard.retain(|c| c.expires_at >= now);
            purged += before - guard.len();
            if guard.is_empty() {
                self.codes.remove_if(&email, |_, v| Arc::ptr_eq(v, &row));
            }
        }
        if purged > 0 {
            debug!(purged, "expired verification codes purged");
        }
        purged
    }
}
