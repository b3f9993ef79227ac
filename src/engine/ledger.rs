use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// A span held by an approved (or approving) reservation or link booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Claim {
    pub owner: Ulid,
    pub span: Span,
    /// `Some` while the approval is in flight; the claim lapses with the lease.
    pub expires_at: Option<Ms>,
}

impl Claim {
    fn is_active(&self, now: Ms) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Host-wide ledger of claimed meeting spans, sorted by `span.start`.
/// Approvals claim here before calling out, so two reservations can never be
/// approved onto overlapping time.
#[derive(Debug, Default)]
pub(super) struct Ledger {
    claims: Vec<Claim>,
}

impl Ledger {
    fn insert(&mut self, claim: Claim) {
        let pos = self
            .claims
            .binary_search_by_key(&claim.span.start, |c| c.span.start)
            .unwrap_or_else(|e| e);
        self.claims.insert(pos, claim);
    }

    pub fn release(&mut self, owner: Ulid) -> Option<Claim> {
        let pos = self.claims.iter().position(|c| c.owner == owner)?;
        Some(self.claims.remove(pos))
    }

    /// Claims whose span overlaps `query`; binary search skips everything
    /// starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Claim> {
        let right_bound = self.claims.partition_point(|c| c.span.start < query.end);
        self.claims[..right_bound]
            .iter()
            .filter(move |c| c.span.end > query.start)
    }

    /// Claim `span` for `owner`, replacing any earlier claim by the same owner.
    /// In-flight claims whose lease has lapsed are dropped first.
    pub fn claim(
        &mut self,
        owner: Ulid,
        span: Span,
        expires_at: Option<Ms>,
        now: Ms,
    ) -> Result<(), EngineError> {
        let before = self.claims.len();
        self.claims.retain(|c| c.is_active(now));
        let pruned = before - self.claims.len();
        if pruned > 0 {
            tracing::debug!(pruned, "dropped lapsed approval claims");
        }
        if let Some(other) = self.overlapping(&span).find(|c| c.owner != owner) {
            return Err(EngineError::SlotTaken(other.owner));
        }
        self.release(owner);
        self.insert(Claim { owner, span, expires_at });
        Ok(())
    }

    /// Make an in-flight claim permanent.
    pub fn commit(&mut self, owner: Ulid, span: Span) {
        self.restore(owner, span, None);
    }

    /// Reinstate a claim without conflict checks, as rebuilt from replayed rows.
    pub fn restore(&mut self, owner: Ulid, span: Span, expires_at: Option<Ms>) {
        self.release(owner);
        self.insert(Claim { owner, span, expires_at });
    }

    /// Spans already committed inside `window`, for availability.
    pub fn committed_in(&self, window: &Span) -> Vec<Span> {
        self.overlapping(window)
            .filter(|c| c.expires_at.is_none())
            .map(|c| c.span)
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.claims.len()
    }
}
