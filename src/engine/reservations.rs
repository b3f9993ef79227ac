use std::sync::{Arc, LazyLock};

use chrono::NaiveDateTime;
use regex::Regex;
use tokio::sync::RwLock;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::slots::to_ms;
use super::{Engine, EngineError};

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L}\s]+$").expect("Invalid name regex"));
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9][0-9-]*$").expect("Invalid phone regex"));
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.-]+@[\w.-]+\.\w+$").expect("Invalid email regex"));

const CANDIDATE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a local candidate start such as `2024-06-01T10:30:00`.
pub fn parse_candidate(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    CANDIDATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Every field problem, in form order. Empty means valid.
pub fn validate_requester(r: &Requester) -> Vec<String> {
    let mut errors = Vec::new();
    if r.name.len() > MAX_NAME_LEN || !NAME_RE.is_match(&r.name) {
        errors.push("name may contain only letters and spaces".to_string());
    }
    if r.phone.len() > MAX_PHONE_LEN || !PHONE_RE.is_match(&r.phone) {
        errors.push("phone may contain only digits and hyphens".to_string());
    }
    if !valid_email(&r.email) {
        errors.push("email address is not valid".to_string());
    }
    if r.purpose.is_empty() {
        errors.push("purpose is required".to_string());
    } else if r.purpose.len() > MAX_PURPOSE_LEN {
        errors.push("purpose is too long".to_string());
    }
    errors
}

pub fn valid_email(email: &str) -> bool {
    email.len() <= MAX_EMAIL_LEN && EMAIL_RE.is_match(email)
}

pub(super) fn normalize_requester(r: Requester) -> Requester {
    Requester {
        name: r.name.trim().to_string(),
        email: r.email.trim().to_string(),
        phone: r.phone.trim().to_string(),
        purpose: r.purpose.trim().to_string(),
    }
}

/// Validate the form and candidate list together so the caller sees every
/// problem at once. Duplicate candidates collapse, first occurrence wins.
fn validate_submission(
    requester: &Requester,
    raw_slots: &[String],
) -> Result<Vec<NaiveDateTime>, EngineError> {
    let mut errors = validate_requester(requester);
    let mut starts: Vec<NaiveDateTime> = Vec::with_capacity(raw_slots.len());
    if raw_slots.is_empty() {
        errors.push("select at least one time slot".to_string());
    } else if raw_slots.len() > MAX_CANDIDATES {
        errors.push(format!("select at most {MAX_CANDIDATES} time slots"));
    } else {
        for raw in raw_slots {
            match parse_candidate(raw) {
                Some(at) if !starts.contains(&at) => starts.push(at),
                Some(_) => {}
                None => errors.push(format!("invalid time slot: {raw}")),
            }
        }
    }
    if errors.is_empty() {
        Ok(starts)
    } else {
        Err(EngineError::Validation(errors))
    }
}

/// Result of trying to start an approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalStart {
    /// Intent persisted; the caller now owns the meeting creation.
    Started(MeetingRequest),
    AlreadyApproved(Span),
    /// Another approval holds a live lease on this reservation.
    InProgress,
}

impl Engine {
    pub async fn submit_reservation(
        &self,
        requester: Requester,
        raw_slots: &[String],
        now: Ms,
    ) -> Result<Ulid, EngineError> {
        let requester = normalize_requester(requester);
        let starts = validate_submission(&requester, raw_slots)?;

        let _gate = self.write_gate.read().await;
        if self.reservations.len() >= MAX_RESERVATIONS {
            return Err(EngineError::LimitExceeded("too many reservations"));
        }
        let id = Ulid::new();
        let reservation = Reservation {
            id,
            requester,
            candidates: starts.into_iter().map(SlotCandidate::pending).collect(),
            approved_slot: None,
            meeting: None,
            approval: None,
            reminder_sent: false,
            created_at: now,
        };
        let event = Event::ReservationSubmitted { reservation: reservation.clone() };
        self.wal_append(&event).await?;
        self.by_phone
            .entry(reservation.requester.phone.clone())
            .or_default()
            .push(id);
        info!(%id, candidates = reservation.candidates.len(), "reservation submitted");
        self.reservations.insert(id, Arc::new(RwLock::new(reservation)));
        metrics::counter!(crate::observability::RESERVATIONS_SUBMITTED_TOTAL).increment(1);
        Ok(id)
    }

    /// Earliest candidate through the configured duration policy.
    pub fn meeting_span(&self, reservation: &Reservation) -> Result<Span, EngineError> {
        let starts = reservation.sorted_candidates();
        let (Some(first), Some(last)) = (starts.first(), starts.last()) else {
            return Err(EngineError::NoCandidates);
        };
        let tz = self.schedule.tz;
        let missing = |at: &NaiveDateTime| {
            EngineError::Validation(vec![format!("{at} does not exist in {tz}")])
        };
        let start = to_ms(tz, *first).ok_or_else(|| missing(first))?;
        let end = match self.schedule.approval_duration {
            ApprovalDuration::SpanToLast => {
                to_ms(tz, *last).ok_or_else(|| missing(last))? + self.schedule.slot_length
            }
            ApprovalDuration::Fixed(duration) => start + duration,
        };
        Ok(Span::new(start, end))
    }

    /// Persist the intent to approve and claim the span. The row lock is
    /// released on return; the meeting is created outside any lock.
    pub async fn begin_approval(&self, id: Ulid, now: Ms) -> Result<ApprovalStart, EngineError> {
        let _gate = self.write_gate.read().await;
        let row = self
            .get_reservation(&id)
            .ok_or_else(|| EngineError::NotFound(format!("reservation {id}")))?;
        let mut guard = row.write().await;

        if let Some(slot) = guard.approved_slot {
            return Ok(ApprovalStart::AlreadyApproved(slot));
        }
        if guard.approval.is_some_and(|lease| lease.is_live(now)) {
            return Ok(ApprovalStart::InProgress);
        }
        let span = self.meeting_span(&guard)?;
        let lease = ApprovalLease { id: Ulid::new(), span, started_at: now };

        self.ledger
            .lock()
            .await
            .claim(id, span, Some(now + APPROVAL_LEASE_MS), now)?;
        let event = Event::ApprovalStarted { id, lease };
        if let Err(e) = self.persist_and_apply(&mut *guard, &event).await {
            self.ledger.lock().await.release(id);
            return Err(e);
        }
        Ok(ApprovalStart::Started(MeetingRequest {
            owner: id,
            lease: lease.id,
            requester: guard.requester.clone(),
            span,
        }))
    }

    /// Record the created meeting, provided this lease is still the current one.
    pub async fn complete_approval(
        &self,
        id: Ulid,
        lease_id: Ulid,
        meeting: Meeting,
    ) -> Result<Span, EngineError> {
        let _gate = self.write_gate.read().await;
        let row = self.get_reservation(&id).ok_or(EngineError::Superseded(id))?;
        let mut guard = row.write().await;
        let lease = match guard.approval {
            Some(lease) if lease.id == lease_id && guard.approved_slot.is_none() => lease,
            _ => return Err(EngineError::Superseded(id)),
        };
        let event = Event::ReservationApproved { id, slot: lease.span, meeting };
        self.persist_and_apply(&mut *guard, &event).await?;
        self.ledger.lock().await.commit(id, lease.span);
        info!(%id, start = lease.span.start, end = lease.span.end, "reservation approved");
        metrics::counter!(crate::observability::APPROVALS_TOTAL, "kind" => "reservation").increment(1);
        Ok(lease.span)
    }

    /// Drop a failed approval's intent; the reservation stays pending.
    pub async fn abort_approval(&self, id: Ulid, lease_id: Ulid) -> Result<(), EngineError> {
        let _gate = self.write_gate.read().await;
        let Some(row) = self.get_reservation(&id) else {
            return Ok(());
        };
        let mut guard = row.write().await;
        if !guard.approval.is_some_and(|lease| lease.id == lease_id) {
            return Ok(());
        }
        let event = Event::ApprovalAborted { id, lease_id };
        self.persist_and_apply(&mut *guard, &event).await?;
        self.ledger.lock().await.release(id);
        Ok(())
    }

    /// Reject every candidate and clear any approval. Returns the meeting that
    /// existed before, so the caller can cancel it.
    pub async fn reject_reservation(&self, id: Ulid) -> Result<Option<Meeting>, EngineError> {
        let _gate = self.write_gate.read().await;
        let row = self
            .get_reservation(&id)
            .ok_or_else(|| EngineError::NotFound(format!("reservation {id}")))?;
        let mut guard = row.write().await;
        let already = guard.status_label() == StatusLabel::Rejected && guard.approval.is_none();
        if already {
            return Ok(None);
        }
        let previous = guard.meeting.clone();
        self.persist_and_apply(&mut *guard, &Event::ReservationRejected { id })
            .await?;
        self.ledger.lock().await.release(id);
        info!(%id, "reservation rejected");
        Ok(previous)
    }

    /// Permanent removal. Deleting a missing id is a no-op.
    pub async fn delete_reservation(&self, id: Ulid) -> Result<Option<Meeting>, EngineError> {
        let _gate = self.write_gate.read().await;
        let Some(row) = self.get_reservation(&id) else {
            return Ok(None);
        };
        let guard = row.write().await;
        self.wal_append(&Event::ReservationDeleted { id }).await?;
        self.reservations.remove(&id);
        if let Some(mut ids) = self.by_phone.get_mut(&guard.requester.phone) {
            ids.retain(|other| *other != id);
        }
        self.ledger.lock().await.release(id);
        info!(%id, "reservation deleted");
        Ok(guard.meeting.clone())
    }

    /// Replace the requester details of an existing reservation.
    pub async fn update_requester(&self, id: Ulid, requester: Requester) -> Result<(), EngineError> {
        let requester = normalize_requester(requester);
        let errors = validate_requester(&requester);
        if !errors.is_empty() {
            return Err(EngineError::Validation(errors));
        }
        let _gate = self.write_gate.read().await;
        let row = self
            .get_reservation(&id)
            .ok_or_else(|| EngineError::NotFound(format!("reservation {id}")))?;
        let mut guard = row.write().await;
        let old_phone = guard.requester.phone.clone();
        let event = Event::RequesterUpdated { id, requester };
        self.persist_and_apply(&mut *guard, &event).await?;
        if old_phone != guard.requester.phone {
            if let Some(mut ids) = self.by_phone.get_mut(&old_phone) {
                ids.retain(|other| *other != id);
            }
            self.by_phone
                .entry(guard.requester.phone.clone())
                .or_default()
                .push(id);
        }
        Ok(())
    }

    pub async fn mark_reservation_reminded(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.write_gate.read().await;
        let row = self
            .get_reservation(&id)
            .ok_or_else(|| EngineError::NotFound(format!("reservation {id}")))?;
        let mut guard = row.write().await;
        if guard.reminder_sent {
            return Ok(());
        }
        self.persist_and_apply(&mut *guard, &Event::ReservationReminded { id })
            .await
    }
}
