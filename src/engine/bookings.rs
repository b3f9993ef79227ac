use std::sync::Arc;

use chrono::{NaiveDateTime, Timelike};
use tokio::sync::RwLock;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::reservations::{normalize_requester, validate_requester};
use super::slots::to_ms;
use super::{ApprovalStart, Engine, EngineError};

impl Engine {
    /// Select one slot through an armed link. Consumes the link and records
    /// the booking in a single event.
    pub async fn book_via_link(
        &self,
        token: &str,
        requester: Requester,
        slot_start: NaiveDateTime,
        now: Ms,
    ) -> Result<Ulid, EngineError> {
        let requester = normalize_requester(requester);
        let mut errors = validate_requester(&requester);
        if !self.schedule.allowed_hours.contains(slot_start.hour()) {
            errors.push(format!("{slot_start} is outside bookable hours"));
        }
        let start = to_ms(self.schedule.tz, slot_start);
        match start {
            Some(start) if start <= now => errors.push(format!("{slot_start} is in the past")),
            None => errors.push(format!("{slot_start} does not exist in {}", self.schedule.tz)),
            _ => {}
        }
        let Some(start) = start.filter(|_| errors.is_empty()) else {
            return Err(EngineError::Validation(errors));
        };
        let slot = Span::new(start, start + self.schedule.slot_length);

        let _gate = self.write_gate.read().await;
        let row = self
            .get_link(token)
            .ok_or_else(|| EngineError::NotFound("booking link".into()))?;
        let mut link = row.write().await;
        match link.state(now) {
            LinkState::Armed { .. } => {}
            LinkState::Created => {
                return Err(EngineError::Validation(vec![
                    "booking link has not been opened".into(),
                ]));
            }
            LinkState::Expired => return Err(EngineError::Expired),
            LinkState::Used => return Err(EngineError::AlreadyUsed),
            LinkState::Revoked => return Err(EngineError::Revoked),
        }
        if let Some(taken) = self
            .ledger
            .lock()
            .await
            .overlapping(&slot)
            .find(|c| c.expires_at.is_none())
        {
            return Err(EngineError::SlotTaken(taken.owner));
        }

        let booking = LinkBooking {
            id: Ulid::new(),
            token: token.to_string(),
            requester,
            slot,
            status: BookingStatus::Pending,
            meeting: None,
            approval: None,
            reminder_sent: false,
            created_at: now,
        };
        let id = booking.id;
        let event = Event::LinkBooked { booking: booking.clone() };
        self.persist_and_apply(&mut *link, &event).await?;
        self.bookings.insert(id, Arc::new(RwLock::new(booking)));
        info!(%id, link = %link.name, start, "slot booked via link");
        Ok(id)
    }

    pub async fn begin_confirm(&self, id: Ulid, now: Ms) -> Result<ApprovalStart, EngineError> {
        let _gate = self.write_gate.read().await;
        let row = self
            .get_booking(&id)
            .ok_or_else(|| EngineError::NotFound(format!("booking {id}")))?;
        let mut guard = row.write().await;

        if guard.status == BookingStatus::Confirmed {
            return Ok(ApprovalStart::AlreadyApproved(guard.slot));
        }
        if guard.approval.is_some_and(|lease| lease.is_live(now)) {
            return Ok(ApprovalStart::InProgress);
        }
        let span = guard.slot;
        let lease = ApprovalLease { id: Ulid::new(), span, started_at: now };
        self.ledger
            .lock()
            .await
            .claim(id, span, Some(now + APPROVAL_LEASE_MS), now)?;
        let event = Event::BookingConfirmStarted { id, lease };
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

    pub async fn complete_confirm(
        &self,
        id: Ulid,
        lease_id: Ulid,
        meeting: Meeting,
    ) -> Result<Span, EngineError> {
        let _gate = self.write_gate.read().await;
        let row = self.get_booking(&id).ok_or(EngineError::Superseded(id))?;
        let mut guard = row.write().await;
        let current = guard.approval.is_some_and(|lease| lease.id == lease_id);
        if !current || guard.status == BookingStatus::Confirmed {
            return Err(EngineError::Superseded(id));
        }
        self.persist_and_apply(&mut *guard, &Event::BookingConfirmed { id, meeting })
            .await?;
        self.ledger.lock().await.commit(id, guard.slot);
        info!(%id, "link booking confirmed");
        metrics::counter!(crate::observability::APPROVALS_TOTAL, "kind" => "booking").increment(1);
        Ok(guard.slot)
    }

    pub async fn abort_confirm(&self, id: Ulid, lease_id: Ulid) -> Result<(), EngineError> {
        let _gate = self.write_gate.read().await;
        let Some(row) = self.get_booking(&id) else {
            return Ok(());
        };
        let mut guard = row.write().await;
        if !guard.approval.is_some_and(|lease| lease.id == lease_id) {
            return Ok(());
        }
        self.persist_and_apply(&mut *guard, &Event::BookingConfirmAborted { id, lease_id })
            .await?;
        self.ledger.lock().await.release(id);
        Ok(())
    }

    /// Returns the meeting to cancel, if the booking had been confirmed.
    pub async fn reject_booking(&self, id: Ulid) -> Result<Option<Meeting>, EngineError> {
        let _gate = self.write_gate.read().await;
        let row = self
            .get_booking(&id)
            .ok_or_else(|| EngineError::NotFound(format!("booking {id}")))?;
        let mut guard = row.write().await;
        if guard.status == BookingStatus::Rejected && guard.approval.is_none() {
            return Ok(None);
        }
        let previous = guard.meeting.clone();
        self.persist_and_apply(&mut *guard, &Event::BookingRejected { id })
            .await?;
        self.ledger.lock().await.release(id);
        info!(%id, "link booking rejected");
        Ok(previous)
    }

    pub async fn mark_booking_reminded(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.write_gate.read().await;
        let row = self
            .get_booking(&id)
            .ok_or_else(|| EngineError::NotFound(format!("booking {id}")))?;
        let mut guard = row.write().await;
        if guard.reminder_sent {
            return Ok(());
        }
        self.persist_and_apply(&mut *guard, &Event::BookingReminded { id })
            .await
    }
}
