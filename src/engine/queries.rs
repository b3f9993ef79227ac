use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::slots;
use super::{Engine, EngineError};

/// Who a reminder is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderTarget {
    Reservation(Ulid),
    Booking(Ulid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueReminder {
    pub target: ReminderTarget,
    pub requester: Requester,
    pub span: Span,
    pub meeting: Option<Meeting>,
}

/// Starts `[now + 55min, now + 65min]` are due.
fn reminder_due(start: Ms, now: Ms) -> bool {
    let lead = start - now;
    (REMINDER_LEAD_MIN_MS..=REMINDER_LEAD_MAX_MS).contains(&lead)
}

impl Engine {
    pub async fn status_of(&self, id: Ulid) -> Result<StatusLabel, EngineError> {
        let row = self
            .get_reservation(&id)
            .ok_or_else(|| EngineError::NotFound(format!("reservation {id}")))?;
        let guard = row.read().await;
        Ok(guard.status_label())
    }

    /// Most recent reservation by `(created_at, id)` for the phone number.
    pub async fn lookup_by_phone(&self, phone: &str) -> Option<Reservation> {
        let ids: Vec<Ulid> = self.by_phone.get(phone.trim())?.value().clone();
        let mut best: Option<Reservation> = None;
        for id in ids {
            let Some(row) = self.get_reservation(&id) else { continue };
            let r = row.read().await;
            let newer = best
                .as_ref()
                .is_none_or(|b| (r.created_at, r.id) > (b.created_at, b.id));
            if newer {
                best = Some(r.clone());
            }
        }
        best
    }

    /// Newest first.
    pub async fn list_reservations(&self) -> Vec<Reservation> {
        let rows: Vec<_> = self.reservations.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row.read().await.clone());
        }
        out.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        out
    }

    pub async fn list_links(&self) -> Vec<BookingLink> {
        let rows: Vec<_> = self.links.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row.read().await.clone());
        }
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.token.cmp(&b.token)));
        out
    }

    pub async fn list_bookings(&self) -> Vec<LinkBooking> {
        let rows: Vec<_> = self.bookings.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row.read().await.clone());
        }
        out.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        out
    }

    pub async fn list_waitlist(&self) -> Vec<WaitlistEntry> {
        let rows: Vec<_> = self.waitlist.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row.read().await.clone());
        }
        out.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        out
    }

    /// Meeting spans already committed inside `window`.
    pub async fn approved_spans(&self, window: &Span) -> Vec<Span> {
        self.ledger.lock().await.committed_in(window)
    }

    /// Slot grid for `window`, treating external busy time and our own
    /// approved meetings alike.
    pub async fn availability(
        &self,
        window: &Span,
        external_busy: &[Span],
    ) -> Result<Vec<Slot>, EngineError> {
        slots::validate_window(window)?;
        let mut busy = external_busy.to_vec();
        busy.extend(self.approved_spans(window).await);
        Ok(slots::generate(window, &busy, &self.schedule))
    }

    /// Approved meetings starting 55 to 65 minutes from `now` that have not
    /// been reminded yet.
    pub async fn due_reminders(&self, now: Ms) -> Vec<DueReminder> {
        let mut due = Vec::new();
        let reservations: Vec<_> = self.reservations.iter().map(|e| e.value().clone()).collect();
        for row in reservations {
            let r = row.read().await;
            if let Some(span) = r.approved_slot
                && !r.reminder_sent
                && reminder_due(span.start, now)
            {
                due.push(DueReminder {
                    target: ReminderTarget::Reservation(r.id),
                    requester: r.requester.clone(),
                    span,
                    meeting: r.meeting.clone(),
                });
            }
        }
        let bookings: Vec<_> = self.bookings.iter().map(|e| e.value().clone()).collect();
        for row in bookings {
            let b = row.read().await;
            if b.status == BookingStatus::Confirmed
                && !b.reminder_sent
                && reminder_due(b.slot.start, now)
            {
                due.push(DueReminder {
                    target: ReminderTarget::Booking(b.id),
                    requester: b.requester.clone(),
                    span: b.slot,
                    meeting: b.meeting.clone(),
                });
            }
        }
        due.sort_by_key(|d| d.span.start);
        due
    }
}
