//! Self-serve operations for visitors: the slot grid, email verification,
//! and the submissions a verified flow unlocks.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::info;
use ulid::Ulid;

use crate::engine::slots::{self, View};
use crate::engine::{EngineError, parse_candidate, valid_email};
use crate::flows::{Flow, FlowAction, FlowError};
use crate::mail::{deliver, templates};
use crate::model::*;
use crate::services::{ServiceError, Services};

/// Availability for one window, keyed by local day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayGrid {
    pub window: Span,
    pub days: BTreeMap<NaiveDate, Vec<Slot>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub id: Ulid,
    pub status: StatusLabel,
    pub approved_slot: Option<Span>,
    /// `2024-06-01 10:00 ~ 11:30` in the schedule's zone.
    pub approved_range: Option<String>,
}

fn same_email(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

impl Services {
    pub async fn availability(&self, view: View, now: Ms) -> Result<DayGrid, ServiceError> {
        let tz = self.engine.schedule.tz;
        let window = slots::window_for(view, now, tz)?;
        slots::validate_window(&window)?;
        let busy = self.calendar.query_busy(window).await?;
        let grid = self.engine.availability(&window, &busy).await?;
        Ok(DayGrid {
            window,
            days: slots::group_by_day(&window, &grid, tz),
        })
    }

    /// Start a flow for `action` and mail a fresh code. Returns the flow token.
    pub async fn request_code(
        &self,
        action: FlowAction,
        email: &str,
        access_token: Option<&str>,
        now: Ms,
    ) -> Result<String, ServiceError> {
        let email = email.trim();
        if !valid_email(email) {
            return Err(EngineError::Validation(vec!["email address is not valid".into()]).into());
        }
        match action {
            FlowAction::Registration => {}
            // Either a waitlist token issued to this address or the shared
            // invite code.
            FlowAction::Booking => {
                let pass = access_token.ok_or(ServiceError::AccessDenied)?;
                if !self.engine.invite_code_matches(pass).await {
                    let entry = self
                        .engine
                        .waitlist_by_token(pass)
                        .await
                        .ok_or(ServiceError::AccessDenied)?;
                    if !same_email(&entry.email, email) {
                        return Err(ServiceError::AccessDenied);
                    }
                }
            }
            FlowAction::InfoEdit { reservation_id } => {
                let row = self
                    .engine
                    .get_reservation(&reservation_id)
                    .ok_or_else(|| EngineError::NotFound(format!("reservation {reservation_id}")))?;
                let owner = row.read().await.requester.email.clone();
                if !same_email(&owner, email) {
                    return Err(ServiceError::EmailMismatch);
                }
            }
        }
        let flow = self.flows.start(action, email, now)?;
        let code = self.engine.issue_code(email, now).await?;
        deliver(self.mailer.as_ref(), templates::verification_code(email, &code)).await?;
        info!(action = action.as_str(), "verification flow started");
        Ok(flow)
    }

    pub async fn confirm_code(&self, flow: &str, code: &str, now: Ms) -> Result<Flow, ServiceError> {
        let pending = self.flows.get(flow, now)?;
        match self.engine.verify_code(&pending.email, code, now).await? {
            Verification::Verified => Ok(self.flows.mark_verified(flow, now)?),
            Verification::Expired => Err(ServiceError::CodeExpired),
            Verification::Mismatch => Err(ServiceError::CodeMismatch),
            Verification::NotFound => Err(ServiceError::CodeNotFound),
        }
    }

    pub async fn register_waitlist(&self, flow: &str, now: Ms) -> Result<Ulid, ServiceError> {
        let email = self.flows.complete(flow, FlowAction::Registration, now)?;
        Ok(self.engine.register_waitlist(&email, now).await?)
    }

    pub async fn submit_reservation(
        &self,
        flow: &str,
        requester: Requester,
        raw_slots: &[String],
        now: Ms,
    ) -> Result<Ulid, ServiceError> {
        let pending = self.checked_flow(flow, FlowAction::Booking, &requester, now)?;
        self.flows.complete(flow, FlowAction::Booking, now)?;
        match self.engine.submit_reservation(requester, raw_slots, now).await {
            Ok(id) => Ok(id),
            Err(e) => {
                if matches!(e, EngineError::Validation(_)) {
                    self.flows.reinstate(flow.to_string(), pending);
                }
                Err(e.into())
            }
        }
    }

    pub async fn edit_reservation(
        &self,
        flow: &str,
        id: Ulid,
        requester: Requester,
        now: Ms,
    ) -> Result<(), ServiceError> {
        let action = FlowAction::InfoEdit { reservation_id: id };
        let pending = self.checked_flow(flow, action, &requester, now)?;
        self.flows.complete(flow, action, now)?;
        if let Err(e) = self.engine.update_requester(id, requester).await {
            if matches!(e, EngineError::Validation(_)) {
                self.flows.reinstate(flow.to_string(), pending);
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// The flow must be verified for `action` and its email must be the one
    /// on the form.
    fn checked_flow(
        &self,
        flow: &str,
        action: FlowAction,
        requester: &Requester,
        now: Ms,
    ) -> Result<Flow, ServiceError> {
        let pending = self.flows.get(flow, now)?;
        if pending.action != action {
            return Err(FlowError::WrongAction(pending.action.as_str()).into());
        }
        if !pending.verified {
            return Err(FlowError::NotVerified.into());
        }
        if !same_email(&pending.email, &requester.email) {
            return Err(ServiceError::EmailMismatch);
        }
        Ok(pending)
    }

    /// Open a booking link. Returns the deadline for booking through it.
    pub async fn access_link(&self, token: &str, now: Ms) -> Result<Ms, ServiceError> {
        Ok(self.engine.access_link(token, now).await?)
    }

    pub async fn book_via_link(
        &self,
        token: &str,
        requester: Requester,
        slot_start: &str,
        now: Ms,
    ) -> Result<Ulid, ServiceError> {
        let start = parse_candidate(slot_start).ok_or_else(|| {
            EngineError::Validation(vec![format!("invalid time slot: {slot_start}")])
        })?;
        Ok(self.engine.book_via_link(token, requester, start, now).await?)
    }

    /// Latest reservation filed under `phone`.
    pub async fn check_status(&self, phone: &str) -> Result<StatusReport, ServiceError> {
        let reservation = self
            .engine
            .lookup_by_phone(phone)
            .await
            .ok_or_else(|| EngineError::NotFound("no reservation for this phone number".into()))?;
        let tz = self.engine.schedule.tz;
        Ok(StatusReport {
            id: reservation.id,
            status: reservation.status_label(),
            approved_slot: reservation.approved_slot,
            approved_range: reservation
                .approved_slot
                .map(|span| templates::format_range(tz, &span)),
        })
    }
}
