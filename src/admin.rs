//! Host decisions. Each command re-reads current state, so repeating one is
//! harmless.

use tracing::{info, warn};
use ulid::Ulid;

use crate::engine::{ApprovalStart, EngineError};
use crate::mail::templates;
use crate::model::*;
use crate::services::{ServiceError, Services};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    ApproveReservation(Ulid),
    RejectReservation(Ulid),
    DeleteReservation(Ulid),
    ApproveWaitlist(Ulid),
    RejectWaitlist(Ulid),
    CreateBookingLink { name: String },
    SetLinkActive { token: String, active: bool },
    ApproveBooking(Ulid),
    RejectBooking(Ulid),
    SetInviteCode { code: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutcome {
    Approved {
        span: Span,
        meeting_link: Option<String>,
        mailed: bool,
    },
    AlreadyApproved {
        span: Span,
    },
    /// Another approval of the same row holds a live lease.
    InProgress,
    Rejected {
        cancelled: bool,
    },
    Deleted {
        cancelled: bool,
    },
    WaitlistApproved {
        access_token: String,
        booking_url: String,
        mailed: bool,
    },
    WaitlistRejected,
    LinkCreated {
        token: String,
        url: String,
    },
    LinkUpdated {
        active: bool,
    },
    InviteCodeSet {
        code: String,
    },
}

impl AdminOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminOutcome::Approved { .. } => "approved",
            AdminOutcome::AlreadyApproved { .. } => "already_approved",
            AdminOutcome::InProgress => "in_progress",
            AdminOutcome::Rejected { .. } => "rejected",
            AdminOutcome::Deleted { .. } => "deleted",
            AdminOutcome::WaitlistApproved { .. } => "waitlist_approved",
            AdminOutcome::WaitlistRejected => "waitlist_rejected",
            AdminOutcome::LinkCreated { .. } => "link_created",
            AdminOutcome::LinkUpdated { .. } => "link_updated",
            AdminOutcome::InviteCodeSet { .. } => "invite_code_set",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Approvable {
    Reservation(Ulid),
    Booking(Ulid),
}

impl Services {
    pub async fn execute_admin(
        &self,
        command: AdminCommand,
        now: Ms,
    ) -> Result<AdminOutcome, ServiceError> {
        match command {
            AdminCommand::ApproveReservation(id) => {
                self.approve(Approvable::Reservation(id), now).await
            }
            AdminCommand::ApproveBooking(id) => self.approve(Approvable::Booking(id), now).await,
            AdminCommand::RejectReservation(id) => {
                let previous = self.engine.reject_reservation(id).await?;
                let cancelled = self.cancel_meeting(previous).await;
                Ok(AdminOutcome::Rejected { cancelled })
            }
            AdminCommand::RejectBooking(id) => {
                let previous = self.engine.reject_booking(id).await?;
                let cancelled = self.cancel_meeting(previous).await;
                Ok(AdminOutcome::Rejected { cancelled })
            }
            AdminCommand::DeleteReservation(id) => {
                let previous = self.engine.delete_reservation(id).await?;
                let cancelled = self.cancel_meeting(previous).await;
                Ok(AdminOutcome::Deleted { cancelled })
            }
            AdminCommand::ApproveWaitlist(id) => {
                let entry = self.engine.approve_waitlist(id).await?;
                let access_token = entry
                    .access_token
                    .ok_or_else(|| EngineError::NotFound(format!("access token for {id}")))?;
                let booking_url = self.booking_url(&access_token);
                let mailed = self
                    .notify(templates::waitlist_approved(&entry.email, &booking_url))
                    .await;
                Ok(AdminOutcome::WaitlistApproved {
                    access_token,
                    booking_url,
                    mailed,
                })
            }
            AdminCommand::RejectWaitlist(id) => {
                self.engine.reject_waitlist(id).await?;
                Ok(AdminOutcome::WaitlistRejected)
            }
            AdminCommand::CreateBookingLink { name } => {
                let token = self.engine.create_link(&name, now).await?;
                let url = self.link_url(&token);
                Ok(AdminOutcome::LinkCreated { token, url })
            }
            AdminCommand::SetLinkActive { token, active } => {
                self.engine.set_link_active(&token, active).await?;
                Ok(AdminOutcome::LinkUpdated { active })
            }
            AdminCommand::SetInviteCode { code } => {
                let invite = self.engine.set_invite_code(&code, now).await?;
                Ok(AdminOutcome::InviteCodeSet { code: invite.code })
            }
        }
    }

    /// Begin, create the meeting with no lock held, then complete. A meeting
    /// whose approval lost to a later decision is cancelled again.
    async fn approve(&self, target: Approvable, now: Ms) -> Result<AdminOutcome, ServiceError> {
        let start = match target {
            Approvable::Reservation(id) => self.engine.begin_approval(id, now).await?,
            Approvable::Booking(id) => self.engine.begin_confirm(id, now).await?,
        };
        let request = match start {
            ApprovalStart::Started(request) => request,
            ApprovalStart::AlreadyApproved(span) => {
                return Ok(AdminOutcome::AlreadyApproved { span });
            }
            ApprovalStart::InProgress => return Ok(AdminOutcome::InProgress),
        };

        let meeting = match self.calendar.create_meeting(&request).await {
            Ok(meeting) => meeting,
            Err(e) => {
                warn!(owner = %request.owner, "meeting creation failed: {e}");
                let aborted = match target {
                    Approvable::Reservation(id) => {
                        self.engine.abort_approval(id, request.lease).await
                    }
                    Approvable::Booking(id) => self.engine.abort_confirm(id, request.lease).await,
                };
                if let Err(abort) = aborted {
                    warn!(owner = %request.owner, "failed to abort approval: {abort}");
                }
                return Err(e.into());
            }
        };

        let completed = match target {
            Approvable::Reservation(id) => {
                self.engine
                    .complete_approval(id, request.lease, meeting.clone())
                    .await
            }
            Approvable::Booking(id) => {
                self.engine
                    .complete_confirm(id, request.lease, meeting.clone())
                    .await
            }
        };
        let span = match completed {
            Ok(span) => span,
            Err(e) => {
                info!(owner = %request.owner, event_id = %meeting.event_id, "cancelling orphaned meeting");
                self.cancel_meeting(Some(meeting)).await;
                return Err(e.into());
            }
        };

        let when = templates::format_range(self.engine.schedule.tz, &span);
        let mail = templates::meeting_approved(
            &request.requester.email,
            &request.requester.name,
            &when,
            meeting.link.as_deref(),
            self.settings.approval_cc.as_deref(),
        );
        let mailed = self.notify(mail).await;
        Ok(AdminOutcome::Approved {
            span,
            meeting_link: meeting.link,
            mailed,
        })
    }
}
