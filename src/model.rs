use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::*;

/// Unix milliseconds. The only instant type. Calendar math goes through the
/// schedule's fixed zone.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Edge-touching spans do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

// ── Schedule ─────────────────────────────────────────────────────

/// Local hours `[start, end)` during which slots may be offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllowedHours {
    pub start: u32,
    pub end: u32,
}

impl AllowedHours {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, hour: u32) -> bool {
        self.start <= hour && hour < self.end
    }
}

/// How long the meeting created on approval lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDuration {
    /// From the earliest candidate to the end of the latest one.
    SpanToLast,
    /// Fixed length starting at the earliest candidate.
    Fixed(Ms),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Schedule {
    pub tz: Tz,
    pub slot_length: Ms,
    pub allowed_hours: AllowedHours,
    pub approval_duration: ApprovalDuration,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            tz: chrono_tz::Asia::Seoul,
            slot_length: DEFAULT_SLOT_LENGTH_MS,
            allowed_hours: AllowedHours::new(10, 18),
            approval_duration: ApprovalDuration::SpanToLast,
        }
    }
}

// ── Slots ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub span: Span,
    pub available: bool,
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub purpose: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CandidateStatus {
    Pending,
    Approved,
    Rejected,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Pending => "pending",
            CandidateStatus::Approved => "approved",
            CandidateStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotCandidate {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: CandidateStatus,
}

impl SlotCandidate {
    pub fn pending(at: NaiveDateTime) -> Self {
        Self {
            date: at.date(),
            time: at.time(),
            status: CandidateStatus::Pending,
        }
    }

    pub fn local(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }
}

/// External calendar event created for an approved reservation or booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meeting {
    pub event_id: String,
    pub link: Option<String>,
}

/// Persisted intent to approve: the meeting span being requested and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLease {
    pub id: Ulid,
    pub span: Span,
    pub started_at: Ms,
}

impl ApprovalLease {
    pub fn is_live(&self, now: Ms) -> bool {
        now < self.started_at + APPROVAL_LEASE_MS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLabel {
    Pending,
    Approved,
    Rejected,
}

impl StatusLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLabel::Pending => "pending",
            StatusLabel::Approved => "approved",
            StatusLabel::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub requester: Requester,
    pub candidates: Vec<SlotCandidate>,
    pub approved_slot: Option<Span>,
    pub meeting: Option<Meeting>,
    pub approval: Option<ApprovalLease>,
    pub reminder_sent: bool,
    pub created_at: Ms,
}

impl Reservation {
    /// Derived on every read; never stored.
    pub fn status_label(&self) -> StatusLabel {
        if self.approved_slot.is_some() {
            return StatusLabel::Approved;
        }
        if !self.candidates.is_empty()
            && self
                .candidates
                .iter()
                .all(|c| c.status == CandidateStatus::Rejected)
        {
            return StatusLabel::Rejected;
        }
        StatusLabel::Pending
    }

    /// Candidate starts in chronological order.
    pub fn sorted_candidates(&self) -> Vec<NaiveDateTime> {
        let mut starts: Vec<NaiveDateTime> = self.candidates.iter().map(|c| c.local()).collect();
        starts.sort();
        starts
    }
}

/// What the calendar collaborator is asked to create on approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingRequest {
    pub owner: Ulid,
    pub lease: Ulid,
    pub requester: Requester,
    pub span: Span,
}

// ── Booking links ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingLink {
    pub token: String,
    pub name: String,
    pub created_at: Ms,
    pub first_accessed_at: Option<Ms>,
    pub expires_at: Option<Ms>,
    pub used: bool,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Created,
    Armed { expires_at: Ms },
    Expired,
    Used,
    Revoked,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Created => "created",
            LinkState::Armed { .. } => "armed",
            LinkState::Expired => "expired",
            LinkState::Used => "used",
            LinkState::Revoked => "revoked",
        }
    }
}

impl BookingLink {
    pub fn new(token: String, name: String, created_at: Ms) -> Self {
        Self {
            token,
            name,
            created_at,
            first_accessed_at: None,
            expires_at: None,
            used: false,
            active: true,
        }
    }

    /// Lifecycle state as seen at `now`. `used` wins over revocation.
    pub fn state(&self, now: Ms) -> LinkState {
        if self.used {
            return LinkState::Used;
        }
        if !self.active {
            return LinkState::Revoked;
        }
        match self.expires_at {
            Some(expires_at) if now >= expires_at => LinkState::Expired,
            Some(expires_at) => LinkState::Armed { expires_at },
            None if now >= self.created_at + LINK_UNACCESSED_TTL_MS => LinkState::Expired,
            None => LinkState::Created,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Rejected => "rejected",
        }
    }
}

/// A single-slot selection made through a booking link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkBooking {
    pub id: Ulid,
    pub token: String,
    pub requester: Requester,
    pub slot: Span,
    pub status: BookingStatus,
    pub meeting: Option<Meeting>,
    pub approval: Option<ApprovalLease>,
    pub reminder_sent: bool,
    pub created_at: Ms,
}

// ── Verification ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationCode {
    pub email: String,
    pub code: String,
    pub expires_at: Ms,
    pub created_at: Ms,
    pub verified: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    Verified,
    Expired,
    Mismatch,
    NotFound,
}

// ── Waitlist ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitlistStatus {
    Pending,
    Approved,
    Rejected,
}

impl WaitlistStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitlistStatus::Pending => "pending",
            WaitlistStatus::Approved => "approved",
            WaitlistStatus::Rejected => "rejected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: Ulid,
    pub email: String,
    pub status: WaitlistStatus,
    pub access_token: Option<String>,
    pub created_at: Ms,
}

// ── Invite code ──────────────────────────────────────────────────

/// The shared pass the host hands out. At most one is active; setting a new
/// one retires the old.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteCode {
    pub code: String,
    pub set_at: Ms,
}

/// The event types, flat, one per state transition. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationSubmitted {
        reservation: Reservation,
    },
    ApprovalStarted {
        id: Ulid,
        lease: ApprovalLease,
    },
    ApprovalAborted {
        id: Ulid,
        lease_id: Ulid,
    },
    ReservationApproved {
        id: Ulid,
        slot: Span,
        meeting: Meeting,
    },
    ReservationRejected {
        id: Ulid,
    },
    ReservationDeleted {
        id: Ulid,
    },
    RequesterUpdated {
        id: Ulid,
        requester: Requester,
    },
    ReservationReminded {
        id: Ulid,
    },
    LinkCreated {
        link: BookingLink,
    },
    LinkArmed {
        token: String,
        at: Ms,
        expires_at: Ms,
    },
    LinkActiveSet {
        token: String,
        active: bool,
    },
    /// Consumes the link and records the selection in one step.
    LinkBooked {
        booking: LinkBooking,
    },
    BookingConfirmStarted {
        id: Ulid,
        lease: ApprovalLease,
    },
    BookingConfirmAborted {
        id: Ulid,
        lease_id: Ulid,
    },
    BookingConfirmed {
        id: Ulid,
        meeting: Meeting,
    },
    BookingRejected {
        id: Ulid,
    },
    BookingReminded {
        id: Ulid,
    },
    WaitlistRegistered {
        entry: WaitlistEntry,
    },
    WaitlistApproved {
        id: Ulid,
        access_token: String,
    },
    WaitlistRejected {
        id: Ulid,
    },
    CodeIssued {
        code: VerificationCode,
    },
    CodeVerified {
        email: String,
        created_at: Ms,
    },
    InviteCodeSet {
        invite: InviteCode,
    },
}
