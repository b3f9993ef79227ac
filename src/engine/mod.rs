mod bookings;
mod error;
mod invite;
mod ledger;
mod links;
mod queries;
mod reservations;
pub mod slots;
mod verification;
mod waitlist;
#[cfg(test)]
mod tests;

pub use error::EngineError;
pub(crate) use links::random_token;
pub use queries::{DueReminder, ReminderTarget};
pub use reservations::{ApprovalStart, parse_candidate, valid_email, validate_requester};

use std::hash::Hash;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::wal::Wal;

use ledger::Ledger;

pub type SharedReservation = Arc<RwLock<Reservation>>;
pub type SharedLink = Arc<RwLock<BookingLink>>;
pub type SharedBooking = Arc<RwLock<LinkBooking>>;
pub type SharedWaitlistEntry = Arc<RwLock<WaitlistEntry>>;
pub type SharedCodes = Arc<RwLock<Vec<VerificationCode>>>;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as Ms)
        .unwrap_or(0)
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type Pending = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the WAL. Blocks for the first append, drains whatever else is already
/// queued, writes the batch with a single fsync, then answers every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch: Vec<Pending> = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, &mut batch);
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<Pending>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("WAL flush failed for {} events: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[Pending]) -> io::Result<()> {
    let appended = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event));
    // Flush even after a failed append so half-written bytes don't leak
    // into the next batch; the whole batch is reported failed either way.
    let flushed = wal.flush_sync();
    appended.and(flushed)
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result =
                Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => {}
    }
}

// ── Row application ──────────────────────────────────────────────

/// Apply an event to a row the caller already holds exclusively.
/// Events that do not concern the row are ignored.
pub(crate) trait ApplyEvent {
    fn apply(&mut self, event: &Event);
}

impl ApplyEvent for Reservation {
    fn apply(&mut self, event: &Event) {
        match event {
            Event::ApprovalStarted { lease, .. } => self.approval = Some(*lease),
            Event::ApprovalAborted { lease_id, .. } => {
                if self.approval.is_some_and(|l| l.id == *lease_id) {
                    self.approval = None;
                }
            }
            Event::ReservationApproved { slot, meeting, .. } => {
                for c in &mut self.candidates {
                    c.status = CandidateStatus::Approved;
                }
                self.approved_slot = Some(*slot);
                self.meeting = Some(meeting.clone());
                self.approval = None;
            }
            Event::ReservationRejected { .. } => {
                for c in &mut self.candidates {
                    c.status = CandidateStatus::Rejected;
                }
                self.approved_slot = None;
                self.meeting = None;
                self.approval = None;
                self.reminder_sent = false;
            }
            Event::RequesterUpdated { requester, .. } => self.requester = requester.clone(),
            Event::ReservationReminded { .. } => self.reminder_sent = true,
            _ => {}
        }
    }
}

impl ApplyEvent for BookingLink {
    fn apply(&mut self, event: &Event) {
        match event {
            Event::LinkArmed { at, expires_at, .. } => {
                if self.first_accessed_at.is_none() {
                    self.first_accessed_at = Some(*at);
                    self.expires_at = Some(*expires_at);
                }
            }
            Event::LinkActiveSet { active, .. } => self.active = *active,
            Event::LinkBooked { .. } => self.used = true,
            _ => {}
        }
    }
}

impl ApplyEvent for LinkBooking {
    fn apply(&mut self, event: &Event) {
        match event {
            Event::BookingConfirmStarted { lease, .. } => self.approval = Some(*lease),
            Event::BookingConfirmAborted { lease_id, .. } => {
                if self.approval.is_some_and(|l| l.id == *lease_id) {
                    self.approval = None;
                }
            }
            Event::BookingConfirmed { meeting, .. } => {
                self.status = BookingStatus::Confirmed;
                self.meeting = Some(meeting.clone());
                self.approval = None;
            }
            Event::BookingRejected { .. } => {
                self.status = BookingStatus::Rejected;
                self.meeting = None;
                self.approval = None;
            }
            Event::BookingReminded { .. } => self.reminder_sent = true,
            _ => {}
        }
    }
}

impl ApplyEvent for WaitlistEntry {
    fn apply(&mut self, event: &Event) {
        match event {
            Event::WaitlistApproved { access_token, .. } => {
                self.status = WaitlistStatus::Approved;
                self.access_token = Some(access_token.clone());
            }
            Event::WaitlistRejected { .. } => {
                self.status = WaitlistStatus::Rejected;
                self.access_token = None;
            }
            _ => {}
        }
    }
}

impl ApplyEvent for Vec<VerificationCode> {
    fn apply(&mut self, event: &Event) {
        match event {
            Event::CodeIssued { code } => {
                self.push(code.clone());
                if self.len() > MAX_CODES_PER_EMAIL {
                    let excess = self.len() - MAX_CODES_PER_EMAIL;
                    self.drain(..excess);
                }
            }
            Event::CodeVerified { created_at, .. } => {
                if let Some(code) = self.iter_mut().rev().find(|c| c.created_at == *created_at) {
                    code.verified = true;
                }
            }
            _ => {}
        }
    }
}

/// During replay every row Arc is uniquely owned, so no lock is needed.
fn replay_row<K: Eq + Hash, T: ApplyEvent>(
    map: &DashMap<K, Arc<RwLock<T>>>,
    key: &K,
    event: &Event,
) {
    if let Some(mut entry) = map.get_mut(key)
        && let Some(lock) = Arc::get_mut(entry.value_mut())
    {
        lock.get_mut().apply(event);
    }
}

// ── Engine ───────────────────────────────────────────────────────

pub struct Engine {
    pub schedule: Schedule,
    pub(super) reservations: DashMap<Ulid, SharedReservation>,
    /// Phone → reservation ids, for status lookups.
    pub(super) by_phone: DashMap<String, Vec<Ulid>>,
    pub(super) links: DashMap<String, SharedLink>,
    pub(super) bookings: DashMap<Ulid, SharedBooking>,
    pub(super) waitlist: DashMap<Ulid, SharedWaitlistEntry>,
    pub(super) waitlist_by_email: DashMap<String, Ulid>,
    pub(super) waitlist_by_token: DashMap<String, Ulid>,
    pub(super) codes: DashMap<String, SharedCodes>,
    pub(super) invite: RwLock<Option<InviteCode>>,
    pub(super) ledger: Mutex<Ledger>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold this shared from entry to exit; compaction holds it
    /// exclusively so the snapshot and the log cannot drift apart.
    pub(super) write_gate: RwLock<()>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, schedule: Schedule) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut engine = Self {
            schedule,
            reservations: DashMap::new(),
            by_phone: DashMap::new(),
            links: DashMap::new(),
            bookings: DashMap::new(),
            waitlist: DashMap::new(),
            waitlist_by_email: DashMap::new(),
            waitlist_by_token: DashMap::new(),
            codes: DashMap::new(),
            invite: RwLock::new(None),
            ledger: Mutex::new(Ledger::default()),
            wal_tx,
            write_gate: RwLock::new(()),
        };
        let replayed = events.len();
        for event in events {
            engine.replay_event(event);
        }
        engine.rebuild_indexes();
        tracing::info!(
            path = %wal_path.display(),
            replayed,
            reservations = engine.reservations.len(),
            links = engine.links.len(),
            "engine ready"
        );
        Ok(engine)
    }

    fn replay_event(&mut self, event: Event) {
        match &event {
            Event::ReservationSubmitted { reservation } => {
                self.reservations
                    .insert(reservation.id, Arc::new(RwLock::new(reservation.clone())));
            }
            Event::ReservationDeleted { id } => {
                self.reservations.remove(id);
            }
            Event::ApprovalStarted { id, .. }
            | Event::ApprovalAborted { id, .. }
            | Event::ReservationApproved { id, .. }
            | Event::ReservationRejected { id }
            | Event::RequesterUpdated { id, .. }
            | Event::ReservationReminded { id } => replay_row(&self.reservations, id, &event),
            Event::LinkCreated { link } => {
                self.links
                    .insert(link.token.clone(), Arc::new(RwLock::new(link.clone())));
            }
            Event::LinkArmed { token, .. } | Event::LinkActiveSet { token, .. } => {
                replay_row(&self.links, token, &event)
            }
            Event::LinkBooked { booking } => {
                replay_row(&self.links, &booking.token, &event);
                self.bookings
                    .insert(booking.id, Arc::new(RwLock::new(booking.clone())));
            }
            Event::BookingConfirmStarted { id, .. }
            | Event::BookingConfirmAborted { id, .. }
            | Event::BookingConfirmed { id, .. }
            | Event::BookingRejected { id }
            | Event::BookingReminded { id } => replay_row(&self.bookings, id, &event),
            Event::WaitlistRegistered { entry } => {
                self.waitlist
                    .insert(entry.id, Arc::new(RwLock::new(entry.clone())));
            }
            Event::WaitlistApproved { id, .. } | Event::WaitlistRejected { id } => {
                replay_row(&self.waitlist, id, &event)
            }
            Event::CodeIssued { code } => {
                self.codes.entry(code.email.clone()).or_default();
                replay_row(&self.codes, &code.email, &event);
            }
            Event::CodeVerified { email, .. } => replay_row(&self.codes, email, &event),
            Event::InviteCodeSet { invite } => *self.invite.get_mut() = Some(invite.clone()),
        }
    }

    /// Derive lookup indexes and the claim ledger from the replayed rows.
    fn rebuild_indexes(&mut self) {
        let mut reservations: Vec<(Ms, Ulid, String)> = Vec::new();
        let ledger = self.ledger.get_mut();
        for entry in self.reservations.iter() {
            let Ok(r) = entry.value().try_read() else { continue };
            reservations.push((r.created_at, r.id, r.requester.phone.clone()));
            if let Some(slot) = r.approved_slot {
                ledger.restore(r.id, slot, None);
            } else if let Some(lease) = r.approval {
                ledger.restore(r.id, lease.span, Some(lease.started_at + APPROVAL_LEASE_MS));
            }
        }
        reservations.sort();
        for (_, id, phone) in reservations {
            self.by_phone.entry(phone).or_default().push(id);
        }
        for entry in self.bookings.iter() {
            let Ok(b) = entry.value().try_read() else { continue };
            if b.status == BookingStatus::Confirmed {
                ledger.restore(b.id, b.slot, None);
            } else if let Some(lease) = b.approval {
                ledger.restore(b.id, lease.span, Some(lease.started_at + APPROVAL_LEASE_MS));
            }
        }
        for entry in self.waitlist.iter() {
            let Ok(w) = entry.value().try_read() else { continue };
            self.waitlist_by_email.insert(w.email.clone(), w.id);
            if let Some(token) = &w.access_token {
                self.waitlist_by_token.insert(token.clone(), w.id);
            }
        }
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append, then apply to the row the caller holds the write lock on.
    pub(super) async fn persist_and_apply<T: ApplyEvent>(
        &self,
        row: &mut T,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        row.apply(event);
        Ok(())
    }

    pub fn get_reservation(&self, id: &Ulid) -> Option<SharedReservation> {
        self.reservations.get(id).map(|e| e.value().clone())
    }

    pub fn get_link(&self, token: &str) -> Option<SharedLink> {
        self.links.get(token).map(|e| e.value().clone())
    }

    pub fn get_booking(&self, id: &Ulid) -> Option<SharedBooking> {
        self.bookings.get(id).map(|e| e.value().clone())
    }

    pub fn get_waitlist_entry(&self, id: &Ulid) -> Option<SharedWaitlistEntry> {
        self.waitlist.get(id).map(|e| e.value().clone())
    }

    /// Snapshot current state as the minimal event list that recreates it,
    /// then hand it to the writer to swap in atomically.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.write_gate.write().await;
        let mut events = Vec::new();

        let reservations: Vec<SharedReservation> =
            self.reservations.iter().map(|e| e.value().clone()).collect();
        for row in reservations {
            let r = row.read().await;
            let mut submitted = r.clone();
            submitted.approval = None;
            events.push(Event::ReservationSubmitted { reservation: submitted });
            if let Some(lease) = r.approval {
                events.push(Event::ApprovalStarted { id: r.id, lease });
            }
        }
        let links: Vec<SharedLink> = self.links.iter().map(|e| e.value().clone()).collect();
        for row in links {
            events.push(Event::LinkCreated { link: row.read().await.clone() });
        }
        let bookings: Vec<SharedBooking> = self.bookings.iter().map(|e| e.value().clone()).collect();
        for row in bookings {
            let b = row.read().await;
            let mut booked = b.clone();
            booked.approval = None;
            // The link snapshot is already marked used; replaying this re-marks it.
            events.push(Event::LinkBooked { booking: booked });
            if let Some(lease) = b.approval {
                events.push(Event::BookingConfirmStarted { id: b.id, lease });
            }
        }
        let waitlist: Vec<SharedWaitlistEntry> =
            self.waitlist.iter().map(|e| e.value().clone()).collect();
        for row in waitlist {
            events.push(Event::WaitlistRegistered { entry: row.read().await.clone() });
        }
        let now = now_ms();
        let codes: Vec<SharedCodes> = self.codes.iter().map(|e| e.value().clone()).collect();
        for row in codes {
            for code in row.read().await.iter().filter(|c| c.expires_at > now) {
                events.push(Event::CodeIssued { code: code.clone() });
            }
        }
        if let Some(invite) = self.invite.read().await.clone() {
            events.push(Event::InviteCodeSet { invite });
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        tracing::info!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
