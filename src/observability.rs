use std::net::SocketAddr;

use crate::sql::Command;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total commands executed. Labels: command, status.
pub const QUERIES_TOTAL: &str = "meetslot_queries_total";

/// Histogram: command latency in seconds. Labels: command.
pub const QUERY_DURATION_SECONDS: &str = "meetslot_query_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: active TCP connections.
pub const CONNECTIONS_ACTIVE: &str = "meetslot_connections_active";

/// Counter: total connections accepted.
pub const CONNECTIONS_TOTAL: &str = "meetslot_connections_total";

/// Counter: connections rejected due to limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "meetslot_connections_rejected_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "meetslot_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "meetslot_wal_flush_batch_size";

// ── Domain ──────────────────────────────────────────────────────

pub const RESERVATIONS_SUBMITTED_TOTAL: &str = "meetslot_reservations_submitted_total";

/// Counter: approvals recorded. Labels: kind (reservation, booking).
pub const APPROVALS_TOTAL: &str = "meetslot_approvals_total";

/// Counter: booking-link visits. Labels: outcome.
pub const LINK_ACCESSES_TOTAL: &str = "meetslot_link_accesses_total";

pub const CODES_ISSUED_TOTAL: &str = "meetslot_codes_issued_total";

/// Counter: outbound mail. Labels: status (sent, failed).
pub const MAILS_TOTAL: &str = "meetslot_mails_total";

/// Counter: calendar API calls. Labels: op, status.
pub const CALENDAR_CALLS_TOTAL: &str = "meetslot_calendar_calls_total";

pub const REMINDERS_SENT_TOTAL: &str = "meetslot_reminders_sent_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a Command variant to a short label for metrics.
pub fn command_label(cmd: &Command) -> &'static str {
    match cmd {
        Command::SelectAvailability { .. } => "select_availability",
        Command::SelectAvailabilityDays { .. } => "select_availability_days",
        Command::SelectReservations { .. } => "select_reservations",
        Command::SelectBookingLinks => "select_booking_links",
        Command::SelectLinkAccess { .. } => "select_link_access",
        Command::SelectLinkBookings => "select_link_bookings",
        Command::SelectWaitlist => "select_waitlist",
        Command::SelectInviteCode => "select_invite_code",
        Command::InsertReservation { .. } => "insert_reservation",
        Command::InsertReservationEdit { .. } => "insert_reservation_edit",
        Command::InsertReservationDecision { .. } => "insert_reservation_decision",
        Command::InsertFlow { .. } => "insert_flow",
        Command::InsertVerification { .. } => "insert_verification",
        Command::InsertWaitlist { .. } => "insert_waitlist",
        Command::InsertWaitlistDecision { .. } => "insert_waitlist_decision",
        Command::InsertBookingLink { .. } => "insert_booking_link",
        Command::InsertLinkState { .. } => "insert_link_state",
        Command::InsertLinkBooking { .. } => "insert_link_booking",
        Command::InsertBookingDecision { .. } => "insert_booking_decision",
        Command::InsertInviteCode { .. } => "insert_invite_code",
        Command::DeleteReservation { .. } => "delete_reservation",
    }
}
