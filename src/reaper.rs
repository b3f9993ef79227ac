use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::calendar::Calendar;
use crate::engine::{Engine, ReminderTarget, now_ms};
use crate::limits::*;
use crate::mail::templates;
use crate::model::Ms;
use crate::services::Services;

/// Drop expired flows and verification codes.
pub async fn sweep_expired(services: &Services, now: Ms) -> (usize, usize) {
    let flows = services.flows.purge_expired(now);
    let codes = services.engine.purge_expired_codes(now).await;
    if flows + codes > 0 {
        debug!(flows, codes, "purged expired verification state");
    }
    (flows, codes)
}

pub async fn run_reaper(services: Arc<Services>) {
    let mut interval = tokio::time::interval(Duration::from_secs(REAPER_INTERVAL_SECS));
    loop {
        interval.tick().await;
        sweep_expired(&services, now_ms()).await;
    }
}

/// Rewrite the WAL once enough appends have piled up since the last compaction.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(COMPACTOR_INTERVAL_SECS));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!(appends, "WAL compacted"),
            Err(e) => warn!("WAL compaction failed: {e}"),
        }
    }
}

/// Mail every due reminder, then mark it sent. A failed mail is retried on the
/// next sweep while the start is still inside the reminder window.
pub async fn send_due_reminders(services: &Services, now: Ms) -> usize {
    let tz = services.engine.schedule.tz;
    let mut sent = 0;
    for due in services.engine.due_reminders(now).await {
        let when = templates::format_range(tz, &due.span);
        let mail = templates::reminder(
            &due.requester.email,
            &due.requester.name,
            &when,
            due.meeting.as_ref().and_then(|m| m.link.as_deref()),
        );
        if !services.notify(mail).await {
            continue;
        }
        let marked = match due.target {
            ReminderTarget::Reservation(id) => services.engine.mark_reservation_reminded(id).await,
            ReminderTarget::Booking(id) => services.engine.mark_booking_reminded(id).await,
        };
        match marked {
            Ok(()) => {
                sent += 1;
                metrics::counter!(crate::observability::REMINDERS_SENT_TOTAL).increment(1);
            }
            Err(e) => warn!(target = ?due.target, "failed to record reminder: {e}"),
        }
    }
    sent
}

pub async fn run_reminders(services: Arc<Services>) {
    let mut interval = tokio::time::interval(Duration::from_secs(REMINDER_SWEEP_SECS));
    loop {
        interval.tick().await;
        let sent = send_due_reminders(&services, now_ms()).await;
        if sent > 0 {
            info!(sent, "reminders sent");
        }
    }
}

pub async fn run_credential_refresh(calendar: Arc<dyn Calendar>) {
    let mut interval = tokio::time::interval(Duration::from_secs(CREDENTIAL_SWEEP_SECS));
    loop {
        interval.tick().await;
        match calendar.refresh_credentials().await {
            Ok(true) => info!("calendar credentials refreshed"),
            Ok(false) => debug!("calendar credentials still fresh"),
            Err(e) => warn!("calendar credential refresh failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::NaiveDate;

    use super::*;
    use crate::admin::AdminCommand;
    use crate::engine::slots::to_ms;
    use crate::flows::FlowAction;
    use crate::model::*;
    use crate::services::fakes::services;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> Ms {
        let local = NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap();
        to_ms(chrono_tz::Asia::Seoul, local).unwrap()
    }

    fn requester() -> Requester {
        Requester {
            name: "Jung Hana".into(),
            email: "hana@example.com".into(),
            phone: "010-3333-4444".into(),
            purpose: "Check-in".into(),
        }
    }

    #[tokio::test]
    async fn reminder_goes_out_once() {
        let (services, _calendar, mailer) = services("meetslot_test_reaper", "remind.wal");
        let submitted = at(2024, 5, 20, 9, 0);
        let id = services
            .engine
            .submit_reservation(requester(), &["2024-06-01 14:00".into()], submitted)
            .await
            .unwrap();
        services
            .execute_admin(AdminCommand::ApproveReservation(id), submitted)
            .await
            .unwrap();

        // Too early.
        assert_eq!(send_due_reminders(&services, at(2024, 6, 1, 12, 0)).await, 0);

        let now = at(2024, 6, 1, 13, 0);
        assert_eq!(send_due_reminders(&services, now).await, 1);
        let mail = mailer.last_to("hana@example.com").unwrap();
        assert!(mail.subject.starts_with("[Reminder]"));
        assert!(mail.body.contains("https://meet.example/evt-1"));

        assert_eq!(send_due_reminders(&services, now + MINUTE_MS).await, 0);
    }

    #[tokio::test]
    async fn failed_reminder_is_retried() {
        let (services, _calendar, mailer) = services("meetslot_test_reaper", "retry.wal");
        let submitted = at(2024, 5, 20, 9, 0);
        let id = services
            .engine
            .submit_reservation(requester(), &["2024-06-02 11:00".into()], submitted)
            .await
            .unwrap();
        services
            .execute_admin(AdminCommand::ApproveReservation(id), submitted)
            .await
            .unwrap();

        mailer.fail.store(true, Ordering::SeqCst);
        assert_eq!(send_due_reminders(&services, at(2024, 6, 2, 10, 0)).await, 0);
        mailer.fail.store(false, Ordering::SeqCst);
        assert_eq!(send_due_reminders(&services, at(2024, 6, 2, 10, 1)).await, 1);
    }

    #[tokio::test]
    async fn sweep_drops_expired_flows_and_codes() {
        let (services, _calendar, _mailer) = services("meetslot_test_reaper", "sweep.wal");
        let now = at(2024, 5, 20, 9, 0);
        services
            .request_code(FlowAction::Registration, "hana@example.com", None, now)
            .await
            .unwrap();
        assert_eq!(sweep_expired(&services, now).await, (0, 0));
        assert_eq!(sweep_expired(&services, now + FLOW_TTL_MS).await, (1, 1));
        assert!(services.flows.is_empty());
    }

    #[tokio::test]
    async fn compactor_threshold_counts_appends() {
        let (services, _calendar, _mailer) = services("meetslot_test_reaper", "compact.wal");
        let now = at(2024, 5, 20, 9, 0);
        services.engine.create_link("Guest", now).await.unwrap();
        assert_eq!(services.engine.wal_appends_since_compact().await, 1);
        services.engine.compact_wal().await.unwrap();
        assert_eq!(services.engine.wal_appends_since_compact().await, 0);
        assert_eq!(services.engine.list_links().await.len(), 1);
    }
}
