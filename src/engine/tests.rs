use super::*;
use super::slots::to_ms;
use crate::limits::*;
use crate::model::*;

use chrono::NaiveDate;

const M: Ms = MINUTE_MS;
const H: Ms = HOUR_MS;

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("meetslot_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn engine(name: &str) -> Engine {
    Engine::new(test_wal_path(name), Schedule::default()).unwrap()
}

/// Seoul wall-clock time as Unix ms.
fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> Ms {
    let local = NaiveDate::from_ymd_opt(y, mo, d)
        .unwrap()
        .and_hms_opt(h, mi, 0)
        .unwrap();
    to_ms(chrono_tz::Asia::Seoul, local).unwrap()
}

fn requester(phone: &str) -> Requester {
    Requester {
        name: "Park Jisoo".into(),
        email: "jisoo@example.com".into(),
        phone: phone.into(),
        purpose: "Consulting call".into(),
    }
}

fn slots(raw: &[&str]) -> Vec<String> {
    raw.iter().map(|s| s.to_string()).collect()
}

fn meeting(event_id: &str) -> Meeting {
    Meeting {
        event_id: event_id.into(),
        link: Some(format!("https://meet.example/{event_id}")),
    }
}

async fn approve(engine: &Engine, id: Ulid, now: Ms, event_id: &str) -> Span {
    match engine.begin_approval(id, now).await.unwrap() {
        ApprovalStart::Started(request) => engine
            .complete_approval(id, request.lease, meeting(event_id))
            .await
            .unwrap(),
        other => panic!("expected Started, got {other:?}"),
    }
}

// ── Reservations ─────────────────────────────────────────

#[tokio::test]
async fn engine_approve_three_candidates() {
    let engine = engine("approve_three.wal");
    let now = at(2024, 5, 20, 9, 0);
    let id = engine
        .submit_reservation(
            requester("010-1111-2222"),
            &slots(&["2024-06-01T10:30:00", "2024-06-01T10:00:00", "2024-06-01T11:00:00"]),
            now,
        )
        .await
        .unwrap();
    assert_eq!(engine.status_of(id).await.unwrap(), StatusLabel::Pending);

    let span = approve(&engine, id, now, "evt-1").await;
    assert_eq!(span.start, at(2024, 6, 1, 10, 0));
    assert_eq!(span.end, at(2024, 6, 1, 11, 30));

    let row = engine.get_reservation(&id).unwrap();
    let r = row.read().await;
    assert_eq!(r.approved_slot, Some(span));
    assert!(r.candidates.iter().all(|c| c.status == CandidateStatus::Approved));
    assert_eq!(r.meeting, Some(meeting("evt-1")));
    assert_eq!(r.status_label(), StatusLabel::Approved);
}

#[tokio::test]
async fn engine_fixed_duration_policy() {
    let schedule = Schedule {
        approval_duration: ApprovalDuration::Fixed(30 * M),
        ..Schedule::default()
    };
    let engine = Engine::new(test_wal_path("fixed_duration.wal"), schedule).unwrap();
    let id = engine
        .submit_reservation(
            requester("010-1111-2222"),
            &slots(&["2024-06-01T10:00", "2024-06-01T14:00"]),
            0,
        )
        .await
        .unwrap();
    let span = approve(&engine, id, 0, "evt").await;
    assert_eq!(span, Span::new(at(2024, 6, 1, 10, 0), at(2024, 6, 1, 10, 30)));
}

#[tokio::test]
async fn engine_approve_is_idempotent() {
    let engine = engine("approve_idempotent.wal");
    let id = engine
        .submit_reservation(requester("010-1"), &slots(&["2024-06-01T10:00"]), 0)
        .await
        .unwrap();
    let span = approve(&engine, id, 0, "evt").await;

    assert_eq!(
        engine.begin_approval(id, 1).await.unwrap(),
        ApprovalStart::AlreadyApproved(span)
    );
    let row = engine.get_reservation(&id).unwrap();
    assert_eq!(row.read().await.meeting, Some(meeting("evt")));
}

#[tokio::test]
async fn engine_concurrent_approval_starts_once() {
    let engine = Arc::new(engine("approve_concurrent.wal"));
    let id = engine
        .submit_reservation(requester("010-1"), &slots(&["2024-06-01T10:00"]), 0)
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move { engine.begin_approval(id, 0).await }));
    }
    let mut started = 0;
    for h in handles {
        match h.await.unwrap().unwrap() {
            ApprovalStart::Started(_) => started += 1,
            ApprovalStart::InProgress => {}
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(started, 1);
}

#[tokio::test]
async fn engine_reject_approve_sequences() {
    let engine = engine("reject_approve.wal");
    let id = engine
        .submit_reservation(
            requester("010-1"),
            &slots(&["2024-06-01T10:00", "2024-06-01T10:30"]),
            0,
        )
        .await
        .unwrap();

    assert_eq!(engine.reject_reservation(id).await.unwrap(), None);
    assert_eq!(engine.status_of(id).await.unwrap(), StatusLabel::Rejected);
    // Idempotent.
    assert_eq!(engine.reject_reservation(id).await.unwrap(), None);

    approve(&engine, id, 0, "evt-a").await;
    assert_eq!(engine.status_of(id).await.unwrap(), StatusLabel::Approved);

    let cancelled = engine.reject_reservation(id).await.unwrap();
    assert_eq!(cancelled, Some(meeting("evt-a")));
    assert_eq!(engine.status_of(id).await.unwrap(), StatusLabel::Rejected);
    let row = engine.get_reservation(&id).unwrap();
    assert_eq!(row.read().await.approved_slot, None);
}

#[tokio::test]
async fn engine_reject_during_approval_supersedes_it() {
    let engine = engine("reject_supersedes.wal");
    let id = engine
        .submit_reservation(requester("010-1"), &slots(&["2024-06-01T10:00"]), 0)
        .await
        .unwrap();
    let ApprovalStart::Started(request) = engine.begin_approval(id, 0).await.unwrap() else {
        panic!("expected Started");
    };
    engine.reject_reservation(id).await.unwrap();

    assert_eq!(
        engine.complete_approval(id, request.lease, meeting("late")).await,
        Err(EngineError::Superseded(id))
    );
    assert_eq!(engine.status_of(id).await.unwrap(), StatusLabel::Rejected);
}

#[tokio::test]
async fn engine_abort_leaves_reservation_pending() {
    let engine = engine("abort_pending.wal");
    let a = engine
        .submit_reservation(requester("010-1"), &slots(&["2024-06-01T10:00"]), 0)
        .await
        .unwrap();
    let b = engine
        .submit_reservation(requester("010-2"), &slots(&["2024-06-01T10:00"]), 0)
        .await
        .unwrap();

    let ApprovalStart::Started(request) = engine.begin_approval(a, 0).await.unwrap() else {
        panic!("expected Started");
    };
    assert_eq!(
        engine.begin_approval(b, 0).await,
        Err(EngineError::SlotTaken(a))
    );
    engine.abort_approval(a, request.lease).await.unwrap();
    assert_eq!(engine.status_of(a).await.unwrap(), StatusLabel::Pending);

    // The claim went away with the abort.
    approve(&engine, b, 0, "evt-b").await;
}

#[tokio::test]
async fn engine_overlapping_approvals_conflict() {
    let engine = engine("overlap_conflict.wal");
    let a = engine
        .submit_reservation(
            requester("010-1"),
            &slots(&["2024-06-01T10:00", "2024-06-01T11:00"]),
            0,
        )
        .await
        .unwrap();
    let b = engine
        .submit_reservation(requester("010-2"), &slots(&["2024-06-01T11:00"]), 0)
        .await
        .unwrap();
    let c = engine
        .submit_reservation(requester("010-3"), &slots(&["2024-06-01T11:30"]), 0)
        .await
        .unwrap();

    approve(&engine, a, 0, "evt-a").await;
    assert_eq!(engine.begin_approval(b, 0).await, Err(EngineError::SlotTaken(a)));
    // Edge-touching is fine: a ends at 11:30.
    approve(&engine, c, 0, "evt-c").await;

    // Rejecting a frees its time.
    engine.reject_reservation(a).await.unwrap();
    approve(&engine, b, 0, "evt-b").await;
}

#[tokio::test]
async fn engine_stale_lease_can_be_retaken() {
    let engine = engine("stale_lease.wal");
    let id = engine
        .submit_reservation(requester("010-1"), &slots(&["2024-06-01T10:00"]), 0)
        .await
        .unwrap();
    let ApprovalStart::Started(first) = engine.begin_approval(id, 0).await.unwrap() else {
        panic!("expected Started");
    };
    assert_eq!(
        engine.begin_approval(id, APPROVAL_LEASE_MS - 1).await.unwrap(),
        ApprovalStart::InProgress
    );
    let ApprovalStart::Started(second) =
        engine.begin_approval(id, APPROVAL_LEASE_MS).await.unwrap()
    else {
        panic!("expected Started");
    };
    assert_ne!(first.lease, second.lease);
    assert_eq!(
        engine.complete_approval(id, first.lease, meeting("old")).await,
        Err(EngineError::Superseded(id))
    );
    engine
        .complete_approval(id, second.lease, meeting("new"))
        .await
        .unwrap();
}

#[tokio::test]
async fn engine_submit_reports_all_errors() {
    let engine = engine("submit_errors.wal");
    let bad = Requester {
        name: "J0hn".into(),
        email: "john".into(),
        phone: "010-1".into(),
        purpose: "   ".into(),
    };
    let Err(EngineError::Validation(errors)) = engine
        .submit_reservation(bad, &slots(&["tomorrow"]), 0)
        .await
    else {
        panic!("expected validation failure");
    };
    assert_eq!(errors.len(), 4, "{errors:?}");
    assert!(engine.list_reservations().await.is_empty());
}

#[tokio::test]
async fn engine_delete_is_idempotent() {
    let engine = engine("delete_idempotent.wal");
    let id = engine
        .submit_reservation(requester("010-9"), &slots(&["2024-06-01T10:00"]), 0)
        .await
        .unwrap();
    approve(&engine, id, 0, "evt").await;

    assert_eq!(engine.delete_reservation(id).await.unwrap(), Some(meeting("evt")));
    assert_eq!(engine.delete_reservation(id).await.unwrap(), None);
    assert!(engine.lookup_by_phone("010-9").await.is_none());
    assert!(matches!(engine.status_of(id).await, Err(EngineError::NotFound(_))));
    assert!(
        engine
            .approved_spans(&Span::new(0, MAX_VALID_TIMESTAMP_MS))
            .await
            .is_empty()
    );
}

#[tokio::test]
async fn engine_lookup_by_phone_prefers_newest() {
    let engine = engine("lookup_phone.wal");
    let older = engine
        .submit_reservation(requester("010-5555"), &slots(&["2024-06-01T10:00"]), 100)
        .await
        .unwrap();
    let newer = engine
        .submit_reservation(requester("010-5555"), &slots(&["2024-06-02T10:00"]), 200)
        .await
        .unwrap();
    assert_ne!(older, newer);
    assert_eq!(engine.lookup_by_phone("010-5555").await.unwrap().id, newer);
    assert!(engine.lookup_by_phone("010-0000").await.is_none());
}

#[tokio::test]
async fn engine_update_requester_moves_phone_index() {
    let engine = engine("update_requester.wal");
    let id = engine
        .submit_reservation(requester("010-1"), &slots(&["2024-06-01T10:00"]), 0)
        .await
        .unwrap();
    engine.update_requester(id, requester("010-2")).await.unwrap();
    assert!(engine.lookup_by_phone("010-1").await.is_none());
    assert_eq!(engine.lookup_by_phone("010-2").await.unwrap().id, id);

    let mut bad = requester("010-2");
    bad.email = "nope".into();
    assert!(matches!(
        engine.update_requester(id, bad).await,
        Err(EngineError::Validation(_))
    ));
}

// ── Booking links ────────────────────────────────────────

#[tokio::test]
async fn engine_link_access_window() {
    let engine = engine("link_window.wal");
    let t0 = at(2024, 6, 1, 9, 0);
    let token = engine.create_link("Kim", t0).await.unwrap();
    assert_eq!(token.len(), LINK_TOKEN_LEN);
    assert_eq!(engine.link_state(&token, t0).await, Some(LinkState::Created));

    let expires = engine.access_link(&token, t0 + H).await.unwrap();
    assert_eq!(expires, t0 + H + 30 * M);
    assert_eq!(engine.access_link(&token, t0 + H + 10 * M).await.unwrap(), expires);
    assert_eq!(
        engine.access_link(&token, t0 + H + 40 * M).await,
        Err(EngineError::Expired)
    );
}

#[tokio::test]
async fn engine_unopened_link_expires_after_a_week() {
    let engine = engine("link_week.wal");
    let token = engine.create_link("Lee", 0).await.unwrap();
    assert_eq!(
        engine.access_link(&token, LINK_UNACCESSED_TTL_MS).await,
        Err(EngineError::Expired)
    );
    assert!(matches!(
        engine.access_link("missing", 0).await,
        Err(EngineError::NotFound(_))
    ));
}

#[tokio::test]
async fn engine_concurrent_first_access_arms_once() {
    let engine = Arc::new(engine("link_race.wal"));
    let token = engine.create_link("Choi", 0).await.unwrap();

    let mut handles = Vec::new();
    for i in 0..16 {
        let engine = engine.clone();
        let token = token.clone();
        handles.push(tokio::spawn(async move {
            engine.access_link(&token, 1_000 + i).await
        }));
    }
    let mut deadlines = Vec::new();
    for h in handles {
        deadlines.push(h.await.unwrap().unwrap());
    }
    deadlines.dedup();
    assert_eq!(deadlines.len(), 1);

    let row = engine.get_link(&token).unwrap();
    let link = row.read().await;
    assert_eq!(link.expires_at, Some(deadlines[0]));
    assert_eq!(link.first_accessed_at.map(|t| t + LINK_ACCESS_WINDOW_MS), link.expires_at);
}

#[tokio::test]
async fn engine_revoked_link_and_reenable() {
    let engine = engine("link_revoke.wal");
    let token = engine.create_link("Han", 0).await.unwrap();
    engine.set_link_active(&token, false).await.unwrap();
    assert_eq!(engine.access_link(&token, 1).await, Err(EngineError::Revoked));
    engine.set_link_active(&token, true).await.unwrap();
    assert!(engine.access_link(&token, 2).await.is_ok());
}

#[tokio::test]
async fn engine_booking_consumes_link() {
    let engine = engine("link_booking.wal");
    let now = at(2024, 6, 1, 9, 0);
    let token = engine.create_link("Yoon", now).await.unwrap();
    engine.access_link(&token, now).await.unwrap();

    let slot_start = NaiveDate::from_ymd_opt(2024, 6, 3)
        .unwrap()
        .and_hms_opt(14, 0, 0)
        .unwrap();
    let id = engine
        .book_via_link(&token, requester("010-7"), slot_start, now + M)
        .await
        .unwrap();
    assert_eq!(
        engine.access_link(&token, now + 2 * M).await,
        Err(EngineError::AlreadyUsed)
    );
    assert_eq!(
        engine
            .book_via_link(&token, requester("010-7"), slot_start, now + 2 * M)
            .await,
        Err(EngineError::AlreadyUsed)
    );
    // Used wins over revocation.
    engine.set_link_active(&token, false).await.unwrap();
    assert_eq!(engine.link_state(&token, now).await, Some(LinkState::Used));

    let row = engine.get_booking(&id).unwrap();
    let booking = row.read().await;
    assert_eq!(booking.slot, Span::new(at(2024, 6, 3, 14, 0), at(2024, 6, 3, 14, 30)));
    assert_eq!(booking.status, BookingStatus::Pending);
}

#[tokio::test]
async fn engine_booking_requires_open_link_and_valid_slot() {
    let engine = engine("link_booking_invalid.wal");
    let now = at(2024, 6, 1, 9, 0);
    let token = engine.create_link("Jang", now).await.unwrap();
    let slot_start = NaiveDate::from_ymd_opt(2024, 6, 3)
        .unwrap()
        .and_hms_opt(14, 0, 0)
        .unwrap();
    assert!(matches!(
        engine.book_via_link(&token, requester("010-7"), slot_start, now).await,
        Err(EngineError::Validation(_))
    ));

    engine.access_link(&token, now).await.unwrap();
    let too_late = slot_start.date().and_hms_opt(20, 0, 0).unwrap();
    assert!(matches!(
        engine.book_via_link(&token, requester("010-7"), too_late, now).await,
        Err(EngineError::Validation(_))
    ));
    assert_eq!(engine.link_state(&token, now).await.map(|s| s.as_str()), Some("armed"));
}

#[tokio::test]
async fn engine_confirm_and_reject_booking() {
    let engine = engine("booking_confirm.wal");
    let now = at(2024, 6, 1, 9, 0);
    let token = engine.create_link("Seo", now).await.unwrap();
    engine.access_link(&token, now).await.unwrap();
    let slot_start = NaiveDate::from_ymd_opt(2024, 6, 3)
        .unwrap()
        .and_hms_opt(10, 0, 0)
        .unwrap();
    let id = engine
        .book_via_link(&token, requester("010-8"), slot_start, now)
        .await
        .unwrap();

    let ApprovalStart::Started(request) = engine.begin_confirm(id, now).await.unwrap() else {
        panic!("expected Started");
    };
    assert_eq!(request.span.duration_ms(), 30 * M);
    let span = engine
        .complete_confirm(id, request.lease, meeting("bk"))
        .await
        .unwrap();
    assert_eq!(
        engine.begin_confirm(id, now).await.unwrap(),
        ApprovalStart::AlreadyApproved(span)
    );
    assert_eq!(engine.approved_spans(&span).await, vec![span]);

    assert_eq!(engine.reject_booking(id).await.unwrap(), Some(meeting("bk")));
    assert!(engine.approved_spans(&span).await.is_empty());
    assert_eq!(engine.reject_booking(id).await.unwrap(), None);
}

// ── Verification ─────────────────────────────────────────

#[tokio::test]
async fn engine_verification_gate() {
    let engine = engine("verification.wal");
    let email = "gate@example.com";
    let code = engine.issue_code(email, 0).await.unwrap();
    assert_eq!(code.len(), CODE_DIGITS as usize);
    assert!(code.chars().all(|c| c.is_ascii_digit()));

    let wrong = if code == "000000" { "111111" } else { "000000" };
    assert_eq!(engine.verify_code(email, wrong, M).await.unwrap(), Verification::Mismatch);
    assert_eq!(engine.verify_code(email, &code, 2 * M).await.unwrap(), Verification::Verified);
    assert_eq!(engine.verify_code(email, &code, 3 * M).await.unwrap(), Verification::Verified);
    assert_eq!(
        engine.verify_code(email, &code, CODE_TTL_MS + 1).await.unwrap(),
        Verification::Expired
    );
    assert_eq!(
        engine.verify_code("other@example.com", &code, 0).await.unwrap(),
        Verification::NotFound
    );
}

#[tokio::test]
async fn engine_only_newest_code_counts() {
    let engine = engine("verification_newest.wal");
    let email = "twice@example.com";
    let first = engine.issue_code(email, 0).await.unwrap();
    let second = engine.issue_code(email, 10).await.unwrap();
    if first != second {
        assert_eq!(engine.verify_code(email, &first, 20).await.unwrap(), Verification::Mismatch);
    }
    assert_eq!(engine.verify_code(email, &second, 20).await.unwrap(), Verification::Verified);

    let codes = engine.codes.get(email).unwrap().value().clone();
    let codes = codes.read().await;
    assert_eq!(codes.len(), 2);
    assert!(!codes[0].verified);
    assert!(codes[1].verified);
}

#[tokio::test]
async fn engine_purge_expired_codes() {
    let engine = engine("verification_purge.wal");
    engine.issue_code("a@example.com", 0).await.unwrap();
    engine.issue_code("b@example.com", 10 * M).await.unwrap();
    assert_eq!(engine.purge_expired_codes(CODE_TTL_MS + 1).await, 1);
    assert!(engine.codes.get("a@example.com").is_none());
    assert!(engine.codes.get("b@example.com").is_some());

    // A code issued after the purge lands in a live row.
    engine.issue_code("a@example.com", 20 * M).await.unwrap();
    let row = engine.codes.get("a@example.com").unwrap().value().clone();
    assert_eq!(row.read().await.len(), 1);
}

// ── Waitlist ─────────────────────────────────────────────

#[tokio::test]
async fn engine_waitlist_lifecycle() {
    let engine = engine("waitlist.wal");
    let id = engine.register_waitlist("wait@example.com", 0).await.unwrap();
    assert_eq!(
        engine.register_waitlist("wait@example.com", 1).await,
        Err(EngineError::AlreadyExists("wait@example.com".into()))
    );

    let approved = engine.approve_waitlist(id).await.unwrap();
    let token = approved.access_token.clone().unwrap();
    assert_eq!(token.len(), ACCESS_TOKEN_LEN);
    let again = engine.approve_waitlist(id).await.unwrap();
    assert_eq!(again.access_token, Some(token.clone()));
    assert_eq!(engine.waitlist_by_token(&token).await.unwrap().id, id);

    engine.reject_waitlist(id).await.unwrap();
    assert!(engine.waitlist_by_token(&token).await.is_none());
    let listed = engine.list_waitlist().await;
    assert_eq!(listed[0].status, WaitlistStatus::Rejected);
}

// ── Reminders & availability ─────────────────────────────

#[tokio::test]
async fn engine_due_reminders_window() {
    let engine = engine("reminders.wal");
    let id = engine
        .submit_reservation(requester("010-1"), &slots(&["2024-06-01T10:00"]), 0)
        .await
        .unwrap();
    approve(&engine, id, 0, "evt").await;
    let start = at(2024, 6, 1, 10, 0);

    assert!(engine.due_reminders(start - 70 * M).await.is_empty());
    let due = engine.due_reminders(start - 60 * M).await;
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].target, ReminderTarget::Reservation(id));
    assert_eq!(due[0].meeting, Some(meeting("evt")));

    engine.mark_reservation_reminded(id).await.unwrap();
    assert!(engine.due_reminders(start - 60 * M).await.is_empty());
}

#[tokio::test]
async fn engine_availability_counts_approved_meetings_as_busy() {
    let engine = engine("availability.wal");
    let id = engine
        .submit_reservation(requester("010-1"), &slots(&["2024-06-01T13:00"]), 0)
        .await
        .unwrap();
    approve(&engine, id, 0, "evt").await;

    let window = Span::new(at(2024, 6, 1, 10, 0), at(2024, 6, 1, 18, 0));
    let busy = [Span::new(at(2024, 6, 1, 12, 0), at(2024, 6, 1, 12, 30))];
    let grid = engine.availability(&window, &busy).await.unwrap();
    assert_eq!(grid.len(), 16);
    let taken: Vec<Ms> = grid.iter().filter(|s| !s.available).map(|s| s.span.start).collect();
    assert_eq!(taken, vec![at(2024, 6, 1, 12, 0), at(2024, 6, 1, 13, 0)]);
}

// ── Durability ───────────────────────────────────────────

#[tokio::test]
async fn engine_wal_replay() {
    let path = test_wal_path("replay.wal");
    let (approved, pending, token, waiting) = {
        let engine = Engine::new(path.clone(), Schedule::default()).unwrap();
        let approved = engine
            .submit_reservation(requester("010-1"), &slots(&["2024-06-01T10:00"]), 0)
            .await
            .unwrap();
        approve(&engine, approved, 0, "evt").await;
        let pending = engine
            .submit_reservation(requester("010-2"), &slots(&["2024-06-01T10:00"]), 1)
            .await
            .unwrap();
        let token = engine.create_link("Replay", 0).await.unwrap();
        let expires = engine.access_link(&token, 5).await.unwrap();
        assert_eq!(expires, 5 + LINK_ACCESS_WINDOW_MS);
        let waiting = engine.register_waitlist("replay@example.com", 0).await.unwrap();
        engine.approve_waitlist(waiting).await.unwrap();
        (approved, pending, token, waiting)
    };

    let engine = Engine::new(path, Schedule::default()).unwrap();
    assert_eq!(engine.status_of(approved).await.unwrap(), StatusLabel::Approved);
    assert_eq!(engine.status_of(pending).await.unwrap(), StatusLabel::Pending);
    assert_eq!(engine.lookup_by_phone("010-2").await.unwrap().id, pending);
    // The approved span is still claimed.
    assert_eq!(
        engine.begin_approval(pending, 0).await,
        Err(EngineError::SlotTaken(approved))
    );
    assert_eq!(engine.access_link(&token, 100).await.unwrap(), 5 + LINK_ACCESS_WINDOW_MS);
    let entry = engine.get_waitlist_entry(&waiting).unwrap().read().await.clone();
    let access_token = entry.access_token.unwrap();
    assert_eq!(engine.waitlist_by_token(&access_token).await.unwrap().id, waiting);
}

#[tokio::test]
async fn engine_in_flight_approval_survives_restart() {
    let path = test_wal_path("replay_lease.wal");
    let (id, lease) = {
        let engine = Engine::new(path.clone(), Schedule::default()).unwrap();
        let id = engine
            .submit_reservation(requester("010-1"), &slots(&["2024-06-01T10:00"]), 0)
            .await
            .unwrap();
        let ApprovalStart::Started(request) = engine.begin_approval(id, 0).await.unwrap() else {
            panic!("expected Started");
        };
        (id, request.lease)
    };

    let engine = Engine::new(path, Schedule::default()).unwrap();
    assert_eq!(engine.begin_approval(id, 1).await.unwrap(), ApprovalStart::InProgress);
    engine.complete_approval(id, lease, meeting("evt")).await.unwrap();
    assert_eq!(engine.status_of(id).await.unwrap(), StatusLabel::Approved);
}

#[tokio::test]
async fn engine_compaction_survives_restart() {
    let path = test_wal_path("compact_restart.wal");
    let (kept, link_token, booking) = {
        let engine = Engine::new(path.clone(), Schedule::default()).unwrap();
        let mut ids = Vec::new();
        for i in 0..10 {
            let id = engine
                .submit_reservation(
                    requester(&format!("010-{i}")),
                    &slots(&["2024-06-01T10:00"]),
                    i,
                )
                .await
                .unwrap();
            ids.push(id);
        }
        for id in &ids[1..] {
            engine.delete_reservation(*id).await.unwrap();
        }
        approve(&engine, ids[0], 0, "evt").await;

        let now = at(2024, 6, 1, 9, 0);
        let token = engine.create_link("Compact", now).await.unwrap();
        engine.access_link(&token, now).await.unwrap();
        let slot = NaiveDate::from_ymd_opt(2024, 6, 2)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap();
        let booking = engine
            .book_via_link(&token, requester("010-99"), slot, now)
            .await
            .unwrap();

        let size_before = std::fs::metadata(&path).unwrap().len();
        assert!(engine.wal_appends_since_compact().await > 0);
        engine.compact_wal().await.unwrap();
        let size_after = std::fs::metadata(&path).unwrap().len();
        assert!(size_after < size_before, "{size_after} >= {size_before}");
        assert_eq!(engine.wal_appends_since_compact().await, 0);
        (ids[0], token, booking)
    };

    let engine = Engine::new(path, Schedule::default()).unwrap();
    assert_eq!(engine.list_reservations().await.len(), 1);
    assert_eq!(engine.status_of(kept).await.unwrap(), StatusLabel::Approved);
    assert_eq!(engine.link_state(&link_token, 0).await, Some(LinkState::Used));
    assert_eq!(
        engine.get_booking(&booking).unwrap().read().await.status,
        BookingStatus::Pending
    );
}

// ── Invite code ──────────────────────────────────────────

#[tokio::test]
async fn engine_invite_code_single_active() {
    let path = test_wal_path("invite.wal");
    {
        let engine = Engine::new(path.clone(), Schedule::default()).unwrap();
        assert!(engine.active_invite_code().await.is_none());
        assert!(!engine.invite_code_matches("spring").await);

        engine.set_invite_code(" spring ", 100).await.unwrap();
        assert!(engine.invite_code_matches("spring").await);
        let again = engine.set_invite_code("spring", 200).await.unwrap();
        assert_eq!(again.set_at, 100);

        engine.set_invite_code("summer", 300).await.unwrap();
        assert!(!engine.invite_code_matches("spring").await);
        assert!(engine.invite_code_matches("summer").await);

        for bad in ["", "   ", "two words", &"x".repeat(MAX_INVITE_CODE_LEN + 1)] {
            assert!(matches!(
                engine.set_invite_code(bad, 400).await,
                Err(EngineError::Validation(_))
            ));
        }
    }

    let engine = Engine::new(path.clone(), Schedule::default()).unwrap();
    let active = engine.active_invite_code().await.unwrap();
    assert_eq!((active.code.as_str(), active.set_at), ("summer", 300));

    engine.compact_wal().await.unwrap();
    drop(engine);
    let engine = Engine::new(path, Schedule::default()).unwrap();
    assert!(engine.invite_code_matches("summer").await);
    assert!(!engine.invite_code_matches("spring").await);
}
