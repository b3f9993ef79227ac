use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime, TimeZone, Timelike};
use chrono_tz::Tz;

use crate::limits::*;
use crate::model::*;

use super::EngineError;

// ── Zone conversion ──────────────────────────────────────────────

pub fn to_local(tz: Tz, ms: Ms) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(ms).map(|utc| utc.with_timezone(&tz).naive_local())
}

/// Ambiguous local times resolve to the earlier instant; nonexistent ones to `None`.
pub fn to_ms(tz: Tz, local: NaiveDateTime) -> Option<Ms> {
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.timestamp_millis())
}

fn midnight_ms(tz: Tz, day: NaiveDate) -> Result<Ms, EngineError> {
    day.and_hms_opt(0, 0, 0)
        .and_then(|local| to_ms(tz, local))
        .ok_or_else(|| EngineError::Validation(vec![format!("no local midnight on {day}")]))
}

// ── Windows ──────────────────────────────────────────────────────

/// Which window an availability query covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Week,
    Month { year: Option<i32>, month: Option<u32> },
}

/// `[Monday 00:00 of the week containing now, +7 days)`.
pub fn week_window(now: Ms, tz: Tz) -> Result<Span, EngineError> {
    let today = to_local(tz, now)
        .ok_or(EngineError::LimitExceeded("timestamp out of range"))?
        .date();
    let monday = today - Days::new(u64::from(today.weekday().num_days_from_monday()));
    let end = monday + Days::new(7);
    Ok(Span::new(midnight_ms(tz, monday)?, midnight_ms(tz, end)?))
}

/// `[day 1 00:00, first of next month 00:00)`, the half-open form of
/// "through the last day at 23:59:59".
pub fn month_window(year: i32, month: u32, tz: Tz) -> Result<Span, EngineError> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| EngineError::Validation(vec![format!("invalid month: {year}-{month}")]))?;
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let next = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .ok_or_else(|| EngineError::Validation(vec![format!("invalid month: {year}-{month}")]))?;
    Ok(Span::new(midnight_ms(tz, first)?, midnight_ms(tz, next)?))
}

/// Resolve a view to a concrete window. Missing year/month fall back to the current month.
pub fn window_for(view: View, now: Ms, tz: Tz) -> Result<Span, EngineError> {
    match view {
        View::Week => week_window(now, tz),
        View::Month { year, month } => {
            let today = to_local(tz, now)
                .ok_or(EngineError::LimitExceeded("timestamp out of range"))?
                .date();
            month_window(
                year.unwrap_or(today.year()),
                month.unwrap_or(today.month()),
                tz,
            )
        }
    }
}

// ── Busy normalisation ───────────────────────────────────────────

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end
        {
            last.end = last.end.max(span.end);
            continue;
        }
        merged.push(span);
    }
    merged
}

/// Clip to the window, sort, merge.
fn normalize_busy(window: &Span, busy: &[Span]) -> Vec<Span> {
    let mut clipped: Vec<Span> = busy
        .iter()
        .filter(|b| b.overlaps(window))
        .map(|b| Span::new(b.start.max(window.start), b.end.min(window.end)))
        .collect();
    clipped.sort_by_key(|s| (s.start, s.end));
    merge_overlapping(&clipped)
}

/// `merged` must be disjoint and sorted, which makes the ends sorted as well.
fn overlaps_any(merged: &[Span], span: &Span) -> bool {
    let idx = merged.partition_point(|b| b.end <= span.start);
    merged.get(idx).is_some_and(|b| b.start < span.end)
}

// ── Grid ─────────────────────────────────────────────────────────

/// Slots of `schedule.slot_length` tiled from `window.start`, each fully inside
/// the window. A slot is available when its local start hour is allowed and it
/// overlaps no busy period.
pub fn generate(window: &Span, busy: &[Span], schedule: &Schedule) -> Vec<Slot> {
    let len = schedule.slot_length;
    if len <= 0 || window.duration_ms() < len {
        return Vec::new();
    }
    let busy = normalize_busy(window, busy);

    let mut slots = Vec::with_capacity((window.duration_ms() / len) as usize);
    let mut start = window.start;
    while start + len <= window.end {
        let span = Span::new(start, start + len);
        let in_hours = to_local(schedule.tz, start)
            .is_some_and(|local| schedule.allowed_hours.contains(local.hour()));
        slots.push(Slot {
            span,
            available: in_hours && !overlaps_any(&busy, &span),
        });
        start += len;
    }
    slots
}

/// Every local calendar day the window touches gets a key, even with no slots.
pub fn group_by_day(window: &Span, slots: &[Slot], tz: Tz) -> BTreeMap<NaiveDate, Vec<Slot>> {
    let mut days: BTreeMap<NaiveDate, Vec<Slot>> = BTreeMap::new();
    if let (Some(first), Some(last)) = (to_local(tz, window.start), to_local(tz, window.end - 1)) {
        let mut day = first.date();
        while day <= last.date() {
            days.insert(day, Vec::new());
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
    }
    for slot in slots {
        if let Some(local) = to_local(tz, slot.span.start) {
            days.entry(local.date()).or_default().push(*slot);
        }
    }
    days
}

pub fn validate_window(window: &Span) -> Result<(), EngineError> {
    if window.start < MIN_VALID_TIMESTAMP_MS || window.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if window.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}
