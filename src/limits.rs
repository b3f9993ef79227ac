use crate::model::Ms;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 60 * MINUTE_MS;
pub const DAY_MS: Ms = 24 * HOUR_MS;

/// Candidate slots a single reservation may carry.
pub const MAX_CANDIDATES: usize = 16;

pub const DEFAULT_SLOT_LENGTH_MS: Ms = 30 * MINUTE_MS;

/// Booking links stay usable this long after their first access.
pub const LINK_ACCESS_WINDOW_MS: Ms = 30 * MINUTE_MS;
/// Booking links that were never opened expire this long after creation.
pub const LINK_UNACCESSED_TTL_MS: Ms = 7 * DAY_MS;
pub const LINK_TOKEN_LEN: usize = 32;

pub const CODE_TTL_MS: Ms = 5 * MINUTE_MS;
pub const CODE_DIGITS: u32 = 6;
/// Older issuances beyond this are dropped from the per-email history.
pub const MAX_CODES_PER_EMAIL: usize = 16;

pub const FLOW_TTL_MS: Ms = 10 * MINUTE_MS;
pub const MAX_FLOWS: usize = 100_000;

/// An approval intent older than this is treated as abandoned.
pub const APPROVAL_LEASE_MS: Ms = 2 * MINUTE_MS;

pub const REMINDER_LEAD_MIN_MS: Ms = 55 * MINUTE_MS;
pub const REMINDER_LEAD_MAX_MS: Ms = 65 * MINUTE_MS;

pub const ACCESS_TOKEN_LEN: usize = 32;

pub const MAX_NAME_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_PHONE_LEN: usize = 32;
pub const MAX_PURPOSE_LEN: usize = 2_000;
pub const MAX_LINK_NAME_LEN: usize = 200;
pub const MAX_INVITE_CODE_LEN: usize = 64;

/// Largest encoded event a WAL frame may carry.
pub const MAX_EVENT_BYTES: usize = 1 << 20;

pub const MAX_RESERVATIONS: usize = 1_000_000;
pub const MAX_LINKS: usize = 100_000;
pub const MAX_WAITLIST: usize = 100_000;

/// Widest availability window a single query may ask for.
pub const MAX_QUERY_WINDOW_MS: Ms = 62 * DAY_MS;

// 2000-01-01 .. 2100-01-01
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

pub const REAPER_INTERVAL_SECS: u64 = 5;
pub const COMPACTOR_INTERVAL_SECS: u64 = 30;
pub const REMINDER_SWEEP_SECS: u64 = 60;
pub const CREDENTIAL_SWEEP_SECS: u64 = 30 * 60;
/// Calendar credentials are refreshed once they expire within this lead.
pub const CREDENTIAL_REFRESH_LEAD_DAYS: i64 = 7;
