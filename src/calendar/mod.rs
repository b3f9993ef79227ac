//! The host's external calendar: busy time in, meetings out.

pub mod credentials;
pub mod google;

use async_trait::async_trait;

use crate::model::{Meeting, MeetingRequest, Span};
use crate::remote::RemoteError;

pub use google::GoogleCalendar;

#[async_trait]
pub trait Calendar: Send + Sync {
    /// Busy periods overlapping `window`, in any order.
    async fn query_busy(&self, window: Span) -> Result<Vec<Span>, RemoteError>;

    /// Create a video meeting for an approved request.
    async fn create_meeting(&self, request: &MeetingRequest) -> Result<Meeting, RemoteError>;

    /// Cancel a meeting. `Ok(false)` when it was already gone.
    async fn delete_meeting(&self, event_id: &str) -> Result<bool, RemoteError>;

    /// Refresh credentials ahead of expiry. Returns whether a refresh happened.
    async fn refresh_credentials(&self) -> Result<bool, RemoteError> {
        Ok(false)
    }
}

/// Used when no calendar is configured: nothing is busy, nothing can be created.
#[derive(Debug, Default)]
pub struct UnconfiguredCalendar;

#[async_trait]
impl Calendar for UnconfiguredCalendar {
    async fn query_busy(&self, _window: Span) -> Result<Vec<Span>, RemoteError> {
        Ok(Vec::new())
    }

    async fn create_meeting(&self, _request: &MeetingRequest) -> Result<Meeting, RemoteError> {
        Err(RemoteError::unconfigured("no calendar configured"))
    }

    async fn delete_meeting(&self, _event_id: &str) -> Result<bool, RemoteError> {
        Err(RemoteError::unconfigured("no calendar configured"))
    }
}
