//! Google Calendar v3 over REST.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::model::{Meeting, MeetingRequest, Ms, Span};
use crate::remote::RemoteError;

use super::Calendar;
use super::credentials::CredentialStore;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

pub struct GoogleCalendar {
    http: reqwest::Client,
    calendar_id: String,
    tz: Tz,
    credentials: CredentialStore,
    refresh_lead: chrono::Duration,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: std::collections::HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<BusyPeriod>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct BusyPeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EventTime {
    date_time: String,
    time_zone: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsertedEvent {
    id: String,
    hangout_link: Option<String>,
}

fn rfc3339(tz: Tz, ms: Ms) -> Result<String, RemoteError> {
    DateTime::from_timestamp_millis(ms)
        .map(|utc| utc.with_timezone(&tz).to_rfc3339_opts(SecondsFormat::Secs, false))
        .ok_or_else(|| RemoteError::invalid_response(format!("timestamp out of range: {ms}")))
}

/// Map a non-success status to an error kind; 401 triggers the refresh path.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(RemoteError::authentication("access token expired or invalid"));
    }
    Err(RemoteError::server(format!("API error ({status}): {body}")))
}

impl GoogleCalendar {
    pub fn new(
        credentials: CredentialStore,
        calendar_id: String,
        tz: Tz,
        timeout: Duration,
        refresh_lead: chrono::Duration,
    ) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RemoteError::unconfigured(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            calendar_id,
            tz,
            credentials,
            refresh_lead,
        })
    }

    async fn with_token<T, F, Fut>(&self, op: F) -> Result<T, RemoteError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        call_with_refresh(
            || self.credentials.access_token(&self.http),
            || self.credentials.refresh(&self.http),
            op,
        )
        .await
    }

    async fn free_busy(&self, window: Span, token: String) -> Result<Vec<Span>, RemoteError> {
        let body = json!({
            "timeMin": rfc3339(self.tz, window.start)?,
            "timeMax": rfc3339(self.tz, window.end)?,
            "timeZone": self.tz.name(),
            "items": [{ "id": self.calendar_id }],
        });
        let response = self
            .http
            .post(format!("{CALENDAR_API_BASE}/freeBusy"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let parsed: FreeBusyResponse = check_status(response).await?.json().await?;
        let calendar = parsed.calendars.get(&self.calendar_id).ok_or_else(|| {
            RemoteError::invalid_response(format!("no free/busy data for {}", self.calendar_id))
        })?;
        if !calendar.errors.is_empty() {
            return Err(RemoteError::server(format!(
                "free/busy errors: {:?}",
                calendar.errors
            )));
        }
        let busy: Vec<Span> = calendar
            .busy
            .iter()
            .filter(|b| b.start < b.end)
            .map(|b| Span::new(b.start.timestamp_millis(), b.end.timestamp_millis()))
            .collect();
        debug!(count = busy.len(), "fetched busy periods");
        Ok(busy)
    }

    async fn insert_event(
        &self,
        request: &MeetingRequest,
        token: String,
    ) -> Result<Meeting, RemoteError> {
        let time = |ms| -> Result<EventTime, RemoteError> {
            Ok(EventTime {
                date_time: rfc3339(self.tz, ms)?,
                time_zone: self.tz.name().to_string(),
            })
        };
        let body = json!({
            "summary": format!("Meeting with {}", request.requester.name),
            "description": request.requester.purpose,
            "start": time(request.span.start)?,
            "end": time(request.span.end)?,
            "attendees": [{ "email": request.requester.email }],
            "conferenceData": {
                "createRequest": {
                    // Stable per approval attempt, so a retried insert does not
                    // create a second conference.
                    "requestId": format!("meetslot-{}", request.lease),
                    "conferenceSolutionKey": { "type": "hangoutsMeet" },
                }
            },
        });
        let response = self
            .http
            .post(format!(
                "{CALENDAR_API_BASE}/calendars/{}/events",
                urlencoding::encode(&self.calendar_id)
            ))
            .bearer_auth(token)
            .query(&[("conferenceDataVersion", "1")])
            .json(&body)
            .send()
            .await?;
        let event: InsertedEvent = check_status(response).await?.json().await?;
        Ok(Meeting {
            event_id: event.id,
            link: event.hangout_link,
        })
    }

    async fn remove_event(&self, event_id: &str, token: String) -> Result<bool, RemoteError> {
        let response = self
            .http
            .delete(format!(
                "{CALENDAR_API_BASE}/calendars/{}/events/{}",
                urlencoding::encode(&self.calendar_id),
                urlencoding::encode(event_id)
            ))
            .bearer_auth(token)
            .send()
            .await?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND | reqwest::StatusCode::GONE => Ok(false),
            _ => check_status(response).await.map(|_| true),
        }
    }
}

/// Run `op` with a token; on an authentication failure refresh once and
/// retry exactly once. A second failure is returned as is.
async fn call_with_refresh<T, G, GFut, R, RFut, F, Fut>(
    token: G,
    refresh: R,
    op: F,
) -> Result<T, RemoteError>
where
    G: FnOnce() -> GFut,
    GFut: Future<Output = Result<String, RemoteError>>,
    R: FnOnce() -> RFut,
    RFut: Future<Output = Result<String, RemoteError>>,
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    match op(token().await?).await {
        Err(e) if e.is_authentication() => {
            warn!("calendar rejected credentials, refreshing once: {e}");
            op(refresh().await?).await
        }
        other => other,
    }
}

fn record_call<T>(op: &'static str, result: &Result<T, RemoteError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => e.kind.as_str(),
    };
    metrics::counter!(crate::observability::CALENDAR_CALLS_TOTAL, "op" => op, "status" => status)
        .increment(1);
}

#[async_trait]
impl Calendar for GoogleCalendar {
    async fn query_busy(&self, window: Span) -> Result<Vec<Span>, RemoteError> {
        let result = self.with_token(|token| self.free_busy(window, token)).await;
        record_call("free_busy", &result);
        result
    }

    async fn create_meeting(&self, request: &MeetingRequest) -> Result<Meeting, RemoteError> {
        let result = self
            .with_token(|token| self.insert_event(request, token))
            .await;
        record_call("insert", &result);
        result
    }

    async fn delete_meeting(&self, event_id: &str) -> Result<bool, RemoteError> {
        let result = self
            .with_token(|token| self.remove_event(event_id, token))
            .await;
        record_call("delete", &result);
        result
    }

    async fn refresh_credentials(&self) -> Result<bool, RemoteError> {
        self.credentials
            .refresh_if_expiring(&self.http, self.refresh_lead)
            .await
    }
}
