use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::admin::{AdminCommand, AdminOutcome};
use crate::auth::MeetslotAuthSource;
use crate::engine::slots::to_local;
use crate::engine::{EngineError, now_ms};
use crate::flows::FlowError;
use crate::model::*;
use crate::observability::{QUERIES_TOTAL, QUERY_DURATION_SECONDS, command_label};
use crate::services::{ServiceError, Services};
use crate::sql::{self, Command, Decision};

pub struct MeetslotHandler {
    services: Arc<Services>,
    query_parser: Arc<MeetslotQueryParser>,
}

impl MeetslotHandler {
    pub fn new(services: Arc<Services>) -> Self {
        Self {
            services,
            query_parser: Arc::new(MeetslotQueryParser),
        }
    }

    async fn run(&self, query: &str, format: &Format) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(cmd, now_ms()).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::debug!(command = label, "command failed: {e}");
        }
        result.map(|output| output.into_response(format)).map_err(service_err)
    }

    async fn execute_command(&self, cmd: Command, now: Ms) -> Result<Output, ServiceError> {
        let services = &self.services;
        let tz = services.engine.schedule.tz;
        let local = |ms: Ms| to_local(tz, ms).map(|t| t.format("%Y-%m-%d %H:%M").to_string());

        let output = match cmd {
            Command::SelectAvailability { view } => {
                let grid = services.availability(view, now).await?;
                let rows = grid
                    .days
                    .iter()
                    .flat_map(|(day, slots)| {
                        slots.iter().map(move |slot| {
                            vec![
                                text(day.to_string()),
                                int(slot.span.start),
                                int(slot.span.end),
                                Cell::Text(local(slot.span.start)),
                                boolean(slot.available),
                            ]
                        })
                    })
                    .collect();
                Output::rows(availability_schema(), rows)
            }
            Command::SelectAvailabilityDays { view } => {
                let grid = services.availability(view, now).await?;
                let rows = grid
                    .days
                    .iter()
                    .map(|(day, slots)| {
                        let open = slots.iter().filter(|s| s.available).count();
                        vec![text(day.to_string()), int(slots.len() as i64), int(open as i64)]
                    })
                    .collect();
                Output::rows(availability_days_schema(), rows)
            }
            Command::SelectReservations { phone: Some(phone) } => {
                let report = services.check_status(&phone).await?;
                let row = vec![
                    text(report.id.to_string()),
                    text(report.status.as_str()),
                    Cell::Int(report.approved_slot.map(|s| s.start)),
                    Cell::Int(report.approved_slot.map(|s| s.end)),
                    Cell::Text(report.approved_range),
                ];
                Output::rows(status_schema(), vec![row])
            }
            Command::SelectReservations { phone: None } => {
                let rows = services
                    .engine
                    .list_reservations()
                    .await
                    .into_iter()
                    .map(|r| {
                        let candidates: Vec<String> = r
                            .sorted_candidates()
                            .iter()
                            .map(|c| c.format("%Y-%m-%d %H:%M").to_string())
                            .collect();
                        vec![
                            text(r.id.to_string()),
                            text(r.requester.name.clone()),
                            text(r.requester.email.clone()),
                            text(r.requester.phone.clone()),
                            text(r.requester.purpose.clone()),
                            text(r.status_label().as_str()),
                            text(candidates.join(", ")),
                            Cell::Int(r.approved_slot.map(|s| s.start)),
                            Cell::Int(r.approved_slot.map(|s| s.end)),
                            Cell::Text(r.meeting.as_ref().and_then(|m| m.link.clone())),
                            int(r.created_at),
                        ]
                    })
                    .collect();
                Output::rows(reservations_schema(), rows)
            }
            Command::SelectBookingLinks => {
                let rows = services
                    .engine
                    .list_links()
                    .await
                    .into_iter()
                    .map(|l| {
                        vec![
                            text(l.token.clone()),
                            text(l.name.clone()),
                            text(l.state(now).as_str()),
                            text(services.link_url(&l.token)),
                            int(l.created_at),
                            Cell::Int(l.first_accessed_at),
                            Cell::Int(l.expires_at),
                        ]
                    })
                    .collect();
                Output::rows(booking_links_schema(), rows)
            }
            Command::SelectLinkAccess { token } => {
                let expires_at = services.access_link(&token, now).await?;
                Output::rows(link_access_schema(), vec![vec![text(token), int(expires_at)]])
            }
            Command::SelectLinkBookings => {
                let rows = services
                    .engine
                    .list_bookings()
                    .await
                    .into_iter()
                    .map(|b| {
                        vec![
                            text(b.id.to_string()),
                            text(b.token.clone()),
                            text(b.requester.name.clone()),
                            text(b.requester.email.clone()),
                            text(b.requester.phone.clone()),
                            text(b.requester.purpose.clone()),
                            text(b.status.as_str()),
                            int(b.slot.start),
                            int(b.slot.end),
                            Cell::Text(b.meeting.as_ref().and_then(|m| m.link.clone())),
                            int(b.created_at),
                        ]
                    })
                    .collect();
                Output::rows(link_bookings_schema(), rows)
            }
            Command::SelectWaitlist => {
                let rows = services
                    .engine
                    .list_waitlist()
                    .await
                    .into_iter()
                    .map(|w| {
                        vec![
                            text(w.id.to_string()),
                            text(w.email.clone()),
                            text(w.status.as_str()),
                            Cell::Text(w.access_token.clone()),
                            int(w.created_at),
                        ]
                    })
                    .collect();
                Output::rows(waitlist_schema(), rows)
            }
            Command::SelectInviteCode => {
                let rows = services
                    .engine
                    .active_invite_code()
                    .await
                    .into_iter()
                    .map(|invite| vec![text(invite.code), int(invite.set_at)])
                    .collect();
                Output::rows(invite_code_schema(), rows)
            }
            Command::InsertFlow { action, email, access_token } => {
                let flow = services
                    .request_code(action, &email, access_token.as_deref(), now)
                    .await?;
                Output::rows(flow_schema(), vec![vec![text(flow)]])
            }
            Command::InsertVerification { flow, code } => {
                let verified = services.confirm_code(&flow, &code, now).await?;
                Output::rows(verification_schema(), vec![vec![text(flow), boolean(verified.verified)]])
            }
            Command::InsertWaitlist { flow } => {
                let id = services.register_waitlist(&flow, now).await?;
                Output::rows(created_schema(), vec![created_row(id, WaitlistStatus::Pending.as_str())])
            }
            Command::InsertReservation { flow, requester, slots } => {
                let id = services.submit_reservation(&flow, requester, &slots, now).await?;
                Output::rows(created_schema(), vec![created_row(id, StatusLabel::Pending.as_str())])
            }
            Command::InsertReservationEdit { flow, id, requester } => {
                services.edit_reservation(&flow, id, requester, now).await?;
                Output::Done(Tag::new("INSERT").with_rows(1))
            }
            Command::InsertLinkBooking { token, requester, slot } => {
                let id = services.book_via_link(&token, requester, &slot, now).await?;
                Output::rows(created_schema(), vec![created_row(id, BookingStatus::Pending.as_str())])
            }
            Command::InsertReservationDecision { id, decision } => {
                let admin = match decision {
                    Decision::Approve => AdminCommand::ApproveReservation(id),
                    Decision::Reject => AdminCommand::RejectReservation(id),
                };
                outcome_response(services.execute_admin(admin, now).await?)
            }
            Command::InsertBookingDecision { id, decision } => {
                let admin = match decision {
                    Decision::Approve => AdminCommand::ApproveBooking(id),
                    Decision::Reject => AdminCommand::RejectBooking(id),
                };
                outcome_response(services.execute_admin(admin, now).await?)
            }
            Command::InsertWaitlistDecision { id, decision } => {
                let admin = match decision {
                    Decision::Approve => AdminCommand::ApproveWaitlist(id),
                    Decision::Reject => AdminCommand::RejectWaitlist(id),
                };
                outcome_response(services.execute_admin(admin, now).await?)
            }
            Command::InsertBookingLink { name } => outcome_response(
                services
                    .execute_admin(AdminCommand::CreateBookingLink { name }, now)
                    .await?,
            ),
            Command::InsertLinkState { token, active } => outcome_response(
                services
                    .execute_admin(AdminCommand::SetLinkActive { token, active }, now)
                    .await?,
            ),
            Command::InsertInviteCode { code } => outcome_response(
                services
                    .execute_admin(AdminCommand::SetInviteCode { code }, now)
                    .await?,
            ),
            Command::DeleteReservation { id } => {
                services
                    .execute_admin(AdminCommand::DeleteReservation(id), now)
                    .await?;
                Output::Done(Tag::new("DELETE").with_rows(1))
            }
        };
        Ok(output)
    }
}

// ── Rows ─────────────────────────────────────────────────────────

enum Cell {
    Text(Option<String>),
    Int(Option<i64>),
    Bool(Option<bool>),
}

fn text(value: impl Into<String>) -> Cell {
    Cell::Text(Some(value.into()))
}

fn int(value: i64) -> Cell {
    Cell::Int(Some(value))
}

fn boolean(value: bool) -> Cell {
    Cell::Bool(Some(value))
}

fn created_row(id: ulid::Ulid, status: &str) -> Vec<Cell> {
    vec![text(id.to_string()), text(status)]
}

enum Output {
    Rows(Vec<FieldInfo>, Vec<Vec<Cell>>),
    Done(Tag),
}

impl Output {
    fn rows(schema: Vec<FieldInfo>, rows: Vec<Vec<Cell>>) -> Self {
        Output::Rows(schema, rows)
    }

    fn into_response(self, format: &Format) -> Response {
        let (schema, rows) = match self {
            Output::Rows(schema, rows) => (schema, rows),
            Output::Done(tag) => return Response::Execution(tag),
        };
        let schema = Arc::new(with_format(schema, Some(format)));
        let encoded: Vec<PgWireResult<_>> = rows
            .into_iter()
            .map(|row| {
                let mut encoder = DataRowEncoder::new(schema.clone());
                for cell in row {
                    match cell {
                        Cell::Text(v) => encoder.encode_field(&v)?,
                        Cell::Int(v) => encoder.encode_field(&v)?,
                        Cell::Bool(v) => encoder.encode_field(&v)?,
                    }
                }
                Ok(encoder.take_row())
            })
            .collect();
        Response::Query(QueryResponse::new(schema, stream::iter(encoded)))
    }
}

fn outcome_response(outcome: AdminOutcome) -> Output {
    let (mut span, mut link, mut token, mut mailed) = (None, None, None, None);
    match &outcome {
        AdminOutcome::Approved { span: s, meeting_link, mailed: m } => {
            span = Some(*s);
            link = meeting_link.clone();
            mailed = Some(*m);
        }
        AdminOutcome::AlreadyApproved { span: s } => span = Some(*s),
        AdminOutcome::WaitlistApproved { access_token, booking_url, mailed: m } => {
            token = Some(access_token.clone());
            link = Some(booking_url.clone());
            mailed = Some(*m);
        }
        AdminOutcome::LinkCreated { token: t, url } => {
            token = Some(t.clone());
            link = Some(url.clone());
        }
        AdminOutcome::InviteCodeSet { code } => token = Some(code.clone()),
        AdminOutcome::Rejected { .. }
        | AdminOutcome::Deleted { .. }
        | AdminOutcome::InProgress
        | AdminOutcome::WaitlistRejected
        | AdminOutcome::LinkUpdated { .. } => {}
    }
    let row = vec![
        text(outcome.as_str()),
        Cell::Int(span.map(|s| s.start)),
        Cell::Int(span.map(|s| s.end)),
        Cell::Text(link),
        Cell::Text(token),
        Cell::Bool(mailed),
    ];
    Output::rows(outcome_schema(), vec![row])
}

// ── Schemas ──────────────────────────────────────────────────────

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

/// Apply the client's requested result format, column by column.
fn with_format(schema: Vec<FieldInfo>, format: Option<&Format>) -> Vec<FieldInfo> {
    let Some(format) = format else {
        return schema;
    };
    schema
        .into_iter()
        .enumerate()
        .map(|(i, f)| {
            FieldInfo::new(
                f.name().into(),
                None,
                None,
                f.datatype().clone(),
                format.format_for(i),
            )
        })
        .collect()
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        field("day", Type::VARCHAR),
        field("start", Type::INT8),
        field("end", Type::INT8),
        field("local_start", Type::VARCHAR),
        field("available", Type::BOOL),
    ]
}

fn availability_days_schema() -> Vec<FieldInfo> {
    vec![
        field("day", Type::VARCHAR),
        field("slots", Type::INT8),
        field("open", Type::INT8),
    ]
}

fn status_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("status", Type::VARCHAR),
        field("approved_start", Type::INT8),
        field("approved_end", Type::INT8),
        field("approved_range", Type::VARCHAR),
    ]
}

fn reservations_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("email", Type::VARCHAR),
        field("phone", Type::VARCHAR),
        field("purpose", Type::VARCHAR),
        field("status", Type::VARCHAR),
        field("candidates", Type::VARCHAR),
        field("approved_start", Type::INT8),
        field("approved_end", Type::INT8),
        field("meeting_link", Type::VARCHAR),
        field("created_at", Type::INT8),
    ]
}

fn booking_links_schema() -> Vec<FieldInfo> {
    vec![
        field("token", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("state", Type::VARCHAR),
        field("url", Type::VARCHAR),
        field("created_at", Type::INT8),
        field("first_accessed_at", Type::INT8),
        field("expires_at", Type::INT8),
    ]
}

fn link_access_schema() -> Vec<FieldInfo> {
    vec![field("token", Type::VARCHAR), field("expires_at", Type::INT8)]
}

fn link_bookings_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("token", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("email", Type::VARCHAR),
        field("phone", Type::VARCHAR),
        field("purpose", Type::VARCHAR),
        field("status", Type::VARCHAR),
        field("start", Type::INT8),
        field("end", Type::INT8),
        field("meeting_link", Type::VARCHAR),
        field("created_at", Type::INT8),
    ]
}

fn waitlist_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("email", Type::VARCHAR),
        field("status", Type::VARCHAR),
        field("access_token", Type::VARCHAR),
        field("created_at", Type::INT8),
    ]
}

fn invite_code_schema() -> Vec<FieldInfo> {
    vec![field("code", Type::VARCHAR), field("set_at", Type::INT8)]
}

fn flow_schema() -> Vec<FieldInfo> {
    vec![field("flow", Type::VARCHAR)]
}

fn verification_schema() -> Vec<FieldInfo> {
    vec![field("flow", Type::VARCHAR), field("verified", Type::BOOL)]
}

fn created_schema() -> Vec<FieldInfo> {
    vec![field("id", Type::VARCHAR), field("status", Type::VARCHAR)]
}

fn outcome_schema() -> Vec<FieldInfo> {
    vec![
        field("outcome", Type::VARCHAR),
        field("start", Type::INT8),
        field("end", Type::INT8),
        field("link", Type::VARCHAR),
        field("token", Type::VARCHAR),
        field("mailed", Type::BOOL),
    ]
}

/// The statement's table, read from the word after FROM or INTO. Works on
/// statements that still carry `$n` placeholders.
fn target_table(sql: &str) -> Option<(String, String)> {
    let lower = sql.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';' || c == ',')
        .filter(|w| !w.is_empty())
        .collect();
    let verb = words.first()?.to_string();
    let idx = words.iter().position(|w| *w == "from" || *w == "into")?;
    let table = words.get(idx + 1)?.trim_matches('"').to_string();
    Some((verb, table))
}

/// Row description for a statement, before it runs.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let Some((verb, table)) = target_table(sql) else {
        return vec![];
    };
    match (verb.as_str(), table.as_str()) {
        ("select", "availability") => availability_schema(),
        ("select", "availability_days") => availability_days_schema(),
        ("select", "reservations") if sql.to_lowercase().contains("phone") => status_schema(),
        ("select", "reservations") => reservations_schema(),
        ("select", "booking_links") => booking_links_schema(),
        ("select", "link_access") => link_access_schema(),
        ("select", "link_bookings") => link_bookings_schema(),
        ("select", "waitlist") => waitlist_schema(),
        ("select", "invite_codes") => invite_code_schema(),
        ("insert", "flows") => flow_schema(),
        ("insert", "verifications") => verification_schema(),
        ("insert", "waitlist" | "reservations" | "link_bookings") => created_schema(),
        (
            "insert",
            "reservation_decisions" | "booking_decisions" | "waitlist_decisions" | "booking_links"
            | "link_states" | "invite_codes",
        ) => outcome_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for MeetslotHandler {
    async fn do_query<C>(
        &self,
        _client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(query, &Format::UnifiedText).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct MeetslotQueryParser;

#[async_trait]
impl QueryParser for MeetslotQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(with_format(result_schema(stmt), column_format))
    }
}

#[async_trait]
impl ExtendedQueryHandler for MeetslotHandler {
    type Statement = String;
    type QueryParser = MeetslotQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        self.run(&sql, &portal.result_column_format).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(with_format(
            result_schema(&target.statement.statement),
            Some(&target.result_column_format),
        )))
    }
}

/// Walk `sql` and report each `$N` placeholder outside quoted text as
/// `(byte_start, byte_end, n)`.
fn placeholders(sql: &str) -> Vec<(usize, usize, usize)> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            // `''` closes and reopens the literal.
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b'$' => {
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j].is_ascii_digit() {
                    j += 1;
                }
                if j > start
                    && let Ok(n) = sql[start..j].parse::<usize>()
                {
                    found.push((i, j, n));
                    i = j;
                    continue;
                }
            }
            None => {}
        }
        i += 1;
    }
    found
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    placeholders(sql).iter().map(|&(_, _, n)| n).max().unwrap_or(0)
}

/// Splice bound values into `sql` in one pass. Values are quoted literals and
/// are never rescanned, so text like `$1` inside a value stays as written.
fn splice_params<B: AsRef<[u8]>>(sql: &str, params: &[Option<B>]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut last = 0;
    for (start, end, n) in placeholders(sql) {
        let Some(param) = n.checked_sub(1).and_then(|i| params.get(i)) else {
            continue;
        };
        out.push_str(&sql[last..start]);
        match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes.as_ref());
                out.push('\'');
                out.push_str(&text.replace('\'', "''"));
                out.push('\'');
            }
            None => out.push_str("NULL"),
        }
        last = end;
    }
    out.push_str(&sql[last..]);
    out
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    splice_params(&portal.statement.statement, &portal.parameters)
}

// ── Factory ──────────────────────────────────────────────────────

pub struct MeetslotFactory {
    handler: Arc<MeetslotHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<MeetslotAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl MeetslotFactory {
    pub fn new(services: Arc<Services>, password: String) -> Self {
        let auth_source = MeetslotAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(MeetslotHandler::new(services)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for MeetslotFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

pub async fn process_connection(
    socket: TcpStream,
    factory: Arc<MeetslotFactory>,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

pub fn sqlstate(e: &ServiceError) -> &'static str {
    match e {
        ServiceError::Engine(e) => match e {
            EngineError::Validation(_) | EngineError::NoCandidates => "22023",
            EngineError::NotFound(_) => "02000",
            EngineError::AlreadyExists(_) => "23505",
            EngineError::Expired | EngineError::AlreadyUsed | EngineError::Revoked => "55000",
            EngineError::SlotTaken(_) | EngineError::Superseded(_) => "40001",
            EngineError::LimitExceeded(_) => "54000",
            EngineError::WalError(_) => "58030",
        },
        ServiceError::Remote(_) => "58000",
        ServiceError::Flow(e) => match e {
            FlowError::NotFound => "02000",
            FlowError::Expired | FlowError::NotVerified | FlowError::WrongAction(_) => "55000",
            FlowError::LimitExceeded => "54000",
        },
        ServiceError::CodeNotFound => "02000",
        ServiceError::CodeExpired => "55000",
        ServiceError::CodeMismatch | ServiceError::EmailMismatch | ServiceError::AccessDenied => {
            "28000"
        }
    }
}

fn service_err(e: ServiceError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
