//! SQL statements accepted on the command surface.
//!
//! Reads:
//!
//! ```sql
//! SELECT * FROM availability [WHERE period = 'week' | 'month' | 'YYYY-MM']
//! SELECT * FROM availability_days [WHERE period = ...]
//! SELECT * FROM reservations [WHERE phone = '010-1234-5678']
//! SELECT * FROM booking_links
//! SELECT * FROM link_access WHERE token = '...'
//! SELECT * FROM link_bookings
//! SELECT * FROM waitlist
//! ```
//!
//! Writes take values positionally in the column order below, or by name when
//! a column list is given:
//!
//! ```sql
//! INSERT INTO flows (action, email, access_token, reservation_id) VALUES (...)
//! INSERT INTO verifications (flow, code) VALUES (...)
//! INSERT INTO waitlist (flow) VALUES (...)
//! INSERT INTO reservations (flow, name, email, phone, purpose, slots) VALUES (...)
//! INSERT INTO reservation_edits (flow, id, name, email, phone, purpose) VALUES (...)
//! INSERT INTO link_bookings (token, name, email, phone, purpose, slot) VALUES (...)
//! INSERT INTO reservation_decisions (id, decision) VALUES (...)
//! INSERT INTO booking_decisions (id, decision) VALUES (...)
//! INSERT INTO waitlist_decisions (id, decision) VALUES (...)
//! INSERT INTO booking_links (name) VALUES (...)
//! INSERT INTO link_states (token, active) VALUES (...)
//! DELETE FROM reservations WHERE id = '...'
//! ```
//!
//! `slots` is an array or a comma-separated string of local starts.

use chrono::{Datelike, NaiveDate};
use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::engine::slots::View;
use crate::flows::FlowAction;
use crate::model::Requester;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    SelectAvailability {
        view: View,
    },
    SelectAvailabilityDays {
        view: View,
    },
    SelectReservations {
        phone: Option<String>,
    },
    SelectBookingLinks,
    SelectLinkAccess {
        token: String,
    },
    SelectLinkBookings,
    SelectWaitlist,
    SelectInviteCode,
    InsertReservation {
        flow: String,
        requester: Requester,
        slots: Vec<String>,
    },
    InsertReservationEdit {
        flow: String,
        id: Ulid,
        requester: Requester,
    },
    InsertReservationDecision {
        id: Ulid,
        decision: Decision,
    },
    InsertFlow {
        action: FlowAction,
        email: String,
        access_token: Option<String>,
    },
    InsertVerification {
        flow: String,
        code: String,
    },
    InsertWaitlist {
        flow: String,
    },
    InsertWaitlistDecision {
        id: Ulid,
        decision: Decision,
    },
    InsertBookingLink {
        name: String,
    },
    InsertLinkState {
        token: String,
        active: bool,
    },
    InsertLinkBooking {
        token: String,
        requester: Requester,
        slot: String,
    },
    InsertBookingDecision {
        id: Ulid,
        decision: Decision,
    },
    InsertInviteCode {
        code: String,
    },
    DeleteReservation {
        id: Ulid,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

/// One VALUES row, addressed by column name when the statement listed
/// columns and by position otherwise.
struct Row<'a> {
    columns: Vec<String>,
    values: &'a [Expr],
}

impl<'a> Row<'a> {
    fn get(&self, name: &'static str, position: usize) -> Option<&'a Expr> {
        if self.columns.is_empty() {
            return self.values.get(position);
        }
        let idx = self.columns.iter().position(|c| c == name)?;
        self.values.get(idx)
    }

    fn required(&self, name: &'static str, position: usize) -> Result<&'a Expr, SqlError> {
        self.get(name, position).ok_or(SqlError::MissingColumn(name))
    }

    fn string(&self, name: &'static str, position: usize) -> Result<String, SqlError> {
        parse_string(self.required(name, position)?)
    }

    fn optional_string(&self, name: &'static str, position: usize) -> Result<Option<String>, SqlError> {
        self.get(name, position).map_or(Ok(None), parse_string_or_null)
    }

    fn ulid(&self, name: &'static str, position: usize) -> Result<Ulid, SqlError> {
        parse_ulid_expr(self.required(name, position)?)
    }

    fn decision(&self) -> Result<Decision, SqlError> {
        match self.string("decision", 1)?.to_lowercase().as_str() {
            "approve" | "approved" | "confirm" | "confirmed" => Ok(Decision::Approve),
            "reject" | "rejected" => Ok(Decision::Reject),
            other => Err(SqlError::Parse(format!("unknown decision: {other}"))),
        }
    }

    /// name, email, phone, purpose starting at `first`.
    fn requester(&self, first: usize) -> Result<Requester, SqlError> {
        Ok(Requester {
            name: self.string("name", first)?,
            email: self.string("email", first + 1)?,
            phone: self.string("phone", first + 2)?,
            purpose: self.string("purpose", first + 3)?,
        })
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let values = extract_insert_values(insert)?;
    let row = Row {
        columns: insert.columns.iter().map(|c| c.value.to_lowercase()).collect(),
        values: &values,
    };

    match table.as_str() {
        "flows" => {
            let kind = row.string("action", 0)?.to_lowercase();
            let action = match kind.as_str() {
                "registration" => FlowAction::Registration,
                "booking" => FlowAction::Booking,
                "info_edit" => FlowAction::InfoEdit {
                    reservation_id: row.ulid("reservation_id", 3)?,
                },
                other => return Err(SqlError::Parse(format!("unknown flow action: {other}"))),
            };
            Ok(Command::InsertFlow {
                action,
                email: row.string("email", 1)?,
                access_token: row.optional_string("access_token", 2)?,
            })
        }
        "verifications" => Ok(Command::InsertVerification {
            flow: row.string("flow", 0)?,
            code: row.string("code", 1)?,
        }),
        "waitlist" => Ok(Command::InsertWaitlist {
            flow: row.string("flow", 0)?,
        }),
        "reservations" => Ok(Command::InsertReservation {
            flow: row.string("flow", 0)?,
            requester: row.requester(1)?,
            slots: parse_string_list(row.required("slots", 5)?)?,
        }),
        "reservation_edits" => Ok(Command::InsertReservationEdit {
            flow: row.string("flow", 0)?,
            id: row.ulid("id", 1)?,
            requester: row.requester(2)?,
        }),
        "link_bookings" => Ok(Command::InsertLinkBooking {
            token: row.string("token", 0)?,
            requester: row.requester(1)?,
            slot: row.string("slot", 5)?,
        }),
        "reservation_decisions" => Ok(Command::InsertReservationDecision {
            id: row.ulid("id", 0)?,
            decision: row.decision()?,
        }),
        "booking_decisions" => Ok(Command::InsertBookingDecision {
            id: row.ulid("id", 0)?,
            decision: row.decision()?,
        }),
        "waitlist_decisions" => Ok(Command::InsertWaitlistDecision {
            id: row.ulid("id", 0)?,
            decision: row.decision()?,
        }),
        "booking_links" => Ok(Command::InsertBookingLink {
            name: row.string("name", 0)?,
        }),
        "link_states" => Ok(Command::InsertLinkState {
            token: row.string("token", 0)?,
            active: parse_bool(row.required("active", 1)?)?,
        }),
        "invite_codes" => Ok(Command::InsertInviteCode {
            code: row.string("code", 0)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── DELETE / SELECT ───────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "reservations" => Ok(Command::DeleteReservation { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        extract_eq_filters(selection, &mut filters)?;
    }
    let filter = |name: &str| -> Result<Option<String>, SqlError> {
        filters
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, expr)| parse_string(expr))
            .transpose()
    };

    match table.as_str() {
        "availability" => Ok(Command::SelectAvailability {
            view: parse_period(filter("period")?.as_deref())?,
        }),
        "availability_days" => Ok(Command::SelectAvailabilityDays {
            view: parse_period(filter("period")?.as_deref())?,
        }),
        "reservations" => Ok(Command::SelectReservations {
            phone: filter("phone")?,
        }),
        "booking_links" => Ok(Command::SelectBookingLinks),
        "link_access" => Ok(Command::SelectLinkAccess {
            token: filter("token")?.ok_or(SqlError::MissingFilter("token"))?,
        }),
        "link_bookings" => Ok(Command::SelectLinkBookings),
        "waitlist" => Ok(Command::SelectWaitlist),
        "invite_codes" => Ok(Command::SelectInviteCode),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `week`, `month` (the current one) or an explicit `YYYY-MM`. Defaults to week.
fn parse_period(period: Option<&str>) -> Result<View, SqlError> {
    let Some(period) = period.map(str::trim) else {
        return Ok(View::Week);
    };
    match period.to_lowercase().as_str() {
        "week" => Ok(View::Week),
        "month" => Ok(View::Month { year: None, month: None }),
        _ => {
            let first = NaiveDate::parse_from_str(&format!("{period}-01"), "%Y-%m-%d")
                .map_err(|_| SqlError::Parse(format!("bad period: {period}")))?;
            Ok(View::Month {
                year: Some(first.year()),
                month: Some(first.month()),
            })
        }
    }
}

/// Collect `column = value` pairs joined by AND.
fn extract_eq_filters(expr: &Expr, out: &mut Vec<(String, Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                extract_eq_filters(left, out)?;
                extract_eq_filters(right, out)?;
            }
            ast::BinaryOperator::Eq => {
                let col = expr_column_name(left)
                    .ok_or_else(|| SqlError::Parse(format!("expected column, got {left}")))?;
                out.push((col, right.as_ref().clone()));
            }
            other => return Err(SqlError::Unsupported(format!("operator {other}"))),
        },
        Expr::Nested(inner) => extract_eq_filters(inner, out)?,
        other => return Err(SqlError::Unsupported(format!("filter {other}"))),
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

/// Commands act on one row at a time.
fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            rows => Err(SqlError::Unsupported(format!("{} rows in one INSERT", rows.len()))),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_ulid_expr(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::DoubleQuotedString(s)) => Ok(s.clone()),
        Some(Value::Number(n, _)) => Ok(n.to_string()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_string(expr).map(Some),
    }
}

/// `ARRAY['a', 'b']` or `'a,b'`.
fn parse_string_list(expr: &Expr) -> Result<Vec<String>, SqlError> {
    if let Expr::Array(array) = expr {
        return array.elem.iter().map(parse_string).collect();
    }
    Ok(parse_string(expr)?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) | Value::Number(s, _) => {
                Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
            }
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::SingleQuotedString(s) => match s.to_lowercase().as_str() {
                "true" | "t" | "1" => Ok(true),
                "false" | "f" | "0" => Ok(false),
                _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
            },
            Value::Number(n, _) => Ok(n != "0"),
            _ => Err(SqlError::Parse(format!("expected bool, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::MissingColumn(col) => write!(f, "missing value: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";

    #[test]
    fn parse_insert_reservation_positional() {
        let sql = "INSERT INTO reservations VALUES ('flow-1', 'Kim Minji', 'minji@example.com', '010-1234-5678', 'Intro call', ARRAY['2024-06-01T10:00', '2024-06-01T10:30'])";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::InsertReservation { flow, requester, slots } => {
                assert_eq!(flow, "flow-1");
                assert_eq!(requester.name, "Kim Minji");
                assert_eq!(requester.phone, "010-1234-5678");
                assert_eq!(slots, vec!["2024-06-01T10:00", "2024-06-01T10:30"]);
            }
            _ => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_reservation_named_columns() {
        let sql = "INSERT INTO reservations (slots, purpose, phone, email, name, flow) VALUES ('2024-06-01 10:00, 2024-06-01 11:00', 'Demo', '010', 'a@example.com', 'Lee', 'f')";
        let cmd = parse_sql(sql).unwrap();
        match cmd {
            Command::InsertReservation { flow, requester, slots } => {
                assert_eq!(flow, "f");
                assert_eq!(requester.email, "a@example.com");
                assert_eq!(requester.purpose, "Demo");
                assert_eq!(slots, vec!["2024-06-01 10:00", "2024-06-01 11:00"]);
            }
            _ => panic!("expected InsertReservation, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_missing_column_errors() {
        let sql = "INSERT INTO reservations (flow, name) VALUES ('f', 'Lee')";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingColumn("email"))));
    }

    #[test]
    fn parse_decisions() {
        let sql = format!("INSERT INTO reservation_decisions VALUES ('{ID}', 'approve')");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertReservationDecision {
                id: Ulid::from_string(ID).unwrap(),
                decision: Decision::Approve
            }
        );
        let sql = format!("INSERT INTO booking_decisions (id, decision) VALUES ('{ID}', 'REJECT')");
        assert!(matches!(
            parse_sql(&sql).unwrap(),
            Command::InsertBookingDecision { decision: Decision::Reject, .. }
        ));
        let sql = format!("INSERT INTO waitlist_decisions VALUES ('{ID}', 'maybe')");
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_flows() {
        let sql = "INSERT INTO flows (action, email, access_token) VALUES ('booking', 'a@example.com', 'tok')";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::InsertFlow {
                action: FlowAction::Booking,
                email: "a@example.com".into(),
                access_token: Some("tok".into()),
            }
        );

        let sql = "INSERT INTO flows VALUES ('registration', 'a@example.com', NULL)";
        assert!(matches!(
            parse_sql(sql).unwrap(),
            Command::InsertFlow { action: FlowAction::Registration, access_token: None, .. }
        ));

        let sql = format!("INSERT INTO flows (action, email, reservation_id) VALUES ('info_edit', 'a@example.com', '{ID}')");
        assert!(matches!(
            parse_sql(&sql).unwrap(),
            Command::InsertFlow { action: FlowAction::InfoEdit { .. }, .. }
        ));

        let sql = "INSERT INTO flows (action, email) VALUES ('info_edit', 'a@example.com')";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingColumn("reservation_id"))));
    }

    #[test]
    fn parse_link_commands() {
        let sql = "INSERT INTO link_states VALUES ('tok', false)";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::InsertLinkState { token: "tok".into(), active: false }
        );
        let sql = "INSERT INTO link_bookings VALUES ('tok', 'Lee', 'a@example.com', '010', 'Chat', '2024-06-01T13:00')";
        assert!(matches!(
            parse_sql(sql).unwrap(),
            Command::InsertLinkBooking { slot, .. } if slot == "2024-06-01T13:00"
        ));
        let sql = "SELECT * FROM link_access WHERE token = 'tok'";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::SelectLinkAccess { token: "tok".into() }
        );
        assert!(matches!(
            parse_sql("SELECT * FROM link_access"),
            Err(SqlError::MissingFilter("token"))
        ));
    }

    #[test]
    fn parse_availability_periods() {
        assert_eq!(
            parse_sql("SELECT * FROM availability").unwrap(),
            Command::SelectAvailability { view: View::Week }
        );
        assert_eq!(
            parse_sql("SELECT * FROM availability_days WHERE period = 'month'").unwrap(),
            Command::SelectAvailabilityDays { view: View::Month { year: None, month: None } }
        );
        assert_eq!(
            parse_sql("SELECT * FROM availability WHERE period = '2024-06'").unwrap(),
            Command::SelectAvailability { view: View::Month { year: Some(2024), month: Some(6) } }
        );
        assert!(parse_sql("SELECT * FROM availability WHERE period = '2024-13'").is_err());
    }

    #[test]
    fn parse_reservation_reads() {
        assert_eq!(
            parse_sql("SELECT * FROM reservations").unwrap(),
            Command::SelectReservations { phone: None }
        );
        assert_eq!(
            parse_sql("SELECT * FROM reservations WHERE phone = '010-1234-5678'").unwrap(),
            Command::SelectReservations { phone: Some("010-1234-5678".into()) }
        );
    }

    #[test]
    fn parse_invite_codes() {
        assert_eq!(
            parse_sql("INSERT INTO invite_codes (code) VALUES ('spring')").unwrap(),
            Command::InsertInviteCode { code: "spring".into() }
        );
        assert_eq!(
            parse_sql("SELECT * FROM invite_codes").unwrap(),
            Command::SelectInviteCode
        );
    }

    #[test]
    fn parse_delete_reservation() {
        let sql = format!("DELETE FROM reservations WHERE id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::DeleteReservation { id: Ulid::from_string(ID).unwrap() }
        );
        assert!(parse_sql(&format!("DELETE FROM waitlist WHERE id = '{ID}'")).is_err());
    }

    #[test]
    fn parse_multi_row_insert_errors() {
        let sql = "INSERT INTO booking_links VALUES ('a'), ('b')";
        assert!(matches!(parse_sql(sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO foobar (id) VALUES ('{ID}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(_))));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }
}
