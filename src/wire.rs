//! PostgreSQL wire-protocol boundary (§1: "treated as a byte-stream
//! adapter that calls into the core" — specified only at the level of the
//! contract it imposes). Bridges `pgwire`'s async server traits to
//! [`dispatcher::exec_sql`] over a single shared, mutex-serialized
//! `Database`, matching the core's single-writer transaction model (§1
//! Non-goals: "concurrent transactions").

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use futures::sink::Sink;
use futures::stream;
use pgwire::api::auth::noop::NoopStartupHandler;
use pgwire::api::query::SimpleQueryHandler;
use pgwire::api::results::{DataRowEncoder, FieldFormat, FieldInfo, QueryResponse, Response, Tag};
use pgwire::api::{ClientInfo, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use tokio::sync::Mutex;

use crate::cell::{Cell, CellType, CellValue, Rows};
use crate::database::Database;
use crate::dispatcher;
use crate::error::MskqlError;

fn cell_type_to_pg(ty: CellType) -> Type {
    match ty {
        CellType::SmallInt => Type::INT2,
        CellType::Int => Type::INT4,
        CellType::BigInt => Type::INT8,
        CellType::Float => Type::FLOAT8,
        CellType::Numeric => Type::NUMERIC,
        CellType::Boolean => Type::BOOL,
        CellType::Text | CellType::Enum => Type::VARCHAR,
        CellType::Date => Type::DATE,
        CellType::Time => Type::TIME,
        CellType::Timestamp => Type::TIMESTAMP,
        CellType::TimestampTz => Type::TIMESTAMPTZ,
        CellType::Interval => Type::INTERVAL,
        CellType::Uuid => Type::UUID,
    }
}

fn cell_to_text(cell: &Cell) -> Option<String> {
    let value = cell.value.as_ref()?;
    Some(match value {
        CellValue::SmallInt(v) => v.to_string(),
        CellValue::Int(v) => v.to_string(),
        CellValue::BigInt(v) => v.to_string(),
        CellValue::Float(v) | CellValue::Numeric(v) => v.to_string(),
        CellValue::Boolean(v) => v.to_string(),
        CellValue::Text(v) => v.clone(),
        CellValue::Enum { value, .. } => value.clone(),
        CellValue::Date(v) => v.to_string(),
        CellValue::Time(v) => v.to_string(),
        CellValue::Timestamp(v) => v.to_string(),
        CellValue::TimestampTz(v) => v.to_rfc3339(),
        CellValue::Interval(v) => format!("{} months {} days {} us", v.months, v.days, v.micros),
        CellValue::Uuid(v) => v.to_string(),
    })
}

fn to_pgwire_error(err: MskqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new("ERROR".to_string(), err.sqlstate().to_string(), err.to_string())))
}

/// Reject a query text larger than the configured cap before it ever
/// reaches the dispatcher (§SPEC_FULL.md A.3 `max_message_bytes`).
fn check_message_size(query: &str, max_message_bytes: usize) -> PgWireResult<()> {
    if query.len() > max_message_bytes {
        return Err(to_pgwire_error(MskqlError::execution(format!(
            "query text of {} bytes exceeds max_message_bytes ({})",
            query.len(),
            max_message_bytes
        ))));
    }
    Ok(())
}

fn encode_rows(rows: Rows) -> QueryResponse<'static> {
    let fields: Vec<FieldInfo> =
        rows.columns.iter().map(|c| FieldInfo::new(c.name.clone(), None, None, cell_type_to_pg(c.ty), FieldFormat::Text)).collect();
    let fields = Arc::new(fields);
    let schema = fields.clone();
    let row_stream = stream::iter(rows.rows.into_iter().map(move |row| {
        let mut encoder = DataRowEncoder::new(schema.clone());
        for cell in &row.cells {
            encoder.encode_field(&cell_to_text(cell))?;
        }
        encoder.finish()
    }));
    QueryResponse::new(fields, row_stream)
}

/// One pgwire-facing response per statement: a row set for `SELECT`-shaped
/// statements, a command tag for everything else.
fn to_response(rows: Rows) -> Response<'static> {
    match rows.command_tag.clone() {
        Some(tag) => Response::Execution(Tag::new(&tag)),
        None => Response::Query(encode_rows(rows)),
    }
}

/// Per-connection handler sharing one mutex-guarded `Database` with every
/// other connection on the server.
pub struct MskqlHandler {
    db: Arc<Mutex<Database>>,
    max_message_bytes: usize,
}

impl MskqlHandler {
    pub fn new(db: Arc<Mutex<Database>>, max_message_bytes: usize) -> Self {
        MskqlHandler { db, max_message_bytes }
    }

    async fn execute(&self, sql: &str) -> PgWireResult<Response<'static>> {
        let mut db = self.db.lock().await;
        let rows = dispatcher::exec_sql(&mut db, sql).map_err(to_pgwire_error)?;
        Ok(to_response(rows))
    }
}

#[async_trait]
impl SimpleQueryHandler for MskqlHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response<'static>>>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        check_message_size(query, self.max_message_bytes)?;
        tracing::debug!(query, "executing statement");
        Ok(vec![self.execute(query).await?])
    }
}

/// Factory handed to pgwire's TCP acceptor: every connection gets its own
/// [`MskqlHandler`] wrapping the same shared `Database`.
pub struct MskqlHandlerFactory {
    db: Arc<Mutex<Database>>,
    max_message_bytes: usize,
}

impl MskqlHandlerFactory {
    pub fn new(db: Arc<Mutex<Database>>, max_message_bytes: usize) -> Self {
        MskqlHandlerFactory { db, max_message_bytes }
    }
}

impl PgWireServerHandlers for MskqlHandlerFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        Arc::new(MskqlHandler::new(self.db.clone(), self.max_message_bytes))
    }

    fn startup_handler(&self) -> Arc<impl pgwire::api::auth::StartupHandler> {
        Arc::new(NoopStartupHandler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_type_oids_match_wire_catalog() {
        assert_eq!(cell_type_to_pg(CellType::Int), Type::INT4);
        assert_eq!(cell_type_to_pg(CellType::Text), Type::VARCHAR);
    }

    #[test]
    fn null_cell_encodes_to_none() {
        assert_eq!(cell_to_text(&Cell::null(CellType::Int)), None);
        assert_eq!(cell_to_text(&Cell::int(4)), Some("4".to_string()));
    }

    #[test]
    fn oversized_query_is_rejected() {
        assert!(check_message_size("select 1", 16).is_ok());
        assert!(check_message_size("select 1 from a_much_longer_table_name", 16).is_err());
    }
}
