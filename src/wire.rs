use std::fmt::Debug;
use std::path::Path;
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

use crate::auth::AulaAuthSource;
use crate::catalog;
use crate::engine::{Engine, EngineError};
use crate::export;
use crate::model::CellView;
use crate::notify::Channel;
use crate::observability;
use crate::snapshot;
use crate::sql::{self, Command};
use crate::term::TermManager;

pub struct AulaHandler {
    terms: Arc<TermManager>,
    query_parser: Arc<AulaQueryParser>,
}

impl AulaHandler {
    pub fn new(terms: Arc<TermManager>) -> Self {
        Self {
            terms,
            query_parser: Arc::new(AulaQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let term = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.terms.get_or_create(&term).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("term error: {e}"),
            )))
        })
    }

    async fn execute_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertRoom { id, name, capacity } => {
                engine
                    .add_room(id, name, capacity)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpdateRoom { id, name, capacity } => {
                engine
                    .update_room(id, name, capacity)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("UPDATE").with_rows(1))])
            }
            Command::DeleteRoom { id } => {
                engine.remove_room(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertSection {
                id,
                course,
                trimester,
                students,
                room_id,
            } => {
                engine
                    .create_section(id, course, trimester, students, room_id)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::DeleteSection { id } => {
                engine.delete_section(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::InsertPlacement {
                id,
                section_id,
                day,
                slot,
            } => {
                engine
                    .place(id, section_id, day, slot)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::BatchInsertPlacements { placements } => {
                let count = placements.len();
                engine.batch_place(placements).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(
                    Tag::new("INSERT").with_rows(count),
                )])
            }
            Command::DeletePlacement { id } => {
                engine.unplace(id).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("DELETE").with_rows(1))])
            }
            Command::SelectRooms { min_capacity } => {
                let schema = Arc::new(rooms_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .list_rooms(min_capacity)
                    .await
                    .into_iter()
                    .map(|room| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&room.id.to_string())?;
                        encoder.encode_field(&room.name)?;
                        encoder.encode_field(&(room.capacity as i32))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectSections { trimester } => {
                let schema = Arc::new(sections_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .list_sections(trimester)
                    .await
                    .into_iter()
                    .map(|s| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&s.id.to_string())?;
                        encoder.encode_field(&s.course)?;
                        encoder.encode_field(&(s.trimester as i32))?;
                        encoder.encode_field(&(s.number as i32))?;
                        encoder.encode_field(&(s.students as i32))?;
                        encoder.encode_field(&s.room_id.to_string())?;
                        encoder.encode_field(&s.label)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectGroupGrid { trimester } => {
                let views = engine.group_grid(trimester).await.map_err(engine_err)?;
                Ok(vec![grid_response(views)?])
            }
            Command::SelectRoomGrid { room_id } => {
                let views = engine.room_grid(room_id).await.map_err(engine_err)?;
                Ok(vec![grid_response(views)?])
            }
            Command::SelectPool { trimester } => {
                let schema = Arc::new(pool_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .pool(trimester)
                    .await
                    .into_iter()
                    .map(|entry| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&entry.course)?;
                        encoder.encode_field(&entry.label)?;
                        encoder.encode_field(&entry.section_id.map(|id| id.to_string()))?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectFreeSlots { room_id } => {
                let cells = engine.free_cells(room_id).await.map_err(engine_err)?;
                Ok(vec![cells_response(cells)?])
            }
            Command::SelectPlaceable { section_id } => {
                let cells = engine
                    .placeable_cells(section_id)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![cells_response(cells)?])
            }
            Command::SelectCatalog { trimester } => {
                let schema = Arc::new(catalog_schema());
                let trimesters: Vec<u8> = match trimester {
                    Some(t) => vec![t],
                    None => (1..=catalog::TRIMESTER_COUNT).collect(),
                };
                let mut rows = Vec::new();
                for t in trimesters {
                    for course in catalog::courses(t) {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&(t as i32))?;
                        encoder.encode_field(course)?;
                        encoder.encode_field(&catalog::color(t))?;
                        rows.push(Ok(encoder.take_row()));
                    }
                }
                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::Listen { channel } => {
                // Validated here; delivery is the in-process NotifyHub.
                Channel::parse(&channel).ok_or_else(|| {
                    PgWireError::UserError(Box::new(ErrorInfo::new(
                        "ERROR".into(),
                        "42000".into(),
                        format!("invalid channel: {channel} (expected room_<id> or group_<n>)"),
                    )))
                })?;
                Ok(vec![Response::Execution(Tag::new("LISTEN"))])
            }
            Command::ExportGroups { path } => {
                let sheets = export::export_groups(engine, Path::new(&path))
                    .await
                    .map_err(export_err)?;
                Ok(vec![Response::Execution(
                    Tag::new("EXPORT").with_rows(sheets),
                )])
            }
            Command::ExportRooms { path } => {
                let sheets = export::export_rooms(engine, Path::new(&path))
                    .await
                    .map_err(export_err)?;
                Ok(vec![Response::Execution(
                    Tag::new("EXPORT").with_rows(sheets),
                )])
            }
            Command::Backup { path } => {
                snapshot::backup(engine, Path::new(&path))
                    .await
                    .map_err(snapshot_err)?;
                Ok(vec![Response::Execution(Tag::new("BACKUP"))])
            }
            Command::Restore { path } => {
                let summary = snapshot::restore(engine, Path::new(&path))
                    .await
                    .map_err(snapshot_err)?;
                Ok(vec![Response::Execution(
                    Tag::new("RESTORE").with_rows(summary.placements),
                )])
            }
        }
    }
}

// ── Row schemas ──────────────────────────────────────────────────

fn varchar(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn int4(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::INT4, FieldFormat::Text)
}

fn rooms_schema() -> Vec<FieldInfo> {
    vec![varchar("id"), varchar("name"), int4("capacity")]
}

fn sections_schema() -> Vec<FieldInfo> {
    vec![
        varchar("id"),
        varchar("course"),
        int4("trimester"),
        int4("number"),
        int4("students"),
        varchar("room_id"),
        varchar("label"),
    ]
}

fn grid_schema() -> Vec<FieldInfo> {
    vec![
        varchar("day"),
        varchar("slot"),
        varchar("placement_id"),
        varchar("section_id"),
        varchar("course"),
        varchar("room"),
        varchar("label"),
    ]
}

fn pool_schema() -> Vec<FieldInfo> {
    vec![varchar("course"), varchar("label"), varchar("section_id")]
}

fn cells_schema() -> Vec<FieldInfo> {
    vec![varchar("day"), varchar("slot")]
}

fn catalog_schema() -> Vec<FieldInfo> {
    vec![int4("trimester"), varchar("course"), varchar("color")]
}

fn grid_response(views: Vec<CellView>) -> PgWireResult<Response> {
    let schema = Arc::new(grid_schema());
    let rows: Vec<PgWireResult<_>> = views
        .into_iter()
        .map(|v| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&v.cell.day.as_str())?;
            encoder.encode_field(&v.cell.slot.label())?;
            encoder.encode_field(&v.placement_id.to_string())?;
            encoder.encode_field(&v.section_id.to_string())?;
            encoder.encode_field(&v.course)?;
            encoder.encode_field(&v.room_name)?;
            encoder.encode_field(&v.label)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(
        schema,
        stream::iter(rows),
    )))
}

fn cells_response(cells: Vec<crate::grid::Cell>) -> PgWireResult<Response> {
    let schema = Arc::new(cells_schema());
    let rows: Vec<PgWireResult<_>> = cells
        .into_iter()
        .map(|c| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&c.day.as_str())?;
            encoder.encode_field(&c.slot.label())?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(
        schema,
        stream::iter(rows),
    )))
}

#[async_trait]
impl SimpleQueryHandler for AulaHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.execute_timed(&engine, cmd).await
    }
}

impl AulaHandler {
    async fn execute_timed(&self, engine: &Engine, cmd: Command) -> PgWireResult<Vec<Response>> {
        let label = observability::command_label(&cmd);
        let start = Instant::now();
        let result = self.execute_command(engine, cmd).await;
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        result
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct AulaQueryParser;

#[async_trait]
impl QueryParser for AulaQueryParser {
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
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(select_schema(stmt).unwrap_or_default())
    }
}

/// Statement text → result schema, for Describe responses.
fn select_schema(stmt: &str) -> Option<Vec<FieldInfo>> {
    let upper = stmt.to_uppercase();
    if !upper.contains("SELECT") {
        return None;
    }
    if upper.contains("GROUP_GRID") || upper.contains("ROOM_GRID") {
        Some(grid_schema())
    } else if upper.contains("FREE_SLOTS") || upper.contains("PLACEABLE") {
        Some(cells_schema())
    } else if upper.contains("POOL") {
        Some(pool_schema())
    } else if upper.contains("CATALOG") {
        Some(catalog_schema())
    } else if upper.contains("SECTIONS") {
        Some(sections_schema())
    } else if upper.contains("ROOMS") {
        Some(rooms_schema())
    } else {
        None
    }
}

#[async_trait]
impl ExtendedQueryHandler for AulaHandler {
    type Statement = String;
    type QueryParser = AulaQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self.execute_timed(&engine, cmd).await?;
        Ok(responses.remove(0))
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
            select_schema(&target.statement).unwrap_or_default(),
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
        Ok(DescribePortalResponse::new(
            select_schema(&target.statement.statement).unwrap_or_default(),
        ))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
                && n > max
            {
                max = n;
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }

    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct AulaFactory {
    handler: Arc<AulaHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<AulaAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl AulaFactory {
    pub fn new(terms: Arc<TermManager>, password: String) -> Self {
        let auth_source = AulaAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(AulaHandler::new(terms)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for AulaFactory {
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

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    terms: Arc<TermManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> Result<(), std::io::Error> {
    let factory = Arc::new(AulaFactory::new(terms, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn engine_err(e: EngineError) -> PgWireError {
    if matches!(
        e,
        EngineError::RoomOccupied { .. } | EngineError::GroupOccupied { .. }
    ) {
        metrics::counter!(observability::PLACEMENT_CONFLICTS_TOTAL).increment(1);
    }
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn sql_err(e: sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

fn export_err(e: export::ExportError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

fn snapshot_err(e: snapshot::SnapshotError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "P0001".into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_resolution_by_statement_text() {
        assert_eq!(
            select_schema("SELECT * FROM group_grid WHERE trimester = 1")
                .unwrap()
                .len(),
            grid_schema().len()
        );
        assert_eq!(
            select_schema("SELECT * FROM rooms").unwrap().len(),
            rooms_schema().len()
        );
        assert_eq!(
            select_schema("SELECT * FROM free_slots WHERE room_id = 'x'")
                .unwrap()
                .len(),
            cells_schema().len()
        );
        assert!(select_schema("INSERT INTO rooms (id) VALUES ('x')").is_none());
    }

    #[test]
    fn count_params_finds_highest() {
        assert_eq!(count_params("SELECT * FROM rooms"), 0);
        assert_eq!(count_params("SELECT * FROM room_grid WHERE room_id = $1"), 1);
        assert_eq!(count_params("... $2 ... $1 ..."), 2);
    }
}
