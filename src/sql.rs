use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::grid::{Day, Slot};
use crate::model::Trimester;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertRoom {
        id: Ulid,
        name: String,
        capacity: u32,
    },
    UpdateRoom {
        id: Ulid,
        name: Option<String>,
        capacity: Option<u32>,
    },
    DeleteRoom {
        id: Ulid,
    },
    InsertSection {
        id: Ulid,
        course: String,
        trimester: Trimester,
        students: u32,
        room_id: Ulid,
    },
    DeleteSection {
        id: Ulid,
    },
    InsertPlacement {
        id: Ulid,
        section_id: Ulid,
        day: Day,
        slot: Slot,
    },
    BatchInsertPlacements {
        placements: Vec<(Ulid, Ulid, Day, Slot)>, // (id, section_id, day, slot)
    },
    DeletePlacement {
        id: Ulid,
    },
    SelectRooms {
        min_capacity: Option<u32>,
    },
    SelectSections {
        trimester: Option<Trimester>,
    },
    SelectGroupGrid {
        trimester: Trimester,
    },
    SelectRoomGrid {
        room_id: Ulid,
    },
    SelectPool {
        trimester: Trimester,
    },
    SelectFreeSlots {
        room_id: Ulid,
    },
    SelectPlaceable {
        section_id: Ulid,
    },
    SelectCatalog {
        trimester: Option<Trimester>,
    },
    Listen {
        channel: String,
    },
    ExportGroups {
        path: String,
    },
    ExportRooms {
        path: String,
    },
    Backup {
        path: String,
    },
    Restore {
        path: String,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let trimmed = sql.trim().trim_end_matches(';').trim();

    // Keyword commands sit outside the SQL grammar, like LISTEN does for
    // the reference server.
    if let Some(rest) = strip_keyword(trimmed, "LISTEN ") {
        return Ok(Command::Listen {
            channel: rest.trim().to_string(),
        });
    }
    if let Some(rest) = strip_keyword(trimmed, "EXPORT GROUPS TO ") {
        return Ok(Command::ExportGroups {
            path: parse_quoted(rest)?,
        });
    }
    if let Some(rest) = strip_keyword(trimmed, "EXPORT ROOMS TO ") {
        return Ok(Command::ExportRooms {
            path: parse_quoted(rest)?,
        });
    }
    if let Some(rest) = strip_keyword(trimmed, "BACKUP TO ") {
        return Ok(Command::Backup {
            path: parse_quoted(rest)?,
        });
    }
    if let Some(rest) = strip_keyword(trimmed, "RESTORE FROM ") {
        return Ok(Command::Restore {
            path: parse_quoted(rest)?,
        });
    }

    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn strip_keyword<'a>(input: &'a str, keyword: &str) -> Option<&'a str> {
    if input.len() >= keyword.len() && input[..keyword.len()].eq_ignore_ascii_case(keyword) {
        Some(&input[keyword.len()..])
    } else {
        None
    }
}

fn parse_quoted(s: &str) -> Result<String, SqlError> {
    let t = s.trim();
    let inner = t
        .strip_prefix('\'')
        .and_then(|r| r.strip_suffix('\''))
        .ok_or_else(|| SqlError::Parse(format!("expected quoted path, got {t}")))?;
    if inner.is_empty() {
        return Err(SqlError::Parse("empty path".into()));
    }
    Ok(inner.to_string())
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;

    match table.as_str() {
        "rooms" => {
            let values = extract_insert_values(insert)?;
            if values.len() < 3 {
                return Err(SqlError::WrongArity("rooms", 3, values.len()));
            }
            Ok(Command::InsertRoom {
                id: parse_ulid(&values[0])?,
                name: parse_string(&values[1])?,
                capacity: parse_u32(&values[2])?,
            })
        }
        "sections" => {
            let values = extract_insert_values(insert)?;
            if values.len() < 5 {
                return Err(SqlError::WrongArity("sections", 5, values.len()));
            }
            Ok(Command::InsertSection {
                id: parse_ulid(&values[0])?,
                course: parse_string(&values[1])?,
                trimester: parse_u8(&values[2])?,
                students: parse_u32(&values[3])?,
                room_id: parse_ulid(&values[4])?,
            })
        }
        "placements" => {
            let all_rows = extract_all_insert_rows(insert)?;
            if all_rows.len() == 1 {
                let values = &all_rows[0];
                if values.len() < 4 {
                    return Err(SqlError::WrongArity("placements", 4, values.len()));
                }
                Ok(Command::InsertPlacement {
                    id: parse_ulid(&values[0])?,
                    section_id: parse_ulid(&values[1])?,
                    day: parse_day(&values[2])?,
                    slot: parse_slot(&values[3])?,
                })
            } else {
                let mut placements = Vec::with_capacity(all_rows.len());
                for (i, row) in all_rows.iter().enumerate() {
                    if row.len() < 4 {
                        return Err(SqlError::WrongArity("placements row", 4, row.len()));
                    }
                    placements.push((
                        parse_ulid(&row[0]).map_err(|e| SqlError::Parse(format!("row {i}: {e}")))?,
                        parse_ulid(&row[1]).map_err(|e| SqlError::Parse(format!("row {i}: {e}")))?,
                        parse_day(&row[2]).map_err(|e| SqlError::Parse(format!("row {i}: {e}")))?,
                        parse_slot(&row[3]).map_err(|e| SqlError::Parse(format!("row {i}: {e}")))?,
                    ));
                }
                Ok(Command::BatchInsertPlacements { placements })
            }
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    if table != "rooms" {
        return Err(SqlError::UnknownTable(table));
    }

    let id = extract_where_id(selection)?;
    let mut name = None;
    let mut capacity = None;
    for assignment in assignments {
        let col = assignment_column(assignment)?;
        match col.as_str() {
            "name" => name = Some(parse_string(&assignment.value)?),
            "capacity" => capacity = Some(parse_u32(&assignment.value)?),
            other => return Err(SqlError::Parse(format!("unknown column in SET: {other}"))),
        }
    }
    if name.is_none() && capacity.is_none() {
        return Err(SqlError::Parse("UPDATE without assignments".into()));
    }
    Ok(Command::UpdateRoom { id, name, capacity })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "rooms" => Ok(Command::DeleteRoom { id }),
        "sections" => Ok(Command::DeleteSection { id }),
        "placements" => Ok(Command::DeletePlacement { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        extract_filters(selection, &mut filters)?;
    }

    match table.as_str() {
        "rooms" => Ok(Command::SelectRooms {
            min_capacity: filters.min_capacity,
        }),
        "sections" => Ok(Command::SelectSections {
            trimester: filters.trimester,
        }),
        "group_grid" => Ok(Command::SelectGroupGrid {
            trimester: filters
                .trimester
                .ok_or(SqlError::MissingFilter("trimester"))?,
        }),
        "room_grid" => Ok(Command::SelectRoomGrid {
            room_id: filters.room_id.ok_or(SqlError::MissingFilter("room_id"))?,
        }),
        "pool" => Ok(Command::SelectPool {
            trimester: filters
                .trimester
                .ok_or(SqlError::MissingFilter("trimester"))?,
        }),
        "free_slots" => Ok(Command::SelectFreeSlots {
            room_id: filters.room_id.ok_or(SqlError::MissingFilter("room_id"))?,
        }),
        "placeable" => Ok(Command::SelectPlaceable {
            section_id: filters
                .section_id
                .ok_or(SqlError::MissingFilter("section_id"))?,
        }),
        "catalog" => Ok(Command::SelectCatalog {
            trimester: filters.trimester,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

#[derive(Default)]
struct Filters {
    trimester: Option<Trimester>,
    room_id: Option<Ulid>,
    section_id: Option<Ulid>,
    min_capacity: Option<u32>,
}

fn extract_filters(expr: &Expr, filters: &mut Filters) -> Result<(), SqlError> {
    if let Expr::BinaryOp { left, op, right } = expr {
        match op {
            ast::BinaryOperator::And => {
                extract_filters(left, filters)?;
                extract_filters(right, filters)?;
            }
            ast::BinaryOperator::Eq => match expr_column_name(left).as_deref() {
                Some("trimester") => filters.trimester = Some(parse_u8(right)?),
                Some("room_id") => filters.room_id = Some(parse_ulid(right)?),
                Some("section_id") => filters.section_id = Some(parse_ulid(right)?),
                _ => {}
            },
            ast::BinaryOperator::GtEq => {
                if expr_column_name(left).as_deref() == Some("capacity") {
                    filters.min_capacity = Some(parse_u32(right)?);
                }
            }
            _ => {}
        }
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

fn assignment_column(assignment: &ast::Assignment) -> Result<String, SqlError> {
    match &assignment.target {
        ast::AssignmentTarget::ColumnName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))
        }
        _ => Err(SqlError::Parse("unsupported SET target".into())),
    }
}

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows[0].clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
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
                parse_ulid(right)
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

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
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

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::SingleQuotedString(s) => Ok(s.clone()),
            _ => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        }
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad i64: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64_expr(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr:?}")))
    }
}

fn parse_u32(expr: &Expr) -> Result<u32, SqlError> {
    let v = parse_i64_expr(expr)?;
    u32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u32 range")))
}

fn parse_u8(expr: &Expr) -> Result<u8, SqlError> {
    let v = parse_i64_expr(expr)?;
    u8::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of u8 range")))
}

fn parse_day(expr: &Expr) -> Result<Day, SqlError> {
    let s = parse_string(expr)?;
    Day::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad day: {s}")))
}

fn parse_slot(expr: &Expr) -> Result<Slot, SqlError> {
    let s = parse_string(expr)?;
    Slot::parse(&s).ok_or_else(|| SqlError::Parse(format!("bad time slot: {s}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(&'static str, usize, usize),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
