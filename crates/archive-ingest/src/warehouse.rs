//! Analytical table and its rescue table.
//!
//! Table and column names are interpolated into SQL. Every name has passed
//! [`is_valid_identifier`] and is emitted through [`quote`], so keywords such
//! as `order` are usable column names.

use crate::error::{IngestError, IngestResult};
use crate::schema::{IngestRow, INGESTED_BATCH, METADATA_INGESTED_AT, SOURCE_OBJECT};
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, TransactionBehavior};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};
use worklog_config_and_utils::{is_valid_identifier, MergeMode};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A record routed around the schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RescuedRecord {
    pub object_key: String,
    pub raw_payload: String,
    pub reason: String,
    pub rescued_at: String,
}

/// One archive object after schema validation.
#[derive(Debug, Clone)]
pub enum Staged {
    Row { key: String, row: IngestRow },
    Rescued(RescuedRecord),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub rows: usize,
    pub rescued: usize,
    pub columns_added: usize,
}

pub struct Warehouse {
    conn: Connection,
    table: String,
    rescue_table: String,
    mode: MergeMode,
}

impl Warehouse {
    pub fn open(path: impl AsRef<Path>, table: &str, mode: MergeMode) -> IngestResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(IngestError::io(parent))?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let warehouse = Self::with_connection(conn, table, mode)?;
        info!(path = %path.display(), table = %warehouse.table, mode = mode.as_str(), "Warehouse opened");
        Ok(warehouse)
    }

    /// In-memory warehouse. Useful for testing.
    pub fn in_memory(table: &str, mode: MergeMode) -> IngestResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, table, mode)
    }

    fn with_connection(conn: Connection, table: &str, mode: MergeMode) -> IngestResult<Self> {
        if !is_valid_identifier(table) {
            return Err(IngestError::InvalidTableName(table.to_string()));
        }
        Ok(Self {
            conn,
            table: table.to_string(),
            rescue_table: format!("{table}_rescued"),
            mode,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn rescue_table(&self) -> &str {
        &self.rescue_table
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    /// Writes one batch of rows and rescues in a single transaction.
    ///
    /// Rows and rescues already tagged with `batch_id` are replaced, so
    /// merging the same batch twice leaves one copy.
    pub fn merge_batch(&mut self, batch_id: u64, staged: &[Staged]) -> IngestResult<MergeStats> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        create_tables(&tx, &self.table, &self.rescue_table, self.mode)?;

        let mut replaced = 0;
        for table in [&self.table, &self.rescue_table] {
            replaced += tx.execute(
                &format!("DELETE FROM {} WHERE {INGESTED_BATCH} = ?1", quote(table)),
                params![batch_id as i64],
            )?;
        }
        if replaced > 0 {
            debug!(batch_id, replaced, "Replacing earlier merge of batch");
        }

        let mut columns = table_columns(&tx, &self.table)?;
        let mut stats = MergeStats::default();

        for item in staged {
            let Staged::Row { row, .. } = item else {
                continue;
            };
            for name in row.extra.keys() {
                if resolve_column(&columns, name).is_none() {
                    tx.execute(
                        &format!(
                            "ALTER TABLE {} ADD COLUMN {} TEXT",
                            quote(&self.table),
                            quote(name)
                        ),
                        [],
                    )?;
                    debug!(table = %self.table, column = %name, "Column added");
                    columns.push(name.clone());
                    stats.columns_added += 1;
                }
            }
        }

        let insert = insert_sql(&self.table, &columns, self.mode);
        let rescue = format!(
            "INSERT INTO {} (object_key, raw_payload, reason, rescued_at, {INGESTED_BATCH})
             VALUES (?1, ?2, ?3, ?4, ?5)",
            quote(&self.rescue_table)
        );

        for item in staged {
            match item {
                Staged::Row { key, row } => {
                    let values = row_values(&columns, key, row, batch_id);
                    tx.execute(&insert, params_from_iter(values))?;
                    stats.rows += 1;
                }
                Staged::Rescued(record) => {
                    tx.execute(
                        &rescue,
                        params![
                            record.object_key,
                            record.raw_payload,
                            record.reason,
                            record.rescued_at,
                            batch_id as i64
                        ],
                    )?;
                    stats.rescued += 1;
                }
            }
        }

        tx.commit()?;
        debug!(
            batch_id,
            rows = stats.rows,
            rescued = stats.rescued,
            columns_added = stats.columns_added,
            "Batch merged"
        );
        Ok(stats)
    }

    /// Drops both tables if they exist. Returns whether anything was dropped.
    pub fn drop_tables(&mut self) -> IngestResult<bool> {
        let existed = self.table_exists(&self.table)? || self.table_exists(&self.rescue_table)?;
        self.conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {}; DROP TABLE IF EXISTS {};",
            quote(&self.table),
            quote(&self.rescue_table)
        ))?;
        if existed {
            info!(table = %self.table, "Warehouse tables dropped");
        }
        Ok(existed)
    }

    fn table_exists(&self, name: &str) -> IngestResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn count(&self, table: &str) -> IngestResult<usize> {
        if !self.table_exists(table)? {
            return Ok(0);
        }
        let sql = format!("SELECT COUNT(*) FROM {}", quote(table));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn row_count(&self) -> IngestResult<usize> {
        self.count(&self.table)
    }

    pub fn rescued_count(&self) -> IngestResult<usize> {
        self.count(&self.rescue_table)
    }

    /// Every row of the table as a JSON object, in insertion order.
    pub fn rows(&self) -> IngestResult<Vec<Map<String, Value>>> {
        self.dump(&self.table)
    }

    /// Every rescued record as a JSON object, in insertion order.
    pub fn rescued_rows(&self) -> IngestResult<Vec<Map<String, Value>>> {
        self.dump(&self.rescue_table)
    }

    fn dump(&self, table: &str) -> IngestResult<Vec<Map<String, Value>>> {
        if !self.table_exists(table)? {
            return Ok(Vec::new());
        }
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT * FROM {} ORDER BY rowid", quote(table)))?;
        let names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut object = Map::new();
            for (i, name) in names.iter().enumerate() {
                object.insert(name.clone(), json_value(row.get_ref(i)?));
            }
            out.push(object);
        }
        Ok(out)
    }

    /// Column names of the table, empty when it does not exist.
    pub fn columns(&self) -> IngestResult<Vec<String>> {
        table_columns(&self.conn, &self.table)
    }
}

fn create_tables(
    conn: &Connection,
    table: &str,
    rescue_table: &str,
    mode: MergeMode,
) -> IngestResult<()> {
    let index = quote(&format!("{table}_id_unique"));
    let (table, rescue_table) = (quote(table), quote(rescue_table));
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id TEXT NOT NULL,
            process_id TEXT NOT NULL,
            process_name TEXT,
            person_name TEXT NOT NULL,
            status TEXT NOT NULL,
            duration REAL NOT NULL,
            start_timestamp TEXT NOT NULL,
            end_timestamp TEXT NOT NULL,
            {METADATA_INGESTED_AT} TEXT NOT NULL,
            {SOURCE_OBJECT} TEXT NOT NULL,
            {INGESTED_BATCH} INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS {rescue_table} (
            object_key TEXT NOT NULL,
            raw_payload TEXT NOT NULL,
            reason TEXT NOT NULL,
            rescued_at TEXT NOT NULL,
            {INGESTED_BATCH} INTEGER NOT NULL
        );"
    ))?;
    if mode == MergeMode::UpsertById {
        conn.execute_batch(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {index} ON {table} (id);"
        ))?;
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> IngestResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote(table)))?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(columns)
}

/// SQLite column names are case-insensitive.
fn resolve_column<'a>(columns: &'a [String], name: &str) -> Option<&'a str> {
    columns
        .iter()
        .find(|c| c.eq_ignore_ascii_case(name))
        .map(String::as_str)
}

/// Double-quoted SQL identifier.
fn quote(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn insert_sql(table: &str, columns: &[String], mode: MergeMode) -> String {
    let table = quote(table);
    let names = columns
        .iter()
        .map(|c| quote(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let mut sql = format!("INSERT INTO {table} ({names}) VALUES ({placeholders})");

    if mode == MergeMode::UpsertById {
        let assignments = columns
            .iter()
            .map(|c| {
                let c = quote(c);
                format!("{c} = excluded.{c}")
            })
            .collect::<Vec<_>>()
            .join(", ");
        // Ties go to the record merged last.
        sql.push_str(&format!(
            " ON CONFLICT (id) DO UPDATE SET {assignments}
              WHERE julianday(excluded.{METADATA_INGESTED_AT})
                 >= julianday({table}.{METADATA_INGESTED_AT})"
        ));
    }
    sql
}

/// Binds one row against the full column list; absent extras are NULL.
fn row_values(
    columns: &[String],
    key: &str,
    row: &IngestRow,
    batch_id: u64,
) -> Vec<rusqlite::types::Value> {
    use rusqlite::types::Value as Sql;

    let mut extra: BTreeMap<String, Option<&String>> = BTreeMap::new();
    for (name, value) in &row.extra {
        if let Some(column) = resolve_column(columns, name) {
            extra.insert(column.to_string(), value.as_ref());
        }
    }

    let text = |s: &str| Sql::Text(s.to_string());
    columns
        .iter()
        .map(|column| match column.as_str() {
            "id" => text(&row.id),
            "process_id" => text(&row.process_id),
            "process_name" => row.process_name.as_deref().map_or(Sql::Null, text),
            "person_name" => text(&row.person_name),
            "status" => text(&row.status),
            "duration" => Sql::Real(row.duration),
            "start_timestamp" => text(&row.start_timestamp),
            "end_timestamp" => text(&row.end_timestamp),
            METADATA_INGESTED_AT => text(&row.ingested_at),
            SOURCE_OBJECT => text(key),
            INGESTED_BATCH => Sql::Integer(batch_id as i64),
            other => match extra.get(other) {
                Some(Some(value)) => text(value),
                _ => Sql::Null,
            },
        })
        .collect()
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
