//! [`Store`] backed by a `DuckDB` file.
//!
//! Timestamps are stored as UTC microseconds (`BIGINT`), ids as their
//! hyphenated UUID text, severities as their numeric rank. Hotspot
//! membership lives in `hotspot_members` keyed by report id, so a report
//! can belong to at most one hotspot and the report count is always
//! derived from the membership rows.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use duckdb::{Connection, Row, params};
use road_intel_hotspot_models::{
    Hotspot, HotspotFilter, HotspotId, OutboxEntry, OutboxId, ReportFilter, priority_order,
};
use road_intel_report_models::{
    Coordinates, Report, ReportId, ReportStatus, Severity, StatusChange,
};

use crate::{DbError, Store, Write, WriteBatch, apply_limit, lease_cutoff};

const REPORT_COLUMNS: &str =
    "id, latitude, longitude, severity, confidence, description, city, status, created_at";

const HOTSPOT_COLUMNS: &str = "id, latitude, longitude, max_severity, escalated, escalated_at, \
     city, representative_text, created_at, updated_at";

/// A `DuckDB` connection guarded for use from many tasks.
pub struct DuckDbStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for DuckDbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuckDbStore").finish_non_exhaustive()
    }
}

impl DuckDbStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            crate::paths::ensure_dir(parent)?;
        }

        log::debug!("Opening store at {}", path.display());
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens the store at the default path.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_default() -> Result<Self, DbError> {
        Self::open(&crate::paths::store_db_path())
    }

    /// Opens a throwaway in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DbError> {
        self.conn.lock().map_err(|_| DbError::LockPoisoned)
    }
}

/// Creates all tables if they don't exist yet. Safe to run repeatedly.
fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reports (
            id TEXT PRIMARY KEY,
            latitude DOUBLE NOT NULL,
            longitude DOUBLE NOT NULL,
            severity INTEGER NOT NULL,
            confidence DOUBLE NOT NULL,
            description TEXT,
            city TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at BIGINT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS hotspots (
            id TEXT PRIMARY KEY,
            latitude DOUBLE NOT NULL,
            longitude DOUBLE NOT NULL,
            max_severity INTEGER NOT NULL,
            escalated BOOLEAN NOT NULL DEFAULT FALSE,
            escalated_at BIGINT,
            claimed_at BIGINT,
            city TEXT NOT NULL,
            representative_text TEXT,
            created_at BIGINT NOT NULL,
            updated_at BIGINT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS hotspot_members (
            report_id TEXT PRIMARY KEY,
            hotspot_id TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS report_status_history (
            report_id TEXT NOT NULL,
            seq BIGINT NOT NULL,
            from_status TEXT NOT NULL,
            to_status TEXT NOT NULL,
            note TEXT,
            changed_at BIGINT NOT NULL,
            PRIMARY KEY (report_id, seq)
        );

        CREATE TABLE IF NOT EXISTS escalation_outbox (
            id TEXT PRIMARY KEY,
            hotspot_id TEXT NOT NULL,
            created_at BIGINT NOT NULL,
            attempts BIGINT NOT NULL DEFAULT 0,
            last_error TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_members_hotspot ON hotspot_members (hotspot_id);",
    )?;
    Ok(())
}

fn conversion(message: impl Into<String>) -> DbError {
    DbError::Conversion {
        message: message.into(),
    }
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| conversion(format!("timestamp out of range: {micros}")))
}

fn severity_from_db(rank: i32) -> Result<Severity, DbError> {
    u8::try_from(rank)
        .ok()
        .and_then(|rank| Severity::from_rank(rank).ok())
        .ok_or_else(|| conversion(format!("invalid severity rank: {rank}")))
}

fn status_from_db(value: &str) -> Result<ReportStatus, DbError> {
    value
        .parse()
        .map_err(|_| conversion(format!("invalid report status: {value:?}")))
}

fn parse_id<T: std::str::FromStr>(value: &str) -> Result<T, DbError> {
    value
        .parse()
        .map_err(|_| conversion(format!("invalid id: {value:?}")))
}

/// A dynamically bound query parameter.
enum SqlParam {
    Text(String),
    Double(f64),
    Int(i64),
}

fn query_rows<T>(
    conn: &Connection,
    sql: &str,
    params: &[SqlParam],
    map: impl Fn(&Row<'_>) -> duckdb::Result<T>,
) -> Result<Vec<T>, DbError> {
    let mut stmt = conn.prepare(sql)?;
    for (i, param) in params.iter().enumerate() {
        match param {
            SqlParam::Text(v) => stmt.raw_bind_parameter(i + 1, v)?,
            SqlParam::Double(v) => stmt.raw_bind_parameter(i + 1, *v)?,
            SqlParam::Int(v) => stmt.raw_bind_parameter(i + 1, *v)?,
        }
    }

    stmt.raw_execute()?;
    let mut rows = stmt.raw_query();
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(map(row)?);
    }
    Ok(out)
}

struct ReportRow {
    id: String,
    latitude: f64,
    longitude: f64,
    severity: i32,
    confidence: f64,
    description: Option<String>,
    city: String,
    status: String,
    created_at: i64,
}

impl ReportRow {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            latitude: row.get(1)?,
            longitude: row.get(2)?,
            severity: row.get(3)?,
            confidence: row.get(4)?,
            description: row.get(5)?,
            city: row.get(6)?,
            status: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_report(self) -> Result<Report, DbError> {
        Ok(Report {
            id: parse_id(&self.id)?,
            coordinates: Coordinates::new(self.latitude, self.longitude)
                .map_err(|e| conversion(e.to_string()))?,
            severity: severity_from_db(self.severity)?,
            confidence: self.confidence,
            description: self.description,
            city: self.city,
            status: status_from_db(&self.status)?,
            created_at: from_micros(self.created_at)?,
        })
    }
}

struct HotspotRow {
    id: String,
    latitude: f64,
    longitude: f64,
    max_severity: i32,
    escalated: bool,
    escalated_at: Option<i64>,
    city: String,
    representative_text: Option<String>,
    created_at: i64,
    updated_at: i64,
}

impl HotspotRow {
    fn from_row(row: &Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            latitude: row.get(1)?,
            longitude: row.get(2)?,
            max_severity: row.get(3)?,
            escalated: row.get(4)?,
            escalated_at: row.get(5)?,
            city: row.get(6)?,
            representative_text: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
        })
    }

    fn into_hotspot(self, conn: &Connection) -> Result<Hotspot, DbError> {
        let member_ids = query_rows(
            conn,
            "SELECT report_id FROM hotspot_members WHERE hotspot_id = ?",
            &[SqlParam::Text(self.id.clone())],
            |row| row.get::<_, String>(0),
        )?;

        Ok(Hotspot {
            id: parse_id(&self.id)?,
            member_report_ids: member_ids
                .iter()
                .map(|id| parse_id(id))
                .collect::<Result<_, _>>()?,
            representative_coordinates: Coordinates::new(self.latitude, self.longitude)
                .map_err(|e| conversion(e.to_string()))?,
            max_severity: severity_from_db(self.max_severity)?,
            escalated: self.escalated,
            escalated_at: self.escalated_at.map(from_micros).transpose()?,
            city: self.city,
            representative_text: self.representative_text,
            created_at: from_micros(self.created_at)?,
            updated_at: from_micros(self.updated_at)?,
        })
    }
}

fn load_report(conn: &Connection, id: ReportId) -> Result<Option<Report>, DbError> {
    let sql = format!("SELECT {REPORT_COLUMNS} FROM reports WHERE id = ?");
    let rows = query_rows(conn, &sql, &[SqlParam::Text(id.to_string())], ReportRow::from_row)?;
    rows.into_iter().next().map(ReportRow::into_report).transpose()
}

fn load_hotspot(conn: &Connection, id: HotspotId) -> Result<Option<Hotspot>, DbError> {
    let sql = format!("SELECT {HOTSPOT_COLUMNS} FROM hotspots WHERE id = ?");
    let rows = query_rows(conn, &sql, &[SqlParam::Text(id.to_string())], HotspotRow::from_row)?;
    rows.into_iter()
        .next()
        .map(|row| row.into_hotspot(conn))
        .transpose()
}

fn exists(conn: &Connection, sql: &str, id: &str) -> Result<bool, DbError> {
    let mut stmt = conn.prepare(sql)?;
    let count: i64 = stmt.query_row([id], |row| row.get(0))?;
    Ok(count > 0)
}

fn apply_write(conn: &Connection, write: Write) -> Result<(), DbError> {
    match write {
        Write::InsertReport(report) => insert_report(conn, &report),
        Write::ChangeReportStatus(change) => change_status(conn, &change),
        Write::PutHotspot(hotspot) => put_hotspot(conn, &hotspot),
        Write::PutOutbox(entry) => put_outbox(conn, &entry),
        Write::DeleteOutbox(id) => {
            conn.execute(
                "DELETE FROM escalation_outbox WHERE id = ?",
                [id.to_string()],
            )?;
            Ok(())
        }
    }
}

fn insert_report(conn: &Connection, report: &Report) -> Result<(), DbError> {
    let id = report.id.to_string();
    if exists(conn, "SELECT COUNT(*) FROM reports WHERE id = ?", &id)? {
        return Err(DbError::Conflict {
            message: format!("report {id} already exists"),
        });
    }

    conn.execute(
        &format!("INSERT INTO reports ({REPORT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"),
        params![
            id,
            report.coordinates.latitude,
            report.coordinates.longitude,
            i32::from(report.severity.rank()),
            report.confidence,
            report.description.as_deref(),
            report.city,
            report.status.as_ref(),
            to_micros(report.created_at),
        ],
    )?;
    Ok(())
}

fn change_status(conn: &Connection, change: &StatusChange) -> Result<(), DbError> {
    let id = change.report_id.to_string();
    let current = {
        let mut stmt = conn.prepare("SELECT status FROM reports WHERE id = ?")?;
        match stmt.query_row([&id], |row| row.get::<_, String>(0)) {
            Ok(status) => status,
            Err(duckdb::Error::QueryReturnedNoRows) => {
                return Err(DbError::NotFound {
                    message: format!("report {id}"),
                });
            }
            Err(e) => return Err(DbError::DuckDb(e)),
        }
    };

    if current != change.from.as_ref() {
        return Err(DbError::Conflict {
            message: format!("report {id} is {current}, expected {}", change.from),
        });
    }

    conn.execute(
        "UPDATE reports SET status = ? WHERE id = ?",
        params![change.to.as_ref(), id],
    )?;

    let seq: i64 = {
        let mut stmt =
            conn.prepare("SELECT COUNT(*) FROM report_status_history WHERE report_id = ?")?;
        stmt.query_row([&id], |row| row.get(0))?
    };
    conn.execute(
        "INSERT INTO report_status_history (report_id, seq, from_status, to_status, note, changed_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
            id,
            seq,
            change.from.as_ref(),
            change.to.as_ref(),
            change.note.as_deref(),
            to_micros(change.changed_at),
        ],
    )?;
    Ok(())
}

fn put_hotspot(conn: &Connection, hotspot: &Hotspot) -> Result<(), DbError> {
    let id = hotspot.id.to_string();
    if hotspot.member_report_ids.is_empty() {
        return Err(DbError::Conflict {
            message: format!("hotspot {id} has no members"),
        });
    }

    let mut new_members = Vec::new();
    for report_id in &hotspot.member_report_ids {
        let report_id = report_id.to_string();
        let mut stmt = conn.prepare("SELECT hotspot_id FROM hotspot_members WHERE report_id = ?")?;
        match stmt.query_row([&report_id], |row| row.get::<_, String>(0)) {
            Ok(owner) if owner == id => {}
            Ok(owner) => {
                return Err(DbError::Conflict {
                    message: format!("report {report_id} already belongs to hotspot {owner}"),
                });
            }
            Err(duckdb::Error::QueryReturnedNoRows) => new_members.push(report_id),
            Err(e) => return Err(DbError::DuckDb(e)),
        }
    }

    let severity = i32::from(hotspot.max_severity.rank());
    if exists(conn, "SELECT COUNT(*) FROM hotspots WHERE id = ?", &id)? {
        // Escalation columns, city and created_at are left alone.
        conn.execute(
            "UPDATE hotspots
             SET latitude = ?, longitude = ?, max_severity = ?,
                 representative_text = ?, updated_at = ?
             WHERE id = ?",
            params![
                hotspot.representative_coordinates.latitude,
                hotspot.representative_coordinates.longitude,
                severity,
                hotspot.representative_text.as_deref(),
                to_micros(hotspot.updated_at),
                id,
            ],
        )?;
    } else {
        conn.execute(
            "INSERT INTO hotspots
                (id, latitude, longitude, max_severity, escalated, city,
                 representative_text, created_at, updated_at)
             VALUES (?, ?, ?, ?, FALSE, ?, ?, ?, ?)",
            params![
                id,
                hotspot.representative_coordinates.latitude,
                hotspot.representative_coordinates.longitude,
                severity,
                hotspot.city,
                hotspot.representative_text.as_deref(),
                to_micros(hotspot.created_at),
                to_micros(hotspot.updated_at),
            ],
        )?;
    }

    let mut stmt =
        conn.prepare("INSERT INTO hotspot_members (report_id, hotspot_id) VALUES (?, ?)")?;
    for report_id in new_members {
        stmt.execute(params![report_id, id])?;
    }
    Ok(())
}

fn put_outbox(conn: &Connection, entry: &OutboxEntry) -> Result<(), DbError> {
    let id = entry.id.to_string();
    if exists(conn, "SELECT COUNT(*) FROM escalation_outbox WHERE id = ?", &id)? {
        conn.execute(
            "UPDATE escalation_outbox SET attempts = ?, last_error = ? WHERE id = ?",
            params![i64::from(entry.attempts), entry.last_error.as_deref(), id],
        )?;
    } else {
        conn.execute(
            "INSERT INTO escalation_outbox (id, hotspot_id, created_at, attempts, last_error)
             VALUES (?, ?, ?, ?, ?)",
            params![
                id,
                entry.hotspot_id.to_string(),
                to_micros(entry.created_at),
                i64::from(entry.attempts),
                entry.last_error.as_deref(),
            ],
        )?;
    }
    Ok(())
}

impl Store for DuckDbStore {
    fn commit(&self, batch: WriteBatch) -> Result<(), DbError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let count = batch.writes.len();
        for write in batch.writes {
            // Dropping `tx` on error rolls everything back.
            apply_write(&tx, write)?;
        }
        tx.commit()?;
        log::trace!("Committed batch of {count} writes");
        Ok(())
    }

    fn report(&self, id: ReportId) -> Result<Option<Report>, DbError> {
        let conn = self.lock()?;
        load_report(&conn, id)
    }

    fn hotspot(&self, id: HotspotId) -> Result<Option<Hotspot>, DbError> {
        let conn = self.lock()?;
        load_hotspot(&conn, id)
    }

    fn query_hotspots(&self, filter: &HotspotFilter) -> Result<Vec<Hotspot>, DbError> {
        let conn = self.lock()?;

        let mut conditions: Vec<&str> = Vec::new();
        let mut params: Vec<SqlParam> = Vec::new();
        if filter.exclude_escalated {
            conditions.push("NOT escalated");
        }
        if let Some(city) = &filter.city {
            conditions.push("city = ?");
            params.push(SqlParam::Text(city.clone()));
        }
        if let Some(since) = filter.created_since {
            conditions.push("created_at >= ?");
            params.push(SqlParam::Int(to_micros(since)));
        }
        if filter.min_report_count > 0 {
            conditions.push(
                "(SELECT COUNT(*) FROM hotspot_members m WHERE m.hotspot_id = hotspots.id) >= ?",
            );
            params.push(SqlParam::Int(
                i64::try_from(filter.min_report_count).unwrap_or(i64::MAX),
            ));
        }

        let mut sql = format!("SELECT {HOTSPOT_COLUMNS} FROM hotspots");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let rows = query_rows(&conn, &sql, &params, HotspotRow::from_row)?;
        let mut hotspots = rows
            .into_iter()
            .map(|row| row.into_hotspot(&conn))
            .collect::<Result<Vec<_>, _>>()?;
        hotspots.retain(|h| filter.matches(h));
        hotspots.sort_by(priority_order);
        Ok(apply_limit(hotspots, filter.limit))
    }

    fn query_reports(&self, filter: &ReportFilter) -> Result<Vec<Report>, DbError> {
        let conn = self.lock()?;

        let mut conditions: Vec<&str> = Vec::new();
        let mut params: Vec<SqlParam> = Vec::new();
        if let Some(bbox) = filter.bbox {
            conditions.push("latitude BETWEEN ? AND ? AND longitude BETWEEN ? AND ?");
            params.extend([
                SqlParam::Double(bbox.south),
                SqlParam::Double(bbox.north),
                SqlParam::Double(bbox.west),
                SqlParam::Double(bbox.east),
            ]);
        }
        if let Some(city) = &filter.city {
            conditions.push("city = ?");
            params.push(SqlParam::Text(city.clone()));
        }
        if let Some(severity) = filter.min_severity {
            conditions.push("severity >= ?");
            params.push(SqlParam::Int(i64::from(severity.rank())));
        }

        let mut sql = format!("SELECT {REPORT_COLUMNS} FROM reports");
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at ASC, id ASC");

        query_rows(&conn, &sql, &params, ReportRow::from_row)?
            .into_iter()
            .map(ReportRow::into_report)
            .collect()
    }

    fn status_history(&self, id: ReportId) -> Result<Vec<StatusChange>, DbError> {
        let conn = self.lock()?;
        let rows = query_rows(
            &conn,
            "SELECT from_status, to_status, note, changed_at
             FROM report_status_history WHERE report_id = ? ORDER BY seq ASC",
            &[SqlParam::Text(id.to_string())],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )?;

        rows.into_iter()
            .map(|(from, to, note, changed_at)| {
                Ok(StatusChange {
                    report_id: id,
                    from: status_from_db(&from)?,
                    to: status_from_db(&to)?,
                    note,
                    changed_at: from_micros(changed_at)?,
                })
            })
            .collect()
    }

    fn outbox(&self, limit: usize) -> Result<Vec<OutboxEntry>, DbError> {
        let conn = self.lock()?;
        let rows = query_rows(
            &conn,
            "SELECT id, hotspot_id, created_at, attempts, last_error
             FROM escalation_outbox ORDER BY created_at ASC, id ASC LIMIT ?",
            &[SqlParam::Int(i64::try_from(limit).unwrap_or(i64::MAX))],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )?;

        rows.into_iter()
            .map(|(id, hotspot_id, created_at, attempts, last_error)| {
                Ok(OutboxEntry {
                    id: parse_id::<OutboxId>(&id)?,
                    hotspot_id: parse_id(&hotspot_id)?,
                    created_at: from_micros(created_at)?,
                    attempts: u32::try_from(attempts)
                        .map_err(|_| conversion(format!("invalid attempt count: {attempts}")))?,
                    last_error,
                })
            })
            .collect()
    }

    fn try_claim_escalation(
        &self,
        id: HotspotId,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Result<bool, DbError> {
        let conn = self.lock()?;
        let stale_before = to_micros(lease_cutoff(now, lease));
        let updated = conn.execute(
            "UPDATE hotspots SET claimed_at = ?
             WHERE id = ? AND NOT escalated AND (claimed_at IS NULL OR claimed_at < ?)",
            params![to_micros(now), id.to_string(), stale_before],
        )?;
        Ok(updated == 1)
    }

    fn complete_escalation(&self, id: HotspotId, at: DateTime<Utc>) -> Result<bool, DbError> {
        let conn = self.lock()?;
        let key = id.to_string();
        let updated = conn.execute(
            "UPDATE hotspots SET escalated = TRUE, escalated_at = ?, claimed_at = NULL
             WHERE id = ? AND NOT escalated",
            params![to_micros(at), key],
        )?;
        if updated == 1 {
            return Ok(true);
        }

        if exists(&conn, "SELECT COUNT(*) FROM hotspots WHERE id = ?", &key)? {
            Ok(false)
        } else {
            Err(DbError::NotFound {
                message: format!("hotspot {key}"),
            })
        }
    }

    fn release_escalation_claim(&self, id: HotspotId) -> Result<(), DbError> {
        self.lock()?.execute(
            "UPDATE hotspots SET claimed_at = NULL WHERE id = ? AND NOT escalated",
            [id.to_string()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    fn store() -> DuckDbStore {
        DuckDbStore::open_in_memory().unwrap()
    }

    #[test]
    fn round_trips_reports_and_hotspots() {
        test_support::round_trips_reports_and_hotspots(&store());
    }

    #[test]
    fn failed_batch_leaves_no_trace() {
        test_support::failed_batch_leaves_no_trace(&store());
    }

    #[test]
    fn failed_batch_restores_updated_rows() {
        test_support::failed_batch_restores_updated_rows(&store());
    }

    #[test]
    fn report_cannot_join_two_hotspots() {
        test_support::report_cannot_join_two_hotspots(&store());
    }

    #[test]
    fn queries_hotspots_in_priority_order() {
        test_support::queries_hotspots_in_priority_order(&store());
    }

    #[test]
    fn claims_are_exclusive() {
        test_support::claims_are_exclusive(&store());
    }

    #[test]
    fn unbounded_lease_never_expires() {
        test_support::unbounded_lease_never_expires(&store());
    }

    #[test]
    fn membership_updates_keep_escalation() {
        test_support::membership_updates_keep_escalation(&store());
    }

    #[test]
    fn status_changes_are_compare_and_set() {
        test_support::status_changes_are_compare_and_set(&store());
    }

    #[test]
    fn filters_reports() {
        test_support::filters_reports(&store());
    }

    #[test]
    fn outbox_round_trip() {
        test_support::outbox_round_trip(&store());
    }

    #[test]
    fn reopening_a_file_keeps_data() {
        let dir = std::env::temp_dir().join(format!("road_intel_{}", ReportId::new()));
        let path = dir.join("store.duckdb");

        let report = test_support::report(18.5204, 73.8567, Severity::Moderate, 0);
        {
            let store = DuckDbStore::open(&path).unwrap();
            store
                .commit(WriteBatch::new().with(Write::InsertReport(report.clone())))
                .unwrap();
        }

        let store = DuckDbStore::open(&path).unwrap();
        assert_eq!(store.report(report.id).unwrap(), Some(report));
        drop(store);
        let _ = std::fs::remove_dir_all(dir);
    }
}
