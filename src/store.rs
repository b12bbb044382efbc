//! SQLite scan history.
//!
//! One append-only table, `ScanHistory (ID, Result, ScanDate, ScanTime)`.
//! Every operation opens its own connection and drops it before returning.
//! Date and time columns are read back as stored, so rows written by older
//! versions (or by hand) still load.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, info};
use rusqlite::{params, Connection};

use crate::error::StoreError;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub id: i64,
    pub text: String,
    /// `YYYY-MM-DD` for rows written by [`ScanStore::append`].
    pub scan_date: String,
    /// `HH:MM:SS`; empty for rows that predate the `ScanTime` column.
    pub scan_time: String,
}

#[derive(Debug, Clone)]
pub struct ScanStore {
    path: PathBuf,
}

impl ScanStore {
    /// Opens (creating if needed) the database at `path` and brings the schema up to date.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let store = ScanStore { path };
        store.init()?;
        info!("scan history at {}", store.path.display());
        Ok(store)
    }

    /// Opens the database in the platform data directory.
    pub fn open_default() -> Result<Self, StoreError> {
        let path = crate::config::default_db_path().ok_or(StoreError::NoDataDir)?;
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        Ok(Connection::open(&self.path)?)
    }

    /// Creates the table and adds `ScanTime` to databases that predate it.
    /// Safe to run any number of times.
    pub fn init(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ScanHistory (
                ID INTEGER PRIMARY KEY AUTOINCREMENT,
                Result TEXT,
                ScanDate TEXT,
                ScanTime TEXT
            )",
            [],
        )?;

        if !has_column(&conn, "ScanHistory", "ScanTime")? {
            debug!("adding ScanTime column");
            conn.execute("ALTER TABLE ScanHistory ADD COLUMN ScanTime TEXT", [])?;
        }

        Ok(())
    }

    /// Appends a record stamped with `at` and returns it with its assigned id.
    pub fn append(&self, text: &str, at: NaiveDateTime) -> Result<ScanRecord, StoreError> {
        let conn = self.connect()?;
        let scan_date = at.format(DATE_FORMAT).to_string();
        let scan_time = at.format(TIME_FORMAT).to_string();
        conn.execute(
            "INSERT INTO ScanHistory (Result, ScanDate, ScanTime) VALUES (?1, ?2, ?3)",
            params![text, scan_date, scan_time],
        )?;

        Ok(ScanRecord {
            id: conn.last_insert_rowid(),
            text: text.to_string(),
            scan_date,
            scan_time,
        })
    }

    /// Full history, newest first.
    pub fn history(&self) -> Result<Vec<ScanRecord>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT ID, Result, ScanDate, ScanTime
             FROM ScanHistory
             ORDER BY ID DESC",
        )?;
        let rows = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Records with `from <= ScanDate <= to`, oldest first.
    pub fn between(&self, from: NaiveDate, to: NaiveDate) -> Result<Vec<ScanRecord>, StoreError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT ID, Result, ScanDate, ScanTime
             FROM ScanHistory
             WHERE ScanDate BETWEEN ?1 AND ?2
             ORDER BY ID ASC",
        )?;
        let rows = stmt
            .query_map(
                params![
                    from.format(DATE_FORMAT).to_string(),
                    to.format(DATE_FORMAT).to_string()
                ],
                record_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.iter().any(|name| name.eq_ignore_ascii_case(column)))
}

/// Columns are nullable TEXT; NULL reads back as an empty string.
fn record_from_row(row: &rusqlite::Row) -> rusqlite::Result<ScanRecord> {
    Ok(ScanRecord {
        id: row.get(0)?,
        text: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
        scan_date: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        scan_time: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::new(
            NaiveDate::parse_from_str(date, DATE_FORMAT).unwrap(),
            NaiveTime::parse_from_str(time, TIME_FORMAT).unwrap(),
        )
    }

    fn temp_store() -> (tempfile::TempDir, ScanStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ScanStore::open(dir.path().join("nested").join("scans.sqlite")).unwrap();
        (dir, store)
    }

    #[test]
    fn test_append_assigns_increasing_ids() {
        let (_dir, store) = temp_store();
        let a = store.append("first", at("2024-03-01", "08:00:00")).unwrap();
        let b = store.append("second", at("2024-03-01", "08:00:05")).unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.text, "first");
        assert_eq!(a.scan_date, "2024-03-01");
        assert_eq!(a.scan_time, "08:00:00");
    }

    #[test]
    fn test_history_newest_first() {
        let (_dir, store) = temp_store();
        store.append("a", at("2024-03-01", "08:00:00")).unwrap();
        store.append("b", at("2024-03-02", "09:00:00")).unwrap();
        store.append("c", at("2024-03-03", "10:00:00")).unwrap();

        let texts: Vec<_> = store.history().unwrap().into_iter().map(|r| r.text).collect();
        assert_eq!(texts, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_between_is_inclusive_and_ascending() {
        let (_dir, store) = temp_store();
        store.append("before", at("2024-02-29", "23:59:59")).unwrap();
        store.append("start", at("2024-03-01", "00:00:00")).unwrap();
        store.append("middle", at("2024-03-02", "12:00:00")).unwrap();
        store.append("end", at("2024-03-03", "23:59:59")).unwrap();
        store.append("after", at("2024-03-04", "00:00:00")).unwrap();

        let from = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 3, 3).unwrap();
        let records = store.between(from, to).unwrap();
        let texts: Vec<_> = records.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["start", "middle", "end"]);
        assert!(records.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_init_twice_is_idempotent() {
        let (_dir, store) = temp_store();
        store.append("kept", at("2024-03-01", "08:00:00")).unwrap();

        store.init().unwrap();
        let reopened = ScanStore::open(store.path()).unwrap();
        reopened.init().unwrap();

        let conn = Connection::open(store.path()).unwrap();
        let columns: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pragma_table_info('ScanHistory') WHERE name = 'ScanTime'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(columns, 1);
        assert_eq!(reopened.history().unwrap().len(), 1);
    }

    #[test]
    fn test_migrates_table_without_scan_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.sqlite");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE ScanHistory (ID INTEGER PRIMARY KEY AUTOINCREMENT, Result TEXT, ScanDate TEXT);
                 INSERT INTO ScanHistory (Result, ScanDate) VALUES ('legacy', '2023-12-31');",
            )
            .unwrap();
        }

        let store = ScanStore::open(&path).unwrap();
        let history = store.history().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "legacy");
        assert_eq!(history[0].scan_date, "2023-12-31");
        assert_eq!(history[0].scan_time, "");

        store.append("new", at("2024-01-01", "10:11:12")).unwrap();
        assert_eq!(store.history().unwrap()[0].scan_time, "10:11:12");
    }

    #[test]
    fn test_odd_legacy_date_does_not_hide_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.sqlite");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE ScanHistory (ID INTEGER PRIMARY KEY AUTOINCREMENT, Result TEXT, ScanDate TEXT);
                 INSERT INTO ScanHistory (Result, ScanDate) VALUES ('legacy', '2023-12-31 10:00:00');
                 INSERT INTO ScanHistory (Result, ScanDate) VALUES (NULL, NULL);",
            )
            .unwrap();
        }

        let store = ScanStore::open(&path).unwrap();
        store.append("good", at("2024-01-01", "08:00:00")).unwrap();

        let history = store.history().unwrap();
        let texts: Vec<_> = history.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["good", "", "legacy"]);
        assert_eq!(history[2].scan_date, "2023-12-31 10:00:00");
        assert_eq!(history[1].scan_date, "");

        let from = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        let texts: Vec<_> = store
            .between(from, to)
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, vec!["legacy", "good"]);
    }

    #[test]
    fn test_text_is_stored_verbatim() {
        let (_dir, store) = temp_store();
        let payload = "WIFI:S:nhà;T:WPA;P:'); DROP TABLE ScanHistory;--;;";
        store.append(payload, at("2024-03-01", "08:00:00")).unwrap();
        assert_eq!(store.history().unwrap()[0].text, payload);
    }
}
