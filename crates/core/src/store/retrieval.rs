//! Retrieval record persistence.
//!
//! Records are keyed by their deterministic id, so re-recording the same
//! comic/date overwrites the earlier attempt instead of piling up rows.

use chrono::{DateTime, NaiveDate, Utc};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::StateDb;
use crate::Error;
use crate::model::{RetrievalFilter, RetrievalRecord, RetrievalStatus};

const DATE_FORMAT: &str = "%Y-%m-%d";

const SELECT_COLUMNS: &str = "SELECT id, comic_name, comic_date, source, status, error_message,
        duration_ms, image_size, http_status_code, recorded_at
    FROM retrieval_records";

/// Row shape as stored, before domain decoding.
struct RawRecord {
    id: String,
    comic_name: String,
    comic_date: String,
    source: String,
    status: String,
    error_message: Option<String>,
    duration_ms: i64,
    image_size: Option<i64>,
    http_status_code: Option<i64>,
    recorded_at: String,
}

impl RawRecord {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            comic_name: row.get(1)?,
            comic_date: row.get(2)?,
            source: row.get(3)?,
            status: row.get(4)?,
            error_message: row.get(5)?,
            duration_ms: row.get(6)?,
            image_size: row.get(7)?,
            http_status_code: row.get(8)?,
            recorded_at: row.get(9)?,
        })
    }
}

impl TryFrom<RawRecord> for RetrievalRecord {
    type Error = Error;

    fn try_from(raw: RawRecord) -> Result<Self, Self::Error> {
        let comic_date = NaiveDate::parse_from_str(&raw.comic_date, DATE_FORMAT)
            .map_err(|e| Error::CorruptRow(format!("{}: comic_date {e}", raw.id)))?;
        let status = raw
            .status
            .parse::<RetrievalStatus>()
            .map_err(|e| Error::CorruptRow(format!("{}: {e}", raw.id)))?;
        let recorded_at = DateTime::parse_from_rfc3339(&raw.recorded_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::CorruptRow(format!("{}: recorded_at {e}", raw.id)))?;

        Ok(RetrievalRecord {
            id: raw.id,
            comic_name: raw.comic_name,
            comic_date,
            source: raw.source,
            status,
            error_message: raw.error_message,
            duration_ms: raw.duration_ms.max(0) as u64,
            image_size: raw.image_size.map(|v| v.max(0) as u64),
            http_status_code: raw.http_status_code.and_then(|v| u16::try_from(v).ok()),
            recorded_at,
        })
    }
}

impl StateDb {
    /// Insert or replace a retrieval record by id.
    pub async fn upsert_retrieval_record(&self, record: &RetrievalRecord) -> Result<(), Error> {
        let record = record.clone();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO retrieval_records (
                    id, comic_name, comic_date, source, status, error_message,
                    duration_ms, image_size, http_status_code, recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(id) DO UPDATE SET
                    comic_name = excluded.comic_name,
                    comic_date = excluded.comic_date,
                    source = excluded.source,
                    status = excluded.status,
                    error_message = excluded.error_message,
                    duration_ms = excluded.duration_ms,
                    image_size = excluded.image_size,
                    http_status_code = excluded.http_status_code,
                    recorded_at = excluded.recorded_at",
                    params![
                        &record.id,
                        &record.comic_name,
                        record.comic_date.format(DATE_FORMAT).to_string(),
                        &record.source,
                        record.status.as_str(),
                        &record.error_message,
                        record.duration_ms as i64,
                        record.image_size.map(|v| v as i64),
                        record.http_status_code.map(i64::from),
                        record.recorded_at.to_rfc3339(),
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Get a record by id.
    ///
    /// Returns None if no record exists for the id.
    pub async fn get_retrieval_record(&self, id: &str) -> Result<Option<RetrievalRecord>, Error> {
        let id = id.to_string();
        let raw = self
            .conn
            .call(move |conn| -> Result<Option<RawRecord>, Error> {
                let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
                match conn.query_row(&sql, params![id], RawRecord::from_row) {
                    Ok(raw) => Ok(Some(raw)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;

        raw.map(RetrievalRecord::try_from).transpose()
    }

    /// Query records, newest comic date first.
    ///
    /// Every filter field is optional; absent filters match everything.
    pub async fn query_retrieval_records(&self, filter: &RetrievalFilter) -> Result<Vec<RetrievalRecord>, Error> {
        let comic_name = filter.comic_name.clone();
        let status = filter.status.map(|s| s.as_str().to_string());
        let from = filter.from.map(|d| d.format(DATE_FORMAT).to_string());
        let to = filter.to.map(|d| d.format(DATE_FORMAT).to_string());
        let limit = filter.limit.map(|l| l as i64).unwrap_or(-1);

        let raws = self
            .conn
            .call(move |conn| -> Result<Vec<RawRecord>, Error> {
                let sql = format!(
                    "{SELECT_COLUMNS}
                    WHERE (?1 IS NULL OR comic_name = ?1)
                      AND (?2 IS NULL OR status = ?2)
                      AND (?3 IS NULL OR comic_date >= ?3)
                      AND (?4 IS NULL OR comic_date <= ?4)
                    ORDER BY comic_date DESC, recorded_at DESC
                    LIMIT ?5"
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params![comic_name, status, from, to, limit], RawRecord::from_row)?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .map_err(Error::from)?;

        raws.into_iter().map(RetrievalRecord::try_from).collect()
    }

    /// Delete a record by id. Returns whether a row was removed.
    pub async fn delete_retrieval_record(&self, id: &str) -> Result<bool, Error> {
        let id = id.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let deleted = conn.execute("DELETE FROM retrieval_records WHERE id = ?1", params![id])?;
                Ok(deleted > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Delete every record whose comic date is before `cutoff`.
    ///
    /// Returns the number of records deleted.
    pub async fn purge_retrieval_records_before(&self, cutoff: NaiveDate) -> Result<u64, Error> {
        let cutoff = cutoff.format(DATE_FORMAT).to_string();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let deleted = conn.execute("DELETE FROM retrieval_records WHERE comic_date < ?1", params![cutoff])?;
                Ok(deleted as u64)
            })
            .await
            .map_err(Error::from)
    }
}
