//! Last-execution dates for named scheduled tasks.

use std::collections::HashMap;

use chrono::NaiveDate;
use tokio_rusqlite::params;

use super::connection::StateDb;
use crate::Error;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_date(task: &str, value: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| Error::CorruptRow(format!("task {task}: last_execution_date {e}")))
}

impl StateDb {
    /// Record that `task_name` completed on `date`.
    pub async fn set_task_execution(&self, task_name: &str, date: NaiveDate) -> Result<(), Error> {
        let task_name = task_name.to_string();
        let date = date.format(DATE_FORMAT).to_string();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO task_executions (task_name, last_execution_date, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(task_name) DO UPDATE SET
                        last_execution_date = excluded.last_execution_date,
                        updated_at = excluded.updated_at",
                    params![task_name, date, chrono::Utc::now().to_rfc3339()],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Every task's last completion date.
    pub async fn load_task_executions(&self) -> Result<HashMap<String, NaiveDate>, Error> {
        let rows = self
            .conn
            .call(|conn| -> Result<Vec<(String, String)>, Error> {
                let mut stmt = conn.prepare("SELECT task_name, last_execution_date FROM task_executions")?;
                let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
                let mut out = Vec::new();
                for row in rows {
                    out.push(row?);
                }
                Ok(out)
            })
            .await
            .map_err(Error::from)?;

        rows.into_iter()
            .map(|(task, value)| parse_date(&task, &value).map(|date| (task, date)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_task_execution_round_trip() {
        let db = StateDb::open_in_memory().await.unwrap();
        assert!(db.load_task_executions().await.unwrap().is_empty());

        let d1 = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        db.set_task_execution("DailyComicCacher", d1).await.unwrap();
        db.set_task_execution("DailyComicCacher", d2).await.unwrap();
        db.set_task_execution("ComicReconciliation", d1).await.unwrap();

        let all = db.load_task_executions().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("DailyComicCacher"), Some(&d2));
        assert_eq!(all.get("ComicReconciliation"), Some(&d1));
    }
}
