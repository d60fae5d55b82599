use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use uuid::Uuid;

use crate::notify::DispatchResult;
use super::{SurveyRecord, CODE_FIELD, END_FIELD, START_FIELD};

pub const DB_FILE: &str = "records.sqlite";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot open record store at {path}: {reason}")]
    Open { path: PathBuf, reason: String },
    #[error("failed to read table {table}: {reason}")]
    ReadFailure { table: String, reason: String },
    #[error("failed to write table {table}: {reason}")]
    WriteFailure { table: String, reason: String },
    #[error("table {0} has never been written")]
    TableMissing(String),
}

/// SQLite-backed tabular store living under the output directory.
pub struct RecordStore {
    pool: SqlitePool,
}

impl RecordStore {
    pub async fn open(output_dir: &Path) -> Result<Self, StoreError> {
        let path = output_dir.join(DB_FILE);
        let open_err = |reason: String| StoreError::Open { path: path.clone(), reason };
        std::fs::create_dir_all(output_dir).map_err(|e| open_err(e.to_string()))?;
        let opts = SqliteConnectOptions::new().filename(&path).create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .map_err(|e| open_err(e.to_string()))?;
        // idempotent
        sqlx::migrate!().run(&pool).await.map_err(|e| open_err(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Replaces the named table wholesale; no merge with earlier captures.
    pub async fn save(&self, table: &str, rows: &[SurveyRecord]) -> Result<usize, StoreError> {
        let write_err = |e: sqlx::Error| StoreError::WriteFailure { table: table.to_string(), reason: e.to_string() };
        let saved_at = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        sqlx::query("DELETE FROM survey_record WHERE table_name = ?")
            .bind(table)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        for (idx, row) in rows.iter().enumerate() {
            let fields = serde_json::to_string(row.fields())
                .map_err(|e| StoreError::WriteFailure { table: table.to_string(), reason: e.to_string() })?;
            sqlx::query(
                r#"
                INSERT INTO survey_record (table_name, row_idx, kd_survei, tgl_rek_mulai, tgl_rek_selesai, fields, saved_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(table)
            .bind(idx as i64)
            .bind(row.text(CODE_FIELD))
            .bind(row.text(START_FIELD))
            .bind(row.text(END_FIELD))
            .bind(fields)
            .bind(&saved_at)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }
        tx.commit().await.map_err(write_err)?;
        Ok(rows.len())
    }

    pub async fn load(&self, table: &str) -> Result<Vec<SurveyRecord>, StoreError> {
        let read_err = |reason: String| StoreError::ReadFailure { table: table.to_string(), reason };
        let rows = sqlx::query("SELECT fields FROM survey_record WHERE table_name = ? ORDER BY row_idx")
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| read_err(e.to_string()))?;
        if rows.is_empty() {
            return Err(StoreError::TableMissing(table.to_string()));
        }
        rows.iter()
            .enumerate()
            .map(|(i, r)| {
                let raw: String = r.try_get("fields").map_err(|e| read_err(e.to_string()))?;
                let fields: Map<String, Value> = serde_json::from_str(&raw).map_err(|e| read_err(e.to_string()))?;
                SurveyRecord::from_fields(i, fields).map_err(|e| read_err(e.to_string()))
            })
            .collect()
    }

    pub async fn save_results(&self, run_id: Uuid, results: &[DispatchResult]) -> Result<(), StoreError> {
        let write_err = |e: sqlx::Error| StoreError::WriteFailure { table: "dispatch_result".to_string(), reason: e.to_string() };
        let run = run_id.to_string();
        let mut tx = self.pool.begin().await.map_err(write_err)?;
        for (seq, r) in results.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO dispatch_result (run_id, seq, phone, name, status, message, sent_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&run)
            .bind(seq as i64)
            .bind(&r.recipient.phone)
            .bind(&r.recipient.name)
            .bind(r.status.as_str())
            .bind(&r.message)
            .bind(r.at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }
        tx.commit().await.map_err(write_err)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn result_rows(&self, run_id: Uuid) -> Vec<(String, String, String)> {
        sqlx::query("SELECT phone, status, message FROM dispatch_result WHERE run_id = ? ORDER BY seq")
            .bind(run_id.to_string())
            .fetch_all(&self.pool)
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.get("phone"), r.get("status"), r.get("message")))
            .collect()
    }

    /// Overwrites every stored row's fields with `raw`.
    #[cfg(test)]
    pub(crate) async fn overwrite_fields(&self, table: &str, raw: &str) {
        sqlx::query("UPDATE survey_record SET fields = ? WHERE table_name = ?")
            .bind(raw)
            .bind(table)
            .execute(&self.pool)
            .await
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Contact, Role};
    use crate::notify::DispatchStatus;
    use crate::records::record;
    use serde_json::json;

    #[tokio::test]
    async fn round_trip_keeps_columns_and_row_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        let Value::Object(extra) = json!({
            "id": 41, "kd_survei": "SUSENAS", "nama": "Survei Sosial Ekonomi",
            "tgl_rek_mulai": "2025-01-01 00:00:00", "tgl_rek_selesai": "2025-01-10T00:00:00.000Z",
            "kuota": null
        }) else { panic!() };
        let rows = vec![
            record("B", "2025-02-01", "2025-02-20"),
            SurveyRecord::from_fields(1, extra).unwrap(),
            record("A", "2025-03-01", "2025-03-05"),
        ];
        assert_eq!(store.save("kegiatan_aktif", &rows).await.unwrap(), 3);

        let back = store.load("kegiatan_aktif").await.unwrap();
        assert_eq!(back, rows);
        assert_eq!(back[1].fields().keys().next().map(String::as_str), Some("id"));
        assert_eq!(back[1].end_date(), chrono::NaiveDate::from_ymd_opt(2025, 1, 10));
    }

    #[tokio::test]
    async fn save_supersedes_previous_capture() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        store.save("t", &[record("OLD1", "2025-01-01", "2025-01-02"), record("OLD2", "2025-01-01", "2025-01-02")]).await.unwrap();
        store.save("t", &[record("NEW", "2025-01-01", "2025-01-02")]).await.unwrap();
        let codes: Vec<_> = store.load("t").await.unwrap().iter().map(SurveyRecord::code).collect();
        assert_eq!(codes, vec!["NEW"]);
    }

    #[tokio::test]
    async fn unknown_table_is_missing_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RecordStore::open(dir.path()).await.unwrap();
            assert!(matches!(store.load("nope").await, Err(StoreError::TableMissing(_))));
            store.save("t", &[record("X", "2025-01-01", "2025-01-02")]).await.unwrap();
        }
        let reopened = RecordStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.load("t").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_results_are_stored_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).await.unwrap();
        let run = Uuid::new_v4();
        let results = vec![
            DispatchResult::new(Contact::new("1", "a", Role::Member), DispatchStatus::Sent, "hi"),
            DispatchResult::new(Contact::new("2", "b", Role::Admin), DispatchStatus::Failed, "hi"),
        ];
        store.save_results(run, &results).await.unwrap();
        assert_eq!(store.result_rows(run).await, vec![
            ("1".to_string(), "sent".to_string(), "hi".to_string()),
            ("2".to_string(), "failed".to_string(), "hi".to_string()),
        ]);
    }
}
