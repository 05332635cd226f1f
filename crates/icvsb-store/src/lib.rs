//! Relational persistence layer (spec §6.4): a typed accessor surface over
//! the five-table schema, no ORM. Every row is represented as an
//! `icvsb-core` data type; callers never see a raw `sqlx::Row`.

pub mod error;

use chrono::Utc;
use icvsb_core::types::{BatchRequest, BenchmarkKey, Request, Response, Service, Severity};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr as _;

pub use error::{StoreError, StoreResult};

/// Fields needed to create a `benchmark_keys` row; `id`/`created_at` are
/// assigned by the store.
#[derive(Debug, Clone)]
pub struct NewBenchmarkKey {
    pub service: Service,
    pub batch_request_id: i64,
    pub severity: Severity,
    pub delta_labels: u32,
    pub delta_confidence: f64,
    pub max_labels: u32,
    pub min_confidence: f64,
    pub expected_labels: Vec<String>,
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Opens (creating if absent) the sqlite database at `database_url`,
    /// runs embedded migrations, and seeds the closed `Service`/`Severity`
    /// enumerations (spec §6.4).
    pub async fn open(database_url: &str) -> StoreResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        let store = Self { pool };
        store.seed_enumerations().await?;
        Ok(store)
    }

    async fn seed_enumerations(&self) -> StoreResult<()> {
        for service in Service::ALL {
            sqlx::query("INSERT OR IGNORE INTO services (name) VALUES (?)")
                .bind(service.as_str())
                .execute(&self.pool)
                .await?;
        }
        for severity in Severity::ALL {
            sqlx::query("INSERT OR IGNORE INTO severities (name) VALUES (?)")
                .bind(severity.as_str())
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn service_id(&self, service: Service) -> StoreResult<i64> {
        let row = sqlx::query("SELECT id FROM services WHERE name = ?")
            .bind(service.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("id"))
    }

    async fn severity_id(&self, severity: Severity) -> StoreResult<i64> {
        let row = sqlx::query("SELECT id FROM severities WHERE name = ?")
            .bind(severity.as_str())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("id"))
    }

    /// Whether this store tolerates concurrent writers (spec §5): the
    /// `sqlx` pool serializes writes through SQLite's own locking rather
    /// than rejecting them, so bounded-parallel batch fan-out is always
    /// safe here. A future single-connection or single-writer backend
    /// would return `false` and force callers onto the serial send path.
    pub fn supports_concurrent_writers(&self) -> bool {
        true
    }

    pub async fn create_batch_request(&self) -> StoreResult<BatchRequest> {
        let created_at = Utc::now();
        let id = sqlx::query("INSERT INTO batch_requests (created_at) VALUES (?)")
            .bind(created_at)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(BatchRequest { id, created_at })
    }

    pub async fn get_batch_request(&self, id: i64) -> StoreResult<BatchRequest> {
        let row = sqlx::query("SELECT id, created_at FROM batch_requests WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("batch_request {id}")))?;
        Ok(BatchRequest {
            id: row.get("id"),
            created_at: row.get("created_at"),
        })
    }

    pub async fn create_request(
        &self,
        service: Service,
        batch_request_id: Option<i64>,
        uri: &str,
    ) -> StoreResult<Request> {
        let service_id = self.service_id(service).await?;
        let created_at = Utc::now();
        let id = sqlx::query(
            "INSERT INTO requests (service_id, batch_request_id, uri, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(service_id)
        .bind(batch_request_id)
        .bind(uri)
        .bind(created_at)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Request {
            id,
            service,
            batch_request_id,
            uri: uri.to_string(),
            created_at,
        })
    }

    pub async fn requests_for_batch(&self, batch_request_id: i64) -> StoreResult<Vec<Request>> {
        let rows = sqlx::query(
            "SELECT r.id, s.name AS service_name, r.batch_request_id, r.uri, r.created_at
             FROM requests r JOIN services s ON s.id = r.service_id
             WHERE r.batch_request_id = ?
             ORDER BY r.id ASC",
        )
        .bind(batch_request_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_request).collect()
    }

    fn row_to_request(row: &SqliteRow) -> StoreResult<Request> {
        let service_name: String = row.get("service_name");
        let service = Service::from_str(&service_name)
            .map_err(|_| StoreError::CorruptRow(format!("unknown service '{service_name}'")))?;
        Ok(Request {
            id: row.get("id"),
            service,
            batch_request_id: row.get("batch_request_id"),
            uri: row.get("uri"),
            created_at: row.get("created_at"),
        })
    }

    pub async fn create_response(
        &self,
        request_id: i64,
        body: Option<&[u8]>,
        success: bool,
    ) -> StoreResult<Response> {
        let created_at = Utc::now();
        let id = sqlx::query(
            "INSERT INTO responses (request_id, benchmark_key_id, created_at, body, success)
             VALUES (?, NULL, ?, ?, ?)",
        )
        .bind(request_id)
        .bind(created_at)
        .bind(body)
        .bind(success)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(Response {
            id,
            request_id,
            benchmark_key_id: None,
            created_at,
            body: body.map(|b| b.to_vec()),
            success,
        })
    }

    pub async fn set_response_benchmark_key(
        &self,
        response_id: i64,
        benchmark_key_id: i64,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE responses SET benchmark_key_id = ? WHERE id = ?")
            .bind(benchmark_key_id)
            .bind(response_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn responses_for_batch(&self, batch_request_id: i64) -> StoreResult<Vec<Response>> {
        let rows = sqlx::query(
            "SELECT resp.id, resp.request_id, resp.benchmark_key_id, resp.created_at, resp.body, resp.success
             FROM responses resp JOIN requests req ON req.id = resp.request_id
             WHERE req.batch_request_id = ?
             ORDER BY resp.id ASC",
        )
        .bind(batch_request_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Response {
                id: row.get("id"),
                request_id: row.get("request_id"),
                benchmark_key_id: row.get("benchmark_key_id"),
                created_at: row.get("created_at"),
                body: row.get("body"),
                success: row.get("success"),
            })
            .collect())
    }

    pub async fn responses_for_request(&self, request_id: i64) -> StoreResult<Vec<Response>> {
        let rows = sqlx::query(
            "SELECT id, request_id, benchmark_key_id, created_at, body, success
             FROM responses WHERE request_id = ? ORDER BY id ASC",
        )
        .bind(request_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| Response {
                id: row.get("id"),
                request_id: row.get("request_id"),
                benchmark_key_id: row.get("benchmark_key_id"),
                created_at: row.get("created_at"),
                body: row.get("body"),
                success: row.get("success"),
            })
            .collect())
    }

    pub async fn create_benchmark_key(&self, new_key: NewBenchmarkKey) -> StoreResult<BenchmarkKey> {
        let service_id = self.service_id(new_key.service).await?;
        let severity_id = self.severity_id(new_key.severity).await?;
        let created_at = Utc::now();
        let expected_labels_json = serde_json::to_string(&new_key.expected_labels)
            .map_err(|e| StoreError::CorruptRow(e.to_string()))?;

        let id = sqlx::query(
            "INSERT INTO benchmark_keys
                (service_id, batch_request_id, severity_id, created_at, expired,
                 delta_labels, delta_confidence, max_labels, min_confidence, expected_labels)
             VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?)",
        )
        .bind(service_id)
        .bind(new_key.batch_request_id)
        .bind(severity_id)
        .bind(created_at)
        .bind(new_key.delta_labels)
        .bind(new_key.delta_confidence)
        .bind(new_key.max_labels)
        .bind(new_key.min_confidence)
        .bind(&expected_labels_json)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(BenchmarkKey {
            id,
            service: new_key.service,
            batch_request_id: new_key.batch_request_id,
            severity: new_key.severity,
            created_at,
            expired: false,
            delta_labels: new_key.delta_labels,
            delta_confidence: new_key.delta_confidence,
            max_labels: new_key.max_labels,
            min_confidence: new_key.min_confidence,
            expected_labels: new_key.expected_labels,
        })
    }

    pub async fn get_benchmark_key(&self, id: i64) -> StoreResult<BenchmarkKey> {
        let row = sqlx::query(
            "SELECT bk.id, s.name AS service_name, bk.batch_request_id, sv.name AS severity_name,
                    bk.created_at, bk.expired, bk.delta_labels, bk.delta_confidence,
                    bk.max_labels, bk.min_confidence, bk.expected_labels
             FROM benchmark_keys bk
             JOIN services s ON s.id = bk.service_id
             JOIN severities sv ON sv.id = bk.severity_id
             WHERE bk.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("benchmark_key {id}")))?;

        Self::row_to_benchmark_key(&row)
    }

    /// The most recently created, non-expired key for a service (used to
    /// pick the key new batches are compared against, spec §4.4).
    pub async fn latest_active_benchmark_key(
        &self,
        service: Service,
    ) -> StoreResult<Option<BenchmarkKey>> {
        let service_id = self.service_id(service).await?;
        let row = sqlx::query(
            "SELECT bk.id, s.name AS service_name, bk.batch_request_id, sv.name AS severity_name,
                    bk.created_at, bk.expired, bk.delta_labels, bk.delta_confidence,
                    bk.max_labels, bk.min_confidence, bk.expected_labels
             FROM benchmark_keys bk
             JOIN services s ON s.id = bk.service_id
             JOIN severities sv ON sv.id = bk.severity_id
             WHERE bk.service_id = ? AND bk.expired = 0
             ORDER BY bk.id DESC LIMIT 1",
        )
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_benchmark_key).transpose()
    }

    pub async fn expire_benchmark_key(&self, id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE benchmark_keys SET expired = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_benchmark_key(row: &SqliteRow) -> StoreResult<BenchmarkKey> {
        let service_name: String = row.get("service_name");
        let service = Service::from_str(&service_name)
            .map_err(|_| StoreError::CorruptRow(format!("unknown service '{service_name}'")))?;
        let severity_name: String = row.get("severity_name");
        let severity = Severity::from_str(&severity_name)
            .map_err(|_| StoreError::CorruptRow(format!("unknown severity '{severity_name}'")))?;
        let expected_labels_json: String = row.get("expected_labels");
        let expected_labels: Vec<String> = serde_json::from_str(&expected_labels_json)
            .map_err(|e| StoreError::CorruptRow(e.to_string()))?;

        Ok(BenchmarkKey {
            id: row.get("id"),
            service,
            batch_request_id: row.get("batch_request_id"),
            severity,
            created_at: row.get("created_at"),
            expired: row.get::<bool, _>("expired"),
            delta_labels: row.get::<i64, _>("delta_labels") as u32,
            delta_confidence: row.get("delta_confidence"),
            max_labels: row.get::<i64, _>("max_labels") as u32,
            min_confidence: row.get("min_confidence"),
            expected_labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> Store {
        Store::open("sqlite::memory:").await.unwrap()
    }

    #[tokio::test]
    async fn seeds_services_and_severities() {
        let store = memory_store().await;
        for service in Service::ALL {
            assert!(store.service_id(service).await.is_ok());
        }
        for severity in Severity::ALL {
            assert!(store.severity_id(severity).await.is_ok());
        }
    }

    #[tokio::test]
    async fn round_trips_batch_request_and_requests() {
        let store = memory_store().await;
        let batch = store.create_batch_request().await.unwrap();
        let req = store
            .create_request(Service::Google, Some(batch.id), "https://example.com/a.jpg")
            .await
            .unwrap();

        let fetched = store.requests_for_batch(batch.id).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, req.id);
        assert_eq!(fetched[0].uri, "https://example.com/a.jpg");
    }

    #[tokio::test]
    async fn round_trips_response_and_benchmark_key_link() {
        let store = memory_store().await;
        let batch = store.create_batch_request().await.unwrap();
        let req = store
            .create_request(Service::Amazon, Some(batch.id), "https://example.com/b.jpg")
            .await
            .unwrap();
        let resp = store
            .create_response(req.id, Some(br#"{"labels":{"cat":0.9}}"#.as_bytes()), true)
            .await
            .unwrap();

        let key = store
            .create_benchmark_key(NewBenchmarkKey {
                service: Service::Amazon,
                batch_request_id: batch.id,
                severity: Severity::Info,
                delta_labels: 2,
                delta_confidence: 0.1,
                max_labels: 10,
                min_confidence: 0.5,
                expected_labels: vec!["cat".to_string()],
            })
            .await
            .unwrap();

        store
            .set_response_benchmark_key(resp.id, key.id)
            .await
            .unwrap();

        let responses = store.responses_for_batch(batch.id).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].benchmark_key_id, Some(key.id));
        assert_eq!(responses[0].labels().get("cat"), Some(&0.9));

        let fetched_key = store.get_benchmark_key(key.id).await.unwrap();
        assert_eq!(fetched_key.expected_labels, vec!["cat".to_string()]);

        store.expire_benchmark_key(key.id).await.unwrap();
        let active = store.latest_active_benchmark_key(Service::Amazon).await.unwrap();
        assert!(active.is_none());
    }
}
