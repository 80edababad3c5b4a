use crate::assess::ResultStore;
use crate::error::{CoreError, Result};
use crate::model::{Assessment, Collection, SecurityResult, Verdicts};
use crate::spec::{TestCategory, TestSpecification};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::fs;
use std::path::Path;

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
CREATE TABLE IF NOT EXISTS collections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    api_endpoints TEXT NOT NULL,  -- JSON array
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS test_specifications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    payload TEXT NOT NULL,        -- YAML
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS assessments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    collection_id INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    FOREIGN KEY(collection_id) REFERENCES collections(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_assessments_collection ON assessments(collection_id);

CREATE TABLE IF NOT EXISTS security_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    assessment_id INTEGER NOT NULL,
    endpoint TEXT NOT NULL,
    verdicts TEXT NOT NULL,       -- JSON object of category -> bool
    FOREIGN KEY(assessment_id) REFERENCES assessments(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_security_results_assessment ON security_results(assessment_id);
            ",
        )?;
        Ok(())
    }

    // Collections
    pub fn create_collection(&self, name: &str, api_endpoints: &[String]) -> Result<Collection> {
        let created_at = Utc::now();
        let endpoints_json = serde_json::to_string(api_endpoints)?;

        self.conn.execute(
            "INSERT INTO collections (name, api_endpoints, created_at) VALUES (?1, ?2, ?3)",
            params![name, endpoints_json, created_at],
        )?;

        Ok(Collection {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            api_endpoints: api_endpoints.to_vec(),
            created_at,
        })
    }

    pub fn list_collections(&self) -> Result<Vec<Collection>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, api_endpoints, created_at FROM collections ORDER BY id")?;

        let rows = stmt
            .query_map([], collection_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(CollectionRow::decode).collect()
    }

    pub fn get_collection(&self, id: i64) -> Result<Option<Collection>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, name, api_endpoints, created_at FROM collections WHERE id = ?1",
                params![id],
                collection_row,
            )
            .optional()?;

        row.map(CollectionRow::decode).transpose()
    }

    /// Delete a collection together with its assessments and their results.
    /// Returns false when no such collection existed.
    pub fn delete_collection(&self, id: i64) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM collections WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    // Test specifications
    pub fn create_test_specification(
        &self,
        name: &str,
        description: Option<&str>,
        payload: &str,
    ) -> Result<TestSpecification> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidInput(
                "test specification name must not be empty".to_string(),
            ));
        }
        if !TestCategory::from_name(name).is_usable() {
            return Err(CoreError::InvalidInput(format!(
                "'{}' cannot be used as a test specification name",
                name
            )));
        }
        if self.find_test_specification_by_name(name)?.is_some() {
            return Err(CoreError::InvalidInput(format!(
                "Name already registered: {}",
                name
            )));
        }

        self.conn.execute(
            "INSERT INTO test_specifications (name, description, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, description, payload, Utc::now()],
        )?;

        Ok(TestSpecification::new(
            self.conn.last_insert_rowid(),
            name,
            description.map(String::from),
            payload,
        ))
    }

    pub fn list_test_specifications(&self) -> Result<Vec<TestSpecification>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, payload FROM test_specifications ORDER BY id",
        )?;

        let specs = stmt
            .query_map([], test_specification_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(specs)
    }

    pub fn get_test_specification(&self, id: i64) -> Result<Option<TestSpecification>> {
        let spec = self
            .conn
            .query_row(
                "SELECT id, name, description, payload FROM test_specifications WHERE id = ?1",
                params![id],
                test_specification_row,
            )
            .optional()?;
        Ok(spec)
    }

    pub fn find_test_specification_by_name(&self, name: &str) -> Result<Option<TestSpecification>> {
        let spec = self
            .conn
            .query_row(
                "SELECT id, name, description, payload FROM test_specifications WHERE name = ?1",
                params![name],
                test_specification_row,
            )
            .optional()?;
        Ok(spec)
    }

    // Assessments
    pub fn create_assessment(&self, collection_id: i64, timestamp: DateTime<Utc>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO assessments (collection_id, timestamp) VALUES (?1, ?2)",
            params![collection_id, timestamp],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_security_result(
        &self,
        assessment_id: i64,
        endpoint: &str,
        verdicts: &Verdicts,
    ) -> Result<i64> {
        let verdicts_json = serde_json::to_string(verdicts)?;

        self.conn.execute(
            "INSERT INTO security_results (assessment_id, endpoint, verdicts) VALUES (?1, ?2, ?3)",
            params![assessment_id, endpoint, verdicts_json],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_assessments(&self, collection_id: i64) -> Result<Vec<Assessment>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, collection_id, timestamp FROM assessments WHERE collection_id = ?1 ORDER BY id",
        )?;

        let headers = stmt
            .query_map(params![collection_id], assessment_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        headers
            .into_iter()
            .map(|assessment| self.with_results(assessment))
            .collect()
    }

    pub fn get_assessment(&self, id: i64) -> Result<Option<Assessment>> {
        let header = self
            .conn
            .query_row(
                "SELECT id, collection_id, timestamp FROM assessments WHERE id = ?1",
                params![id],
                assessment_row,
            )
            .optional()?;

        header.map(|assessment| self.with_results(assessment)).transpose()
    }

    fn with_results(&self, mut assessment: Assessment) -> Result<Assessment> {
        let mut stmt = self.conn.prepare(
            "SELECT id, assessment_id, endpoint, verdicts FROM security_results WHERE assessment_id = ?1 ORDER BY id",
        )?;

        let rows = stmt
            .query_map(params![assessment.id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        assessment.results = rows
            .into_iter()
            .map(|(id, assessment_id, endpoint, verdicts)| {
                Ok(SecurityResult {
                    id,
                    assessment_id,
                    endpoint,
                    verdicts: serde_json::from_str(&verdicts)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(assessment)
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}

impl ResultStore for Database {
    fn collection(&self, id: i64) -> Result<Collection> {
        self.get_collection(id)?
            .ok_or_else(|| CoreError::not_found("collection", id))
    }

    fn test_specifications(&self) -> Result<Vec<TestSpecification>> {
        self.list_test_specifications()
    }

    fn test_specification(&self, id: i64) -> Result<TestSpecification> {
        self.get_test_specification(id)?
            .ok_or_else(|| CoreError::not_found("test specification", id))
    }

    fn create_assessment(&self, collection_id: i64, timestamp: DateTime<Utc>) -> Result<i64> {
        Database::create_assessment(self, collection_id, timestamp)
    }

    fn insert_security_result(
        &self,
        assessment_id: i64,
        endpoint: &str,
        verdicts: &Verdicts,
    ) -> Result<i64> {
        Database::insert_security_result(self, assessment_id, endpoint, verdicts)
    }
}

/// Raw collection row; endpoints are still JSON at this point.
struct CollectionRow {
    id: i64,
    name: String,
    api_endpoints: String,
    created_at: DateTime<Utc>,
}

impl CollectionRow {
    fn decode(self) -> Result<Collection> {
        Ok(Collection {
            id: self.id,
            name: self.name,
            api_endpoints: serde_json::from_str(&self.api_endpoints)?,
            created_at: self.created_at,
        })
    }
}

fn collection_row(row: &Row<'_>) -> rusqlite::Result<CollectionRow> {
    Ok(CollectionRow {
        id: row.get(0)?,
        name: row.get(1)?,
        api_endpoints: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn test_specification_row(row: &Row<'_>) -> rusqlite::Result<TestSpecification> {
    Ok(TestSpecification::new(
        row.get(0)?,
        row.get::<_, String>(1)?,
        row.get(2)?,
        row.get::<_, String>(3)?,
    ))
}

fn assessment_row(row: &Row<'_>) -> rusqlite::Result<Assessment> {
    Ok(Assessment {
        id: row.get(0)?,
        collection_id: row.get(1)?,
        timestamp: row.get(2)?,
        results: Vec::new(),
    })
}
