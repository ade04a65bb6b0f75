//! Database Layer with Connection Pooling and Safe Transactions
//!
//! SQLite storage for cases, versions, modification records and credits:
//! - Connection pooling via r2d2 for concurrent access
//! - Panic-safe transactions with automatic rollback
//! - Schema version tracked in `PRAGMA user_version`
//! - WAL mode so concurrent commits serialize on the write lock

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use super::{
    CaseRecord, CaseStore, CaseSummary, Charge, CommitTarget, CreditLedger, VersionCommit,
};
use crate::types::{
    AnalysisResult, CaseError, CaseImage, ImageDomain, ModificationRecord, ParseWithDefault,
    Result, ResultExt, Version, VersionKind, log_filter_error,
};

/// Shared database handle for async contexts.
pub type SharedDatabase = Arc<Database>;

const SCHEMA: &str = include_str!("schema.sql");

/// Schema version written to `PRAGMA user_version`
const SCHEMA_VERSION: u32 = 1;

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: u32,
    /// Minimum idle connections to keep ready
    pub min_idle: u32,
    /// Timeout for acquiring a connection (seconds)
    pub connection_timeout_secs: u64,
}

impl PoolConfig {
    const MIN_POOL_SIZE: u32 = 2;
    const MAX_POOL_SIZE: u32 = 16;

    /// Pool with `max_size` connections, clamped to sane bounds
    pub fn with_max_size(max_size: u32) -> Self {
        let max_size = max_size.clamp(Self::MIN_POOL_SIZE, Self::MAX_POOL_SIZE);
        Self {
            max_size,
            min_idle: (max_size / 4).max(1),
            connection_timeout_secs: 30,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::with_max_size(4)
    }
}

/// Thread-safe database with connection pooling.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open database with connection pooling at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, PoolConfig::default())
    }

    /// Open database with custom pool configuration.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: PoolConfig) -> Result<Self> {
        let manager =
            SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure_connection);

        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(std::time::Duration::from_secs(
                config.connection_timeout_secs,
            ))
            .build(manager)
            .map_err(|e| CaseError::Storage(format!("Failed to create connection pool: {}", e)))?;

        Ok(Self { pool })
    }

    /// Open an in-memory database for testing or temporary use.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory().with_init(|conn| {
            conn.execute_batch("PRAGMA foreign_keys = ON;")?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| CaseError::Storage(format!("Failed to create in-memory pool: {}", e)))?;

        Ok(Self { pool })
    }

    fn configure_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            CaseError::Storage(format!("Failed to acquire database connection: {}", e))
        })
    }

    /// Initialize database schema.
    ///
    /// Refuses a database written by a newer schema instead of guessing at it.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;
        let existing: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);
        if existing > SCHEMA_VERSION {
            return Err(CaseError::Storage(format!(
                "Database schema version {} is newer than supported version {}",
                existing, SCHEMA_VERSION
            )));
        }

        conn.execute_batch(SCHEMA)
            .with_context("Failed to initialize database schema")?;

        if existing < SCHEMA_VERSION {
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .with_context("Failed to set schema version")?;
            tracing::info!(version = SCHEMA_VERSION, "Initialized database schema");
        }
        Ok(())
    }

    /// Execute a function within a panic-safe database transaction.
    ///
    /// The write lock is taken up front (`BEGIN IMMEDIATE`), so a transaction that
    /// reads before writing cannot deadlock against a concurrent writer. If the
    /// closure errors or panics the transaction is rolled back and the pool
    /// stays usable.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + std::panic::UnwindSafe,
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .with_context("Failed to start transaction")?;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&tx)));

        match result {
            Ok(Ok(value)) => {
                tx.commit().with_context("Failed to commit transaction")?;
                Ok(value)
            }
            // Rolled back on drop
            Ok(Err(e)) => Err(e),
            Err(panic_payload) => {
                let panic_msg = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unknown panic".to_string());

                tracing::error!("Transaction panicked: {}", panic_msg);
                Err(CaseError::Storage(format!(
                    "Transaction panicked: {}",
                    panic_msg
                )))
            }
        }
    }

    fn insert_case(conn: &Connection, case: &CaseRecord) -> Result<()> {
        conn.execute(
            "INSERT INTO cases (id, title, case_text, current_version, created_at, updated_at)
             VALUES (?1, ?2, ?3, NULL, ?4, ?5)",
            params![
                case.id,
                case.title,
                case.case_text,
                case.created_at.to_rfc3339(),
                Utc::now().to_rfc3339()
            ],
        )
        .with_context("Failed to insert case")?;
        Self::insert_images(conn, &case.id, &case.images)
    }

    fn insert_images(conn: &Connection, case_id: &str, images: &[CaseImage]) -> Result<()> {
        let start: i64 = conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM case_images WHERE case_id = ?1",
            params![case_id],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "INSERT INTO case_images (case_id, position, domain, mime_type, bytes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for (offset, image) in images.iter().enumerate() {
            stmt.execute(params![
                case_id,
                start + offset as i64,
                image.domain.as_str(),
                image.mime_type,
                image.bytes,
            ])?;
        }
        Ok(())
    }

    fn load_images(conn: &Connection, case_id: &str) -> Result<Vec<CaseImage>> {
        let mut stmt = conn.prepare(
            "SELECT domain, mime_type, bytes FROM case_images
             WHERE case_id = ?1 ORDER BY position",
        )?;
        let images = stmt
            .query_map(params![case_id], |row| {
                let domain: String = row.get(0)?;
                Ok(CaseImage {
                    domain: ImageDomain::parse_or_default(&domain),
                    mime_type: row.get(1)?,
                    bytes: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context_fn(|| format!("Failed to load images for case {}", case_id))?;
        Ok(images)
    }
}

/// Insert `version` under the next free number for the case
fn insert_version(conn: &Connection, case_id: &str, version: &Version) -> Result<u32> {
    let number: u32 = conn.query_row(
        "SELECT COALESCE(MAX(number), 0) + 1 FROM versions WHERE case_id = ?1",
        params![case_id],
        |row| row.get(0),
    )?;
    let result_json =
        serde_json::to_string(&version.result).with_context("Failed to serialize result")?;
    let modifications_json = serde_json::to_string(&version.modification_history)
        .with_context("Failed to serialize modification history")?;

    conn.execute(
        "INSERT INTO versions (case_id, number, kind, result_json, modifications_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            case_id,
            number,
            version.kind.as_str(),
            result_json,
            modifications_json,
            version.created_at.to_rfc3339(),
        ],
    )
    .with_context_fn(|| format!("Failed to save version {} of {}", number, case_id))?;
    Ok(number)
}

fn insert_modification(conn: &Connection, case_id: &str, record: &ModificationRecord) -> Result<()> {
    conn.execute(
        "INSERT INTO modifications
         (id, case_id, section_type, added_text, version_at_creation, recorded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            record.id,
            case_id,
            record.section_type.as_str(),
            record.added_text,
            record.version_at_creation,
            record.timestamp.to_rfc3339(),
        ],
    )
    .with_context("Failed to append modification")?;
    Ok(())
}

fn set_current(conn: &Connection, case_id: &str, number: u32) -> Result<()> {
    let updated = conn.execute(
        "UPDATE cases SET current_version = ?2, updated_at = ?3 WHERE id = ?1",
        params![case_id, number, Utc::now().to_rfc3339()],
    )?;
    if updated == 0 {
        return Err(CaseError::NotFound(format!("case {}", case_id)));
    }
    Ok(())
}

/// Compare-and-decrement in one statement: concurrent debits cannot both pass
/// the balance check
fn debit_in(conn: &Connection, user_id: &str, amount: u32) -> Result<bool> {
    if amount == 0 {
        return Ok(true);
    }
    let updated = conn.execute(
        "UPDATE credits SET balance = balance - ?2, updated_at = ?3
         WHERE user_id = ?1 AND balance >= ?2",
        params![user_id, amount, Utc::now().to_rfc3339()],
    )?;
    tracing::debug!(user_id, amount, debited = updated == 1, "Credit debit");
    Ok(updated == 1)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context_fn(|| format!("Corrupted timestamp '{}'", raw))
}

impl CaseStore for Database {
    fn load_case(&self, case_id: &str) -> Result<CaseRecord> {
        let conn = self.conn()?;
        let row: Option<(Option<String>, String, Option<u32>, String)> = conn
            .query_row(
                "SELECT title, case_text, current_version, created_at FROM cases WHERE id = ?1",
                params![case_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        let Some((title, case_text, current_version, created_at)) = row else {
            return Err(CaseError::NotFound(format!("case {}", case_id)));
        };

        Ok(CaseRecord {
            id: case_id.to_string(),
            title,
            case_text,
            images: Self::load_images(&conn, case_id)?,
            current_version,
            created_at: parse_timestamp(&created_at)?,
        })
    }

    fn list_cases(&self) -> Result<Vec<CaseSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.title, c.current_version, c.created_at,
                    (SELECT COUNT(*) FROM versions v WHERE v.case_id = c.id)
             FROM cases c ORDER BY c.created_at DESC",
        )?;

        let rows: Vec<(String, Option<String>, Option<u32>, String, u32)> = stmt
            .query_map([], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .filter_map(|r| log_filter_error(r, "listing cases"))
            .collect();

        rows.into_iter()
            .map(|(id, title, current_version, created_at, version_count)| {
                Ok(CaseSummary {
                    id,
                    title,
                    current_version,
                    version_count,
                    created_at: parse_timestamp(&created_at)?,
                })
            })
            .collect()
    }

    fn commit_version(&self, commit: VersionCommit<'_>) -> Result<Version> {
        let case_id = commit.target.case_id().to_string();
        let number = self.transaction(|conn| {
            if let Some(Charge { user_id, amount }) = commit.charge
                && !debit_in(conn, user_id, amount)?
            {
                return Err(CaseError::CreditExhausted {
                    user_id: user_id.to_string(),
                    required: amount,
                });
            }
            match commit.target {
                CommitTarget::NewCase(record) => Self::insert_case(conn, record)?,
                CommitTarget::Existing {
                    case_id,
                    new_images,
                } => Self::insert_images(conn, case_id, new_images)?,
            }
            if let Some(record) = commit.modification {
                insert_modification(conn, &case_id, record)?;
            }
            let number = insert_version(conn, &case_id, commit.version)?;
            set_current(conn, &case_id, number)?;
            Ok(number)
        })?;

        tracing::debug!(case_id = %case_id, number, "Committed version");
        Ok(Version {
            number,
            ..commit.version.clone()
        })
    }

    fn load_versions(&self, case_id: &str) -> Result<Vec<Version>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT number, kind, result_json, modifications_json, created_at
             FROM versions WHERE case_id = ?1 ORDER BY number",
        )?;

        let rows: Vec<(u32, String, String, String, String)> = stmt
            .query_map(params![case_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context("Failed to fetch versions")?;

        let mut versions = Vec::with_capacity(rows.len());
        for (number, kind, result_json, modifications_json, created_at) in rows {
            let result: AnalysisResult = serde_json::from_str(&result_json)
                .with_context_fn(|| format!("Corrupted result for version {}", number))?;
            let modification_history = serde_json::from_str(&modifications_json)
                .with_context_fn(|| format!("Corrupted history for version {}", number))?;

            versions.push(Version {
                number,
                kind: VersionKind::parse_or_default(&kind),
                result,
                modification_history,
                created_at: parse_timestamp(&created_at)?,
            });
        }

        Ok(versions)
    }

    fn set_current_version(&self, case_id: &str, number: u32) -> Result<()> {
        set_current(&*self.conn()?, case_id, number)
    }

    fn append_modification(&self, case_id: &str, record: &ModificationRecord) -> Result<()> {
        insert_modification(&*self.conn()?, case_id, record)
    }

    fn update_modification(&self, case_id: &str, record: &ModificationRecord) -> Result<()> {
        let updated = self.conn()?.execute(
            "UPDATE modifications SET added_text = ?3, recorded_at = ?4
             WHERE case_id = ?1 AND id = ?2",
            params![
                case_id,
                record.id,
                record.added_text,
                record.timestamp.to_rfc3339()
            ],
        )?;
        if updated == 0 {
            return Err(CaseError::NotFound(format!("modification {}", record.id)));
        }
        Ok(())
    }

    fn load_modifications(&self, case_id: &str) -> Result<Vec<ModificationRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, section_type, added_text, version_at_creation, recorded_at
             FROM modifications WHERE case_id = ?1 ORDER BY rowid",
        )?;

        let rows: Vec<(String, String, String, u32, String)> = stmt
            .query_map(params![case_id], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context("Failed to fetch modifications")?;

        rows.into_iter()
            .map(|(id, section, added_text, version_at_creation, recorded_at)| {
                Ok(ModificationRecord {
                    section_type: section.parse().map_err(CaseError::Storage)?,
                    timestamp: parse_timestamp(&recorded_at)?,
                    id,
                    added_text,
                    version_at_creation,
                })
            })
            .collect()
    }
}

impl CreditLedger for Database {
    fn balance(&self, user_id: &str) -> Result<u32> {
        let balance: Option<u32> = self
            .conn()?
            .query_row(
                "SELECT balance FROM credits WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(balance.unwrap_or(0))
    }

    fn debit(&self, user_id: &str, amount: u32) -> Result<bool> {
        debit_in(&*self.conn()?, user_id, amount)
    }

    fn grant(&self, user_id: &str, amount: u32) -> Result<u32> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO credits (user_id, balance, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE
             SET balance = balance + excluded.balance, updated_at = excluded.updated_at",
            params![user_id, amount, Utc::now().to_rfc3339()],
        )
        .with_context("Failed to grant credits")?;

        let balance = conn.query_row(
            "SELECT balance FROM credits WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CanonicalSectionId, CaseInput, Section};
    use tempfile::TempDir;

    fn db() -> Database {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        db.initialize().expect("Failed to initialize schema");
        db
    }

    fn case_with_images(n: u8) -> CaseRecord {
        let input = (0..n).fold(CaseInput::new("Fever and rash"), |input, i| {
            input.with_image(CaseImage::new(vec![i, 1, 2], ImageDomain::Dermatology))
        });
        CaseRecord::new(&input, Some("Rash".to_string()))
    }

    fn version(number: u32) -> Version {
        Version {
            number,
            kind: VersionKind::Relaunch,
            result: AnalysisResult {
                sections: vec![Section::new(CanonicalSectionId::KeyData, "CRP 120")],
                image_analyses: vec!["erythema".to_string()],
                ..Default::default()
            },
            modification_history: vec![ModificationRecord::new(
                CanonicalSectionId::KeyData,
                "note",
                number - 1,
            )],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_open_in_memory() {
        let db = db();
        let conn = db.conn().expect("Failed to get connection");
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        for table in ["cases", "case_images", "versions", "modifications", "credits"] {
            assert!(tables.contains(&table.to_string()), "missing {}", table);
        }
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let db = db();
        db.initialize().expect("Second initialize failed");
    }

    #[test]
    fn test_transaction_panic_safety() {
        let db = db();

        let result = db.transaction(|_conn| {
            panic!("Intentional panic for testing");
            #[allow(unreachable_code)]
            Ok(())
        });

        assert!(result.unwrap_err().to_string().contains("panicked"));
        assert!(db.conn().is_ok());
    }

    fn new_case(db: &Database, case: &CaseRecord, charge: Option<Charge<'_>>) -> Result<Version> {
        db.commit_version(VersionCommit {
            target: CommitTarget::NewCase(case),
            modification: None,
            version: &version(1),
            charge,
        })
    }

    fn rerun<'a>(
        case_id: &'a str,
        images: &'a [CaseImage],
        version: &'a Version,
        charge: Option<Charge<'a>>,
    ) -> VersionCommit<'a> {
        VersionCommit {
            target: CommitTarget::Existing {
                case_id,
                new_images: images,
            },
            modification: None,
            version,
            charge,
        }
    }

    #[test]
    fn test_new_case_commit_roundtrip() {
        let db = db();
        let case = case_with_images(2);
        let stored = new_case(&db, &case, None).unwrap();
        assert_eq!(stored.number, 1);

        let loaded = db.load_case(&case.id).unwrap();
        assert_eq!(loaded.case_text, "Fever and rash");
        assert_eq!(loaded.title.as_deref(), Some("Rash"));
        assert_eq!(loaded.images, case.images);
        assert_eq!(loaded.current_version, Some(1));

        assert!(matches!(db.load_case("missing"), Err(CaseError::NotFound(_))));
    }

    #[test]
    fn test_commit_appends_images_and_numbers_after_highest() {
        let db = db();
        let case = case_with_images(2);
        new_case(&db, &case, None).unwrap();

        // The caller's number is not trusted
        let images = [CaseImage::new(vec![9], ImageDomain::Biology)];
        let stored = db
            .commit_version(rerun(&case.id, &images, &version(7), None))
            .unwrap();
        assert_eq!(stored.number, 2);

        let loaded = db.load_case(&case.id).unwrap();
        assert_eq!(loaded.images.len(), 3);
        assert_eq!(loaded.images[2].bytes, vec![9]);
        assert_eq!(loaded.images[2].domain, ImageDomain::Biology);
        assert_eq!(loaded.current_version, Some(2));

        let versions = db.load_versions(&case.id).unwrap();
        assert_eq!(versions.iter().map(|v| v.number).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(versions[1].kind, VersionKind::Relaunch);
        assert_eq!(versions[1].result, version(7).result);
        assert_eq!(versions[1].modification_history.len(), 1);

        db.set_current_version(&case.id, 1).unwrap();
        assert_eq!(db.load_case(&case.id).unwrap().current_version, Some(1));
        let summaries = db.list_cases().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].version_count, 2);
        assert!(matches!(
            db.set_current_version("missing", 1),
            Err(CaseError::NotFound(_))
        ));
    }

    #[test]
    fn test_failed_commit_writes_nothing() {
        let db = db();
        db.grant("u1", 5).unwrap();
        let case = case_with_images(1);
        new_case(&db, &case, None).unwrap();
        let logged = ModificationRecord::new(CanonicalSectionId::KeyData, "note", 1);
        db.append_modification(&case.id, &logged).unwrap();

        // Duplicate modification id fails after the debit and the image insert
        let images = [CaseImage::new(vec![4], ImageDomain::Ecg)];
        let v2 = version(2);
        let mut commit = rerun(
            &case.id,
            &images,
            &v2,
            Some(Charge {
                user_id: "u1",
                amount: 2,
            }),
        );
        commit.modification = Some(&logged);
        assert!(db.commit_version(commit).is_err());

        assert_eq!(db.balance("u1").unwrap(), 5);
        let loaded = db.load_case(&case.id).unwrap();
        assert_eq!(loaded.images.len(), 1);
        assert_eq!(loaded.current_version, Some(1));
        assert_eq!(db.load_versions(&case.id).unwrap().len(), 1);
        assert_eq!(db.load_modifications(&case.id).unwrap().len(), 1);
    }

    #[test]
    fn test_refused_charge_creates_no_case() {
        let db = db();
        db.grant("u1", 1).unwrap();
        let case = case_with_images(1);

        let err = new_case(
            &db,
            &case,
            Some(Charge {
                user_id: "u1",
                amount: 2,
            }),
        )
        .unwrap_err();

        assert!(matches!(err, CaseError::CreditExhausted { required: 2, .. }));
        assert!(matches!(db.load_case(&case.id), Err(CaseError::NotFound(_))));
        assert_eq!(db.balance("u1").unwrap(), 1);
    }

    #[test]
    fn test_commit_logs_modification_with_version() {
        let db = db();
        let case = case_with_images(0);
        new_case(&db, &case, None).unwrap();

        let record = ModificationRecord::new(CanonicalSectionId::KeyData, "Troponin rising", 1);
        let v2 = version(2);
        let mut commit = rerun(&case.id, &[], &v2, None);
        commit.modification = Some(&record);
        assert_eq!(db.commit_version(commit).unwrap().number, 2);

        let loaded = db.load_modifications(&case.id).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, record.id);
    }

    #[test]
    fn test_modifications_roundtrip() {
        let db = db();
        let case = case_with_images(0);
        new_case(&db, &case, None).unwrap();

        let first = ModificationRecord::new(CanonicalSectionId::KeyData, "first", 0);
        let second = ModificationRecord::new(CanonicalSectionId::TherapeuticDecisions, "second", 1);
        db.append_modification(&case.id, &first).unwrap();
        db.append_modification(&case.id, &second).unwrap();

        let mut edited = first.clone();
        edited.added_text = "first, corrected".to_string();
        db.update_modification(&case.id, &edited).unwrap();

        let loaded = db.load_modifications(&case.id).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, first.id);
        assert_eq!(loaded[0].added_text, "first, corrected");
        assert_eq!(loaded[1].section_type, CanonicalSectionId::TherapeuticDecisions);
        assert_eq!(loaded[1].version_at_creation, 1);

        let unknown = ModificationRecord::new(CanonicalSectionId::KeyData, "x", 0);
        assert!(matches!(
            db.update_modification(&case.id, &unknown),
            Err(CaseError::NotFound(_))
        ));
    }

    #[test]
    fn test_initialize_rejects_newer_schema() {
        let db = db();
        db.conn()
            .unwrap()
            .pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        assert!(matches!(db.initialize(), Err(CaseError::Storage(_))));
    }

    #[test]
    fn test_credit_ledger() {
        let db = db();
        assert_eq!(db.balance("u1").unwrap(), 0);
        assert!(!db.has_at_least("u1", 1).unwrap());
        assert!(!db.debit("u1", 1).unwrap());

        assert_eq!(db.grant("u1", 3).unwrap(), 3);
        assert_eq!(db.grant("u1", 2).unwrap(), 5);
        assert!(db.has_at_least("u1", 5).unwrap());

        assert!(db.debit("u1", 4).unwrap());
        assert!(!db.debit("u1", 2).unwrap());
        assert_eq!(db.balance("u1").unwrap(), 1);
    }

    #[test]
    fn test_concurrent_debits_never_overdraw() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path().join("cases.db")).unwrap();
        db.initialize().unwrap();
        db.grant("shared", 5).unwrap();

        let successes = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..10)
                .map(|_| scope.spawn(|| db.debit("shared", 1).unwrap()))
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });

        assert_eq!(successes, 5);
        assert_eq!(db.balance("shared").unwrap(), 0);
    }

    #[test]
    fn test_concurrent_commits_get_distinct_numbers() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::open(temp_dir.path().join("cases.db")).unwrap();
        db.initialize().unwrap();
        db.grant("shared", 5).unwrap();
        let case = case_with_images(0);
        new_case(&db, &case, None).unwrap();

        let results: Vec<Result<Version>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        let version = version(2);
                        db.commit_version(rerun(
                            &case.id,
                            &[],
                            &version,
                            Some(Charge {
                                user_id: "shared",
                                amount: 1,
                            }),
                        ))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut numbers: Vec<u32> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|v| v.number))
            .collect();
        numbers.sort_unstable();
        assert_eq!(numbers, vec![2, 3, 4, 5, 6]);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, CaseError::CreditExhausted { .. }))
        );
        assert_eq!(db.balance("shared").unwrap(), 0);
        assert_eq!(db.load_versions(&case.id).unwrap().len(), 6);
    }

    #[test]
    fn test_on_disk_database_persists() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cases.db");
        let case = case_with_images(1);
        {
            let db = Database::open(&path).unwrap();
            db.initialize().unwrap();
            new_case(&db, &case, None).unwrap();
        }

        let db = Database::open_with_config(&path, PoolConfig::with_max_size(2)).unwrap();
        db.initialize().unwrap();
        assert_eq!(db.load_case(&case.id).unwrap().images.len(), 1);
    }

    #[test]
    fn test_pool_config_bounds() {
        assert_eq!(PoolConfig::with_max_size(0).max_size, PoolConfig::MIN_POOL_SIZE);
        assert_eq!(PoolConfig::with_max_size(100).max_size, PoolConfig::MAX_POOL_SIZE);
        let config = PoolConfig::default();
        assert!(config.min_idle <= config.max_size);
    }
}
