// persona-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Document Store
// Description: Durable store for profiles, events, rules, and locks.
// Purpose: Persist service collections as JSON documents over SQLite WAL.
// Dependencies: persona-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Each collection is a table holding one JSON document per row, with the
//! columns the store actually queries on (profile parenthood, event type,
//! name, timestamp) mirrored out of the document. Rule tables update in
//! place so insertion order survives replacements, because resolution
//! tie-breaking depends on store-returned order. The lock table implements
//! conditional-upsert acquisition with a monotonic fence counter and
//! survives process restarts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use persona_core::interfaces::EnrichmentRuleStore;
use persona_core::interfaces::EventQuery;
use persona_core::interfaces::EventSchemaStore;
use persona_core::interfaces::EventStore;
use persona_core::interfaces::LockStore;
use persona_core::interfaces::ProfileStore;
use persona_core::interfaces::ResolutionRuleStore;
use persona_core::interfaces::StoreError;
use persona_core::runtime::document_matches;
use persona_core::AppId;
use persona_core::Device;
use persona_core::EnrichmentRule;
use persona_core::Event;
use persona_core::EventId;
use persona_core::EventSchema;
use persona_core::Profile;
use persona_core::ProfileId;
use persona_core::ResolutionRule;
use persona_core::RuleId;
use persona_core::SchemaId;
use persona_core::Timestamp;
use persona_core::TraitNamespace;
use rusqlite::params;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Configuration for the `SQLite` document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl SqliteStoreConfig {
    /// Creates a configuration with defaults for the given path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored document fails to deserialize.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Invalid store data or argument.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed document store with WAL support.
#[derive(Clone)]
pub struct SqliteStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens the document store, creating the schema on first use.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        ensure_parent_dir(&config.path)?;
        let connection = Connection::open(&config.path)?;
        connection.pragma_update(None, "journal_mode", "wal")?;
        connection.pragma_update(None, "synchronous", "normal")?;
        connection.pragma_update(None, "foreign_keys", "on")?;
        connection.busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))?;
        initialize_schema(&connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the connection, mapping poisoning to a store error.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("connection mutex poisoned".to_string()))
    }

    /// Read-modify-write of one profile document inside a transaction.
    fn update_profile<F>(&self, profile_id: &ProfileId, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Profile),
    {
        let mut guard = self.lock().map_err(StoreError::from)?;
        let tx = guard.transaction().map_err(|err| StoreError::Store(err.to_string()))?;
        let doc: Option<String> = tx
            .query_row(
                "SELECT doc FROM profiles WHERE profile_id = ?1",
                params![profile_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let doc =
            doc.ok_or_else(|| StoreError::Invalid(format!("profile {profile_id} not found")))?;
        let mut profile: Profile = decode(&doc)?;
        apply(&mut profile);
        profile.updated_at = Timestamp::now();
        let encoded = encode(&profile)?;
        tx.execute(
            "UPDATE profiles SET doc = ?2, is_parent = ?3, list_profile = ?4
             WHERE profile_id = ?1",
            params![
                profile_id.as_str(),
                encoded,
                profile.hierarchy.is_parent,
                profile.hierarchy.list_profile,
            ],
        )
        .map_err(|err| StoreError::Store(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Store(err.to_string()))?;
        Ok(())
    }

    /// Collects profile documents for a query.
    fn select_profiles(
        &self,
        sql: &str,
        bind: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<Profile>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let mut statement = guard.prepare(sql).map_err(|err| StoreError::Store(err.to_string()))?;
        let rows = statement
            .query_map(bind, |row| row.get::<_, String>(0))
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            let doc = row.map_err(|err| StoreError::Store(err.to_string()))?;
            out.push(decode(&doc)?);
        }
        Ok(out)
    }
}

/// Creates the parent directory of the database file when missing.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        }
    }
    Ok(())
}

/// Creates tables and records the schema version.
fn initialize_schema(connection: &Connection) -> Result<(), SqliteStoreError> {
    connection.execute_batch(
        "CREATE TABLE IF NOT EXISTS meta (
             name  TEXT PRIMARY KEY,
             value INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS profiles (
             profile_id   TEXT PRIMARY KEY,
             doc          TEXT NOT NULL,
             is_parent    INTEGER NOT NULL,
             list_profile INTEGER NOT NULL
         );
         CREATE TABLE IF NOT EXISTS events (
             event_id        TEXT PRIMARY KEY,
             profile_id      TEXT NOT NULL,
             event_type      TEXT NOT NULL,
             event_name      TEXT NOT NULL,
             event_timestamp INTEGER NOT NULL,
             doc             TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_events_profile
             ON events (profile_id, event_timestamp);
         CREATE TABLE IF NOT EXISTS enrichment_rules (
             rule_id TEXT PRIMARY KEY,
             doc     TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS resolution_rules (
             rule_id TEXT PRIMARY KEY,
             doc     TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS event_schemas (
             schema_id TEXT PRIMARY KEY,
             doc       TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS locks (
             key           TEXT PRIMARY KEY,
             fence         INTEGER NOT NULL,
             expires_at_ms INTEGER NOT NULL
         );",
    )?;
    connection.execute(
        "INSERT INTO meta (name, value) VALUES ('schema_version', ?1)
         ON CONFLICT(name) DO NOTHING",
        params![SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO meta (name, value) VALUES ('next_fence', 0)
         ON CONFLICT(name) DO NOTHING",
        params![],
    )?;
    let version: i64 = connection.query_row(
        "SELECT value FROM meta WHERE name = 'schema_version'",
        params![],
        |row| row.get(0),
    )?;
    if version != SCHEMA_VERSION {
        return Err(SqliteStoreError::Invalid(format!(
            "schema version mismatch: found {version}, expected {SCHEMA_VERSION}"
        )));
    }
    Ok(())
}

/// Serializes a document for storage.
fn encode<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|err| StoreError::Invalid(err.to_string()))
}

/// Deserializes a stored document, failing closed on corruption.
fn decode<T: DeserializeOwned>(doc: &str) -> Result<T, StoreError> {
    serde_json::from_str(doc).map_err(|err| StoreError::Corrupt(err.to_string()))
}

// ============================================================================
// SECTION: Profile Store
// ============================================================================

impl ProfileStore for SqliteStore {
    fn insert_if_absent(&self, profile: &Profile) -> Result<bool, StoreError> {
        let encoded = encode(profile)?;
        let guard = self.lock().map_err(StoreError::from)?;
        let inserted = guard
            .execute(
                "INSERT INTO profiles (profile_id, doc, is_parent, list_profile)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(profile_id) DO NOTHING",
                params![
                    profile.profile_id.as_str(),
                    encoded,
                    profile.hierarchy.is_parent,
                    profile.hierarchy.list_profile,
                ],
            )
            .map_err(|err| StoreError::Store(err.to_string()))?;
        Ok(inserted > 0)
    }

    fn find(&self, profile_id: &ProfileId) -> Result<Option<Profile>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let doc: Option<String> = guard
            .query_row(
                "SELECT doc FROM profiles WHERE profile_id = ?1",
                params![profile_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Store(err.to_string()))?;
        doc.map(|doc| decode(&doc)).transpose()
    }

    fn save(&self, profile: &Profile) -> Result<(), StoreError> {
        let encoded = encode(profile)?;
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO profiles (profile_id, doc, is_parent, list_profile)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(profile_id) DO UPDATE
                 SET doc = excluded.doc,
                     is_parent = excluded.is_parent,
                     list_profile = excluded.list_profile",
                params![
                    profile.profile_id.as_str(),
                    encoded,
                    profile.hierarchy.is_parent,
                    profile.hierarchy.list_profile,
                ],
            )
            .map_err(|err| StoreError::Store(err.to_string()))?;
        Ok(())
    }

    fn delete(&self, profile_id: &ProfileId) -> Result<bool, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let removed = guard
            .execute("DELETE FROM profiles WHERE profile_id = ?1", params![profile_id.as_str()])
            .map_err(|err| StoreError::Store(err.to_string()))?;
        Ok(removed > 0)
    }

    fn list(&self) -> Result<Vec<Profile>, StoreError> {
        self.select_profiles("SELECT doc FROM profiles ORDER BY profile_id", &[])
    }

    fn find_parents_except(&self, profile_id: &ProfileId) -> Result<Vec<Profile>, StoreError> {
        self.select_profiles(
            "SELECT doc FROM profiles WHERE is_parent = 1 AND profile_id != ?1
             ORDER BY profile_id",
            &[&profile_id.as_str()],
        )
    }

    fn upsert_device(
        &self,
        profile_id: &ProfileId,
        app_id: &AppId,
        device: &Device,
    ) -> Result<(), StoreError> {
        self.update_profile(profile_id, |profile| {
            profile.application_data_mut(app_id).upsert_device(device);
        })
    }

    fn set_trait_value(
        &self,
        profile_id: &ProfileId,
        namespace: TraitNamespace,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        if namespace == TraitNamespace::ApplicationData {
            return Err(StoreError::Invalid(
                "application_data trait writes are not supported".to_string(),
            ));
        }
        self.update_profile(profile_id, |profile| match namespace {
            TraitNamespace::Traits => {
                profile.traits.insert(field.to_string(), value);
            }
            TraitNamespace::IdentityAttributes => {
                profile.identity_attributes.insert(field.to_string(), value);
            }
            TraitNamespace::ApplicationData => {}
        })
    }

    fn merge_identity_attributes(
        &self,
        profile_id: &ProfileId,
        attributes: &BTreeMap<String, Value>,
    ) -> Result<(), StoreError> {
        self.update_profile(profile_id, |profile| {
            for (name, value) in attributes {
                profile.identity_attributes.insert(name.clone(), value.clone());
            }
        })
    }
}

// ============================================================================
// SECTION: Event Store
// ============================================================================

impl EventStore for SqliteStore {
    fn append(&self, event: &Event) -> Result<(), StoreError> {
        let encoded = encode(event)?;
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute(
                "INSERT INTO events
                     (event_id, profile_id, event_type, event_name, event_timestamp, doc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.event_id.as_str(),
                    event.profile_id.as_str(),
                    event.event_type.as_str(),
                    event.event_name,
                    event.event_timestamp.as_secs(),
                    encoded,
                ],
            )
            .map_err(|err| StoreError::Store(err.to_string()))?;
        Ok(())
    }

    fn find(&self, event_id: &EventId) -> Result<Option<Event>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let doc: Option<String> = guard
            .query_row(
                "SELECT doc FROM events WHERE event_id = ?1",
                params![event_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Store(err.to_string()))?;
        doc.map(|doc| decode(&doc)).transpose()
    }

    fn query(&self, query: &EventQuery) -> Result<Vec<Event>, StoreError> {
        let mut sql = String::from("SELECT doc FROM events WHERE 1 = 1");
        let mut bind: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if let Some(profile_id) = &query.profile_id {
            bind.push(Box::new(profile_id.as_str().to_string()));
            sql.push_str(&format!(" AND profile_id = ?{}", bind.len()));
        }
        if let Some(event_type) = query.event_type {
            bind.push(Box::new(event_type.as_str().to_string()));
            sql.push_str(&format!(" AND event_type = ?{}", bind.len()));
        }
        if let Some(event_name) = &query.event_name {
            bind.push(Box::new(event_name.to_ascii_lowercase()));
            sql.push_str(&format!(" AND event_name = ?{}", bind.len()));
        }
        if let Some(since) = query.since {
            bind.push(Box::new(since.as_secs()));
            sql.push_str(&format!(" AND event_timestamp >= ?{}", bind.len()));
        }
        sql.push_str(" ORDER BY rowid");

        let guard = self.lock().map_err(StoreError::from)?;
        let mut statement = guard.prepare(&sql).map_err(|err| StoreError::Store(err.to_string()))?;
        let refs: Vec<&dyn rusqlite::ToSql> = bind.iter().map(|value| &**value).collect();
        let rows = statement
            .query_map(refs.as_slice(), |row| row.get::<_, String>(0))
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            let doc = row.map_err(|err| StoreError::Store(err.to_string()))?;
            let event: Event = decode(&doc)?;
            if query.clauses.is_empty() || document_matches(&event.to_document(), &query.clauses) {
                out.push(event);
            }
        }
        Ok(out)
    }

    fn delete_for_profile(&self, profile_id: &ProfileId) -> Result<u64, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let removed = guard
            .execute("DELETE FROM events WHERE profile_id = ?1", params![profile_id.as_str()])
            .map_err(|err| StoreError::Store(err.to_string()))?;
        Ok(removed as u64)
    }
}

// ============================================================================
// SECTION: Rule Stores
// ============================================================================

/// Update-then-insert upsert that preserves the row's insertion order.
fn upsert_document(
    connection: &Connection,
    table: &str,
    key_column: &str,
    key: &str,
    doc: &str,
) -> Result<(), StoreError> {
    let updated = connection
        .execute(
            &format!("UPDATE {table} SET doc = ?2 WHERE {key_column} = ?1"),
            params![key, doc],
        )
        .map_err(|err| StoreError::Store(err.to_string()))?;
    if updated == 0 {
        connection
            .execute(
                &format!("INSERT INTO {table} ({key_column}, doc) VALUES (?1, ?2)"),
                params![key, doc],
            )
            .map_err(|err| StoreError::Store(err.to_string()))?;
    }
    Ok(())
}

/// Loads one document by key.
fn find_document<T: DeserializeOwned>(
    connection: &Connection,
    table: &str,
    key_column: &str,
    key: &str,
) -> Result<Option<T>, StoreError> {
    let doc: Option<String> = connection
        .query_row(
            &format!("SELECT doc FROM {table} WHERE {key_column} = ?1"),
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|err| StoreError::Store(err.to_string()))?;
    doc.map(|doc| decode(&doc)).transpose()
}

/// Lists all documents in insertion order.
fn list_documents<T: DeserializeOwned>(
    connection: &Connection,
    table: &str,
) -> Result<Vec<T>, StoreError> {
    let mut statement = connection
        .prepare(&format!("SELECT doc FROM {table} ORDER BY rowid"))
        .map_err(|err| StoreError::Store(err.to_string()))?;
    let rows = statement
        .query_map(params![], |row| row.get::<_, String>(0))
        .map_err(|err| StoreError::Store(err.to_string()))?;
    let mut out = Vec::new();
    for row in rows {
        let doc = row.map_err(|err| StoreError::Store(err.to_string()))?;
        out.push(decode(&doc)?);
    }
    Ok(out)
}

/// Deletes one document by key.
fn delete_document(
    connection: &Connection,
    table: &str,
    key_column: &str,
    key: &str,
) -> Result<bool, StoreError> {
    let removed = connection
        .execute(&format!("DELETE FROM {table} WHERE {key_column} = ?1"), params![key])
        .map_err(|err| StoreError::Store(err.to_string()))?;
    Ok(removed > 0)
}

impl EnrichmentRuleStore for SqliteStore {
    fn upsert(&self, rule: &EnrichmentRule) -> Result<(), StoreError> {
        let encoded = encode(rule)?;
        let guard = self.lock().map_err(StoreError::from)?;
        upsert_document(&guard, "enrichment_rules", "rule_id", rule.rule_id.as_str(), &encoded)
    }

    fn find(&self, rule_id: &RuleId) -> Result<Option<EnrichmentRule>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        find_document(&guard, "enrichment_rules", "rule_id", rule_id.as_str())
    }

    fn list(&self) -> Result<Vec<EnrichmentRule>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        list_documents(&guard, "enrichment_rules")
    }

    fn delete(&self, rule_id: &RuleId) -> Result<bool, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        delete_document(&guard, "enrichment_rules", "rule_id", rule_id.as_str())
    }
}

impl ResolutionRuleStore for SqliteStore {
    fn upsert(&self, rule: &ResolutionRule) -> Result<(), StoreError> {
        let encoded = encode(rule)?;
        let guard = self.lock().map_err(StoreError::from)?;
        upsert_document(&guard, "resolution_rules", "rule_id", rule.rule_id.as_str(), &encoded)
    }

    fn find(&self, rule_id: &RuleId) -> Result<Option<ResolutionRule>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        find_document(&guard, "resolution_rules", "rule_id", rule_id.as_str())
    }

    fn list(&self) -> Result<Vec<ResolutionRule>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        list_documents(&guard, "resolution_rules")
    }

    fn set_active(&self, rule_id: &RuleId, is_active: bool) -> Result<bool, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        let Some(mut rule) = find_document::<ResolutionRule>(
            &guard,
            "resolution_rules",
            "rule_id",
            rule_id.as_str(),
        )?
        else {
            return Ok(false);
        };
        rule.is_active = is_active;
        rule.updated_at = Timestamp::now();
        let encoded = encode(&rule)?;
        upsert_document(&guard, "resolution_rules", "rule_id", rule_id.as_str(), &encoded)?;
        Ok(true)
    }

    fn delete(&self, rule_id: &RuleId) -> Result<bool, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        delete_document(&guard, "resolution_rules", "rule_id", rule_id.as_str())
    }
}

impl EventSchemaStore for SqliteStore {
    fn upsert(&self, schema: &EventSchema) -> Result<(), StoreError> {
        let encoded = encode(schema)?;
        let guard = self.lock().map_err(StoreError::from)?;
        upsert_document(&guard, "event_schemas", "schema_id", schema.schema_id.as_str(), &encoded)
    }

    fn find(&self, schema_id: &SchemaId) -> Result<Option<EventSchema>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        find_document(&guard, "event_schemas", "schema_id", schema_id.as_str())
    }

    fn list(&self) -> Result<Vec<EventSchema>, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        list_documents(&guard, "event_schemas")
    }

    fn delete(&self, schema_id: &SchemaId) -> Result<bool, StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        delete_document(&guard, "event_schemas", "schema_id", schema_id.as_str())
    }
}

// ============================================================================
// SECTION: Lock Store
// ============================================================================

impl LockStore for SqliteStore {
    fn try_acquire(
        &self,
        key: &str,
        expires_at_ms: i64,
        now_ms: i64,
    ) -> Result<Option<u64>, StoreError> {
        let mut guard = self.lock().map_err(StoreError::from)?;
        let tx = guard.transaction().map_err(|err| StoreError::Store(err.to_string()))?;
        let live: Option<i64> = tx
            .query_row(
                "SELECT expires_at_ms FROM locks WHERE key = ?1 AND expires_at_ms > ?2",
                params![key, now_ms],
                |row| row.get(0),
            )
            .optional()
            .map_err(|err| StoreError::Store(err.to_string()))?;
        if live.is_some() {
            return Ok(None);
        }
        tx.execute("UPDATE meta SET value = value + 1 WHERE name = 'next_fence'", params![])
            .map_err(|err| StoreError::Store(err.to_string()))?;
        let fence: i64 = tx
            .query_row("SELECT value FROM meta WHERE name = 'next_fence'", params![], |row| {
                row.get(0)
            })
            .map_err(|err| StoreError::Store(err.to_string()))?;
        tx.execute(
            "INSERT INTO locks (key, fence, expires_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE
             SET fence = excluded.fence, expires_at_ms = excluded.expires_at_ms",
            params![key, fence, expires_at_ms],
        )
        .map_err(|err| StoreError::Store(err.to_string()))?;
        tx.commit().map_err(|err| StoreError::Store(err.to_string()))?;
        Ok(Some(u64::try_from(fence).unwrap_or(0)))
    }

    fn release(&self, key: &str) -> Result<(), StoreError> {
        let guard = self.lock().map_err(StoreError::from)?;
        guard
            .execute("DELETE FROM locks WHERE key = ?1", params![key])
            .map_err(|err| StoreError::Store(err.to_string()))?;
        Ok(())
    }
}
