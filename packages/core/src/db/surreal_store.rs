//! SurrealDocumentStore - DocumentStore Implementation for SurrealDB
//!
//! Stores every raw node record in a single SCHEMALESS table. The record id
//! is the canonical key string, so the datastore itself enforces key
//! uniqueness. The key is also kept field-by-field under `location` for
//! pattern queries, and as a plain `url` string for batch lookups.
//!
//! # Engines
//!
//! - `SurrealDocumentStore::new(path, config)` - embedded RocksDB
//! - `SurrealDocumentStore::new_in_memory(config)` - in-memory engine
//!
//! # Examples
//!
//! ```rust,no_run
//! use coursestore_core::config::StoreConfig;
//! use coursestore_core::db::SurrealDocumentStore;
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store =
//!         SurrealDocumentStore::new(PathBuf::from("./data/content.db"), StoreConfig::default())
//!             .await?;
//!     Ok(())
//! }
//! ```

use crate::config::StoreConfig;
use crate::db::document_store::{sort_by_revision, DocumentStore, RecordUpdate};
use crate::db::DatabaseError;
use crate::models::{Definition, EditInfo, Location, LocationQuery, RawRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use surrealdb::engine::local::{Db, Mem, RocksDb};
use surrealdb::Surreal;

/// Key fields as stored, one column per segment
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocationFields {
    tag: String,
    org: Option<String>,
    course: Option<String>,
    category: Option<String>,
    name: Option<String>,
    revision: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SurrealDefinition {
    #[serde(default)]
    data: Value,
    #[serde(default)]
    children: Vec<String>,
}

/// Internal struct matching the stored document shape
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SurrealRecord {
    url: String,
    location: LocationFields,
    definition: SurrealDefinition,
    #[serde(default)]
    metadata: Map<String, Value>,
    edited_on: Option<String>,
}

impl From<&RawRecord> for SurrealRecord {
    fn from(record: &RawRecord) -> Self {
        let location = &record.location;
        SurrealRecord {
            url: location.to_string(),
            location: LocationFields {
                tag: location.tag().to_string(),
                org: location.org().map(str::to_string),
                course: location.course().map(str::to_string),
                category: location.category().map(str::to_string),
                name: location.name().map(str::to_string),
                revision: location.revision().map(str::to_string),
            },
            definition: SurrealDefinition {
                data: record.definition.data.clone(),
                children: record
                    .definition
                    .children
                    .iter()
                    .map(Location::to_string)
                    .collect(),
            },
            metadata: record.metadata.clone(),
            edited_on: record.edit_info.edited_on.map(|dt| dt.to_rfc3339()),
        }
    }
}

impl TryFrom<SurrealRecord> for RawRecord {
    type Error = DatabaseError;

    fn try_from(sr: SurrealRecord) -> Result<Self, Self::Error> {
        let location = parse_stored_key(&sr.url)?;
        let children = sr
            .definition
            .children
            .iter()
            .map(|child| parse_stored_key(child))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RawRecord {
            location,
            definition: Definition {
                data: sr.definition.data,
                children,
            },
            metadata: sr.metadata,
            edit_info: EditInfo {
                edited_on: sr
                    .edited_on
                    .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                    .map(|dt| dt.with_timezone(&Utc)),
            },
        })
    }
}

fn parse_stored_key(text: &str) -> Result<Location, DatabaseError> {
    Location::parse(text)
        .map_err(|e| DatabaseError::query_failed(format!("stored key is invalid: {}", e)))
}

/// SurrealDocumentStore implements DocumentStore over an embedded SurrealDB
pub struct SurrealDocumentStore {
    db: Arc<Surreal<Db>>,
    table: String,
}

impl SurrealDocumentStore {
    /// Open (or create) a RocksDB-backed store at `db_path`
    pub async fn new(db_path: PathBuf, config: StoreConfig) -> Result<Self, DatabaseError> {
        config
            .validate()
            .map_err(DatabaseError::initialization_failed)?;

        let db = Surreal::new::<RocksDb>(db_path.clone())
            .await
            .map_err(|e| DatabaseError::connection_failed(db_path, e))?;

        Self::initialize(db, config).await
    }

    /// Open a store backed by SurrealDB's in-memory engine
    pub async fn new_in_memory(config: StoreConfig) -> Result<Self, DatabaseError> {
        config
            .validate()
            .map_err(DatabaseError::initialization_failed)?;

        let db = Surreal::new::<Mem>(()).await?;
        Self::initialize(db, config).await
    }

    async fn initialize(db: Surreal<Db>, config: StoreConfig) -> Result<Self, DatabaseError> {
        db.use_ns(config.namespace.as_str())
            .use_db(config.database.as_str())
            .await?;

        let table = config.table;
        db.query(format!(
            "
            DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS {table}_url ON TABLE {table} FIELDS url UNIQUE;
            DEFINE INDEX IF NOT EXISTS {table}_location ON TABLE {table}
                FIELDS location.org, location.course, location.category, location.name;
            ",
            table = table
        ))
        .await
        .map_err(|e| DatabaseError::initialization_failed(e.to_string()))?
        .check()
        .map_err(|e| DatabaseError::initialization_failed(e.to_string()))?;

        tracing::debug!("SurrealDocumentStore ready (table '{}')", table);

        Ok(Self {
            db: Arc::new(db),
            table,
        })
    }

    async fn select(
        &self,
        condition: &str,
        binds: Vec<(String, Value)>,
    ) -> Result<Vec<RawRecord>, DatabaseError> {
        let sql = if condition.is_empty() {
            format!("SELECT * FROM {};", self.table)
        } else {
            format!("SELECT * FROM {} WHERE {};", self.table, condition)
        };

        let mut query = self.db.query(sql);
        for bind in binds {
            query = query.bind(bind);
        }

        let mut response = query.await?;
        let stored: Vec<SurrealRecord> = response.take(0)?;
        stored.into_iter().map(RawRecord::try_from).collect()
    }
}

#[async_trait]
impl DocumentStore for SurrealDocumentStore {
    async fn find(&self, query: &LocationQuery) -> Result<Vec<RawRecord>, DatabaseError> {
        let mut conditions = Vec::new();
        let mut binds = Vec::new();

        for (field, expected) in query.constraints() {
            match expected {
                Some(value) => {
                    conditions.push(format!("location.{field} = $loc_{field}"));
                    binds.push((format!("loc_{}", field), Value::String(value.to_string())));
                }
                None => conditions.push(format!(
                    "(location.{field} = NONE OR location.{field} = NULL)"
                )),
            }
        }

        let mut records = self.select(&conditions.join(" AND "), binds).await?;
        sort_by_revision(&mut records);
        Ok(records)
    }

    async fn find_by_locations(
        &self,
        locations: &[Location],
    ) -> Result<Vec<RawRecord>, DatabaseError> {
        if locations.is_empty() {
            return Ok(Vec::new());
        }
        let urls: Vec<Value> = locations
            .iter()
            .map(|l| Value::String(l.to_string()))
            .collect();
        self.select("url IN $urls", vec![("urls".to_string(), Value::Array(urls))])
            .await
    }

    async fn find_parents(&self, child: &Location) -> Result<Vec<Location>, DatabaseError> {
        let mut response = self
            .db
            .query(format!(
                "SELECT VALUE url FROM {} WHERE definition.children CONTAINS $url;",
                self.table
            ))
            .bind(("url", child.to_string()))
            .await?;

        let urls: Vec<String> = response.take(0)?;
        urls.iter().map(|url| parse_stored_key(url)).collect()
    }

    async fn insert(&self, mut record: RawRecord) -> Result<(), DatabaseError> {
        let url = record.location.to_string();
        let existing = self
            .select("url = $url", vec![("url".to_string(), Value::String(url.clone()))])
            .await?;
        if !existing.is_empty() {
            return Err(DatabaseError::duplicate_key(url));
        }

        if record.edit_info.edited_on.is_none() {
            record.edit_info.edited_on = Some(Utc::now());
        }

        let mut response = self
            .db
            .query("CREATE type::thing($table, $id) CONTENT $record;")
            .bind(("table", self.table.clone()))
            .bind(("id", url.clone()))
            .bind(("record", SurrealRecord::from(&record)))
            .await?;

        // A concurrent insert of the same key loses on the record id
        match response.take::<Vec<SurrealRecord>>(0) {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("already exists") => {
                Err(DatabaseError::duplicate_key(url))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn update(
        &self,
        location: &Location,
        update: RecordUpdate,
    ) -> Result<u64, DatabaseError> {
        let (field, value) = match update {
            RecordUpdate::Data(data) => ("definition.data", data),
            RecordUpdate::Children(children) => (
                "definition.children",
                Value::Array(
                    children
                        .iter()
                        .map(|c| Value::String(c.to_string()))
                        .collect(),
                ),
            ),
            RecordUpdate::Metadata(metadata) => ("metadata", Value::Object(metadata)),
        };

        let mut response = self
            .db
            .query(format!(
                "UPDATE {} SET {} = $value, edited_on = $edited_on WHERE url = $url RETURN AFTER;",
                self.table, field
            ))
            .bind(("value", value))
            .bind(("edited_on", Utc::now().to_rfc3339()))
            .bind(("url", location.to_string()))
            .await?;

        let updated: Vec<SurrealRecord> = response.take(0)?;
        Ok(updated.len() as u64)
    }

    async fn remove(&self, location: &Location) -> Result<u64, DatabaseError> {
        let mut response = self
            .db
            .query(format!(
                "DELETE {} WHERE url = $url RETURN BEFORE;",
                self.table
            ))
            .bind(("url", location.to_string()))
            .await?;

        let removed: Vec<SurrealRecord> = response.take(0)?;
        Ok(removed.len() as u64)
    }
}
