use std::sync::Arc;

use mongodb::bson::{Bson, Document};
use serde::{Serialize, Serializer};
use thiserror::Error;

use super::memory::{MemoryDatabase, MemoryError};
use super::{DbConnection, Session};

/// Page size used when none is configured. No query path pages yet.
pub const DEFAULT_PAGINATION_SIZE: u32 = 2;

/// The single error kind for store failures: connect, close, insert, update, find.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StoreError {
    message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

#[derive(Debug, Error)]
enum DriverError {
    #[error(transparent)]
    Mongo(#[from] mongodb::error::Error),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counts reported by a single-document update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted_id: Option<Bson>,
}

/// Result of `find`. `NoMatch` serializes as `{}`, the shape clients of the
/// legacy API already handle; use `into_records` for a plain sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum FindResult {
    NoMatch,
    Matches(Vec<Document>),
}

impl FindResult {
    fn from_records(records: Vec<Document>) -> Self {
        if records.is_empty() {
            FindResult::NoMatch
        } else {
            FindResult::Matches(records)
        }
    }

    pub fn into_records(self) -> Vec<Document> {
        match self {
            FindResult::NoMatch => Vec::new(),
            FindResult::Matches(records) => records,
        }
    }
}

impl Serialize for FindResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FindResult::NoMatch => Document::new().serialize(serializer),
            FindResult::Matches(records) => records.serialize(serializer),
        }
    }
}

#[derive(Clone)]
enum CollectionHandle {
    Mongo(mongodb::Collection<Document>),
    Memory(Arc<MemoryDatabase>),
}

/// Collection-scoped data access. Every driver failure comes back as a
/// `StoreError` naming the collection.
pub struct DocumentClient {
    connection: DbConnection,
    collection_name: String,
    handle: CollectionHandle,
    max_pagination_size: u32,
}

impl DocumentClient {
    /// Binds to `collection_name`, connecting first if `connection` is not yet connected.
    pub async fn new(
        mut connection: DbConnection,
        collection_name: &str,
        max_pagination_size: Option<u32>,
    ) -> Result<Self, StoreError> {
        if !connection.is_connected() {
            connection.connect().await?;
        }

        let handle = match connection.session() {
            Some(Session::Mongo { database, .. }) => {
                CollectionHandle::Mongo(database.collection::<Document>(collection_name))
            }
            Some(Session::Memory(db)) => CollectionHandle::Memory(db.clone()),
            None => {
                return Err(StoreError::new(format!(
                    "No open connection to database={}",
                    connection.database_name()
                )))
            }
        };

        Ok(Self {
            connection,
            collection_name: collection_name.to_string(),
            handle,
            max_pagination_size: max_pagination_size
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_PAGINATION_SIZE),
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn max_pagination_size(&self) -> u32 {
        self.max_pagination_size
    }

    pub fn connection(&self) -> &DbConnection {
        &self.connection
    }

    /// Inserts one record and returns its generated `_id`.
    pub async fn insert(&self, item: Document) -> Result<Bson, StoreError> {
        let result: Result<Bson, DriverError> = match &self.handle {
            CollectionHandle::Mongo(coll) => coll
                .insert_one(item)
                .await
                .map(|r| r.inserted_id)
                .map_err(Into::into),
            CollectionHandle::Memory(db) => {
                db.insert_one(&self.collection_name, item).map_err(Into::into)
            }
        };
        result.map_err(|e| self.wrap("inserting record in", e))
    }

    /// Updates exactly one document. Zero matches, zero modifications, or more
    /// than one modification are all errors.
    pub async fn update(&self, filter: Document, update: Document) -> Result<Option<Bson>, StoreError> {
        let outcome: Result<UpdateOutcome, DriverError> = match &self.handle {
            CollectionHandle::Mongo(coll) => coll
                .update_one(filter, update)
                .await
                .map(|r| UpdateOutcome {
                    matched: r.matched_count,
                    modified: r.modified_count,
                    upserted_id: r.upserted_id,
                })
                .map_err(Into::into),
            CollectionHandle::Memory(db) => db
                .update_one(&self.collection_name, &filter, &update)
                .map_err(Into::into),
        };

        outcome
            .and_then(|o| check_single_update(o).map_err(Into::into))
            .map_err(|e| self.wrap("updating record in", e))
    }

    /// First matching record, or `None`.
    pub async fn lookup(&self, filter: Document) -> Result<Option<Document>, StoreError> {
        let found: Result<Option<Document>, DriverError> = match &self.handle {
            CollectionHandle::Mongo(coll) => coll.find_one(filter).await.map_err(Into::into),
            CollectionHandle::Memory(db) => {
                db.find_one(&self.collection_name, &filter).map_err(Into::into)
            }
        };
        found.map_err(|e| self.wrap("finding records in", e))
    }

    /// First matching record, or an empty document when nothing matches.
    pub async fn find_one(&self, filter: Document) -> Result<Document, StoreError> {
        Ok(self.lookup(filter).await?.unwrap_or_default())
    }

    pub async fn find(&self, filter: Document) -> Result<FindResult, StoreError> {
        let records: Result<Vec<Document>, DriverError> = match &self.handle {
            CollectionHandle::Mongo(coll) => drain(coll.find(filter).await).await,
            CollectionHandle::Memory(db) => db.find(&self.collection_name, &filter).map_err(Into::into),
        };
        records
            .map(FindResult::from_records)
            .map_err(|e| self.wrap("finding records in", e))
    }

    /// Runs an aggregation pipeline and keeps only its first output document.
    pub async fn aggregate_groups(&self, pipeline: Vec<Document>) -> Result<Document, StoreError> {
        let records: Result<Vec<Document>, DriverError> = match &self.handle {
            CollectionHandle::Mongo(coll) => drain(coll.aggregate(pipeline).await).await,
            CollectionHandle::Memory(db) => {
                db.aggregate(&self.collection_name, &pipeline).map_err(Into::into)
            }
        };
        records
            .map(|r| r.into_iter().next().unwrap_or_default())
            .map_err(|e| self.wrap("finding records in", e))
    }

    fn wrap(&self, action: &str, cause: DriverError) -> StoreError {
        StoreError::new(format!(
            "Error {} collection {}: {}",
            action, self.collection_name, cause
        ))
    }
}

fn check_single_update(outcome: UpdateOutcome) -> Result<Option<Bson>, StoreError> {
    if outcome.matched == 0 {
        return Err(StoreError::new("No record found"));
    }
    if outcome.modified == 0 {
        return Err(StoreError::new("No record modified"));
    }
    if outcome.modified > 1 {
        return Err(StoreError::new("More than one record modified"));
    }
    Ok(outcome.upserted_id)
}

async fn drain(
    cursor: mongodb::error::Result<mongodb::Cursor<Document>>,
) -> Result<Vec<Document>, DriverError> {
    let mut cursor = cursor?;
    let mut records = Vec::new();
    while cursor.advance().await? {
        records.push(cursor.deserialize_current()?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbBackend;
    use mongodb::bson::doc;
    use serde_json::json;

    async fn client() -> DocumentClient {
        let backend = DbBackend::Memory(Arc::new(MemoryDatabase::new("unit")));
        DocumentClient::new(backend.open(), "person", None)
            .await
            .expect("client")
    }

    #[tokio::test]
    async fn test_new_connects_lazily_and_defaults_page_size() {
        let client = client().await;
        assert!(client.connection().is_connected());
        assert_eq!(client.max_pagination_size(), DEFAULT_PAGINATION_SIZE);
        assert_eq!(client.collection_name(), "person");
    }

    #[tokio::test]
    async fn test_insert_returns_generated_id() {
        let client = client().await;
        let id = client.insert(doc! { "cpf": "123" }).await.expect("insert");
        assert!(matches!(id, Bson::ObjectId(_)));

        let found = client.find_one(doc! { "_id": id.clone() }).await.expect("find");
        assert_eq!(found.get_str("cpf").ok(), Some("123"));
    }

    #[tokio::test]
    async fn test_insert_duplicate_id_is_store_error() {
        let client = client().await;
        client.insert(doc! { "_id": 1, "cpf": "1" }).await.expect("insert");
        let err = client.insert(doc! { "_id": 1, "cpf": "2" }).await.unwrap_err();
        assert!(err.message().starts_with("Error inserting record in collection person"), "{}", err);
    }

    #[tokio::test]
    async fn test_find_one_no_match_is_empty_document() {
        let client = client().await;
        let found = client.find_one(doc! { "cpf": "none" }).await.expect("find_one");
        assert!(found.is_empty());
        assert!(client.lookup(doc! { "cpf": "none" }).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn test_find_no_match_is_empty_mapping_sentinel() {
        let client = client().await;
        let found = client.find(doc! { "cpf": "none" }).await.expect("find");
        assert_eq!(found, FindResult::NoMatch);
        assert_eq!(serde_json::to_value(&found).unwrap(), json!({}));
        assert!(found.into_records().is_empty());
    }

    #[tokio::test]
    async fn test_find_returns_all_matches() {
        let client = client().await;
        client.insert(doc! { "cpf": "1", "city": "Recife" }).await.unwrap();
        client.insert(doc! { "cpf": "2", "city": "Recife" }).await.unwrap();
        client.insert(doc! { "cpf": "3", "city": "Natal" }).await.unwrap();

        let found = client.find(doc! { "city": "Recife" }).await.expect("find");
        let records = found.into_records();
        assert_eq!(records.len(), 2);
        assert!(serde_json::to_value(FindResult::Matches(records)).unwrap().is_array());
    }

    #[tokio::test]
    async fn test_update_no_match_fails() {
        let client = client().await;
        let err = client
            .update(doc! { "cpf": "none" }, doc! { "$set": { "name": "x" } })
            .await
            .unwrap_err();
        assert!(err.message().contains("No record found"), "{}", err);
        assert!(err.message().contains("collection person"), "{}", err);
    }

    #[tokio::test]
    async fn test_update_without_change_fails() {
        let client = client().await;
        client.insert(doc! { "cpf": "1", "name": "Ana" }).await.unwrap();
        let err = client
            .update(doc! { "cpf": "1" }, doc! { "$set": { "name": "Ana" } })
            .await
            .unwrap_err();
        assert!(err.message().contains("No record modified"), "{}", err);
    }

    #[tokio::test]
    async fn test_update_single_document() {
        let client = client().await;
        client.insert(doc! { "cpf": "1", "name": "Ana" }).await.unwrap();
        let upserted = client
            .update(doc! { "cpf": "1" }, doc! { "$set": { "name": "Bia" } })
            .await
            .expect("update");
        assert!(upserted.is_none());

        let found = client.find_one(doc! { "cpf": "1" }).await.unwrap();
        assert_eq!(found.get_str("name").ok(), Some("Bia"));
    }

    #[test]
    fn test_more_than_one_modified_is_rejected() {
        let err = check_single_update(UpdateOutcome { matched: 2, modified: 2, upserted_id: None })
            .unwrap_err();
        assert_eq!(err.message(), "More than one record modified");
    }

    #[tokio::test]
    async fn test_aggregate_groups_returns_first_or_empty() {
        let client = client().await;
        let empty = client
            .aggregate_groups(vec![doc! { "$match": { "cpf": "none" } }])
            .await
            .expect("aggregate");
        assert!(empty.is_empty());

        client.insert(doc! { "cpf": "1", "city": "Recife" }).await.unwrap();
        client.insert(doc! { "cpf": "2", "city": "Recife" }).await.unwrap();
        let counted = client
            .aggregate_groups(vec![doc! { "$match": { "city": "Recife" } }, doc! { "$count": "total" }])
            .await
            .expect("aggregate");
        assert_eq!(counted.get_i32("total").ok(), Some(2));
    }

    #[tokio::test]
    async fn test_unsupported_stage_is_wrapped() {
        let client = client().await;
        client.insert(doc! { "cpf": "1" }).await.unwrap();
        let err = client
            .aggregate_groups(vec![doc! { "$lookup": {} }])
            .await
            .unwrap_err();
        assert!(err.message().starts_with("Error finding records in collection person"), "{}", err);
    }
}
