use mongodb::bson::{Bson, DateTime, Document};

use crate::auth::password;
use crate::db::client::DocumentClient;
use crate::db::models::person;
use crate::db::DbConnection;
use crate::error::{AppError, AppResult};

use super::validate_fields;

pub struct PersonService {
    client: DocumentClient,
    bcrypt_cost: u32,
}

impl PersonService {
    pub async fn new(
        connection: DbConnection,
        bcrypt_cost: u32,
        max_pagination_size: Option<u32>,
    ) -> AppResult<Self> {
        let client = DocumentClient::new(connection, person::COLLECTION, max_pagination_size).await?;
        Ok(Self { client, bcrypt_cost })
    }

    /// Hashes the plaintext password in place, stamps both timestamps with the
    /// same instant, and stores the record. Returns the generated `_id`.
    pub async fn insert_person(&self, mut record: Document) -> AppResult<Bson> {
        validate_fields(&record, person::MANDATORY_FIELDS)?;

        let plain = record
            .get_str(person::PASSWORD)
            .map_err(|_| AppError::Validation("Field 'password' must be a string".to_string()))?;
        let hash = password::hash(plain, self.bcrypt_cost)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        let now = DateTime::now();
        record.insert(person::PASSWORD, hash);
        record.insert(person::CREATED_AT, now);
        record.insert(person::UPDATED_AT, now);

        let id = self.client.insert(record).await?;
        tracing::info!("Registered person id={}", person::subject_of(&id));
        Ok(id)
    }

    /// Record with the given cpf, or an empty document.
    pub async fn retrieve_person(&self, cpf: &str) -> AppResult<Document> {
        Ok(self.client.find_one(person::by_cpf(cpf)).await?)
    }

    /// Record behind a token subject, if it still exists.
    pub async fn retrieve_by_subject(&self, subject: &str) -> AppResult<Option<Document>> {
        Ok(self.client.lookup(person::by_subject(subject)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryDatabase;
    use crate::db::DbBackend;
    use mongodb::bson::doc;
    use std::sync::Arc;

    async fn service() -> (PersonService, Arc<MemoryDatabase>) {
        let db = Arc::new(MemoryDatabase::new("unit"));
        let service = PersonService::new(DbBackend::Memory(db.clone()).open(), 4, None)
            .await
            .unwrap();
        (service, db)
    }

    #[tokio::test]
    async fn test_insert_hashes_password_and_stamps_times() {
        let (service, _) = service().await;
        service.insert_person(doc! { "cpf": "123", "password": "pw" }).await.unwrap();

        let stored = service.retrieve_person("123").await.unwrap();
        let hash = stored.get_str("password").unwrap();
        assert_ne!(hash, "pw");
        assert!(password::verify("pw", hash));
        let created = stored.get_datetime("created_at").unwrap();
        let updated = stored.get_datetime("updated_at").unwrap();
        assert_eq!(created, updated);
    }

    #[tokio::test]
    async fn test_insert_requires_mandatory_fields() {
        let (service, db) = service().await;
        let err = service.insert_person(doc! { "name": "Ana" }).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.to_string(), "Missing field(s): ['cpf', 'password']");
        assert_eq!(db.count(person::COLLECTION), 0);
    }

    #[tokio::test]
    async fn test_insert_rejects_non_string_password() {
        let (service, _) = service().await;
        let err = service.insert_person(doc! { "cpf": "1", "password": 42 }).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_retrieve_missing_is_empty_document() {
        let (service, _) = service().await;
        assert!(service.retrieve_person("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_by_subject() {
        let (service, _) = service().await;
        let id = service.insert_person(doc! { "cpf": "7", "password": "pw" }).await.unwrap();
        let found = service
            .retrieve_by_subject(&person::subject_of(&id))
            .await
            .unwrap()
            .expect("found by subject");
        assert_eq!(found.get_str("cpf").unwrap(), "7");
        assert!(service.retrieve_by_subject("000000000000000000000000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_as_store_error() {
        let (service, db) = service().await;
        db.set_available(false);
        let err = service.insert_person(doc! { "cpf": "1", "password": "pw" }).await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
        assert!(err.to_string().contains("collection person"), "{}", err);
    }
}
