use chrono::Duration;
use mongodb::bson::{Bson, Document};

use crate::auth::jwt::{self, TokenKeys, ACCESS_TOKEN_TTL_DAYS, ACCESS_TOKEN_TYPE};
use crate::auth::password;
use crate::db::client::DocumentClient;
use crate::db::models::person;
use crate::db::DbConnection;
use crate::error::{AppError, AppResult};

pub struct AuthService {
    client: DocumentClient,
    keys: TokenKeys,
}

impl AuthService {
    pub async fn new(
        connection: DbConnection,
        keys: TokenKeys,
        max_pagination_size: Option<u32>,
    ) -> AppResult<Self> {
        let client = DocumentClient::new(connection, person::COLLECTION, max_pagination_size).await?;
        Ok(Self { client, keys })
    }

    /// Stored record for `cpf` when `password` matches its hash, `None` otherwise.
    /// The record still carries the hash; sanitize it before it leaves the service.
    pub async fn authenticate(&self, cpf: &str, password: &str) -> AppResult<Option<Document>> {
        let Some(record) = self.client.lookup(person::by_cpf(cpf)).await? else {
            tracing::debug!("Login rejected: unknown cpf");
            return Ok(None);
        };

        let hash = record.get_str(person::PASSWORD).unwrap_or_default();
        if !password::verify(password, hash) {
            tracing::debug!("Login rejected: password mismatch");
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Signed access token for `subject`, valid for seven days.
    pub fn issue_access_token(&self, subject: &Bson) -> AppResult<String> {
        jwt::generate(
            ACCESS_TOKEN_TYPE,
            Duration::days(ACCESS_TOKEN_TTL_DAYS),
            &person::subject_of(subject),
            &self.keys,
        )
        .map_err(|e| AppError::Internal(format!("Token signing failed: {}", e)))
    }
}
