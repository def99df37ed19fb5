//! Request-level operations over the person collection.
//!
//! Services are built per request around a connection handed out by
//! `DbBackend::scoped`, and never outlive it.

use mongodb::bson::Document;

use crate::error::{AppError, AppResult};

pub mod auth;
pub mod person;

pub use auth::AuthService;
pub use person::PersonService;

/// Fails with the missing keys listed the way the legacy API reported them,
/// e.g. `Missing field(s): ['cpf', 'password']`.
pub fn validate_fields(body: &Document, mandatory: &[&str]) -> AppResult<()> {
    let missing: Vec<String> = mandatory
        .iter()
        .filter(|field| !body.contains_key(**field))
        .map(|field| format!("'{}'", field))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(format!("Missing field(s): [{}]", missing.join(", "))))
    }
}
