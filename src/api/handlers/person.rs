use axum::{
    extract::{Path, State},
    Json,
};
use mongodb::bson::{Bson, Document};
use serde_json::Value;
use std::sync::Arc;

use crate::api::AppState;
use crate::db::models::person;
use crate::error::AppResult;
use crate::sanitizer::sanitize;
use crate::services::PersonService;

use super::build_response;

pub async fn person_info(
    State(state): State<Arc<AppState>>,
    Path(cpf): Path<String>,
) -> AppResult<Json<Value>> {
    let cost = state.bcrypt_cost;
    let pagination = state.max_pagination_size;

    let record = state
        .db
        .scoped(move |conn| async move {
            let service = PersonService::new(conn, cost, pagination).await?;
            service.retrieve_person(&cpf).await
        })
        .await?;

    let content = sanitize(&Bson::Document(record), &[], &[person::PASSWORD])?;
    Ok(build_response("Person found successfully", content))
}

pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Document>,
) -> AppResult<Json<Value>> {
    let cost = state.bcrypt_cost;
    let pagination = state.max_pagination_size;

    state
        .db
        .scoped(move |conn| async move {
            let service = PersonService::new(conn, cost, pagination).await?;
            service.insert_person(body).await
        })
        .await?;

    Ok(build_response("Sign-up completed successfully", None))
}
