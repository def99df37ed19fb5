use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Form, Json,
};
use mongodb::bson::{Bson, Document};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::api::middleware::auth::{AuthUser, TOKEN_COOKIE};
use crate::api::AppState;
use crate::db::models::person;
use crate::error::{AppError, AppResult};
use crate::sanitizer::sanitize;
use crate::services::{AuthService, PersonService};

use super::build_response;

/// OAuth2 password-grant style form: `username` carries the cpf.
#[derive(Deserialize)]
pub struct LoginForm {
    username: String,
    password: String,
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoginForm>,
) -> AppResult<Json<Value>> {
    let keys = state.keys.clone();
    let pagination = state.max_pagination_size;

    let token = state
        .db
        .scoped(move |conn| async move {
            let service = AuthService::new(conn, keys, pagination).await?;
            let record = service
                .authenticate(&form.username, &form.password)
                .await?
                .ok_or(AppError::AuthFailed)?;
            let id = record.get("_id").cloned().unwrap_or(Bson::Null);
            service.issue_access_token(&id)
        })
        .await?;

    Ok(Json(json!({
        "access_token": token,
        "token_type": "Bearer",
    })))
}

/// Clears the token cookie and sends the browser back to the login page.
pub async fn logout() -> impl IntoResponse {
    let cleared = format!(
        "{}=\"\"; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; Path=/; SameSite=Lax",
        TOKEN_COOKIE
    );
    (
        StatusCode::FOUND,
        [(header::LOCATION, "/login".to_string()), (header::SET_COOKIE, cleared)],
    )
}

/// The authenticated person's record, without its password hash.
pub async fn me(
    State(state): State<Arc<AppState>>,
    AuthUser(claims): AuthUser,
) -> AppResult<Json<Value>> {
    let cost = state.bcrypt_cost;
    let pagination = state.max_pagination_size;
    let subject = claims.sub;

    let record: Document = state
        .db
        .scoped(move |conn| async move {
            let service = PersonService::new(conn, cost, pagination).await?;
            service
                .retrieve_by_subject(&subject)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("person {}", subject)))
        })
        .await?;

    let content = sanitize(&Bson::Document(record), &[], &[person::PASSWORD])?;
    Ok(build_response("Authenticated person", content))
}
