use std::sync::Arc;

use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::{
    catalog::WireCollection,
    error::AppError,
    session,
    state::AppState,
};

pub const SESSION_COOKIE: &str = "__Host-sesion_";
const SESSION_MAX_AGE_SECS: u32 = 2_592_000;

#[derive(Deserialize)]
pub struct DataQuery {
    items: Option<String>,
}

/// `GET /api/data` — Basic-auth gated inventory payload, optionally
/// filtered to the ids named in the `items` query parameter.
pub async fn data_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DataQuery>,
    headers: HeaderMap,
) -> Result<Json<Vec<WireCollection>>, AppError> {
    check_password(&headers, &state.config.data_password)?;

    let target_ids = match query.items.as_deref() {
        None | Some("") => Vec::new(),
        Some(raw) => parse_target_ids(raw)?,
    };

    Ok(Json(state.catalog.to_wire(&target_ids)))
}

/// `GET /api/session` — verify-only authentication by session cookie.
/// A known, verified cookie gets a 200 and a rotated replacement;
/// anything else is a 401 with no rotation.
pub async fn session_verify_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let Some(cookie) = request_cookie(&headers) else {
        warn!("session cookie missing");
        return Err(AppError::Unauthorized);
    };

    let Some(record) = session::verify(state.records.as_ref(), &cookie).await? else {
        warn!("session cookie not found");
        return Err(AppError::Unauthorized);
    };
    if !record.verified {
        warn!("session cookie found but not verified");
        return Err(AppError::Unauthorized);
    }

    // no create-on-miss here: a record that vanished since the verify
    // read stays unknown, and authorization re-checks the verified flag
    // read inside the rotation's own transaction
    let Some(rotated) = session::rotate(state.records.as_ref(), &cookie).await? else {
        warn!("session record disappeared before rotation");
        return Err(AppError::Unauthorized);
    };
    if !rotated.verified() {
        return Err(AppError::Unauthorized);
    }

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, set_cookie(&rotated.cookie))],
        Json(json!({ "status": "ok" })),
    )
        .into_response())
}

/// `POST /api/session` — the issue path run on every page load: whatever
/// old cookie arrives is reconciled and a fresh cookie always goes back.
pub async fn session_issue_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let old = request_cookie(&headers);
    let result = session::reconcile(state.records.as_ref(), old.as_deref()).await?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, set_cookie(&result.cookie))],
        Json(json!({
            "outcome": result.outcome.as_str(),
            "verified": result.verified(),
        })),
    )
        .into_response())
}

fn check_password(headers: &HeaderMap, expected: &str) -> Result<(), AppError> {
    let Some(raw) = headers.get(header::AUTHORIZATION) else {
        warn!("missing Authorization header");
        return Err(AppError::Unauthorized);
    };
    let Ok(raw) = raw.to_str() else {
        warn!("Authorization header is not valid text");
        return Err(AppError::Unauthorized);
    };
    let Some(encoded) = raw.strip_prefix("Basic ") else {
        warn!("wrong Authorization pattern");
        return Err(AppError::Unauthorized);
    };

    let password = STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok());

    match password {
        Some(password) if password == expected => Ok(()),
        Some(_) => {
            warn!("password does not match");
            Err(AppError::Unauthorized)
        }
        None => {
            warn!("Authorization credential is not base64 text");
            Err(AppError::Unauthorized)
        }
    }
}

fn parse_target_ids(raw: &str) -> Result<Vec<String>, AppError> {
    #[derive(Deserialize)]
    struct IdOnly {
        #[serde(deserialize_with = "crate::delivery::string_or_number")]
        id: String,
    }

    let entries: Vec<IdOnly> =
        serde_json::from_str(raw).map_err(|_| AppError::MalformedPayload)?;
    Ok(entries.into_iter().map(|e| e.id).collect())
}

fn request_cookie(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::COOKIE)?.to_str().ok()?;
    let prefix = format!("{SESSION_COOKIE}=");
    raw.split(';')
        .map(str::trim)
        .find_map(|pair| pair.strip_prefix(prefix.as_str()))
        .map(str::to_string)
}

fn set_cookie(value: &str) -> String {
    format!("{SESSION_COOKIE}={value}; Max-Age={SESSION_MAX_AGE_SECS}; HttpOnly; Secure; Path=/")
}
