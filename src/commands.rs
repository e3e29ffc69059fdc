//! HTTP endpoints over the tag session.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tracing::{error, warn};

use crate::error::{ErrorKind, TagError};
use crate::record::{NewRecord, Record};
use crate::session::{Session, SessionState};

pub type AppState = Arc<Session>;

#[derive(Debug, Deserialize)]
pub struct WriteHexRequest {
    pub hex_string: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ReadHexResponse {
    pub uid: String,
    pub hex_data: String,
    pub total_bytes: usize,
    pub successful_blocks: usize,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct WriteHexResponse {
    pub uid: String,
    pub hex_string: String,
    pub total_bytes: usize,
    pub total_blocks: usize,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct CreateItemResponse {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub uid: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ItemResponse {
    pub id: String,
    pub name: String,
    pub price: f64,
    pub uid: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct ListItemsResponse {
    pub items: Vec<Record>,
    pub total_count: usize,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: SessionState,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// A [`TagError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub TagError);

impl From<TagError> for ApiError {
    fn from(err: TagError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Timeout => StatusCode::REQUEST_TIMEOUT,
            ErrorKind::BadInput => StatusCode::BAD_REQUEST,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorResponse {
        let details = match &self.0 {
            TagError::WriteFailure { .. } => Some(
                "The tag now holds a partial payload. Write it again before reading it back."
                    .to_owned(),
            ),
            TagError::AllZero => Some("The tag is blank from block 4 on.".to_owned()),
            _ => None,
        };
        ErrorResponse {
            error: self.0.to_string(),
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, "request failed: {}", self.0);
        } else {
            warn!(%status, "request rejected: {}", self.0);
        }
        (status, Json(self.body())).into_response()
    }
}

pub fn router(session: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/read-pk", get(read_pk))
        .route("/write-pk", post(write_pk))
        .route("/create-item", post(create_item))
        .route("/read-items", get(read_items))
        .route("/items", get(list_items))
        .route("/status", get(status))
        .layer(CorsLayer::permissive())
        .with_state(session)
}

pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "NFC Hex Reader/Writer API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "read": "/read-pk",
            "write": "/write-pk",
            "create_item": "/create-item",
            "read_item": "/read-items",
            "list_items": "/items",
            "status": "/status",
        }
    }))
}

pub async fn read_pk(State(session): State<AppState>) -> Result<Json<ReadHexResponse>, ApiError> {
    let read = session.read_raw().await?;
    Ok(Json(ReadHexResponse {
        uid: read.uid.to_hex(),
        hex_data: hex::encode(&read.payload),
        total_bytes: read.payload.len(),
        successful_blocks: read.blocks_read,
        message: "Hex data successfully read from NFC tag".to_owned(),
    }))
}

pub async fn write_pk(
    State(session): State<AppState>,
    Json(request): Json<WriteHexRequest>,
) -> Result<Json<WriteHexResponse>, ApiError> {
    let written = session.write_raw(&request.hex_string).await?;
    Ok(Json(WriteHexResponse {
        uid: written.uid.to_hex(),
        hex_string: request.hex_string.trim().to_owned(),
        total_bytes: written.bytes_written,
        total_blocks: written.blocks_written,
        message: "Hex string successfully written to NFC tag".to_owned(),
    }))
}

pub async fn create_item(
    State(session): State<AppState>,
    Json(request): Json<NewRecord>,
) -> Result<Json<CreateItemResponse>, ApiError> {
    let written = session.write_record(request).await?;
    let Record { id, name, price } = written.record;
    Ok(Json(CreateItemResponse {
        message: format!("Item successfully created with ID '{id}' and written to NFC tag"),
        id,
        name,
        price,
        uid: written.uid.to_hex(),
    }))
}

pub async fn read_items(State(session): State<AppState>) -> Result<Json<ItemResponse>, ApiError> {
    let read = session.read_record().await?;
    let Record { id, name, price } = read.record;
    Ok(Json(ItemResponse {
        id,
        name,
        price,
        uid: read.uid.to_hex(),
    }))
}

pub async fn list_items(State(session): State<AppState>) -> Json<ListItemsResponse> {
    let items = session.records();
    Json(ListItemsResponse {
        total_count: items.len(),
        message: format!("{} item(s) written since startup", items.len()),
        items,
    })
}

pub async fn status(State(session): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        state: session.state(),
    })
}
