use axum::{body::Bytes, extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};
use tracing::error;
use crate::error::{AppError, Result};
use crate::services::webhook::SIGNATURE_HEADER;
use super::AppState;

/// Provider endpoint. Anything that is not a signature failure or a
/// retryable fault is acknowledged with 200 so the provider stops resending.
pub async fn payment_webhook(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    match s.services.webhooks.handle_payment_event(&body, signature).await {
        Ok(outcome) => Ok(Json(json!(outcome))),
        Err(AppError::UnknownOrder(order_number)) => {
            error!(order_number = %order_number, "payment received for unknown order, acknowledging");
            Ok(Json(json!({ "outcome": "unknown_order", "order_number": order_number })))
        }
        Err(e) => Err(e),
    }
}
