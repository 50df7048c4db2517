use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use reweave_infra::checkout::CheckoutError;
use reweave_infra::command_dispatcher::DispatchError;

pub fn checkout_error_to_response(err: CheckoutError) -> axum::response::Response {
    match err {
        CheckoutError::Dispatch(e) => dispatch_error_to_response(e),
        CheckoutError::Projection(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
        CheckoutError::Payment(e) => json_error(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

pub fn dispatch_error_to_response(err: DispatchError) -> axum::response::Response {
    match err {
        DispatchError::Validation(msg)
        | DispatchError::InsufficientInventory(msg)
        | DispatchError::InvalidState(msg)
        | DispatchError::InvariantViolation(msg) => json_error(StatusCode::BAD_REQUEST, msg),
        DispatchError::AlreadyPaid => {
            json_error(StatusCode::BAD_REQUEST, "order already paid")
        }
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "not found"),
        DispatchError::Unauthorized => json_error(StatusCode::UNAUTHORIZED, "unauthorized"),
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, msg),
        DispatchError::Deserialize(msg) | DispatchError::Publish(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, msg)
        }
        DispatchError::Store(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Status only, for endpoints with their own response envelope.
pub fn checkout_error_status(err: &CheckoutError) -> StatusCode {
    match err {
        CheckoutError::Dispatch(e) => match e {
            DispatchError::Validation(_)
            | DispatchError::InsufficientInventory(_)
            | DispatchError::InvalidState(_)
            | DispatchError::InvariantViolation(_)
            | DispatchError::AlreadyPaid => StatusCode::BAD_REQUEST,
            DispatchError::NotFound => StatusCode::NOT_FOUND,
            DispatchError::Unauthorized => StatusCode::UNAUTHORIZED,
            DispatchError::Concurrency(_) => StatusCode::CONFLICT,
            DispatchError::Deserialize(_) | DispatchError::Publish(_) | DispatchError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        CheckoutError::Projection(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CheckoutError::Payment(_) => StatusCode::BAD_REQUEST,
    }
}

pub fn json_error(status: StatusCode, message: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": message.into(),
        })),
    )
        .into_response()
}
