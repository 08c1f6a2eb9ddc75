use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Failure classes surfaced to API callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Unauthorized,
    NotFound,
    Internal,
}

impl ErrorKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Internal => "InternalError",
        }
    }
}

/// Uniform `{status, data}` result of every monitoring operation.
///
/// Errors carry `{code, name, message}` as their data.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Envelope {
    pub status: Status,
    pub data: serde_json::Value,
    #[serde(skip)]
    code: StatusCode,
}

impl Envelope {
    pub fn success(data: impl serde::Serialize) -> Self {
        match serde_json::to_value(data) {
            Ok(data) => Self {
                status: Status::Success,
                data,
                code: StatusCode::OK,
            },
            Err(err) => {
                log::error!("failed to serialize response: {}", err);
                Self::error(ErrorKind::Internal, "failed to serialize response")
            }
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::success(serde_json::Value::String(message.into()))
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        let code = kind.status_code();
        let message: String = message.into();
        Self {
            status: Status::Error,
            data: serde_json::json!({
                "code": code.as_u16(),
                "name": kind.name(),
                "message": message,
            }),
            code,
        }
    }

    pub fn unauthorized() -> Self {
        Self::error(ErrorKind::Unauthorized, "Unauthorized. Access denied.")
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn status_code(&self) -> StatusCode {
        self.code
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}
