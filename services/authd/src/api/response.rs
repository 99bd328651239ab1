//! API 响应包裹。

use axum::{Json, http::StatusCode};
use serde::Serialize;

/// 通用 API 成功/失败包裹结构。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiEnvelope<T>
where
    T: Serialize,
{
    pub(crate) ok: bool,
    pub(crate) code: String,
    pub(crate) message: String,
    pub(crate) suggestion: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) data: Option<T>,
}

impl<T: Serialize> ApiEnvelope<T> {
    /// 失败包裹，不携带数据。
    pub(crate) fn failure(code: &str, message: String, suggestion: &str) -> Self {
        Self {
            ok: false,
            code: code.to_string(),
            message,
            suggestion: suggestion.to_string(),
            data: None,
        }
    }
}

/// 构造成功响应。
pub(crate) fn ok_response<T: Serialize>(
    status: StatusCode,
    message: impl Into<String>,
    suggestion: impl Into<String>,
    data: Option<T>,
) -> (StatusCode, Json<ApiEnvelope<T>>) {
    (
        status,
        Json(ApiEnvelope {
            ok: true,
            code: "OK".to_string(),
            message: message.into(),
            suggestion: suggestion.into(),
            data,
        }),
    )
}
