//! API 错误定义与响应转换。

use axum::{Json, http::StatusCode};
use serde::Serialize;

use super::response::ApiEnvelope;
use crate::auth::error::AuthError;

/// 所有凭证类失败对外共用的错误码。
pub(crate) const UNAUTHORIZED_CODE: &str = "UNAUTHORIZED";

/// 接口错误。
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) code: &'static str,
    pub(crate) message: String,
    pub(crate) suggestion: &'static str,
}

impl ApiError {
    /// 构造统一 API 错误。
    pub(crate) fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        suggestion: &'static str,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            suggestion,
        }
    }

    /// 未授权响应。内容固定，不区分具体原因。
    pub(crate) fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            UNAUTHORIZED_CODE,
            "未授权",
            "请重新登录",
        )
    }

    /// 转换为统一响应体。
    pub(crate) fn into_response<T: Serialize>(self) -> (StatusCode, Json<ApiEnvelope<T>>) {
        (
            self.status,
            Json(ApiEnvelope::failure(
                self.code,
                self.message,
                self.suggestion,
            )),
        )
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_unauthorized() {
            return Self::unauthorized();
        }
        match err {
            AuthError::InvalidFingerprintInputs(detail) => Self::new(
                StatusCode::BAD_REQUEST,
                "INVALID_CLIENT_CONTEXT",
                format!("客户端上下文无效: {detail}"),
                "请携带 X-Client-Type 请求头，取值 web 或 mobile",
            ),
            AuthError::InvalidRegistration(_) => Self::new(
                StatusCode::BAD_REQUEST,
                "INVALID_REGISTRATION",
                "用户名需为 3-64 位字母、数字或 _.-，密码至少 8 位",
                "请修改后重试",
            ),
            AuthError::IdentityExists => Self::new(
                StatusCode::CONFLICT,
                "IDENTITY_EXISTS",
                "用户名已被占用",
                "请更换用户名",
            ),
            _ => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "服务内部错误",
                "请稍后重试",
            ),
        }
    }
}
