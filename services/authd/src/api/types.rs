//! API 请求/响应类型。

use fpa_shared_protocol::{ClientData, ClientType};
use serde::{Deserialize, Serialize};

use crate::auth::cache::FingerprintSnapshot;

/// 注册请求。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterRequest {
    pub(crate) username: String,
    pub(crate) password: String,
    #[serde(default)]
    pub(crate) description: String,
}

/// 注册返回数据。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterData {
    pub(crate) username: String,
    pub(crate) created_at: u64,
}

/// 登录请求。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginRequest {
    pub(crate) username: String,
    pub(crate) password: String,
    /// 可选设备属性；与 `X-Client-Data` 同时存在时以请求体为准。
    ///
    /// 属性会绑定进 token 指纹，而校验与刷新只读 `X-Client-Data`：
    /// 之后的请求必须在该请求头中带上完全相同的属性，否则指纹不匹配。
    #[serde(default)]
    pub(crate) client_data: Option<ClientData>,
}

/// 登录与刷新返回的 token 信息。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TokenData {
    pub(crate) token: String,
    pub(crate) token_type: &'static str,
    /// 剩余有效期（秒）。
    pub(crate) expires_in: u64,
    pub(crate) expires_at: u64,
}

/// 校验返回数据。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VerifyData {
    pub(crate) subject: String,
    pub(crate) client_type: ClientType,
    pub(crate) issued_at: u64,
    pub(crate) expires_at: u64,
}

/// 调试接口：最近指纹统计。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FingerprintDebugData {
    #[serde(flatten)]
    pub(crate) snapshot: FingerprintSnapshot,
    pub(crate) identities: usize,
    pub(crate) generated_at: String,
}
