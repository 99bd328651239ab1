// 文件职责：
// 1) 定义 authd 与各端共用的协议数据结构（clientType、clientData）。
// 2) 约定请求头、cookie 名称与时间戳格式，保证跨端一致。
// 3) 作为 Rust 侧协议唯一代码源，供服务与工具复用。

use std::{fmt, str::FromStr};

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// 客户端类型请求头。
pub const HEADER_CLIENT_TYPE: &str = "x-client-type";
/// 客户端附加属性请求头（JSON 编码的 [`ClientData`]）。
pub const HEADER_CLIENT_DATA: &str = "x-client-data";
/// 反向代理转发地址请求头。
pub const HEADER_FORWARDED_FOR: &str = "x-forwarded-for";
/// web 端承载 token 的 cookie 名称。
pub const TOKEN_COOKIE: &str = "token";

/// 客户端类型。大小写敏感，仅接受 `web` / `mobile`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Web,
    Mobile,
}

impl ClientType {
    /// 协议字符串。
    pub fn as_str(self) -> &'static str {
        match self {
            ClientType::Web => "web",
            ClientType::Mobile => "mobile",
        }
    }
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "web" => Ok(ClientType::Web),
            "mobile" => Ok(ClientType::Mobile),
            other => Err(format!("unknown client type: {other:?}")),
        }
    }
}

/// 客户端上报的设备属性，按 clientType 区分的封闭变体。
///
/// 未知字段会被忽略，只有这里列出的字段会参与指纹计算。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "clientType", rename_all = "lowercase")]
pub enum ClientData {
    Web(WebClientData),
    Mobile(MobileClientData),
}

impl ClientData {
    /// 变体对应的客户端类型。
    pub fn client_type(&self) -> ClientType {
        match self {
            ClientData::Web(_) => ClientType::Web,
            ClientData::Mobile(_) => ClientType::Mobile,
        }
    }

    /// 解析 `X-Client-Data` 请求头。
    pub fn from_header_value(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw.trim()).map_err(|err| format!("decode client data failed: {err}"))
    }
}

/// web 端属性。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebClientData {
    // 屏幕分辨率，如 `1920x1080`。
    pub screen_resolution: String,
    // 色深。
    pub color_depth: String,
    // 时区。
    pub time_zone: String,
    // 语言。
    pub language: String,
}

/// mobile 端属性。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MobileClientData {
    // 设备型号。
    pub device_model: String,
    // 系统版本。
    pub os_version: String,
    // 屏幕密度。
    pub screen_density: String,
    // 是否模拟器。
    pub is_emulator: bool,
}

/// 生成纳秒精度 UTC 时间戳（RFC3339）。
pub fn now_rfc3339_nanos() -> String {
    Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true)
}
