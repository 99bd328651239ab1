//! 请求指纹推导：把请求中可观测的属性折叠为稳定的不透明标识。
//!
//! 采用可复现模式：不生成服务端随机盐，同一组输入在任意请求上都会得到同一个指纹，
//! 因此校验时只需按当前请求重新推导即可，无需服务端状态。

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use constant_time_eq::constant_time_eq;
use fpa_shared_protocol::{ClientData, ClientType, MobileClientData, WebClientData};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::auth::error::AuthError;

/// 指纹格式版本，作为第一个哈希分段。
const FINGERPRINT_VERSION: &str = "fp_v1";
/// 分段分隔符。清洗会去掉所有控制字符，所以它不可能出现在分段内部。
const SEGMENT_DELIMITER: &[u8] = b"\x1f";
/// SHA-256 摘要经 base64url（无填充）编码后的长度。
pub(crate) const FINGERPRINT_LEN: usize = 43;

/// 请求指纹。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct Fingerprint(String);

impl Fingerprint {
    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    /// 全长比较，耗时与内容无关。
    pub(crate) fn matches(&self, other: &Fingerprint) -> bool {
        constant_time_eq(self.0.as_bytes(), other.0.as_bytes())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 指纹推导输入。构造时完成清洗与校验，构造成功即可推导。
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FingerprintInputs {
    client_type: ClientType,
    network_address: String,
    user_agent: String,
    session_salt: Option<String>,
    attributes: Option<ClientData>,
}

impl FingerprintInputs {
    /// 以基础属性构造输入；网络地址清洗后不能为空。
    pub(crate) fn new(
        client_type: ClientType,
        network_address: &str,
        user_agent: &str,
    ) -> Result<Self, AuthError> {
        let network_address = sanitize(network_address);
        if network_address.is_empty() {
            return Err(AuthError::InvalidFingerprintInputs(
                "network address is empty".to_string(),
            ));
        }
        Ok(Self {
            client_type,
            network_address,
            user_agent: sanitize(user_agent),
            session_salt: None,
            attributes: None,
        })
    }

    /// 从原始 clientType 字符串构造。
    pub(crate) fn parse(
        raw_client_type: &str,
        network_address: &str,
        user_agent: &str,
    ) -> Result<Self, AuthError> {
        let client_type = sanitize(raw_client_type)
            .parse::<ClientType>()
            .map_err(AuthError::InvalidFingerprintInputs)?;
        Self::new(client_type, network_address, user_agent)
    }

    /// 附加客户端属性；变体必须与 clientType 一致。
    pub(crate) fn with_attributes(mut self, data: ClientData) -> Result<Self, AuthError> {
        if data.client_type() != self.client_type {
            return Err(AuthError::InvalidFingerprintInputs(format!(
                "client data is for {} but client type is {}",
                data.client_type(),
                self.client_type
            )));
        }
        self.attributes = Some(sanitize_client_data(data));
        Ok(self)
    }

    /// 附加调用方自行保存的会话盐。HTTP 接口从不设置，仅 CLI 离线推导使用。
    pub(crate) fn with_session_salt(mut self, salt: &str) -> Self {
        let salt = sanitize(salt);
        self.session_salt = (!salt.is_empty()).then_some(salt);
        self
    }

    pub(crate) fn client_type(&self) -> ClientType {
        self.client_type
    }

    pub(crate) fn network_address(&self) -> &str {
        &self.network_address
    }
}

/// 推导指纹：确定性、无副作用。
pub(crate) fn derive(inputs: &FingerprintInputs) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_VERSION.as_bytes());
    for segment in [
        inputs.client_type.as_str(),
        inputs.network_address.as_str(),
        inputs.user_agent.as_str(),
    ] {
        hasher.update(SEGMENT_DELIMITER);
        hasher.update(segment.as_bytes());
    }

    if let Some(salt) = &inputs.session_salt {
        update_labeled(&mut hasher, "salt", salt);
    }

    match &inputs.attributes {
        Some(ClientData::Web(web)) => {
            update_labeled(&mut hasher, "sr", &web.screen_resolution);
            update_labeled(&mut hasher, "cd", &web.color_depth);
            update_labeled(&mut hasher, "tz", &web.time_zone);
            update_labeled(&mut hasher, "lang", &web.language);
        }
        Some(ClientData::Mobile(mobile)) => {
            update_labeled(&mut hasher, "model", &mobile.device_model);
            update_labeled(&mut hasher, "os", &mobile.os_version);
            update_labeled(&mut hasher, "density", &mobile.screen_density);
            update_labeled(
                &mut hasher,
                "emu",
                if mobile.is_emulator { "true" } else { "false" },
            );
        }
        None => {}
    }

    Fingerprint(URL_SAFE_NO_PAD.encode(hasher.finalize()))
}

/// 去掉首尾空白与所有非可打印 ASCII 字符。
pub(crate) fn sanitize(raw: &str) -> String {
    let kept = raw
        .chars()
        .filter(|ch| (' '..='~').contains(ch))
        .collect::<String>();
    kept.trim().to_string()
}

fn update_labeled(hasher: &mut Sha256, label: &str, value: &str) {
    hasher.update(SEGMENT_DELIMITER);
    hasher.update(label.as_bytes());
    hasher.update(b":");
    hasher.update(value.as_bytes());
}

fn sanitize_client_data(data: ClientData) -> ClientData {
    match data {
        ClientData::Web(web) => ClientData::Web(WebClientData {
            screen_resolution: sanitize(&web.screen_resolution),
            color_depth: sanitize(&web.color_depth),
            time_zone: sanitize(&web.time_zone),
            language: sanitize(&web.language),
        }),
        ClientData::Mobile(mobile) => ClientData::Mobile(MobileClientData {
            device_model: sanitize(&mobile.device_model),
            os_version: sanitize(&mobile.os_version),
            screen_density: sanitize(&mobile.screen_density),
            is_emulator: mobile.is_emulator,
        }),
    }
}
