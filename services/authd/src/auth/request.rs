//! 从 HTTP 请求中提取指纹输入与 token。

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use axum::http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE, USER_AGENT},
};
use fpa_shared_protocol::{
    ClientData, HEADER_CLIENT_DATA, HEADER_CLIENT_TYPE, HEADER_FORWARDED_FOR, TOKEN_COOKIE,
};

use crate::auth::{error::AuthError, fingerprint::FingerprintInputs};

/// 客户端网络地址：取 `X-Forwarded-For` 最后一个合法条目，否则取对端地址。
pub(crate) fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> IpAddr {
    let forwarded = headers
        .get_all(HEADER_FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|entry| entry.trim().parse::<IpAddr>().ok())
        .last();
    normalize_ip(forwarded.unwrap_or_else(|| peer.ip()))
}

/// 回环 IPv6 统一为 `127.0.0.1`，IPv4 映射地址还原为 IPv4。
fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip.to_canonical() {
        IpAddr::V6(v6) if v6.is_loopback() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        other => other,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// 按请求头构造指纹输入；`X-Client-Type` 必填，`X-Client-Data` 可选。
pub(crate) fn fingerprint_inputs(
    headers: &HeaderMap,
    peer: SocketAddr,
) -> Result<FingerprintInputs, AuthError> {
    let raw_client_type = header_str(headers, HEADER_CLIENT_TYPE).ok_or_else(|| {
        AuthError::InvalidFingerprintInputs("missing X-Client-Type header".to_string())
    })?;
    let user_agent = header_str(headers, USER_AGENT.as_str()).unwrap_or_default();
    let ip = client_ip(headers, peer).to_string();
    let inputs = FingerprintInputs::parse(raw_client_type, &ip, user_agent)?;

    match header_str(headers, HEADER_CLIENT_DATA).map(str::trim) {
        Some(raw) if !raw.is_empty() => {
            let data = ClientData::from_header_value(raw)
                .map_err(AuthError::InvalidFingerprintInputs)?;
            inputs.with_attributes(data)
        }
        _ => Ok(inputs),
    }
}

/// 读取 token：优先 `Authorization: Bearer`，其次 `token` cookie。
pub(crate) fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(raw) = header_str(headers, AUTHORIZATION.as_str()) {
        let raw = raw.trim();
        if let Some((scheme, token)) = raw.split_once(' ')
            && scheme.eq_ignore_ascii_case("bearer")
            && !token.trim().is_empty()
        {
            return Some(token.trim().to_string());
        }
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == TOKEN_COOKIE && !value.trim().is_empty())
        .map(|(_, value)| value.trim().to_string())
}
