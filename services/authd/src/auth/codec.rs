//! 凭证编解码：claims 的 HMAC 签名与校验（JWS compact：`header.payload.sig`）。

use std::fmt;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use fpa_shared_protocol::ClientType;
use hmac::{Hmac, Mac, digest::KeyInit};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    fingerprint::{FINGERPRINT_LEN, Fingerprint},
    store::unix_now,
};

/// 签名密钥：全局密钥或单身份密钥，不允许为空。
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct SigningKey(Vec<u8>);

impl SigningKey {
    pub(crate) fn new(secret: impl AsRef<[u8]>) -> Result<Self, AuthError> {
        let bytes = secret.as_ref();
        if bytes.is_empty() {
            return Err(AuthError::SigningFailure("signing key is empty".to_string()));
        }
        Ok(Self(bytes.to_vec()))
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// token 内的声明。创建后不可修改；刷新会生成新的 claims。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Claims {
    #[serde(rename = "sub")]
    subject: String,
    fingerprint: Fingerprint,
    #[serde(rename = "clientType")]
    client_type: ClientType,
    #[serde(rename = "iat")]
    issued_at: u64,
    #[serde(rename = "nbf")]
    not_before: u64,
    #[serde(rename = "exp")]
    expires_at: u64,
    #[serde(rename = "jti")]
    token_id: String,
}

impl Claims {
    /// 以 `now` 为签发与生效时间、`now + ttl_sec` 为过期时间构造 claims。
    pub(crate) fn issue(
        subject: &str,
        fingerprint: Fingerprint,
        client_type: ClientType,
        now: u64,
        ttl_sec: u64,
    ) -> Self {
        Self {
            subject: subject.to_string(),
            fingerprint,
            client_type,
            issued_at: now,
            not_before: now,
            expires_at: now.saturating_add(ttl_sec),
            token_id: Uuid::new_v4().simple().to_string(),
        }
    }

    pub(crate) fn subject(&self) -> &str {
        &self.subject
    }

    pub(crate) fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub(crate) fn client_type(&self) -> ClientType {
        self.client_type
    }

    pub(crate) fn issued_at(&self) -> u64 {
        self.issued_at
    }

    pub(crate) fn expires_at(&self) -> u64 {
        self.expires_at
    }

    /// `expires_at > issued_at >= not_before`。
    fn window_is_valid(&self) -> bool {
        self.expires_at > self.issued_at && self.issued_at >= self.not_before
    }
}

/// 未经签名校验的 claims，只暴露 subject，用于挑选单身份密钥。
///
/// 不能转换为 [`Claims`]，也不能作为任何授权判断的依据。
#[derive(Debug)]
pub(crate) struct UnverifiedClaims {
    subject: String,
}

impl UnverifiedClaims {
    pub(crate) fn subject(&self) -> &str {
        &self.subject
    }
}

/// 接受的 HMAC 算法族。签发固定使用 HS256。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HmacAlgorithm {
    Hs256,
    Hs384,
    Hs512,
}

impl HmacAlgorithm {
    fn from_header(alg: &str) -> Option<Self> {
        match alg {
            "HS256" => Some(Self::Hs256),
            "HS384" => Some(Self::Hs384),
            "HS512" => Some(Self::Hs512),
            _ => None,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Hs256 => "HS256",
            Self::Hs384 => "HS384",
            Self::Hs512 => "HS512",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    typ: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SubjectOnly {
    sub: String,
}

/// token 三段切分结果。
struct Segments<'a> {
    header: &'a str,
    payload: &'a str,
    signature: &'a str,
    signing_input: &'a str,
}

/// 签发 token。
pub(crate) fn encode(claims: &Claims, key: &SigningKey) -> Result<String, AuthError> {
    if !claims.window_is_valid() {
        return Err(AuthError::SigningFailure(
            "claims time window is invalid".to_string(),
        ));
    }
    let algorithm = HmacAlgorithm::Hs256;
    let header = serde_json::to_vec(&Header {
        alg: algorithm.name().to_string(),
        typ: Some("JWT".to_string()),
    })
    .map_err(|err| AuthError::SigningFailure(format!("encode token header failed: {err}")))?;
    let payload = serde_json::to_vec(claims)
        .map_err(|err| AuthError::SigningFailure(format!("encode token claims failed: {err}")))?;

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(header),
        URL_SAFE_NO_PAD.encode(payload)
    );
    let signature = sign(algorithm, key, signing_input.as_bytes())?;
    Ok(format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature)
    ))
}

/// 以当前时间校验并解码 token。
pub(crate) fn decode(token: &str, key: &SigningKey) -> Result<Claims, AuthError> {
    decode_at(token, key, unix_now())
}

/// 以指定时间校验并解码 token。
pub(crate) fn decode_at(token: &str, key: &SigningKey, now: u64) -> Result<Claims, AuthError> {
    decode_with_grace(token, key, now, 0)
}

/// 与 [`decode_at`] 相同，但允许过期不超过 `grace_sec` 的 token 通过。仅供刷新使用。
pub(crate) fn decode_with_grace(
    token: &str,
    key: &SigningKey,
    now: u64,
    grace_sec: u64,
) -> Result<Claims, AuthError> {
    let segments = split(token)?;
    let algorithm = read_algorithm(segments.header)?;
    let signature = URL_SAFE_NO_PAD
        .decode(segments.signature.as_bytes())
        .map_err(|_| AuthError::MalformedToken("signature is not base64url"))?;
    verify(algorithm, key, segments.signing_input.as_bytes(), &signature)?;

    let payload = URL_SAFE_NO_PAD
        .decode(segments.payload.as_bytes())
        .map_err(|_| AuthError::MalformedToken("payload is not base64url"))?;
    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|_| AuthError::MalformedToken("claims are not valid json"))?;
    if !claims.window_is_valid() {
        return Err(AuthError::MalformedToken("claims time window is invalid"));
    }
    if claims.fingerprint.as_str().len() != FINGERPRINT_LEN {
        return Err(AuthError::MalformedToken("fingerprint has unexpected length"));
    }

    if now < claims.not_before {
        return Err(AuthError::NotYetValid);
    }
    if now >= claims.expires_at.saturating_add(grace_sec) {
        return Err(AuthError::Expired);
    }
    Ok(claims)
}

/// 只解析结构与 subject，不校验签名与时间。
pub(crate) fn decode_unsafe(token: &str) -> Result<UnverifiedClaims, AuthError> {
    let segments = split(token)?;
    read_algorithm(segments.header)?;
    let payload = URL_SAFE_NO_PAD
        .decode(segments.payload.as_bytes())
        .map_err(|_| AuthError::MalformedToken("payload is not base64url"))?;
    let parsed: SubjectOnly = serde_json::from_slice(&payload)
        .map_err(|_| AuthError::MalformedToken("claims are not valid json"))?;
    if parsed.sub.trim().is_empty() {
        return Err(AuthError::MalformedToken("subject is empty"));
    }
    Ok(UnverifiedClaims {
        subject: parsed.sub,
    })
}

fn split(token: &str) -> Result<Segments<'_>, AuthError> {
    let token = token.trim();
    let mut parts = token.split('.');
    let header = parts.next().unwrap_or_default();
    let payload = parts.next().unwrap_or_default();
    let signature = parts.next().unwrap_or_default();
    if header.is_empty() || payload.is_empty() || signature.is_empty() || parts.next().is_some() {
        return Err(AuthError::MalformedToken("expected three segments"));
    }
    Ok(Segments {
        header,
        payload,
        signature,
        signing_input: &token[..header.len() + 1 + payload.len()],
    })
}

fn read_algorithm(header_b64: &str) -> Result<HmacAlgorithm, AuthError> {
    let raw = URL_SAFE_NO_PAD
        .decode(header_b64.as_bytes())
        .map_err(|_| AuthError::MalformedToken("header is not base64url"))?;
    let header: Header = serde_json::from_slice(&raw)
        .map_err(|_| AuthError::MalformedToken("header is not valid json"))?;
    HmacAlgorithm::from_header(&header.alg).ok_or(AuthError::UnsupportedAlgorithm(header.alg))
}

fn sign(algorithm: HmacAlgorithm, key: &SigningKey, input: &[u8]) -> Result<Vec<u8>, AuthError> {
    match algorithm {
        HmacAlgorithm::Hs256 => sign_with::<Hmac<Sha256>>(key, input),
        HmacAlgorithm::Hs384 => sign_with::<Hmac<Sha384>>(key, input),
        HmacAlgorithm::Hs512 => sign_with::<Hmac<Sha512>>(key, input),
    }
}

fn verify(
    algorithm: HmacAlgorithm,
    key: &SigningKey,
    input: &[u8],
    signature: &[u8],
) -> Result<(), AuthError> {
    match algorithm {
        HmacAlgorithm::Hs256 => verify_with::<Hmac<Sha256>>(key, input, signature),
        HmacAlgorithm::Hs384 => verify_with::<Hmac<Sha384>>(key, input, signature),
        HmacAlgorithm::Hs512 => verify_with::<Hmac<Sha512>>(key, input, signature),
    }
}

fn sign_with<M: Mac + KeyInit>(key: &SigningKey, input: &[u8]) -> Result<Vec<u8>, AuthError> {
    let mut mac = <M as Mac>::new_from_slice(key.as_bytes())
        .map_err(|_| AuthError::SigningFailure("signing key rejected by hmac".to_string()))?;
    mac.update(input);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn verify_with<M: Mac + KeyInit>(
    key: &SigningKey,
    input: &[u8],
    signature: &[u8],
) -> Result<(), AuthError> {
    let mut mac =
        <M as Mac>::new_from_slice(key.as_bytes()).map_err(|_| AuthError::SignatureInvalid)?;
    mac.update(input);
    mac.verify_slice(signature)
        .map_err(|_| AuthError::SignatureInvalid)
}

#[cfg(test)]
impl Claims {
    /// 测试用：直接指定时间窗。
    pub(crate) fn with_window(
        subject: &str,
        fingerprint: Fingerprint,
        client_type: ClientType,
        issued_at: u64,
        not_before: u64,
        expires_at: u64,
    ) -> Self {
        Self {
            subject: subject.to_string(),
            fingerprint,
            client_type,
            issued_at,
            not_before,
            expires_at,
            token_id: Uuid::new_v4().simple().to_string(),
        }
    }
}
