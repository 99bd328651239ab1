//! 登录口令的 Argon2 哈希与校验。

use std::sync::LazyLock;

use argon2::{
    Argon2, PasswordHasher, PasswordVerifier,
    password_hash::{PasswordHash, SaltString},
};

use crate::auth::error::AuthError;

/// 用户不存在时参与校验的占位哈希，参数与真实哈希一致。
static DUMMY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("fpa-dummy-password").unwrap_or_default());

/// 提前计算占位哈希，避免首个未知用户的登录多付一次哈希成本。
pub(crate) fn warm_up() {
    LazyLock::force(&DUMMY_HASH);
}

/// 生成 PHC 格式的 Argon2 口令哈希。
pub(crate) fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes)
        .map_err(|err| AuthError::Storage(format!("generate password salt failed: {err}")))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|err| AuthError::Storage(format!("encode password salt failed: {err}")))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|phc| phc.to_string())
        .map_err(|err| AuthError::Storage(format!("hash password failed: {err}")))
}

/// 校验口令；哈希无法解析时视为不匹配。
pub(crate) fn verify_password(hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// 在阻塞线程池上哈希，不占用异步 worker。
pub(crate) async fn hash_in_background(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|err| AuthError::Storage(format!("join password hash task failed: {err}")))?
}

/// 在阻塞线程池上校验。
///
/// `hash` 为 `None`（用户不存在）时仍对占位哈希做一次完整校验，结果恒为不匹配，
/// 使两种失败的耗时一致。
pub(crate) async fn verify_in_background(
    hash: Option<String>,
    password: String,
) -> Result<bool, AuthError> {
    tokio::task::spawn_blocking(move || match hash {
        Some(hash) => verify_password(&hash, &password),
        None => {
            let _ = verify_password(&DUMMY_HASH, &password);
            false
        }
    })
    .await
    .map_err(|err| AuthError::Storage(format!("join password verify task failed: {err}")))
}
