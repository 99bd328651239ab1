//! authd 共享状态：会话签发中心、身份存储与诊断缓存。

use std::sync::Arc;

use crate::{
    auth::{
        authority::SessionAuthority, cache::RecentFingerprints, store::FileIdentityStore,
    },
    config::AuthConfig,
};

/// 请求间共享的状态，克隆只复制引用。
#[derive(Clone)]
pub(crate) struct AppState {
    /// 签发中心，持有身份存储。
    pub(crate) authority: Arc<SessionAuthority<FileIdentityStore>>,
    /// 最近签发的指纹（仅诊断）。
    pub(crate) recent: Arc<RecentFingerprints>,
    /// token cookie 是否带 `Secure`。
    pub(crate) cookie_secure: bool,
}

impl AppState {
    /// 按配置打开身份存储并装配签发中心。
    pub(crate) fn from_config(config: &AuthConfig) -> anyhow::Result<Self> {
        let store = FileIdentityStore::open(&config.store_path)?;
        let authority = SessionAuthority::new(store, config.key_mode()?, config.token_policy());
        Ok(Self {
            authority: Arc::new(authority),
            recent: Arc::new(RecentFingerprints::new(config.fingerprint_cache)),
            cookie_secure: config.cookie_secure,
        })
    }

    pub(crate) fn store(&self) -> &FileIdentityStore {
        self.authority.lookup()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::AppState;
    use crate::auth::{
        authority::{KeyMode, SessionAuthority, TokenPolicy},
        cache::RecentFingerprints,
        codec::SigningKey,
        store::{FileIdentityStore, tests::temp_store_path},
    };

    /// 测试用状态：临时存储 + 全局密钥。
    pub(crate) fn test_state(policy: TokenPolicy) -> AppState {
        let store = FileIdentityStore::open(temp_store_path()).expect("open store");
        let keys = KeyMode::Global(SigningKey::new("test-secret-0123456789").expect("key"));
        AppState {
            authority: Arc::new(SessionAuthority::new(store, keys, policy)),
            recent: Arc::new(RecentFingerprints::new(8)),
            cookie_secure: true,
        }
    }
}
