//! 会话签发中心：签发、校验与刷新，负责指纹绑定、过期策略与失败分类。
//!
//! 每个请求都是一次性的终态计算，不跨请求保存状态机；唯一的共享可变资源是
//! [`IdentityLookup`]，写入冲突由它自己串行化。

use std::future::Future;

use tracing::{debug, info};

use crate::auth::{
    codec::{self, Claims, SigningKey},
    error::AuthError,
    fingerprint::{self, Fingerprint, FingerprintInputs},
    store::unix_now,
};

/// 身份查询返回的签名材料。
#[derive(Debug, Clone)]
pub(crate) struct IdentityMaterial {
    /// 该身份的专属签名密钥。
    pub(crate) signing_key: SigningKey,
    /// 最近一次签发时记录的指纹。
    pub(crate) fingerprint: Option<Fingerprint>,
}

/// 外部身份查询服务。
///
/// # Trait bounds
///
/// `Send + Sync + 'static`：同一个实例会被多个请求任务并发调用。
pub(crate) trait IdentityLookup: Send + Sync + 'static {
    /// 读取身份的签名材料；身份不存在时返回 [`AuthError::IdentityNotFound`]。
    fn signing_material(
        &self,
        identity: &str,
    ) -> impl Future<Output = Result<IdentityMaterial, AuthError>> + Send;

    /// 记录身份最新的指纹。单次往返，不假设调用方的读后写具备原子性。
    fn set_fingerprint(
        &self,
        identity: &str,
        fingerprint: &Fingerprint,
    ) -> impl Future<Output = Result<(), AuthError>> + Send;
}

/// 签名密钥来源，两种模式互斥。
#[derive(Debug, Clone)]
pub(crate) enum KeyMode {
    /// 进程级单一密钥。
    Global(SigningKey),
    /// 每个身份使用自己的密钥，从 [`IdentityLookup`] 读取。
    PerIdentity,
}

/// token 时效策略。
#[derive(Debug, Clone, Copy)]
pub(crate) struct TokenPolicy {
    /// token 有效期（秒），必须大于 0。
    pub(crate) ttl_sec: u64,
    /// 过期后仍允许刷新的窗口（秒）。
    pub(crate) refresh_grace_sec: u64,
}

/// 一次签发的结果。
#[derive(Debug, Clone)]
pub(crate) struct IssuedToken {
    pub(crate) token: String,
    pub(crate) claims: Claims,
}

/// 会话签发中心。
pub(crate) struct SessionAuthority<L> {
    lookup: L,
    keys: KeyMode,
    policy: TokenPolicy,
}

impl<L: IdentityLookup> SessionAuthority<L> {
    pub(crate) fn new(lookup: L, keys: KeyMode, policy: TokenPolicy) -> Self {
        Self {
            lookup,
            keys,
            policy,
        }
    }

    pub(crate) fn lookup(&self) -> &L {
        &self.lookup
    }

    /// 登录签发：按当前请求推导指纹并写入 token。
    pub(crate) async fn issue(
        &self,
        identity: &str,
        inputs: &FingerprintInputs,
    ) -> Result<IssuedToken, AuthError> {
        let fingerprint = fingerprint::derive(inputs);
        self.issue_bound(identity, fingerprint, inputs).await
    }

    /// 校验：签名与时间先通过，再比较内嵌指纹与重新推导的指纹。
    pub(crate) async fn verify(
        &self,
        token: &str,
        inputs: &FingerprintInputs,
    ) -> Result<Claims, AuthError> {
        let current = fingerprint::derive(inputs);
        let key = self.resolve_verification_key(token).await?;
        let claims = codec::decode(token, &key)?;
        ensure_bound(&claims, &current)?;
        Ok(claims)
    }

    /// 刷新：校验通过，或仅因过期且仍在宽限窗口内时，为同一 subject 重新签发。
    ///
    /// 宽限路径同样要求签名有效且指纹一致。旧 token 不进黑名单，到期自然失效。
    pub(crate) async fn refresh(
        &self,
        token: &str,
        inputs: &FingerprintInputs,
    ) -> Result<IssuedToken, AuthError> {
        let current = fingerprint::derive(inputs);
        let key = self.resolve_verification_key(token).await?;
        let claims = match codec::decode(token, &key) {
            Ok(claims) => claims,
            Err(AuthError::Expired) => codec::decode_with_grace(
                token,
                &key,
                unix_now(),
                self.policy.refresh_grace_sec,
            )?,
            Err(err) => return Err(err),
        };
        ensure_bound(&claims, &current)?;

        let issued = self.issue_bound(claims.subject(), current, inputs).await?;
        info!(
            "refreshed token for {} (previous exp {}, new exp {})",
            claims.subject(),
            claims.expires_at(),
            issued.claims.expires_at()
        );
        Ok(issued)
    }

    async fn issue_bound(
        &self,
        identity: &str,
        fingerprint: Fingerprint,
        inputs: &FingerprintInputs,
    ) -> Result<IssuedToken, AuthError> {
        let material = self.lookup.signing_material(identity).await?;
        let key = match &self.keys {
            KeyMode::Global(key) => key,
            KeyMode::PerIdentity => &material.signing_key,
        };

        let claims = Claims::issue(
            identity,
            fingerprint,
            inputs.client_type(),
            unix_now(),
            self.policy.ttl_sec,
        );
        let token = codec::encode(&claims, key)?;
        if let Some(previous) = &material.fingerprint
            && !previous.matches(claims.fingerprint())
        {
            debug!("fingerprint for {identity} changed since last issue");
        }
        self.lookup
            .set_fingerprint(identity, claims.fingerprint())
            .await?;

        debug!(
            "issued token for {identity} ({}) bound to {}",
            inputs.client_type(),
            claims.fingerprint()
        );
        Ok(IssuedToken { token, claims })
    }

    /// 全局模式直接使用全局密钥；单身份模式先读未校验的 subject 再查密钥。
    async fn resolve_verification_key(&self, token: &str) -> Result<SigningKey, AuthError> {
        match &self.keys {
            KeyMode::Global(key) => Ok(key.clone()),
            KeyMode::PerIdentity => {
                let unverified = codec::decode_unsafe(token)?;
                let material = self.lookup.signing_material(unverified.subject()).await?;
                Ok(material.signing_key)
            }
        }
    }
}

fn ensure_bound(claims: &Claims, current: &Fingerprint) -> Result<(), AuthError> {
    if claims.fingerprint().matches(current) {
        Ok(())
    } else {
        Err(AuthError::FingerprintMismatch)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicBool, Ordering},
        },
    };

    use fpa_shared_protocol::ClientType;

    use super::{
        AuthError, IdentityLookup, IdentityMaterial, KeyMode, SessionAuthority, TokenPolicy,
    };
    use crate::auth::{
        codec::{self, Claims, SigningKey},
        fingerprint::{Fingerprint, FingerprintInputs, derive},
        store::unix_now,
    };

    /// 内存版身份查询。
    #[derive(Default)]
    struct MemoryLookup {
        secrets: HashMap<String, String>,
        fingerprints: Mutex<HashMap<String, Fingerprint>>,
        fail_writes: AtomicBool,
    }

    impl MemoryLookup {
        fn with_users(users: &[(&str, &str)]) -> Self {
            Self {
                secrets: users
                    .iter()
                    .map(|(name, secret)| (name.to_string(), secret.to_string()))
                    .collect(),
                ..Self::default()
            }
        }

        fn stored(&self, identity: &str) -> Option<Fingerprint> {
            self.fingerprints
                .lock()
                .expect("lock")
                .get(identity)
                .cloned()
        }
    }

    impl IdentityLookup for MemoryLookup {
        async fn signing_material(&self, identity: &str) -> Result<IdentityMaterial, AuthError> {
            let secret = self.secrets.get(identity).ok_or(AuthError::IdentityNotFound)?;
            Ok(IdentityMaterial {
                signing_key: SigningKey::new(secret)?,
                fingerprint: self.stored(identity),
            })
        }

        async fn set_fingerprint(
            &self,
            identity: &str,
            fingerprint: &Fingerprint,
        ) -> Result<(), AuthError> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(AuthError::Storage("write refused".to_string()));
            }
            if !self.secrets.contains_key(identity) {
                return Err(AuthError::IdentityNotFound);
            }
            self.fingerprints
                .lock()
                .expect("lock")
                .insert(identity.to_string(), fingerprint.clone());
            Ok(())
        }
    }

    const POLICY: TokenPolicy = TokenPolicy {
        ttl_sec: 600,
        refresh_grace_sec: 24 * 3600,
    };

    fn global_authority() -> SessionAuthority<MemoryLookup> {
        SessionAuthority::new(
            MemoryLookup::with_users(&[("alice", "alice-secret"), ("bob", "bob-secret")]),
            KeyMode::Global(SigningKey::new("global-secret").expect("key")),
            POLICY,
        )
    }

    fn per_identity_authority() -> SessionAuthority<MemoryLookup> {
        SessionAuthority::new(
            MemoryLookup::with_users(&[("alice", "alice-secret"), ("bob", "bob-secret")]),
            KeyMode::PerIdentity,
            POLICY,
        )
    }

    fn web(ip: &str) -> FingerprintInputs {
        FingerprintInputs::new(ClientType::Web, ip, "Mozilla/5.0").expect("inputs")
    }

    #[tokio::test]
    async fn alice_is_bound_to_her_network_address() {
        for authority in [global_authority(), per_identity_authority()] {
            let issued = authority
                .issue("alice", &web("203.0.113.5"))
                .await
                .expect("issue");

            let claims = authority
                .verify(&issued.token, &web("203.0.113.5"))
                .await
                .expect("same inputs verify");
            assert_eq!(claims.subject(), "alice");
            assert_eq!(claims.client_type(), ClientType::Web);

            let err = authority
                .verify(&issued.token, &web("203.0.113.9"))
                .await
                .unwrap_err();
            assert_eq!(err, AuthError::FingerprintMismatch);
        }
    }

    #[tokio::test]
    async fn issue_records_fingerprint_through_lookup() {
        let authority = per_identity_authority();
        let inputs = web("198.51.100.7");
        let issued = authority.issue("alice", &inputs).await.expect("issue");
        assert_eq!(authority.lookup().stored("alice"), Some(derive(&inputs)));
        assert_eq!(issued.claims.fingerprint(), &derive(&inputs));
        assert_eq!(
            issued.claims.expires_at() - issued.claims.issued_at(),
            POLICY.ttl_sec
        );
    }

    #[tokio::test]
    async fn unknown_identity_cannot_be_issued() {
        let authority = global_authority();
        let err = authority.issue("mallory", &web("10.0.0.1")).await.unwrap_err();
        assert_eq!(err, AuthError::IdentityNotFound);
        assert_eq!(authority.lookup().stored("mallory"), None);
    }

    #[tokio::test]
    async fn failed_fingerprint_write_yields_no_token() {
        let authority = global_authority();
        authority
            .lookup()
            .fail_writes
            .store(true, std::sync::atomic::Ordering::SeqCst);
        let err = authority.issue("alice", &web("10.0.0.1")).await.unwrap_err();
        assert!(matches!(err, AuthError::Storage(_)));
    }

    #[tokio::test]
    async fn per_identity_keys_are_not_interchangeable() {
        let authority = per_identity_authority();
        let inputs = web("10.0.0.1");
        let now = unix_now();
        let forged =
            Claims::with_window("bob", derive(&inputs), ClientType::Web, now, now, now + 60);
        let token = codec::encode(&forged, &SigningKey::new("alice-secret").expect("key"))
            .expect("encode");
        let err = authority.verify(&token, &inputs).await.unwrap_err();
        assert_eq!(err, AuthError::SignatureInvalid);
    }

    #[tokio::test]
    async fn per_identity_token_for_unknown_subject_is_rejected() {
        let authority = per_identity_authority();
        let inputs = web("10.0.0.1");
        let now = unix_now();
        let claims =
            Claims::with_window("ghost", derive(&inputs), ClientType::Web, now, now, now + 60);
        let token =
            codec::encode(&claims, &SigningKey::new("anything").expect("key")).expect("encode");
        assert_eq!(
            authority.verify(&token, &inputs).await.unwrap_err(),
            AuthError::IdentityNotFound
        );
    }

    #[tokio::test]
    async fn decode_errors_surface_before_fingerprint_comparison() {
        let authority = global_authority();
        let issued = authority.issue("alice", &web("10.0.0.1")).await.expect("issue");
        let mut tampered = issued.token.clone();
        tampered.push('A');
        let err = authority.verify(&tampered, &web("10.0.0.2")).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::SignatureInvalid | AuthError::MalformedToken(_)
        ));
    }

    fn expired_token(key: &str, subject: &str, inputs: &FingerprintInputs, ago: u64) -> String {
        let now = unix_now();
        let claims = Claims::with_window(
            subject,
            derive(inputs),
            inputs.client_type(),
            now - ago - 600,
            now - ago - 600,
            now - ago,
        );
        codec::encode(&claims, &SigningKey::new(key).expect("key")).expect("encode")
    }

    #[tokio::test]
    async fn expired_token_fails_verify_but_refreshes_within_grace() {
        let authority = global_authority();
        let inputs = web("203.0.113.5");
        let token = expired_token("global-secret", "alice", &inputs, 1);

        assert_eq!(
            authority.verify(&token, &inputs).await.unwrap_err(),
            AuthError::Expired
        );

        let refreshed = authority.refresh(&token, &inputs).await.expect("refresh");
        assert!(refreshed.claims.expires_at() > unix_now());
        assert_eq!(refreshed.claims.subject(), "alice");
        assert!(authority.verify(&refreshed.token, &inputs).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_beyond_grace_window_is_expired() {
        let authority = global_authority();
        let inputs = web("203.0.113.5");
        let token = expired_token("global-secret", "alice", &inputs, POLICY.refresh_grace_sec + 5);
        assert_eq!(
            authority.refresh(&token, &inputs).await.unwrap_err(),
            AuthError::Expired
        );
    }

    #[tokio::test]
    async fn refresh_from_another_context_is_rejected() {
        let authority = global_authority();
        let token = expired_token("global-secret", "alice", &web("203.0.113.5"), 1);
        assert_eq!(
            authority.refresh(&token, &web("203.0.113.9")).await.unwrap_err(),
            AuthError::FingerprintMismatch
        );

        let live = authority.issue("alice", &web("203.0.113.5")).await.expect("issue");
        assert_eq!(
            authority.refresh(&live.token, &web("203.0.113.9")).await.unwrap_err(),
            AuthError::FingerprintMismatch
        );
    }

    #[tokio::test]
    async fn refresh_of_valid_token_issues_a_new_one() {
        let authority = per_identity_authority();
        let inputs = web("203.0.113.5");
        let first = authority.issue("alice", &inputs).await.expect("issue");
        let second = authority.refresh(&first.token, &inputs).await.expect("refresh");
        assert_ne!(first.token, second.token);
        assert_eq!(second.claims.subject(), "alice");
        assert!(authority.verify(&first.token, &inputs).await.is_ok());
    }

    #[tokio::test]
    async fn refresh_with_bad_signature_is_fatal() {
        let authority = global_authority();
        let inputs = web("203.0.113.5");
        let token = expired_token("not-the-global-secret", "alice", &inputs, 1);
        assert_eq!(
            authority.refresh(&token, &inputs).await.unwrap_err(),
            AuthError::SignatureInvalid
        );
    }
}
