//! 身份存储：JSON 文件 + 进程内读写锁。

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::auth::{
    authority::{IdentityLookup, IdentityMaterial},
    codec::SigningKey,
    error::AuthError,
    fingerprint::Fingerprint,
    password,
};

const STORE_VERSION: u32 = 1;
const USERNAME_MIN_LEN: usize = 3;
const USERNAME_MAX_LEN: usize = 64;
const PASSWORD_MIN_LEN: usize = 8;

/// 当前 unix 秒。
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// 默认身份存储路径。
pub(crate) fn default_store_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
        .join(".config")
        .join("fpauth")
        .join("identities.json")
}

/// 持久化文档。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreDocument {
    #[serde(default = "default_store_version")]
    version: u32,
    #[serde(default)]
    users: HashMap<String, UserRecord>,
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self {
            version: STORE_VERSION,
            users: HashMap::new(),
        }
    }
}

fn default_store_version() -> u32 {
    STORE_VERSION
}

/// 单个身份记录。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    username: String,
    #[serde(default)]
    description: String,
    password_hash: String,
    /// 单身份签名密钥。
    secret: String,
    #[serde(default)]
    fingerprint: Option<Fingerprint>,
    created_at: u64,
    #[serde(default)]
    fingerprint_updated_at: Option<u64>,
}

/// 注册成功后的公开信息。
#[derive(Debug, Clone)]
pub(crate) struct UserSummary {
    pub(crate) username: String,
    pub(crate) created_at: u64,
}

/// 基于 JSON 文件的身份存储。
///
/// 所有写操作在持有写锁期间完成落盘；落盘失败时回滚内存状态。
pub(crate) struct FileIdentityStore {
    path: PathBuf,
    doc: RwLock<StoreDocument>,
}

impl FileIdentityStore {
    /// 打开存储；文件不存在时从空文档开始，首次写入时创建。
    pub(crate) fn open(path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let path = path.into();
        let doc = load_document(&path)?;
        password::warm_up();
        info!(
            "identity store opened: path={} users={}",
            path.display(),
            doc.users.len()
        );
        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    pub(crate) async fn user_count(&self) -> usize {
        self.doc.read().await.users.len()
    }

    /// 注册新身份并生成专属签名密钥。
    pub(crate) async fn register(
        &self,
        username: &str,
        password: &str,
        description: &str,
    ) -> Result<UserSummary, AuthError> {
        let username = username.trim();
        validate_username(username)?;
        if password.chars().count() < PASSWORD_MIN_LEN {
            return Err(AuthError::InvalidRegistration("password too short"));
        }
        let password_hash = password::hash_in_background(password.to_string()).await?;

        let mut doc = self.doc.write().await;
        if doc.users.contains_key(username) {
            return Err(AuthError::IdentityExists);
        }
        let record = UserRecord {
            username: username.to_string(),
            description: description.trim().to_string(),
            password_hash,
            secret: generate_identity_secret(),
            fingerprint: None,
            created_at: unix_now(),
            fingerprint_updated_at: None,
        };
        let created_at = record.created_at;
        doc.users.insert(username.to_string(), record);
        if let Err(err) = persist_document(&self.path, &doc) {
            doc.users.remove(username);
            return Err(err);
        }

        Ok(UserSummary {
            username: username.to_string(),
            created_at,
        })
    }

    /// 校验用户名与口令。用户不存在时同样执行一次完整的哈希校验。
    pub(crate) async fn verify_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(), AuthError> {
        let hash = {
            let doc = self.doc.read().await;
            doc.users
                .get(username.trim())
                .map(|record| record.password_hash.clone())
        };
        let known = hash.is_some();
        let matched = password::verify_in_background(hash, password.to_string()).await?;
        match (known, matched) {
            (false, _) => Err(AuthError::IdentityNotFound),
            (true, false) => Err(AuthError::InvalidCredentials),
            (true, true) => Ok(()),
        }
    }
}

impl IdentityLookup for FileIdentityStore {
    async fn signing_material(&self, identity: &str) -> Result<IdentityMaterial, AuthError> {
        let doc = self.doc.read().await;
        let record = doc.users.get(identity).ok_or(AuthError::IdentityNotFound)?;
        Ok(IdentityMaterial {
            signing_key: SigningKey::new(&record.secret)?,
            fingerprint: record.fingerprint.clone(),
        })
    }

    async fn set_fingerprint(
        &self,
        identity: &str,
        fingerprint: &Fingerprint,
    ) -> Result<(), AuthError> {
        let mut doc = self.doc.write().await;
        let record = doc
            .users
            .get_mut(identity)
            .ok_or(AuthError::IdentityNotFound)?;
        if record.fingerprint.as_ref() == Some(fingerprint) {
            return Ok(());
        }
        let previous = (
            record.fingerprint.replace(fingerprint.clone()),
            record.fingerprint_updated_at.replace(unix_now()),
        );
        if let Err(err) = persist_document(&self.path, &doc) {
            if let Some(record) = doc.users.get_mut(identity) {
                record.fingerprint = previous.0;
                record.fingerprint_updated_at = previous.1;
            }
            return Err(err);
        }
        Ok(())
    }
}

fn validate_username(username: &str) -> Result<(), AuthError> {
    let len = username.chars().count();
    let charset_ok = username
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'));
    if (USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) && charset_ok {
        Ok(())
    } else {
        Err(AuthError::InvalidRegistration("username must be 3-64 chars of [A-Za-z0-9_.-]"))
    }
}

fn load_document(path: &Path) -> Result<StoreDocument, AuthError> {
    if !path.exists() {
        return Ok(StoreDocument::default());
    }
    let raw = fs::read(path)
        .map_err(|err| AuthError::Storage(format!("read identity store failed: {err}")))?;
    if raw.iter().all(u8::is_ascii_whitespace) {
        return Ok(StoreDocument::default());
    }
    serde_json::from_slice(&raw)
        .map_err(|err| AuthError::Storage(format!("decode identity store failed: {err}")))
}

fn persist_document(path: &Path, doc: &StoreDocument) -> Result<(), AuthError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|err| {
            AuthError::Storage(format!("create identity store dir failed: {err}"))
        })?;
    }
    let encoded = serde_json::to_vec_pretty(doc)
        .map_err(|err| AuthError::Storage(format!("encode identity store failed: {err}")))?;
    // 先写临时文件再 rename，中途崩溃不会留下半截文档。
    let tmp = temp_path(path);
    fs::write(&tmp, encoded)
        .map_err(|err| AuthError::Storage(format!("write identity store failed: {err}")))?;
    fs::rename(&tmp, path).map_err(|err| {
        let _ = fs::remove_file(&tmp);
        AuthError::Storage(format!("replace identity store failed: {err}"))
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "identities.json".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// 生成单身份签名密钥。
fn generate_identity_secret() -> String {
    format!(
        "fpa_sk_{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}
