//! 配置模块职责：
//! 1. 读取 `.env` 文件与进程环境变量，进程环境变量优先。
//! 2. 解析监听地址、存储路径、密钥模式、token 时效与 CORS 等运行参数。
//! 3. 在启动前完成校验，配置不合法时拒绝启动。

use std::{collections::HashMap, fs, path::Path, path::PathBuf};

use anyhow::{Context, anyhow, bail};

use crate::auth::{
    authority::{KeyMode, TokenPolicy},
    codec::SigningKey,
    store::default_store_path,
};

/// env 文件路径环境变量。
const ENV_FILE_ENV: &str = "FPA_ENV_FILE";
const DEFAULT_ENV_FILE: &str = ".env";
const DEFAULT_ADDR: &str = "0.0.0.0:18090";
const DEFAULT_TOKEN_TTL_SEC: u64 = 3600;
const DEFAULT_REFRESH_GRACE_SEC: u64 = 24 * 3600;
const DEFAULT_FINGERPRINT_CACHE: usize = 1024;
/// 全局密钥最短字节数。
const MIN_SECRET_LEN: usize = 16;

/// 签名密钥模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyModeKind {
    Global,
    PerIdentity,
}

impl KeyModeKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::PerIdentity => "per-identity",
        }
    }
}

/// authd 运行时配置。
#[derive(Debug, Clone)]
pub(crate) struct AuthConfig {
    /// HTTP 监听地址。
    pub(crate) addr: String,
    /// 身份存储文件路径。
    pub(crate) store_path: PathBuf,
    pub(crate) key_mode: KeyModeKind,
    /// 全局签名密钥，仅全局模式存在。
    secret_key: Option<SigningKey>,
    pub(crate) token_ttl_sec: u64,
    pub(crate) refresh_grace_sec: u64,
    /// 允许的 CORS 来源；为空表示不限制。
    pub(crate) allowed_origins: Vec<String>,
    /// 诊断缓存容量，0 表示关闭。
    pub(crate) fingerprint_cache: usize,
    /// token cookie 是否带 `Secure`。
    pub(crate) cookie_secure: bool,
    /// 是否挂载 `/v1/debug/*` 诊断路由，默认关闭。
    pub(crate) debug_routes: bool,
}

impl AuthConfig {
    /// 从 env 文件与进程环境变量构建配置。
    pub(crate) fn from_env() -> anyhow::Result<Self> {
        let env_file = std::env::var(ENV_FILE_ENV)
            .ok()
            .map(|raw| raw.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_ENV_FILE.to_string());
        let mut source = EnvSource::from_file(Path::new(&env_file))?;
        source.overlay(std::env::vars_os().filter_map(|(key, value)| {
            Some((key.into_string().ok()?, value.into_string().ok()?))
        }));
        Self::from_source(&source)
    }

    fn from_source(source: &EnvSource) -> anyhow::Result<Self> {
        let key_mode = match source.string("FPA_KEY_MODE").as_deref() {
            None | Some("global") => KeyModeKind::Global,
            Some("per-identity") => KeyModeKind::PerIdentity,
            Some(other) => {
                bail!("unsupported FPA_KEY_MODE: {other} (expected global|per-identity)")
            }
        };

        let secret_key = source.string("FPA_SECRET_KEY");
        match (key_mode, &secret_key) {
            (KeyModeKind::Global, None) => {
                bail!("FPA_SECRET_KEY is required when FPA_KEY_MODE=global")
            }
            (KeyModeKind::Global, Some(secret)) if secret.len() < MIN_SECRET_LEN => {
                bail!("FPA_SECRET_KEY must be at least {MIN_SECRET_LEN} bytes")
            }
            (KeyModeKind::PerIdentity, Some(_)) => {
                bail!("FPA_SECRET_KEY must not be set when FPA_KEY_MODE=per-identity")
            }
            _ => {}
        }

        let secret_key = secret_key
            .map(|secret| SigningKey::new(secret).context("invalid FPA_SECRET_KEY"))
            .transpose()?;

        let token_ttl_sec = source.u64_or("FPA_TOKEN_TTL_SEC", DEFAULT_TOKEN_TTL_SEC)?;
        if token_ttl_sec == 0 {
            bail!("FPA_TOKEN_TTL_SEC must be greater than 0");
        }

        Ok(Self {
            addr: source
                .string("FPA_ADDR")
                .unwrap_or_else(|| DEFAULT_ADDR.to_string()),
            store_path: source
                .string("FPA_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(default_store_path),
            key_mode,
            secret_key,
            token_ttl_sec,
            refresh_grace_sec: source
                .u64_or("FPA_REFRESH_GRACE_SEC", DEFAULT_REFRESH_GRACE_SEC)?,
            allowed_origins: source.csv("FPA_ALLOWED_ORIGINS"),
            fingerprint_cache: source
                .u64_or("FPA_FINGERPRINT_CACHE", DEFAULT_FINGERPRINT_CACHE as u64)?
                as usize,
            cookie_secure: source.bool_or("FPA_COOKIE_SECURE", true)?,
            debug_routes: source.bool_or("FPA_DEBUG_ROUTES", false)?,
        })
    }

    /// 构造签名密钥模式。
    pub(crate) fn key_mode(&self) -> anyhow::Result<KeyMode> {
        match self.key_mode {
            KeyModeKind::Global => {
                let key = self
                    .secret_key
                    .clone()
                    .ok_or_else(|| anyhow!("global key mode without FPA_SECRET_KEY"))?;
                Ok(KeyMode::Global(key))
            }
            KeyModeKind::PerIdentity => Ok(KeyMode::PerIdentity),
        }
    }

    pub(crate) fn token_policy(&self) -> TokenPolicy {
        TokenPolicy {
            ttl_sec: self.token_ttl_sec,
            refresh_grace_sec: self.refresh_grace_sec,
        }
    }

    pub(crate) fn has_secret(&self) -> bool {
        self.secret_key.is_some()
    }
}

/// 合并后的环境变量视图。
#[derive(Debug, Default)]
struct EnvSource {
    values: HashMap<String, String>,
}

impl EnvSource {
    /// 读取 env 文件；文件不存在时返回空视图。
    fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("read env file failed: {}", path.display()))?;
        Ok(Self::parse(&raw))
    }

    /// 解析 `KEY=VALUE` 行：跳过空行与 `#` 注释，按第一个 `=` 切分，去掉成对引号。
    fn parse(raw: &str) -> Self {
        let values = raw
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| (key.trim().to_string(), unquote(value.trim()).to_string()))
            .filter(|(key, _)| !key.is_empty())
            .collect();
        Self { values }
    }

    /// 用进程环境变量覆盖文件中的同名项。
    fn overlay(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        self.values.extend(vars);
    }

    fn string(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .map(|raw| raw.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn u64_or(&self, key: &str, fallback: u64) -> anyhow::Result<u64> {
        match self.string(key) {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("{key} must be a non-negative integer, got {raw:?}")),
            None => Ok(fallback),
        }
    }

    fn bool_or(&self, key: &str, fallback: bool) -> anyhow::Result<bool> {
        let Some(raw) = self.string(key) else {
            return Ok(fallback);
        };
        match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "y" | "on" => Ok(true),
            "0" | "false" | "no" | "n" | "off" => Ok(false),
            _ => Err(anyhow!("{key} must be a boolean, got {raw:?}")),
        }
    }

    fn csv(&self, key: &str) -> Vec<String> {
        self.string(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|value| !value.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, EnvSource, KeyModeKind};
    use crate::auth::authority::KeyMode;

    fn source(raw: &str) -> EnvSource {
        EnvSource::parse(raw)
    }

    #[test]
    fn env_file_parsing_skips_comments_and_unquotes() {
        let env = source(
            "# comment\n\nFPA_SECRET_KEY=\"0123456789abcdef\"\nFPA_ADDR = 127.0.0.1:9000\nFPA_ALLOWED_ORIGINS=a=b\nnot a pair\n",
        );
        assert_eq!(env.string("FPA_SECRET_KEY").as_deref(), Some("0123456789abcdef"));
        assert_eq!(env.string("FPA_ADDR").as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(env.string("FPA_ALLOWED_ORIGINS").as_deref(), Some("a=b"));
        assert_eq!(env.string("not a pair"), None);
    }

    #[test]
    fn process_env_overrides_file() {
        let mut env = source("FPA_ADDR=127.0.0.1:1\nFPA_TOKEN_TTL_SEC=60\n");
        env.overlay([("FPA_ADDR".to_string(), "127.0.0.1:2".to_string())]);
        assert_eq!(env.string("FPA_ADDR").as_deref(), Some("127.0.0.1:2"));
        assert_eq!(env.u64_or("FPA_TOKEN_TTL_SEC", 1).expect("ttl"), 60);
    }

    #[test]
    fn defaults_apply_in_global_mode() {
        let config =
            AuthConfig::from_source(&source("FPA_SECRET_KEY=0123456789abcdef")).expect("config");
        assert_eq!(config.addr, "0.0.0.0:18090");
        assert_eq!(config.key_mode, KeyModeKind::Global);
        assert_eq!(config.token_ttl_sec, 3600);
        assert_eq!(config.refresh_grace_sec, 86400);
        assert_eq!(config.fingerprint_cache, 1024);
        assert!(config.cookie_secure);
        assert!(!config.debug_routes);
        assert!(config.allowed_origins.is_empty());
        assert!(matches!(config.key_mode(), Ok(KeyMode::Global(_))));
    }

    #[test]
    fn key_mode_rules_are_enforced() {
        assert!(AuthConfig::from_source(&source("")).is_err());
        assert!(AuthConfig::from_source(&source("FPA_SECRET_KEY=short")).is_err());
        assert!(
            AuthConfig::from_source(&source(
                "FPA_KEY_MODE=per-identity\nFPA_SECRET_KEY=0123456789abcdef"
            ))
            .is_err()
        );
        assert!(AuthConfig::from_source(&source("FPA_KEY_MODE=rotating")).is_err());

        let config =
            AuthConfig::from_source(&source("FPA_KEY_MODE=per-identity")).expect("config");
        assert_eq!(config.key_mode, KeyModeKind::PerIdentity);
        assert!(matches!(config.key_mode(), Ok(KeyMode::PerIdentity)));
    }

    #[test]
    fn invalid_numbers_and_booleans_are_rejected() {
        let base = "FPA_SECRET_KEY=0123456789abcdef\n";
        for bad in [
            "FPA_TOKEN_TTL_SEC=0",
            "FPA_TOKEN_TTL_SEC=-5",
            "FPA_COOKIE_SECURE=maybe",
            "FPA_DEBUG_ROUTES=sometimes",
        ] {
            assert!(
                AuthConfig::from_source(&source(&format!("{base}{bad}"))).is_err(),
                "{bad}"
            );
        }

        let config = AuthConfig::from_source(&source(&format!(
            "{base}FPA_COOKIE_SECURE=off\nFPA_DEBUG_ROUTES=yes\n\
             FPA_ALLOWED_ORIGINS=https://a.example, ,https://b.example"
        )))
        .expect("config");
        assert!(!config.cookie_secure);
        assert!(config.debug_routes);
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }
}
