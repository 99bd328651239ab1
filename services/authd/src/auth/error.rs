//! 鉴权核心错误分类。

/// 指纹绑定 token 的签发、校验、刷新以及身份查询过程中的错误。
///
/// 调用方拿到的都是具体分类；对外响应是否需要抹平差异由 API 层决定。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub(crate) enum AuthError {
    /// token 结构、base64 或 JSON 无法解析。
    #[error("malformed token: {0}")]
    MalformedToken(&'static str),

    /// header 中的 `alg` 不属于 HMAC 族。
    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("token signature invalid")]
    SignatureInvalid,

    #[error("token expired")]
    Expired,

    #[error("token not yet valid")]
    NotYetValid,

    /// token 内嵌指纹与本次请求重新计算的指纹不一致。
    #[error("fingerprint mismatch")]
    FingerprintMismatch,

    #[error("identity not found")]
    IdentityNotFound,

    /// 密钥无效或 claims 无法签名；签发请求必须整体失败。
    #[error("signing failure: {0}")]
    SigningFailure(String),

    #[error("invalid fingerprint inputs: {0}")]
    InvalidFingerprintInputs(String),

    #[error("identity already exists")]
    IdentityExists,

    /// 用户名或密码不正确。
    #[error("invalid credentials")]
    InvalidCredentials,

    /// 注册参数不满足用户名或口令规则。
    #[error("invalid registration: {0}")]
    InvalidRegistration(&'static str),

    /// 身份存储读写失败。
    #[error("identity store failure: {0}")]
    Storage(String),
}

impl AuthError {
    /// 稳定的机器可读错误码，仅用于日志与内部诊断。
    pub(crate) fn code(&self) -> &'static str {
        match self {
            AuthError::MalformedToken(_) => "MALFORMED_TOKEN",
            AuthError::UnsupportedAlgorithm(_) => "UNSUPPORTED_ALGORITHM",
            AuthError::SignatureInvalid => "SIGNATURE_INVALID",
            AuthError::Expired => "EXPIRED",
            AuthError::NotYetValid => "NOT_YET_VALID",
            AuthError::FingerprintMismatch => "FINGERPRINT_MISMATCH",
            AuthError::IdentityNotFound => "IDENTITY_NOT_FOUND",
            AuthError::SigningFailure(_) => "SIGNING_FAILURE",
            AuthError::InvalidFingerprintInputs(_) => "INVALID_FINGERPRINT_INPUTS",
            AuthError::IdentityExists => "IDENTITY_EXISTS",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::InvalidRegistration(_) => "INVALID_REGISTRATION",
            AuthError::Storage(_) => "STORAGE_FAILURE",
        }
    }

    /// 是否属于“凭证不可信”类错误，对外统一表现为未授权。
    pub(crate) fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::MalformedToken(_)
                | AuthError::UnsupportedAlgorithm(_)
                | AuthError::SignatureInvalid
                | AuthError::Expired
                | AuthError::NotYetValid
                | AuthError::FingerprintMismatch
                | AuthError::IdentityNotFound
                | AuthError::InvalidCredentials
        )
    }
}
