//! 注册、登录、校验与刷新逻辑。

use std::net::SocketAddr;

use axum::http::HeaderMap;
use fpa_shared_protocol::ClientType;
use tracing::{info, warn};

use crate::{
    api::{
        error::ApiError,
        types::{LoginRequest, RegisterData, RegisterRequest, TokenData, VerifyData},
    },
    auth::{
        authority::IssuedToken,
        error::AuthError,
        fingerprint::FingerprintInputs,
        request::{extract_token, fingerprint_inputs},
        store::unix_now,
    },
    state::AppState,
};

/// 记录具体失败原因后转换为对外错误。
fn rejected(action: &str, subject: &str, err: AuthError) -> ApiError {
    warn!(
        "{action} rejected: subject={subject} code={} detail={err}",
        err.code()
    );
    ApiError::from(err)
}

impl AppState {
    /// 注册新身份。
    pub(crate) async fn register_identity(
        &self,
        req: &RegisterRequest,
    ) -> Result<RegisterData, ApiError> {
        let summary = self
            .store()
            .register(&req.username, &req.password, &req.description)
            .await
            .map_err(|err| rejected("register", req.username.trim(), err))?;
        info!("identity registered: {}", summary.username);
        Ok(RegisterData {
            username: summary.username,
            created_at: summary.created_at,
        })
    }

    /// 口令登录并签发指纹绑定 token。
    pub(crate) async fn login(
        &self,
        headers: &HeaderMap,
        peer: SocketAddr,
        req: &LoginRequest,
    ) -> Result<(TokenData, ClientType), ApiError> {
        let inputs = self.request_inputs(headers, peer, "login")?;
        let inputs = match &req.client_data {
            Some(data) => inputs
                .with_attributes(data.clone())
                .map_err(|err| rejected("login", &req.username, err))?,
            None => inputs,
        };

        let username = req.username.trim();
        self.store()
            .verify_password(username, &req.password)
            .await
            .map_err(|err| rejected("login", username, err))?;

        let issued = self
            .authority
            .issue(username, &inputs)
            .await
            .map_err(|err| rejected("login", username, err))?;
        info!(
            "login succeeded: subject={username} clientType={} ip={}",
            inputs.client_type(),
            inputs.network_address()
        );
        Ok(self.finish_issue(issued, inputs.client_type()))
    }

    /// 校验请求携带的 token。
    pub(crate) async fn verify_request(
        &self,
        headers: &HeaderMap,
        peer: SocketAddr,
    ) -> Result<VerifyData, ApiError> {
        let inputs = self.request_inputs(headers, peer, "verify")?;
        let token = require_token(headers, "verify")?;
        let claims = self
            .authority
            .verify(&token, &inputs)
            .await
            .map_err(|err| rejected("verify", "-", err))?;
        Ok(VerifyData {
            subject: claims.subject().to_string(),
            client_type: claims.client_type(),
            issued_at: claims.issued_at(),
            expires_at: claims.expires_at(),
        })
    }

    /// 刷新请求携带的 token。
    pub(crate) async fn refresh_request(
        &self,
        headers: &HeaderMap,
        peer: SocketAddr,
    ) -> Result<(TokenData, ClientType), ApiError> {
        let inputs = self.request_inputs(headers, peer, "refresh")?;
        let token = require_token(headers, "refresh")?;
        let issued = self
            .authority
            .refresh(&token, &inputs)
            .await
            .map_err(|err| rejected("refresh", "-", err))?;
        Ok(self.finish_issue(issued, inputs.client_type()))
    }

    fn request_inputs(
        &self,
        headers: &HeaderMap,
        peer: SocketAddr,
        action: &str,
    ) -> Result<FingerprintInputs, ApiError> {
        fingerprint_inputs(headers, peer).map_err(|err| rejected(action, "-", err))
    }

    fn finish_issue(&self, issued: IssuedToken, client_type: ClientType) -> (TokenData, ClientType) {
        self.recent.record(issued.claims.fingerprint(), client_type);
        let expires_at = issued.claims.expires_at();
        let data = TokenData {
            token: issued.token,
            token_type: "Bearer",
            expires_in: expires_at.saturating_sub(unix_now()),
            expires_at,
        };
        (data, client_type)
    }
}

fn require_token(headers: &HeaderMap, action: &str) -> Result<String, ApiError> {
    extract_token(headers).ok_or_else(|| {
        warn!("{action} rejected: code=MISSING_TOKEN");
        ApiError::unauthorized()
    })
}
