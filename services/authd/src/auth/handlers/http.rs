//! 鉴权 HTTP 路由处理函数。

use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, StatusCode, header::SET_COOKIE},
};
use fpa_shared_protocol::{ClientType, TOKEN_COOKIE};

use crate::{
    api::{
        response::{ApiEnvelope, ok_response},
        types::{LoginRequest, RegisterData, RegisterRequest, TokenData, VerifyData},
    },
    state::AppState,
};

/// 注册接口。
pub(crate) async fn register_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> (StatusCode, Json<ApiEnvelope<RegisterData>>) {
    match state.register_identity(&req).await {
        Ok(data) => ok_response(
            StatusCode::CREATED,
            "注册成功",
            "请使用新账号登录",
            Some(data),
        ),
        Err(err) => err.into_response(),
    }
}

/// 登录接口：web 端额外下发 token cookie。
pub(crate) async fn login_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(req): Json<LoginRequest>,
) -> (StatusCode, HeaderMap, Json<ApiEnvelope<TokenData>>) {
    match state.login(&headers, peer, &req).await {
        Ok((data, client_type)) => {
            let cookies = token_cookie(&state, &data, client_type);
            let (status, body) = ok_response(StatusCode::OK, "登录成功", "", Some(data));
            (status, cookies, body)
        }
        Err(err) => {
            let (status, body) = err.into_response();
            (status, HeaderMap::new(), body)
        }
    }
}

/// 校验接口。
pub(crate) async fn verify_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> (StatusCode, Json<ApiEnvelope<VerifyData>>) {
    match state.verify_request(&headers, peer).await {
        Ok(data) => ok_response(StatusCode::OK, "token 有效", "", Some(data)),
        Err(err) => err.into_response(),
    }
}

/// 刷新接口：为同一 subject 重新签发，web 端同步更新 cookie。
pub(crate) async fn refresh_handler(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> (StatusCode, HeaderMap, Json<ApiEnvelope<TokenData>>) {
    match state.refresh_request(&headers, peer).await {
        Ok((data, client_type)) => {
            let cookies = token_cookie(&state, &data, client_type);
            let (status, body) = ok_response(
                StatusCode::OK,
                "token 已刷新",
                "请使用新 token 替换旧 token",
                Some(data),
            );
            (status, cookies, body)
        }
        Err(err) => {
            let (status, body) = err.into_response();
            (status, HeaderMap::new(), body)
        }
    }
}

/// 仅 web 端需要 cookie；mobile 端自行保存 token。
fn token_cookie(state: &AppState, data: &TokenData, client_type: ClientType) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if client_type != ClientType::Web {
        return headers;
    }
    let mut cookie = format!(
        "{TOKEN_COOKIE}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Strict",
        data.token, data.expires_in
    );
    if state.cookie_secure {
        cookie.push_str("; Secure");
    }
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        headers.insert(SET_COOKIE, value);
    }
    headers
}
