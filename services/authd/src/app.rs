//! authd 应用装配：路由、CORS 与监听。

use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::State,
    http::{
        HeaderName, HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post},
};
use fpa_shared_protocol::{HEADER_CLIENT_DATA, HEADER_CLIENT_TYPE, now_rfc3339_nanos};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::{
    api::types::FingerprintDebugData,
    auth::handlers::{login_handler, refresh_handler, register_handler, verify_handler},
    config::AuthConfig,
    state::AppState,
};

/// authd 入口：装配状态并启动 HTTP 路由。
pub(crate) async fn run(config: AuthConfig) -> anyhow::Result<()> {
    let state = AppState::from_config(&config)?;
    let app = router(
        state,
        cors_layer(&config.allowed_origins),
        config.debug_routes,
    );

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    info!(
        "fpa-authd listening on {} (keyMode={}, ttl={}s, grace={}s)",
        config.addr,
        config.key_mode.as_str(),
        config.token_ttl_sec,
        config.refresh_grace_sec
    );
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// 诊断路由仅在 `debug_routes` 开启时挂载。
fn router(state: AppState, cors: CorsLayer, debug_routes: bool) -> Router {
    let mut router = Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/auth/register", post(register_handler))
        .route("/v1/auth/login", post(login_handler))
        .route("/v1/auth/verify", get(verify_handler))
        .route("/v1/auth/refresh", post(refresh_handler));
    if debug_routes {
        router = router.route("/v1/debug/fingerprints", get(debug_fingerprints));
    }
    router.layer(cors).with_state(state)
}

/// 未配置来源时不限制；配置了则只放行列表内来源并允许携带 cookie。
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let headers = [
        CONTENT_TYPE,
        AUTHORIZATION,
        HeaderName::from_static(HEADER_CLIENT_TYPE),
        HeaderName::from_static(HEADER_CLIENT_DATA),
    ];
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(headers);
    if allowed_origins.is_empty() {
        return base.allow_origin(Any);
    }

    let origins = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignore invalid CORS origin: {origin}");
                None
            }
        })
        .collect::<Vec<_>>();
    base.allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

/// 健康检查接口。
async fn healthz() -> &'static str {
    "ok"
}

/// 调试接口：最近签发指纹的统计（不含指纹本身）。
async fn debug_fingerprints(State(state): State<AppState>) -> Json<FingerprintDebugData> {
    Json(FingerprintDebugData {
        snapshot: state.recent.snapshot(),
        identities: state.store().user_count().await,
        generated_at: now_rfc3339_nanos(),
    })
}

#[cfg(test)]
mod tests {
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    use super::{cors_layer, router};
    use crate::{auth::authority::TokenPolicy, state::tests::test_state};

    const ALLOW_ORIGIN: &str = "access-control-allow-origin";
    const ALLOW_CREDENTIALS: &str = "access-control-allow-credentials";

    fn app(origins: &[&str], debug_routes: bool) -> Router {
        let state = test_state(TokenPolicy {
            ttl_sec: 600,
            refresh_grace_sec: 60,
        });
        let origins = origins.iter().map(ToString::to_string).collect::<Vec<_>>();
        router(state, cors_layer(&origins), debug_routes)
    }

    fn preflight(origin: &str) -> Request<Body> {
        Request::builder()
            .method("OPTIONS")
            .uri("/v1/auth/verify")
            .header("origin", origin)
            .header("access-control-request-method", "GET")
            .body(Body::empty())
            .expect("request")
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    #[tokio::test]
    async fn allow_list_echoes_known_origin_with_credentials() {
        let response = app(&["https://app.example"], false)
            .oneshot(preflight("https://app.example"))
            .await
            .expect("response");
        let headers = response.headers();
        assert_eq!(
            headers.get(ALLOW_ORIGIN).and_then(|v| v.to_str().ok()),
            Some("https://app.example")
        );
        assert_eq!(
            headers.get(ALLOW_CREDENTIALS).and_then(|v| v.to_str().ok()),
            Some("true")
        );
    }

    #[tokio::test]
    async fn allow_list_rejects_unknown_origin() {
        let response = app(&["https://app.example", "not a header\n"], false)
            .oneshot(preflight("https://evil.example"))
            .await
            .expect("response");
        assert!(response.headers().get(ALLOW_ORIGIN).is_none());
    }

    #[tokio::test]
    async fn empty_allow_list_allows_any_origin_without_credentials() {
        let response = app(&[], false)
            .oneshot(preflight("https://anywhere.example"))
            .await
            .expect("response");
        let headers = response.headers();
        assert_eq!(
            headers.get(ALLOW_ORIGIN).and_then(|v| v.to_str().ok()),
            Some("*")
        );
        assert!(headers.get(ALLOW_CREDENTIALS).is_none());
    }

    #[tokio::test]
    async fn debug_route_is_mounted_only_when_enabled() {
        let response = app(&[], false)
            .oneshot(get("/v1/debug/fingerprints"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app(&[], true)
            .oneshot(get("/v1/debug/fingerprints"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);

        let response = app(&[], false)
            .oneshot(get("/healthz"))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }
}
