//! Read API - 地理検索と店舗詳細
//!
//! | メソッド | パス | 本文 |
//! |----------|------|------|
//! | POST | `/restaurants/search` | `{lat, lng, lat_min, lat_max, lng_min, lng_max, middle_area_code?}` |
//! | POST | `/restaurants/{id}` | `{id}` |
//!
//! # オリジン
//! 許可リストにある `Origin` だけ `Access-Control-Allow-Origin` に返します。
//! それ以外は業務処理に入らず、ヘッダなしで既定の本文 `NG` を返します。
//!
//! # 失敗
//! 呼び出し元には 500 と既定の本文だけを返し、原因は ErrorSink に送ります。

mod restaurants;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::header::{ACCESS_CONTROL_ALLOW_ORIGIN, ORIGIN, VARY};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use self::restaurants::{ApiError, DetailRequest, SearchRequest};
use crate::ports::{Database, ErrorSink};

/// 拒否・失敗時の本文
pub const DEFAULT_BODY: &str = "NG";

#[derive(Clone)]
pub struct ApiState {
    db: Arc<dyn Database>,
    sink: Arc<dyn ErrorSink>,
    allowed_origins: Arc<[String]>,
}

impl ApiState {
    pub fn new(db: Arc<dyn Database>, sink: Arc<dyn ErrorSink>, allowed_origins: Vec<String>) -> Self {
        Self {
            db,
            sink,
            allowed_origins: allowed_origins.into(),
        }
    }

    fn allows(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }

    /// 原因は ErrorSink へ、呼び出し元には 500 と既定の本文
    async fn fail(&self, function_name: &str, error: ApiError) -> Response {
        tracing::error!(function = function_name, error = %error, "read api failed");
        self.sink.report(function_name, &error.to_string()).await;
        (StatusCode::INTERNAL_SERVER_ERROR, DEFAULT_BODY).into_response()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/restaurants/search", post(restaurants::search))
        .route("/restaurants/{id}", post(restaurants::detail))
        .route_layer(middleware::from_fn_with_state(state.clone(), origin_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn origin_gate(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|v| v.to_str().ok())
        .filter(|o| state.allows(o))
        .map(str::to_string);
    let Some(origin) = origin else {
        tracing::debug!("origin not allowed");
        return (StatusCode::OK, DEFAULT_BODY).into_response();
    };

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&origin) {
        let headers = response.headers_mut();
        headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(VARY, HeaderValue::from_static("Origin"));
    }
    response
}

/// `shutdown` が完了するまで受け付ける
pub async fn serve(
    listener: TcpListener,
    state: ApiState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "read api listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::area::sample_area;
    use crate::domain::errors::DbError;
    use crate::impls::error_sink::RecordingSink;
    use crate::impls::single_file_db::schema_database;
    use crate::ports::{Dialect, Row, SqlValue, Statement};
    use crate::repo::reference::tests::seed_reference;
    use crate::repo::restaurants::tests::{completed, entry};
    use crate::repo::restaurants as repo;
    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::Request as HttpRequest;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    const FRONT: &str = "https://meshi.example";

    async fn seeded() -> Arc<dyn Database> {
        let db = schema_database().await;
        seed_reference(&db).await;
        repo::save_abstracts(
            &db,
            &sample_area(),
            &[entry("J1", "遠い", false), entry("J2", "近い", true)],
        )
        .await
        .unwrap();
        repo::complete_detail(&db, "J1", &completed(36.2, 139.9, &["外観", "店内"]))
            .await
            .unwrap();
        repo::complete_detail(&db, "J2", &completed(35.91, 139.62, &[]))
            .await
            .unwrap();
        Arc::new(db)
    }

    fn app(db: Arc<dyn Database>, sink: Arc<RecordingSink>) -> Router {
        router(ApiState::new(db, sink, vec![FRONT.to_string()]))
    }

    fn post_json(uri: &str, origin: Option<&str>, body: Value) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(origin) = origin {
            builder = builder.header("origin", origin);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn body_of(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn search_body() -> Value {
        // 最小と最大が逆でも受け付ける
        json!({
            "lat": 35.9, "lng": 139.6,
            "lat_min": 36.5, "lat_max": 35.0,
            "lng_min": 139.0, "lng_max": 140.0
        })
    }

    #[tokio::test]
    async fn search_returns_nearest_first_with_the_origin_echoed() {
        let sink = Arc::new(RecordingSink::default());
        let response = app(seeded().await, sink.clone())
            .oneshot(post_json("/restaurants/search", Some(FRONT), search_body()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], FRONT);
        let hits: Value = serde_json::from_str(&body_of(response).await).unwrap();
        assert_eq!(hits[0]["id"], "J2");
        assert_eq!(hits[1]["id"], "J1");
        assert_eq!(hits[0]["genre_name"], "居酒屋");
        assert!(hits[0]["distance"].as_f64().unwrap() < hits[1]["distance"].as_f64().unwrap());
        assert!(sink.reports().await.is_empty());
    }

    #[tokio::test]
    async fn search_without_reference_point_has_null_distance() {
        let sink = Arc::new(RecordingSink::default());
        let body = json!({
            "lat_min": 35.0, "lat_max": 36.5, "lng_min": 139.0, "lng_max": 140.0,
            "middle_area_code": "Y005"
        });
        let response = app(seeded().await, sink)
            .oneshot(post_json("/restaurants/search", Some(FRONT), body))
            .await
            .unwrap();

        let hits: Value = serde_json::from_str(&body_of(response).await).unwrap();
        assert_eq!(hits[0]["id"], "J1");
        assert!(hits[0]["distance"].is_null());
    }

    #[tokio::test]
    async fn disallowed_origin_short_circuits() {
        let sink = Arc::new(RecordingSink::default());
        for origin in [Some("https://evil.example"), None] {
            let response = app(seeded().await, sink.clone())
                .oneshot(post_json("/restaurants/search", origin, search_body()))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
            assert_eq!(body_of(response).await, DEFAULT_BODY);
        }
        assert!(sink.reports().await.is_empty());
    }

    #[tokio::test]
    async fn detail_lists_images_in_order() {
        let sink = Arc::new(RecordingSink::default());
        let response = app(seeded().await, sink)
            .oneshot(post_json("/restaurants/J1", Some(FRONT), json!({"id": "J1"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let detail: Value = serde_json::from_str(&body_of(response).await).unwrap();
        assert_eq!(detail["genre"], "居酒屋");
        assert!(detail["sub_genre"].is_null());
        assert_eq!(
            detail["images"],
            json!([{"order_num": 1, "alt": "外観"}, {"order_num": 2, "alt": "店内"}])
        );
    }

    #[tokio::test]
    async fn unknown_restaurant_is_a_reported_500() {
        let sink = Arc::new(RecordingSink::default());
        let response = app(seeded().await, sink.clone())
            .oneshot(post_json("/restaurants/J404", Some(FRONT), json!({"id": "J404"})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await, DEFAULT_BODY);
        assert!(sink.reports().await[0].1.contains("J404"));
    }

    #[tokio::test]
    async fn malformed_body_is_a_reported_500() {
        let sink = Arc::new(RecordingSink::default());
        let response = app(seeded().await, sink.clone())
            .oneshot(post_json("/restaurants/search", Some(FRONT), json!({"lat_min": 35.0})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(sink.reports().await.len(), 1);

        let response = app(seeded().await, sink.clone())
            .oneshot(post_json(
                "/restaurants/search",
                Some(FRONT),
                json!({"lat_min": 35.0, "lat_max": 36.0, "lng_min": 139.0, "lng_max": 140.0, "middle_area_code": "Y05"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    /// どの問い合わせにも失敗する DB
    struct BrokenDb;

    #[async_trait]
    impl Database for BrokenDb {
        fn dialect(&self) -> Dialect {
            Dialect::MySql
        }

        async fn read(&self, _sql: &str, _params: &[SqlValue]) -> Result<Vec<Row>, DbError> {
            Err(DbError::Proxy {
                status: 502,
                body: "upstream password rejected".to_string(),
            })
        }

        async fn write(&self, _statements: Vec<Statement>) -> Result<u64, DbError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn failing_query_hides_the_cause_from_the_caller() {
        let sink = Arc::new(RecordingSink::default());
        let response = app(Arc::new(BrokenDb), sink.clone())
            .oneshot(post_json("/restaurants/search", Some(FRONT), search_body()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], FRONT);
        let body = body_of(response).await;
        assert!(!body.contains("password"));
        let reports = sink.reports().await;
        assert_eq!(reports[0].0, "restaurants.search");
        assert!(reports[0].1.contains("upstream password rejected"));
    }
}
