use std::collections::BTreeSet;
use std::io::Write;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode, Uri, header};
use axum::{Form, Json, Router};
use keystone::bootstrap::assemble;
use keystone::config::{AppConfig, BODY_LIMIT};
use keystone_core::AppModule;
use keystone_core::config::{ConfigBuilder, Env};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower::ServiceExt;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Deserialize, utoipa::ToSchema)]
pub struct Payload {
    pub data: String,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct Received {
    pub bytes: usize,
}

pub struct ItemsController;

#[keystone_macros::controller]
impl ItemsController {
    #[keystone_macros::get("/items/{id}")]
    pub async fn find(uri: Uri) -> String {
        format!("found {}", uri.path())
    }

    #[keystone_macros::post("/items")]
    #[keystone_macros::secured("staff-auth")]
    #[keystone_macros::utoipa_response(Received)]
    pub async fn create(Json(payload): Json<Payload>) -> Json<Received> {
        Json(Received {
            bytes: payload.data.len(),
        })
    }

    #[keystone_macros::post("/items/form")]
    #[keystone_macros::utoipa_response(status = 200, body = Received, description = "Form accepted")]
    pub async fn submit(Form(payload): Form<Payload>) -> Json<Received> {
        Json(Received {
            bytes: payload.data.len(),
        })
    }

    #[keystone_macros::get("/items/latest")]
    #[keystone_macros::version("3")]
    pub async fn latest() -> &'static str {
        "latest"
    }
}

pub struct LegacyController;

#[keystone_macros::controller(version = "2")]
impl LegacyController {
    #[keystone_macros::get("/items/{id}")]
    pub async fn find() -> &'static str {
        "legacy"
    }
}

pub struct PingController;

#[keystone_macros::controller]
impl PingController {
    #[keystone_macros::post("/ping")]
    pub async fn ping() -> &'static str {
        "pong"
    }
}

pub struct ShadowController;

#[keystone_macros::controller(version = "1")]
impl ShadowController {
    #[keystone_macros::get("/items/{id}")]
    pub async fn find() -> &'static str {
        "shadow"
    }
}

fn config(pairs: &[(&str, &str)]) -> AppConfig {
    AppConfig::build(&Env::from_pairs(pairs.iter().copied())).unwrap()
}

fn module() -> AppModule {
    AppModule::new()
        .controller::<ItemsController>()
        .controller::<LegacyController>()
}

fn router(pairs: &[(&str, &str)]) -> Router {
    assemble(module(), &config(pairs))
        .unwrap()
        .into_router()
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    (status, headers, body.to_vec())
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn paths(document: &Value) -> BTreeSet<String> {
    document["paths"]
        .as_object()
        .expect("document has paths")
        .keys()
        .cloned()
        .collect()
}

#[tokio::test]
async fn unversioned_routes_are_served_under_v1() {
    let router = router(&[]);

    let (status, _, body) = send(&router, get("/v1/items/7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"found /v1/items/7");

    let (status, _, _) = send(&router, get("/items/7")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn explicit_versions_override_the_default() {
    let router = router(&[]);

    let (status, _, body) = send(&router, get("/v2/items/7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"legacy");

    let (status, _, body) = send(&router, get("/v3/items/latest")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"latest");

    let (status, _, _) = send(&router, get("/v1/items/latest")).await;
    assert_eq!(status, StatusCode::OK, "falls through to /v1/items/{{id}}");
}

#[tokio::test]
async fn json_body_of_exactly_the_limit_is_accepted() {
    let router = router(&[]);
    let overhead = r#"{"data":""}"#.len();
    let body = format!(r#"{{"data":"{}"}}"#, "a".repeat(BODY_LIMIT - overhead));
    assert_eq!(body.len(), BODY_LIMIT);

    let request = Request::post("/v1/items")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap();
    let (status, _, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::OK);
    let received: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(received["bytes"], BODY_LIMIT - overhead);
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let router = router(&[]);

    let overhead = r#"{"data":""}"#.len();
    let json = format!(r#"{{"data":"{}"}}"#, "a".repeat(BODY_LIMIT - overhead + 1));
    let request = Request::post("/v1/items")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json))
        .unwrap();
    let (status, _, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let form = format!("data={}", "a".repeat(BODY_LIMIT));
    let request = Request::post("/v1/items/form")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form))
        .unwrap();
    let (status, _, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn oversized_bodies_are_rejected_even_when_the_handler_ignores_them() {
    let router = assemble(AppModule::new().controller::<PingController>(), &config(&[]))
        .unwrap()
        .into_router()
        .unwrap();

    let body = "a".repeat(BODY_LIMIT + 10);
    let request = Request::post("/v1/ping")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len())
        .body(Body::from(body))
        .unwrap();
    let (status, _, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);

    let request = Request::post("/v1/ping")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, _, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"pong");
}

#[tokio::test]
async fn url_encoded_bodies_are_parsed() {
    let router = router(&[]);

    let request = Request::post("/v1/items/form")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("data=hello"))
        .unwrap();
    let (status, _, body) = send(&router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, br#"{"bytes":5}"#);
}

#[tokio::test]
async fn swagger_and_reference_share_one_document() {
    let router = router(&[]);

    let (status, _, document) = send(&router, get("/api-json")).await;
    assert_eq!(status, StatusCode::OK);
    let document: Value = serde_json::from_slice(&document).unwrap();

    for uri in ["/api", "/api/"] {
        let (status, headers, _) = send(&router, get(uri)).await;
        assert_eq!(status, StatusCode::OK, "GET {uri}");
        assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/html"));
    }

    let (status, _, initializer) = send(&router, get("/api/swagger-initializer.js")).await;
    assert_eq!(status, StatusCode::OK);
    let initializer = String::from_utf8(initializer).unwrap();
    assert!(initializer.contains("/api-json"), "{initializer}");

    let (status, _, page) = send(&router, get("/docs")).await;
    assert_eq!(status, StatusCode::OK);
    let page = String::from_utf8(page).unwrap();
    assert!(page.contains("deepSpace"));

    let (_, embedded) = page
        .split_once(r#"type="application/json""#)
        .expect("reference page embeds the document");
    let (_, embedded) = embedded.split_once('>').unwrap();
    let (embedded, _) = embedded.split_once("</script>").unwrap();
    let embedded: Value = serde_json::from_str(embedded.trim()).unwrap();

    assert_eq!(paths(&document), paths(&embedded));
    assert_eq!(
        paths(&document),
        BTreeSet::from([
            "/v1/items".to_string(),
            "/v1/items/form".to_string(),
            "/v1/items/{id}".to_string(),
            "/v2/items/{id}".to_string(),
            "/v3/items/latest".to_string(),
        ])
    );
}

#[tokio::test]
async fn document_advertises_bearer_schemes_and_route_security() {
    let router = router(&[]);
    let (_, _, document) = send(&router, get("/api-json")).await;
    let document: Value = serde_json::from_slice(&document).unwrap();

    let schemes = document["components"]["securitySchemes"].as_object().unwrap();
    assert_eq!(
        schemes.keys().cloned().collect::<Vec<_>>(),
        vec!["staff-auth".to_string(), "user-auth".to_string()]
    );
    for scheme in schemes.values() {
        assert_eq!(scheme["type"], "http");
        assert_eq!(scheme["scheme"], "bearer");
        assert_eq!(scheme["bearerFormat"], "JWT");
    }

    assert_eq!(document["info"]["version"], "1.0");
    assert_eq!(
        document["paths"]["/v1/items"]["post"]["security"],
        serde_json::json!([{ "staff-auth": [] }])
    );
}

#[tokio::test]
async fn stats_correlate_requests_with_declared_routes() {
    let router = router(&[]);

    send(&router, get("/v1/items/1")).await;
    send(&router, get("/v1/items/2")).await;
    send(&router, get("/v2/items/3")).await;
    send(&router, get("/not-declared")).await;

    let (status, _, body) = send(&router, get("/api-stats")).await;
    assert_eq!(status, StatusCode::OK);
    let stats: Value = serde_json::from_slice(&body).unwrap();

    assert_eq!(stats["operations"]["GET /v1/items/{id}"]["requests"], 2);
    assert_eq!(stats["operations"]["GET /v2/items/{id}"]["requests"], 1);
    assert_eq!(stats["operations"]["POST /v1/items"]["requests"], 0);
    assert_eq!(stats["unmatched"], 1);
    assert_eq!(stats["requests"], 4);
}

#[tokio::test]
async fn stats_count_cors_preflight_requests() {
    let router = router(&[]);

    let request = Request::options("/v1/items/7")
        .header(header::ORIGIN, "https://anywhere.example")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

    let (_, _, body) = send(&router, get("/api-stats")).await;
    let stats: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(stats["requests"], 1);
    assert_eq!(stats["unmatched"], 1);
}

#[tokio::test]
async fn responses_are_compressed_and_open_to_any_origin() {
    let router = router(&[]);

    let request = Request::get("/api-json")
        .header(header::ACCEPT_ENCODING, "gzip")
        .header(header::ORIGIN, "https://anywhere.example")
        .body(Body::empty())
        .unwrap();
    let (status, headers, _) = send(&router, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_ENCODING], "gzip");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn colliding_versioned_routes_fail_startup() {
    let module = AppModule::new()
        .controller::<ItemsController>()
        .controller::<ShadowController>();

    let err = assemble(module, &config(&[]))
        .unwrap()
        .into_router()
        .err()
        .expect("two controllers serve GET /v1/items/{id}");

    assert!(err.to_string().contains("/v1/items/{id}"));
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

async fn access_log_output(pairs: &[(&str, &str)]) -> String {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let router = router(pairs);
    send(&router, get("/v1/items/7")).await;

    logs.contents()
}

#[tokio::test]
async fn access_log_only_in_development() {
    let output = access_log_output(&[("NODE_ENV", "development")]).await;
    let line = output
        .lines()
        .find(|line| line.contains("keystone::access"))
        .expect("development requests are logged");
    assert!(line.contains("GET /v1/items/7 200"), "{line}");
    assert!(line.contains(" ms - "), "{line}");

    for pairs in [
        &[("NODE_ENV", "production")][..],
        &[("NODE_ENV", "Development")][..],
        &[("NODE_ENV", "test")][..],
        &[][..],
    ] {
        let output = access_log_output(pairs).await;
        assert!(!output.contains("GET /v1/items/7"), "{pairs:?}: {output}");
    }
}

#[test]
fn access_log_middleware_is_not_registered_outside_development() {
    let app = assemble(module(), &config(&[("NODE_ENV", "production")])).unwrap();
    assert!(!app.middleware_names().contains(&"access-log"));

    let app = assemble(module(), &config(&[("NODE_ENV", "development")])).unwrap();
    assert_eq!(
        app.middleware_names(),
        vec!["compression", "body-parser", "api-stats", "access-log", "cors"]
    );
}
