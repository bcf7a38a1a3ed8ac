use std::sync::Arc;

use anyhow::bail;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use keystone_core::Application;
use utoipa::openapi::OpenApi as Document;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_scalar::{Scalar, Servable};
use utoipa_swagger_ui::Config;

use crate::stats::{self, ApiStats};

pub const SWAGGER_PATH: &str = "/api";
pub const SPEC_PATH: &str = "/api-json";
pub const REFERENCE_PATH: &str = "/docs";

pub const STAFF_AUTH: &str = "staff-auth";
pub const USER_AUTH: &str = "user-auth";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Keystone API",
        description = "The API description for backend",
        version = "1.0"
    ),
    modifiers(&BearerAuth)
)]
pub struct MainApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut Document) {
        let components = openapi.components.get_or_insert_with(Default::default);

        for name in [STAFF_AUTH, USER_AUTH] {
            components.add_security_scheme(
                name,
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Enter JWT token"))
                        .build(),
                ),
            );
        }
    }
}

// `$spec` is replaced with the serialized document by utoipa-scalar.
const SCALAR_HTML: &str = r#"<!doctype html>
<html>
<head>
    <title>Keystone API Reference</title>
    <meta charset="utf-8"/>
    <meta name="viewport" content="width=device-width, initial-scale=1"/>
</head>
<body>
<script id="api-reference" type="application/json" data-configuration="{&quot;theme&quot;:&quot;deepSpace&quot;}">
$spec
</script>
<script src="https://cdn.jsdelivr.net/npm/@scalar/api-reference"></script>
</body>
</html>
"#;

/// The generated description of every controller route.
///
/// Built once from the application's route table after all controllers are
/// registered. Routes registered later are not reflected.
#[derive(Clone)]
pub struct ApiDocument {
    openapi: Document,
}

impl ApiDocument {
    pub fn build(app: &Application) -> anyhow::Result<Self> {
        let mut openapi = MainApiDoc::openapi();
        openapi.merge(app.openapi());

        for route in app.route_table() {
            let documented = openapi.paths.paths.get(&route.path).is_some_and(|item| {
                keystone_core::openapi::operations(item)
                    .iter()
                    .any(|(method, _)| *method == route.method)
            });

            if !documented {
                bail!(
                    "route `{} {}` of {} has no documented operation",
                    route.method,
                    route.path,
                    route.controller
                );
            }
        }

        Ok(ApiDocument { openapi })
    }

    pub fn openapi(&self) -> &Document {
        &self.openapi
    }

    /// Declared `(method, path template)` pairs.
    pub fn operations(&self) -> Vec<(Method, String)> {
        self.openapi
            .paths
            .paths
            .iter()
            .flat_map(|(path, item)| {
                keystone_core::openapi::operations(item)
                    .into_iter()
                    .map(move |(method, _)| (method, path.clone()))
            })
            .collect()
    }
}

type SwaggerConfig = Arc<Config<'static>>;

/// Swagger UI answering at `/api` itself as well as under `/api/`, with the
/// raw document at `/api-json`.
fn swagger_ui(openapi: Document) -> Router {
    let config = Arc::new(Config::new([SPEC_PATH]).persist_authorization(true));

    Router::new()
        .route(SWAGGER_PATH, get(swagger_index))
        .route(&format!("{SWAGGER_PATH}/"), get(swagger_index))
        .route(&format!("{SWAGGER_PATH}/{{*file}}"), get(swagger_file))
        .with_state(config)
        .route(
            SPEC_PATH,
            get(move || {
                let openapi = openapi.clone();
                async move { Json(openapi) }
            }),
        )
}

async fn swagger_index(State(config): State<SwaggerConfig>) -> Response {
    serve_swagger("", config)
}

async fn swagger_file(Path(file): Path<String>, State(config): State<SwaggerConfig>) -> Response {
    serve_swagger(&file, config)
}

fn serve_swagger(file: &str, config: SwaggerConfig) -> Response {
    match utoipa_swagger_ui::serve(file, config) {
        Ok(Some(asset)) => {
            let body = if asset.content_type.starts_with("text/html") {
                // Asset links are relative to `/api/`; the page is also served at `/api`.
                String::from_utf8_lossy(&asset.bytes)
                    .replace("=\"./", &format!("=\"{SWAGGER_PATH}/"))
                    .into_bytes()
            } else {
                asset.bytes.into_owned()
            };

            ([(header::CONTENT_TYPE, asset.content_type)], body).into_response()
        }
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            tracing::error!("cannot serve swagger ui file `{}`: {}", file, err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Exposes one document three ways: Swagger UI at `/api` (raw JSON at
/// `/api-json`), the Scalar reference at `/docs`, and the request stats
/// middleware.
pub fn mount_api_docs(app: &mut Application) -> anyhow::Result<ApiDocument> {
    let document = ApiDocument::build(app)?;

    app.mount(swagger_ui(document.openapi().clone()));

    app.mount(
        Scalar::with_url(REFERENCE_PATH, document.openapi().clone()).custom_html(SCALAR_HTML),
    );

    let api_stats = ApiStats::new(&document);
    app.mount(stats::routes(api_stats.clone()));
    app.layer(
        "api-stats",
        axum::middleware::from_fn_with_state(api_stats, stats::record),
    );

    tracing::info!(
        operations = document.operations().len(),
        "API docs mounted at {} and {}",
        SWAGGER_PATH,
        REFERENCE_PATH
    );

    Ok(document)
}
