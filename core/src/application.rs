use std::collections::HashSet;
use std::convert::Infallible;

use anyhow::bail;
use axum::extract::{DefaultBodyLimit, Request};
use axum::http::{Method, Uri};
use axum::response::IntoResponse;
use axum::routing::Route;
use axum::{Extension, Router};
use tower::{Layer, Service, ServiceBuilder};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::openapi::{OpenApi, OpenApiBuilder};

use crate::module::AppModule;
use crate::openapi;
use crate::response::ApiError;
use crate::versioning::VersioningOptions;

type Middleware = Box<dyn FnOnce(Router) -> Router + Send>;

/// A registered route as it is served: method, final path and the version it
/// resolved to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteInfo {
    pub method: Method,
    pub path: String,
    pub version: Option<String>,
    pub controller: &'static str,
}

/// The HTTP application under construction.
///
/// Created from an [`AppModule`], configured with cross-cutting middleware and
/// extra mounts, then turned into an [`axum::Router`] by [`into_router`].
/// Middleware wraps every route, mounts included, and the first registered
/// middleware is the outermost one.
///
/// [`into_router`]: Application::into_router
pub struct Application {
    module: AppModule,
    versioning: Option<VersioningOptions>,
    mounts: Vec<Router>,
    middleware: Vec<(&'static str, Middleware)>,
}

impl Application {
    pub fn create(module: AppModule) -> anyhow::Result<Self> {
        let mut declared = HashSet::new();

        for entry in &module.controllers {
            for route in &entry.routes {
                if !route.path.starts_with('/') {
                    bail!(
                        "route `{} {}` in {} must start with `/`",
                        route.method,
                        route.path,
                        entry.name
                    );
                }

                if !declared.insert((route.method.clone(), route.path, route.version)) {
                    bail!(
                        "route `{} {}` is declared twice (last in {})",
                        route.method,
                        route.path,
                        entry.name
                    );
                }
            }
        }

        tracing::debug!(
            controllers = module.controllers.len(),
            routes = module.route_count(),
            "application created"
        );

        Ok(Application {
            module,
            versioning: None,
            mounts: Vec::new(),
            middleware: Vec::new(),
        })
    }

    pub fn use_compression(&mut self) -> &mut Self {
        self.layer("compression", CompressionLayer::new())
    }

    /// Caps request bodies at `limit` bytes. A declared `Content-Length` over
    /// the limit is answered with `413 Payload Too Large` before any handler
    /// runs. Streamed bodies fail the same way once the body extractors read
    /// past the limit.
    pub fn use_body_parser(&mut self, limit: usize) -> &mut Self {
        let body_limit = ServiceBuilder::new()
            .layer(RequestBodyLimitLayer::new(limit))
            .layer(DefaultBodyLimit::max(limit));

        self.layer("body-parser", body_limit)
    }

    pub fn enable_cors(&mut self, origin: AllowOrigin) -> &mut Self {
        let cors = CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([
                Method::GET,
                Method::HEAD,
                Method::PUT,
                Method::PATCH,
                Method::POST,
                Method::DELETE,
            ])
            .allow_headers(Any);

        self.layer("cors", cors)
    }

    pub fn enable_versioning(&mut self, versioning: VersioningOptions) -> &mut Self {
        self.versioning = Some(versioning);
        self
    }

    pub fn extension<T>(&mut self, value: T) -> &mut Self
    where
        T: Clone + Send + Sync + 'static,
    {
        self.layer("extension", Extension(value))
    }

    /// Merges `router` next to the controller routes. Mounted routes are not
    /// versioned and do not appear in [`Application::openapi`].
    pub fn mount(&mut self, router: impl Into<Router>) -> &mut Self {
        self.mounts.push(router.into());
        self
    }

    pub fn layer<L>(&mut self, name: &'static str, layer: L) -> &mut Self
    where
        L: Layer<Route> + Clone + Send + Sync + 'static,
        L::Service: Service<Request> + Clone + Send + Sync + 'static,
        <L::Service as Service<Request>>::Response: IntoResponse + 'static,
        <L::Service as Service<Request>>::Error: Into<Infallible> + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        tracing::debug!(middleware = name, "middleware registered");

        self.middleware
            .push((name, Box::new(move |router: Router| router.layer(layer))));
        self
    }

    pub fn middleware_names(&self) -> Vec<&'static str> {
        self.middleware.iter().map(|(name, _)| *name).collect()
    }

    fn resolve_path(&self, version: Option<&'static str>, path: &str) -> (String, Option<String>) {
        match &self.versioning {
            Some(versioning) => (
                versioning.versioned_path(version, path),
                Some(versioning.resolve(version).to_string()),
            ),
            None => (path.to_string(), None),
        }
    }

    /// Every controller route, as it will be served.
    pub fn route_table(&self) -> Vec<RouteInfo> {
        self.module
            .controllers
            .iter()
            .flat_map(|entry| {
                entry.routes.iter().map(|route| {
                    let (path, version) = self.resolve_path(route.version, route.path);

                    RouteInfo {
                        method: route.method.clone(),
                        path,
                        version,
                        controller: entry.name,
                    }
                })
            })
            .collect()
    }

    /// The controllers' OpenAPI fragments merged into one, with every path
    /// rewritten to the path it is served at.
    pub fn openapi(&self) -> OpenApi {
        let mut merged = OpenApiBuilder::new().build();

        for entry in &self.module.controllers {
            let mut fragment = entry.openapi.clone();
            let paths = std::mem::take(&mut fragment.paths.paths);
            merged.merge(fragment);

            for (path, item) in paths {
                for (method, operation) in openapi::operations(&item) {
                    let Some(http_method) = openapi::http_method(&method) else {
                        continue;
                    };

                    let version = entry
                        .routes
                        .iter()
                        .find(|route| route.path == path && route.method == method)
                        .and_then(|route| route.version);
                    let (served_at, _) = self.resolve_path(version, &path);

                    merged
                        .paths
                        .add_path_operation(served_at, vec![http_method], operation.clone());
                }
            }
        }

        merged
    }

    pub fn into_router(self) -> anyhow::Result<Router> {
        let mut served = HashSet::new();
        let mut router = Router::new();

        for info in self.route_table() {
            if !served.insert((info.method.clone(), info.path.clone())) {
                bail!(
                    "route `{} {}` from {} collides with another route",
                    info.method,
                    info.path,
                    info.controller
                );
            }
        }

        for entry in self.module.controllers {
            for route in entry.routes {
                let path = match &self.versioning {
                    Some(versioning) => versioning.versioned_path(route.version, route.path),
                    None => route.path.to_string(),
                };

                router = router.route(&path, route.handler);
            }
        }

        for mount in self.mounts {
            router = router.merge(mount);
        }

        router = router.fallback(not_found);

        for (_, middleware) in self.middleware.into_iter().rev() {
            router = middleware(router);
        }

        Ok(router)
    }
}

async fn not_found(method: Method, uri: Uri) -> ApiError {
    ApiError::not_found(format!("Cannot {} {}", method, uri.path()))
}
