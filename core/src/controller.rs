use axum::http::Method;
use axum::routing::MethodRouter;

/// One route declared by a controller, before versioning is applied.
pub struct RouteDefinition {
    pub method: Method,
    pub path: &'static str,
    /// Explicit version of the route, or of its controller. `None` means the
    /// application's default version.
    pub version: Option<&'static str>,
    pub handler: MethodRouter,
}

impl RouteDefinition {
    pub fn new(method: Method, path: &'static str, handler: MethodRouter) -> Self {
        Self {
            method,
            path,
            version: None,
            handler,
        }
    }

    pub fn version(mut self, version: &'static str) -> Self {
        self.version = Some(version);
        self
    }
}

/// Implemented by `#[keystone_macros::controller]`.
///
/// `openapi()` must describe every route returned by `routes()`, keyed by the
/// same unversioned path.
pub trait Controller {
    fn routes() -> Vec<RouteDefinition>;
    fn openapi() -> utoipa::openapi::OpenApi;
}
