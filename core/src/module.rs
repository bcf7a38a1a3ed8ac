use utoipa::openapi::OpenApi;

use crate::controller::{Controller, RouteDefinition};

pub(crate) struct ControllerEntry {
    pub(crate) name: &'static str,
    pub(crate) routes: Vec<RouteDefinition>,
    pub(crate) openapi: OpenApi,
}

/// The module graph an [`Application`](crate::Application) is created from.
#[derive(Default)]
pub struct AppModule {
    pub(crate) controllers: Vec<ControllerEntry>,
}

impl AppModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn controller<C: Controller>(mut self) -> Self {
        let name = std::any::type_name::<C>();
        let name = name.rsplit("::").next().unwrap_or(name);

        self.controllers.push(ControllerEntry {
            name,
            routes: C::routes(),
            openapi: C::openapi(),
        });
        self
    }

    pub fn route_count(&self) -> usize {
        self.controllers.iter().map(|entry| entry.routes.len()).sum()
    }
}
