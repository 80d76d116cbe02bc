use axum::{middleware::from_fn_with_state, Router};

use super::{generate_rest_endpoint, ModelDescriptor};
use crate::auth::TokenService;
use crate::database::Resource;
use crate::middleware::require_auth;

/// Collects generated endpoints into one router, wrapping auth-required
/// models in the bearer-token gate.
pub struct RestRegistry {
    router: Router,
    tokens: TokenService,
}

impl RestRegistry {
    pub fn new(tokens: TokenService) -> Self {
        Self {
            router: Router::new(),
            tokens,
        }
    }

    pub fn register<T: Resource>(mut self, descriptor: ModelDescriptor<T>) -> Self {
        let path = descriptor.path().to_string();
        let requires_auth = descriptor.is_auth_required();

        let mut routes = generate_rest_endpoint(descriptor);
        if requires_auth {
            routes = routes.route_layer(from_fn_with_state(self.tokens.clone(), require_auth));
        }

        tracing::info!("Mounted REST endpoint {} (auth required: {})", path, requires_auth);
        self.router = self.router.merge(routes);
        self
    }

    pub fn into_router(self) -> Router {
        self.router
    }
}
