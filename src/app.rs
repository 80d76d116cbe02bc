use axum::{extract::DefaultBodyLimit, http::HeaderValue, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::TokenService;
use crate::config::{AppConfig, Environment};
use crate::database::StorageBackend;
use crate::handlers::protected::{upload, UploadOptions};
use crate::handlers::public::{service, session, ServiceState, SessionState};
use crate::middleware::CallerContext;
use crate::models::{Todo, User};
use crate::rest::{ModelDescriptor, PagingDefaults, RestRegistry};

/// Assembles the full application router for `config` on top of `storage`.
pub fn build_app(config: &AppConfig, storage: StorageBackend) -> anyhow::Result<Router> {
    let tokens = TokenService::from_config(&config.security, config.environment);

    let api = Router::new()
        .merge(rest_routes(config, &storage, &tokens)?)
        .merge(session::routes(SessionState {
            users: storage.collection::<User>(),
            tokens: tokens.clone(),
        }))
        .merge(upload::routes(UploadOptions::from_config(&config.uploads)?, tokens));

    let base_path = config.api.base_path.trim_end_matches('/');
    let api = if base_path.is_empty() {
        api
    } else {
        Router::new().nest(base_path, api)
    };

    let mut app = Router::new()
        .merge(service::routes(ServiceState {
            storage,
            api_base_path: base_path.to_string(),
        }))
        .merge(api)
        .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes))
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = cors_layer(config) {
        app = app.layer(cors);
    }

    Ok(app)
}

/// Generated CRUD resources
fn rest_routes(config: &AppConfig, storage: &StorageBackend, tokens: &TokenService) -> anyhow::Result<Router> {
    let paging = PagingDefaults::from_config(&config.api);

    let todos = ModelDescriptor::<Todo>::new("/todo", storage.collection::<Todo>())?
        .with_parent_id_property(CallerContext::USER_ID)?
        .requires_auth(true)
        .with_paging(paging);

    Ok(RestRegistry::new(tokens.clone()).register(todos).into_router())
}

fn cors_layer(config: &AppConfig) -> Option<CorsLayer> {
    if !config.security.enable_cors {
        return None;
    }
    if config.environment == Environment::Development {
        return Some(CorsLayer::permissive());
    }

    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}
