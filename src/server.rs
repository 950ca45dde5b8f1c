use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, patch, post, put},
    Router,
};
use sqlx::PgPool;
use std::future::{Future, IntoFuture};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::TokenService;
use crate::config::AppConfig;
use crate::database::models::{MOVIES_READ, MOVIES_WRITE};
use crate::database::Repositories;
use crate::handlers::{fallback, health, movies, tokens, users};
use crate::mailer::Mailer;
use crate::middleware::{
    authenticate, handle_panic, rate_limit, real_ip, require_authenticated_user, require_permission, PermissionGate,
    RateLimiter,
};

/// Everything a handler can reach. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repos: Repositories,
    pub tokens: TokenService,
    pub mailer: Mailer,
    pub pool: Option<PgPool>,
    pub tasks: TaskTracker,
}

impl AppState {
    pub fn new(config: AppConfig, repos: Repositories, mailer: Mailer, pool: Option<PgPool>) -> Self {
        let tokens = TokenService::new(repos.tokens.clone(), repos.users.clone());
        Self {
            config: Arc::new(config),
            repos,
            tokens,
            mailer,
            pool,
            tasks: TaskTracker::new(),
        }
    }

    /// Runs `fut` detached from the request, counted by the shutdown
    /// tracker. A panic inside it is logged and goes no further.
    pub fn spawn_background<F>(&self, name: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(async move {
            if let Err(e) = tokio::spawn(fut).await {
                if e.is_panic() {
                    tracing::error!(task = name, "background task panicked");
                } else {
                    tracing::warn!(task = name, error = %e, "background task cancelled");
                }
            }
        });
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(%origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::PUT, Method::PATCH, Method::DELETE])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    )
}

/// Builds the application. Layers, outermost first: tracing, panic
/// recovery, CORS, client IP resolution, rate limiting, authentication.
/// Authorization is attached per route.
pub fn router(state: AppState, limiter: Option<Arc<RateLimiter>>) -> Router {
    let read = PermissionGate::new(state.repos.permissions.clone(), MOVIES_READ);
    let write = PermissionGate::new(state.repos.permissions.clone(), MOVIES_WRITE);

    let routes = Router::new()
        .route("/v1/healthcheck", get(health::healthcheck))
        .route(
            "/v1/movies",
            get(movies::list_movies)
                .route_layer(from_fn_with_state(read.clone(), require_permission))
                .merge(post(movies::create_movie).route_layer(from_fn_with_state(write.clone(), require_permission))),
        )
        .route(
            "/v1/movies/:id",
            get(movies::show_movie)
                .route_layer(from_fn_with_state(read, require_permission))
                .merge(
                    patch(movies::update_movie)
                        .delete(movies::delete_movie)
                        .route_layer(from_fn_with_state(write, require_permission)),
                ),
        )
        .route("/v1/users", post(users::register_user))
        .route("/v1/users/activated", put(users::activate_user))
        .route(
            "/v1/users/me",
            get(users::show_current_user).route_layer(from_fn(require_authenticated_user)),
        )
        .route(
            "/v1/tokens/authentication",
            post(tokens::create_authentication_token).merge(
                delete(tokens::delete_authentication_tokens).route_layer(from_fn(require_authenticated_user)),
            ),
        )
        .fallback(fallback::not_found)
        .with_state(state.clone());

    let mut app = routes
        .layer(from_fn(fallback::method_not_allowed))
        .layer(from_fn_with_state(state.tokens.clone(), authenticate));

    if let Some(limiter) = limiter {
        app = app.layer(from_fn_with_state(limiter, rate_limit));
    }

    app = app.layer(from_fn(real_ip));

    if let Some(cors) = cors_layer(&state.config.security.cors_trusted_origins) {
        app = app.layer(cors);
    }

    app.layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!(signal = "SIGINT", "shutting down server"),
        _ = terminate => tracing::info!(signal = "SIGTERM", "shutting down server"),
    }
}

/// Serves until `shutdown` resolves, then drains. In-flight requests and
/// background tasks share one grace window that starts at the signal;
/// whatever is still running when it closes is abandoned.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cancel = CancellationToken::new();

    let limiter = if state.config.limiter.enabled {
        let limiter = Arc::new(RateLimiter::from_config(&state.config.limiter));
        limiter.spawn_sweeper(&state.tasks, cancel.clone());
        Some(limiter)
    } else {
        None
    };

    let app = router(state.clone(), limiter);
    let addr = listener.local_addr()?;
    tracing::info!(%addr, env = state.config.environment.as_str(), "starting server");

    let stopping = CancellationToken::new();
    let signalled = stopping.clone();
    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown.await;
            signalled.cancel();
        })
        .into_future();
    let mut server = std::pin::pin!(server);

    let grace = state.config.shutdown_grace();
    let deadline = tokio::select! {
        result = &mut server => {
            result?;
            Instant::now() + grace
        }
        _ = stopping.cancelled() => {
            let deadline = Instant::now() + grace;
            match tokio::time::timeout_at(deadline, &mut server).await {
                Ok(result) => result?,
                Err(_) => tracing::warn!(?grace, "in-flight requests still running after grace window, abandoning them"),
            }
            deadline
        }
    };

    cancel.cancel();
    state.tasks.close();
    tracing::info!(pending = state.tasks.len(), "completing background tasks");

    if tokio::time::timeout_at(deadline, state.tasks.wait()).await.is_err() {
        tracing::warn!(?grace, pending = state.tasks.len(), "background tasks still running after grace window");
    }

    tracing::info!(%addr, "stopped server");
    Ok(())
}
