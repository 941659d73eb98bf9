//! Application wiring and the JSON endpoint handlers.
//!
//! [`App`] owns the service graph — connection cache, auth, content, jobs —
//! and builds the route table over it. Every store-backed handler path
//! reaches the store exclusively through
//! [`ConnectionCache::acquire`](crate::store::ConnectionCache::acquire).

use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::auth::{AuthService, InMemoryBackend, SignInRequest, SignOutRequest, SignUpRequest};
use crate::config::Config;
use crate::content::{ContentService, StaticContent};
use crate::email::{EmailService, LogMailer};
use crate::http::{Response, StatusCode};
use crate::jobs::{JobQueue, StaticIntroWriter};
use crate::router::Router;
use crate::store::{ConnectionCache, TcpConnector};

/// Shared application state behind every handler.
pub struct App {
    store: Arc<ConnectionCache>,
    auth: AuthService,
    content: ContentService,
}

impl App {
    /// Assembles state from explicitly injected services. Tests use this to
    /// swap any collaborator for a double.
    pub fn new(
        store: Arc<ConnectionCache>,
        auth: AuthService,
        content: ContentService,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            auth,
            content,
        })
    }

    /// Default service graph: TCP store connector, in-memory credential
    /// backend, built-in article set, log mail transport, and the background
    /// worker. Returns the app alongside the worker's join handle.
    pub fn bootstrap(config: &Config) -> (Arc<Self>, JoinHandle<()>) {
        let store = Arc::new(ConnectionCache::new(
            config.store_uri.clone(),
            Arc::new(TcpConnector),
        ));
        let email = EmailService::new(
            Arc::new(LogMailer),
            config.smtp_sender.clone(),
            config.site_name.clone(),
        );
        let (jobs, worker) = JobQueue::start(email, Arc::new(StaticIntroWriter));
        let auth = AuthService::new(
            Arc::clone(&store),
            Arc::new(InMemoryBackend::default()),
            jobs,
        );
        let content = ContentService::new(Arc::new(StaticContent::sample()));

        (Self::new(store, auth, content), worker)
    }

    /// Builds the API route table over this state.
    pub fn router(self: &Arc<Self>) -> Router {
        let mut router = Router::new();

        let app = Arc::clone(self);
        router.post("/api/auth/sign-up", move |request, _params| {
            let app = Arc::clone(&app);
            async move {
                match request.json::<SignUpRequest>() {
                    Ok(payload) => {
                        Response::json(StatusCode::Ok, &app.auth.sign_up_with_email(payload).await)
                    }
                    Err(err) => malformed(err),
                }
            }
        });

        let app = Arc::clone(self);
        router.post("/api/auth/sign-in", move |request, _params| {
            let app = Arc::clone(&app);
            async move {
                match request.json::<SignInRequest>() {
                    Ok(payload) => {
                        Response::json(StatusCode::Ok, &app.auth.sign_in_with_email(payload).await)
                    }
                    Err(err) => malformed(err),
                }
            }
        });

        let app = Arc::clone(self);
        router.post("/api/auth/sign-out", move |request, _params| {
            let app = Arc::clone(&app);
            async move {
                match request.json::<SignOutRequest>() {
                    Ok(payload) => {
                        Response::json(StatusCode::Ok, &app.auth.sign_out(payload).await)
                    }
                    Err(err) => malformed(err),
                }
            }
        });

        let app = Arc::clone(self);
        router.get("/api/articles", move |_request, _params| {
            let app = Arc::clone(&app);
            async move { Response::json(StatusCode::Ok, &app.content.all_posts().await) }
        });

        let app = Arc::clone(self);
        router.get("/api/articles/:slug", move |_request, params| {
            let app = Arc::clone(&app);
            async move {
                let slug = params.get("slug").unwrap_or("");
                match app.content.post_by_slug(slug).await {
                    Some(article) => Response::json(StatusCode::Ok, &article),
                    None => Response::json(
                        StatusCode::NotFound,
                        &json!({"success": false, "message": "Article not found"}),
                    ),
                }
            }
        });

        let app = Arc::clone(self);
        router.get("/api/health", move |_request, _params| {
            let app = Arc::clone(&app);
            async move {
                Response::json(
                    StatusCode::Ok,
                    &json!({
                        "status": "ok",
                        "storeConnected": app.store.is_connected(),
                    }),
                )
            }
        });

        router
    }
}

fn malformed(err: serde_json::Error) -> Response {
    debug!(error = %err, "rejecting malformed payload");
    Response::json(
        StatusCode::UnprocessableEntity,
        &json!({"success": false, "message": "Malformed payload"}),
    )
}
