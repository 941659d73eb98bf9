//! Request routing — maps method + path patterns to handler functions.
//!
//! Patterns are literal paths with optional `:name` captures, e.g.
//! `/api/articles/:slug`. Routes are evaluated in registration order; the
//! first method+pattern match wins. A path that matches with the wrong method
//! yields `405`, anything else `404`. Trailing slashes are normalized on both
//! sides, so `/api/articles/` and `/api/articles` are equivalent.

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::json;

use crate::http::{Method, Request, Response, StatusCode};

/// Path parameters captured from `:name` segments.
#[derive(Debug, Default, Clone)]
pub struct PathParams {
    entries: Vec<(String, String)>,
}

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn insert(&mut self, name: String, value: String) {
        self.entries.push((name, value));
    }
}

/// Type-erased async handler stored behind an `Arc` so clones share one
/// allocation across connection tasks.
pub type Handler =
    Arc<dyn Fn(Request, PathParams) -> BoxFuture<'static, Response> + Send + Sync + 'static>;

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Param(String),
}

struct Route {
    method: Method,
    segments: Vec<Segment>,
    handler: Handler,
}

impl Route {
    fn new(method: Method, pattern: &str, handler: Handler) -> Self {
        let segments = split(pattern)
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_owned()),
                None => Segment::Literal(s.to_owned()),
            })
            .collect();
        Self {
            method,
            segments,
            handler,
        }
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let mut params = PathParams::default();
        let mut path_segments = split(path);

        for segment in &self.segments {
            let part = path_segments.next()?;
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => params.insert(name.clone(), part.to_owned()),
            }
        }

        if path_segments.next().is_some() {
            return None;
        }
        Some(params)
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Dispatches requests to registered handlers.
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for `GET` requests matching `pattern`.
    pub fn get<H, F>(&mut self, pattern: &str, handler: H)
    where
        H: Fn(Request, PathParams) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.route(Method::Get, pattern, handler);
    }

    /// Registers a handler for `POST` requests matching `pattern`.
    pub fn post<H, F>(&mut self, pattern: &str, handler: H)
    where
        H: Fn(Request, PathParams) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        self.route(Method::Post, pattern, handler);
    }

    /// Registers a handler for an arbitrary method.
    pub fn route<H, F>(&mut self, method: Method, pattern: &str, handler: H)
    where
        H: Fn(Request, PathParams) -> F + Send + Sync + 'static,
        F: Future<Output = Response> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |request, params| handler(request, params).boxed());
        self.routes.push(Route::new(method, pattern, handler));
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes a request to the first matching handler.
    pub async fn dispatch(&self, request: Request) -> Response {
        let mut path_matched = false;

        for route in &self.routes {
            match route.matches(request.path()) {
                Some(params) if route.method == request.method() => {
                    return (route.handler)(request, params).await;
                }
                Some(_) => path_matched = true,
                None => {}
            }
        }

        if path_matched {
            Response::json(
                StatusCode::MethodNotAllowed,
                &json!({"success": false, "message": "Method Not Allowed"}),
            )
        } else {
            Response::json(
                StatusCode::NotFound,
                &json!({"success": false, "message": "Not Found"}),
            )
        }
    }
}
