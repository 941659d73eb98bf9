//! # marketpulse
//!
//! Backend service for the MarketPulse finance-content platform: JSON
//! endpoints for email/password auth actions and CMS-backed articles, with a
//! memoized connection cache in front of the backing document store and an
//! in-process background queue for transactional email.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use marketpulse::api::App;
//! use marketpulse::config::Config;
//! use marketpulse::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env();
//!     let (app, _worker) = App::bootstrap(&config);
//!
//!     let server = Server::bind(&config.bind_addr).await?;
//!     println!("listening on http://{}", server.local_addr());
//!     server.serve(app.router()).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod content;
pub mod email;
pub mod http;
pub mod jobs;
pub mod router;
pub mod server;
pub mod store;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use api::App;
pub use config::Config;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use router::Router;
pub use server::{Server, ServerError};
pub use store::{ConnectionCache, StoreError, StoreHandle};
