//! Art Deco Server - HTTP REST API for the artwork item store
//!
//! Exposes [`artdeco::ItemRepository`] over HTTP with axum.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! - `GET /` - `{"status": "OK"}`
//! - `GET /health`, `GET /ready` - Liveness and readiness probes
//! - `GET /stats` - Repository counters
//! - `POST /items` - Create an item (multipart)
//! - `GET|PUT|DELETE /items/{id}` - Read, replace (multipart) or delete an item
//! - `GET|PUT /items/{id}/{title,author,description}` - Single text fields
//! - `GET|PUT /items/{id}/embedding` - Base64 embedding
//! - `GET|PUT /items/{id}/image` - Raw image bytes
//! - `POST /items/search` - Top-K similarity search (form: `embedding`, `k`)
//! - `GET /items/find?field=&q=&mode=&limit=` - Text field lookup

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
