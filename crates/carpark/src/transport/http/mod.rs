//! HTTP transport: routes, request guards and the server loop.

pub mod middleware;
pub mod routes;
pub mod server;

pub use middleware::{Credentials, RateLimiter};
pub use routes::{API_BASE, routes};
pub use server::{ServerConfig, app, serve};
