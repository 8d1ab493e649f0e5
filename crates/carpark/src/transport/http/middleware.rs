//! Request guards: per-client rate limiting and HTTP basic auth.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use dashmap::DashMap;

/// Key shared by requests that arrive without connection info.
const UNKNOWN_CLIENT: &str = "unknown";

/// Paths reachable without credentials.
const OPEN_PATHS: &[&str] = &["/health-check"];

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by client address.
///
/// A limit of zero disables limiting. Clients whose window has expired are
/// dropped at most once per window.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: DashMap<String, Window>,
    last_sweep: Mutex<Instant>,
}

impl RateLimiter {
    pub fn per_minute(max_requests: u32) -> Self {
        Self::with_window(max_requests, Duration::from_secs(60))
    }

    pub fn with_window(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: DashMap::new(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0
    }

    /// Count one request for `client`. Returns false once the window is spent.
    pub fn try_acquire(&self, client: &str) -> bool {
        if !self.is_enabled() {
            return true;
        }

        let now = Instant::now();
        self.evict_expired(now);

        let mut entry = self
            .clients
            .entry(client.to_string())
            .or_insert(Window {
                started: now,
                count: 0,
            });

        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }

        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Number of clients currently holding a window.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    fn evict_expired(&self, now: Instant) {
        // Skip when another request is already sweeping.
        let Ok(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if now.duration_since(*last_sweep) < self.window {
            return;
        }
        *last_sweep = now;

        let before = self.clients.len();
        self.clients
            .retain(|_, window| now.duration_since(window.started) < self.window);
        let evicted = before.saturating_sub(self.clients.len());
        if evicted > 0 {
            tracing::debug!(evicted, "Dropped expired rate limit windows");
        }
    }
}

fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_key(&request);
    if !limiter.try_acquire(&client) {
        tracing::warn!(client = %client, path = %request.uri().path(), "Too many requests");
        return (StatusCode::TOO_MANY_REQUESTS, "Too many requests").into_response();
    }
    next.run(request).await
}

/// Username and password accepted by basic auth.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both halves set, or nothing.
    pub fn from_parts(username: Option<String>, password: Option<String>) -> Option<Self> {
        match (username, password) {
            (Some(username), Some(password)) => Some(Self::new(username, password)),
            _ => None,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Check an `Authorization` header value.
    pub fn verify(&self, header_value: &str) -> bool {
        let Some(encoded) = header_value.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(decoded) = String::from_utf8(decoded) else {
            return false;
        };
        decoded
            .split_once(':')
            .is_some_and(|(user, pass)| user == self.username && pass == self.password)
    }
}

pub async fn basic_auth(
    State(credentials): State<Arc<Credentials>>,
    request: Request,
    next: Next,
) -> Response {
    if OPEN_PATHS.contains(&request.uri().path()) {
        return next.run(request).await;
    }

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| credentials.verify(value));

    if !authorized {
        tracing::debug!(path = %request.uri().path(), "Rejected unauthenticated request");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"carpark\"")],
            "Unauthorized",
        )
            .into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(user: &str, pass: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
    }

    #[test]
    fn limiter_blocks_after_max() {
        let limiter = RateLimiter::per_minute(3);
        assert!(limiter.try_acquire("10.0.0.1"));
        assert!(limiter.try_acquire("10.0.0.1"));
        assert!(limiter.try_acquire("10.0.0.1"));
        assert!(!limiter.try_acquire("10.0.0.1"));
    }

    #[test]
    fn limiter_counts_clients_separately() {
        let limiter = RateLimiter::per_minute(1);
        assert!(limiter.try_acquire("10.0.0.1"));
        assert!(limiter.try_acquire("10.0.0.2"));
        assert!(!limiter.try_acquire("10.0.0.1"));
    }

    #[test]
    fn limiter_resets_after_window() {
        let limiter = RateLimiter::with_window(1, Duration::from_millis(20));
        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("a"));

        std::thread::sleep(Duration::from_millis(40));

        assert!(limiter.try_acquire("a"));
    }

    #[test]
    fn limiter_drops_expired_clients() {
        let limiter = RateLimiter::with_window(5, Duration::from_millis(20));
        assert!(limiter.try_acquire("10.0.0.1"));
        assert!(limiter.try_acquire("10.0.0.2"));
        assert_eq!(limiter.tracked_clients(), 2);

        std::thread::sleep(Duration::from_millis(40));

        assert!(limiter.try_acquire("10.0.0.3"));
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn limiter_keeps_clients_inside_their_window() {
        let limiter = RateLimiter::per_minute(5);
        for i in 0..10 {
            assert!(limiter.try_acquire(&format!("10.0.0.{i}")));
        }
        assert_eq!(limiter.tracked_clients(), 10);
    }

    #[test]
    fn zero_limit_disables() {
        let limiter = RateLimiter::per_minute(0);
        assert!(!limiter.is_enabled());
        for _ in 0..1000 {
            assert!(limiter.try_acquire("a"));
        }
    }

    #[test]
    fn credentials_need_both_parts() {
        assert!(Credentials::from_parts(Some("admin".into()), None).is_none());
        assert!(Credentials::from_parts(None, Some("secret".into())).is_none());
        let creds = Credentials::from_parts(Some("admin".into()), Some("secret".into())).unwrap();
        assert_eq!(creds.username(), "admin");
    }

    #[test]
    fn credentials_verify_header() {
        let creds = Credentials::new("admin", "s3:cret");
        assert!(creds.verify(&basic("admin", "s3:cret")));
        assert!(!creds.verify(&basic("admin", "wrong")));
        assert!(!creds.verify(&basic("other", "s3:cret")));
        assert!(!creds.verify("Bearer abc"));
        assert!(!creds.verify("Basic not-base64!!"));
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("admin", "secret");
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("secret"));
    }
}
