// src/client/mod.rs

//! Transport client with a lightweight primary path and a browser-rendering
//! fallback.
//!
//! Every outbound request, on either path, first awaits the shared rate
//! limiter. A fetch attempt walks a small state machine: try the primary
//! `reqwest` path; if the response trips [`is_blocked`], retry once through
//! the rendering service when one is configured; report failure otherwise.
//! Failures are returned, not raised as fatal: the caller owns retry policy.

mod api;
mod render;

pub use api::{DiscoverPage, KickstarterApi, ProjectApi, BASE_URL};
pub use render::RenderClient;

use std::sync::Arc;
use std::time::Duration;

use crate::config::ScrapingConfig;
use crate::error::{AppError, Result};
use crate::ratelimit::RateLimiter;

/// Statuses treated as bot-detection/blocking signals.
const BLOCKED_STATUSES: [u16; 3] = [403, 429, 503];

/// Body markers of an interstitial challenge page served with a 2xx status.
const CHALLENGE_MARKERS: [&str; 2] = ["cf-challenge", "Just a moment..."];

/// Blocking-signal predicate over a response, kept explicit so the fallback
/// rule is testable on its own: a blocked status, an empty body where content
/// was expected, or a challenge-page marker in the body.
pub fn is_blocked(status: u16, body: &str) -> bool {
    if BLOCKED_STATUSES.contains(&status) {
        return true;
    }
    if (200..300).contains(&status) {
        if body.trim().is_empty() {
            return true;
        }
        return CHALLENGE_MARKERS.iter().any(|m| body.contains(m));
    }
    false
}

/// Request executor shared by both pipeline stages.
#[derive(Clone)]
pub struct TransportClient {
    http: reqwest::Client,
    render: Option<RenderClient>,
    limiter: Arc<RateLimiter>,
}

impl TransportClient {
    /// Build the client from the scraping config. The primary path carries a
    /// cookie store so a session acquired for a fetch burst persists across
    /// its calls; dropping the client releases it.
    pub fn new(config: &ScrapingConfig, limiter: Arc<RateLimiter>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .cookie_store(true)
            .build()?;

        let render = match &config.render_url {
            Some(url) => Some(RenderClient::new(
                url,
                config.render_token.as_deref(),
                config.timeout_secs,
            )?),
            None => None,
        };

        Ok(Self {
            http,
            render,
            limiter,
        })
    }

    /// GET a URL and return its body, falling back to the rendering service
    /// on a blocking signal.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        self.limiter.acquire().await;

        match self.primary_get(url).await {
            Ok(body) => Ok(body),
            // Fall back only on a blocking signal or a connection-level
            // failure; a plain 404 stays a 404.
            Err(primary_err @ (AppError::Blocked { .. } | AppError::Http(_))) => {
                let Some(render) = &self.render else {
                    return Err(primary_err);
                };
                log::debug!("Primary transport blocked for {url}, trying fallback");
                self.limiter.acquire().await;
                render.content(url).await.map_err(|fallback_err| {
                    AppError::transport(
                        url,
                        format!("primary: {primary_err}; fallback: {fallback_err}"),
                    )
                })
            }
            Err(e) => Err(e),
        }
    }

    /// GET a URL and parse the body as JSON. A body that fails to parse where
    /// JSON was expected counts as a blocking signal: interstitial pages are
    /// served with a 200 and arbitrary markup, so an unparseable payload
    /// routes to the rendering fallback the same way a blocked status does.
    pub async fn fetch_json(&self, url: &str) -> Result<serde_json::Value> {
        self.limiter.acquire().await;

        let primary_err = match self.primary_get(url).await {
            Ok(body) => match serde_json::from_str(&body) {
                Ok(value) => return Ok(value),
                Err(e) => AppError::transport(url, format!("malformed JSON payload: {e}")),
            },
            Err(e @ (AppError::Blocked { .. } | AppError::Http(_))) => e,
            Err(e) => return Err(e),
        };

        let Some(render) = &self.render else {
            return Err(primary_err);
        };
        log::debug!("Primary transport blocked for {url}, trying fallback");
        self.limiter.acquire().await;
        let body = render.content(url).await.map_err(|fallback_err| {
            AppError::transport(
                url,
                format!("primary: {primary_err}; fallback: {fallback_err}"),
            )
        })?;
        serde_json::from_str(&body)
            .map_err(|e| AppError::transport(url, format!("malformed fallback payload: {e}")))
    }

    /// POST a GraphQL query through the primary path. The rendering service
    /// cannot replay POST bodies, so there is no fallback here; a blocked
    /// response surfaces to the caller's retry loop.
    pub async fn post_graphql(
        &self,
        url: &str,
        body: &serde_json::Value,
        csrf_token: &str,
    ) -> Result<serde_json::Value> {
        self.limiter.acquire().await;

        let resp = self
            .http
            .post(url)
            .header("X-CSRF-Token", csrf_token)
            .json(body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let text = resp.text().await?;
        if is_blocked(status, &text) {
            return Err(AppError::Blocked {
                url: url.to_string(),
                status,
            });
        }
        if !(200..300).contains(&status) {
            return Err(AppError::transport(url, format!("status {status}")));
        }
        serde_json::from_str(&text)
            .map_err(|e| AppError::transport(url, format!("malformed GraphQL payload: {e}")))
    }

    async fn primary_get(&self, url: &str) -> Result<String> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        if is_blocked(status, &body) {
            return Err(AppError::Blocked {
                url: url.to_string(),
                status,
            });
        }
        if !(200..300).contains(&status) {
            return Err(AppError::transport(url, format!("status {status}")));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    use super::*;

    /// Answer exactly one HTTP request with a 200 and the given body.
    fn serve_once(listener: TcpListener, body: &'static str) -> JoinHandle<()> {
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = stream.read(&mut chunk).unwrap();
                request.extend_from_slice(&chunk[..n]);
                if n == 0 || request_complete(&request) {
                    break;
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).unwrap();
        })
    }

    /// Headers fully received, plus any Content-Length body.
    fn request_complete(request: &[u8]) -> bool {
        let Some(head_end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
            return false;
        };
        let head = String::from_utf8_lossy(&request[..head_end]);
        let body_len = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        request.len() >= head_end + 4 + body_len
    }

    fn client_with_render(render_url: Option<String>) -> TransportClient {
        let config = ScrapingConfig {
            render_url,
            ..ScrapingConfig::default()
        };
        TransportClient::new(&config, Arc::new(RateLimiter::from_millis(0))).unwrap()
    }

    #[tokio::test]
    async fn malformed_json_routes_to_the_rendering_fallback() {
        let primary = TcpListener::bind("127.0.0.1:0").unwrap();
        let primary_addr = primary.local_addr().unwrap();
        let render = TcpListener::bind("127.0.0.1:0").unwrap();
        let render_addr = render.local_addr().unwrap();

        // 200 interstitial without any configured challenge marker
        let primary_srv = serve_once(primary, "<html>checking your browser</html>");
        let render_srv = serve_once(render, r#"{"projects": []}"#);

        let client = client_with_render(Some(format!("http://{render_addr}")));
        let value = client
            .fetch_json(&format!("http://{primary_addr}/discover.json"))
            .await
            .unwrap();

        assert_eq!(value["projects"], serde_json::json!([]));
        primary_srv.join().unwrap();
        render_srv.join().unwrap();
    }

    #[tokio::test]
    async fn malformed_json_without_fallback_surfaces_transport_error() {
        let primary = TcpListener::bind("127.0.0.1:0").unwrap();
        let primary_addr = primary.local_addr().unwrap();
        let primary_srv = serve_once(primary, "<html>checking your browser</html>");

        let client = client_with_render(None);
        let err = client
            .fetch_json(&format!("http://{primary_addr}/discover.json"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Transport { .. }));
        primary_srv.join().unwrap();
    }

    #[test]
    fn blocked_statuses_trigger() {
        assert!(is_blocked(403, "forbidden"));
        assert!(is_blocked(429, "slow down"));
        assert!(is_blocked(503, ""));
    }

    #[test]
    fn empty_success_body_is_blocked() {
        assert!(is_blocked(200, ""));
        assert!(is_blocked(200, "   \n"));
    }

    #[test]
    fn challenge_page_is_blocked() {
        assert!(is_blocked(200, "<html><title>Just a moment...</title></html>"));
        assert!(is_blocked(200, "<div id=\"cf-challenge\"></div>"));
    }

    #[test]
    fn ordinary_responses_are_not_blocked() {
        assert!(!is_blocked(200, "{\"projects\": []}"));
        assert!(!is_blocked(404, "not found"));
        assert!(!is_blocked(500, "server error"));
    }
}
