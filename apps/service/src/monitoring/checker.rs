use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;
use url::Url;

use crate::config::{MAX_TIMEOUT_SECS, Options};
use crate::error::WatchError;

/// Checker trait for the different kinds of health checks.
///
/// `Ok(false)` means the target is down: timeouts, refused connections and DNS
/// failures all land there. `Err` is reserved for checks that could not be
/// attempted at all, such as an invalid option value.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    async fn check(&self, host: &str, options: &Options) -> Result<bool, WatchError>;
}

/// Read the `timeout` option in seconds, falling back to `default`.
pub fn option_timeout(options: &Options, default: Duration) -> Result<Duration, WatchError> {
    let Some(value) = options.get("timeout") else { return Ok(default) };

    match value.parse::<u64>() {
        Ok(secs) if (1..=MAX_TIMEOUT_SECS).contains(&secs) => Ok(Duration::from_secs(secs)),
        _ => Err(WatchError::InvalidOption {
            key: "timeout".into(),
            value: value.clone(),
            reason: format!("expected a whole number of seconds between 1 and {MAX_TIMEOUT_SECS}"),
        }),
    }
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
    default_timeout: Duration,
}

impl HttpChecker {
    pub fn new(default_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(default_timeout).build()?;

        Ok(Self { client, default_timeout })
    }
}

/// Prefix `http://` unless the host already names an HTTP scheme.
pub fn normalize_url(host: &str) -> Result<Url, WatchError> {
    let raw = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    };

    Url::parse(&raw).map_err(|e| WatchError::InvalidOption {
        key: "host".into(),
        value: host.to_string(),
        reason: e.to_string(),
    })
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, host: &str, options: &Options) -> Result<bool, WatchError> {
        let url = normalize_url(host)?;
        let request_timeout = option_timeout(options, self.default_timeout)?;
        let content_check = options.get("content_check").filter(|c| !c.is_empty());

        let request = match options.get("method").map(|m| m.to_ascii_uppercase()).as_deref() {
            None | Some("GET") => self.client.get(url.clone()),
            Some("HEAD") if content_check.is_none() => self.client.head(url.clone()),
            Some(other) => {
                return Err(WatchError::InvalidOption {
                    key: "method".into(),
                    value: other.to_string(),
                    reason: "expected GET, or HEAD without content_check".into(),
                });
            }
        };

        let start = Instant::now();
        let response = match request.timeout(request_timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(%url, error = %e, "HTTP request failed");
                return Ok(false);
            }
        };

        let status = response.status();
        // Consider 2xx and 3xx as success
        if !(status.is_success() || status.is_redirection()) {
            debug!(%url, status = status.as_u16(), "HTTP check failed with status code");
            return Ok(false);
        }

        if let Some(needle) = content_check {
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!(%url, error = %e, "Failed to read HTTP response body");
                    return Ok(false);
                }
            };
            if !body.contains(needle.as_str()) {
                debug!(%url, needle = %needle, "HTTP response is missing expected content");
                return Ok(false);
            }
        }

        debug!(%url, status = status.as_u16(), latency_ms = start.elapsed().as_millis() as u64, "HTTP check passed");
        Ok(true)
    }
}

/// ICMP reachability through the platform `ping` utility, which avoids the
/// raw socket privileges a native ICMP implementation would need.
pub struct PingChecker {
    default_timeout: Duration,
}

impl PingChecker {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

/// Arguments for a single echo request bounded by `wait`.
pub fn ping_args(host: &str, wait: Duration) -> Vec<String> {
    if cfg!(windows) {
        vec!["-n".into(), "1".into(), "-w".into(), wait.as_millis().to_string(), host.into()]
    } else {
        vec!["-c".into(), "1".into(), "-W".into(), wait.as_secs().max(1).to_string(), host.into()]
    }
}

#[async_trait::async_trait]
impl Checker for PingChecker {
    async fn check(&self, host: &str, options: &Options) -> Result<bool, WatchError> {
        let wait = option_timeout(options, self.default_timeout)?;
        if host.starts_with('-') {
            return Err(WatchError::InvalidOption {
                key: "host".into(),
                value: host.to_string(),
                reason: "host may not start with '-'".into(),
            });
        }

        let mut command = Command::new("ping");
        command
            .args(ping_args(host, wait))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        // Give the utility a little longer than its own deadline before giving up
        match timeout(wait.saturating_add(Duration::from_secs(1)), command.status()).await {
            Ok(Ok(status)) => {
                debug!(host, success = status.success(), "Ping finished");
                Ok(status.success())
            }
            Ok(Err(e)) => Err(WatchError::Strategy(format!("failed to run ping: {e}"))),
            Err(_) => {
                debug!(host, "Ping timed out");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `response` verbatim to every incoming connection.
    async fn serve(response: impl Into<String>) -> String {
        let response = response.into();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        addr.to_string()
    }

    fn checker() -> HttpChecker {
        HttpChecker::new(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com").unwrap().as_str(), "http://example.com/");
        assert_eq!(normalize_url("https://example.com/x").unwrap().as_str(), "https://example.com/x");
        assert!(normalize_url("http://").is_err());
    }

    #[test]
    fn test_option_timeout() {
        let mut options = Options::new();
        assert_eq!(option_timeout(&options, Duration::from_secs(5)).unwrap(), Duration::from_secs(5));

        options.insert("timeout".into(), "12".into());
        assert_eq!(option_timeout(&options, Duration::from_secs(5)).unwrap(), Duration::from_secs(12));

        for invalid in ["soon", "0", "301", "18446744073709551615"] {
            options.insert("timeout".into(), invalid.into());
            assert!(
                matches!(option_timeout(&options, Duration::from_secs(5)), Err(WatchError::InvalidOption { .. })),
                "timeout = {invalid} should be rejected"
            );
        }
    }

    #[test]
    fn test_ping_args() {
        let args = ping_args("10.0.0.1", Duration::from_secs(3));
        assert_eq!(args.len(), 5);
        assert_eq!(args.last().map(String::as_str), Some("10.0.0.1"));
        assert_eq!(args[1], "1");
    }

    #[tokio::test]
    async fn test_http_ok_is_up() {
        let addr = serve("HTTP/1.1 200 OK\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok").await;
        assert!(checker().check(&addr, &Options::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_http_redirect_is_up() {
        let addr = serve("HTTP/1.1 304 Not Modified\r\nconnection: close\r\n\r\n").await;
        assert!(checker().check(&addr, &Options::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_http_moved_without_location_is_up() {
        let addr = serve("HTTP/1.1 301 Moved Permanently\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        assert!(checker().check(&addr, &Options::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_http_followed_redirect_is_up() {
        let healthy = serve("HTTP/1.1 200 OK\r\ncontent-length: 7\r\nconnection: close\r\n\r\nhealthy").await;
        let moved = serve(format!(
            "HTTP/1.1 301 Moved Permanently\r\nlocation: http://{healthy}/\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
        ))
        .await;

        let mut options = Options::new();
        options.insert("content_check".into(), "healthy".into());
        assert!(checker().check(&moved, &options).await.unwrap());
    }

    #[tokio::test]
    async fn test_http_followed_redirect_to_error_is_down() {
        let broken = serve("HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        let moved = serve(format!(
            "HTTP/1.1 302 Found\r\nlocation: http://{broken}/\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
        ))
        .await;

        assert!(!checker().check(&moved, &Options::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_http_server_error_is_down() {
        let addr = serve("HTTP/1.1 500 Internal Server Error\r\ncontent-length: 0\r\nconnection: close\r\n\r\n").await;
        assert!(!checker().check(&format!("http://{addr}"), &Options::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_http_content_check() {
        let addr = serve("HTTP/1.1 200 OK\r\ncontent-length: 11\r\nconnection: close\r\n\r\nall healthy").await;

        let mut options = Options::new();
        options.insert("content_check".into(), "healthy".into());
        assert!(checker().check(&addr, &options).await.unwrap());

        options.insert("content_check".into(), "degraded".into());
        assert!(!checker().check(&addr, &options).await.unwrap());
    }

    #[tokio::test]
    async fn test_http_refused_is_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(!checker().check(&addr.to_string(), &Options::new()).await.unwrap());
    }

    #[tokio::test]
    async fn test_http_invalid_method_is_an_error() {
        let mut options = Options::new();
        options.insert("method".into(), "DELETE".into());

        let result = checker().check("127.0.0.1:9", &options).await;
        assert!(matches!(result, Err(WatchError::InvalidOption { .. })));
    }

    #[tokio::test]
    async fn test_ping_rejects_oversized_timeout() {
        let mut options = Options::new();
        options.insert("timeout".into(), u64::MAX.to_string());

        let result = PingChecker::new(Duration::from_secs(1)).check("127.0.0.1", &options).await;
        assert!(matches!(result, Err(WatchError::InvalidOption { ref key, .. }) if key == "timeout"));
    }

    #[tokio::test]
    async fn test_ping_rejects_flag_like_host() {
        let result = PingChecker::new(Duration::from_secs(1)).check("-f", &Options::new()).await;
        assert!(matches!(result, Err(WatchError::InvalidOption { .. })));
    }
}
