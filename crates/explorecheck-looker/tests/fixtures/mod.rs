//! Test fixtures for backend integration tests
//!
//! These fixtures describe small LookML models shaped like common
//! e-commerce projects.

use explorecheck_looker::{MockLooker, MockLookerBuilder};

/// Users explore: a handful of dimensions and one measure
pub fn users_dimensions() -> Vec<&'static str> {
    vec!["users.id", "users.email", "users.age_tier", "users.created_date"]
}

/// Orders explore joined to users
pub fn orders_dimensions() -> Vec<&'static str> {
    vec!["orders.id", "orders.status", "orders.created_date", "users.id", "users.state"]
}

/// An `ecommerce` model with users and orders explores, plus an empty `sandbox` model
pub fn ecommerce_builder() -> MockLookerBuilder {
    MockLooker::builder()
        .with_explore("ecommerce", "users", &users_dimensions(), &["users.count"])
        .with_explore(
            "ecommerce",
            "orders",
            &orders_dimensions(),
            &["orders.count", "orders.total_revenue"],
        )
        .with_model("sandbox")
}

/// The ecommerce model with `users.age_tier` broken
pub fn broken_age_tier() -> MockLooker {
    ecommerce_builder()
        .fail_field("users.age_tier", "Unrecognized name: age_tier at [5:5]")
        .build()
}

/// Minimal HTTP/1.1 server standing in for a Looker instance
///
/// Each connection serves one request and closes. `route` maps the method
/// and request target (path plus query) to a status code and body.
pub struct StubLooker {
    pub base_url: String,
    requests: std::sync::Arc<tokio::sync::Mutex<Vec<String>>>,
}

impl StubLooker {
    pub async fn start<F>(route: F) -> Self
    where
        F: Fn(&str, &str) -> (u16, String) + Send + Sync + 'static,
    {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new()));

        let seen = requests.clone();
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let Ok(Some(request_line)) = read_request(&mut stream).await else {
                    continue;
                };
                let mut parts = request_line.split_whitespace();
                let method = parts.next().unwrap_or_default().to_string();
                let target = parts.next().unwrap_or_default().to_string();
                seen.lock().await.push(format!("{} {}", method, target));

                let (status, body) = route(&method, &target);
                let content_type = if body.starts_with('{') || body.starts_with('[') {
                    "application/json"
                } else {
                    "text/html"
                };
                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    content_type,
                    body.len(),
                    body
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self { base_url, requests }
    }

    /// Requests received so far, as `METHOD target`
    pub async fn requests(&self) -> Vec<String> {
        self.requests.lock().await.clone()
    }

    pub fn config(&self) -> explorecheck_core::LookerConfig {
        explorecheck_core::LookerConfig {
            base_url: self.base_url.clone(),
            client_id: "id".to_string(),
            client_secret: "secret".to_string(),
            ..explorecheck_core::LookerConfig::default()
        }
    }
}

/// Read one request (headers plus any body) and return its request line
async fn read_request(stream: &mut tokio::net::TcpStream) -> std::io::Result<Option<String>> {
    use tokio::io::AsyncReadExt;

    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Ok(head.lines().next().map(str::to_string))
}
