use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use tracing::debug;

/// Outcome of one robots.txt request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotsResponse {
    /// 2xx with a body
    Found(String),
    /// 4xx: the site has no robots.txt
    Missing,
    /// Timeout, 5xx or network failure
    Unreachable(String),
}

/// Retrieves robots.txt files
#[async_trait]
pub trait RobotsFetcher: Send + Sync {
    async fn fetch(&self, robots_url: &str) -> RobotsResponse;
}

/// robots.txt over HTTP with a short deadline and a bounded body
pub struct HttpRobotsFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpRobotsFetcher {
    pub fn new(user_agent: &str, timeout: Duration, max_bytes: usize) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .redirect(Policy::limited(5))
            .gzip(true)
            .brotli(true)
            .build()?;
        Ok(Self { client, max_bytes })
    }
}

#[async_trait]
impl RobotsFetcher for HttpRobotsFetcher {
    async fn fetch(&self, robots_url: &str) -> RobotsResponse {
        let mut response = match self.client.get(robots_url).send().await {
            Ok(response) => response,
            Err(e) => return RobotsResponse::Unreachable(e.to_string()),
        };

        let status = response.status();
        if status.is_client_error() {
            debug!("robots.txt at {} answered {}", robots_url, status);
            return RobotsResponse::Missing;
        }
        if !status.is_success() {
            return RobotsResponse::Unreachable(format!("HTTP {}", status.as_u16()));
        }

        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    body.extend_from_slice(&chunk);
                    if body.len() >= self.max_bytes {
                        body.truncate(self.max_bytes);
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => return RobotsResponse::Unreachable(e.to_string()),
            }
        }

        RobotsResponse::Found(String::from_utf8_lossy(&body).into_owned())
    }
}
