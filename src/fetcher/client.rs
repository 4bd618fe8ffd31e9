//! HTTP client construction and manual redirect handling, carried over from
//! the fetch layer almost unchanged: automatic redirects are disabled so the
//! chain can be inspected hop by hop for loops and length.

use crate::config::UserAgentConfig;
use reqwest::redirect::Policy;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;

/// Tracks visited URLs across a single fetch's redirect hops.
#[derive(Debug)]
pub struct RedirectChain {
    pub max_redirects: u32,
    pub visited: HashSet<String>,
}

impl RedirectChain {
    pub fn new() -> Self {
        Self {
            max_redirects: 5,
            visited: HashSet::new(),
        }
    }

    /// Returns `false` if `url` was already visited in this chain (a loop).
    pub fn add_url(&mut self, url: &str) -> bool {
        self.visited.insert(url.to_string())
    }

    pub fn is_too_long(&self) -> bool {
        self.visited.len() > self.max_redirects as usize
    }
}

impl Default for RedirectChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds the HTTP client used by every fetcher worker: a single shared
/// `Client` backs its own connection pool, so workers should share one
/// instance rather than building a client per request.
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(10))
        .connect_timeout(Duration::from_secs(5))
        .redirect(Policy::none())
        .https_only(true)
        .gzip(true)
        .brotli(true)
        .build()
}
