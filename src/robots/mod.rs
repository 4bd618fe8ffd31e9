//! Robots.txt handling module
//!
//! This module provides functionality for fetching, parsing, and caching robots.txt files.
//! It respects robots.txt directives when crawling websites.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache, RobotsOutcome};
pub use parser::ParsedRobots;

use reqwest::Client;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RobotsError {
    #[error("robots.txt request failed for {host}: {source}")]
    Request {
        host: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("robots.txt body for {host} was not valid UTF-8")]
    InvalidBody { host: String },
}

/// Fetches robots.txt for a host over HTTP.
///
/// A missing robots.txt (`403`/`404`) is not an error: it is returned as an
/// empty body with that status so the caller can cache "allow all" with the
/// normal TTL. Only transport failures are propagated.
pub async fn fetch_robots(
    client: &Client,
    host: &str,
    user_agent: &str,
) -> Result<(String, u16), RobotsError> {
    let url = format!("https://{}/robots.txt", host);
    let response = client
        .get(&url)
        .header("User-Agent", user_agent)
        .send()
        .await
        .map_err(|source| RobotsError::Request {
            host: host.to_string(),
            source,
        })?;

    let status = response.status().as_u16();
    if status != 200 {
        return Ok((String::new(), status));
    }

    let body = response
        .text()
        .await
        .map_err(|source| RobotsError::Request {
            host: host.to_string(),
            source,
        })?;
    Ok((body, status))
}
