//! HTTP Fetcher Pool: the only place in the crawler that touches the
//! network. A worker calls [`fetch`] once per dequeued URL; everything about
//! retrying is someone else's problem. A failed fetch reports itself as a
//! [`FetchOutcome`] and the caller (the engine) feeds that back into the
//! Metadata Store and Frontier, which schedule the next attempt through the
//! normal backoff path rather than a retry loop living in this module.

mod client;

pub use client::{build_http_client, RedirectChain};

use crate::blacklist::HostBlacklist;
use crate::condget::ConditionalGetCache;
use crate::ratelimit::RateLimiter;
use crate::robots::{self, RobotsCache, RobotsOutcome};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use url::Url;

/// Response bodies larger than this are dropped rather than buffered in
/// full; a 5MB page is already well past anything worth indexing.
const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Consecutive transport failures against a host before it is put into
/// temporary cooldown by the fetcher itself (independent of the rate
/// limiter's own backing-off gap).
const CONSECUTIVE_FAILURE_BLACKLIST_THRESHOLD: u32 = 3;

const DEFAULT_THROTTLE_SECONDS: u64 = 60;

/// Outcome of fetching a single URL. Only distinguishes what the fetcher
/// itself needs to report, not what the crawl record eventually stores.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched {
        final_url: String,
        status_code: u16,
        content_type: String,
        body: String,
        etag: Option<String>,
        last_modified: Option<String>,
    },
    /// `304`: the cached copy is still current, nothing to parse.
    NotModified,
    ContentMismatch {
        content_type: String,
    },
    RobotsDisallowed,
    Blacklisted,
    Throttled {
        retry_after_seconds: u64,
    },
    HttpError {
        status_code: u16,
    },
    NetworkError {
        message: String,
    },
    RedirectError {
        message: String,
    },
    BodyTooLarge,
}

/// Shared state a fetcher worker needs for every request. One instance is
/// built at startup and handed to every worker task.
pub struct FetcherContext {
    pub client: Client,
    pub robots: Arc<RobotsCache>,
    pub ratelimit: Arc<RateLimiter>,
    pub blacklist: Arc<HostBlacklist>,
    pub condget: Arc<ConditionalGetCache>,
    pub user_agent: String,
}

struct ConditionalHeaders {
    etag: Option<String>,
    last_modified: Option<String>,
}

/// Fetches `url`, enforcing politeness (blacklist, robots.txt, rate limit)
/// and conditional-GET caching before making the request.
pub async fn fetch(ctx: &FetcherContext, url: &str) -> FetchOutcome {
    let parsed = match Url::parse(url) {
        Ok(u) => u,
        Err(e) => {
            return FetchOutcome::NetworkError {
                message: format!("invalid url: {}", e),
            }
        }
    };
    let Some(host) = crate::url::extract_domain(&parsed) else {
        return FetchOutcome::NetworkError {
            message: "url has no host".to_string(),
        };
    };
    let path = if parsed.path().is_empty() { "/" } else { parsed.path() };

    if ctx.blacklist.is_blacklisted(&host) {
        return FetchOutcome::Blacklisted;
    }

    match resolve_robots(ctx, &host, path).await {
        Ok(()) => {}
        Err(outcome) => return outcome,
    }

    ctx.ratelimit.wait_for_host(&host).await;

    let conditional = ctx.condget.get(url).map(|entry| ConditionalHeaders {
        etag: entry.etag,
        last_modified: entry.last_modified,
    });

    let outcome = fetch_with_redirects(&ctx.client, url, &mut RedirectChain::new(), conditional).await;
    record_transport_result(ctx, &host, url, &outcome);
    outcome
}

/// Resolves a robots.txt decision for `(host, path)`, fetching on demand
/// when the cache is cold. Returns `Ok(())` when the fetch may proceed, or
/// `Err(outcome)` with the terminal outcome otherwise.
async fn resolve_robots(ctx: &FetcherContext, host: &str, path: &str) -> Result<(), FetchOutcome> {
    match ctx.robots.is_allowed(host, path, &ctx.user_agent) {
        RobotsOutcome::Allowed => Ok(()),
        RobotsOutcome::Disallowed => Err(FetchOutcome::RobotsDisallowed),
        RobotsOutcome::DeferredFetchStarted => {
            match robots::fetch_robots(&ctx.client, host, &ctx.user_agent).await {
                Ok((body, status)) => {
                    ctx.robots.update_cache(host, &body, status);
                    match ctx.robots.is_allowed(host, path, &ctx.user_agent) {
                        RobotsOutcome::Disallowed => Err(FetchOutcome::RobotsDisallowed),
                        _ => Ok(()),
                    }
                }
                // robots.txt is unreachable: fail open rather than stalling
                // the whole host on a transient DNS/connect error.
                Err(_) => Ok(()),
            }
        }
    }
}

fn record_transport_result(ctx: &FetcherContext, host: &str, url: &str, outcome: &FetchOutcome) {
    match outcome {
        FetchOutcome::Fetched {
            etag,
            last_modified,
            ..
        } => {
            ctx.ratelimit.record_success(host);
            ctx.condget.record(url, etag.clone(), last_modified.clone());
        }
        FetchOutcome::NotModified => {
            ctx.ratelimit.record_success(host);
        }
        FetchOutcome::Throttled {
            retry_after_seconds,
        } => {
            ctx.ratelimit.throttle_host(host, *retry_after_seconds);
        }
        FetchOutcome::NetworkError { .. } | FetchOutcome::HttpError { .. } => {
            ctx.ratelimit.record_failure(host);
            if ctx.ratelimit.failure_count(host) >= CONSECUTIVE_FAILURE_BLACKLIST_THRESHOLD {
                ctx.blacklist.add_temporary(host);
            }
        }
        FetchOutcome::ContentMismatch { .. }
        | FetchOutcome::RobotsDisallowed
        | FetchOutcome::Blacklisted
        | FetchOutcome::RedirectError { .. }
        | FetchOutcome::BodyTooLarge => {}
    }
}

/// Performs one request and, on a redirect response, recurses to follow it.
/// Boxed so the self-referential recursive future has a known size.
fn fetch_with_redirects<'a>(
    client: &'a Client,
    url: &'a str,
    chain: &'a mut RedirectChain,
    conditional: Option<ConditionalHeaders>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = FetchOutcome> + Send + 'a>> {
    Box::pin(async move {
        if !chain.add_url(url) {
            return FetchOutcome::RedirectError {
                message: format!("redirect loop detected at {}", url),
            };
        }
        if chain.is_too_long() {
            return FetchOutcome::RedirectError {
                message: format!("too many redirects (max {})", chain.max_redirects),
            };
        }

        let mut request = client.get(url);
        if let Some(validators) = &conditional {
            if let Some(etag) = &validators.etag {
                request = request.header("If-None-Match", etag);
            }
            if let Some(last_modified) = &validators.last_modified {
                request = request.header("If-Modified-Since", last_modified);
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return FetchOutcome::NetworkError {
                    message: classify_transport_error(&e),
                }
            }
        };

        let status = response.status();

        if status.is_redirection() {
            let Some(location) = response
                .headers()
                .get("location")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
            else {
                return FetchOutcome::RedirectError {
                    message: "redirect response without Location header".to_string(),
                };
            };
            let redirect_url = match resolve_redirect_target(url, &location) {
                Some(u) => u,
                None => {
                    return FetchOutcome::RedirectError {
                        message: format!("invalid redirect target: {}", location),
                    }
                }
            };
            return fetch_with_redirects(client, &redirect_url, chain, None).await;
        }

        if status == StatusCode::NOT_MODIFIED {
            return FetchOutcome::NotModified;
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            let retry_after_seconds = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_THROTTLE_SECONDS);
            return FetchOutcome::Throttled {
                retry_after_seconds,
            };
        }
        if !status.is_success() {
            return FetchOutcome::HttpError {
                status_code: status.as_u16(),
            };
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        if !content_type.is_empty() && !content_type.contains("text/html") {
            return FetchOutcome::ContentMismatch { content_type };
        }

        if let Some(len) = response.content_length() {
            if len as usize > MAX_BODY_BYTES {
                return FetchOutcome::BodyTooLarge;
            }
        }

        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let last_modified = response
            .headers()
            .get("last-modified")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let final_url = response.url().to_string();

        match response.text().await {
            Ok(body) => {
                if body.len() > MAX_BODY_BYTES {
                    return FetchOutcome::BodyTooLarge;
                }
                FetchOutcome::Fetched {
                    final_url,
                    status_code: status.as_u16(),
                    content_type,
                    body,
                    etag,
                    last_modified,
                }
            }
            Err(e) => FetchOutcome::NetworkError {
                message: classify_transport_error(&e),
            },
        }
    })
}

fn resolve_redirect_target(base: &str, location: &str) -> Option<String> {
    if location.starts_with("http://") || location.starts_with("https://") {
        return Some(location.to_string());
    }
    Url::parse(base).ok()?.join(location).ok().map(|u| u.to_string())
}

fn classify_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        "connection refused".to_string()
    } else {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UserAgentConfig;

    fn test_context() -> FetcherContext {
        let user_agent_config = UserAgentConfig {
            crawler_name: "TestCrawler".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        };
        FetcherContext {
            client: build_http_client(&user_agent_config).unwrap(),
            robots: Arc::new(RobotsCache::new(None)),
            ratelimit: Arc::new(RateLimiter::new(None)),
            blacklist: Arc::new(HostBlacklist::new(vec![], None)),
            condget: Arc::new(ConditionalGetCache::new(None)),
            user_agent: "TestCrawler/1.0".to_string(),
        }
    }

    #[tokio::test]
    async fn blacklisted_host_is_never_fetched() {
        let ctx = test_context();
        ctx.blacklist.add_temporary("example.com");
        let outcome = fetch(&ctx, "https://example.com/page").await;
        assert!(matches!(outcome, FetchOutcome::Blacklisted));
    }

    #[tokio::test]
    async fn disallowed_robots_short_circuits_the_fetch() {
        let ctx = test_context();
        ctx.robots
            .update_cache("example.com", "User-agent: *\nDisallow: /\n", 200);
        let outcome = fetch(&ctx, "https://example.com/page").await;
        assert!(matches!(outcome, FetchOutcome::RobotsDisallowed));
    }

    #[test]
    fn resolve_redirect_target_handles_relative_paths() {
        let resolved = resolve_redirect_target("https://example.com/a", "/b").unwrap();
        assert_eq!(resolved, "https://example.com/b");
    }

    #[test]
    fn resolve_redirect_target_passes_through_absolute_urls() {
        let resolved =
            resolve_redirect_target("https://example.com/a", "https://other.com/b").unwrap();
        assert_eq!(resolved, "https://other.com/b");
    }

    #[test]
    fn resolve_redirect_target_rejects_unparseable_location() {
        assert!(resolve_redirect_target("https://example.com/a", "http://[::nope").is_none());
    }
}
