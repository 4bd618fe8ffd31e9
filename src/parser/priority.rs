//! Priority heuristics applied to newly discovered links: a handful of
//! domain-shape boosts layered on a flat baseline. Higher value means
//! higher priority, matching the Frontier's comparator.

use super::DiscoveredLink;
use crate::url::extract_domain;
use url::Url;

const BASE_PRIORITY: f64 = 1.0;
const AUTHORITATIVE_BOOST: f64 = 5.0;
const EDUCATIONAL_BOOST: f64 = 3.0;
const NEWS_BOOST: f64 = 2.0;

const NEWS_MARKERS: &[&str] = &["news", "times", "tribune", "herald", "gazette"];

pub fn score_link(url: Url) -> DiscoveredLink {
    let priority = extract_domain(&url).map(|h| domain_priority(&h)).unwrap_or(BASE_PRIORITY);

    DiscoveredLink {
        url: url.to_string(),
        priority,
    }
}

fn domain_priority(host: &str) -> f64 {
    if host.ends_with(".gov") {
        return BASE_PRIORITY + AUTHORITATIVE_BOOST;
    }
    if host.ends_with(".edu") {
        return BASE_PRIORITY + EDUCATIONAL_BOOST;
    }
    if NEWS_MARKERS.iter().any(|marker| host.contains(marker)) {
        return BASE_PRIORITY + NEWS_BOOST;
    }
    BASE_PRIORITY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn gov_domains_get_the_authoritative_boost() {
        let link = score_link(url("https://data.census.gov/page"));
        assert_eq!(link.priority, BASE_PRIORITY + AUTHORITATIVE_BOOST);
    }

    #[test]
    fn edu_domains_get_the_educational_boost() {
        let link = score_link(url("https://cs.mit.edu/page"));
        assert_eq!(link.priority, BASE_PRIORITY + EDUCATIONAL_BOOST);
    }

    #[test]
    fn news_like_domains_get_the_news_boost() {
        let link = score_link(url("https://www.examplenews.com/article"));
        assert_eq!(link.priority, BASE_PRIORITY + NEWS_BOOST);
    }

    #[test]
    fn ordinary_domains_get_the_baseline() {
        let link = score_link(url("https://example.com/page"));
        assert_eq!(link.priority, BASE_PRIORITY);
    }
}
