use url::Url;

/// Extracts the host from a URL, lowercased so it can key a `HashMap`/shard
/// consistently regardless of how the link was originally written.
///
/// Used everywhere a component needs to group by site rather than by page:
/// [`normalize_url`](super::normalize_url) to rebuild the host portion of a
/// normalized link, the fetcher to key the rate limiter/blacklist/robots
/// cache, and the priority heuristics and domain-override lookup to decide
/// how a link should be treated before it ever reaches the Frontier.
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_simple_domain() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn extracts_subdomain_untouched() {
        let url = Url::parse("https://blog.example.com/post").unwrap();
        assert_eq!(extract_domain(&url), Some("blog.example.com".to_string()));
    }

    #[test]
    fn drops_port_from_the_extracted_host() {
        let url = Url::parse("https://example.com:8080/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn lowercases_mixed_case_hosts() {
        let url = Url::parse("https://Example.COM/").unwrap();
        assert_eq!(extract_domain(&url), Some("example.com".to_string()));
    }

    #[test]
    fn returns_none_for_a_host_less_url() {
        // data: URLs have no authority component to extract a host from.
        let url = Url::parse("data:text/plain,hello").unwrap();
        assert_eq!(extract_domain(&url), None);
    }
}
