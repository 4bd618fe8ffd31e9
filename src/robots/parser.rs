//! Robots.txt parser implementation
//!
//! This module provides functionality for parsing robots.txt content using the robotstxt crate.

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data
///
/// This is a wrapper around the robotstxt crate's types, providing a simplified
/// interface for checking if URLs are allowed.
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    /// Raw robots.txt content (empty string means allow all)
    content: String,
    /// Whether to allow all (true = allow all, false = parse content)
    allow_all: bool,
}

impl ParsedRobots {
    /// Creates a new ParsedRobots from raw robots.txt content
    ///
    /// # Arguments
    ///
    /// * `content` - The raw robots.txt file content
    ///
    /// # Returns
    ///
    /// A ParsedRobots instance that can be used to check URL permissions
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// Creates a permissive ParsedRobots that allows everything
    ///
    /// This is used as the default when robots.txt cannot be fetched or parsed.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    /// Checks if a URL is allowed for the given user agent
    ///
    /// # Arguments
    ///
    /// * `url` - The URL path to check (e.g., "/page.html")
    /// * `user_agent` - The user agent string
    ///
    /// # Returns
    ///
    /// * `true` - If the URL is allowed
    /// * `false` - If the URL is disallowed
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            // Empty content or explicit allow-all means allow all
            return true;
        }

        // Parse and check on-demand
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Gets the crawl delay for a specific user agent
    ///
    /// The `robotstxt` crate doesn't expose crawl-delay directly, so it is
    /// extracted here by scanning the raw body for a `Crawl-delay:` line
    /// inside the block that matches `user_agent`, falling back to the `*`
    /// block.
    ///
    /// # Returns
    ///
    /// * `Some(f64)` - The crawl delay in seconds
    /// * `None` - If no crawl delay is specified
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        if self.allow_all || self.content.is_empty() {
            return None;
        }
        crawl_delay_from_body(&self.content, user_agent)
            .or_else(|| crawl_delay_from_body(&self.content, "*"))
    }
}

fn crawl_delay_from_body(body: &str, agent: &str) -> Option<f64> {
    let agent = agent.to_lowercase();
    let mut in_matching_block = false;
    let mut found: Option<f64> = None;

    for raw_line in body.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((directive, value)) = line.split_once(':') else {
            continue;
        };
        let directive = directive.trim().to_lowercase();
        let value = value.trim();

        if directive == "user-agent" {
            in_matching_block = value.to_lowercase() == agent;
        } else if directive == "crawl-delay" && in_matching_block {
            if let Ok(seconds) = value.parse::<f64>() {
                found = Some(seconds);
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("/any/path", "TestBot"));
        assert!(robots.is_allowed("/admin", "TestBot"));
    }

    #[test]
    fn test_parse_disallow_all() {
        let content = "User-agent: *\nDisallow: /";
        let robots = ParsedRobots::from_content(content);
        assert!(!robots.is_allowed("/", "TestBot"));
        assert!(!robots.is_allowed("/page", "TestBot"));
    }

    #[test]
    fn test_parse_disallow_specific() {
        let content = "User-agent: *\nDisallow: /admin";
        let robots = ParsedRobots::from_content(content);
        assert!(robots.is_allowed("/", "TestBot"));
        assert!(robots.is_allowed("/page", "TestBot"));
        assert!(!robots.is_allowed("/admin", "TestBot"));
        assert!(!robots.is_allowed("/admin/users", "TestBot"));
    }

    #[test]
    fn test_parse_allow_and_disallow() {
        let content = "User-agent: *\nDisallow: /private\nAllow: /private/public";
        let robots = ParsedRobots::from_content(content);
        assert!(robots.is_allowed("/", "TestBot"));
        assert!(!robots.is_allowed("/private", "TestBot"));
        assert!(robots.is_allowed("/private/public", "TestBot"));
    }

    #[test]
    fn test_parse_specific_user_agent() {
        let content = "User-agent: BadBot\nDisallow: /\n\nUser-agent: *\nAllow: /";
        let robots = ParsedRobots::from_content(content);
        assert!(robots.is_allowed("/page", "GoodBot"));
        assert!(!robots.is_allowed("/page", "BadBot"));
    }

    #[test]
    fn test_invalid_robots_txt() {
        let content = "This is not valid robots.txt {{{";
        let robots = ParsedRobots::from_content(content);
        // Should fall back to allow_all behavior
        assert!(robots.is_allowed("/any/path", "TestBot"));
    }

    #[test]
    fn test_empty_robots_txt() {
        let content = "";
        let robots = ParsedRobots::from_content(content);
        assert!(robots.is_allowed("/any/path", "TestBot"));
    }

    #[test]
    fn crawl_delay_parsed_from_matching_block() {
        let robots = ParsedRobots::from_content("User-agent: *\nCrawl-delay: 2.5\nDisallow: /admin\n");
        assert_eq!(robots.crawl_delay("TestBot"), Some(2.5));
    }

    #[test]
    fn crawl_delay_prefers_specific_agent_block() {
        let robots = ParsedRobots::from_content(
            "User-agent: *\nCrawl-delay: 10\n\nUser-agent: tidecrawl\nCrawl-delay: 1\n",
        );
        assert_eq!(robots.crawl_delay("tidecrawl"), Some(1.0));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(10.0));
    }

    #[test]
    fn crawl_delay_absent_returns_none() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /admin\n");
        assert_eq!(robots.crawl_delay("TestBot"), None);
    }

    #[test]
    fn allow_all_has_no_crawl_delay() {
        let robots = ParsedRobots::allow_all();
        assert_eq!(robots.crawl_delay("TestBot"), None);
    }
}
