/// Checks whether `candidate` is covered by a host pattern.
///
/// Two host-configuration surfaces share this matcher: the permanent
/// blacklist's patterns (`blacklist.txt`) and `domain_configs.json`'s
/// per-host override keys. Both let an operator write one pattern that
/// covers a whole site instead of enumerating every subdomain.
///
/// 1. Exact match: `"example.com"` matches only `"example.com"`
/// 2. Wildcard match: `"*.example.com"` matches the bare domain
///    (`"example.com"`) and any depth of subdomain (`"a.b.example.com"`)
///
/// # Examples
///
/// ```
/// use tidecrawl::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(!matches_wildcard("example.com", "other.com"));
/// assert!(matches_wildcard("*.example.com", "blog.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// Picks the most specific pattern in `patterns` that covers `candidate`,
/// treating a longer pattern string as more specific. Used to resolve a
/// `domain_configs.json` override when both an exact host entry and a
/// wildcard ancestor pattern could apply.
pub fn most_specific_match<'a>(patterns: impl Iterator<Item = &'a str>, candidate: &str) -> Option<&'a str> {
    patterns
        .filter(|pattern| matches_wildcard(pattern, candidate))
        .max_by_key(|pattern| pattern.len())
}
