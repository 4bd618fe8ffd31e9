//! URL handling: normalization, host extraction, and wildcard pattern matching.

mod domain;
mod matcher;
mod normalize;

pub use domain::extract_domain;
pub use matcher::{matches_wildcard, most_specific_match};
pub use normalize::{is_static_asset, normalize_url, MAX_URL_LENGTH};
