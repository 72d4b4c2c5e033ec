//! URL parsing and normalization.
//!
//! `normalize_url` rewrites equivalent spellings of a URL into one canonical
//! form so they can be compared or deduplicated: a scheme is added when
//! missing, hosts are lowercased, default ports, tracking parameters and
//! redundant slashes are dropped, and query parameters are sorted.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

#[derive(Debug, Error)]
pub enum UrlError {
    #[error("URL is empty")]
    Empty,
    #[error("invalid URL `{input}`: {source}")]
    Parse {
        input: String,
        #[source]
        source: url::ParseError,
    },
    #[error("the `force_http` and `force_https` options cannot be used together")]
    ConflictingProtocols,
    #[error("invalid query parameter pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("`view-source:` URLs are not supported")]
    ViewSource,
}

/// Normalization switches. Every field has a default, so partial tables in
/// configuration files are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeOptions {
    /// Scheme prepended to URLs that lack one.
    pub default_protocol: String,
    pub force_http: bool,
    pub force_https: bool,
    pub strip_authentication: bool,
    pub strip_hash: bool,
    /// Remove `#:~:text=` highlight directives.
    pub strip_text_fragment: bool,
    pub strip_www: bool,
    /// Regular expressions matched against query parameter names.
    pub remove_query_parameters: Vec<String>,
    pub sort_query_parameters: bool,
    pub remove_trailing_slash: bool,
    /// Drop the lone `/` path of a bare origin.
    pub remove_single_slash: bool,
    /// Drop a final `index.*` or `default.*` path segment.
    pub remove_directory_index: bool,
    pub remove_explicit_port: bool,
    pub strip_protocol: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            default_protocol: "http".to_string(),
            force_http: false,
            force_https: false,
            strip_authentication: true,
            strip_hash: false,
            strip_text_fragment: true,
            strip_www: true,
            remove_query_parameters: vec![r"^utm_\w+".to_string()],
            sort_query_parameters: true,
            remove_trailing_slash: true,
            remove_single_slash: true,
            remove_directory_index: false,
            remove_explicit_port: false,
            strip_protocol: false,
        }
    }
}

/// Parses an absolute URL.
pub fn parse_url(input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }
    Url::parse(trimmed).map_err(|source| UrlError::Parse {
        input: trimmed.to_string(),
        source,
    })
}

/// True when `input` is an absolute URL with a host.
pub fn is_url(input: &str) -> bool {
    parse_url(input).is_ok_and(|url| url.has_host())
}

/// Normalizes `input` according to `options`.
///
/// Relative references (`./x`, `/x`) are returned unchanged and `data:`
/// URLs are only trimmed.
///
/// # Example
/// ```rust
/// use knit_util::url_normalize::{NormalizeOptions, normalize_url};
///
/// let options = NormalizeOptions::default();
/// assert_eq!(normalize_url("sindresorhus.com", &options).unwrap(), "http://sindresorhus.com");
/// assert_eq!(
///     normalize_url("HTTP://www.Example.com:80/a/?utm_source=x&b=2&a=1", &options).unwrap(),
///     "http://example.com/a?a=1&b=2"
/// );
/// ```
pub fn normalize_url(input: &str, options: &NormalizeOptions) -> Result<String, UrlError> {
    static RELATIVE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\.*/").unwrap());
    static HAS_SCHEME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\w+://").unwrap());
    static TEXT_FRAGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i):~:text.*$").unwrap());
    static PROTOCOL_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:https?:)?//").unwrap());

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let lowered_prefix = trimmed.get(..12).unwrap_or(trimmed).to_ascii_lowercase();
    if lowered_prefix.starts_with("data:") {
        return Ok(trimmed.to_string());
    }
    if lowered_prefix.starts_with("view-source:") {
        return Err(UrlError::ViewSource);
    }

    let has_relative_protocol = trimmed.starts_with("//");
    if !has_relative_protocol && RELATIVE.is_match(trimmed) {
        debug!(input = trimmed, "leaving relative URL unchanged");
        return Ok(trimmed.to_string());
    }

    if options.force_http && options.force_https {
        return Err(UrlError::ConflictingProtocols);
    }

    let removals = options
        .remove_query_parameters
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| UrlError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let protocol = options.default_protocol.trim_end_matches("://").trim_end_matches(':');
    let with_scheme = if has_relative_protocol {
        format!("{}:{}", protocol, trimmed)
    } else if HAS_SCHEME.is_match(trimmed) {
        trimmed.to_string()
    } else {
        format!("{}://{}", protocol, trimmed)
    };

    let mut url = parse_url(&with_scheme)?;

    if options.force_http && url.scheme() == "https" {
        let _ = url.set_scheme("http");
    }
    if options.force_https && url.scheme() == "http" {
        let _ = url.set_scheme("https");
    }

    if options.strip_authentication {
        let _ = url.set_username("");
        let _ = url.set_password(None);
    }

    if options.strip_hash {
        url.set_fragment(None);
    } else if let Some(fragment) = url.fragment().map(str::to_string) {
        let kept = if options.strip_text_fragment {
            TEXT_FRAGMENT.replace(&fragment, "").into_owned()
        } else {
            fragment
        };
        url.set_fragment(Some(kept.as_str()).filter(|value| !value.is_empty()));
    }

    if !url.cannot_be_a_base() {
        let mut path = collapse_duplicate_slashes(url.path());
        if options.remove_directory_index {
            path = remove_directory_index(&path);
        }
        if options.remove_trailing_slash && path.ends_with('/') {
            path.pop();
        }
        url.set_path(&path);
    }

    if let Some(host) = url.host_str().map(str::to_string) {
        let mut normalized = host.trim_end_matches('.').to_string();
        if options.strip_www {
            normalized = strip_www(&normalized).to_string();
        }
        if normalized != host {
            let _ = url.set_host(Some(&normalized));
        }
    }

    if url.query().is_some() {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !removals.iter().any(|pattern| pattern.is_match(key)))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        if options.sort_query_parameters {
            pairs.sort_by(|left, right| left.0.cmp(&right.0));
        }
        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(&pairs);
        }
    }

    if options.remove_explicit_port {
        let _ = url.set_port(None);
    }

    let path_is_root = url.path() == "/";
    let plain_tail = url.fragment().is_none() && url.query().is_none();
    let mut normalized = url.to_string();

    let drop_root_slash = if options.remove_single_slash {
        options.remove_trailing_slash || path_is_root
    } else {
        path_is_root && !with_scheme.ends_with('/')
    };
    if drop_root_slash && plain_tail && normalized.ends_with('/') {
        normalized.pop();
    }

    if options.strip_protocol {
        normalized = PROTOCOL_PREFIX.replace(&normalized, "").into_owned();
    }

    Ok(normalized)
}

/// Collapses runs of `/` unless they follow a `:` (an embedded URL).
fn collapse_duplicate_slashes(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    let mut characters = path.chars().peekable();

    while let Some(character) = characters.next() {
        if character != '/' {
            collapsed.push(character);
            continue;
        }
        let mut run = 1;
        while characters.peek() == Some(&'/') {
            characters.next();
            run += 1;
        }
        let keep = if collapsed.ends_with(':') { run } else { 1 };
        collapsed.extend(std::iter::repeat_n('/', keep));
    }

    collapsed
}

fn remove_directory_index(path: &str) -> String {
    static DIRECTORY_INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(?:index|default)\.[a-z]+$").unwrap());

    match path.rsplit_once('/') {
        Some((directory, last)) if DIRECTORY_INDEX.is_match(last) => format!("{}/", directory),
        _ => path.to_string(),
    }
}

fn strip_www(host: &str) -> &str {
    static BARE_HOST: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z\-\d]{1,63}\.[a-z.\-\d]{2,63}$").unwrap());

    match host.strip_prefix("www.") {
        Some(rest) if !rest.starts_with("www.") && BARE_HOST.is_match(rest) => rest,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(input: &str) -> String {
        normalize_url(input, &NormalizeOptions::default()).unwrap()
    }

    #[test]
    fn adds_missing_protocol() {
        assert_eq!(normalize("sindresorhus.com"), "http://sindresorhus.com");
        assert_eq!(normalize("//sindresorhus.com:80/"), "http://sindresorhus.com");
        assert_eq!(normalize("localhost:3000/api"), "http://localhost:3000/api");
    }

    #[test]
    fn strips_tracking_parameters_and_sorts_the_rest() {
        assert_eq!(
            normalize("HTTP://www.Example.com:80/foo/?utm_source=x&b=2&a=1#"),
            "http://example.com/foo?a=1&b=2"
        );
        assert_eq!(normalize("http://example.com/?b=bar&a=foo"), "http://example.com/?a=foo&b=bar");
        assert_eq!(normalize("http://example.com/?utm_medium=mail"), "http://example.com");
    }

    #[test]
    fn strips_authentication_and_duplicate_slashes() {
        assert_eq!(normalize("https://user:pw@example.com/a//b"), "https://example.com/a/b");
        assert_eq!(
            normalize("http://example.com/redirect//https://x.com"),
            "http://example.com/redirect/https://x.com"
        );
    }

    #[test]
    fn handles_fragments() {
        assert_eq!(normalize("http://example.com/#about"), "http://example.com/#about");
        assert_eq!(normalize("http://example.com/#:~:text=hello"), "http://example.com");

        let options = NormalizeOptions {
            strip_hash: true,
            ..NormalizeOptions::default()
        };
        assert_eq!(normalize_url("http://example.com/a#about", &options).unwrap(), "http://example.com/a");
    }

    #[test]
    fn forces_protocols_but_not_both() {
        let https = NormalizeOptions {
            force_https: true,
            ..NormalizeOptions::default()
        };
        assert_eq!(normalize_url("http://example.com", &https).unwrap(), "https://example.com");

        let http = NormalizeOptions {
            force_http: true,
            ..NormalizeOptions::default()
        };
        assert_eq!(normalize_url("https://example.com/a", &http).unwrap(), "http://example.com/a");
        assert_eq!(normalize_url("//www.example.com", &http).unwrap(), "http://example.com");

        let both = NormalizeOptions {
            force_http: true,
            ..https
        };
        assert!(matches!(
            normalize_url("http://example.com", &both),
            Err(UrlError::ConflictingProtocols)
        ));
    }

    #[test]
    fn optional_rewrites() {
        let options = NormalizeOptions {
            remove_directory_index: true,
            strip_protocol: true,
            remove_explicit_port: true,
            ..NormalizeOptions::default()
        };
        assert_eq!(
            normalize_url("https://example.com:8080/docs/index.html", &options).unwrap(),
            "example.com/docs"
        );
    }

    #[test]
    fn keeps_single_slash_when_asked() {
        let options = NormalizeOptions {
            remove_single_slash: false,
            remove_trailing_slash: false,
            ..NormalizeOptions::default()
        };
        assert_eq!(normalize_url("http://example.com/", &options).unwrap(), "http://example.com/");
        assert_eq!(normalize_url("http://example.com", &options).unwrap(), "http://example.com");
    }

    #[test]
    fn leaves_relative_and_data_urls_alone() {
        assert_eq!(normalize("./relative/path"), "./relative/path");
        assert_eq!(normalize("/absolute/path/"), "/absolute/path/");
        assert_eq!(normalize("  data:text/plain,hi  "), "data:text/plain,hi");
        assert!(matches!(
            normalize_url("view-source:https://example.com", &NormalizeOptions::default()),
            Err(UrlError::ViewSource)
        ));
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(normalize_url("  ", &NormalizeOptions::default()), Err(UrlError::Empty)));
        let options = NormalizeOptions {
            remove_query_parameters: vec!["(".to_string()],
            ..NormalizeOptions::default()
        };
        assert!(matches!(
            normalize_url("http://example.com", &options),
            Err(UrlError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let options: NormalizeOptions = serde_json::from_str(r#"{ "strip_www": false }"#).unwrap();
        assert!(!options.strip_www);
        assert!(options.sort_query_parameters);
        assert_eq!(options.default_protocol, "http");
    }

    #[test]
    fn detects_absolute_urls() {
        assert!(is_url("https://example.com/path"));
        assert!(!is_url("example.com"));
        assert!(!is_url(""));
        assert!(parse_url("not a url").is_err());
    }
}
