//! Endpoint classification.
//!
//! # Responsibilities
//! - Normalize request paths before any matching
//! - Decide whether a path is Protected, Public or Webhook
//!
//! # Design Decisions
//! - Precedence is explicit and order independent: an exact rule always wins,
//!   then the longest matching prefix, then the default
//! - Prefix rules match on segment boundaries: `/admin/*` covers `/admin` and
//!   `/admin/x` but not `/administrator`
//! - Matching is case-insensitive; both rules and paths are lower-cased
//! - A path that cannot be normalized classifies as Protected (fail closed)

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::schema::EndpointConfig;

/// Upper bound on percent-decoding passes.
const MAX_DECODE_ROUNDS: usize = 4;

/// Protection class of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    /// Requires an API key or a session.
    Protected,
    /// Open to everyone (still rate limited).
    Public,
    /// Requires the webhook shared secret.
    Webhook,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Protected => "protected",
            Self::Public => "public",
            Self::Webhook => "webhook",
        }
    }
}

/// Canonical form of a request path.
///
/// Repeatedly percent-decodes (so `%252e` ends up as `.`), turns backslashes
/// into slashes, drops empty and `.` segments, resolves `..` without climbing
/// above the root, lower-cases, and strips the trailing slash.
///
/// Returns `None` for paths that are not valid UTF-8 after decoding, still
/// contain encoded bytes after the decoding budget, or carry control
/// characters.
pub fn normalize_path(raw: &str) -> Option<String> {
    let mut decoded = raw.to_string();
    let mut settled = false;
    for _ in 0..MAX_DECODE_ROUNDS {
        let next = urlencoding::decode(&decoded).ok()?.into_owned();
        if next == decoded {
            settled = true;
            break;
        }
        decoded = next;
    }
    if !settled && urlencoding::decode(&decoded).ok()? != decoded {
        return None;
    }

    if decoded.chars().any(char::is_control) {
        return None;
    }

    let unified = decoded.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    Some(format!("/{}", segments.join("/")).to_lowercase())
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Matches one normalized path.
    Exact(String),
    /// Matches the base path and everything below it.
    Prefix(String),
}

impl PathPattern {
    /// Parse a configured pattern; a trailing `/*` makes it a prefix.
    pub fn parse(pattern: &str) -> Option<Self> {
        match pattern.strip_suffix("/*") {
            Some(base) => {
                let base = normalize_path(if base.is_empty() { "/" } else { base })?;
                Some(Self::Prefix(base))
            }
            None => normalize_path(pattern).map(Self::Exact),
        }
    }

    /// Test an already normalized path.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(exact) => path == exact,
            Self::Prefix(base) if base == "/" => true,
            Self::Prefix(base) => {
                path == base
                    || path
                        .strip_prefix(base.as_str())
                        .is_some_and(|rest| rest.starts_with('/'))
            }
        }
    }

    /// Ordering key: exact beats prefix, then longer beats shorter.
    pub fn specificity(&self) -> (bool, usize) {
        match self {
            Self::Exact(path) => (true, path.len()),
            Self::Prefix(base) => (false, base.len()),
        }
    }
}

/// Evaluates the endpoint rule set.
#[derive(Debug, Clone)]
pub struct EndpointClassifier {
    exact: HashMap<String, EndpointKind>,
    /// Prefix rules, most specific first.
    prefixes: Vec<(PathPattern, EndpointKind)>,
    deny_by_default: bool,
}

impl EndpointClassifier {
    /// Compile the configured rules. Patterns that cannot be normalized are
    /// skipped with a warning; validation rejects them before this point.
    pub fn new(config: &EndpointConfig) -> Self {
        let mut exact = HashMap::new();
        let mut prefixes = Vec::new();

        for rule in &config.rules {
            match PathPattern::parse(&rule.pattern) {
                Some(PathPattern::Exact(path)) => {
                    exact.insert(path, rule.kind);
                }
                Some(prefix) => prefixes.push((prefix, rule.kind)),
                None => {
                    tracing::warn!(pattern = %rule.pattern, "Ignoring unparseable endpoint rule");
                }
            }
        }

        prefixes.sort_by(|a, b| b.0.specificity().cmp(&a.0.specificity()));

        Self {
            exact,
            prefixes,
            deny_by_default: config.deny_by_default,
        }
    }

    /// Classify a raw request path.
    pub fn classify(&self, raw_path: &str) -> EndpointKind {
        match normalize_path(raw_path) {
            Some(path) => self.classify_normalized(&path),
            None => {
                tracing::debug!(path = %raw_path, "Unnormalizable path classified as protected");
                EndpointKind::Protected
            }
        }
    }

    /// Classify a path already passed through [`normalize_path`].
    pub fn classify_normalized(&self, path: &str) -> EndpointKind {
        if let Some(kind) = self.exact.get(path) {
            return *kind;
        }

        if let Some((_, kind)) = self.prefixes.iter().find(|(prefix, _)| prefix.matches(path)) {
            return *kind;
        }

        if self.deny_by_default {
            EndpointKind::Protected
        } else {
            EndpointKind::Public
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::EndpointRuleConfig;

    const PROTECTED: [&str; 6] = ["/admin", "/api/admin", "/config", "/logs", "/stats", "/debug"];

    fn defaults() -> EndpointClassifier {
        EndpointClassifier::new(&EndpointConfig::default())
    }

    #[test]
    fn default_rules_classify_documented_paths() {
        let classifier = defaults();
        for path in PROTECTED {
            assert_eq!(classifier.classify(path), EndpointKind::Protected, "{path}");
        }
        assert_eq!(classifier.classify("/"), EndpointKind::Public);
        assert_eq!(classifier.classify("/health"), EndpointKind::Public);
        assert_eq!(classifier.classify("/webhook/autobrr"), EndpointKind::Webhook);
    }

    #[test]
    fn protected_variants_never_evade() {
        let classifier = defaults();
        for path in PROTECTED {
            let upper = path.to_uppercase();
            let tail = &path[1..];
            let variants = [
                format!("{path}/"),
                format!("{path}//"),
                upper.clone(),
                format!("{upper}/"),
                format!("/{tail}/sub/page"),
                format!("//{tail}"),
                format!("/./{tail}"),
                format!("/health/..{path}"),
                format!("/x/../{tail}"),
                format!("/../../{tail}"),
                format!("/health%2f..{path}"),
                format!("/health%252f..%252f{tail}"),
                format!("/%2e%2e/{tail}"),
                format!("/health\\..{path}"),
                format!("/{}", urlencoding::encode(tail)),
            ];
            for variant in variants {
                assert_eq!(
                    classifier.classify(&variant),
                    EndpointKind::Protected,
                    "variant {variant} escaped protection"
                );
            }
        }
    }

    #[test]
    fn prefix_respects_segment_boundaries() {
        let classifier = defaults();
        assert_eq!(classifier.classify("/administrator"), EndpointKind::Public);
        assert_eq!(classifier.classify("/admin/users"), EndpointKind::Protected);
        assert_eq!(classifier.classify("/statsd"), EndpointKind::Public);
    }

    #[test]
    fn exact_rule_wins_regardless_of_order() {
        let forward = EndpointConfig {
            deny_by_default: false,
            rules: vec![
                EndpointRuleConfig::new("/admin/*", EndpointKind::Protected),
                EndpointRuleConfig::new("/admin/login", EndpointKind::Public),
            ],
        };
        let mut reversed = forward.clone();
        reversed.rules.reverse();

        for config in [forward, reversed] {
            let classifier = EndpointClassifier::new(&config);
            assert_eq!(classifier.classify("/admin/login"), EndpointKind::Public);
            assert_eq!(classifier.classify("/admin/login/x"), EndpointKind::Protected);
            assert_eq!(classifier.classify("/admin"), EndpointKind::Protected);
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let config = EndpointConfig {
            deny_by_default: false,
            rules: vec![
                EndpointRuleConfig::new("/api/*", EndpointKind::Public),
                EndpointRuleConfig::new("/api/admin/*", EndpointKind::Protected),
                EndpointRuleConfig::new("/api/admin/hooks/*", EndpointKind::Webhook),
            ],
        };
        let classifier = EndpointClassifier::new(&config);
        assert_eq!(classifier.classify("/api/books"), EndpointKind::Public);
        assert_eq!(classifier.classify("/api/admin/users"), EndpointKind::Protected);
        assert_eq!(classifier.classify("/api/admin/hooks/in"), EndpointKind::Webhook);
    }

    #[test]
    fn deny_by_default_protects_unmatched() {
        let mut config = EndpointConfig::default();
        assert_eq!(EndpointClassifier::new(&config).classify("/unknown"), EndpointKind::Public);
        config.deny_by_default = true;
        let classifier = EndpointClassifier::new(&config);
        assert_eq!(classifier.classify("/unknown"), EndpointKind::Protected);
        assert_eq!(classifier.classify("/health"), EndpointKind::Public);
    }

    #[test]
    fn malformed_paths_fail_closed() {
        let classifier = defaults();
        assert_eq!(classifier.classify("/%ff%fe"), EndpointKind::Protected);
        assert_eq!(classifier.classify("/health%00"), EndpointKind::Protected);
        assert_eq!(classifier.classify("/health%0a"), EndpointKind::Protected);
        assert_eq!(
            classifier.classify("/%2525252525252e"),
            EndpointKind::Protected
        );
    }

    #[test]
    fn normalization_examples() {
        assert_eq!(normalize_path("/").as_deref(), Some("/"));
        assert_eq!(normalize_path("").as_deref(), Some("/"));
        assert_eq!(normalize_path("/A//b/./c/../D/").as_deref(), Some("/a/b/d"));
        assert_eq!(normalize_path("/..").as_deref(), Some("/"));
        assert_eq!(normalize_path("/approve/AbC").as_deref(), Some("/approve/abc"));
    }

    #[test]
    fn patterns_parse() {
        assert_eq!(PathPattern::parse("/*"), Some(PathPattern::Prefix("/".into())));
        assert!(PathPattern::parse("/*").unwrap().matches("/anything"));
        assert_eq!(
            PathPattern::parse("/Login"),
            Some(PathPattern::Exact("/login".into()))
        );
        assert!(PathPattern::parse("/a/*").unwrap().specificity()
            < PathPattern::parse("/a/b/*").unwrap().specificity());
        assert!(PathPattern::parse("/a/b/*").unwrap().specificity()
            < PathPattern::parse("/a").unwrap().specificity());
    }
}
