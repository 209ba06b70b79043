//! Image reference rewriting.
//!
//! A reference is split on `/` into at most three parts: an optional registry
//! domain, a repository path and the tag/digest carried along untouched. The
//! first part is only treated as a domain when it contains a `.`; otherwise it
//! is a namespace under the default registry.

use std::collections::HashSet;

use crate::mirror::MirrorMap;

/// Registry that references without an explicit domain resolve to.
pub const DEFAULT_DOMAIN: &str = "docker.io";

/// Namespace of official images on the default registry.
pub const OFFICIAL_REPO_NAME: &str = "library";

/// Historical hostnames of the default registry.
pub const LEGACY_DOMAIN_ALIASES: &[(&str, &str)] = &[
    ("index.docker.io", DEFAULT_DOMAIN),
    ("registry-1.docker.io", DEFAULT_DOMAIN),
];

/// Per-server rewrite policy: the mirror prefix and the domains left alone.
#[derive(Debug, Clone)]
pub struct RewritePolicy {
    prefix: String,
    ignore_domains: HashSet<String>,
}

impl RewritePolicy {
    pub fn new<I, S>(prefix: impl Into<String>, ignore_domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefix: prefix.into(),
            ignore_domains: ignore_domains.into_iter().map(Into::into).collect(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Exact match only, no wildcard or suffix matching.
    pub fn ignores(&self, domain: &str) -> bool {
        self.ignore_domains.contains(domain)
    }
}

/// Parsed view of a reference: the registry it resolves to and the path under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference<'a> {
    /// Effective domain after default-domain and alias rules.
    pub domain: &'a str,
    /// Repository path including tag or digest.
    pub path: String,
    /// Whether the reference named its registry itself.
    pub explicit_domain: bool,
}

impl<'a> ImageReference<'a> {
    pub fn parse(reference: &'a str) -> Self {
        let parts: Vec<&str> = reference.splitn(3, '/').collect();
        match parts.as_slice() {
            [name] => Self {
                domain: DEFAULT_DOMAIN,
                path: format!("{}/{}", OFFICIAL_REPO_NAME, name),
                explicit_domain: false,
            },
            [first, rest @ ..] if looks_like_domain(first) => Self {
                domain: normalize_domain(*first),
                path: rest.join("/"),
                explicit_domain: true,
            },
            _ => Self {
                domain: DEFAULT_DOMAIN,
                path: reference.to_string(),
                explicit_domain: false,
            },
        }
    }
}

/// Domain heuristic: a first segment with a `.` is a registry host.
pub fn looks_like_domain(segment: &str) -> bool {
    segment.contains('.')
}

/// Map a legacy alias to its canonical registry, anything else passes through.
pub fn normalize_domain(domain: &str) -> &str {
    LEGACY_DOMAIN_ALIASES
        .iter()
        .find(|(alias, _)| *alias == domain)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(domain)
}

/// Rewrite one image reference against a mirror map snapshot.
///
/// Pure: the snapshot and the policy are passed in, nothing is loaded here.
///
/// - references already pointing at a mirror host are returned unchanged,
///   unless that host is itself a mapped source domain
/// - ignored domains keep their effective registry with no mirror prepended
/// - domains present in the map get the mapped mirror prepended
/// - everything else is returned as-is
pub fn rewrite_image(reference: &str, map: &MirrorMap, policy: &RewritePolicy) -> String {
    if reference.is_empty() {
        return String::new();
    }

    let first = reference.split('/').next().unwrap_or_default();
    if first == policy.prefix() || (map.is_mirror_host(first) && !map.contains(first)) {
        return reference.to_string();
    }

    let image = ImageReference::parse(reference);

    if policy.ignores(image.domain) {
        return format!("{}/{}", image.domain, image.path);
    }

    if let Some(mirror) = map.get(image.domain) {
        return format!("{}/{}", mirror, image.path);
    }

    if image.explicit_domain {
        format!("{}/{}", image.domain, image.path)
    } else {
        reference.to_string()
    }
}
