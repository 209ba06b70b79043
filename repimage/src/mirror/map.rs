use std::collections::{BTreeMap, HashMap, HashSet};

/// Registries mirrored when no file or URL source could be loaded.
pub const DEFAULT_MIRRORED_DOMAINS: &[&str] = &[
    "docker.io",
    "gcr.io",
    "k8s.gcr.io",
    "registry.k8s.io",
    "ghcr.io",
    "quay.io",
];

/// Immutable mapping from source registry domain to mirror prefix.
///
/// One value per cache generation; a refresh builds a new map and swaps it in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MirrorMap {
    entries: HashMap<String, String>,
    /// First path segment of every mirror value.
    mirror_hosts: HashSet<String>,
}

impl MirrorMap {
    /// Built-in table: each default registry mapped to `<prefix>/<domain>`.
    pub fn defaults_for(prefix: &str) -> Self {
        DEFAULT_MIRRORED_DOMAINS
            .iter()
            .map(|domain| (*domain, format!("{}/{}", prefix, domain)))
            .collect()
    }

    /// Parse the `source_domain=mirror_prefix` line format.
    ///
    /// Blank lines and `#` comments are skipped, as are lines that do not hold
    /// exactly one `=` or have an empty side.
    pub fn parse(text: &str) -> Self {
        text.lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| {
                let mut parts = line.split('=');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(domain), Some(mirror), None) => {
                        let (domain, mirror) = (domain.trim(), mirror.trim());
                        (!domain.is_empty() && !mirror.is_empty()).then_some((domain, mirror))
                    }
                    _ => None,
                }
            })
            .collect()
    }

    pub fn get(&self, domain: &str) -> Option<&str> {
        self.entries.get(domain).map(String::as_str)
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.entries.contains_key(domain)
    }

    /// Whether `host` is where some mapping already points.
    pub fn is_mirror_host(&self, host: &str) -> bool {
        self.mirror_hosts.contains(host)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Sorted copy, handy for logging and comparisons.
    pub fn to_sorted(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MirrorMap {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let entries: HashMap<String, String> = iter
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let mirror_hosts = entries
            .values()
            .filter_map(|mirror| mirror.split('/').next())
            .filter(|host| !host.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            entries,
            mirror_hosts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_for_prefix() {
        let map = MirrorMap::defaults_for("m.daocloud.io");
        assert_eq!(map.len(), 6);
        assert_eq!(map.get("docker.io"), Some("m.daocloud.io/docker.io"));
        assert_eq!(map.get("registry.k8s.io"), Some("m.daocloud.io/registry.k8s.io"));
        assert!(map.is_mirror_host("m.daocloud.io"));
        assert!(!map.is_mirror_host("docker.io"));
    }

    #[test]
    fn test_parse_standard_format() {
        let map = MirrorMap::parse("docker.io=m.daocloud.io/docker.io\ngcr.io=m.daocloud.io/gcr.io");
        assert_eq!(map.len(), 2);
        assert_eq!(map.get("gcr.io"), Some("m.daocloud.io/gcr.io"));
    }

    #[test]
    fn test_parse_trims_whitespace() {
        let map = MirrorMap::parse("  docker.io = m.daocloud.io/docker.io  \n\tgcr.io\t=\tm.daocloud.io/gcr.io");
        assert_eq!(map.get("docker.io"), Some("m.daocloud.io/docker.io"));
        assert_eq!(map.get("gcr.io"), Some("m.daocloud.io/gcr.io"));
    }

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let text = "# Comment line\ndocker.io=m.daocloud.io/docker.io\n\n# Another comment\ngcr.io=m.daocloud.io/gcr.io\n\n";
        let map = MirrorMap::parse(text);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_parse_skips_malformed_lines() {
        let text = "invalid line without equals\ndocker.io=m.daocloud.io/docker.io\na=b=c\n=missing.domain\nmissing.mirror=\n";
        let map = MirrorMap::parse(text);
        assert_eq!(map.len(), 1);
        assert!(map.contains("docker.io"));
    }

    #[test]
    fn test_parse_empty_input() {
        assert!(MirrorMap::parse("").is_empty());
        assert!(MirrorMap::parse("# only comments\n\n").is_empty());
    }
}
