// Website whitelist: a small grammar of allowed domains and IPv4 blocks, and a
// matcher that pulls every domain/IP out of free text and requires each one to
// be allowed.
//
// Grammar, one entry per line:
//   a.b.c.d/N        CIDR block (host bits ignored)
//   ip1 -> ip2       inclusive range; start > end matches nothing
//   all>domain       domain and all of its subdomains
//   top>.tld         any domain ending in the suffix
//   a.b.c.d          single address
//   anything else    plain domain (scheme/path/port/"www." stripped)
// Blank lines and lines starting with '#' are ignored.

use super::cached_section::CachedSection;
use super::PolicyError;
use crate::core::config::{ConfigStore, PolicyConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ENTRIES
// ============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum WhitelistParseError {
    #[error("entry is empty")]
    Empty,

    #[error("invalid IP range '{0}': both ends must be IPv4 addresses")]
    InvalidRange(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhitelistEntry {
    PlainDomain(String),
    SubdomainWildcard(String),
    TldWildcard(String),
    CidrBlock { network: Ipv4Addr, prefix: u8 },
    IpRange { start: Ipv4Addr, end: Ipv4Addr },
    SingleIp(Ipv4Addr),
}

impl WhitelistEntry {
    fn matches_domain(&self, domain: &str) -> bool {
        match self {
            WhitelistEntry::PlainDomain(allowed) | WhitelistEntry::SubdomainWildcard(allowed) => {
                dot_boundary_suffix(domain, allowed)
            }
            WhitelistEntry::TldWildcard(suffix) => domain.ends_with(suffix.as_str()),
            _ => false,
        }
    }

    fn matches_ip(&self, ip: Ipv4Addr) -> bool {
        match *self {
            WhitelistEntry::CidrBlock { network, prefix } => {
                let mask = prefix_mask(prefix);
                u32::from(ip) & mask == u32::from(network)
            }
            WhitelistEntry::IpRange { start, end } => start <= ip && ip <= end,
            WhitelistEntry::SingleIp(allowed) => ip == allowed,
            _ => false,
        }
    }
}

impl FromStr for WhitelistEntry {
    type Err = WhitelistParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(WhitelistParseError::Empty);
        }

        if line.contains('/') {
            if let Some((network, prefix)) = parse_cidr(line) {
                return Ok(WhitelistEntry::CidrBlock { network, prefix });
            }
        }

        if let Some((start, end)) = line.split_once(" -> ") {
            return match (parse_ipv4(start), parse_ipv4(end)) {
                (Some(start), Some(end)) => Ok(WhitelistEntry::IpRange { start, end }),
                _ => Err(WhitelistParseError::InvalidRange(line.to_string())),
            };
        }

        if let Some(domain) = line.strip_prefix("all>") {
            let domain = normalize_domain(domain);
            if domain.is_empty() {
                return Err(WhitelistParseError::Empty);
            }
            return Ok(WhitelistEntry::SubdomainWildcard(domain));
        }

        if let Some(suffix) = line.strip_prefix("top>") {
            let suffix = normalize_domain(suffix);
            if suffix.is_empty() {
                return Err(WhitelistParseError::Empty);
            }
            return Ok(WhitelistEntry::TldWildcard(suffix));
        }

        let domain = normalize_domain(line);
        if domain.is_empty() {
            return Err(WhitelistParseError::Empty);
        }
        match parse_ipv4(&domain) {
            Some(ip) => Ok(WhitelistEntry::SingleIp(ip)),
            None => Ok(WhitelistEntry::PlainDomain(domain)),
        }
    }
}

impl fmt::Display for WhitelistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WhitelistEntry::PlainDomain(domain) => write!(f, "{}", domain),
            WhitelistEntry::SubdomainWildcard(domain) => write!(f, "all>{}", domain),
            WhitelistEntry::TldWildcard(suffix) => write!(f, "top>{}", suffix),
            WhitelistEntry::CidrBlock { network, prefix } => write!(f, "{}/{}", network, prefix),
            WhitelistEntry::IpRange { start, end } => write!(f, "{} -> {}", start, end),
            WhitelistEntry::SingleIp(ip) => write!(f, "{}", ip),
        }
    }
}

fn parse_ipv4(text: &str) -> Option<Ipv4Addr> {
    text.trim().parse().ok()
}

fn prefix_mask(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p.min(32))),
    }
}

/// `a.b.c.d/N` or `a.b.c.d/m.m.m.m`. Host bits are masked off.
fn parse_cidr(text: &str) -> Option<(Ipv4Addr, u8)> {
    let (addr, suffix) = text.trim().split_once('/')?;
    let addr = parse_ipv4(addr)?;
    let suffix = suffix.trim();

    let prefix = match suffix.parse::<u8>() {
        Ok(p) if p <= 32 => p,
        Ok(_) => return None,
        Err(_) => {
            let mask = u32::from(parse_ipv4(suffix)?);
            // Only contiguous netmasks are valid.
            if mask.leading_ones() + mask.trailing_zeros() != 32 {
                return None;
            }
            mask.leading_ones() as u8
        }
    };

    let network = Ipv4Addr::from(u32::from(addr) & prefix_mask(prefix));
    Some((network, prefix))
}

/// Lowercased host part: no scheme, path, query, port, leading `www.` or
/// trailing root dot.
pub fn normalize_domain(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    let mut text = lowered.as_str();
    if let Some((_, rest)) = text.split_once("://") {
        text = rest;
    }
    if let Some(end) = text.find(&['/', '?', '#'][..]) {
        text = &text[..end];
    }
    if let Some((host, _port)) = text.split_once(':') {
        text = host;
    }
    let text = text.strip_prefix("www.").unwrap_or(text);
    text.trim_end_matches('.').to_string()
}

/// `domain == suffix` or `domain` ends with `"." + suffix`.
fn dot_boundary_suffix(domain: &str, suffix: &str) -> bool {
    domain == suffix
        || (domain.len() > suffix.len()
            && domain.ends_with(suffix)
            && domain.as_bytes()[domain.len() - suffix.len() - 1] == b'.')
}

// ============================================================================
// EXTRACTION
// ============================================================================

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://(?:www\.)?([a-zA-Z0-9.-]+)").expect("valid regex"));
static DOMAIN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-zA-Z0-9.-]+\.[a-zA-Z]{2,})").expect("valid regex"));
static IPV4_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3})").expect("valid regex")
});

/// Distinct domains and IPs referenced by a message, as they appear in it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedTargets {
    pub domains: BTreeSet<String>,
    pub ips: BTreeSet<String>,
}

impl ExtractedTargets {
    /// Domains first, then IPs.
    pub fn all(&self) -> Vec<String> {
        self.domains.iter().chain(self.ips.iter()).cloned().collect()
    }
}

/// Union of three passes (full URLs, bare `label.tld` shapes, dotted quads);
/// each match is classified as an IP if it parses as one.
pub fn extract_targets(text: &str) -> ExtractedTargets {
    let mut targets = ExtractedTargets::default();

    for pattern in [&*URL_RE, &*DOMAIN_RE, &*IPV4_RE] {
        for caps in pattern.captures_iter(text) {
            let found = &caps[1];
            if parse_ipv4(found).is_some() {
                targets.ips.insert(found.to_string());
            } else {
                targets.domains.insert(found.to_string());
            }
        }
    }

    targets
}

// ============================================================================
// PARSED WHITELIST
// ============================================================================

/// Outcome of checking one message.
#[derive(Debug, Clone, PartialEq)]
pub struct WebsiteCheck {
    pub passed: bool,
    /// Every distinct target found in the message.
    pub targets: Vec<String>,
    /// Targets no entry allowed.
    pub unmatched: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WebsiteWhitelist {
    entries: Vec<WhitelistEntry>,
}

impl WebsiteWhitelist {
    /// Parse config lines, skipping comments and logging malformed lines.
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Self {
        let entries = lines
            .iter()
            .map(|line| line.as_ref().trim())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| match line.parse::<WhitelistEntry>() {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!(entry = line, "Skipping website whitelist entry: {}", e);
                    None
                }
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[WhitelistEntry] {
        &self.entries
    }

    pub fn allows_domain(&self, domain: &str) -> bool {
        let domain = normalize_domain(domain);
        if domain.is_empty() {
            return false;
        }
        self.entries.iter().any(|entry| entry.matches_domain(&domain))
    }

    /// Membership only; domains are never resolved to addresses.
    pub fn allows_ip(&self, ip: Ipv4Addr) -> bool {
        self.entries.iter().any(|entry| entry.matches_ip(ip))
    }

    pub fn allows_target(&self, target: &str) -> bool {
        match parse_ipv4(target) {
            Some(ip) => self.allows_ip(ip),
            None => self.allows_domain(target),
        }
    }

    /// Passes iff every extracted target is allowed. No targets passes.
    pub fn check(&self, text: &str) -> WebsiteCheck {
        let extracted = extract_targets(text);
        let targets = extracted.all();
        let unmatched: Vec<String> = targets
            .iter()
            .filter(|target| !self.allows_target(target))
            .cloned()
            .collect();

        WebsiteCheck {
            passed: unmatched.is_empty(),
            targets,
            unmatched,
        }
    }
}

/// Entries grouped by kind, for display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhitelistSummary {
    pub domains: Vec<String>,
    pub ip_blocks: Vec<String>,
    pub ip_ranges: Vec<String>,
    pub subdomain_patterns: Vec<String>,
    pub tld_patterns: Vec<String>,
}

// ============================================================================
// CHECKER
// ============================================================================

fn parse_section(config: &PolicyConfig) -> WebsiteWhitelist {
    WebsiteWhitelist::parse(&config.website_whitelist)
}

pub struct WebsiteWhitelistMatcher {
    section: CachedSection<WebsiteWhitelist>,
}

impl WebsiteWhitelistMatcher {
    pub fn new(store: Arc<ConfigStore>) -> Self {
        Self {
            section: CachedSection::new("website_whitelist", store, parse_section),
        }
    }

    pub fn check(&self, text: &str) -> WebsiteCheck {
        self.section.current().check(text)
    }

    pub fn is_target_whitelisted(&self, target: &str) -> bool {
        self.section.current().allows_target(target)
    }

    pub fn entries(&self) -> Vec<WhitelistEntry> {
        self.section.current().entries().to_vec()
    }

    pub fn summary(&self) -> WhitelistSummary {
        let mut summary = WhitelistSummary::default();
        for entry in self.section.current().entries() {
            let text = entry.to_string();
            match entry {
                WhitelistEntry::PlainDomain(_) => summary.domains.push(text),
                WhitelistEntry::CidrBlock { .. } => summary.ip_blocks.push(text),
                WhitelistEntry::IpRange { .. } | WhitelistEntry::SingleIp(_) => {
                    summary.ip_ranges.push(text)
                }
                WhitelistEntry::SubdomainWildcard(_) => summary.subdomain_patterns.push(text),
                WhitelistEntry::TldWildcard(_) => summary.tld_patterns.push(text),
            }
        }
        summary
    }

    /// Add an entry in canonical form. Returns `false` if an equivalent entry
    /// already exists; a line that doesn't parse is rejected.
    pub fn add_entry(&self, line: &str) -> Result<bool, PolicyError> {
        let entry: WhitelistEntry = line.parse()?;
        if self.section.current().entries().contains(&entry) {
            return Ok(false);
        }

        let canonical = entry.to_string();
        self.section.update(|config| {
            let exists = config
                .website_whitelist
                .iter()
                .any(|existing| existing.parse::<WhitelistEntry>().ok().as_ref() == Some(&entry));
            if !exists {
                config.website_whitelist.push(canonical);
            }
        })?;
        Ok(true)
    }

    /// Remove every line equivalent to `line` (or literally equal to it, so
    /// broken lines can be cleaned up too).
    pub fn remove_entry(&self, line: &str) -> Result<bool, PolicyError> {
        let line = line.trim().to_string();
        let entry = line.parse::<WhitelistEntry>().ok();
        let matches = |existing: &String| {
            existing.trim() == line
                || (entry.is_some() && existing.parse::<WhitelistEntry>().ok() == entry)
        };

        let mut removed = false;
        self.section.update(|config| {
            let before = config.website_whitelist.len();
            config.website_whitelist.retain(|existing| !matches(existing));
            removed = config.website_whitelist.len() != before;
        })?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::config_store::test_support::store_with;

    fn whitelist(lines: &[&str]) -> WebsiteWhitelist {
        WebsiteWhitelist::parse(lines)
    }

    fn ip(text: &str) -> Ipv4Addr {
        text.parse().unwrap()
    }

    // ------------------------------------------------------------------
    // Grammar
    // ------------------------------------------------------------------

    #[test]
    fn test_parse_each_entry_kind() {
        assert_eq!(
            "1.1.1.7/24".parse::<WhitelistEntry>(),
            Ok(WhitelistEntry::CidrBlock {
                network: ip("1.1.1.0"),
                prefix: 24
            })
        );
        assert_eq!(
            "3.4.5.6 -> 9.4.8.7".parse::<WhitelistEntry>(),
            Ok(WhitelistEntry::IpRange {
                start: ip("3.4.5.6"),
                end: ip("9.4.8.7")
            })
        );
        assert_eq!(
            "all>QQ.com".parse::<WhitelistEntry>(),
            Ok(WhitelistEntry::SubdomainWildcard("qq.com".to_string()))
        );
        assert_eq!(
            "top>.cn".parse::<WhitelistEntry>(),
            Ok(WhitelistEntry::TldWildcard(".cn".to_string()))
        );
        assert_eq!(
            "8.8.8.8".parse::<WhitelistEntry>(),
            Ok(WhitelistEntry::SingleIp(ip("8.8.8.8")))
        );
        assert_eq!(
            "https://www.Example.com:8443/path?q=1".parse::<WhitelistEntry>(),
            Ok(WhitelistEntry::PlainDomain("example.com".to_string()))
        );
    }

    #[test]
    fn test_parse_netmask_form() {
        assert_eq!(
            "10.0.0.0/255.255.0.0".parse::<WhitelistEntry>(),
            Ok(WhitelistEntry::CidrBlock {
                network: ip("10.0.0.0"),
                prefix: 16
            })
        );
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        assert!(matches!(
            "a -> 1.2.3.4".parse::<WhitelistEntry>(),
            Err(WhitelistParseError::InvalidRange(_))
        ));
        assert_eq!("all>".parse::<WhitelistEntry>(), Err(WhitelistParseError::Empty));

        let list = whitelist(&["# comment", "", "a -> b", "qq.com", "top>"]);
        assert_eq!(
            list.entries(),
            &[WhitelistEntry::PlainDomain("qq.com".to_string())]
        );
    }

    #[test]
    fn test_display_is_reparseable() {
        for line in ["qq.com", "all>qq.com", "top>.cn", "1.1.1.0/24", "1.2.3.4 -> 1.2.3.9", "8.8.8.8"] {
            let entry: WhitelistEntry = line.parse().unwrap();
            assert_eq!(entry.to_string(), line);
        }
    }

    // ------------------------------------------------------------------
    // Matching
    // ------------------------------------------------------------------

    #[test]
    fn test_plain_domain_requires_dot_boundary() {
        let list = whitelist(&["qq.com"]);
        assert!(list.allows_domain("qq.com"));
        assert!(list.allows_domain("mail.qq.com"));
        assert!(list.allows_domain("WWW.QQ.COM"));
        assert!(!list.allows_domain("notqq.com"));
        assert!(!list.allows_domain("qq.com.evil"));
    }

    #[test]
    fn test_plain_domain_property() {
        let list = whitelist(&["qq.com"]);
        for domain in ["qq.com", "a.qq.com", "b.a.qq.com", "xqq.com", "q.com", "qq.co"] {
            let expected = domain == "qq.com" || domain.ends_with(".qq.com");
            assert_eq!(list.allows_domain(domain), expected, "{}", domain);
        }
    }

    #[test]
    fn test_tld_wildcard_is_raw_suffix() {
        let list = whitelist(&["top>.cn"]);
        assert!(list.allows_domain("foo.bar.cn"));
        assert!(!list.allows_domain("foo.bar.com"));

        // No boundary requirement for suffix patterns.
        let list = whitelist(&["top>cn"]);
        assert!(list.allows_domain("example.wecn"));
    }

    #[test]
    fn test_cidr_membership() {
        let list = whitelist(&["192.168.1.0/24", "10.0.0.0/8", "0.0.0.0/0"]);
        assert!(list.allows_ip(ip("1.2.3.4")));

        let list = whitelist(&["192.168.1.0/24"]);
        assert!(list.allows_ip(ip("192.168.1.0")));
        assert!(list.allows_ip(ip("192.168.1.255")));
        assert!(!list.allows_ip(ip("192.168.2.1")));

        let list = whitelist(&["10.1.2.3/32"]);
        assert!(list.allows_ip(ip("10.1.2.3")));
        assert!(!list.allows_ip(ip("10.1.2.4")));
    }

    #[test]
    fn test_range_is_inclusive() {
        let list = whitelist(&["1.0.0.10 -> 1.0.0.20"]);
        assert!(list.allows_ip(ip("1.0.0.10")));
        assert!(list.allows_ip(ip("1.0.0.15")));
        assert!(list.allows_ip(ip("1.0.0.20")));
        assert!(!list.allows_ip(ip("1.0.0.9")));
        assert!(!list.allows_ip(ip("1.0.0.21")));
    }

    #[test]
    fn test_inverted_range_matches_nothing() {
        let list = whitelist(&["1.0.0.20 -> 1.0.0.10"]);
        assert_eq!(list.entries().len(), 1);
        for last in [5u8, 10, 15, 20, 25] {
            assert!(!list.allows_ip(Ipv4Addr::new(1, 0, 0, last)));
        }
    }

    #[test]
    fn test_domains_are_never_resolved() {
        let list = whitelist(&["1.1.1.1"]);
        assert!(!list.allows_domain("one.one.one.one"));
    }

    // ------------------------------------------------------------------
    // Extraction and message checks
    // ------------------------------------------------------------------

    #[test]
    fn test_extract_urls_domains_and_ips() {
        let targets = extract_targets("see https://www.foo.com/x and bar.org or 10.0.0.1");
        assert!(targets.domains.contains("foo.com"));
        assert!(targets.domains.contains("bar.org"));
        assert!(targets.ips.contains("10.0.0.1"));
    }

    #[test]
    fn test_message_without_targets_passes() {
        let result = whitelist(&[]).check("just chatting, nothing to see");
        assert!(result.passed);
        assert!(result.targets.is_empty());
    }

    #[test]
    fn test_unlisted_url_fails() {
        let result = whitelist(&["qq.com"]).check("visit http://evil.test now");
        assert!(!result.passed);
        assert!(result.targets.contains(&"evil.test".to_string()));
        assert_eq!(result.unmatched, vec!["evil.test".to_string()]);
    }

    #[test]
    fn test_tld_wildcard_scenario() {
        let result = whitelist(&["top>.cn"]).check("check foo.bar.cn");
        assert!(result.passed);
    }

    #[test]
    fn test_every_target_must_match() {
        let list = whitelist(&["qq.com", "10.0.0.0/8"]);
        assert!(list.check("qq.com and 10.2.3.4").passed);

        let result = list.check("qq.com and 11.2.3.4");
        assert!(!result.passed);
        // The failure lists everything found, not just the offender.
        assert_eq!(result.targets.len(), 2);
        assert_eq!(result.unmatched, vec!["11.2.3.4".to_string()]);
    }

    #[test]
    fn test_sentence_ending_dot_does_not_fail_url() {
        let result = whitelist(&["qq.com"]).check("go to http://qq.com.");
        assert!(result.passed, "{:?}", result);
    }

    // ------------------------------------------------------------------
    // Checker
    // ------------------------------------------------------------------

    #[test]
    fn test_matcher_picks_up_new_version() {
        let config = PolicyConfig {
            website_whitelist: vec!["qq.com".to_string()],
            ..Default::default()
        };
        let (store, source) = store_with(config);
        let matcher = WebsiteWhitelistMatcher::new(Arc::clone(&store));
        assert!(!matcher.check("example.org").passed);

        source.edit(|c| c.website_whitelist.push("example.org".to_string()));
        // Before the store notices the change, the old view is served.
        assert!(!matcher.check("example.org").passed);

        store.refresh();
        assert!(matcher.check("example.org").passed);
        assert!(matcher.check("example.org").passed);
        assert_eq!(matcher.section.reloads(), 1);
    }

    #[test]
    fn test_add_and_remove_entries() {
        let (store, _) = store_with(PolicyConfig::default());
        let matcher = WebsiteWhitelistMatcher::new(Arc::clone(&store));

        assert!(matcher.add_entry("all>Example.org").unwrap());
        assert!(!matcher.add_entry("all>example.org").unwrap());
        assert!(matches!(
            matcher.add_entry("x -> y"),
            Err(PolicyError::InvalidEntry(_))
        ));
        assert!(matcher.is_target_whitelisted("a.example.org"));
        assert_eq!(store.get().config.website_whitelist, vec!["all>example.org".to_string()]);

        assert!(matcher.remove_entry("all>example.org").unwrap());
        assert!(!matcher.is_target_whitelisted("a.example.org"));
    }

    #[test]
    fn test_summary_groups_by_kind() {
        let config = PolicyConfig {
            website_whitelist: ["qq.com", "1.1.1.0/24", "1.1.1.1 -> 1.1.1.5", "all>a.com", "top>.cn"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ..Default::default()
        };
        let (store, _) = store_with(config);
        let summary = WebsiteWhitelistMatcher::new(store).summary();
        assert_eq!(summary.domains, vec!["qq.com".to_string()]);
        assert_eq!(summary.ip_blocks, vec!["1.1.1.0/24".to_string()]);
        assert_eq!(summary.ip_ranges, vec!["1.1.1.1 -> 1.1.1.5".to_string()]);
        assert_eq!(summary.subdomain_patterns, vec!["all>a.com".to_string()]);
        assert_eq!(summary.tld_patterns, vec!["top>.cn".to_string()]);
    }
}
