//! URL canonicalization and evidence deduplication.

use crate::types::Evidence;
use std::collections::HashMap;
use url::Url;

const TRACKING_PARAMS: &[&str] = &["gclid", "fbclid", "msclkid", "mc_cid", "mc_eid", "igshid"];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Canonical form of a URL for identity comparison.
///
/// Drops tracking parameters and the fragment, maps `m.` and `mobile.` hosts
/// to the desktop host and sorts the remaining query parameters. Unparseable
/// input is returned trimmed.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    if let Some(host) = url.host_str() {
        let desktop = desktop_host(host);
        if desktop != host && url.set_host(Some(&desktop)).is_err() {
            return trimmed.to_string();
        }
    }

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    url.set_fragment(None);
    if params.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(params);
    }
    url.to_string()
}

// Repeated so `m.m.example.com` canonicalizes in one pass.
fn desktop_host(host: &str) -> String {
    let mut host = host;
    while let Some(rest) = host
        .strip_prefix("m.")
        .or_else(|| host.strip_prefix("mobile."))
        .filter(|rest| rest.contains('.'))
    {
        host = rest;
    }
    host.to_string()
}

/// Collapse evidence with the same canonical URL, preserving first-seen order.
///
/// Kept entries carry the canonical URL. A kept field is replaced by a later
/// entry's when it is absent or blank, or when the later text is strictly longer.
pub fn dedup(evidence: Vec<Evidence>) -> Vec<Evidence> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut out: Vec<Evidence> = Vec::with_capacity(evidence.len());

    for item in evidence {
        let key = canonicalize_url(&item.url);
        match index.get(&key) {
            Some(&i) => {
                let kept = &mut out[i];
                merge_field(&mut kept.title, item.title);
                merge_field(&mut kept.snippet, item.snippet);
                merge_field(&mut kept.published, item.published);
            }
            None => {
                index.insert(key.clone(), out.len());
                out.push(Evidence { url: key, ..item });
            }
        }
    }
    out
}

fn merge_field(kept: &mut Option<String>, later: Option<String>) {
    let Some(later) = later.filter(|s| !s.trim().is_empty()) else {
        return;
    };
    let replace = match kept.as_deref() {
        None => true,
        Some(current) if current.trim().is_empty() => true,
        Some(current) => later.chars().count() > current.chars().count(),
    };
    if replace {
        *kept = Some(later);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceTool;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strips_tracking_and_sorts() {
        assert_eq!(
            canonicalize_url("https://example.com/a?utm_source=x&b=2&gclid=abc&a=1#top"),
            "https://example.com/a?a=1&b=2"
        );
        assert_eq!(
            canonicalize_url("https://example.com/a?utm_medium=email"),
            "https://example.com/a"
        );
    }

    #[test]
    fn test_mobile_hosts() {
        assert_eq!(
            canonicalize_url("https://m.wikipedia.org/wiki/Battery"),
            "https://wikipedia.org/wiki/Battery"
        );
        assert_eq!(
            canonicalize_url("https://mobile.twitter.com/x"),
            "https://twitter.com/x"
        );
        assert_eq!(canonicalize_url("https://m.com/"), "https://m.com/");
    }

    #[test]
    fn test_unparseable_kept() {
        assert_eq!(canonicalize_url("  not a url "), "not a url");
    }

    #[test]
    fn test_dedup_merges_richer_fields() {
        let mut first = Evidence::bare("https://m.example.com/p?utm_source=feed", SourceTool::Answer);
        first.title = Some("  ".to_string());
        first.snippet = Some("short".to_string());

        let mut second = Evidence::bare("https://example.com/p", SourceTool::Search);
        second.title = Some("Full title".to_string());
        second.snippet = Some("a longer snippet".to_string());
        second.published = Some("2024-05-01".to_string());

        let other = Evidence::bare("https://other.example/", SourceTool::Search);

        let out = dedup(vec![first, other.clone(), second]);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "https://example.com/p");
        assert_eq!(out[0].source, SourceTool::Answer);
        assert_eq!(out[0].title.as_deref(), Some("Full title"));
        assert_eq!(out[0].snippet.as_deref(), Some("a longer snippet"));
        assert_eq!(out[0].published.as_deref(), Some("2024-05-01"));
        assert_eq!(out[1], other);
    }

    #[test]
    fn test_dedup_stores_canonical_url() {
        let out = dedup(vec![Evidence::bare(
            "https://m.example.com/p?utm_source=x&b=2&a=1",
            SourceTool::Search,
        )]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url, "https://example.com/p?a=1&b=2");
    }

    #[test]
    fn test_dedup_keeps_longer_existing() {
        let mut first = Evidence::bare("https://a.example/", SourceTool::Search);
        first.title = Some("Longer original".to_string());
        let mut second = Evidence::bare("https://a.example/#frag", SourceTool::Search);
        second.title = Some("Short".to_string());

        let out = dedup(vec![first, second]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title.as_deref(), Some("Longer original"));
    }
}
