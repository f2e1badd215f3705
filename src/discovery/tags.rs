//! Service tag parsing
//!
//! Recovers the externally routed URL and the display icon of a service from
//! its registration tags. Only the small `key=value` grammar Traefik and the
//! dashboard use is recognised; anything else is ignored.

use std::sync::LazyLock;

use regex::Regex;

/// Tag that opts a service into Traefik routing
pub const TRAEFIK_ENABLE_TAG: &str = "traefik.enable=true";

static ROUTER_RULE_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"traefik\.http\.routers\..*\.rule").expect("router rule pattern is valid")
});

static ICON_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"icon=(.+)").expect("icon pattern is valid"));

// ============================================================================
// SBIO: Pure functions (no I/O)
// ============================================================================

/// Extract the routed `https://` URL from a service's tags.
///
/// Requires `traefik.enable=true`. The first router rule tag is parsed for
/// its `Host(`...`)` expression; a rule that does not have that shape yields
/// `None` rather than a guessed URL.
pub fn extract_routing_url<S: AsRef<str>>(tags: &[S]) -> Option<String> {
    if !tags.iter().any(|t| t.as_ref() == TRAEFIK_ENABLE_TAG) {
        return None;
    }

    let rule = tags
        .iter()
        .map(AsRef::as_ref)
        .find(|t| ROUTER_RULE_TAG.is_match(t))?;

    host_from_rule(rule).map(|host| format!("https://{}", host))
}

/// Extract the icon identifier from a service's tags.
///
/// Matches `icon=<value>` anywhere in a tag; the first non-empty value wins.
pub fn extract_icon<S: AsRef<str>>(tags: &[S]) -> Option<String> {
    tags.iter().find_map(|tag| {
        ICON_TAG
            .captures(tag.as_ref())
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// Hostname between the first `(` and the next `)`, minus its quoting.
fn host_from_rule(rule: &str) -> Option<&str> {
    let (_, after_open) = rule.split_once('(')?;
    let (inner, _) = after_open.split_once(')')?;

    let mut chars = inner.chars();
    let open = chars.next()?;
    let close = chars.next_back()?;
    if open != close || !matches!(open, '`' | '"') {
        return None;
    }

    let host = chars.as_str();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}
