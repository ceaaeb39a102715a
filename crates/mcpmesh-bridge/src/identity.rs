//! Bridge identifier computation (§3 `BridgeManifest entry` invariant):
//! entries that resolve to the same identifier are coalesced into one
//! live bridge.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::manifest::BridgeManifestEntry;

/// Environment keys that participate in identity. Anything else (stray
/// inherited variables) must not cause two otherwise-identical entries
/// to be treated as distinct bridges.
pub fn relevant_env(env: &std::collections::HashMap<String, String>) -> BTreeMap<String, String> {
    env.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}

/// Normalize a URL for identity comparison: lowercase scheme/host,
/// strip a trailing slash.
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    match trimmed.split_once("://") {
        Some((scheme, rest)) => {
            let mut parts = rest.splitn(2, '/');
            let host = parts.next().unwrap_or("");
            let path = parts.next();
            let mut out = format!("{}://{}", scheme.to_ascii_lowercase(), host.to_ascii_lowercase());
            if let Some(path) = path {
                out.push('/');
                out.push_str(path);
            }
            out
        }
        None => trimmed.to_ascii_lowercase(),
    }
}

/// Identifier for a manifest entry: `http:<normalized-url>` for HTTP
/// bridges, `stdio:<hash>` of `(command, args, resolved cwd, relevant
/// env)` for stdio bridges.
pub fn identifier(entry: &BridgeManifestEntry) -> String {
    match entry {
        BridgeManifestEntry::Http { url, .. } => format!("http:{}", normalize_url(url)),
        BridgeManifestEntry::Stdio {
            command,
            args,
            cwd,
            env,
            ..
        } => {
            let resolved_cwd = cwd.clone().unwrap_or_default();
            let mut hasher = DefaultHasher::new();
            command.hash(&mut hasher);
            args.hash(&mut hasher);
            resolved_cwd.hash(&mut hasher);
            for (k, v) in relevant_env(env) {
                k.hash(&mut hasher);
                v.hash(&mut hasher);
            }
            format!("stdio:{:016x}", hasher.finish())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn stdio(command: &str, args: &[&str], cwd: Option<&str>, env: &[(&str, &str)]) -> BridgeManifestEntry {
        BridgeManifestEntry::Stdio {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cwd: cwd.map(str::to_string),
            env: env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            disabled: false,
        }
    }

    #[test]
    fn identical_entries_share_identifier() {
        let a = stdio("npx", &["-y", "mcp-x@1"], None, &[]);
        let b = stdio("npx", &["-y", "mcp-x@1"], None, &[]);
        assert_eq!(identifier(&a), identifier(&b));
    }

    #[test]
    fn distinct_cwd_changes_identifier() {
        let a = stdio("npx", &["-y", "mcp-x@1"], Some("/proj1"), &[]);
        let b = stdio("npx", &["-y", "mcp-x@1"], Some("/proj2"), &[]);
        assert_ne!(identifier(&a), identifier(&b));
    }

    #[test]
    fn env_order_does_not_affect_identifier() {
        let a = stdio("npx", &[], None, &[("A", "1"), ("B", "2")]);
        let b = stdio("npx", &[], None, &[("B", "2"), ("A", "1")]);
        assert_eq!(identifier(&a), identifier(&b));
    }

    #[test]
    fn http_identifier_normalizes_case_and_trailing_slash() {
        let a = BridgeManifestEntry::Http {
            url: "HTTPS://Example.com/mcp/".to_string(),
            env: HashMap::new(),
            disabled: false,
        };
        let b = BridgeManifestEntry::Http {
            url: "https://example.com/mcp".to_string(),
            env: HashMap::new(),
            disabled: false,
        };
        assert_eq!(identifier(&a), identifier(&b));
    }
}
