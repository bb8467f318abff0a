//! Record name expansion relative to a zone.
//!
//! Record names are stored relative to their owning zone: `@` for the zone
//! apex, a bare label for an in-zone name, or a fully-qualified name (ending
//! in `.`) for anything else, including out-of-zone targets.

/// Expand a relative record name into a fully-qualified one.
///
/// - `resolve("@", "example.com.")` -> `"example.com."`
/// - `resolve("", "example.com.")` -> `"example.com."` (`""` is equivalent to `"@"`)
/// - `resolve("ns1", "example.com.")` -> `"ns1.example.com."`
/// - `resolve("ns2.example.com.", "example.org.")` -> `"ns2.example.com."` (already qualified)
pub fn resolve(name: &str, zone: &str) -> String {
    if name.ends_with('.') {
        return name.to_string();
    }

    match name {
        "@" | "" => zone.to_string(),
        _ => format!("{name}.{zone}"),
    }
}

/// Shorten a fully-qualified name relative to a zone, the inverse of [`resolve`].
///
/// - `simplify("example.com.", "example.com.")` -> `"@"`
/// - `simplify("ns1.example.com.", "example.com.")` -> `"ns1"`
/// - `simplify("ns2.example.com.", "example.org.")` -> `"ns2.example.com."` (not in zone, unchanged)
pub fn simplify(name: &str, zone: &str) -> String {
    if name == zone {
        return "@".to_string();
    }
    let suffix = format!(".{zone}");
    name.strip_suffix(&suffix).unwrap_or(name).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_apex() {
        assert_eq!(resolve("@", "example.com."), "example.com.");
        assert_eq!(resolve("", "example.com."), "example.com.");
    }

    #[test]
    fn resolve_relative() {
        assert_eq!(resolve("ns1", "example.com."), "ns1.example.com.");
    }

    #[test]
    fn resolve_already_qualified_is_unchanged() {
        assert_eq!(resolve("ns2.example.com.", "example.org."), "ns2.example.com.");
    }

    #[test]
    fn resolve_empty_zone() {
        assert_eq!(resolve("ns3", ""), "ns3.");
    }

    #[test]
    fn simplify_apex() {
        assert_eq!(simplify("example.com.", "example.com."), "@");
    }

    #[test]
    fn simplify_relative() {
        assert_eq!(simplify("ns1.example.com.", "example.com."), "ns1");
    }

    #[test]
    fn simplify_out_of_zone_is_unchanged() {
        assert_eq!(simplify("ns2.example.com.", "example.org."), "ns2.example.com.");
    }

    #[test]
    fn resolve_simplify_round_trip() {
        let zone = "example.com.";
        for name in ["@", "ns1", "mail", "a.b.c"] {
            let fqdn = resolve(name, zone);
            let back = simplify(&fqdn, zone);
            assert_eq!(back, name);
        }
    }
}
