//! Region canonicalization
//!
//! Cloud Scheduler and App Engine still use the legacy multi-zone location
//! ids. Everything else in a plan wants a concrete region.

/// Legacy location id -> concrete region
const REGION_ALIASES: &[(&str, &str)] = &[
    ("europe-west", "europe-west1"),
    ("us-central", "us-central1"),
];

/// Default region when neither the deployment nor the user config sets one
pub const DEFAULT_REGION: &str = "us-central1";

/// Map a region alias to its concrete region, or return it unchanged
pub fn canonicalize(region: &str) -> String {
    REGION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == region)
        .map(|(_, target)| target.to_string())
        .unwrap_or_else(|| region.to_string())
}

/// Get the region a zone belongs to (`us-central1-a` -> `us-central1`)
pub fn region_from_zone(zone: &str) -> String {
    let parts: Vec<&str> = zone.rsplitn(2, '-').collect();
    if parts.len() == 2 && parts[0].len() == 1 {
        parts[1].to_string()
    } else {
        zone.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_resolves() {
        assert_eq!(canonicalize("europe-west"), "europe-west1");
        assert_eq!(canonicalize("us-central"), "us-central1");
    }

    #[test]
    fn test_unknown_region_unchanged() {
        assert_eq!(canonicalize("asia-east1"), "asia-east1");
        assert_eq!(canonicalize(""), "");
    }

    #[test]
    fn test_region_from_zone() {
        assert_eq!(region_from_zone("us-central1-a"), "us-central1");
        assert_eq!(region_from_zone("europe-west4-c"), "europe-west4");
        // Already a region
        assert_eq!(region_from_zone("asia-east1"), "asia-east1");
    }
}
