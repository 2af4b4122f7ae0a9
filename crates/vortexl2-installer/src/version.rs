// SPDX-License-Identifier: CC-BY-NC-ND-4.0

//! Version tag normalization and parsing

/// First release line that ships the EasyTier mesh mode
pub const MESH_MIN_MAJOR: u32 = 4;

/// Strip one leading "v"/"V" from a tag
pub fn version_from_tag(tag: &str) -> &str {
    tag.strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag)
}

/// Canonical tag form: "1.2.3" and "v1.2.3" both become "v1.2.3"
pub fn normalize_tag(spec: &str) -> String {
    format!("v{}", version_from_tag(spec.trim()))
}

/// Numeric major component of a tag, i.e. everything before the first '.'
pub fn parse_major(tag: &str) -> Option<u32> {
    let version = version_from_tag(tag);
    let major = version.split('.').next().unwrap_or(version);
    major.parse::<u32>().ok()
}

/// Whether a tagged release is new enough for mesh mode.
///
/// Unparsable tags never qualify.
pub fn tag_supports_mesh(tag: &str) -> bool {
    parse_major(tag).is_some_and(|major| major >= MESH_MIN_MAJOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tag() {
        assert_eq!(normalize_tag("1.2.3"), "v1.2.3");
        assert_eq!(normalize_tag("v1.2.3"), "v1.2.3");
        assert_eq!(normalize_tag("V1.2.3"), "v1.2.3");
        assert_eq!(normalize_tag(" 5.1.0 "), "v5.1.0");
    }

    #[test]
    fn test_prefixed_and_bare_are_equivalent() {
        for bare in ["0.9.1", "2.0.0", "4.0.0-beta", "12.3"] {
            assert_eq!(normalize_tag(bare), normalize_tag(&format!("v{bare}")));
        }
    }

    #[test]
    fn test_parse_major() {
        assert_eq!(parse_major("v2.0.0"), Some(2));
        assert_eq!(parse_major("4.1.7"), Some(4));
        assert_eq!(parse_major("v10"), Some(10));
        assert_eq!(parse_major("V5.0"), Some(5));
    }

    #[test]
    fn test_parse_major_invalid() {
        assert_eq!(parse_major("vnext"), None);
        assert_eq!(parse_major(""), None);
        assert_eq!(parse_major("v.1.2"), None);
        assert_eq!(parse_major("4-rc1.0"), None);
    }

    #[test]
    fn test_tag_supports_mesh() {
        assert!(!tag_supports_mesh("v2.0.0"));
        assert!(!tag_supports_mesh("v3.9.9"));
        assert!(tag_supports_mesh("v4.0.0"));
        assert!(tag_supports_mesh("v5.1.0"));
        assert!(!tag_supports_mesh("latest"));
    }

    #[test]
    fn test_version_from_tag_strips_v() {
        assert_eq!(version_from_tag("v0.2.38"), "0.2.38");
        assert_eq!(version_from_tag("V0.2.38"), "0.2.38");
        assert_eq!(version_from_tag("0.2.38"), "0.2.38");
    }

    #[test]
    fn test_only_one_prefix_is_stripped() {
        assert_eq!(version_from_tag("vv1.0"), "v1.0");
        assert_eq!(version_from_tag("Vv1.0"), "v1.0");
        assert_eq!(normalize_tag("vv5.1.0"), "vv5.1.0");
        assert_eq!(parse_major("vv5.1.0"), None);
    }
}
