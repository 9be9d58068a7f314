use std::cmp::Ordering;

/// Sort key for a version string. Never displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VersionKey {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl VersionKey {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

/// Anything that fails to parse sorts after every real version.
pub const INVALID_VERSION: VersionKey = VersionKey::new(999, 999, 999);

const LUNA_PREFIX: &str = "Luna ";
const LUNA_MAJOR: u32 = 5;
const LUNA_MINOR_OFFSET: u32 = 8;

/// Parse `N`, `N.M`, `N.M.P` or `Luna <Roman>` into a comparable key.
///
/// Luna releases sit after 5.8 on the ordinary calendar: `Luna I` is `5.9.0`
/// and `Luna II` is `5.10.0`. Anything else with a non-numeric component,
/// including a suffixed `Luna I.1`, collapses to [`INVALID_VERSION`].
pub fn parse_version(version: &str) -> VersionKey {
    if let Some(key) = parse_luna_version(version) {
        return key;
    }

    let mut parts = Vec::with_capacity(3);
    for part in version.split('.') {
        match part.trim().parse::<u32>() {
            Ok(value) => parts.push(value),
            Err(_) => return INVALID_VERSION,
        }
    }
    parts.resize(parts.len().max(3), 0);
    VersionKey::new(parts[0], parts[1], parts[2])
}

pub fn compare_versions(left: &str, right: &str) -> Ordering {
    parse_version(left).cmp(&parse_version(right))
}

/// Stable sort by parsed version.
pub fn sort_versions(versions: &mut [String]) {
    versions.sort_by_key(|version| parse_version(version));
}

fn parse_luna_version(version: &str) -> Option<VersionKey> {
    let numeral = version.strip_prefix(LUNA_PREFIX)?;
    if numeral.is_empty() || !numeral.chars().all(|c| matches!(c, 'I' | 'V' | 'X')) {
        return None;
    }

    let luna = roman_to_int(numeral).unwrap_or(1);
    Some(VersionKey::new(LUNA_MAJOR, LUNA_MINOR_OFFSET + luna, 0))
}

fn roman_to_int(numeral: &str) -> Option<u32> {
    let value = match numeral {
        "I" => 1,
        "II" => 2,
        "III" => 3,
        "IV" => 4,
        "V" => 5,
        "VI" => 6,
        "VII" => 7,
        "VIII" => 8,
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordinary_versions_pad_missing_components() {
        assert_eq!(parse_version("2"), VersionKey::new(2, 0, 0));
        assert_eq!(parse_version("1.2"), VersionKey::new(1, 2, 0));
        assert_eq!(parse_version("3.4.1"), VersionKey::new(3, 4, 1));
        assert_eq!(parse_version("1.2.3.4"), VersionKey::new(1, 2, 3));
    }

    #[test]
    fn ordinary_versions_order_like_humans_expect() {
        assert!(parse_version("1.2") < parse_version("1.3"));
        assert!(parse_version("1.3") < parse_version("2.0"));
        assert!(parse_version("1.10") > parse_version("1.9"));
    }

    #[test]
    fn luna_versions_map_after_five_eight() {
        assert_eq!(parse_version("Luna I"), parse_version("5.9.0"));
        assert_eq!(parse_version("Luna III"), parse_version("5.11.0"));
        assert_eq!(parse_version("Luna VIII"), VersionKey::new(5, 16, 0));
        assert!(parse_version("5.8.3") < parse_version("Luna I"));
    }

    #[test]
    fn unknown_roman_numeral_defaults_to_one() {
        assert_eq!(parse_version("Luna IX"), VersionKey::new(5, 9, 0));
        assert_eq!(parse_version("Luna XX"), VersionKey::new(5, 9, 0));
    }

    #[test]
    fn malformed_versions_collapse_to_sentinel() {
        assert_eq!(parse_version("garbage"), INVALID_VERSION);
        assert_eq!(parse_version("1.x"), INVALID_VERSION);
        assert_eq!(parse_version(""), INVALID_VERSION);
        assert_eq!(parse_version("Luna"), INVALID_VERSION);
        assert_eq!(parse_version("Luna i"), INVALID_VERSION);
        assert_eq!(parse_version("Luna I.1"), INVALID_VERSION);
        assert_eq!(parse_version("Luna II.3"), INVALID_VERSION);
        assert_eq!(parse_version("Luna I "), INVALID_VERSION);
        assert!(parse_version("garbage") > parse_version("Luna VIII"));
        assert!(parse_version("garbage") > parse_version("99.99.99"));
    }

    #[test]
    fn sort_versions_is_stable_for_equal_keys() {
        let mut versions = vec![
            "2.0".to_string(),
            "bogus".to_string(),
            "Luna I".to_string(),
            "5.9".to_string(),
            "1.1.1".to_string(),
        ];
        sort_versions(&mut versions);
        assert_eq!(versions, vec!["1.1.1", "2.0", "Luna I", "5.9", "bogus"]);
        assert_eq!(compare_versions("Luna I", "5.9"), Ordering::Equal);
    }
}
