use std::collections::BTreeSet;

use itertools::Itertools;

use crate::model::PlatformId;

/// Tags that are really platform names. Matched whole, ignoring case and
/// repeated whitespace, so "Mac" is a platform but "Macabre" is a tag.
const PLATFORM_TAGS: &[(&str, PlatformId)] = &[
    ("windows", PlatformId::Windows),
    ("mac os", PlatformId::MacOs),
    ("macos", PlatformId::MacOs),
    ("mac", PlatformId::MacOs),
    ("osx", PlatformId::MacOs),
    ("os x", PlatformId::MacOs),
    ("linux", PlatformId::Linux),
    ("steamos", PlatformId::Linux),
    ("steamos + linux", PlatformId::Linux),
];

/// Keywords searched for inside free-text platform labels such as
/// "SteamOS + Linux" or "Windows 10 64-bit".
const PLATFORM_KEYWORDS: &[(&str, PlatformId)] = &[
    ("windows", PlatformId::Windows),
    ("mac", PlatformId::MacOs),
    ("osx", PlatformId::MacOs),
    ("os x", PlatformId::MacOs),
    ("linux", PlatformId::Linux),
    ("steamos", PlatformId::Linux),
    ("ubuntu", PlatformId::Linux),
];

/// Canonical comparison form: lowercase with whitespace runs collapsed.
fn platform_key(raw: &str) -> String {
    raw.split_whitespace().join(" ").to_lowercase()
}

/// Platform named by a tag, if the whole tag is a platform name.
pub fn platform_for_tag(tag: &str) -> Option<PlatformId> {
    let key = platform_key(tag);
    PLATFORM_TAGS
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, platform)| *platform)
}

/// Every platform a free-text label mentions.
pub fn platforms_from_label(label: &str) -> BTreeSet<PlatformId> {
    let key = platform_key(label);
    PLATFORM_KEYWORDS
        .iter()
        .filter(|(keyword, _)| key.contains(keyword))
        .map(|(_, platform)| *platform)
        .collect()
}

/// Split tags into genuine tags and the platforms hidden among them.
/// Tag order is kept.
pub fn partition_tags(tags: Vec<String>) -> (Vec<String>, BTreeSet<PlatformId>) {
    let mut platforms = BTreeSet::new();
    let mut kept = Vec::with_capacity(tags.len());
    for tag in tags {
        match platform_for_tag(&tag) {
            Some(platform) => {
                platforms.insert(platform);
            }
            None => kept.push(tag),
        }
    }
    (kept, platforms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_platform_tags_case_insensitively() {
        assert_eq!(platform_for_tag("Windows"), Some(PlatformId::Windows));
        assert_eq!(platform_for_tag("MAC  OS"), Some(PlatformId::MacOs));
        assert_eq!(platform_for_tag("SteamOS + Linux"), Some(PlatformId::Linux));
        assert_eq!(platform_for_tag("Macabre"), None);
        assert_eq!(platform_for_tag("Indie"), None);
    }

    #[test]
    fn labels_may_name_several_platforms() {
        let both = platforms_from_label("Windows, Mac OS X");
        assert_eq!(
            both,
            BTreeSet::from([PlatformId::Windows, PlatformId::MacOs])
        );
        assert_eq!(
            platforms_from_label("SteamOS + Linux"),
            BTreeSet::from([PlatformId::Linux])
        );
        assert!(platforms_from_label("Nintendo Switch").is_empty());
    }

    #[test]
    fn partition_moves_platforms_out_of_tags() {
        let tags = vec![
            "Indie".to_string(),
            "Windows".to_string(),
            "Roguelite".to_string(),
            "Linux".to_string(),
        ];
        let (kept, platforms) = partition_tags(tags);
        assert_eq!(kept, vec!["Indie".to_string(), "Roguelite".to_string()]);
        assert_eq!(
            platforms,
            BTreeSet::from([PlatformId::Windows, PlatformId::Linux])
        );
    }
}
