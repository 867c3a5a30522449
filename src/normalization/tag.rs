use itertools::Itertools;
use strsim::sorensen_dice;

/// Minimum similarity score (Sørensen-Dice over character bigrams of the
/// lowercase names) an existing tag must strictly exceed to absorb a new one.
pub const MIN_TAG_SIMILARITY: f64 = 0.80;

/// Title-cased spellings that map onto an established canonical tag.
pub const TAG_EXCEPTIONS: &[(&str, &str)] = &[
    ("Single Player", "Singleplayer"),
    ("Rogue-Lite", "Roguelite"),
];

/// Uppercase the first letter of every alphabetic run and lowercase the rest,
/// so "rogue-lite" becomes "Rogue-Lite" and "JRPG" becomes "Jrpg".
pub fn title_case(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_word = false;
    for c in raw.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

pub fn exception_for(name: &str) -> Option<&'static str> {
    TAG_EXCEPTIONS
        .iter()
        .find(|(alias, _)| *alias == name)
        .map(|(_, canonical)| *canonical)
}

/// Name a tag is stored under: trimmed, whitespace collapsed, title-cased,
/// then folded through the exception table.
pub fn canonical_tag_name(raw: &str) -> String {
    let titled = title_case(&raw.split_whitespace().join(" "));
    match exception_for(&titled) {
        Some(canonical) => canonical.to_string(),
        None => titled,
    }
}

/// Comparison key for fuzzy tag matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagKey {
    normalized: String,
}

impl TagKey {
    pub fn new(raw: &str) -> Self {
        Self {
            normalized: raw.trim().to_lowercase(),
        }
    }

    /// Bigram overlap in [0, 1]; whitespace is ignored.
    pub fn similarity(&self, other: &Self) -> f64 {
        sorensen_dice(&self.normalized, &other.normalized)
    }
}

/// Best existing tag for `candidate`, if one scores strictly above
/// [`MIN_TAG_SIMILARITY`]. Ties keep the first tag seen.
pub fn best_match<'a, I>(candidate: &str, existing: I) -> Option<(i64, f64)>
where
    I: IntoIterator<Item = (i64, &'a str)>,
{
    let key = TagKey::new(candidate);
    let mut best: Option<(i64, f64)> = None;
    for (tag_id, name) in existing {
        let score = key.similarity(&TagKey::new(name));
        if score <= MIN_TAG_SIMILARITY {
            continue;
        }
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((tag_id, score));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_cases_words_and_hyphenated_parts() {
        assert_eq!(title_case("rogue-lite"), "Rogue-Lite");
        assert_eq!(title_case("single player"), "Single Player");
        assert_eq!(title_case("JRPG"), "Jrpg");
        assert_eq!(title_case("2d platformer"), "2D Platformer");
    }

    #[test]
    fn exceptions_fold_known_spellings() {
        assert_eq!(canonical_tag_name("single  player"), "Singleplayer");
        assert_eq!(canonical_tag_name("ROGUE-LITE"), "Roguelite");
        assert_eq!(canonical_tag_name(" indie "), "Indie");
    }

    #[test]
    fn near_duplicates_match_existing_tags() {
        let existing = [(1, "First-Person"), (2, "Shooter")];
        let (id, score) = best_match("First Person", existing).unwrap();
        assert_eq!(id, 1);
        assert!(score > MIN_TAG_SIMILARITY);
    }

    #[test]
    fn distinct_tags_stay_apart() {
        assert_eq!(best_match("Puzzle", [(1, "Strategy"), (2, "Racing")]), None);
        assert_eq!(best_match("Roguelike", [(1, "Roguelite")]), None);
    }

    #[test]
    fn prefers_the_closest_match() {
        let existing = [(1, "Open World Survival"), (2, "Open World")];
        let (id, _) = best_match("open world", existing).unwrap();
        assert_eq!(id, 2);
    }
}
