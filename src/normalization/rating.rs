use crate::model::RawRating;

/// Upper bound of the star scale storefronts report averages on.
pub const MAX_STARS: f64 = 5.0;

/// Map a storefront rating onto the shared 0-100 scale, rounded to two decimals.
///
/// Absent ratings, zero vote totals and out-of-scale star values all map to `None`;
/// a rating of zero is only produced when the storefront actually reported one.
pub fn to_percentage(raw: &RawRating) -> Option<f64> {
    match *raw {
        RawRating::Absent => None,
        RawRating::Stars(stars) => from_stars(stars),
        RawRating::Votes { positive, negative } => from_votes(positive, negative),
    }
}

pub fn from_stars(stars: f64) -> Option<f64> {
    if !stars.is_finite() || !(0.0..=MAX_STARS).contains(&stars) {
        return None;
    }
    Some(round2(stars * (100.0 / MAX_STARS)))
}

pub fn from_votes(positive: Option<u64>, negative: Option<u64>) -> Option<f64> {
    match (positive, negative) {
        (None, None) => None,
        (Some(0), None) | (None, Some(0)) => None,
        (Some(_), None) => Some(100.0),
        (None, Some(_)) => Some(0.0),
        (Some(0), Some(0)) => None,
        // Summed as floats so huge counts cannot overflow.
        (Some(p), Some(n)) => Some(round2(p as f64 / (p as f64 + n as f64) * 100.0)),
    }
}

/// Parse a "4.5 stars" or "4,5" style label into a star value.
pub fn parse_star_string(input: &str) -> Option<f64> {
    let digits: String = input
        .trim()
        .chars()
        .take_while(|c| *c != ' ' && *c != '/')
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    digits.parse::<f64>().ok()
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_stars_to_percentage() {
        assert_eq!(to_percentage(&RawRating::Stars(3.5)), Some(70.0));
        assert_eq!(to_percentage(&RawRating::Stars(0.0)), Some(0.0));
        assert_eq!(to_percentage(&RawRating::Stars(5.0)), Some(100.0));
        assert_eq!(to_percentage(&RawRating::Stars(4.37)), Some(87.4));
    }

    #[test]
    fn rejects_out_of_scale_stars() {
        assert_eq!(to_percentage(&RawRating::Stars(7.5)), None);
        assert_eq!(to_percentage(&RawRating::Stars(-1.0)), None);
        assert_eq!(to_percentage(&RawRating::Stars(f64::NAN)), None);
    }

    #[test]
    fn computes_vote_share() {
        let rating = RawRating::Votes {
            positive: Some(105),
            negative: Some(103),
        };
        assert_eq!(to_percentage(&rating), Some(50.48));
    }

    #[test]
    fn one_sided_votes() {
        assert_eq!(from_votes(Some(12), None), Some(100.0));
        assert_eq!(from_votes(None, Some(3)), Some(0.0));
        assert_eq!(from_votes(Some(0), None), None);
        assert_eq!(from_votes(None, Some(0)), None);
    }

    #[test]
    fn vote_totals_past_u64_still_rate() {
        assert_eq!(from_votes(Some(u64::MAX), Some(u64::MAX)), Some(50.0));
        assert_eq!(from_votes(Some(u64::MAX), Some(0)), Some(100.0));
        assert_eq!(from_votes(Some(1), Some(u64::MAX)), Some(0.0));
    }

    #[test]
    fn zero_total_is_absent_not_zero() {
        assert_eq!(from_votes(Some(0), Some(0)), None);
        assert_eq!(from_votes(None, None), None);
        assert_eq!(to_percentage(&RawRating::Absent), None);
    }

    #[test]
    fn percentage_stays_in_bounds() {
        for (p, n) in [(1, 0), (0, 1), (7, 3), (999_999, 1)] {
            let pct = from_votes(Some(p), Some(n)).unwrap();
            assert!((0.0..=100.0).contains(&pct), "{p}/{n} -> {pct}");
        }
    }

    #[test]
    fn parses_star_labels() {
        assert_eq!(parse_star_string("4.5 stars"), Some(4.5));
        assert_eq!(parse_star_string("3,8/5"), Some(3.8));
        assert_eq!(parse_star_string("n/a"), None);
    }
}
