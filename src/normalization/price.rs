use crate::model::{Price, RawPrice};

/// Best-effort parse of a storefront price label into major currency units.
///
/// "Free", "Free to Play" and anything without digits parse as 0. Currency
/// symbols are ignored and both `1,299.00` and `19,99` style separators are
/// understood.
pub fn parse_price_text(raw: &str) -> f64 {
    let text = raw.trim();
    if text.is_empty() || text.to_ascii_lowercase().contains("free") {
        return 0.0;
    }

    let number: String = text
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let number = number.trim_end_matches(['.', ',']);
    if number.is_empty() {
        return 0.0;
    }

    match normalize_separators(number).parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => 0.0,
    }
}

/// Rewrite a digits-and-separators run so the decimal mark is `.` and
/// grouping marks are gone.
fn normalize_separators(number: &str) -> String {
    let last_dot = number.rfind('.');
    let last_comma = number.rfind(',');
    let decimal_at = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => Some(dot.max(comma)),
        (Some(dot), None) => decimal_if_cents(number, dot),
        (None, Some(comma)) => decimal_if_cents(number, comma),
        (None, None) => None,
    };

    number
        .char_indices()
        .filter_map(|(idx, c)| match c {
            '.' | ',' if Some(idx) == decimal_at => Some('.'),
            '.' | ',' => None,
            digit => Some(digit),
        })
        .collect()
}

/// A lone separator followed by exactly three digits is thousands grouping;
/// anything else is a decimal mark.
fn decimal_if_cents(number: &str, at: usize) -> Option<usize> {
    let trailing = number.len() - at - 1;
    if trailing == 3 {
        None
    } else {
        Some(at)
    }
}

pub fn to_price(raw: RawPrice) -> Price {
    match raw {
        RawPrice::Major(major) => Price::from_major(major),
        RawPrice::Minor(minor) => Price::from_minor(minor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_labels_are_zero() {
        assert_eq!(parse_price_text("Free"), 0.0);
        assert_eq!(parse_price_text("Free to Play"), 0.0);
        assert_eq!(parse_price_text("  free demo "), 0.0);
        assert_eq!(to_price(RawPrice::Major(parse_price_text("Free"))), Price::ZERO);
    }

    #[test]
    fn strips_currency_symbols() {
        assert_eq!(parse_price_text("£4.99"), 4.99);
        assert_eq!(parse_price_text("$19.99 USD"), 19.99);
        assert_eq!(parse_price_text("CDN$ 24.99"), 24.99);
    }

    #[test]
    fn handles_comma_decimals_and_grouping() {
        assert_eq!(parse_price_text("19,99€"), 19.99);
        assert_eq!(parse_price_text("$1,299.00"), 1299.0);
        assert_eq!(parse_price_text("1.299,50 €"), 1299.5);
        assert_eq!(parse_price_text("₩ 22,000"), 22000.0);
    }

    #[test]
    fn malformed_text_is_zero() {
        assert_eq!(parse_price_text(""), 0.0);
        assert_eq!(parse_price_text("coming soon"), 0.0);
        assert_eq!(parse_price_text("--"), 0.0);
    }

    #[test]
    fn minor_units_are_exact() {
        assert_eq!(to_price(RawPrice::Minor(1999)).to_string(), "19.99");
        assert_eq!(to_price(RawPrice::Minor(-1)), Price::ZERO);
        assert_eq!(to_price(RawPrice::Major(4.99)).minor(), 499);
    }
}
