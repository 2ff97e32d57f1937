//! Email body formatting.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use rust_decimal::{Decimal, RoundingStrategy};

static FRACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b0\.\d+\b").unwrap_or_else(|e| panic!("invalid fraction pattern: {e}"))
});

/// Rewrite every `0.<digits>` literal as a two-decimal percentage
/// (`0.1234` → `12.34%`).
pub fn format_percentages(body: &str) -> String {
    FRACTION
        .replace_all(body, |caps: &Captures<'_>| {
            let raw = &caps[0];
            match Decimal::from_str(raw) {
                Ok(value) => {
                    let pct = (value * Decimal::ONE_HUNDRED)
                        .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven);
                    format!("{pct:.2}%")
                }
                Err(_) => raw.to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_fractions() {
        assert_eq!(format_percentages("limit 0.1234"), "limit 12.34%");
        assert_eq!(format_percentages("0.5"), "50.00%");
        assert_eq!(format_percentages("0.00071"), "0.07%");
    }

    #[test]
    fn formats_every_occurrence() {
        assert_eq!(
            format_percentages("exposure 0.25 above limit 0.2"),
            "exposure 25.00% above limit 20.00%"
        );
    }

    #[test]
    fn leaves_other_numbers_alone() {
        assert_eq!(format_percentages("10.5 and 1.25"), "10.5 and 1.25");
        assert_eq!(format_percentages("rule 42"), "rule 42");
    }

    #[test]
    fn rounds_half_to_even() {
        assert_eq!(format_percentages("0.12345"), "12.34%");
        assert_eq!(format_percentages("0.12355"), "12.36%");
    }

    #[test]
    fn works_inside_markup() {
        assert_eq!(
            format_percentages("<td>0.031</td>"),
            "<td>3.10%</td>"
        );
    }
}
