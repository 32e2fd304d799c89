//! Date candidates and day/month disambiguation.

use chrono::{Datelike, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;

use super::{Candidate, PatternLibrary, Scanner, Tags};
use crate::models::receipt::{DateOrder, DateResolution, Field};
use crate::receipt::document::{Document, Region};

lazy_static! {
    static ref ORDINAL_SUFFIX: Regex = Regex::new(r"(?i)(\d)(?:st|nd|rd|th)\b").unwrap();
    static ref OF_WORD: Regex = Regex::new(r"(?i)\bof\b").unwrap();
    static ref SEPT: Regex = Regex::new(r"(?i)\bsept\b").unwrap();
}

const TEXTUAL_FORMATS: &[&str] = &[
    "%d %B %Y",
    "%d %b %Y",
    "%B %d %Y",
    "%b %d %Y",
    "%B %d/%Y",
    "%b %d/%Y",
];

/// Regions that write numeric dates month first.
const MONTH_FIRST_REGIONS: &[&str] = &["US", "CA", "PH", "FM", "MH", "PW"];

/// Plausible receipt years.
const MIN_YEAR: i32 = 1970;
const MAX_YEAR: i32 = 2100;

/// Signals used to order ambiguous numeric dates, strongest first.
#[derive(Debug, Clone, Default)]
pub struct DateHints {
    /// Region subtag of the caller's locale.
    pub locale_region: Option<String>,
    /// Regional convention suggested by the document.
    pub document_region: Option<Region>,
    /// Configured fallback.
    pub default_order: DateOrder,
}

/// Collect date candidates from every date rule.
pub fn candidates(
    scanner: &mut Scanner<'_>,
    library: &PatternLibrary,
    document: &Document<'_>,
    hints: &DateHints,
) -> Vec<Candidate<NaiveDate>> {
    let mut found = Vec::new();

    for spec in library.for_field(Field::Date) {
        for m in scanner.matches(spec) {
            let Some((date, resolution)) = parse_date(m.value, hints) else {
                continue;
            };
            if !(MIN_YEAR..=MAX_YEAR).contains(&date.year()) {
                continue;
            }

            let tags = Tags {
                date_resolution: Some(resolution),
                ..Tags::default()
            };

            found.push(
                Candidate::new(date, spec.name(), spec.priority(), m.raw)
                    .with_span(m.span)
                    .with_line(document.line_of(m.span.start))
                    .with_normalized(date.format("%Y-%m-%d").to_string())
                    .with_tags(tags),
            );
        }
    }

    found
}

/// Parse any supported date notation.
pub fn parse_date(value: &str, hints: &DateHints) -> Option<(NaiveDate, DateResolution)> {
    if value.chars().any(|c| c.is_alphabetic()) {
        return parse_textual_date(value).map(|d| (d, DateResolution::Unambiguous));
    }
    resolve_numeric_date(value, hints)
}

/// Parse a date with a month name, after removing ordinal suffixes
/// ("23rd November 2025", "Sept. 5, 2024", "Nov 23/2025").
pub fn parse_textual_date(value: &str) -> Option<NaiveDate> {
    let cleaned = ORDINAL_SUFFIX.replace_all(value, "$1");
    let cleaned = cleaned.replace([',', '.'], " ");
    let cleaned = OF_WORD.replace_all(&cleaned, " ");
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = SEPT.replace_all(&cleaned, "Sep");

    TEXTUAL_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&cleaned, format).ok())
}

/// Resolve a purely numeric date. A four-digit first part is year-first;
/// a component above 12 fixes the order; otherwise the hints decide.
pub fn resolve_numeric_date(value: &str, hints: &DateHints) -> Option<(NaiveDate, DateResolution)> {
    let separators: Vec<char> = value.chars().filter(|c| !c.is_ascii_digit()).collect();
    if separators.len() != 2 || separators[0] != separators[1] {
        return None;
    }

    let parts: Vec<&str> = value.split(separators[0]).collect();
    if parts.len() != 3 {
        return None;
    }

    if parts[0].len() == 4 {
        let year: i32 = parts[0].parse().ok()?;
        let month: u32 = parts[1].parse().ok()?;
        let day: u32 = parts[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day).map(|d| (d, DateResolution::Unambiguous));
    }

    let first: u32 = parts[0].parse().ok()?;
    let second: u32 = parts[1].parse().ok()?;
    let year = parse_year(parts[2])?;

    let (order, resolution) = match (first > 12, second > 12) {
        (true, true) => return None,
        (true, false) => (DateOrder::DayFirst, DateResolution::Unambiguous),
        (false, true) => (DateOrder::MonthFirst, DateResolution::Unambiguous),
        (false, false) if first == second => (DateOrder::MonthFirst, DateResolution::Unambiguous),
        (false, false) => contextual_order(hints),
    };

    let (month, day) = match order {
        DateOrder::MonthFirst => (first, second),
        DateOrder::DayFirst => (second, first),
    };

    NaiveDate::from_ymd_opt(year, month, day).map(|d| (d, resolution))
}

fn contextual_order(hints: &DateHints) -> (DateOrder, DateResolution) {
    if let Some(region) = hints.locale_region.as_deref() {
        let order = if MONTH_FIRST_REGIONS.contains(&region) {
            DateOrder::MonthFirst
        } else {
            DateOrder::DayFirst
        };
        return (order, DateResolution::CallerLocale);
    }

    match hints.document_region {
        Some(Region::NorthAmerica) => (DateOrder::MonthFirst, DateResolution::DocumentSignal),
        Some(Region::Europe) => (DateOrder::DayFirst, DateResolution::DocumentSignal),
        None => (hints.default_order, DateResolution::ConfiguredDefault),
    }
}

/// Parse a year; two-digit years map to 2000-2050 and 1951-1999.
fn parse_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    Some(match s.len() {
        2 if year <= 50 => 2000 + year,
        2 => 1900 + year,
        _ => year,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_ordinal_dates() {
        assert_eq!(parse_textual_date("23rd November 2025"), Some(ymd(2025, 11, 23)));
        assert_eq!(parse_textual_date("1st of March, 2024"), Some(ymd(2024, 3, 1)));
        assert_eq!(parse_textual_date("November 2nd, 2025"), Some(ymd(2025, 11, 2)));
    }

    #[test]
    fn test_textual_variants() {
        assert_eq!(parse_textual_date("Sept. 5, 2024"), Some(ymd(2024, 9, 5)));
        assert_eq!(parse_textual_date("Nov 23/2025"), Some(ymd(2025, 11, 23)));
        assert_eq!(parse_textual_date("JAN 7 2026"), Some(ymd(2026, 1, 7)));
        assert_eq!(parse_textual_date("31 February 2025"), None);
    }

    #[test]
    fn test_unambiguous_numeric() {
        let hints = DateHints::default();
        assert_eq!(
            resolve_numeric_date("15/03/2025", &hints),
            Some((ymd(2025, 3, 15), DateResolution::Unambiguous))
        );
        assert_eq!(
            resolve_numeric_date("03/15/2025", &hints),
            Some((ymd(2025, 3, 15), DateResolution::Unambiguous))
        );
        assert_eq!(
            resolve_numeric_date("2025.03.04", &hints),
            Some((ymd(2025, 3, 4), DateResolution::Unambiguous))
        );
        assert_eq!(
            resolve_numeric_date("07-07-24", &hints),
            Some((ymd(2024, 7, 7), DateResolution::Unambiguous))
        );
        assert_eq!(resolve_numeric_date("13/14/2025", &hints), None);
        assert_eq!(resolve_numeric_date("03/04-2025", &hints), None);
    }

    #[test]
    fn test_ambiguous_numeric_uses_hints() {
        let locale = DateHints {
            locale_region: Some("GB".to_string()),
            document_region: Some(Region::NorthAmerica),
            default_order: DateOrder::MonthFirst,
        };
        assert_eq!(
            resolve_numeric_date("03/04/2025", &locale),
            Some((ymd(2025, 4, 3), DateResolution::CallerLocale))
        );

        let document = DateHints {
            document_region: Some(Region::NorthAmerica),
            ..DateHints::default()
        };
        assert_eq!(
            resolve_numeric_date("03/04/2025", &document),
            Some((ymd(2025, 3, 4), DateResolution::DocumentSignal))
        );

        let fallback = DateHints {
            default_order: DateOrder::DayFirst,
            ..DateHints::default()
        };
        assert_eq!(
            resolve_numeric_date("03/04/2025", &fallback),
            Some((ymd(2025, 4, 3), DateResolution::ConfiguredDefault))
        );
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year("24"), Some(2024));
        assert_eq!(parse_year("50"), Some(2050));
        assert_eq!(parse_year("51"), Some(1951));
        assert_eq!(parse_year("2025"), Some(2025));
    }
}
