//! Vendor candidates: sender metadata, email headers, merchant phrases and
//! structural line heuristics, with shape tags for scoring.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use super::patterns::{AMOUNT_KEYWORD, FORWARDED_MARKER, HEADER_LINE, TAX_KEYWORD};
use super::{Candidate, PatternLibrary, Scanner, Tags};
use crate::models::receipt::{Field, ParseContext, Span};
use crate::receipt::document::{is_personal_webmail, Document};

pub const SENDER_DOMAIN: &str = "sender_domain";
pub const CONTEXT_SENDER_NAME: &str = "context_sender_name";
pub const SUBJECT_PHRASE: &str = "subject_phrase";
pub const MERGED_LINES: &str = "merged_lines";
pub const LINE_HEURISTIC: &str = "line_heuristic";

/// Vendor rules that are not regular expressions.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StructuralRule {
    pub name: &'static str,
    pub priority: u8,
    pub note: &'static str,
}

pub const STRUCTURAL_RULES: &[StructuralRule] = &[
    StructuralRule {
        name: SENDER_DOMAIN,
        priority: 1,
        note: "Registrable label of the sender domain; personal webmail is ignored",
    },
    StructuralRule {
        name: CONTEXT_SENDER_NAME,
        priority: 2,
        note: "Sender display name with generic words removed",
    },
    StructuralRule {
        name: SUBJECT_PHRASE,
        priority: 3,
        note: "Merchant phrase in the subject line",
    },
    StructuralRule {
        name: MERGED_LINES,
        priority: 3,
        note: "Two adjacent short capitalized lines joined into one name",
    },
    StructuralRule {
        name: LINE_HEURISTIC,
        priority: 4,
        note: "Plausible name lines near the top of the body",
    },
];

/// Lines scanned by the line heuristics, counted from the body start.
const LINE_SCAN_LIMIT: usize = 25;

const MAX_VENDOR_WORDS: usize = 6;

/// Words dropped from `From:` display names.
const GENERIC_SENDER_WORDS: &[&str] = &[
    "receipts", "receipt", "notifications", "notification", "no-reply", "noreply", "do-not-reply",
    "billing", "team", "support", "orders", "order", "payments", "mailer", "info", "the", "via",
];

/// First words of lines that are never a vendor name.
const SKIP_LINE_START: &[&str] = &[
    "your", "thank", "thanks", "order", "invoice", "receipt", "date", "total", "subtotal",
    "payment", "paid", "amount", "dear", "hi", "hello", "to", "from", "subject", "sent", "bill",
    "billed", "ship", "shipping", "qty", "item", "items", "description", "price", "balance",
    "account", "customer", "cashier", "transaction", "card", "visa", "mastercard", "amex", "tel",
    "phone", "fax", "email", "welcome", "please", "questions", "view", "download", "unsubscribe",
    "copyright", "page", "summary", "details", "trip", "ride", "fare",
];

const ENTITY_SUFFIXES: &[&str] = &[
    "inc", "llc", "ltd", "limited", "corp", "corporation", "co", "company", "gmbh", "plc", "lp",
    "llp", "sa", "ag", "pty", "incorporated",
];

/// Payment processors that stand between the customer and the merchant.
const PAYMENT_PROCESSORS: &[&str] = &[
    "paddle", "stripe", "square", "paypal", "fastspring", "2checkout",
];

/// Descriptor tokens that only name the processor or a domain suffix.
const DESCRIPTOR_NOISE: &[&str] = &["net", "com", "inc", "paddle", "sq", "sp", "tst", "pp", "paypal"];

const SECOND_LEVEL_SUFFIXES: &[&str] = &["co", "com", "org", "net", "gov", "ac", "ltd"];

lazy_static! {
    static ref MONEY_OR_DATE: Regex = Regex::new(
        r"\d[.,]\d{2}\b|\d{1,4}[/.-]\d{1,2}[/.-]\d{2,4}|\d{4,}"
    ).unwrap();

    static ref PAGE_LINE: Regex = Regex::new(r"(?i)^page\s+\d").unwrap();

    static ref URL_LIKE: Regex = Regex::new(r"(?i)https?://|www\.|\.(?:com|ca|net|org|io)\b").unwrap();
}

/// Coarse business categories recognized from name keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessCategory {
    Retail,
    Medical,
    Hospitality,
    FoodService,
}

impl BusinessCategory {
    pub const ALL: [BusinessCategory; 4] = [
        BusinessCategory::Retail,
        BusinessCategory::Medical,
        BusinessCategory::Hospitality,
        BusinessCategory::FoodService,
    ];

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            BusinessCategory::Retail => &[
                "store", "stores", "shop", "market", "mart", "outlet", "boutique", "supply",
                "supplies", "hardware", "books", "electronics", "depot", "goods", "trading",
                "wholesale",
            ],
            BusinessCategory::Medical => &[
                "clinic", "medical", "dental", "dentistry", "pharmacy", "health", "hospital",
                "physio", "physiotherapy", "chiropractic", "optometry", "vision", "wellness",
                "drug", "drugs", "laboratory",
            ],
            BusinessCategory::Hospitality => &[
                "hotel", "hotels", "inn", "motel", "resort", "suites", "lodge", "hostel", "spa",
            ],
            BusinessCategory::FoodService => &[
                "restaurant", "cafe", "café", "coffee", "bistro", "grill", "bar", "pub", "pizza",
                "pizzeria", "bakery", "kitchen", "diner", "eatery", "sushi", "burger", "deli",
                "brewery",
            ],
        }
    }

    /// Categories whose keywords appear as words of `name`.
    pub fn detect(name: &str) -> Vec<BusinessCategory> {
        let words = lowercase_words(name);
        BusinessCategory::ALL
            .into_iter()
            .filter(|category| {
                category
                    .keywords()
                    .iter()
                    .any(|k| words.iter().any(|w| w == k))
            })
            .collect()
    }
}

/// Collect vendor candidates from context, rules and line structure.
pub fn candidates(
    scanner: &mut Scanner<'_>,
    library: &PatternLibrary,
    document: &Document<'_>,
    context: Option<&ParseContext>,
) -> Vec<Candidate<String>> {
    let mut found = Vec::new();

    if let Some(context) = context {
        context_candidates(library, context, &mut found);
    }

    for spec in library.for_field(Field::Vendor) {
        for m in scanner.matches(spec) {
            let (value, from_header) = match spec.name() {
                "from_header" => (from_header_name(m.value), true),
                "statement_descriptor" => (descriptor_merchant(m.value), false),
                _ => (clean_vendor(m.value), false),
            };
            let Some(value) = value else {
                continue;
            };

            let mut tags = tag_vendor(&value);
            tags.from_header = from_header;

            found.push(
                Candidate::new(value.clone(), spec.name(), spec.priority(), m.raw)
                    .with_span(m.span)
                    .with_line(document.line_of(m.span.start))
                    .with_normalized(value)
                    .with_tags(tags),
            );
        }
    }

    line_candidates(document, &mut found);
    found
}

fn context_candidates(library: &PatternLibrary, context: &ParseContext, found: &mut Vec<Candidate<String>>) {
    let domain = context.effective_domain();
    let personal = domain.as_deref().is_some_and(is_personal_webmail);

    if !personal {
        if let Some(domain) = domain.as_deref() {
            if let Some(value) = vendor_from_domain(domain) {
                found.push(context_candidate(value, SENDER_DOMAIN, 1, domain, false));
            }
        }

        if let Some(name) = context.sender_display_name() {
            if let Some(value) = strip_generic_words(&name) {
                found.push(context_candidate(value, CONTEXT_SENDER_NAME, 2, &name, true));
            }
        }
    }

    if let (Some(subject), Some(spec)) = (context.subject.as_deref(), library.get("merchant_phrase")) {
        let phrase = spec
            .regex()
            .captures(subject)
            .and_then(|caps| caps.name("value"))
            .and_then(|m| clean_vendor(m.as_str()));
        if let Some(value) = phrase {
            found.push(context_candidate(value, SUBJECT_PHRASE, 3, subject, false));
        }
    }
}

fn context_candidate(value: String, pattern: &str, priority: u8, raw: &str, from_header: bool) -> Candidate<String> {
    let mut tags = tag_vendor(&value);
    tags.from_header = from_header;
    Candidate::new(value.clone(), pattern, priority, raw)
        .with_normalized(value)
        .with_tags(tags)
}

/// Single and merged line candidates near the top of the body.
fn line_candidates(document: &Document<'_>, found: &mut Vec<Candidate<String>>) {
    let first = document.body_start();
    let last = (first + LINE_SCAN_LIMIT).min(document.line_count());
    let mut previous_short: Option<(usize, &str)> = None;

    for index in first..last {
        let line = document.line(index);
        if !plausible_vendor_line(line) {
            previous_short = None;
            continue;
        }

        let start = document.line_offset(index);
        if let Some(value) = clean_vendor(line) {
            found.push(
                Candidate::new(value.clone(), LINE_HEURISTIC, 4, line)
                    .with_span(Span::new(start, start + line.len()))
                    .with_line(index)
                    .with_normalized(value.clone())
                    .with_tags(tag_vendor(&value)),
            );
        }

        if is_short_capitalized(line) {
            if let Some((previous, previous_line)) = previous_short {
                let joined = format!("{} {}", previous_line, line);
                if let Some(value) = clean_vendor(&joined) {
                    let span_start = document.line_offset(previous);
                    found.push(
                        Candidate::new(value.clone(), MERGED_LINES, 3, joined)
                            .with_span(Span::new(span_start, start + line.len()))
                            .with_line(previous)
                            .with_normalized(value.clone())
                            .with_tags(tag_vendor(&value)),
                    );
                }
            }
            previous_short = Some((index, line));
        } else {
            previous_short = None;
        }
    }
}

/// Whether a line could be a business name.
fn plausible_vendor_line(line: &str) -> bool {
    let line = line.trim();
    let length = line.chars().count();
    if !(3..=60).contains(&length) {
        return false;
    }
    if line.starts_with(|c: char| c.is_ascii_digit()) || line.contains('@') {
        return false;
    }
    if HEADER_LINE.is_match(line)
        || FORWARDED_MARKER.is_match(line)
        || PAGE_LINE.is_match(line)
        || URL_LIKE.is_match(line)
        || MONEY_OR_DATE.is_match(line)
        || AMOUNT_KEYWORD.is_match(line)
        || TAX_KEYWORD.is_match(line)
    {
        return false;
    }
    if !line.chars().any(|c| c.is_alphabetic()) {
        return false;
    }

    let first_word = lowercase_words(line).into_iter().next().unwrap_or_default();
    !SKIP_LINE_START.contains(&first_word.as_str())
}

fn is_short_capitalized(line: &str) -> bool {
    let words: Vec<&str> = line.split_whitespace().collect();
    (1..=2).contains(&words.len())
        && line.chars().count() <= 20
        && !line.chars().any(|c| c.is_ascii_digit())
        && line.starts_with(|c: char| c.is_uppercase())
}

/// Clean a raw name: keep letters, digits and `&'.-`, cap the word count
/// and title-case names written entirely in capitals.
pub fn clean_vendor(raw: &str) -> Option<String> {
    let kept: String = raw
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '&' | '\'' | '.' | '-') {
                c
            } else {
                ' '
            }
        })
        .collect();

    let words: Vec<&str> = kept.split_whitespace().take(MAX_VENDOR_WORDS).collect();
    let joined = words.join(" ");
    let trimmed = joined
        .trim_matches(|c: char| matches!(c, '.' | '-' | '\'' | '&') || c.is_whitespace())
        .to_string();

    let length = trimmed.chars().count();
    if !(2..=60).contains(&length) || !trimmed.chars().any(|c| c.is_alphabetic()) {
        return None;
    }

    if trimmed.chars().any(|c| c.is_lowercase()) {
        return Some(trimmed);
    }

    let recased: Vec<String> = trimmed
        .split(' ')
        .map(|word| {
            if word.chars().filter(|c| c.is_alphabetic()).count() > 3 {
                title_case_word(word)
            } else {
                word.to_string()
            }
        })
        .collect();
    Some(recased.join(" "))
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

fn strip_generic_words(name: &str) -> Option<String> {
    let kept: Vec<&str> = name
        .split_whitespace()
        .filter(|w| {
            let lower = w.trim_matches(|c: char| !c.is_alphanumeric() && c != '-').to_lowercase();
            !GENERIC_SENDER_WORDS.contains(&lower.as_str())
        })
        .collect();
    clean_vendor(&kept.join(" "))
}

/// Vendor from a `From:` header value: the display name without generic
/// words, else the address domain.
fn from_header_name(value: &str) -> Option<String> {
    let (name, address) = match (value.find('<'), value.rfind('>')) {
        (Some(open), Some(close)) if open < close => (&value[..open], &value[open + 1..close]),
        _ if value.contains('@') => ("", value),
        _ => (value, ""),
    };

    let name = name.trim().trim_matches(['"', '\'']).trim();
    if !name.is_empty() && !name.contains('@') {
        if let Some(vendor) = strip_generic_words(name) {
            return Some(vendor);
        }
    }

    let (_, domain) = address.trim().rsplit_once('@')?;
    if is_personal_webmail(domain) {
        return None;
    }
    vendor_from_domain(domain)
}

/// Merchant named in a card statement descriptor ("PADDLE.NET* NOTION").
fn descriptor_merchant(value: &str) -> Option<String> {
    value
        .split('*')
        .map(str::trim)
        .filter(|segment| {
            let tokens = lowercase_words(&segment.replace(['.', '#'], " "));
            !tokens.is_empty() && !tokens.iter().all(|t| DESCRIPTOR_NOISE.contains(&t.as_str()))
        })
        .last()
        .and_then(clean_vendor)
}

/// Business name from a domain's registrable label
/// (`receipts.lyft.com` -> `Lyft`, `shop.example.co.uk` -> `Example`).
pub fn vendor_from_domain(domain: &str) -> Option<String> {
    let domain = domain.trim().trim_start_matches('@').to_ascii_lowercase();
    let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();

    let label = match labels.len() {
        0 => return None,
        1 => labels[0],
        n if n >= 3 && labels[n - 1].len() == 2 && SECOND_LEVEL_SUFFIXES.contains(&labels[n - 2]) => {
            labels[n - 3]
        }
        n => labels[n - 2],
    };

    let words: Vec<String> = label
        .split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(title_case_word)
        .collect();
    clean_vendor(&words.join(" "))
}

/// Shape and context tags for a cleaned vendor name.
pub fn tag_vendor(value: &str) -> Tags {
    let words = lowercase_words(value);
    let categories = BusinessCategory::detect(value);
    let entity_suffix = words
        .last()
        .is_some_and(|w| words.len() > 1 && ENTITY_SUFFIXES.contains(&w.as_str()));
    let payment_processor = words.first().is_some_and(|w| {
        let w = w.strip_suffix(".com").unwrap_or(w);
        PAYMENT_PROCESSORS.contains(&w)
    });

    Tags {
        person_name: !entity_suffix && categories.is_empty() && is_person_name(value),
        title_case: is_title_case(value),
        entity_suffix,
        categories,
        payment_processor,
        ..Tags::default()
    }
}

/// `First Last` or `First Middle Last`.
fn is_person_name(value: &str) -> bool {
    let words: Vec<&str> = value.split_whitespace().collect();
    (2..=3).contains(&words.len())
        && words.iter().all(|word| {
            let mut chars = word.chars();
            let first_upper = chars.next().is_some_and(|c| c.is_ascii_uppercase());
            first_upper
                && word.len() <= 15
                && chars.clone().count() >= 1
                && chars.all(|c| c.is_ascii_lowercase() || c == '\'' || c == '-')
        })
}

fn is_title_case(value: &str) -> bool {
    let initials_upper = value
        .split_whitespace()
        .filter_map(|w| w.chars().next())
        .filter(|c| c.is_alphabetic())
        .all(|c| c.is_uppercase());
    initials_upper && value.chars().any(|c| c.is_lowercase())
}

fn lowercase_words(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\'' || c == '-' || c == '.'))
        .map(|w| w.trim_matches(|c: char| c == '.' || c == '-' || c == '\'').to_lowercase())
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn run(text: &str, context: Option<&ParseContext>) -> Vec<Candidate<String>> {
        let document = Document::analyze(text, context);
        let library = PatternLibrary::standard().unwrap();
        let mut scanner = Scanner::new(text, Duration::from_secs(5));
        candidates(&mut scanner, &library, &document, context)
    }

    #[test]
    fn test_vendor_from_domain() {
        assert_eq!(vendor_from_domain("uber.com"), Some("Uber".to_string()));
        assert_eq!(vendor_from_domain("receipts.lyft.com"), Some("Lyft".to_string()));
        assert_eq!(vendor_from_domain("e.starbucks.ca"), Some("Starbucks".to_string()));
        assert_eq!(vendor_from_domain("mail.example.co.uk"), Some("Example".to_string()));
        assert_eq!(vendor_from_domain("tim-hortons.ca"), Some("Tim Hortons".to_string()));
    }

    #[test]
    fn test_clean_vendor() {
        assert_eq!(clean_vendor("PSA CANADA"), Some("PSA Canada".to_string()));
        assert_eq!(clean_vendor("  McDonald's!! "), Some("McDonald's".to_string()));
        assert_eq!(clean_vendor("Acme Plumbing Ltd."), Some("Acme Plumbing Ltd".to_string()));
        assert_eq!(
            clean_vendor("One Two Three Four Five Six Seven"),
            Some("One Two Three Four Five Six".to_string())
        );
        assert_eq!(clean_vendor("!!"), None);
    }

    #[test]
    fn test_from_header_name() {
        assert_eq!(from_header_name("Uber Receipts <noreply@uber.com>"), Some("Uber".to_string()));
        assert_eq!(from_header_name("<billing@notion.so>"), Some("Notion".to_string()));
        assert_eq!(from_header_name("jane@gmail.com"), None);
        assert_eq!(from_header_name("Jane Doe <jane@gmail.com>"), Some("Jane Doe".to_string()));
    }

    #[test]
    fn test_descriptor_merchant() {
        assert_eq!(descriptor_merchant("PADDLE.NET* NOTION"), Some("Notion".to_string()));
        assert_eq!(descriptor_merchant("SQ *BLUE BOTTLE"), Some("Blue Bottle".to_string()));
    }

    #[test]
    fn test_tags() {
        let person = tag_vendor("Jane Doe");
        assert!(person.person_name);
        assert!(person.title_case);

        let company = tag_vendor("Northwind Traders Inc");
        assert!(company.entity_suffix);
        assert!(!company.person_name);

        let cafe = tag_vendor("Corner Coffee Shop");
        assert_eq!(cafe.categories, vec![BusinessCategory::Retail, BusinessCategory::FoodService]);
        assert!(!cafe.person_name);

        assert!(tag_vendor("Paddle.com Market Ltd").payment_processor);
        assert!(!tag_vendor("UBER").title_case);
    }

    #[test]
    fn test_line_candidates_skip_noise() {
        let found = run("GeoGuessr\nReceipt\nDate: 23rd November 2025\nSales Tax\n$0.33", None);
        let lines: Vec<&str> = found
            .iter()
            .filter(|c| c.pattern == LINE_HEURISTIC)
            .map(|c| c.value.as_str())
            .collect();
        assert_eq!(lines, vec!["GeoGuessr"]);
    }

    #[test]
    fn test_merged_lines() {
        let found = run("BLUE\nBOTTLE\nOrder #1234", None);
        let merged: Vec<&str> = found
            .iter()
            .filter(|c| c.pattern == MERGED_LINES)
            .map(|c| c.value.as_str())
            .collect();
        assert_eq!(merged, vec!["Blue Bottle"]);
    }

    #[test]
    fn test_forwarded_webmail_sender_yields_no_domain_candidate() {
        let context = ParseContext::new().with_sender("Jane Doe <jane@gmail.com>");
        let found = run("Your trip with Uber\nTotal: $14.13", Some(&context));
        assert!(found.iter().all(|c| c.pattern != SENDER_DOMAIN));
        assert!(found.iter().all(|c| c.pattern != CONTEXT_SENDER_NAME));
        assert!(found.iter().any(|c| c.pattern == "merchant_phrase" && c.value == "Uber"));
    }

    #[test]
    fn test_context_candidates() {
        let context = ParseContext::new()
            .with_sender("Lyft Receipts <no-reply@receipts.lyft.com>")
            .with_subject("Your ride with Lyft");
        let found = run("Thanks for riding", Some(&context));
        let from_context: Vec<(&str, &str)> = found
            .iter()
            .filter(|c| c.span.is_none())
            .map(|c| (c.pattern.as_str(), c.value.as_str()))
            .collect();
        assert_eq!(
            from_context,
            vec![
                (SENDER_DOMAIN, "Lyft"),
                (CONTEXT_SENDER_NAME, "Lyft"),
                (SUBJECT_PHRASE, "Lyft"),
            ]
        );
    }
}
