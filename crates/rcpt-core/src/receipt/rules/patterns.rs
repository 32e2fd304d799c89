//! Declarative pattern library for receipt fields.
//!
//! Every rule is a named regular expression with a priority tier (1 is the
//! strongest) and a `value` capture group. The standard library is compiled
//! once and shared read-only between all engines.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use crate::error::PatternError;
use crate::models::receipt::Field;

/// Compiled size limit per expression.
const REGEX_SIZE_LIMIT: usize = 1 << 22;

/// Money value: `1,234.56`, `1.234,56`, `1234,56`, `6.99`. At most
/// fifteen integer digits.
const MONEY: &str = r"\b(?P<value>(?:\d{1,3}(?:[,.]\d{3}){1,4}|\d{1,12})[.,]\d{2})\b";

/// Money value without cents (`15`, `1,200`). Never matches the integer part
/// of a value that has cents.
const WHOLE: &str = r"(?P<value>\d{1,3}(?:,\d{3})+|\d{1,7})(?:[.,](?:\D|$)|[^\d.,]|$)";

/// Separator between a label and its value: punctuation, at most one line
/// break, an optional currency prefix (`CA`, `USD`) and symbol.
const LEAD: &str = r"[ \t:|*]*\n?[ \t]*(?:(?-i:[A-Z]{1,3})[ \t]?)?[$€£¥]?[ \t]*";

const MONTH: &str = r"(?:jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)";

const TAX_WORD: &str = r"(?:sales[ \t]+tax|tax(?:es)?|hst|gst|pst|qst|vat|tps|tvq)";

/// Expand `<AMT>`, `<WHOLE>`, `<LEAD>`, `<MONTH>` and `<TAX>` placeholders.
fn expand(template: &str) -> String {
    template
        .replace("<LEAD>", LEAD)
        .replace("<AMT>", MONEY)
        .replace("<WHOLE>", WHOLE)
        .replace("<MONTH>", MONTH)
        .replace("<TAX>", TAX_WORD)
}

/// Matching flags of a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternFlags {
    pub case_insensitive: bool,
    pub multi_line: bool,
}

/// Uncompiled rule definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternDef {
    pub name: String,
    pub field: Field,
    pub priority: u8,
    pub expression: String,
    pub flags: PatternFlags,
    pub example: String,
    pub note: String,
    /// Matches directly preceded by one of these words are dropped.
    pub exclude_preceding: Vec<String>,
}

impl PatternDef {
    pub fn new(field: Field, name: &str, priority: u8, expression: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            field,
            priority: priority.max(1),
            expression: expression.into(),
            flags: PatternFlags::default(),
            example: String::new(),
            note: String::new(),
            exclude_preceding: Vec::new(),
        }
    }

    pub fn case_insensitive(mut self) -> Self {
        self.flags.case_insensitive = true;
        self
    }

    pub fn multi_line(mut self) -> Self {
        self.flags.multi_line = true;
        self
    }

    pub fn example(mut self, example: &str) -> Self {
        self.example = example.to_string();
        self
    }

    pub fn note(mut self, note: &str) -> Self {
        self.note = note.to_string();
        self
    }

    pub fn exclude_preceding(mut self, words: &[&str]) -> Self {
        self.exclude_preceding = words.iter().map(|w| w.to_ascii_lowercase()).collect();
        self
    }

    /// Compile into an immutable [`PatternSpec`].
    pub fn compile(self) -> Result<PatternSpec, PatternError> {
        let regex = RegexBuilder::new(&self.expression)
            .case_insensitive(self.flags.case_insensitive)
            .multi_line(self.flags.multi_line)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|source| PatternError::Compile {
                name: self.name.clone(),
                source,
            })?;

        if !regex.capture_names().any(|name| name == Some("value")) {
            return Err(PatternError::MissingValueGroup { name: self.name });
        }

        Ok(PatternSpec { def: self, regex })
    }
}

/// A compiled, immutable extraction rule.
#[derive(Debug, Clone)]
pub struct PatternSpec {
    def: PatternDef,
    regex: Regex,
}

impl PatternSpec {
    pub fn name(&self) -> &str {
        &self.def.name
    }

    pub fn field(&self) -> Field {
        self.def.field
    }

    pub fn priority(&self) -> u8 {
        self.def.priority
    }

    pub fn flags(&self) -> PatternFlags {
        self.def.flags
    }

    pub fn expression(&self) -> &str {
        &self.def.expression
    }

    pub fn example(&self) -> &str {
        &self.def.example
    }

    pub fn note(&self) -> &str {
        &self.def.note
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Whether a match preceded by `word` must be dropped.
    pub fn excluded_by(&self, word: &str) -> bool {
        self.def.exclude_preceding.iter().any(|w| w == word)
    }
}

/// Ordered collection of rules for all fields.
#[derive(Debug, Clone)]
pub struct PatternLibrary {
    specs: Vec<PatternSpec>,
}

impl PatternLibrary {
    /// Compile a library from definitions. Rules are kept in priority order
    /// per field; ties keep definition order.
    pub fn from_defs(defs: Vec<PatternDef>) -> Result<Self, PatternError> {
        let mut specs = defs
            .into_iter()
            .map(PatternDef::compile)
            .collect::<Result<Vec<_>, _>>()?;
        specs.sort_by_key(|s| (s.field(), s.priority()));
        Ok(Self { specs })
    }

    /// Compile the built-in rule set.
    pub fn standard() -> Result<Self, PatternError> {
        Self::from_defs(standard_defs())
    }

    /// The built-in rule set, compiled once per process.
    pub fn shared() -> Arc<Self> {
        Arc::clone(&STANDARD_LIBRARY)
    }

    /// Rules for one field, highest priority first.
    pub fn for_field(&self, field: Field) -> impl Iterator<Item = &PatternSpec> {
        self.specs.iter().filter(move |s| s.field() == field)
    }

    pub fn get(&self, name: &str) -> Option<&PatternSpec> {
        self.specs.iter().find(|s| s.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PatternSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

lazy_static! {
    static ref STANDARD_LIBRARY: Arc<PatternLibrary> =
        Arc::new(PatternLibrary::standard().unwrap());

    /// Disallowed context in the 100 characters before an amount.
    pub static ref BLACKLIST_CONTEXT: Regex = Regex::new(
        r"(?i)\b(?:liability|coverage|insurance|limit|maximum|up\s+to|points|pts|miles|rewards|booking\s+reference|refund(?:ed)?|tax\s+breakdown|breakdown|deposit\s+hold|pre-?authori[sz]ation)\b|\btax\s*%"
    ).unwrap();

    /// Strong total keywords for amounts.
    pub static ref AMOUNT_KEYWORD: Regex = Regex::new(
        r"(?i)\b(?:grand\s+total|amount\s+paid|total\s+paid|amount\s+due|balance\s+due|amount\s+charged|total\s+charged|order\s+total|total)\b"
    ).unwrap();

    /// Subtotal context for amounts.
    pub static ref SUBTOTAL_CONTEXT: Regex = Regex::new(
        r"(?i)\bsub[ \t-]?total\b|\bnet\s+amount\b|\bbefore\s+tax(?:es)?\b|\btrip\s+fare\b"
    ).unwrap();

    /// Tax keywords.
    pub static ref TAX_KEYWORD: Regex = Regex::new(
        r"(?i)\b(?:sales\s+tax|tax(?:es)?|hst|gst|pst|qst|vat|tps|tvq)\b"
    ).unwrap();

    /// Date label keywords.
    pub static ref DATE_KEYWORD: Regex = Regex::new(
        r"(?i)\b(?:date|issued|purchase\s+date|transaction\s+date|order\s+date|invoice\s+date|paid\s+on|billed\s+on|placed\s+on)\b"
    ).unwrap();

    /// Dates that are not the transaction date.
    pub static ref DATE_NEGATIVE: Regex = Regex::new(
        r"(?i)\b(?:expir\w*|exp|valid\s+(?:until|thru|through)|member\s+since|birth\w*|dob|due|renews?)\b"
    ).unwrap();

    /// Email header lines.
    pub static ref HEADER_LINE: Regex = Regex::new(
        r"(?i)^[ \t>*]*(?:from|to|cc|bcc|date|sent|subject|reply-to):"
    ).unwrap();

    /// Forwarded-message markers.
    pub static ref FORWARDED_MARKER: Regex = Regex::new(
        r"(?im)-{2,}[ \t]*(?:forwarded|original)[ \t]+message[ \t]*-{2,}|^[ \t>]*begin\s+forwarded\s+message"
    ).unwrap();

    /// Lines that start with a `From:` header.
    pub static ref FROM_LINE: Regex = Regex::new(r"(?im)^[ \t>*]*from:").unwrap();

    /// Tax regimes and currency markers that imply month-first dates.
    pub static ref NORTH_AMERICA_SIGNAL: Regex = Regex::new(
        r"\b(?:GST|HST|PST|QST|TPS|TVQ|CAD|USD|Canada)\b|\b(?:C|US|CA)\$"
    ).unwrap();

    /// Tax regimes and currency markers that imply day-first dates.
    pub static ref EUROPE_SIGNAL: Regex = Regex::new(
        r"[£€]|\b(?:VAT|EUR|GBP|MwSt|TVA|IVA|BTW)\b"
    ).unwrap();

    /// Canadian sales tax names.
    pub static ref CANADIAN_TAX: Regex = Regex::new(
        r"\b(?:GST|HST|PST|QST|TPS|TVQ)\b"
    ).unwrap();
}

/// The built-in rule definitions.
pub fn standard_defs() -> Vec<PatternDef> {
    let mut defs = Vec::new();
    defs.extend(amount_defs());
    defs.extend(subtotal_defs());
    defs.extend(tax_defs());
    defs.extend(date_defs());
    defs.extend(vendor_defs());
    defs.extend(currency_defs());
    defs
}

fn amount_defs() -> Vec<PatternDef> {
    vec![
        PatternDef::new(
            Field::Amount,
            "explicit_payment",
            1,
            expand(r"\b(?:amount\s+paid|total\s+paid|grand\s+total|final\s+total|(?:amount|total)\s+charged|you\s+paid)\b<LEAD><AMT>"),
        )
        .case_insensitive()
        .example("Amount paid: $42.10")
        .note("Explicit statement of what was paid"),
        PatternDef::new(
            Field::Amount,
            "markdown_bold_total",
            1,
            expand(r"\*\*[ \t]*(?:(?:grand|order)[ \t]+)?total\b[ \t:]*(?:\*\*)?<LEAD><AMT>"),
        )
        .case_insensitive()
        .example("**Total: $18.00**")
        .note("Bold total in HTML-to-text email bodies"),
        PatternDef::new(
            Field::Amount,
            "total_currency_code",
            1,
            expand(r"\btotal[ \t]+(?-i:USD|CAD|EUR|GBP|AUD|NZD)\b[ \t:]*[$€£]?[ \t]*<AMT>"),
        )
        .case_insensitive()
        .example("Total CAD $24.50"),
        PatternDef::new(
            Field::Amount,
            "total_pipe",
            2,
            expand(r"\|[ \t]*(?:\*\*)?[ \t]*(?:grand[ \t]+|order[ \t]+)?total\b[^|\n]*\|[ \t]*(?:\*\*)?<LEAD><AMT>"),
        )
        .case_insensitive()
        .example("| Total | $31.20 |")
        .note("Table rows"),
        PatternDef::new(
            Field::Amount,
            "total_line_start",
            2,
            expand(r"^[ \t*]*(?:(?:order|invoice|receipt)[ \t]+)?total\b[ \t]*(?:\([^)\n]{0,30}\))?<LEAD><AMT>"),
        )
        .case_insensitive()
        .multi_line()
        .example("TOTAL $153.84"),
        PatternDef::new(
            Field::Amount,
            "amount_due",
            2,
            expand(r"\b(?:amount|balance|total)[ \t]+due\b<LEAD><AMT>"),
        )
        .case_insensitive()
        .example("Balance due: 80.00"),
        PatternDef::new(
            Field::Amount,
            "generic_total",
            3,
            expand(r"\b(?:total|amount|sum|paid)\b<LEAD><AMT>"),
        )
        .case_insensitive()
        .exclude_preceding(&["sub", "tax", "taxes", "gst", "hst", "pst", "vat"])
        .example("Paid 12.00")
        .note("Total keyword anywhere on a line"),
        PatternDef::new(
            Field::Amount,
            "whole_total",
            3,
            expand(r"\b(?:grand\s+total|amount\s+paid|total\s+paid|amount\s+due|balance\s+due|total)\b[ \t:|*]*\n?[ \t]*(?:(?-i:[A-Z]{1,3})[ \t]?)?[$€£¥][ \t]*<WHOLE>"),
        )
        .case_insensitive()
        .multi_line()
        .exclude_preceding(&["sub", "tax", "taxes", "gst", "hst", "pst", "vat"])
        .example("Total: $15")
        .note("Total without cents; a currency symbol is required"),
        PatternDef::new(
            Field::Amount,
            "code_before_amount",
            4,
            expand(r"\b(?:USD|CAD|EUR|GBP|AUD|NZD|JPY|CHF)[ \t]*[$€£]?[ \t]*<AMT>"),
        )
        .example("USD 19.99"),
        PatternDef::new(
            Field::Amount,
            "amount_before_code",
            4,
            expand(r"<AMT>[ \t]*(?:USD|CAD|EUR|GBP|AUD|NZD|JPY|CHF)\b"),
        )
        .example("19,99 EUR"),
        PatternDef::new(Field::Amount, "currency_symbol", 4, expand(r"[$€£¥][ \t]*<AMT>"))
            .example("$4.50")
            .note("Any money value with a symbol; last resort"),
        PatternDef::new(Field::Amount, "whole_symbol", 4, expand(r"[$€£¥][ \t]*<WHOLE>"))
            .multi_line()
            .example("$15")
            .note("Any value without cents after a symbol; last resort"),
    ]
}

fn subtotal_defs() -> Vec<PatternDef> {
    vec![
        PatternDef::new(
            Field::Subtotal,
            "subtotal",
            1,
            expand(r"\bsub[ \t-]?total\b<LEAD><AMT>"),
        )
        .case_insensitive()
        .example("Subtotal $134.95"),
        PatternDef::new(
            Field::Subtotal,
            "net_amount",
            2,
            expand(r"\b(?:net[ \t]+amount|(?:amount|total)[ \t]+before[ \t]+tax(?:es)?|pre-?tax[ \t]+total)\b<LEAD><AMT>"),
        )
        .case_insensitive()
        .example("Amount before tax: 50.00"),
        PatternDef::new(Field::Subtotal, "trip_fare", 3, expand(r"\btrip[ \t]+fare\b<LEAD><AMT>"))
            .case_insensitive()
            .example("Trip fare $12.50")
            .note("Ride-hailing fare before fees"),
    ]
}

fn tax_defs() -> Vec<PatternDef> {
    vec![
        PatternDef::new(
            Field::Tax,
            "tax_labeled",
            1,
            expand(r"\b<TAX>\b(?:[ \t]*/[ \t]*[a-z]{2,4})?[ \t]*(?:\(?[ \t]*\d{1,2}(?:\.\d{1,3})?[ \t]*%[ \t]*\)?)?<LEAD><AMT>"),
        )
        .case_insensitive()
        .exclude_preceding(&["before", "excl", "excluding", "pre", "without", "incl", "including", "no"])
        .example("GST/TPS (5%): $2.62")
        .note("Rate annotations and a line break before the value are allowed"),
        PatternDef::new(
            Field::Tax,
            "tax_total",
            2,
            expand(r"\b(?:total[ \t]+<TAX>|<TAX>[ \t]+total)\b<LEAD><AMT>"),
        )
        .case_insensitive()
        .example("Tax total: $0.33")
        .note("Restates itemized taxes; summed only when nothing is itemized"),
        PatternDef::new(
            Field::Tax,
            "tax_pipe_row",
            2,
            expand(r"\|[ \t]*<TAX>\b[^|\n]*\|[ \t]*[$€£¥]?[ \t]*<AMT>"),
        )
        .case_insensitive()
        .example("| HST 13% | 3.90 |"),
    ]
}

fn date_defs() -> Vec<PatternDef> {
    vec![
        PatternDef::new(
            Field::Date,
            "iso_date",
            1,
            r"\b(?P<value>\d{4}[-/.]\d{1,2}[-/.]\d{1,2})\b",
        )
        .example("2025-03-15"),
        PatternDef::new(
            Field::Date,
            "month_name_date",
            2,
            expand(r"\b(?P<value><MONTH>\.?[ \t]+\d{1,2}(?:st|nd|rd|th)?(?:,[ \t]*|[ \t]+)\d{4})\b"),
        )
        .case_insensitive()
        .example("November 23, 2025"),
        PatternDef::new(
            Field::Date,
            "day_month_name",
            2,
            expand(r"\b(?P<value>\d{1,2}(?:st|nd|rd|th)?[ \t]+(?:of[ \t]+)?<MONTH>\.?,?[ \t]+\d{4})\b"),
        )
        .case_insensitive()
        .example("23rd November 2025"),
        PatternDef::new(
            Field::Date,
            "month_slash_date",
            3,
            expand(r"\b(?P<value><MONTH>\.?[ \t]+\d{1,2}/\d{4})\b"),
        )
        .case_insensitive()
        .example("Nov 23/2025"),
        PatternDef::new(
            Field::Date,
            "numeric_date",
            3,
            r"\b(?P<value>\d{1,2}[/.-]\d{1,2}[/.-](?:\d{4}|\d{2}))\b",
        )
        .example("03/04/2025")
        .note("Day/month order resolved from context"),
    ]
}

fn vendor_defs() -> Vec<PatternDef> {
    vec![
        PatternDef::new(
            Field::Vendor,
            "from_header",
            1,
            r"^[ \t>*]*from:[ \t]*(?P<value>[^\n]+)$",
        )
        .case_insensitive()
        .multi_line()
        .example("From: Uber Receipts <noreply@uber.com>")
        .note("Display name with generic words removed, else the address domain"),
        PatternDef::new(
            Field::Vendor,
            "merchant_phrase",
            2,
            r"\b(?:your[ \t]+(?:trip|ride|order|receipt|purchase|payment|booking|stay)[ \t]+(?:with|from|at)|thanks?[ \t]+(?:you[ \t]+)?for[ \t]+(?:shopping|ordering|riding|dining|staying|choosing|your[ \t]+(?:order|purchase))[ \t]+(?:with|at)|receipt[ \t]+from|order[ \t]+from|payment[ \t]+to)[ \t]+(?P<value>(?-i:[A-Z0-9][\w&'.-]*(?:[ \t]+(?:&[ \t]+)?[A-Z0-9][\w&'.-]*){0,4}))",
        )
        .case_insensitive()
        .example("Your trip with Uber"),
        PatternDef::new(
            Field::Vendor,
            "payable_to",
            2,
            r"\b(?:make[ \t]+)?(?:cheques?|checks?)[ \t]+payable[ \t]+to:?[ \t]+(?P<value>[^\n]{2,60})",
        )
        .case_insensitive()
        .example("Make cheques payable to Acme Plumbing Ltd."),
        PatternDef::new(
            Field::Vendor,
            "statement_descriptor",
            2,
            r#"\b(?:appears?|shows?|will[ \t]+appear)[ \t]+on[ \t]+your[ \t]+(?:bank[ \t]+|card[ \t]+|credit[ \t]+card[ \t]+)?statement[ \t]+as:?[ \t]*["']?(?P<value>[A-Za-z0-9*.#& -]{2,40})"#,
        )
        .case_insensitive()
        .example("This charge will appear on your statement as PADDLE.NET* NOTION")
        .note("Names the merchant behind a payment processor"),
        PatternDef::new(
            Field::Vendor,
            "known_vendor",
            3,
            r"\b(?P<value>Uber|Lyft|Amazon|Netflix|Spotify|Starbucks|Walmart|Costco|Home Depot|Best Buy|IKEA|Airbnb|DoorDash|Tim Hortons|McDonald's|Sephora|Apple|Google|Shopify|Adobe)\b",
        )
        .example("Uber")
        .note("Curated names; supplementary to structural signals"),
        PatternDef::new(
            Field::Vendor,
            "company_suffix",
            3,
            r"^[ \t]*(?P<value>[A-Z][\w&'.,-]*(?:[ \t]+[\w&'.,-]+){0,4}[ \t]+(?:Inc|INC|LLC|Ltd|LTD|Limited|Corp|CORP|Corporation|GmbH|PLC|Co|Pty|LLP)\.?)[ \t]*$",
        )
        .multi_line()
        .example("Northwind Traders Inc.")
        .note("A whole line ending in a legal-entity suffix"),
    ]
}

fn currency_defs() -> Vec<PatternDef> {
    vec![
        PatternDef::new(
            Field::Currency,
            "iso_code",
            1,
            r"\b(?P<value>USD|CAD|EUR|GBP|AUD|NZD|JPY|CHF|INR|MXN)\b",
        )
        .example("USD"),
        PatternDef::new(
            Field::Currency,
            "prefixed_dollar",
            1,
            r"(?P<value>\b(?:C|A|US|AU|NZ|CA|CDN)\$|\b(?:CA|US|AU|NZ|CDN)[ \t]\$)",
        )
        .example("C$ 12.00")
        .note("Country-prefixed dollar signs"),
        PatternDef::new(Field::Currency, "currency_symbol", 2, r"(?P<value>[€£¥₹])")
            .example("€")
            .note("Symbols that identify a single currency"),
    ]
}
