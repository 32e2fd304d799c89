//! Per-document structure computed once per parse call: line index,
//! email header block, forwarded-message signal and regional hints.

use crate::models::receipt::ParseContext;

use super::rules::patterns::{
    EUROPE_SIGNAL, FORWARDED_MARKER, FROM_LINE, HEADER_LINE, NORTH_AMERICA_SIGNAL,
};

/// Personal mailbox providers; a receipt sent from one was forwarded by a person.
const PERSONAL_WEBMAIL: &[&str] = &[
    "gmail", "googlemail", "yahoo", "hotmail", "outlook", "live", "msn", "icloud", "me", "mac",
    "aol", "proton", "protonmail", "gmx", "yandex", "zoho", "fastmail", "hey",
];

/// Whether `domain` belongs to a personal webmail provider.
pub fn is_personal_webmail(domain: &str) -> bool {
    let domain = domain.trim().to_ascii_lowercase();
    let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
    match labels.len() {
        0 => false,
        1 => PERSONAL_WEBMAIL.contains(&labels[0]),
        n => PERSONAL_WEBMAIL.contains(&labels[n - 2])
            || (n >= 3 && PERSONAL_WEBMAIL.contains(&labels[n - 3])),
    }
}

/// Regional convention suggested by the document itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Month-first dates.
    NorthAmerica,
    /// Day-first dates.
    Europe,
}

/// Analyzed view of normalized text.
#[derive(Debug, Clone)]
pub struct Document<'t> {
    text: &'t str,
    line_starts: Vec<usize>,
    body_start: usize,
    forwarded: bool,
    region: Option<Region>,
}

impl<'t> Document<'t> {
    pub fn analyze(text: &'t str, context: Option<&ParseContext>) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));

        let mut document = Self {
            text,
            line_starts,
            body_start: 0,
            forwarded: false,
            region: None,
        };
        document.body_start = document.find_body_start();
        document.forwarded = document.detect_forwarded(context);
        document.region = detect_region(text);
        document
    }

    pub fn text(&self) -> &'t str {
        self.text
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Line `index` without its newline.
    pub fn line(&self, index: usize) -> &'t str {
        let Some(&start) = self.line_starts.get(index) else {
            return "";
        };
        let end = self
            .line_starts
            .get(index + 1)
            .map(|next| next - 1)
            .unwrap_or(self.text.len());
        &self.text[start..end]
    }

    /// Byte offset where line `index` starts.
    pub fn line_offset(&self, index: usize) -> usize {
        self.line_starts.get(index).copied().unwrap_or(self.text.len())
    }

    /// Line containing byte `offset`.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next.saturating_sub(1),
        }
    }

    /// First line after any leading email header block.
    pub fn body_start(&self) -> usize {
        self.body_start
    }

    /// Line number counted from the start of the body; `None` inside the header block.
    pub fn body_line(&self, line: usize) -> Option<usize> {
        line.checked_sub(self.body_start)
    }

    pub fn in_header(&self, line: usize) -> bool {
        line < self.body_start
    }

    pub fn forwarded(&self) -> bool {
        self.forwarded
    }

    pub fn region(&self) -> Option<Region> {
        self.region
    }

    fn find_body_start(&self) -> usize {
        let is_header = |line: &str| HEADER_LINE.is_match(line) || FORWARDED_MARKER.is_match(line);

        let Some(first) = (0..self.line_count().min(12)).find(|&i| is_header(self.line(i))) else {
            return 0;
        };

        let mut end = first;
        let mut anchored = false;
        for index in first..self.line_count() {
            let line = self.line(index);
            if is_header(line) {
                anchored |= FORWARDED_MARKER.is_match(line) || FROM_LINE.is_match(line);
                end = index + 1;
            } else if line.trim().is_empty() {
                end = index + 1;
            } else {
                break;
            }
        }

        if anchored { end } else { 0 }
    }

    fn detect_forwarded(&self, context: Option<&ParseContext>) -> bool {
        if FORWARDED_MARKER.is_match(self.text)
            || FROM_LINE.find_iter(self.text).count() >= 2
            || self.header_forwarded()
        {
            return true;
        }

        let Some(context) = context else {
            return false;
        };

        context.subject.as_deref().is_some_and(is_forward_subject) || from_webmail(context)
    }

    /// Same signals as the parse context, read from the leading header block:
    /// the first `From:` line and any `Subject:` line.
    fn header_forwarded(&self) -> bool {
        let mut from_seen = false;
        for index in 0..self.body_start {
            let Some((name, value)) = self.line(index).split_once(':') else {
                continue;
            };
            match name.trim_start_matches([' ', '\t', '>', '*']).to_ascii_lowercase().as_str() {
                "from" if !from_seen => {
                    from_seen = true;
                    if from_webmail(&ParseContext::new().with_sender(value)) {
                        return true;
                    }
                }
                "subject" if is_forward_subject(value) => return true,
                _ => {}
            }
        }
        false
    }
}

fn is_forward_subject(subject: &str) -> bool {
    let subject = subject.trim_start().to_ascii_lowercase();
    subject.starts_with("fwd:") || subject.starts_with("fw:")
}

fn from_webmail(context: &ParseContext) -> bool {
    context
        .effective_domain()
        .is_some_and(|domain| is_personal_webmail(&domain))
}

fn detect_region(text: &str) -> Option<Region> {
    match (NORTH_AMERICA_SIGNAL.is_match(text), EUROPE_SIGNAL.is_match(text)) {
        (true, false) => Some(Region::NorthAmerica),
        (false, true) => Some(Region::Europe),
        _ => None,
    }
}
