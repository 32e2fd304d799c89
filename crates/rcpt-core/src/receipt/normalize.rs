//! Text normalization applied before any rule runs.
//!
//! Repairs OCR inter-character spacing (`I N V O I C E`), removes invisible
//! characters, collapses horizontal whitespace and blank-line runs. A single
//! blank line survives as a paragraph break; longer runs become one. The
//! transformation is idempotent and never fails.
//!
//! Every output byte remembers the input bytes it came from, so spans found
//! in the normalized text can be reported against the input.

use tracing::debug;

use crate::models::receipt::Span;

/// Characters sampled from the start of the text for the spacing check.
const SAMPLE_CHARS: usize = 500;

/// Spaces per visible character above which spacing repair runs.
const SPACING_RATIO_THRESHOLD: f32 = 0.6;

/// A kept character and the input byte range it stands for.
type Mapped = (char, usize, usize);

/// Output of [`normalize_with_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub text: String,
    /// Whether the inter-character spacing repair ran.
    pub spacing_repaired: bool,
    /// Input byte range for each byte of `text`.
    sources: Vec<(usize, usize)>,
    input_len: usize,
}

impl Normalized {
    /// Map a span over `text` to the input bytes it was produced from.
    pub fn source_span(&self, span: Span) -> Span {
        let start = self
            .sources
            .get(span.start)
            .map_or(self.input_len, |&(start, _)| start);
        let end = match span.end.checked_sub(1) {
            Some(last) if span.end > span.start => self
                .sources
                .get(last)
                .map_or(self.input_len, |&(_, end)| end),
            _ => start,
        };
        Span::new(start, end.max(start))
    }
}

/// Normalize receipt text.
pub fn normalize(text: &str) -> String {
    normalize_with_report(text).text
}

/// Normalize receipt text and report which repairs ran.
pub fn normalize_with_report(text: &str) -> Normalized {
    let cleaned = clean_whitespace(text);
    let spacing_repaired = needs_spacing_repair(&cleaned);

    let chars = if spacing_repaired {
        debug!("repairing inter-character spacing");
        let mut repaired = Vec::with_capacity(cleaned.len());
        let mut offset = 0;
        for (i, line) in cleaned.split(|m| m.0 == '\n').enumerate() {
            if i > 0 {
                repaired.push(cleaned[offset - 1]);
            }
            repaired.extend(join_single_letters(line));
            offset += line.len() + 1;
        }
        repaired
    } else {
        cleaned
    };

    let mut normalized = String::with_capacity(chars.len());
    let mut sources = Vec::with_capacity(chars.len());
    for (c, start, end) in chars {
        normalized.push(c);
        sources.extend(std::iter::repeat_n((start, end), c.len_utf8()));
    }

    Normalized {
        text: normalized,
        spacing_repaired,
        sources,
        input_len: text.len(),
    }
}

fn is_invisible(c: char) -> bool {
    matches!(c, '\u{200B}'..='\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}')
        || (c.is_control() && c != '\n' && c != '\t')
}

/// Input characters with `\r\n` and lone `\r` unified to `\n`.
fn unify_line_endings(text: &str) -> Vec<Mapped> {
    let mut mapped = Vec::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if c == '\r' {
            let end = match chars.next_if(|&(_, next)| next == '\n') {
                Some((j, _)) => j + 1,
                None => i + 1,
            };
            mapped.push(('\n', i, end));
        } else {
            mapped.push((c, i, i + c.len_utf8()));
        }
    }

    mapped
}

/// Drop invisible characters, collapse whitespace runs into one space
/// standing for the first character of the run, and trim the line.
fn clean_line(raw: &[Mapped]) -> Vec<Mapped> {
    let mut line = Vec::with_capacity(raw.len());
    let mut pending_space: Option<(usize, usize)> = None;

    for &(c, start, end) in raw {
        if is_invisible(c) {
            continue;
        }
        if c.is_whitespace() {
            pending_space.get_or_insert((start, end));
            continue;
        }
        if let Some((space_start, space_end)) = pending_space.take() {
            if !line.is_empty() {
                line.push((' ', space_start, space_end));
            }
        }
        line.push((c, start, end));
    }

    line
}

/// Unify line endings, drop invisible characters, collapse horizontal
/// whitespace runs, trim lines and squeeze blank lines.
fn clean_whitespace(text: &str) -> Vec<Mapped> {
    let unified = unify_line_endings(text);

    let mut lines: Vec<(Vec<Mapped>, Option<Mapped>)> = Vec::new();
    let mut previous_blank = true;
    let mut rest = unified.as_slice();

    loop {
        let (raw, newline) = match rest.iter().position(|m| m.0 == '\n') {
            Some(i) => (&rest[..i], Some(rest[i])),
            None => (rest, None),
        };

        let line = clean_line(raw);
        let blank = line.is_empty();
        if !(blank && previous_blank) {
            previous_blank = blank;
            lines.push((line, newline));
        }

        match newline {
            Some(_) => rest = &rest[raw.len() + 1..],
            None => break,
        }
    }

    while lines.last().is_some_and(|(l, _)| l.is_empty()) {
        lines.pop();
    }

    let mut joined = Vec::with_capacity(unified.len());
    let mut separator: Option<Mapped> = None;
    for (line, newline) in lines {
        if let Some(separator) = separator {
            joined.push(separator);
        }
        let end = joined.last().map_or(0, |&(_, _, end)| end);
        separator = Some(newline.unwrap_or(('\n', end, end)));
        joined.extend(line);
    }

    joined
}

/// Ratio of spaces to visible characters over the start of the text.
fn spacing_ratio(chars: &[Mapped]) -> f32 {
    let mut spaces = 0usize;
    let mut visible = 0usize;
    for &(c, _, _) in chars.iter().take(SAMPLE_CHARS) {
        match c {
            ' ' => spaces += 1,
            '\n' => {}
            _ => visible += 1,
        }
    }
    if visible == 0 {
        0.0
    } else {
        spaces as f32 / visible as f32
    }
}

fn needs_spacing_repair(chars: &[Mapped]) -> bool {
    spacing_ratio(chars) > SPACING_RATIO_THRESHOLD
}

fn is_single_letter(token: &[Mapped]) -> bool {
    matches!(token, [(c, _, _)] if c.is_alphabetic())
}

/// Remove spaces strictly between single-letter tokens of one line.
fn join_single_letters(line: &[Mapped]) -> Vec<Mapped> {
    let mut out = Vec::with_capacity(line.len());
    let mut previous_single = false;
    let mut offset = 0;

    for (i, token) in line.split(|m| m.0 == ' ').enumerate() {
        let single = is_single_letter(token);
        if i > 0 && !(single && previous_single) {
            out.push(line[offset - 1]);
        }
        out.extend_from_slice(token);
        previous_single = single;
        offset += token.len() + 1;
    }

    out
}
