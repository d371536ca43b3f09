//! Identifies tables by the number and title printed above them on the page.


use lazy_regex::regex;
use serde::{Deserialize, Serialize};

use crate::textutil;

const UNTITLED: &str = "Untitled Table";
const MAX_TITLE_CHARS: usize = 200;
const MAX_TITLE_LINES: usize = 3;

/// Number and title of a table.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TableIdentity {
    /// As printed, e.g. `Table A-3.2.1.4.(1)`, or `Table-{page}-{index}` when nothing was found.
    pub number: String,
    pub title: String,
    /// Zero-based page index.
    pub page: usize,
}

impl TableIdentity {
    /// Returns `true` when the number was synthesized rather than read from the page.
    pub fn is_synthesized(&self) -> bool {
        !self.number.starts_with("Table ")
    }

    /// The number in the form used for schema lookup, see [normalize_table_number].
    pub fn normalized_number(&self) -> String {
        normalize_table_number(&self.number)
    }
}

/// Strips a `Table ` prefix, an appendix `A-` prefix, surrounding whitespace and a trailing
/// period, so that `Table 3.2.2.2.` and `3.2.2.2` compare equal.
pub fn normalize_table_number(number: &str) -> String {
    let mut number = number.trim();
    number = number.strip_prefix("Table").map_or(number, str::trim_start);
    number = number.strip_prefix("A-").unwrap_or(number);
    number = number.trim();
    number.strip_suffix('.').unwrap_or(number).to_owned()
}

/// Finds the identity of the `index`th table (zero-based, in reading order) in `page_text`.
///
/// Never fails: when the page does not have that many table numbers, a position-derived number
/// and a placeholder title are returned.
pub fn extract_table_identity(page_text: &str, page: usize, index: usize) -> TableIdentity {
    match find_nth_number(page_text, index) {
        Some((number, rest)) => {
            let title_end = regex!(r"\nForming Part|\nNotes to Table|\n\d+\.\d+|\nTable \d+")
                .find(rest)
                .map_or(rest.len(), |found| found.start());
            TableIdentity {
                number: format!("Table {number}"),
                title: title_from(&rest[..title_end]),
                page,
            }
        }
        None => TableIdentity {
            number: format!("Table-{page}-{index}"),
            title: UNTITLED.to_owned(),
            page,
        },
    }
}

/// The `index`th table number on the page and the text following it.
fn find_nth_number(page_text: &str, index: usize) -> Option<(&str, &str)> {
    let captures = regex!(r"Table\s+([A-Z]?-?\d+(?:\.\d+)*(?:\.[A-Z])?\.(?:\(\d+\))?)")
        .captures_iter(page_text)
        .nth(index)?;
    let whole = captures.get(0)?;
    let number = captures.get(1)?;
    Some((number.as_str(), &page_text[whole.end()..]))
}

fn title_from(text: &str) -> String {
    let lines: Vec<&str> = text
        .trim()
        .split('\n')
        .take(MAX_TITLE_LINES)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    if lines.is_empty() {
        return UNTITLED.to_owned();
    }

    let mut title = lines.join(" ");
    textutil::clean_text(&mut title);
    textutil::truncate_with_ellipsis(&mut title, MAX_TITLE_CHARS);
    title
}
