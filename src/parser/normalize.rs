//! CSV row normalization
//!
//! Rows are positional `selector, action, value[, attr]` with no header.
//! Each field is trimmed, stripped of surrounding double quotes and filtered
//! down to an allowed character set. Preview and import both go through
//! [`normalize_fields`], so what the preview shows is what gets imported.
//!
//! Quotes are not CSV quoting here: every line is one row and a stray `"`
//! never swallows the lines after it. Commas always separate fields.
//!
//! Row numbers count records, not physical lines: blank and whitespace-only
//! lines are skipped without taking a number, so `Row 3` is the third
//! non-blank line of the input.

use super::types::StepFields;
use crate::error::RowError;
use regex::Regex;
use serde::Serialize;
use std::io::Read;
use std::sync::OnceLock;

/// `selector, action, value` must be present (possibly empty); `attr` is optional
pub const MIN_COLUMNS: usize = 3;

macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            RE.get_or_init(|| Regex::new($pattern).unwrap())
        }
    };
}

static_regex!(whitespace_run, r"\s+");
static_regex!(selector_disallowed, r#"[^A-Za-z0-9_\s\-.#\[\]="']"#);
static_regex!(action_disallowed, r"[^A-Za-z0-9_]");
static_regex!(
    value_disallowed,
    r#"[^A-Za-z0-9_\s\-.@#$%&*()+=!?<>{}\[\]|\\:;"'`~]"#
);
static_regex!(control_chars, r"[\r\n\t]");
static_regex!(attr_disallowed, r"[^A-Za-z0-9_\-]");

fn collapse_whitespace(s: &str) -> String {
    whitespace_run().replace_all(s, " ").trim().to_string()
}

/// Trim and remove one pair of surrounding double quotes
pub fn strip_field(raw: &str) -> &str {
    let trimmed = raw.trim();
    let trimmed = trimmed.strip_prefix('"').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('"').unwrap_or(trimmed);
    trimmed.trim()
}

pub fn clean_selector(raw: &str) -> String {
    collapse_whitespace(&selector_disallowed().replace_all(strip_field(raw), ""))
}

/// Word characters only, case-folded, then mapped to the canonical camelCase name
pub fn clean_action(raw: &str) -> String {
    let token = action_disallowed()
        .replace_all(strip_field(raw), "")
        .to_lowercase();
    canonical_action(&token)
}

/// Map a lowercase action token to its canonical spelling.
///
/// Unknown tokens are returned unchanged; the validator rejects them.
pub fn canonical_action(token: &str) -> String {
    match token {
        "expecttext" => "expectText",
        "expectattr" => "expectAttr",
        "expecturlcontains" => "expectUrlContains",
        "expectpagetitle" => "expectPageTitle",
        "waitforselector" => "waitForSelector",
        "waitforpageload" => "waitForPageLoad",
        "click" => "click",
        "fill" => "fill",
        other => other,
    }
    .to_string()
}

pub fn clean_attr(raw: &str) -> String {
    attr_disallowed().replace_all(strip_field(raw), "").to_string()
}

/// Clean a value given the already-cleaned action and attr.
///
/// `expectAttr` on `href` keeps URL punctuation and only loses control
/// characters; every other value is filtered to the allowed set.
pub fn clean_value(raw: &str, action: &str, attr: &str) -> String {
    let raw = strip_field(raw);
    if action == "expectAttr" && attr == "href" {
        collapse_whitespace(&control_chars().replace_all(raw, ""))
    } else {
        collapse_whitespace(&value_disallowed().replace_all(raw, ""))
    }
}

/// Clean the positional fields of one row
pub fn normalize_fields(fields: &[String]) -> StepFields {
    let column = |i: usize| fields.get(i).map(String::as_str).unwrap_or("");
    let action = clean_action(column(1));
    let attr = clean_attr(column(3));
    StepFields {
        selector: clean_selector(column(0)),
        value: clean_value(column(2), &action, &attr),
        action,
        attr,
    }
}

/// One CSV row after cleaning, with the raw fields kept for display
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedRow {
    /// 1-based row number
    pub index: usize,
    pub raw: Vec<String>,
    #[serde(serialize_with = "serialize_outcome")]
    pub fields: Result<StepFields, RowError>,
}

fn serialize_outcome<S: serde::Serializer>(
    fields: &Result<StepFields, RowError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match fields {
        Ok(f) => f.serialize(serializer),
        Err(e) => serializer.serialize_str(&e.to_string()),
    }
}

/// Lazy row-by-row normalizer over a headerless CSV source.
///
/// Consuming it consumes the reader; to iterate again, parse again.
pub struct Normalizer<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    index: usize,
    done: bool,
}

impl<R: Read> Normalizer<R> {
    pub fn from_reader(reader: R) -> Self {
        let records = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quoting(false)
            .from_reader(reader)
            .into_records();
        Self {
            records,
            index: 0,
            done: false,
        }
    }
}

impl<'a> Normalizer<&'a [u8]> {
    pub fn from_text(text: &'a str) -> Self {
        Self::from_reader(text.as_bytes())
    }
}

impl<R: Read> Iterator for Normalizer<R> {
    type Item = NormalizedRow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let record = self.records.next()?;
            let (raw, fields) = match record {
                Ok(record) => {
                    let raw: Vec<String> = record.iter().map(str::to_string).collect();
                    // Whitespace-only lines are treated like blank lines
                    if raw.len() == 1 && raw[0].trim().is_empty() {
                        continue;
                    }
                    let fields = if raw.len() < MIN_COLUMNS {
                        Err(RowError::MissingColumns {
                            expected: MIN_COLUMNS,
                            found: raw.len(),
                        })
                    } else {
                        Ok(normalize_fields(&raw))
                    };
                    (raw, fields)
                }
                Err(e) => {
                    if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                        self.done = true;
                    }
                    (Vec::new(), Err(RowError::Unreadable(e.to_string())))
                }
            };

            self.index += 1;
            log::debug!("Normalized row {}: {:?}", self.index, fields);
            return Some(NormalizedRow {
                index: self.index,
                raw,
                fields,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(line: &str) -> NormalizedRow {
        Normalizer::from_text(line).next().unwrap()
    }

    #[test]
    fn test_normalize_simple_row() {
        let fields = row("Hero-Btn, expectText, Start Now").fields.unwrap();
        assert_eq!(
            fields,
            StepFields {
                selector: "Hero-Btn".to_string(),
                action: "expectText".to_string(),
                value: "Start Now".to_string(),
                attr: String::new(),
            }
        );
    }

    #[test]
    fn test_empty_fields_survive() {
        let fields = row(", waitForPageLoad,").fields.unwrap();
        assert_eq!(fields.action, "waitForPageLoad");
        assert!(fields.selector.is_empty());
        assert!(fields.value.is_empty());
    }

    #[test]
    fn test_href_values_keep_url_punctuation() {
        let fields = row("Hero-Btn, expectAttr, https://example.com/x?y=1, href")
            .fields
            .unwrap();
        assert_eq!(fields.value, "https://example.com/x?y=1");
        assert_eq!(fields.attr, "href");
    }

    #[test]
    fn test_href_values_lose_control_characters() {
        assert_eq!(
            clean_value("https://a.io/\tpath?\r\nq=1", "expectAttr", "href"),
            "https://a.io/path?q=1"
        );
    }

    #[test]
    fn test_other_values_strip_disallowed_symbols() {
        assert_eq!(
            clean_value("https://example.com/x?y=1", "expectText", ""),
            "https:example.comx?y=1"
        );
        assert_eq!(clean_value("Price: €10 ^ off, now!", "expectText", ""), "Price: 10 off now!");
        assert_eq!(
            clean_value("https://example.com/x", "expectAttr", "title"),
            "https:example.comx"
        );
    }

    #[test]
    fn test_selector_cleaning() {
        assert_eq!(
            clean_selector(r#"  [data-testid="hero"]   .cta  "#),
            r#"[data-testid="hero"] .cta"#
        );
        assert_eq!(clean_selector("btn>primary{x}"), "btnprimaryx");
    }

    #[test]
    fn test_action_case_folding_and_mapping() {
        assert_eq!(clean_action("ExpectText"), "expectText");
        assert_eq!(clean_action("WAIT_FOR_PAGE_LOAD"), "wait_for_page_load");
        assert_eq!(clean_action("wait-for-selector"), "waitForSelector");
        assert_eq!(clean_action("CLICK"), "click");
        assert_eq!(clean_action("Bogus!"), "bogus");
    }

    #[test]
    fn test_attr_cleaning() {
        assert_eq!(clean_attr(" data-kind! "), "data-kind");
        assert_eq!(clean_attr("\"href\""), "href");
    }

    #[test]
    fn test_quoted_fields_are_unwrapped() {
        let fields = row(r#""Hero-Btn", "expectText", "Start Now""#).fields.unwrap();
        assert_eq!(fields.selector, "Hero-Btn");
        assert_eq!(fields.value, "Start Now");
    }

    #[test]
    fn test_short_rows_are_parse_errors() {
        let r = row("Hero-Btn, click");
        assert_eq!(
            r.fields,
            Err(RowError::MissingColumns {
                expected: 3,
                found: 2
            })
        );
        assert_eq!(r.raw, vec!["Hero-Btn".to_string(), " click".to_string()]);
    }

    #[test]
    fn test_unbalanced_quote_stays_on_its_own_line() {
        let rows: Vec<_> =
            Normalizer::from_text("\"Hero-Btn, click, go\nb, click, y\nc, fill, z\n").collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].raw.len(), 3);
        assert_eq!(rows[0].fields.as_ref().unwrap().selector, "Hero-Btn");
        assert_eq!(rows[1].fields.as_ref().unwrap().selector, "b");
        assert_eq!(rows[2].fields.as_ref().unwrap().action, "fill");
    }

    #[test]
    fn test_rows_are_numbered_and_blank_lines_skipped() {
        let rows: Vec<_> =
            Normalizer::from_text("a, click, x\n\n   \nb, fill, y\n").collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, 1);
        assert_eq!(rows[1].index, 2);
        assert_eq!(rows[1].fields.as_ref().unwrap().selector, "b");
    }
}
