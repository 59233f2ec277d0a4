//! Step validation
//!
//! Applies the per-action field rules to cleaned CSV rows and to manual form
//! submissions. A failing row yields a diagnostic; it never stops the batch.

use super::normalize::{canonical_action, NormalizedRow, Normalizer};
use super::types::{Action, StepFields, StepForm, StepKind};
use crate::error::RowError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validate one cleaned row: action vocabulary first, then required fields
pub fn validate_fields(fields: &StepFields) -> Result<StepKind, RowError> {
    let action: Action = fields.action.parse()?;
    StepKind::from_fields(
        action,
        Some(fields.selector.clone()),
        Some(fields.value.clone()),
        Some(fields.attr.clone()),
    )
}

/// Validate a manual form submission with the same rules as CSV rows.
///
/// Fields are trimmed but not character-filtered; the action name may be
/// given in any case.
pub fn validate_form(form: &StepForm) -> Result<StepKind, RowError> {
    let token = canonical_action(&form.action.trim().to_lowercase());
    let action: Action = token.parse()?;
    let trimmed = |f: &Option<String>| f.as_ref().map(|s| s.trim().to_string());
    StepKind::from_fields(
        action,
        trimmed(&form.selector),
        trimmed(&form.value),
        trimmed(&form.attr),
    )
}

/// A row-indexed import diagnostic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub row: usize,
    pub message: String,
}

impl Diagnostic {
    pub fn new(row: usize, message: impl fmt::Display) -> Self {
        Self {
            row,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Row {}: {}", self.row, self.message)
    }
}

/// Outcome of a bulk import: how many rows became steps, and why the rest did not
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub success_count: usize,
    pub errors: Vec<Diagnostic>,
}

impl ImportSummary {
    /// Step order for the next accepted row, given the base order of the scenario.
    ///
    /// `None` once the orders run past `u32::MAX`.
    pub fn next_order(&self, base: u32) -> Option<u32> {
        u32::try_from(self.success_count)
            .ok()
            .and_then(|accepted| base.checked_add(accepted))
            .and_then(|order| order.checked_add(1))
    }

    pub fn accept(&mut self) {
        self.success_count += 1;
    }

    pub fn reject(&mut self, row: usize, message: impl fmt::Display) {
        self.errors.push(Diagnostic::new(row, message));
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|d| d.to_string()).collect()
    }
}

/// A normalized row together with its validation outcome
#[derive(Debug, Clone)]
pub struct ValidatedRow {
    pub index: usize,
    pub raw: Vec<String>,
    pub fields: Option<StepFields>,
    pub outcome: Result<StepKind, RowError>,
}

impl From<NormalizedRow> for ValidatedRow {
    fn from(row: NormalizedRow) -> Self {
        match row.fields {
            Ok(fields) => Self {
                index: row.index,
                raw: row.raw,
                outcome: validate_fields(&fields),
                fields: Some(fields),
            },
            Err(e) => Self {
                index: row.index,
                raw: row.raw,
                fields: None,
                outcome: Err(e),
            },
        }
    }
}

/// Normalize and validate rows lazily from any CSV source
pub fn validate_rows<I>(rows: I) -> impl Iterator<Item = ValidatedRow>
where
    I: Iterator<Item = NormalizedRow>,
{
    rows.map(ValidatedRow::from)
}

/// What the import would do with one row, for display before importing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewRow {
    pub row: usize,
    pub raw: Vec<String>,
    pub cleaned: Option<StepFields>,
    pub step: Option<StepKind>,
    pub error: Option<String>,
}

/// Preview an import without touching any scenario
pub fn preview(text: &str) -> Vec<PreviewRow> {
    validate_rows(Normalizer::from_text(text))
        .map(|row| {
            let (step, error) = match row.outcome {
                Ok(step) => (Some(step), None),
                Err(e) => (None, Some(Diagnostic::new(row.index, e).to_string())),
            };
            PreviewRow {
                row: row.index,
                raw: row.raw,
                cleaned: row.fields,
                step,
                error,
            }
        })
        .collect()
}
