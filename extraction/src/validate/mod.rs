//! Structural checks that decide whether a fast-pass block can go forward as is.

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};

use crate::{
    fast::{EMPTY_CELL_RATIO_LIMIT, MarkdownQualityResult},
    markdown::CELL_DELIMITER,
};

/// Minimums a block must meet to pass validation.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ValidationThresholds {
    pub min_rows: usize,
    pub min_cols: usize,
    pub min_confidence: f64,
}

impl Default for ValidationThresholds {
    fn default() -> Self {
        Self {
            min_rows: 1,
            min_cols: 2,
            min_confidence: 0.8,
        }
    }
}

/// Result of [validate]. Passed if and only if there are no errors.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ValidationOutcome {
    errors: Vec<String>,
    warnings: Vec<String>,
    confidence: f64,
}

impl ValidationOutcome {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn into_errors(self) -> Vec<String> {
        self.errors
    }
}

/// Checks a block against `thresholds`. Every rule is evaluated, so all problems are reported at
/// once.
pub fn validate(
    result: &MarkdownQualityResult,
    thresholds: &ValidationThresholds,
) -> ValidationOutcome {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if result.estimated_cols < thresholds.min_cols {
        errors.push(format!(
            "Too few columns: {} < {}",
            result.estimated_cols, thresholds.min_cols
        ));
    }

    if result.estimated_rows < thresholds.min_rows {
        errors.push(format!(
            "Too few rows: {} < {}",
            result.estimated_rows, thresholds.min_rows
        ));
    }

    if result.confidence < thresholds.min_confidence {
        errors.push(format!(
            "Low confidence: {:.2} < {}",
            result.confidence, thresholds.min_confidence
        ));
    }

    let empty_ratio = result.empty_cell_ratio();
    if empty_ratio > EMPTY_CELL_RATIO_LIMIT {
        warnings.push(format!(
            "High empty cell ratio: {:.0}%",
            empty_ratio * 100.0
        ));
    }

    if !result.markdown_text.trim().starts_with(CELL_DELIMITER) {
        errors.push(format!(
            "Malformed table: doesn't start with {CELL_DELIMITER}"
        ));
    }

    ValidationOutcome {
        errors,
        warnings,
        confidence: result.confidence,
    }
}
