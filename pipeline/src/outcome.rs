//! Per-table and per-document results of a parse run.

use std::{collections::BTreeMap, path::PathBuf, time::Duration};

use extraction::metadata::TableIdentity;
use serde::Serialize;
use strum::IntoEnumIterator;

use crate::schema::TableRecord;

/// Stage whose output produced a [ParseOutcome].
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    strum_macros::Display,
    strum_macros::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExtractionMethod {
    Fast,
    Layout,
    Failed,
}

/// Keys of [ParseOutcome::timing].
pub mod timing {
    pub const FAST: &str = "fast_ms";
    pub const LAYOUT: &str = "layout_ms";
    pub const LAYOUT_MODEL: &str = "layout_model_ms";
    pub const LLM: &str = "llm_ms";
    pub const TOTAL: &str = "total_ms";
}

/// Result for one table. `success` holds exactly when `record` is present, and `record` can only
/// come from schema validation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParseOutcome {
    success: bool,
    pub identity: TableIdentity,
    record: Option<TableRecord>,
    pub method: ExtractionMethod,
    pub llm_applied: bool,
    pub errors: Vec<String>,
    /// Milliseconds per stage.
    pub timing: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_extraction: Option<String>,
}

impl ParseOutcome {
    pub fn validated(
        identity: TableIdentity,
        record: TableRecord,
        method: ExtractionMethod,
    ) -> Self {
        Self {
            success: true,
            identity,
            record: Some(record),
            method,
            llm_applied: true,
            errors: Vec::new(),
            timing: BTreeMap::new(),
            raw_extraction: None,
        }
    }

    pub fn failed(identity: TableIdentity, errors: Vec<String>) -> Self {
        Self {
            success: false,
            identity,
            record: None,
            method: ExtractionMethod::Failed,
            llm_applied: false,
            errors,
            timing: BTreeMap::new(),
            raw_extraction: None,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn record(&self) -> Option<&TableRecord> {
        self.record.as_ref()
    }

    pub fn record_time(&mut self, key: &str, duration: Duration) {
        self.timing
            .insert(key.to_owned(), duration.as_secs_f64() * 1000.0);
    }
}

/// Result for one document run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DocumentParseSummary {
    pub document: PathBuf,
    pub vintage: String,
    pub outcomes: Vec<ParseOutcome>,
    /// Successes over outcomes, 0 when there are no outcomes.
    pub success_rate: f64,
    pub total_duration_secs: f64,
    /// Outcome count per method. Every method has an entry.
    pub method_distribution: BTreeMap<ExtractionMethod, usize>,
    pub pages_processed: usize,
    pub cancelled: bool,
}

impl DocumentParseSummary {
    pub fn new(
        document: PathBuf,
        vintage: String,
        outcomes: Vec<ParseOutcome>,
        total_duration: Duration,
        pages_processed: usize,
        cancelled: bool,
    ) -> Self {
        let mut method_distribution: BTreeMap<ExtractionMethod, usize> =
            ExtractionMethod::iter().map(|method| (method, 0))
                .collect();
        for outcome in &outcomes {
            *method_distribution.entry(outcome.method).or_default() += 1;
        }

        let successes = outcomes.iter().filter(|outcome| outcome.success()).count();
        let success_rate = if outcomes.is_empty() {
            0.0
        } else {
            successes as f64 / outcomes.len() as f64
        };

        Self {
            document,
            vintage,
            outcomes,
            success_rate,
            total_duration_secs: total_duration.as_secs_f64(),
            method_distribution,
            pages_processed,
            cancelled,
        }
    }

    pub fn successes(&self) -> impl Iterator<Item = &ParseOutcome> {
        self.outcomes.iter().filter(|outcome| outcome.success())
    }
}

#[cfg(test)]
mod tests {
    use googletest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::schema::{FdwrRequirement, FdwrTable};

    fn identity(number: &str) -> TableIdentity {
        TableIdentity {
            number: number.to_owned(),
            title: "Untitled Table".to_owned(),
            page: 3,
        }
    }

    fn fdwr_record() -> TableRecord {
        TableRecord::Fdwr(FdwrTable {
            vintage: "2020".to_owned(),
            table_number: "3.2.1.4".to_owned(),
            requirements: vec![FdwrRequirement {
                hdd_min: 0,
                hdd_max: None,
                max_fdwr: 0.4,
            }],
        })
    }

    #[gtest]
    fn summary_counts_every_method() {
        let outcomes = vec![
            ParseOutcome::validated(identity("Table 3.2.1.4."), fdwr_record(), ExtractionMethod::Fast),
            ParseOutcome::failed(identity("Table-3-1"), vec!["No schema found for table Table-3-1".to_owned()]),
            ParseOutcome::failed(identity("Table-3-2"), vec!["Too few rows: 0 < 1".to_owned()]),
        ];

        let summary = DocumentParseSummary::new(
            PathBuf::from("NECB-2020.pdf"),
            "2020".to_owned(),
            outcomes,
            Duration::from_millis(1500),
            1,
            false,
        );

        expect_that!(summary.success_rate, approx_eq(1.0 / 3.0));
        expect_that!(summary.total_duration_secs, approx_eq(1.5));
        let count = |method| summary.method_distribution.get(&method).copied();
        expect_that!(count(ExtractionMethod::Fast), some(eq(1)));
        expect_that!(count(ExtractionMethod::Layout), some(eq(0)));
        expect_that!(count(ExtractionMethod::Failed), some(eq(2)));
        expect_that!(summary.successes().count(), eq(1));
    }

    #[gtest]
    fn empty_summary_has_zero_rate() {
        let summary = DocumentParseSummary::new(
            PathBuf::from("NECB-2011.pdf"),
            "2011".to_owned(),
            Vec::new(),
            Duration::ZERO,
            0,
            true,
        );

        expect_that!(summary.success_rate, eq(0.0));
        expect_that!(summary.method_distribution.values().sum::<usize>(), eq(0));
        expect_that!(summary.method_distribution, len(eq(3)));
    }

    #[gtest]
    fn outcome_serializes_with_lowercase_method() -> googletest::Result<()> {
        let mut outcome = ParseOutcome::validated(
            identity("Table 3.2.1.4."),
            fdwr_record(),
            ExtractionMethod::Layout,
        );
        outcome.record_time(timing::LLM, Duration::from_millis(250));

        let value = serde_json::to_value(&outcome)?;

        expect_that!(value["success"], eq(&json!(true)));
        expect_that!(value["method"], eq(&json!("layout")));
        expect_that!(value["record"]["family"], eq(&json!("fdwr")));
        expect_that!(value["timing"]["llm_ms"], eq(&json!(250.0)));
        expect_that!(value.get("raw_extraction"), none());
        Ok(())
    }

    #[gtest]
    fn failed_outcome_has_no_record() {
        let outcome = ParseOutcome::failed(identity("Table-0-0"), vec!["x".to_owned()]);

        expect_that!(outcome.success(), eq(false));
        expect_that!(outcome.record(), none());
        expect_that!(outcome.method, eq(ExtractionMethod::Failed));
    }
}
