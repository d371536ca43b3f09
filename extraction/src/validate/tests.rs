use googletest::prelude::*;
use test_casing::test_casing;

use super::*;

fn block(markdown_text: &str, rows: usize, cols: usize, confidence: f64) -> MarkdownQualityResult {
    MarkdownQualityResult {
        markdown_text: markdown_text.to_owned(),
        estimated_rows: rows,
        estimated_cols: cols,
        confidence,
        page: 0,
    }
}

const WALLS_BLOCK: &str = "\
| Assembly | Zone 4 | Zone 5 | Zone 6 |
|---|---|---|---|
| Walls | 0.315 | 0.278 | 0.247 |";

#[gtest]
fn block_meeting_thresholds_passes() {
    let thresholds = ValidationThresholds {
        min_rows: 1,
        min_cols: 4,
        min_confidence: 0.8,
    };

    let outcome = validate(&block(WALLS_BLOCK, 1, 4, 0.95), &thresholds);

    expect_that!(outcome.passed(), eq(true));
    expect_that!(outcome.errors(), is_empty());
    expect_that!(outcome.warnings(), is_empty());
    expect_that!(outcome.confidence(), approx_eq(0.95));
}

#[test_casing(3, [
    (1, 1, 0.9, "Too few columns: 1 < 2"),
    (0, 2, 0.9, "Too few rows: 0 < 1"),
    (1, 2, 0.5, "Low confidence: 0.50 < 0.8"),
])]
fn single_failing_rule_is_reported(rows: usize, cols: usize, confidence: f64, expected: &str) {
    let outcome = validate(
        &block(WALLS_BLOCK, rows, cols, confidence),
        &ValidationThresholds::default(),
    );

    assert_that!(outcome.passed(), eq(false));
    assert_that!(outcome.errors(), elements_are![eq(expected)]);
}

#[gtest]
fn every_failing_rule_is_reported() {
    let outcome = validate(
        &block("Walls 0.315", 0, 1, 0.1),
        &ValidationThresholds::default(),
    );

    expect_that!(outcome.errors(), len(eq(4)));
    expect_that!(
        outcome.errors(),
        contains(eq("Malformed table: doesn't start with |"))
    );
}

#[gtest]
fn sparse_block_warns_without_failing() {
    let sparse = "| A | B |\n| 1 | |\n| | |";

    let outcome = validate(
        &block(sparse, 2, 2, 0.9),
        &ValidationThresholds::default(),
    );

    expect_that!(outcome.passed(), eq(true));
    expect_that!(outcome.warnings(), elements_are![eq("High empty cell ratio: 50%")]);
}

#[gtest]
fn empty_block_does_not_panic() {
    let outcome = validate(&block("", 0, 1, 0.0), &ValidationThresholds::default());

    expect_that!(outcome.passed(), eq(false));
}
