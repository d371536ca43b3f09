use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use anyhow::{Result, anyhow};
use extraction::{layout::LayoutDocument, metadata::TableIdentity};
use googletest::{Result as GResult, prelude::*};
use mockall::mock;
use serde_json::json;
use testutils::{DefaultForTest, WrapError, anyhow_downcasts_to, markdown_table, write_fake_pdf};

use super::*;
use crate::model::ModelError;

mock! {
    pub Text {}

    impl PageTextSource for Text {
        fn page_count(&self, pdf_path: &Path) -> Result<usize>;
        fn page_text(&self, pdf_path: &Path, page: usize) -> Result<String>;
    }
}

mock! {
    pub Fast {}

    impl PageMarkdownSource for Fast {
        fn page_markdown(&self, pdf_path: &Path, page: usize) -> Result<String>;
    }
}

mock! {
    pub Layout {}

    impl LayoutModel for Layout {
        fn convert(&self, pdf_path: &Path) -> Result<LayoutDocument>;
    }
}

mock! {
    pub Llm {}

    impl LanguageModel for Llm {
        fn generate(&self, prompt: &str) -> std::result::Result<String, ModelError>;
    }
}

const ENVELOPE_PAGE_TEXT: &str = "\
Section 3.2.2 Building Envelope
Table 3.2.2.2.
Overall Thermal Transmittance of Above-ground Opaque Building Assemblies
Forming Part of Sentence 3.2.2.2.(1)
";

/// A block that fails structural validation.
const ONE_COLUMN_BLOCK: &str = "| Walls |\n| Roofs |\n";

fn envelope_markdown() -> String {
    markdown_table(&[
        &["Assembly", "Zone 4", "Zone 5", "Zone 6", "Zone 7A", "Zone 7B", "Zone 8"],
        &["Walls", "0.315", "0.278", "0.247", "0.210", "0.210", "0.183"],
        &["Roofs", "0.193", "0.156", "0.156", "0.138", "0.138", "0.121"],
        &["Floors", "0.227", "0.183", "0.183", "0.162", "0.162", "0.142"],
    ])
}

fn envelope_response() -> String {
    let assembly = |assembly_type: &str, u: f64| {
        json!({
            "assembly_type": assembly_type,
            "zone_4_max_u": u,
            "zone_5_max_u": u,
            "zone_6_max_u": u,
            "zone_7a_max_u": u,
            "zone_7b_max_u": u,
            "zone_8_max_u": u,
        })
    };
    json!({
        "vintage": "2020",
        "table_number": "3.2.2.2",
        "assemblies": [
            assembly("Walls", 0.315),
            assembly("Roofs", 0.193),
            assembly("Floors", 0.227),
        ],
    })
    .to_string()
}

fn envelope_layout_document() -> LayoutDocument {
    LayoutDocument::from_paginated_markdown(
        &format!("{{0}}------\nTable 3.2.2.2.\n\n{}\n", envelope_markdown()),
        serde_json::Map::new(),
    )
}

/// Page text source with `pages` pages, all with the same text.
fn text_source(pages: usize, text: &'static str) -> MockText {
    let mut source = MockText::new();
    source.expect_page_count().returning(move |_| Ok(pages));
    source
        .expect_page_text()
        .returning(move |_, _| Ok(text.to_owned()));
    source
}

fn fast_source(markdown: String) -> MockFast {
    let mut source = MockFast::new();
    source
        .expect_page_markdown()
        .returning(move |_, _| Ok(markdown.clone()));
    source
}

fn unused_layout() -> MockLayout {
    let mut layout = MockLayout::new();
    layout.expect_convert().never();
    layout
}

fn llm_answering(times: usize, response: String) -> MockLlm {
    let mut llm = MockLlm::new();
    llm.expect_generate()
        .times(times)
        .returning(move |_| Ok(response.clone()));
    llm
}

fn unused_llm() -> MockLlm {
    let mut llm = MockLlm::new();
    llm.expect_generate().never();
    llm
}

#[derive(Default)]
struct Recorder {
    log: Vec<String>,
    stop_after_pages: Option<usize>,
    pages_done: usize,
}

impl ParseEvents for Recorder {
    fn on_event(&mut self, event: ParseEvent<'_>) {
        let entry = match event {
            ParseEvent::Progress {
                page,
                completed,
                total,
            } => {
                self.pages_done = completed;
                format!("progress {page} {completed}/{total}")
            }
            ParseEvent::TableParsed(outcome) => {
                format!("table {} {}", outcome.identity.number, outcome.method)
            }
            ParseEvent::Error { terminal, .. } => format!("error terminal={terminal}"),
            ParseEvent::Completed => "completed".to_owned(),
            ParseEvent::Cancelled => "cancelled".to_owned(),
        };
        self.log.push(entry);
    }

    fn do_continue(&self) -> bool {
        self.stop_after_pages
            .is_none_or(|limit| self.pages_done < limit)
    }
}

struct Fixture {
    _tempdir: tempfile::TempDir,
    pdf: PathBuf,
}

impl Fixture {
    fn new() -> Result<Self> {
        let tempdir = tempfile::tempdir()?;
        let pdf = write_fake_pdf(tempdir.path(), "NECB-2020.pdf")?;
        Ok(Self {
            _tempdir: tempdir,
            pdf,
        })
    }

    fn request(&self) -> DocumentRequest<'_> {
        DocumentRequest {
            pdf: &self.pdf,
            vintage: "2020",
            pages: None,
        }
    }
}

fn collaborators<'a>(
    text: &'a MockText,
    fast: &'a MockFast,
    layout: &'a MockLayout,
    llm: &'a MockLlm,
) -> Collaborators<'a> {
    Collaborators {
        page_text: text,
        fast_source: fast,
        layout_model: layout,
        language_model: llm,
        layout_cache: None,
    }
}

#[test_log::test]
fn fast_table_is_validated_without_layout() -> GResult<()> {
    let fixture = Fixture::new().wrap_error()?;
    let text = text_source(1, ENVELOPE_PAGE_TEXT);
    let fast = fast_source(format!("{ENVELOPE_PAGE_TEXT}\n{}\n", envelope_markdown()));
    let layout = unused_layout();
    let llm = llm_answering(1, envelope_response());
    let config = ParserConfig::default_for_test();
    let parser = DocumentParser::new(collaborators(&text, &fast, &layout, &llm), &config);
    let mut events = Recorder::default();

    let summary = parser
        .parse_document(&fixture.request(), &mut events)
        .wrap_error()?;

    assert_that!(summary.outcomes, len(eq(1)));
    let outcome = &summary.outcomes[0];
    assert_that!(outcome.success(), eq(true));
    assert_that!(outcome.method, eq(ExtractionMethod::Fast));
    assert_that!(outcome.identity.number, eq("Table 3.2.2.2."));
    assert_that!(outcome.llm_applied, eq(true));
    assert_that!(outcome.raw_extraction, none());
    assert_that!(
        outcome.timing.keys().map(String::as_str).collect::<Vec<_>>(),
        unordered_elements_are![eq(&"fast_ms"), eq(&"llm_ms"), eq(&"total_ms")]
    );
    assert_that!(summary.success_rate, eq(1.0));
    assert_that!(summary.pages_processed, eq(1));
    assert_that!(summary.cancelled, eq(false));
    assert_that!(
        events.log,
        elements_are![
            eq("table Table 3.2.2.2. fast"),
            eq("progress 0 1/1"),
            eq("completed"),
        ]
    );
    Ok(())
}

#[test_log::test(gtest)]
fn layout_fallback_runs_once_per_document() -> GResult<()> {
    let fixture = Fixture::new().wrap_error()?;
    let text = text_source(2, ENVELOPE_PAGE_TEXT);
    let fast = fast_source(ONE_COLUMN_BLOCK.to_owned());
    let mut layout = MockLayout::new();
    layout
        .expect_convert()
        .times(1)
        .returning(|_| Ok(envelope_layout_document()));
    let llm = llm_answering(1, envelope_response());
    let config = ParserConfig::default_for_test();
    let parser = DocumentParser::new(collaborators(&text, &fast, &layout, &llm), &config);
    let mut events = Recorder::default();

    let summary = parser
        .parse_document(&fixture.request(), &mut events)
        .wrap_error()?;

    // Page 0 has a layout table. Page 1 has only the failed fast block.
    assert_that!(summary.outcomes, len(eq(2)));
    let (layout_outcome, failed_outcome) = (&summary.outcomes[0], &summary.outcomes[1]);
    expect_that!(layout_outcome.success(), eq(true));
    expect_that!(layout_outcome.method, eq(ExtractionMethod::Layout));
    expect_that!(
        layout_outcome.timing.contains_key(timing::LAYOUT_MODEL),
        eq(true)
    );
    expect_that!(failed_outcome.success(), eq(false));
    expect_that!(failed_outcome.method, eq(ExtractionMethod::Failed));
    expect_that!(
        failed_outcome.errors,
        contains(eq("Too few columns: 1 < 2"))
    );
    expect_that!(
        failed_outcome.timing.contains_key(timing::LAYOUT_MODEL),
        eq(false)
    );
    let count = |method| summary.method_distribution.get(&method).copied();
    assert_that!(count(ExtractionMethod::Layout), some(eq(1)));
    assert_that!(count(ExtractionMethod::Failed), some(eq(1)));
    assert_that!(count(ExtractionMethod::Fast), some(eq(0)));
    Ok(())
}

#[gtest]
fn merged_cell_hints_follow_cleaned_rows() -> GResult<()> {
    let fixture = Fixture::new().wrap_error()?;
    let text = text_source(1, ENVELOPE_PAGE_TEXT);
    let fast = fast_source(ONE_COLUMN_BLOCK.to_owned());
    let mut layout = MockLayout::new();
    layout.expect_convert().returning(|_| {
        let table = markdown_table(&[
            &["Table 3.2.2.2.", "", "", "", "", "", ""],
            &["Assembly", "Zone 4", "Zone 5", "Zone 6", "Zone 7A", "Zone 7B", "Zone 8"],
            &["Walls", "0.315", "0.278", "", "0.210", "0.210", "0.183"],
            &["Roofs", "0.193", "0.156", "0.156", "0.138", "0.138", "0.121"],
            &["Floors", "0.227", "0.183", "0.183", "0.162", "0.162", "0.142"],
        ]);
        Ok(LayoutDocument::from_paginated_markdown(
            &format!("{{0}}------\n{table}\n"),
            serde_json::Map::new(),
        ))
    });
    let prompts = Arc::new(Mutex::new(Vec::<String>::new()));
    let mut llm = MockLlm::new();
    {
        let prompts = prompts.clone();
        llm.expect_generate().times(1).returning(move |prompt| {
            prompts.lock().unwrap().push(prompt.to_owned());
            Ok(envelope_response())
        });
    }
    let config = ParserConfig::default_for_test();
    let parser = DocumentParser::new(collaborators(&text, &fast, &layout, &llm), &config);

    let summary = parser
        .parse_document(&fixture.request(), &mut Recorder::default())
        .wrap_error()?;

    assert_that!(summary.outcomes, len(eq(1)));
    let prompts = prompts.lock().unwrap().clone();
    assert_that!(prompts, len(eq(1)));
    let prompt = &prompts[0];
    // The title row is dropped by cleaning, so the header is row 0 and Walls is row 1.
    expect_that!(prompt, contains_substring("```markdown\n| Assembly | Zone 4 |"));
    expect_that!(
        prompt,
        contains_substring("- Row 1: columns 2 to 3 may be one merged cell")
    );
    expect_that!(prompt.matches("may be one merged cell").count(), eq(1));
    Ok(())
}

#[test_log::test]
fn layout_failure_is_not_retried() -> GResult<()> {
    let fixture = Fixture::new().wrap_error()?;
    let text = text_source(2, "");
    let fast = fast_source(ONE_COLUMN_BLOCK.to_owned());
    let mut layout = MockLayout::new();
    layout
        .expect_convert()
        .times(1)
        .returning(|_| Err(anyhow!("out of GPU memory")));
    let llm = unused_llm();
    let config = ParserConfig::default_for_test();
    let parser = DocumentParser::new(collaborators(&text, &fast, &layout, &llm), &config);
    let mut events = Recorder::default();

    let summary = parser
        .parse_document(&fixture.request(), &mut events)
        .wrap_error()?;

    assert_that!(
        summary.outcomes,
        each(field!(
            &ParseOutcome.errors,
            ref all![
                contains(eq("Too few columns: 1 < 2")),
                contains(all![
                    starts_with("Layout extraction failed: "),
                    contains_substring("out of GPU memory"),
                ]),
            ]
        ))
    );
    assert_that!(summary.outcomes, len(eq(2)));
    assert_that!(
        events
            .log
            .iter()
            .filter(|entry| entry.starts_with("error"))
            .collect::<Vec<_>>(),
        elements_are![eq(&"error terminal=false")]
    );
    Ok(())
}

#[test_log::test]
fn layout_output_is_cached_across_runs() -> GResult<()> {
    let fixture = Fixture::new().wrap_error()?;
    let cache_dir = tempfile::tempdir()?;
    let text = text_source(1, ENVELOPE_PAGE_TEXT);
    let fast = fast_source(ONE_COLUMN_BLOCK.to_owned());
    let mut layout = MockLayout::new();
    layout
        .expect_convert()
        .times(1)
        .returning(|_| Ok(envelope_layout_document()));
    let llm = llm_answering(2, envelope_response());
    let config = ParserConfig::default_for_test();
    let parser = DocumentParser::new(
        Collaborators {
            layout_cache: Some(LayoutCache::new(cache_dir.path().to_owned()).wrap_error()?),
            ..collaborators(&text, &fast, &layout, &llm)
        },
        &config,
    );

    let first = parser
        .parse_document(&fixture.request(), &mut Recorder::default())
        .wrap_error()?;
    let second = parser
        .parse_document(&fixture.request(), &mut Recorder::default())
        .wrap_error()?;

    assert_that!(first.outcomes, len(eq(1)));
    assert_that!(second.outcomes, len(eq(1)));
    assert_that!(second.outcomes[0].success(), eq(true));
    assert_that!(
        second.outcomes[0].timing.get("layout_model_ms"),
        some(eq(&0.0))
    );
    Ok(())
}

#[gtest]
fn layout_disabled_records_structural_failure() -> GResult<()> {
    let fixture = Fixture::new().wrap_error()?;
    let text = text_source(1, ENVELOPE_PAGE_TEXT);
    let fast = fast_source(ONE_COLUMN_BLOCK.to_owned());
    let layout = unused_layout();
    let llm = unused_llm();
    let config = ParserConfig {
        layout_fallback_enabled: false,
        ..DefaultForTest::default_for_test()
    };
    let parser = DocumentParser::new(collaborators(&text, &fast, &layout, &llm), &config);

    let summary = parser
        .parse_document(&fixture.request(), &mut Recorder::default())
        .wrap_error()?;

    expect_that!(
        summary.outcomes,
        elements_are![matches_pattern!(ParseOutcome {
            identity: field!(TableIdentity.number, eq("Table 3.2.2.2.")),
            method: eq(&ExtractionMethod::Failed),
            llm_applied: eq(&false),
            errors: contains(starts_with("Too few columns")),
            ..
        })]
    );
    Ok(())
}

#[gtest]
fn fast_source_failure_skips_only_that_page() -> GResult<()> {
    let fixture = Fixture::new().wrap_error()?;
    let text = text_source(2, ENVELOPE_PAGE_TEXT);
    let mut fast = MockFast::new();
    fast.expect_page_markdown()
        .withf(|_, page| *page == 0)
        .returning(|_, _| Err(anyhow!("java.lang.OutOfMemoryError")));
    fast.expect_page_markdown()
        .withf(|_, page| *page == 1)
        .returning(|_, _| Ok(envelope_markdown()));
    let layout = unused_layout();
    let llm = llm_answering(1, envelope_response());
    let config = ParserConfig {
        layout_fallback_enabled: false,
        ..DefaultForTest::default_for_test()
    };
    let parser = DocumentParser::new(collaborators(&text, &fast, &layout, &llm), &config);
    let mut events = Recorder::default();

    let summary = parser
        .parse_document(&fixture.request(), &mut events)
        .wrap_error()?;

    expect_that!(
        summary.outcomes,
        elements_are![matches_pattern!(ParseOutcome {
            method: eq(&ExtractionMethod::Fast),
            identity: field!(TableIdentity.page, eq(&1)),
            ..
        })]
    );
    expect_that!(summary.pages_processed, eq(2));
    expect_that!(events.log, contains(eq("completed")));
    Ok(())
}

#[gtest]
fn rejected_table_keeps_raw_extraction() -> GResult<()> {
    let fixture = Fixture::new().wrap_error()?;
    let text = text_source(1, ENVELOPE_PAGE_TEXT);
    let fast = fast_source(envelope_markdown());
    let layout = unused_layout();
    let llm = llm_answering(1, r#"{"error": "not a requirements table"}"#.to_owned());
    let config = ParserConfig::default_for_test();
    let parser = DocumentParser::new(collaborators(&text, &fast, &layout, &llm), &config);

    let summary = parser
        .parse_document(&fixture.request(), &mut Recorder::default())
        .wrap_error()?;

    assert_that!(summary.outcomes, len(eq(1)));
    let outcome = &summary.outcomes[0];
    expect_that!(outcome.success(), eq(false));
    expect_that!(outcome.record(), none());
    expect_that!(outcome.llm_applied, eq(true));
    expect_that!(
        outcome.errors,
        elements_are![eq("LLM rejected input: not a requirements table")]
    );
    expect_that!(
        outcome.raw_extraction,
        some(contains_substring("| Walls | 0.315 |"))
    );
    expect_that!(summary.success_rate, eq(0.0));
    Ok(())
}

#[gtest]
fn intermediate_results_are_kept_when_configured() -> GResult<()> {
    let fixture = Fixture::new().wrap_error()?;
    let text = text_source(1, ENVELOPE_PAGE_TEXT);
    let fast = fast_source(envelope_markdown());
    let layout = unused_layout();
    let llm = llm_answering(1, envelope_response());
    let config = ParserConfig {
        save_intermediate_results: true,
        ..DefaultForTest::default_for_test()
    };
    let parser = DocumentParser::new(collaborators(&text, &fast, &layout, &llm), &config);

    let summary = parser
        .parse_document(&fixture.request(), &mut Recorder::default())
        .wrap_error()?;

    expect_that!(
        summary.outcomes,
        elements_are![all![
            property!(&ParseOutcome.success(), eq(true)),
            field!(&ParseOutcome.raw_extraction, ref some(contains_substring("Floors"))),
        ]]
    );
    Ok(())
}

#[gtest]
fn unreadable_page_text_gives_synthetic_identity() -> GResult<()> {
    let fixture = Fixture::new().wrap_error()?;
    let mut text = MockText::new();
    text.expect_page_count().returning(|_| Ok(1));
    text.expect_page_text()
        .returning(|_, _| Err(anyhow!("damaged content stream")));
    let fast = fast_source(envelope_markdown());
    let layout = unused_layout();
    let llm = unused_llm();
    let config = ParserConfig::default_for_test();
    let parser = DocumentParser::new(collaborators(&text, &fast, &layout, &llm), &config);
    let mut events = Recorder::default();

    let summary = parser
        .parse_document(&fixture.request(), &mut events)
        .wrap_error()?;

    expect_that!(
        summary.outcomes,
        elements_are![matches_pattern!(ParseOutcome {
            identity: field!(TableIdentity.number, eq("Table-0-0")),
            llm_applied: eq(&false),
            errors: elements_are![eq("No schema found for table Table-0-0")],
            ..
        })]
    );
    expect_that!(events.log, contains(eq("error terminal=false")));
    Ok(())
}

#[gtest]
fn cancellation_stops_between_pages() -> GResult<()> {
    let fixture = Fixture::new().wrap_error()?;
    let text = text_source(3, "");
    let mut fast = MockFast::new();
    fast.expect_page_markdown()
        .times(1)
        .returning(|_, _| Ok(String::new()));
    let layout = unused_layout();
    let llm = unused_llm();
    let config = ParserConfig {
        layout_fallback_enabled: false,
        ..DefaultForTest::default_for_test()
    };
    let parser = DocumentParser::new(collaborators(&text, &fast, &layout, &llm), &config);
    let mut events = Recorder {
        stop_after_pages: Some(1),
        ..Default::default()
    };

    let summary = parser
        .parse_document(&fixture.request(), &mut events)
        .wrap_error()?;

    expect_that!(summary.cancelled, eq(true));
    expect_that!(summary.pages_processed, eq(1));
    expect_that!(
        events.log,
        elements_are![eq("progress 0 1/3"), eq("cancelled")]
    );
    Ok(())
}

#[gtest]
fn page_range_is_clamped_to_document() -> GResult<()> {
    let fixture = Fixture::new().wrap_error()?;
    let text = text_source(3, "");
    let mut fast = MockFast::new();
    fast.expect_page_markdown()
        .withf(|_, page| *page == 2)
        .times(1)
        .returning(|_, _| Ok(String::new()));
    let layout = unused_layout();
    let llm = unused_llm();
    let config = ParserConfig {
        layout_fallback_enabled: false,
        ..DefaultForTest::default_for_test()
    };
    let parser = DocumentParser::new(collaborators(&text, &fast, &layout, &llm), &config);
    let request = DocumentRequest {
        pages: Some(2..10),
        ..fixture.request()
    };

    let summary = parser
        .parse_document(&request, &mut Recorder::default())
        .wrap_error()?;

    expect_that!(summary.pages_processed, eq(1));
    expect_that!(summary.outcomes, is_empty());
    Ok(())
}

#[gtest]
fn missing_pdf_is_terminal() -> GResult<()> {
    let tempdir = tempfile::tempdir()?;
    let missing = tempdir.path().join("NECB-2017.pdf");
    let mut text = MockText::new();
    text.expect_page_count().never();
    let fast = MockFast::new();
    let layout = unused_layout();
    let llm = unused_llm();
    let config = ParserConfig::default_for_test();
    let parser = DocumentParser::new(collaborators(&text, &fast, &layout, &llm), &config);
    let mut events = Recorder::default();

    let result = parser.parse_document(
        &DocumentRequest {
            pdf: &missing,
            vintage: "2017",
            pages: None,
        },
        &mut events,
    );

    expect_that!(
        result,
        err(anyhow_downcasts_to::<PdfNotFound, _>(eq(&PdfNotFound(
            missing.clone()
        ))))
    );
    expect_that!(events.log, elements_are![eq("error terminal=true")]);
    Ok(())
}

#[gtest]
fn unknown_vintage_is_terminal() -> GResult<()> {
    let fixture = Fixture::new().wrap_error()?;
    let text = MockText::new();
    let fast = MockFast::new();
    let layout = unused_layout();
    let llm = unused_llm();
    let config = ParserConfig::default_for_test();
    let parser = DocumentParser::new(collaborators(&text, &fast, &layout, &llm), &config);

    let result = parser.parse_document(
        &DocumentRequest {
            vintage: "2019",
            ..fixture.request()
        },
        &mut Recorder::default(),
    );

    expect_that!(
        result.map_err(|err| err.to_string()),
        err(contains_substring("unknown vintage \"2019\""))
    );
    Ok(())
}
