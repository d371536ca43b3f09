use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use super::PageMarkdownSource;
use crate::{
    markdown,
    table::{Row, Table},
    textutil::clean_text,
};

#[derive(Deserialize, Debug)]
#[serde(transparent)]
pub struct JsonTableSet(pub Vec<JsonTable>);

#[allow(dead_code)]
#[derive(Deserialize, Debug)]
pub struct JsonTable {
    pub extraction_method: String,
    pub page_number: i32,
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
    pub right: f32,
    pub bottom: f32,
    pub data: Vec<JsonRow>,
}

#[derive(Deserialize, Debug)]
pub struct JsonRow(pub Vec<JsonCell>);

#[allow(dead_code)]
#[derive(Deserialize, Debug)]
pub struct JsonCell {
    pub top: f32,
    pub left: f32,
    pub width: f32,
    pub height: f32,
    pub text: String,
}

impl From<JsonTable> for Table {
    fn from(value: JsonTable) -> Self {
        Table(value.data.into_iter().map(Into::into).collect())
    }
}

impl From<JsonRow> for Row {
    fn from(value: JsonRow) -> Self {
        Row(value
            .0
            .into_iter()
            .map(|cell| {
                let mut text = cell.text;
                clean_text(&mut text);
                text
            })
            .collect())
    }
}

/// [PageMarkdownSource] that lets Tabula detect the tables on a page and renders each of them as a
/// markdown block.
pub struct TabulaMarkdownSource {
    vm: tabula::TabulaVM,
}

impl TabulaMarkdownSource {
    /// Starts the JVM with the Tabula jar at `jar_path` on its classpath.
    pub fn new(jar_path: &Path) -> Result<Self> {
        let libpath = jar_path
            .to_str()
            .ok_or_else(|| anyhow!("Tabula jar path {:?} is not valid UTF-8", jar_path))?;
        let vm = tabula::TabulaVM::new(libpath, false)
            .with_context(|| format!("starting TabulaVM with {:?}", jar_path))?;
        Ok(Self { vm })
    }
}

impl PageMarkdownSource for TabulaMarkdownSource {
    fn page_markdown(&self, pdf_path: &Path, page: usize) -> Result<String> {
        let pages = [i32::try_from(page + 1).with_context(|| format!("page index {page}"))?];

        let env = self.vm.attach().with_context(|| "attaching to TabulaVM")?;

        let tabula = env
            .configure_tabula(
                None,
                Some(&pages),
                tabula::OutputFormat::Json,
                true,
                tabula::ExtractionMethod::Decide,
                false,
                None,
            )
            .with_context(|| "configuring Tabula to detect tables")?;

        let extracted_file = tempfile::NamedTempFile::new()?;
        tabula
            .parse_document_into(pdf_path, extracted_file.path())
            .with_context(|| format!("extracting page {} of {:?}", page + 1, pdf_path))?;
        let table_set: JsonTableSet = serde_json::from_reader(extracted_file)
            .with_context(|| "parsing JSON output from Tabula")?;

        Ok(render_table_set(table_set))
    }
}

/// Renders each table as a markdown block, first row as header, blocks separated by a blank line.
pub fn render_table_set(table_set: JsonTableSet) -> String {
    table_set
        .0
        .into_iter()
        .map(Table::from)
        .filter(|table| !table.is_empty())
        .map(|table| {
            let mut rows = table.0.into_iter();
            let header = rows.next().unwrap_or_default();
            markdown::render_table(&header, &rows.collect::<Vec<_>>())
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
