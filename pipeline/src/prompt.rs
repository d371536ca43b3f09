//! Builds the repair prompt.

use std::fmt::Write;

use extraction::layout::MergedRegion;

use crate::schema::TargetSchema;

/// What is known about the table being repaired.
#[derive(Clone, Copy, Debug)]
pub struct RepairRequest<'a> {
    /// Cleaned table as markdown.
    pub raw_table: &'a str,
    pub table_number: &'a str,
    pub vintage: &'a str,
    /// Possible merged cells in `raw_table`, by row of the rendered table with the header as
    /// row 0. Advisory.
    pub merged_cells: &'a [MergedRegion],
}

/// Renders the prompt. The output depends only on the arguments.
pub fn build_prompt(request: &RepairRequest, schema: &TargetSchema, instructions: &str) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are a building code data extraction assistant.\n\n");
    // Writing to a String cannot fail.
    let _ = writeln!(
        prompt,
        "**Task**: Extract data from NECB {} Table {}.\n",
        request.vintage,
        schema.table_number()
    );
    let _ = writeln!(
        prompt,
        "**Input Table** (Markdown with potential issues):\n```markdown\n{}\n```\n",
        request.raw_table.trim_end()
    );
    let _ = writeln!(
        prompt,
        "**Target Schema** (JSON):\n```json\n{:#}\n```\n",
        schema.shape()
    );
    prompt.push_str(instructions);
    prompt.push_str("\n\n");

    if !request.merged_cells.is_empty() {
        prompt.push_str(
            "**Possible Merged Cells** (heuristic, may be wrong, row 0 is the header):\n",
        );
        for region in request.merged_cells {
            let _ = writeln!(
                prompt,
                "- Row {}: columns {} to {} may be one merged cell",
                region.row,
                region.col,
                region.col + region.col_span.saturating_sub(1)
            );
        }
        prompt.push('\n');
    }

    prompt.push_str(STRICT_RULES);
    prompt
}

const STRICT_RULES: &str = r#"**Strict Rules**:
1. Extract ONLY the data rows specified in the instructions
2. Ignore merged description cells, captions, footnotes, and empty rows
3. All numeric values must be valid floats within the schema's range constraints
4. If any data is ambiguous, missing, or unclear, return {"error": "reason"}
5. Output ONLY valid JSON matching the schema EXACTLY (no explanation, no markdown)
6. Do NOT hallucinate or invent values - if data is unclear, return error

**Output Format**:
Return ONLY the JSON object, nothing else. Start with { and end with }.
"#;
