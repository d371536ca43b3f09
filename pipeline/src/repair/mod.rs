//! Turns a cleaned table into a validated record with the help of a language model, or rejects
//! it with reasons.


use crate::{
    hints::InstructionTable,
    model::{LanguageModel, ModelError},
    prompt::{RepairRequest, build_prompt},
    schema::{SchemaRegistry, TableRecord, TargetSchema},
};

/// Why a table could not be turned into a record. Never empty.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Rejection {
    reasons: Vec<String>,
}

impl Rejection {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reasons: vec![reason.into()],
        }
    }

    /// `None` if `reasons` is empty.
    pub fn from_reasons(reasons: Vec<String>) -> Option<Self> {
        (!reasons.is_empty()).then_some(Self { reasons })
    }

    pub fn reasons(&self) -> &[String] {
        &self.reasons
    }

    pub fn into_reasons(self) -> Vec<String> {
        self.reasons
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RepairOutcome {
    Validated(TableRecord),
    Rejected(Rejection),
}

impl RepairOutcome {
    fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(Rejection::new(reason))
    }
}

/// Whether the model was consulted, with the outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct RepairAttempt {
    pub outcome: RepairOutcome,
    pub model_called: bool,
}

pub struct RepairEngine<M> {
    model: M,
    registry: SchemaRegistry,
    instructions: InstructionTable,
}

impl<M> RepairEngine<M>
where
    M: LanguageModel,
{
    pub fn new(model: M, instructions: InstructionTable) -> Self {
        Self {
            model,
            registry: SchemaRegistry,
            instructions,
        }
    }

    /// Looks up the table's schema, asks the model once for a record and validates its answer.
    /// Never retries and never coerces the answer.
    pub fn repair(&self, request: &RepairRequest) -> RepairAttempt {
        let Some(schema) = self.registry.lookup(request.table_number) else {
            return RepairAttempt {
                outcome: RepairOutcome::rejected(format!(
                    "No schema found for table {}",
                    request.table_number
                )),
                model_called: false,
            };
        };

        let instructions = self.instructions.instructions_for(schema.table_number());
        let prompt = build_prompt(request, &schema, instructions);
        log::debug!(
            "Repairing table {} with schema {} ({} byte prompt).",
            request.table_number,
            schema.name(),
            prompt.len()
        );

        let outcome = match self.model.generate(&prompt) {
            Ok(response) => parse_response(&response, &schema, request.vintage),
            Err(err @ ModelError::Timeout(_)) => RepairOutcome::rejected(err.to_string()),
            Err(err) => RepairOutcome::rejected(format!("LLM request failed: {err}")),
        };
        RepairAttempt {
            outcome,
            model_called: true,
        }
    }
}

/// Validates a model response against `schema`.
///
/// The JSON may be wrapped in a markdown code fence. A lone `{"error": ...}` object is the
/// model declining the table.
pub fn parse_response(response: &str, schema: &TargetSchema, vintage: &str) -> RepairOutcome {
    let json_text = strip_code_fence(response);
    let value: serde_json::Value = match serde_json::from_str(json_text) {
        Ok(value) => value,
        Err(err) => return RepairOutcome::rejected(format!("Invalid JSON: {err}")),
    };

    if let Some(object) = value.as_object() {
        if let (1, Some(reason)) = (object.len(), object.get("error")) {
            let reason = reason
                .as_str()
                .map_or_else(|| reason.to_string(), str::to_owned);
            return RepairOutcome::rejected(format!("LLM rejected input: {reason}"));
        }
    }

    match schema.validate(&value, vintage) {
        Ok(record) => RepairOutcome::Validated(record),
        Err(errors) => {
            let reasons = errors.iter().map(ToString::to_string).collect();
            Rejection::from_reasons(reasons)
                .map_or_else(|| RepairOutcome::rejected("Validation failed"), RepairOutcome::Rejected)
        }
    }
}

/// The text inside a leading ```` ``` ```` or ```` ```json ```` fence, or the trimmed text.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(after_open) = text.strip_prefix("```") else {
        return text;
    };
    // Skip the info string, e.g. `json`.
    let body = after_open
        .find('\n')
        .map_or(after_open, |newline| &after_open[newline + 1..]);
    let body = body.rfind("```").map_or(body, |close| &body[..close]);
    body.trim()
}
