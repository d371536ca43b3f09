//! Strict field-by-field checking of model output, collecting every violation.

use std::fmt::Display;

use serde::Serialize;
use serde_json::{Map, Value};

/// One schema violation, located by its field path.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct FieldError {
    /// Field names and list indices joined by ` -> `, e.g. `assemblies -> 1 -> zone_4_max_u`.
    pub path: String,
    pub message: String,
}

impl Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.path.is_empty() {
            write!(f, "Validation error: {}", self.message)
        } else {
            write!(f, "Validation error in {}: {}", self.path, self.message)
        }
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn key(&self, key: &str) -> Self {
        let mut path = self.0.clone();
        path.push(key.to_owned());
        Self(path)
    }

    pub fn index(&self, index: usize) -> Self {
        self.key(&index.to_string())
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.join(" -> "))
    }
}

/// Inclusive numeric bounds.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Bounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl Bounds {
    pub const NONE: Bounds = Bounds {
        min: None,
        max: None,
    };

    pub const fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    pub const fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }
}

/// Accumulates [FieldError]s.
#[derive(Debug, Default)]
pub(crate) struct Checker {
    errors: Vec<FieldError>,
}

impl Checker {
    pub fn error(&mut self, path: &FieldPath, message: impl Into<String>) {
        self.errors.push(FieldError {
            path: path.to_string(),
            message: message.into(),
        });
    }

    /// Records a pattern violation unless `matched`.
    pub fn pattern(&mut self, path: &FieldPath, matched: bool, pattern: &str) -> bool {
        if !matched {
            self.error(path, format!("String should match pattern '{pattern}'"));
        }
        matched
    }

    /// The checked value, only if nothing at all was reported.
    pub fn finish<T>(mut self, value: Option<T>) -> Result<T, Vec<FieldError>> {
        match value {
            Some(value) if self.errors.is_empty() => Ok(value),
            _ => {
                if self.errors.is_empty() {
                    self.error(&FieldPath::default(), "Input could not be validated");
                }
                Err(self.errors)
            }
        }
    }

    /// Reads `value` as an object whose keys must all be in `allowed`.
    pub fn object<'v>(
        &mut self,
        path: &FieldPath,
        value: &'v Value,
        allowed: &[&str],
    ) -> Option<Fields<'v>> {
        let Value::Object(map) = value else {
            self.error(path, "Input should be a valid dictionary");
            return None;
        };
        for key in map.keys().filter(|key| !allowed.contains(&key.as_str())) {
            self.error(&path.key(key), "Extra inputs are not permitted");
        }
        Some(Fields {
            map,
            path: path.clone(),
        })
    }
}

/// The fields of one JSON object under check.
pub(crate) struct Fields<'v> {
    map: &'v Map<String, Value>,
    path: FieldPath,
}

impl<'v> Fields<'v> {
    pub fn path(&self, key: &str) -> FieldPath {
        self.path.key(key)
    }

    /// `None` when missing or `null`.
    fn present(&self, key: &str) -> Option<&'v Value> {
        self.map.get(key).filter(|value| !value.is_null())
    }

    fn required(&self, checker: &mut Checker, key: &str) -> Option<&'v Value> {
        let value = self.map.get(key);
        if value.is_none() {
            checker.error(&self.path(key), "Field required");
        }
        value
    }

    pub fn required_str(&self, checker: &mut Checker, key: &str) -> Option<String> {
        let value = self.required(checker, key)?;
        string(checker, &self.path(key), value)
    }

    /// Outer `None` on a type error.
    pub fn optional_str(&self, checker: &mut Checker, key: &str) -> Option<Option<String>> {
        match self.present(key) {
            Some(value) => string(checker, &self.path(key), value).map(Some),
            None => Some(None),
        }
    }

    pub fn str_or(&self, checker: &mut Checker, key: &str, default: &str) -> Option<String> {
        self.optional_str(checker, key)
            .map(|value| value.unwrap_or_else(|| default.to_owned()))
    }

    pub fn required_f64(&self, checker: &mut Checker, key: &str, bounds: Bounds) -> Option<f64> {
        let value = self.required(checker, key)?;
        number(checker, &self.path(key), value, bounds)
    }

    pub fn optional_f64(
        &self,
        checker: &mut Checker,
        key: &str,
        bounds: Bounds,
    ) -> Option<Option<f64>> {
        match self.present(key) {
            Some(value) => number(checker, &self.path(key), value, bounds).map(Some),
            None => Some(None),
        }
    }

    pub fn required_u32(&self, checker: &mut Checker, key: &str, bounds: Bounds) -> Option<u32> {
        let value = self.required(checker, key)?;
        integer(checker, &self.path(key), value, bounds)
    }

    pub fn optional_u32(
        &self,
        checker: &mut Checker,
        key: &str,
        bounds: Bounds,
    ) -> Option<Option<u32>> {
        match self.present(key) {
            Some(value) => integer(checker, &self.path(key), value, bounds).map(Some),
            None => Some(None),
        }
    }

    /// The list's items with their paths. Length violations are reported but the items are still
    /// returned so that they get checked too.
    pub fn list(
        &self,
        checker: &mut Checker,
        key: &str,
        min_len: usize,
        max_len: Option<usize>,
    ) -> Option<Vec<(FieldPath, &'v Value)>> {
        let path = self.path(key);
        let value = self.required(checker, key)?;
        let Value::Array(items) = value else {
            checker.error(&path, "Input should be a valid list");
            return None;
        };

        if items.len() < min_len {
            checker.error(
                &path,
                format!(
                    "List should have at least {min_len} item{} after validation, not {}",
                    if min_len == 1 { "" } else { "s" },
                    items.len()
                ),
            );
        }
        if let Some(max_len) = max_len.filter(|max_len| items.len() > *max_len) {
            checker.error(
                &path,
                format!(
                    "List should have at most {max_len} items after validation, not {}",
                    items.len()
                ),
            );
        }

        Some(
            items
                .iter()
                .enumerate()
                .map(|(idx, item)| (path.index(idx), item))
                .collect(),
        )
    }
}

fn string(checker: &mut Checker, path: &FieldPath, value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        _ => {
            checker.error(path, "Input should be a valid string");
            None
        }
    }
}

fn number(checker: &mut Checker, path: &FieldPath, value: &Value, bounds: Bounds) -> Option<f64> {
    let Some(number) = value.as_f64() else {
        checker.error(path, "Input should be a valid number");
        return None;
    };
    check_bounds(checker, path, number, bounds).then_some(number)
}

fn integer(checker: &mut Checker, path: &FieldPath, value: &Value, bounds: Bounds) -> Option<u32> {
    let Value::Number(number) = value else {
        checker.error(path, "Input should be a valid integer");
        return None;
    };
    let Some(as_float) = number.as_f64().filter(|_| !number.is_f64()) else {
        checker.error(path, "Input should be a valid integer");
        return None;
    };
    if !check_bounds(checker, path, as_float, bounds) {
        return None;
    }
    let integer = number.as_u64().and_then(|n| u32::try_from(n).ok());
    if integer.is_none() {
        checker.error(path, "Input should be a valid integer");
    }
    integer
}

fn check_bounds(checker: &mut Checker, path: &FieldPath, value: f64, bounds: Bounds) -> bool {
    let mut ok = true;
    if let Some(min) = bounds.min.filter(|min| value < *min) {
        checker.error(
            path,
            format!("Input should be greater than or equal to {min}"),
        );
        ok = false;
    }
    if let Some(max) = bounds.max.filter(|max| value > *max) {
        checker.error(path, format!("Input should be less than or equal to {max}"));
        ok = false;
    }
    ok
}
