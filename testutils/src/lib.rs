//! Utilities used in tests in multiple crates within the workspace.

use std::{
    fmt::{Debug, Display},
    marker::PhantomData,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use googletest::{
    description::Description,
    matcher::{Matcher, MatcherBase, MatcherResult},
};

/// Creates a matcher against an `anyhow::Error` that downcasts to the given
/// type and matches a reference to it against the inner matcher.
pub fn anyhow_downcasts_to<E, M>(inner: M) -> AnyhowDowncastTo<E, M> {
    AnyhowDowncastTo::<E, M> {
        inner,
        phantom_e: Default::default(),
    }
}

pub struct AnyhowDowncastTo<E, M> {
    inner: M,
    phantom_e: PhantomData<E>,
}

impl<E, M> AnyhowDowncastTo<E, M> {
    fn type_name() -> &'static str {
        std::any::type_name::<E>()
    }
}

impl<E, M> MatcherBase for AnyhowDowncastTo<E, M> {}

impl<E, M> Matcher<&anyhow::Error> for AnyhowDowncastTo<E, M>
where
    E: Display + Debug + Send + Sync + 'static,
    M: for<'e> Matcher<&'e E>,
{
    fn matches(&self, actual: &anyhow::Error) -> MatcherResult {
        actual
            .downcast_ref::<E>()
            .map(|v| self.inner.matches(v))
            .unwrap_or(MatcherResult::NoMatch)
    }

    fn explain_match(&self, actual: &anyhow::Error) -> Description {
        match actual.downcast_ref::<E>() {
            Some(e) => Description::new()
                .text(format!(
                    "which is of the expected concrete error type {}",
                    Self::type_name()
                ))
                .text("with value")
                .nested(self.inner.explain_match(e)),
            None => Description::new().text(format!(
                "which is not the expected concrete error type {}, but is: {actual:#}",
                Self::type_name()
            )),
        }
    }

    fn describe(&self, matcher_result: MatcherResult) -> Description {
        match matcher_result {
            MatcherResult::Match => format!(
                "is of concrete error type {} with value which {}",
                Self::type_name(),
                self.inner.describe(MatcherResult::Match)
            )
            .into(),
            MatcherResult::NoMatch => format!(
                "is or is not a concrete error type {} with value which {}",
                Self::type_name(),
                self.inner.describe(MatcherResult::NoMatch)
            )
            .into(),
        }
    }
}

/// Adapts [anyhow::Error] to [std::error::Error] to make it compatible with [googletest] tests
/// that return a `googletest::Result`.
#[derive(Debug)]
pub struct WrappedError(anyhow::Error);

pub trait WrapError<T> {
    fn wrap_error(self) -> std::result::Result<T, WrappedError>;
}

/// Trait to convert an [anyhow::Result] to a [std::result::Result<T, WrappedError>].
impl<T> WrapError<T> for anyhow::Result<T> {
    fn wrap_error(self) -> std::result::Result<T, WrappedError> {
        self.map_err(WrappedError::from)
    }
}

impl std::fmt::Display for WrappedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl std::error::Error for WrappedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}

impl From<anyhow::Error> for WrappedError {
    fn from(value: anyhow::Error) -> Self {
        Self(value)
    }
}

/// Values that have a sensible fixed form for tests, distinct from their production defaults.
pub trait DefaultForTest {
    fn default_for_test() -> Self;
}

/// Writes a stand-in PDF file into `dir` and returns its path.
///
/// Only the bytes matter to the code under test (hashing and existence checks), so the content is
/// a short marker string distinct per `name`.
pub fn write_fake_pdf(dir: &Path, name: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    std::fs::write(&path, format!("%PDF-1.7 fake document {name}"))
        .with_context(|| format!("writing fake PDF {:?}", path))?;
    Ok(path)
}

/// Renders rows of cells as a `|`-delimited markdown table with a separator after the first row.
pub fn markdown_table(rows: &[&[&str]]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    for (i, row) in rows.iter().enumerate() {
        lines.push(format!("| {} |", row.join(" | ")));
        if i == 0 {
            lines.push(format!("|{}", "---|".repeat(row.len().max(1))));
        }
    }
    lines.join("\n")
}
