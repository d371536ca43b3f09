//! Access to a PDF's page count and plain page text.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use pdfium_render::prelude::Pdfium;

/// Reads plain text from PDF pages. Page indices are zero-based.
pub trait PageTextSource {
    fn page_count(&self, pdf_path: &Path) -> Result<usize>;
    fn page_text(&self, pdf_path: &Path, page: usize) -> Result<String>;
}

impl<T> PageTextSource for &T
where
    T: PageTextSource + ?Sized,
{
    fn page_count(&self, pdf_path: &Path) -> Result<usize> {
        (*self).page_count(pdf_path)
    }

    fn page_text(&self, pdf_path: &Path, page: usize) -> Result<String> {
        (*self).page_text(pdf_path, page)
    }
}

/// [PageTextSource] backed by a dynamically loaded Pdfium library.
pub struct PdfiumTextSource {
    pdfium: Pdfium,
}

impl PdfiumTextSource {
    /// Binds to the Pdfium library at `library_path`, or the system library when `None`.
    pub fn new(library_path: Option<&Path>) -> Result<Self> {
        let bindings = match library_path {
            Some(path) => Pdfium::bind_to_library(library_file(path))
                .with_context(|| format!("binding to Pdfium library {:?}", path))?,
            None => Pdfium::bind_to_system_library()
                .with_context(|| "binding to system Pdfium library")?,
        };
        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

/// Accepts either the library file itself or the directory holding it.
fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_owned()
    }
}

impl PageTextSource for PdfiumTextSource {
    fn page_count(&self, pdf_path: &Path) -> Result<usize> {
        let document = self
            .pdfium
            .load_pdf_from_file(pdf_path, None)
            .with_context(|| format!("opening PDF {:?}", pdf_path))?;
        usize::try_from(document.pages().len())
            .with_context(|| format!("counting pages of {:?}", pdf_path))
    }

    fn page_text(&self, pdf_path: &Path, page: usize) -> Result<String> {
        let document = self
            .pdfium
            .load_pdf_from_file(pdf_path, None)
            .with_context(|| format!("opening PDF {:?}", pdf_path))?;
        let page_index = page
            .try_into()
            .with_context(|| format!("page index {page} out of range"))?;
        let pdf_page = document
            .pages()
            .get(page_index)
            .with_context(|| format!("loading page {page} of {:?}", pdf_path))?;
        let text = pdf_page
            .text()
            .with_context(|| format!("reading text of page {page} of {:?}", pdf_path))?;
        Ok(text.all())
    }
}
