//! Table extraction from building-code PDFs.
//!
//! A cheap per-page markdown pass ([fast]) is checked structurally ([validate]); pages that fail
//! fall back to a whole-document layout model ([layout]). Either way the rows are then cleaned
//! ([cleaner]) and labelled with the table number found in the page text ([metadata]).

pub mod cleaner;
pub mod fast;
pub mod layout;
pub mod markdown;
pub mod metadata;
pub mod page;
pub mod table;
pub mod textutil;
pub mod validate;
