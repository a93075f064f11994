//! wafo dictionary linker.
//!
//! The Forth dictionary of the interpreter core is written by hand as data
//! segments in its WAT source. This crate recomputes every address,
//! back-pointer and call-table slot of that dictionary and keeps the
//! `(; = expr ;)` annotations in the source in sync with the layout.
//!
//! ```text
//! WAT source → record scan → layout → annotation evaluation → WAT source
//! ```

pub mod error;
pub mod layout;
pub mod link;
pub mod preprocess;
pub mod record;
pub mod render;
pub mod report;
pub mod symbols;

pub use error::{LinkError, LinkResult};
pub use layout::{lay_out, LayoutState, Markers};
pub use link::{link, LinkMode, LinkOptions, LinkOutput};
pub use preprocess::{preprocess, PreprocessOptions};
pub use render::{render_entry, EntrySpec, GeneratedEntry, InsertionSnippet};
pub use report::LinkReport;
pub use symbols::SymbolTable;
