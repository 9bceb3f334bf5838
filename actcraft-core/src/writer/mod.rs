//! Act document rendering and persistence

pub mod sink;
pub mod xlsx_writer;

pub use sink::{ActSink, DirectorySink, WorkbookSink, file_name_for};
pub use xlsx_writer::{ActDocument, RichRun, RichText, SheetNamer, TemplateWorkbook};
