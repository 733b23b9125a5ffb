// Holdings Pivot - Core Library
// Broker statements in, one company × owner pivot out. Shared by CLI, TUI and API server.

pub mod cell;
pub mod config;
pub mod db;
pub mod detector;
pub mod error;
pub mod export;
pub mod extractor;
pub mod loader;
pub mod owner;
pub mod pivot;
pub mod session;
pub mod sort;

#[cfg(feature = "server")]
pub mod api;

// Re-export commonly used types
pub use cell::{CellValue, RawSheet};
pub use config::Config;
pub use db::{
    Event, Snapshot, SnapshotSummary,
    setup_database, save_snapshot, list_snapshots, get_snapshot, delete_snapshot,
    insert_event, get_events_for_entity,
};
pub use detector::{detect, is_data_row, ColumnMapping};
pub use error::{IngestError, IngestResult};
pub use export::{
    export_columns, export_rows, pivot_view, write_csv, write_xlsx, ExportRow, PivotView,
};
pub use extractor::{extract, HoldingRecord};
pub use loader::{
    SheetLoader, SheetFormat, CsvLoader, XlsxLoader,
    detect_format, get_loader, load_sheet,
};
pub use owner::extract_owner;
pub use pivot::{owner_column, PivotRow, PivotTable, COMPANY_NAME, TOTAL_HOLDINGS};
pub use session::{BatchReport, FileOutcome, FileReport, UploadSession};
pub use sort::{sorted, SortColumn, SortDirection, SortSpec};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
