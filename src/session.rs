// 📥 Upload Session - load → detect → extract → fold, one file at a time
//
// A session owns its pivot table; nothing is global. Files are processed in the
// order received and each one succeeds or fails on its own.

use crate::cell::RawSheet;
use crate::detector::{self, ColumnMapping, SCAN_WINDOW};
use crate::error::IngestError;
use crate::extractor;
use crate::loader;
use crate::owner::extract_owner;
use crate::pivot::PivotTable;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

// ============================================================================
// REPORTS
// ============================================================================

/// What happened to one file
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Imported {
        records: usize,
        mapping: ColumnMapping,
    },
    DecodeFailed {
        error: String,
    },
    /// Decoded fine but nothing looked like a holding. The top rows are kept
    /// for display so the user can see what the file contained.
    NoDataFound {
        preview: RawSheet,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file_name: String,
    pub owner: String,
    /// SHA-256 of the file bytes (empty when the file could not be read)
    pub digest: String,
    pub outcome: FileOutcome,
}

impl FileReport {
    pub fn is_imported(&self) -> bool {
        matches!(self.outcome, FileOutcome::Imported { .. })
    }

    pub fn records(&self) -> usize {
        match self.outcome {
            FileOutcome::Imported { records, .. } => records,
            _ => 0,
        }
    }

    /// User-visible warning, if this file needs one
    pub fn warning(&self) -> Option<String> {
        match &self.outcome {
            FileOutcome::Imported { .. } => None,
            FileOutcome::DecodeFailed { error } => Some(error.clone()),
            FileOutcome::NoDataFound { .. } => Some(
                IngestError::NoDataFound {
                    file: self.file_name.clone(),
                }
                .to_string(),
            ),
        }
    }
}

/// Outcome of one batch, in the order files were received
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
}

impl BatchReport {
    pub fn imported(&self) -> usize {
        self.files.iter().filter(|f| f.is_imported()).count()
    }

    pub fn failed(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::DecodeFailed { .. }))
            .count()
    }

    pub fn empty(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.outcome, FileOutcome::NoDataFound { .. }))
            .count()
    }

    pub fn records(&self) -> usize {
        self.files.iter().map(|f| f.records()).sum()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.files.iter().filter_map(|f| f.warning()).collect()
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// UploadSession - one user's running aggregate
///
/// Lifecycle: `new` → `sign_in` → `ingest_*`* → `reset` / `sign_out`.
/// Signing out drops the table and the last report.
#[derive(Debug, Default)]
pub struct UploadSession {
    user_id: Option<String>,
    table: PivotTable,
    last_report: BatchReport,
    seen_digests: HashSet<String>,
}

impl UploadSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identity transition: signed out → signed in
    pub fn sign_in(&mut self, user_id: &str) {
        if self.user_id.as_deref() != Some(user_id) {
            self.reset();
        }
        log::info!("signed in as {}", user_id);
        self.user_id = Some(user_id.to_string());
    }

    /// Identity transition: signed in → signed out. Aggregation state is cleared.
    pub fn sign_out(&mut self) {
        if let Some(user) = self.user_id.take() {
            log::info!("signed out {}", user);
        }
        self.reset();
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn table(&self) -> &PivotTable {
        &self.table
    }

    pub fn last_report(&self) -> &BatchReport {
        &self.last_report
    }

    /// Explicit reset: empty table, no report
    pub fn reset(&mut self) {
        self.table.reset();
        self.last_report = BatchReport::default();
        self.seen_digests.clear();
    }

    /// Replace the table with a stored one, verbatim
    pub fn load_table(&mut self, table: PivotTable) {
        self.reset();
        self.table = table;
    }

    /// Run one file through the pipeline and fold whatever it yields
    pub fn ingest_file(&mut self, file_name: &str, bytes: &[u8]) -> FileReport {
        let owner = extract_owner(file_name);
        let digest = format!("{:x}", Sha256::digest(bytes));

        if !self.seen_digests.insert(digest.clone()) {
            log::warn!(
                "{}: same content was already imported in this session, holdings will be counted again",
                file_name
            );
        }

        let outcome = match loader::load_sheet(file_name, bytes) {
            Ok(sheet) => self.fold_sheet(file_name, &owner, &sheet),
            Err(e) => {
                log::warn!("{}", e);
                FileOutcome::DecodeFailed {
                    error: e.to_string(),
                }
            }
        };

        FileReport {
            file_name: file_name.to_string(),
            owner,
            digest,
            outcome,
        }
    }

    fn fold_sheet(&mut self, file_name: &str, owner: &str, sheet: &RawSheet) -> FileOutcome {
        let mapping = detector::detect(sheet);
        let records = self.table.fold(extractor::extract(sheet, &mapping, owner));

        if records == 0 {
            log::warn!("{}: no holdings found ({} rows)", file_name, sheet.len());
            return FileOutcome::NoDataFound {
                preview: preview(sheet),
            };
        }

        log::info!("{}: {} holdings for {}", file_name, records, owner);
        FileOutcome::Imported { records, mapping }
    }

    /// Process files in the order given; one bad file never stops the rest
    pub fn ingest_batch<I, N, B>(&mut self, files: I) -> &BatchReport
    where
        I: IntoIterator<Item = (N, B)>,
        N: AsRef<str>,
        B: AsRef<[u8]>,
    {
        let mut report = BatchReport::default();
        for (name, bytes) in files {
            report
                .files
                .push(self.ingest_file(name.as_ref(), bytes.as_ref()));
        }
        self.last_report = report;
        &self.last_report
    }

    /// Read each path from disk and ingest it. A read failure counts as a decode failure.
    pub fn ingest_paths(&mut self, paths: &[PathBuf]) -> &BatchReport {
        let mut report = BatchReport::default();

        for path in paths {
            let file_name = display_name(path);
            let file_report = match std::fs::read(path) {
                Ok(bytes) => self.ingest_file(&file_name, &bytes),
                Err(e) => {
                    let error = IngestError::decode(&file_name, e);
                    log::warn!("{}", error);
                    FileReport {
                        owner: extract_owner(&file_name),
                        file_name,
                        digest: String::new(),
                        outcome: FileOutcome::DecodeFailed {
                            error: error.to_string(),
                        },
                    }
                }
            };
            report.files.push(file_report);
        }

        self.last_report = report;
        &self.last_report
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Top of the sheet, for showing why nothing was found
fn preview(sheet: &RawSheet) -> RawSheet {
    sheet.iter().take(SCAN_WINDOW).cloned().collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pivot::TOTAL_HOLDINGS;
    use rust_xlsxwriter::Workbook;

    fn holdings_xlsx(rows: &[(&str, f64)]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let ws = workbook.add_worksheet();
        ws.write_string(0, 0, "Holding Statement").unwrap();
        ws.write_string(2, 0, "ISIN").unwrap();
        ws.write_string(2, 1, "Company Name").unwrap();
        ws.write_string(2, 2, "Total Qty").unwrap();
        for (i, (company, qty)) in rows.iter().enumerate() {
            let r = 3 + i as u32;
            ws.write_string(r, 0, "INE000A00000").unwrap();
            ws.write_string(r, 1, *company).unwrap();
            ws.write_number(r, 2, *qty).unwrap();
        }
        ws.write_string(3 + rows.len() as u32, 1, "Grand Total").unwrap();
        ws.write_number(3 + rows.len() as u32, 2, 999.0).unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_end_to_end_two_clients() {
        let alice = holdings_xlsx(&[("Infosys", 100.0)]);
        let bob = holdings_xlsx(&[("Infosys", 50.0), ("TCS", 20.0)]);

        let mut session = UploadSession::new();
        let report = session.ingest_batch(vec![
            ("CLIENT Alice CLIENT-ID.xlsx", alice),
            ("CLIENT Bob CLIENT-ID.xlsx", bob),
        ]);
        assert_eq!(report.imported(), 2);
        assert_eq!(report.records(), 3);

        let expected: PivotTable = serde_json::from_str(
            r#"{"Infosys":{"Alice":100.0,"Bob":50.0,"Total Holdings":150.0},
                "TCS":{"Bob":20.0,"Total Holdings":20.0}}"#,
        )
        .unwrap();
        assert_eq!(session.table(), &expected);
        assert_eq!(session.table().get("TCS").unwrap().value(TOTAL_HOLDINGS), 20.0);
    }

    #[test]
    fn test_file_order_does_not_change_result() {
        let files = vec![
            ("CLIENT Alice CLIENT-ID.csv", b"Company,Holding\nInfosys,100\nITC,5\n".to_vec()),
            ("CLIENT Bob CLIENT-ID.csv", b"Company,Holding\nITC,7\nTCS,20\n".to_vec()),
            ("carol.csv", b"Scrip,Quantity\nTCS,\"1,000\"\n".to_vec()),
        ];

        let mut forward = UploadSession::new();
        forward.ingest_batch(files.clone());

        let mut backward = UploadSession::new();
        backward.ingest_batch(files.into_iter().rev());

        assert_eq!(forward.table(), backward.table());
        assert_eq!(forward.table().get("TCS").unwrap().get("carol"), Some(1000.0));
    }

    #[test]
    fn test_bad_file_does_not_stop_batch() {
        let mut session = UploadSession::new();
        let report = session.ingest_batch(vec![
            ("CLIENT A CLIENT-ID.xlsx", b"not a workbook".to_vec()),
            ("CLIENT B CLIENT-ID.csv", b"Company,Holding\nInfosys,10\n".to_vec()),
        ]);

        assert_eq!(report.failed(), 1);
        assert_eq!(report.imported(), 1);
        assert_eq!(report.warnings().len(), 1);
        assert!(report.warnings()[0].contains("CLIENT A CLIENT-ID.xlsx"));
        assert_eq!(session.table().get("Infosys").unwrap().get("B"), Some(10.0));
    }

    #[test]
    fn test_no_data_found_keeps_preview() {
        let mut rows = String::new();
        for i in 0..20 {
            rows.push_str(&format!("note {}\n", i));
        }

        let mut session = UploadSession::new();
        let report = session.ingest_file("empty.csv", rows.as_bytes());

        match &report.outcome {
            FileOutcome::NoDataFound { preview } => assert_eq!(preview.len(), SCAN_WINDOW),
            other => panic!("expected NoDataFound, got {:?}", other),
        }
        assert_eq!(report.warning().unwrap(), "no holdings found in empty.csv");
        assert!(session.table().is_empty());
    }

    #[test]
    fn test_sign_out_resets_table() {
        let mut session = UploadSession::new();
        session.sign_in("user-1");
        session.ingest_file("a.csv", b"Company,Holding\nInfosys,10\n");
        assert!(!session.table().is_empty());

        session.sign_out();
        assert!(session.user_id().is_none());
        assert!(session.table().is_empty());
    }

    #[test]
    fn test_switching_user_resets_but_same_user_keeps() {
        let mut session = UploadSession::new();
        session.sign_in("user-1");
        session.ingest_file("a.csv", b"Company,Holding\nInfosys,10\n");

        session.sign_in("user-1");
        assert_eq!(session.table().len(), 1);

        session.sign_in("user-2");
        assert!(session.table().is_empty());
    }

    #[test]
    fn test_duplicate_content_is_still_folded() {
        let bytes = b"Company,Holding\nInfosys,10\n";
        let mut session = UploadSession::new();
        let first = session.ingest_file("a.csv", bytes);
        let second = session.ingest_file("a.csv", bytes);

        assert_eq!(first.digest, second.digest);
        assert_eq!(first.digest.len(), 64);
        assert_eq!(session.table().get("Infosys").unwrap().total(), 20.0);
    }

    #[test]
    fn test_ingest_paths_reads_disk_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("CLIENT Dev CLIENT-ID 9.csv");
        std::fs::write(&good, "Security Name,Free\nWipro,12\n").unwrap();
        let missing = dir.path().join("gone.csv");

        let mut session = UploadSession::new();
        let report = session.ingest_paths(&[missing, good]);

        assert_eq!(report.failed(), 1);
        assert_eq!(report.files[0].file_name, "gone.csv");
        assert_eq!(report.files[0].owner, "gone");
        assert_eq!(report.files[1].owner, "Dev");
        assert_eq!(session.table().get("Wipro").unwrap().get("Dev"), Some(12.0));
    }

    #[test]
    fn test_load_table_replaces_state() {
        let mut session = UploadSession::new();
        session.ingest_file("a.csv", b"Company,Holding\nInfosys,10\n");

        let stored: PivotTable =
            serde_json::from_str(r#"{"TCS":{"Bob":5.0,"Total Holdings":5.0}}"#).unwrap();
        session.load_table(stored);

        assert!(session.table().get("Infosys").is_none());
        assert_eq!(session.table().get("TCS").unwrap().total(), 5.0);
    }
}
