// 📂 Sheet Loaders - file bytes → RawSheet
// One loader per format, chosen by file extension

use crate::cell::{CellValue, RawSheet};
use crate::error::{IngestError, IngestResult};
use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;

// ============================================================================
// CORE TYPES
// ============================================================================

/// SheetFormat - which decoder a file needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SheetFormat {
    Xlsx,
    Csv,
}

impl SheetFormat {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            SheetFormat::Xlsx => "Excel workbook",
            SheetFormat::Csv => "Delimited text",
        }
    }
}

/// SheetLoader - decode one file into a rectangular-ish matrix of cells
///
/// Loaders are pure: they never touch the filesystem, the caller hands them bytes.
pub trait SheetLoader: Send + Sync {
    /// Decode `bytes`; `file_name` is only used for error messages
    fn load(&self, file_name: &str, bytes: &[u8]) -> IngestResult<RawSheet>;

    fn format(&self) -> SheetFormat;
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Detect sheet format from the file extension
///
/// # Examples:
/// ```
/// use holdings_pivot::loader::{detect_format, SheetFormat};
/// assert_eq!(detect_format("CLIENT A CLIENT-ID.xlsx").unwrap(), SheetFormat::Xlsx);
/// assert_eq!(detect_format("holdings.CSV").unwrap(), SheetFormat::Csv);
/// ```
pub fn detect_format(file_name: &str) -> IngestResult<SheetFormat> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "xlsx" | "xlsm" => Ok(SheetFormat::Xlsx),
        "csv" | "tsv" | "txt" => Ok(SheetFormat::Csv),
        _ => Err(IngestError::decode(
            file_name,
            format!("unsupported file type '.{}' (expected .xlsx or .csv)", ext),
        )),
    }
}

/// Get the loader for a format
pub fn get_loader(format: SheetFormat) -> Box<dyn SheetLoader> {
    match format {
        SheetFormat::Xlsx => Box::new(XlsxLoader::new()),
        SheetFormat::Csv => Box::new(CsvLoader::new()),
    }
}

/// Detect the format of `file_name` and decode `bytes` with the matching loader
pub fn load_sheet(file_name: &str, bytes: &[u8]) -> IngestResult<RawSheet> {
    let format = detect_format(file_name)?;
    get_loader(format).load(file_name, bytes)
}

// ============================================================================
// XLSX LOADER
// ============================================================================

/// Reads the first worksheet of an .xlsx workbook
pub struct XlsxLoader;

impl XlsxLoader {
    pub fn new() -> Self {
        XlsxLoader
    }
}

impl Default for XlsxLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SheetLoader for XlsxLoader {
    fn load(&self, file_name: &str, bytes: &[u8]) -> IngestResult<RawSheet> {
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
            .map_err(|e| IngestError::decode(file_name, e))?;

        let first = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| IngestError::decode(file_name, "workbook has no worksheets"))?;

        let range = workbook
            .worksheet_range(&first)
            .map_err(|e| IngestError::decode(file_name, e))?;

        // Range offset: data may not begin at A1. Keep absolute coordinates so
        // row indices match what the user sees in the spreadsheet.
        let (start_row, start_col) = match range.start() {
            Some((r, c)) => (r as usize, c as usize),
            None => return Ok(Vec::new()),
        };

        let mut sheet: RawSheet = vec![Vec::new(); start_row];
        for row in range.rows() {
            let mut cells = vec![CellValue::Empty; start_col];
            cells.extend(row.iter().map(convert_cell));
            sheet.push(cells);
        }

        log::debug!(
            "{}: sheet '{}' decoded, {} rows",
            file_name,
            first,
            sheet.len()
        );

        Ok(sheet)
    }

    fn format(&self) -> SheetFormat {
        SheetFormat::Xlsx
    }
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Empty,
        Data::String(s) if s.is_empty() => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        // Dates stay as serial numbers, like the sheet stores them
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

// ============================================================================
// CSV LOADER
// ============================================================================

/// Reads delimited text (comma, semicolon, tab or pipe)
pub struct CsvLoader;

impl CsvLoader {
    pub fn new() -> Self {
        CsvLoader
    }
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl SheetLoader for CsvLoader {
    fn load(&self, file_name: &str, bytes: &[u8]) -> IngestResult<RawSheet> {
        let content = decode_text(bytes);
        let delimiter = sniff_delimiter(&content);

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut sheet = Vec::new();
        for (line_num, result) in reader.records().enumerate() {
            let record = result.map_err(|e| {
                IngestError::decode(file_name, format!("line {}: {}", line_num + 1, e))
            })?;
            sheet.push(record.iter().map(parse_field).collect());
        }

        log::debug!(
            "{}: delimiter {:?}, {} rows",
            file_name,
            delimiter as char,
            sheet.len()
        );

        Ok(sheet)
    }

    fn format(&self) -> SheetFormat {
        SheetFormat::Csv
    }
}

/// UTF-8 first, Windows-1252 for Excel-exported files that are not
fn decode_text(bytes: &[u8]) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(10)
        .collect();

    let mut best = b',';
    let mut best_score = 0usize;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        let Some(&target) = counts.iter().max() else {
            continue;
        };
        if target <= 1 {
            continue;
        }

        // Holdings exports often open with a one-cell title line, so score
        // against the widest line rather than the first one
        let consistent = counts.iter().filter(|&&c| c == target).count();
        let score = consistent * target;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

fn parse_field(field: &str) -> CellValue {
    let trimmed = field.trim();
    if trimmed.is_empty() {
        return CellValue::Empty;
    }
    match trimmed.parse::<f64>() {
        Ok(n) if n.is_finite() => CellValue::Number(n),
        _ => CellValue::Text(field.to_string()),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format("a.xlsx").unwrap(), SheetFormat::Xlsx);
        assert_eq!(detect_format("a.XLSM").unwrap(), SheetFormat::Xlsx);
        assert_eq!(detect_format("a.csv").unwrap(), SheetFormat::Csv);
        assert_eq!(detect_format("dir/a.tsv").unwrap(), SheetFormat::Csv);
    }

    #[test]
    fn test_detect_format_unknown_is_decode_error() {
        let result = detect_format("scan.pdf");
        assert!(matches!(result, Err(IngestError::Decode { .. })));
    }

    #[test]
    fn test_get_loader_formats() {
        assert_eq!(get_loader(SheetFormat::Csv).format(), SheetFormat::Csv);
        assert_eq!(get_loader(SheetFormat::Xlsx).format(), SheetFormat::Xlsx);
    }

    #[test]
    fn test_csv_loader_types_cells() {
        let bytes = b"Scrip,Qty\nInfosys,\"1,200\"\nTCS,50\n,\n";
        let sheet = CsvLoader::new().load("h.csv", bytes).unwrap();

        assert_eq!(sheet.len(), 4);
        assert_eq!(sheet[0][0], CellValue::from("Scrip"));
        assert_eq!(sheet[1][1], CellValue::from("1,200"));
        assert_eq!(sheet[2][1], CellValue::Number(50.0));
        assert_eq!(sheet[3][0], CellValue::Empty);
    }

    #[test]
    fn test_csv_loader_strips_bom_and_sniffs_semicolon() {
        let bytes = "\u{feff}Company;Holding\nInfosys;100\nTCS;20\n".as_bytes();
        let sheet = CsvLoader::new().load("h.csv", bytes).unwrap();

        assert_eq!(sheet[0][0], CellValue::from("Company"));
        assert_eq!(sheet[1], vec![CellValue::from("Infosys"), CellValue::Number(100.0)]);
    }

    #[test]
    fn test_csv_loader_title_line_does_not_hide_delimiter() {
        let bytes = b"Holding statement\nCompany\tQty\nInfosys\t10\nWipro\t4\n";
        let sheet = CsvLoader::new().load("h.csv", bytes).unwrap();

        assert_eq!(sheet[0].len(), 1);
        assert_eq!(sheet[2], vec![CellValue::from("Infosys"), CellValue::Number(10.0)]);
    }

    #[test]
    fn test_csv_loader_windows_1252_fallback() {
        // 0xE9 = é in Windows-1252, invalid as UTF-8
        let bytes = b"Soci\xE9t\xE9 G\xE9n\xE9rale,10\n";
        let sheet = CsvLoader::new().load("h.csv", bytes).unwrap();

        assert_eq!(sheet[0][0], CellValue::from("Société Générale"));
    }

    #[test]
    fn test_xlsx_loader_reads_first_sheet() {
        let mut workbook = Workbook::new();
        let ws = workbook.add_worksheet();
        ws.write_string(0, 0, "ISIN").unwrap();
        ws.write_string(0, 1, "Company Name").unwrap();
        ws.write_string(1, 0, "INE009A01021").unwrap();
        ws.write_string(1, 1, "Infosys").unwrap();
        ws.write_number(1, 2, 125.0).unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let sheet = XlsxLoader::new().load("h.xlsx", &bytes).unwrap();

        assert_eq!(sheet.len(), 2);
        assert_eq!(sheet[1][0], CellValue::from("INE009A01021"));
        assert_eq!(sheet[1][2], CellValue::Number(125.0));
        assert_eq!(sheet[0][2], CellValue::Empty);
    }

    #[test]
    fn test_xlsx_loader_keeps_absolute_positions() {
        let mut workbook = Workbook::new();
        let ws = workbook.add_worksheet();
        ws.write_string(2, 2, "Company").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let sheet = XlsxLoader::new().load("h.xlsx", &bytes).unwrap();

        assert_eq!(sheet.len(), 3);
        assert!(sheet[0].is_empty());
        assert_eq!(sheet[2][2], CellValue::from("Company"));
        assert_eq!(sheet[2][0], CellValue::Empty);
    }

    #[test]
    fn test_xlsx_loader_rejects_garbage() {
        let result = XlsxLoader::new().load("broken.xlsx", b"definitely not a zip");
        assert!(matches!(result, Err(IngestError::Decode { .. })));
    }

    #[test]
    fn test_load_sheet_dispatches_on_extension() {
        let sheet = load_sheet("CLIENT A CLIENT-ID.csv", b"a,b\n1,2\n").unwrap();
        assert_eq!(sheet[1][1], CellValue::Number(2.0));
    }
}
