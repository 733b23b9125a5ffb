// 📤 Export - pivot table → delimited text or workbook bytes
// Column order: Company Name, owners in first-seen order, Total Holdings

use crate::pivot::{PivotTable, COMPANY_NAME, TOTAL_HOLDINGS};
use crate::sort::{sorted, SortSpec};
use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::io::Write;

pub const SHEET_NAME: &str = "Holdings";

/// Export header row
pub fn export_columns(table: &PivotTable) -> Vec<String> {
    let mut columns = Vec::with_capacity(table.owners().len() + 2);
    columns.push(COMPANY_NAME.to_string());
    columns.extend(table.owners().iter().cloned());
    columns.push(TOTAL_HOLDINGS.to_string());
    columns
}

/// One exported line: the company and its numeric cells, aligned with `export_columns`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRow {
    pub company: String,
    pub values: Vec<f64>,
}

/// Rows in sort order; owners without a holding in a company get 0
pub fn export_rows(table: &PivotTable, spec: &SortSpec) -> Vec<ExportRow> {
    sorted(table, spec)
        .into_iter()
        .map(|row| {
            let mut values: Vec<f64> = table
                .owners()
                .iter()
                .map(|owner| row.get(owner).unwrap_or(0.0))
                .collect();
            values.push(row.total());

            ExportRow {
                company: row.company().to_string(),
                values,
            }
        })
        .collect()
}

/// Everything a client needs to render the grid
#[derive(Debug, Clone, Serialize)]
pub struct PivotView {
    pub columns: Vec<String>,
    pub rows: Vec<ExportRow>,
    pub sort: SortSpec,
}

pub fn pivot_view(table: &PivotTable, spec: &SortSpec) -> PivotView {
    PivotView {
        columns: export_columns(table),
        rows: export_rows(table, spec),
        sort: spec.clone(),
    }
}

pub fn write_csv<W: Write>(table: &PivotTable, spec: &SortSpec, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record(export_columns(table))
        .context("Failed to write CSV header")?;

    for row in export_rows(table, spec) {
        let mut record = Vec::with_capacity(row.values.len() + 1);
        record.push(row.company);
        record.extend(row.values.iter().map(|v| format_quantity(*v)));
        wtr.write_record(&record)
            .context("Failed to write CSV row")?;
    }

    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}

pub fn write_xlsx(table: &PivotTable, spec: &SortSpec) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (col, header) in export_columns(table).iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, header, &bold)?;
    }

    for (i, row) in export_rows(table, spec).iter().enumerate() {
        let r = (i + 1) as u32;
        worksheet.write_string(r, 0, &row.company)?;
        for (j, value) in row.values.iter().enumerate() {
            worksheet.write_number(r, (j + 1) as u16, *value)?;
        }
    }

    worksheet.set_column_width(0, 40)?;
    worksheet.set_freeze_panes(1, 1)?;

    workbook
        .save_to_buffer()
        .context("Failed to encode workbook")
}

/// Integral quantities without a fraction
fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
