//! Downloadable report spreadsheet
//!
//! One row per input row with the original columns preserved, followed by
//! the analysis columns. Rows whose company has no record (blank names)
//! keep empty analysis cells.
//!
//! The primary format is an xlsx workbook with a bold, frozen header and
//! highlighted rows for companies needing review. CSV is kept as a plain
//! export for `analyze -o report.csv`.

use crate::company::{CompanyRecord, Report};
use crate::input::InputSheet;
use crate::org_normalizer::normalize;
use anyhow::{Context, Result};
use csv::Writer;
use rust_xlsxwriter::{Color, Format, FormatBorder, Workbook};
use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const SHEET_NAME: &str = "Analysis Report";
const HEADER_FILL: u32 = 0xD9E1F2;
const REVIEW_FILL: u32 = 0xFFF2CC;

const ANALYSIS_COLUMNS: &[&str] = &[
    "Needs Review",
    "Review Reason",
    "Ownership Summary",
    "Ownership Category",
    "Public/Private",
    "Nation",
];

/// Number of "PE Owner N" columns needed for a batch
pub fn owner_column_count(companies: &[CompanyRecord]) -> usize {
    companies.iter().map(|c| c.pe_owner_names.len()).max().unwrap_or(0)
}

pub fn header_row(sheet: &InputSheet, owner_columns: usize) -> Vec<String> {
    let mut header = sheet.headers.clone();
    header.extend(ANALYSIS_COLUMNS.iter().map(|c| c.to_string()));
    header.extend((1..=owner_columns).map(|n| format!("PE Owner {}", n)));
    header.push("Error".to_string());
    header
}

fn analysis_cells(record: Option<&CompanyRecord>, owner_columns: usize) -> Vec<String> {
    let Some(record) = record else {
        return vec![String::new(); ANALYSIS_COLUMNS.len() + owner_columns + 1];
    };

    let mut cells = vec![
        if record.needs_review { "Yes" } else { "No" }.to_string(),
        record.review_reason.clone().unwrap_or_default(),
        record.ownership_summary.clone(),
        record.ownership_category.as_str().to_string(),
        record.public_private.as_str().to_string(),
        record.nation.clone(),
    ];
    cells.extend((0..owner_columns).map(|i| record.pe_owner_names.get(i).cloned().unwrap_or_default()));
    cells.push(record.error.clone().unwrap_or_default());
    cells
}

/// Build every output row, header first.
pub fn build_rows(report: &Report, sheet: &InputSheet) -> Vec<Vec<String>> {
    let owner_columns = owner_column_count(&report.companies);

    let mut exact: HashMap<&str, &CompanyRecord> = HashMap::new();
    let mut normalized: HashMap<String, &CompanyRecord> = HashMap::new();
    for record in &report.companies {
        exact.entry(record.name.trim()).or_insert(record);
        normalized.entry(normalize(&record.name)).or_insert(record);
    }

    let width = sheet.headers.len();
    let mut rows = Vec::with_capacity(sheet.rows.len() + 1);
    rows.push(header_row(sheet, owner_columns));
    for input in &sheet.rows {
        let record = sheet
            .name_of(input)
            .and_then(|name| exact.get(name).copied().or_else(|| normalized.get(&normalize(name)).copied()));

        let mut row: Vec<String> = input.iter().take(width).cloned().collect();
        row.resize(width, String::new());
        row.extend(analysis_cells(record, owner_columns));
        rows.push(row);
    }
    debug!("Built {} report rows with {} owner columns", rows.len() - 1, owner_columns);
    rows
}

fn build_workbook(report: &Report, sheet: &InputSheet) -> Result<Workbook> {
    let rows = build_rows(report, sheet);
    // "Needs Review" is the first analysis column
    let review_column = sheet.headers.len();

    let header = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(HEADER_FILL))
        .set_border_bottom(FormatBorder::Thin);
    let review = Format::new().set_background_color(Color::RGB(REVIEW_FILL));

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    for (r, row) in rows.iter().enumerate() {
        let r = u32::try_from(r).context("Report has too many rows")?;
        let format = if r == 0 {
            Some(&header)
        } else if row.get(review_column).map(String::as_str) == Some("Yes") {
            Some(&review)
        } else {
            None
        };

        for (c, cell) in row.iter().enumerate() {
            let c = u16::try_from(c).context("Report has too many columns")?;
            match (format, cell.is_empty()) {
                (Some(format), true) => worksheet.write_blank(r, c, format)?,
                (Some(format), false) => worksheet.write_string_with_format(r, c, cell.as_str(), format)?,
                (None, true) => continue,
                (None, false) => worksheet.write_string(r, c, cell.as_str())?,
            };
        }
    }

    worksheet.set_freeze_panes(1, 0)?;
    worksheet.autofit();
    Ok(workbook)
}

pub fn to_xlsx_bytes(report: &Report, sheet: &InputSheet) -> Result<Vec<u8>> {
    let mut workbook = build_workbook(report, sheet)?;
    Ok(workbook.save_to_buffer()?)
}

pub fn write_csv<W: Write>(report: &Report, sheet: &InputSheet, out: W) -> Result<()> {
    let mut wtr = Writer::from_writer(out);
    for row in build_rows(report, sheet) {
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the report to `output_path`: CSV for a `.csv` extension, an xlsx
/// workbook otherwise.
pub fn export_report(report: &Report, sheet: &InputSheet, output_path: &Path) -> Result<()> {
    let is_csv = output_path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

    if is_csv {
        let file = File::create(output_path)
            .with_context(|| format!("Failed to create report file: {}", output_path.display()))?;
        write_csv(report, sheet, file)?;
    } else {
        let mut workbook = build_workbook(report, sheet)?;
        workbook
            .save(output_path)
            .with_context(|| format!("Failed to write report workbook: {}", output_path.display()))?;
    }

    info!(
        "Exported report '{}' with {} companies to {}",
        report.report_name,
        report.companies.len(),
        output_path.display()
    );
    Ok(())
}

/// Attachment file name for a downloaded report
pub fn download_filename(report: &Report) -> String {
    format!("Analysis_Report_{}.xlsx", report.report_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::company::{BatchStatus, OwnershipCategory, PublicPrivate};
    use crate::input::read_sheet;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn report(companies: Vec<CompanyRecord>) -> Report {
        Report {
            report_id: Uuid::nil(),
            report_name: "Analysis Report - test".to_string(),
            status: BatchStatus::Completed,
            companies,
            pe_insights: BTreeMap::new(),
            source_file: None,
            start_time: Utc::now(),
            end_time: Utc::now(),
            duration_seconds: 1.0,
        }
    }

    fn sheet() -> InputSheet {
        InputSheet::from_table(vec![
            vec!["Company Name".to_string(), "Owner".to_string()],
            vec!["Garrett Motion".to_string(), "alice".to_string()],
            vec!["".to_string(), "orphan".to_string()],
            vec!["Stripe Inc".to_string()],
        ])
        .unwrap()
    }

    #[test]
    fn test_header_has_owner_columns_for_max_count() {
        let mut garrett = CompanyRecord::new("Garrett Motion");
        garrett.pe_owner_names = vec!["Oaktree Capital Management".into(), "Centerbridge Partners".into()];
        let rows = build_rows(&report(vec![garrett, CompanyRecord::new("Stripe")]), &sheet());

        assert_eq!(
            rows[0],
            vec![
                "Company Name", "Owner", "Needs Review", "Review Reason", "Ownership Summary",
                "Ownership Category", "Public/Private", "Nation", "PE Owner 1", "PE Owner 2", "Error"
            ]
        );
    }

    #[test]
    fn test_rows_keep_original_cells_and_match_records() {
        let mut garrett = CompanyRecord::new("Garrett Motion");
        garrett.public_private = PublicPrivate::Public;
        garrett.ownership_category = OwnershipCategory::PublicPeBacked;
        garrett.pe_owner_names = vec!["Oaktree Capital Management".into()];
        garrett.nation = "Switzerland".into();
        garrett.add_review_reason("Auto-corrected");
        let failed = CompanyRecord::failed("Stripe", "timeout");

        let rows = build_rows(&report(vec![garrett, failed]), &sheet());
        assert_eq!(rows.len(), 4);
        assert_eq!(
            rows[1],
            vec![
                "Garrett Motion", "alice", "Yes", "Auto-corrected", "N/A", "Public (PE-Backed)", "Public",
                "Switzerland", "Oaktree Capital Management", ""
            ]
        );
        // Blank name: original cells kept, analysis cells empty
        assert_eq!(rows[2][1], "orphan");
        assert!(rows[2][2..].iter().all(String::is_empty));
        // Short row padded, matched through the normalized name
        assert_eq!(rows[3][1], "");
        assert_eq!(rows[3].last().map(String::as_str), Some("timeout"));
    }

    #[test]
    fn test_csv_output_quotes_commas() {
        let mut record = CompanyRecord::new("Garrett Motion");
        record.ownership_summary = "Owned by funds, mostly.".into();
        let mut bytes = Vec::new();
        write_csv(&report(vec![record]), &InputSheet::from_names(["Garrett Motion"]), &mut bytes).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("Company Name,Needs Review,"));
        assert!(text.contains("\"Owned by funds, mostly.\""));
    }

    #[test]
    fn test_xlsx_export_reads_back_with_same_layout() {
        let mut garrett = CompanyRecord::new("Garrett Motion");
        garrett.pe_owner_names = vec!["Oaktree Capital Management".into()];
        garrett.add_review_reason("Auto-corrected");
        let report = report(vec![garrett, CompanyRecord::failed("Stripe", "timeout")]);

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(download_filename(&report));
        export_report(&report, &sheet(), &path).unwrap();

        let expected = build_rows(&report, &sheet());
        let written = read_sheet(&path).unwrap();
        assert_eq!(written.headers, expected[0]);
        assert_eq!(written.rows.len(), 3);
        assert_eq!(written.rows[0], expected[1]);
        assert_eq!(written.rows[0][2], "Yes");
        assert_eq!(written.rows[2].last().map(String::as_str), Some("timeout"));
    }

    #[test]
    fn test_xlsx_bytes_are_a_zip_workbook() {
        let bytes = to_xlsx_bytes(&report(vec![CompanyRecord::new("Stripe")]), &InputSheet::from_names(["Stripe"])).unwrap();
        assert!(bytes.starts_with(b"PK"));
        assert!(download_filename(&report(Vec::new())).ends_with(".xlsx"));
    }

    #[test]
    fn test_csv_extension_exports_csv() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.CSV");
        export_report(&report(vec![CompanyRecord::new("Stripe")]), &InputSheet::from_names(["Stripe"]), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Company Name,Needs Review,"));
    }
}
