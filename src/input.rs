//! Spreadsheet input
//!
//! Reads the uploaded company list. Excel and ODS workbooks go through
//! calamine (first sheet only), CSV through the csv crate. The first row is
//! the header and must contain a "Company Name" column.

use calamine::Reader;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

pub const COMPANY_NAME_COLUMN: &str = "Company Name";

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Invalid file type. Please upload a spreadsheet (.xlsx, .xls, .ods or .csv).")]
    UnsupportedFormat,

    #[error("The spreadsheet is empty.")]
    Empty,

    #[error("The spreadsheet must contain a 'Company Name' column.")]
    MissingCompanyColumn,

    #[error("No valid company names found in the 'Company Name' column.")]
    NoCompanies,

    #[error("Could not read spreadsheet: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("Could not parse CSV file: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Workbook,
    Csv,
}

impl InputFormat {
    /// Detect format from file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref() {
            Some("xlsx") | Some("xls") | Some("xlsm") | Some("ods") => Some(Self::Workbook),
            Some("csv") => Some(Self::Csv),
            _ => None,
        }
    }
}

pub fn is_allowed_file(filename: &str) -> bool {
    InputFormat::from_path(Path::new(filename)).is_some()
}

/// Header plus data rows of an input sheet, all cells as text
#[derive(Debug, Clone, PartialEq)]
pub struct InputSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    name_column: usize,
}

impl InputSheet {
    pub fn from_table(mut table: Vec<Vec<String>>) -> Result<Self, InputError> {
        if table.is_empty() {
            return Err(InputError::Empty);
        }
        let headers: Vec<String> = table.remove(0).into_iter().map(|h| h.trim().to_string()).collect();
        let name_column = headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(COMPANY_NAME_COLUMN))
            .ok_or(InputError::MissingCompanyColumn)?;

        // Drop fully blank rows; trailing empty rows are common in exported workbooks
        let rows = table
            .into_iter()
            .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .collect();

        Ok(Self {
            headers,
            rows,
            name_column,
        })
    }

    /// A sheet with only the company name column, used when the uploaded file is gone
    pub fn from_names<'a, I>(names: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self {
            headers: vec![COMPANY_NAME_COLUMN.to_string()],
            rows: names.into_iter().map(|n| vec![n.to_string()]).collect(),
            name_column: 0,
        }
    }

    /// Company name of a row, trimmed. None for blank cells.
    pub fn name_of<'a>(&self, row: &'a [String]) -> Option<&'a str> {
        row.get(self.name_column).map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    /// Non-blank company names in row order
    pub fn company_names(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| self.name_of(row))
            .map(str::to_string)
            .collect()
    }

    /// Like `company_names` but rejects a sheet without any names
    pub fn require_company_names(&self) -> Result<Vec<String>, InputError> {
        let names = self.company_names();
        if names.is_empty() {
            return Err(InputError::NoCompanies);
        }
        Ok(names)
    }
}

pub fn read_sheet(path: &Path) -> Result<InputSheet, InputError> {
    let format = InputFormat::from_path(path).ok_or(InputError::UnsupportedFormat)?;
    let table = match format {
        InputFormat::Workbook => read_workbook(path)?,
        InputFormat::Csv => read_csv(path)?,
    };
    let sheet = InputSheet::from_table(table)?;
    info!("Read {} rows from {}", sheet.rows.len(), path.display());
    Ok(sheet)
}

fn read_workbook(path: &Path) -> Result<Vec<Vec<String>>, InputError> {
    let mut workbook = calamine::open_workbook_auto(path)?;
    let Some(first) = workbook.sheet_names().first().cloned() else {
        return Err(InputError::Empty);
    };
    debug!("Reading sheet '{}' of {}", first, path.display());
    let range = workbook.worksheet_range(&first)?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect())
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, InputError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut table = Vec::new();
    for record in reader.records() {
        table.push(record?.iter().map(str::to_string).collect());
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn table(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter().map(|r| r.iter().map(|c| c.to_string()).collect()).collect()
    }

    #[test]
    fn test_input_format_detection() {
        assert_eq!(InputFormat::from_path(Path::new("a.xlsx")), Some(InputFormat::Workbook));
        assert_eq!(InputFormat::from_path(Path::new("a.XLS")), Some(InputFormat::Workbook));
        assert_eq!(InputFormat::from_path(Path::new("a.ods")), Some(InputFormat::Workbook));
        assert_eq!(InputFormat::from_path(Path::new("a.csv")), Some(InputFormat::Csv));
        assert_eq!(InputFormat::from_path(Path::new("a.txt")), None);
        assert!(!is_allowed_file("companies"));
    }

    #[test]
    fn test_company_column_is_case_insensitive() {
        let sheet = InputSheet::from_table(table(&[&["id", " company name "], &["1", "Stripe"], &["2", "  "], &["3", " Garrett Motion "]])).unwrap();
        assert_eq!(sheet.company_names(), vec!["Stripe", "Garrett Motion"]);
        assert_eq!(sheet.headers, vec!["id", "company name"]);
        assert_eq!(sheet.rows.len(), 3);
    }

    #[test]
    fn test_missing_column_and_empty_input() {
        assert!(matches!(
            InputSheet::from_table(table(&[&["Name"], &["Stripe"]])),
            Err(InputError::MissingCompanyColumn)
        ));
        assert!(matches!(InputSheet::from_table(Vec::new()), Err(InputError::Empty)));
    }

    #[test]
    fn test_no_names_is_rejected() {
        let sheet = InputSheet::from_table(table(&[&["Company Name", "Region"], &["", "EU"]])).unwrap();
        assert!(matches!(sheet.require_company_names(), Err(InputError::NoCompanies)));
    }

    #[test]
    fn test_read_csv_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("companies.csv");
        fs::write(&path, "Company Name,Owner\nStripe,alice\n\"Acme, Inc.\",bob\n,\n").unwrap();

        let sheet = read_sheet(&path).unwrap();
        assert_eq!(sheet.company_names(), vec!["Stripe", "Acme, Inc."]);
        assert_eq!(sheet.rows[1], vec!["Acme, Inc.", "bob"]);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(matches!(read_sheet(Path::new("companies.txt")), Err(InputError::UnsupportedFormat)));
    }
}
