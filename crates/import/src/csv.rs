//! CSV import: decode, structural validation, typed row parsing.

use std::io::Read;
use std::path::Path;

use arborsync_config::ColumnLayout;
use arborsync_core::TreeImport;

use crate::error::ParseError;

/// Read an import file, enforcing the `.csv` extension and converting to
/// UTF-8 if needed (Windows-1252 is common for Excel-exported CSVs).
pub fn read_file(path: &Path) -> Result<String, ParseError> {
    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);
    if !is_csv {
        return Err(ParseError::NotCsv(path.display().to_string()));
    }

    let mut file = std::fs::File::open(path).map_err(|e| ParseError::Io(e.to_string()))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| ParseError::Io(e.to_string()))?;

    // UTF-8 first; the error hands the buffer back for the fallback
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Parse CSV content into import records, in row order.
///
/// Validation runs in three passes: the header must equal the configured
/// column list exactly, then one structural scan rejects malformed rows
/// (wrong field count, broken quoting) before any value is interpreted,
/// then the semantic pass types each row. The first violation fails the
/// whole import; there is no partial result.
pub fn parse(content: &str, columns: &ColumnLayout) -> Result<Vec<TreeImport>, ParseError> {
    check_header(content, columns)?;
    structural_scan(content)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content.as_bytes());

    let mut records = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let row = i + 1;
        let record = result
            .map_err(|e| ParseError::MalformedRow { row, reason: e.to_string() })?;
        records.push(parse_row(row, &record, columns)?);
    }
    Ok(records)
}

fn check_header(content: &str, columns: &ColumnLayout) -> Result<(), ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());
    let found: Vec<String> = reader
        .headers()
        .map_err(|e| ParseError::Io(e.to_string()))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let expected = columns.expected_headers();
    let matches = found.len() == expected.len()
        && found.iter().zip(expected.iter()).all(|(a, b)| a == b);
    if !matches {
        return Err(ParseError::HeaderMismatch {
            expected: expected.join(", "),
            found: found.join(", "),
        });
    }
    Ok(())
}

/// Full pre-scan for structural defects, before semantic parsing begins.
fn structural_scan(content: &str) -> Result<(), ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(content.as_bytes());
    for (i, result) in reader.records().enumerate() {
        result.map_err(|e| ParseError::MalformedRow { row: i + 1, reason: e.to_string() })?;
    }
    Ok(())
}

fn parse_row(
    row: usize,
    record: &csv::StringRecord,
    columns: &ColumnLayout,
) -> Result<TreeImport, ParseError> {
    // Header equality pins every column to its configured position.
    let required = |idx: usize, column: &str| -> Result<String, ParseError> {
        match record.get(idx) {
            Some(value) if !value.is_empty() => Ok(value.to_string()),
            _ => Err(ParseError::MissingField { row, column: column.to_string() }),
        }
    };

    let area = required(0, &columns.area)?;
    let street = required(1, &columns.street)?;
    let number = required(2, &columns.number)?;

    // Species is the one column allowed to be absent or blank.
    let species = record.get(3).unwrap_or("").to_string();

    let northing = required(4, &columns.northing)?;
    let latitude = parse_decimal(&northing)
        .ok_or_else(|| ParseError::InvalidNumber {
            row,
            column: columns.northing.clone(),
            value: northing.clone(),
        })?;

    let easting = required(5, &columns.easting)?;
    let longitude = parse_decimal(&easting)
        .ok_or_else(|| ParseError::InvalidNumber {
            row,
            column: columns.easting.clone(),
            value: easting.clone(),
        })?;

    let year = required(6, &columns.planting_year)?;
    let planting_year: i32 = year.parse().map_err(|_| ParseError::InvalidNumber {
        row,
        column: columns.planting_year.clone(),
        value: year.clone(),
    })?;

    Ok(TreeImport {
        area,
        number,
        species,
        latitude,
        longitude,
        planting_year,
        street,
        id: None,
    })
}

/// Decimal parse accepting the comma-separator locale variant.
fn parse_decimal(value: &str) -> Option<f64> {
    value.replace(',', ".").parse().ok()
}
