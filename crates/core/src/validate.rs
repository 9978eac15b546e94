//! Semantic field validation, applied once per run after reprojection and
//! before any store mutation.

use thiserror::Error;

use crate::model::TreeImport;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("row {row}: planting year {year} must be greater than zero")]
    YearOutOfRange { row: usize, year: i32 },

    #[error("row {row}: latitude {value} outside [-90, 90]")]
    LatitudeOutOfRange { row: usize, value: f64 },

    #[error("row {row}: longitude {value} outside [-180, 180]")]
    LongitudeOutOfRange { row: usize, value: f64 },

    #[error("row {row}: {field} is not a finite number")]
    NonFinite { row: usize, field: &'static str },
}

/// Check field constraints on reprojected records. Rows are 1-indexed to
/// match the parser's row numbering (header excluded).
pub fn validate_records(records: &[TreeImport]) -> Result<(), ValidationError> {
    for (i, rec) in records.iter().enumerate() {
        let row = i + 1;
        if !rec.latitude.is_finite() {
            return Err(ValidationError::NonFinite { row, field: "latitude" });
        }
        if !rec.longitude.is_finite() {
            return Err(ValidationError::NonFinite { row, field: "longitude" });
        }
        if !(-90.0..=90.0).contains(&rec.latitude) {
            return Err(ValidationError::LatitudeOutOfRange { row, value: rec.latitude });
        }
        if !(-180.0..=180.0).contains(&rec.longitude) {
            return Err(ValidationError::LongitudeOutOfRange { row, value: rec.longitude });
        }
        if rec.planting_year <= 0 {
            return Err(ValidationError::YearOutOfRange { row, year: rec.planting_year });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(latitude: f64, longitude: f64, planting_year: i32) -> TreeImport {
        TreeImport {
            area: "Mitte".into(),
            number: "1".into(),
            species: String::new(),
            latitude,
            longitude,
            planting_year,
            street: "Am Hafen".into(),
            id: None,
        }
    }

    #[test]
    fn accepts_in_range_records() {
        let records = vec![record(54.78, 9.43, 2010), record(-33.9, 151.2, 1)];
        assert_eq!(validate_records(&records), Ok(()));
    }

    #[test]
    fn rejects_year_zero_with_row_index() {
        let records = vec![record(54.78, 9.43, 2010), record(54.79, 9.44, 0)];
        assert_eq!(
            validate_records(&records),
            Err(ValidationError::YearOutOfRange { row: 2, year: 0 })
        );
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        let records = vec![record(91.0, 9.43, 2010)];
        assert_eq!(
            validate_records(&records),
            Err(ValidationError::LatitudeOutOfRange { row: 1, value: 91.0 })
        );
    }

    #[test]
    fn rejects_non_finite_longitude() {
        let records = vec![record(54.78, f64::NAN, 2010)];
        assert_eq!(
            validate_records(&records),
            Err(ValidationError::NonFinite { row: 1, field: "longitude" })
        );
    }
}
