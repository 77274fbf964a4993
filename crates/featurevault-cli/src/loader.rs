//! CSV event source
//!
//! Each row becomes one `RawEvent` keyed by the header names. Values stay
//! strings; the transformation does the typing.

use anyhow::{Context, Result};
use featurevault_core::RawEvent;
use std::io::Read;
use std::path::Path;

/// Events of a CSV stream, one `Result` per data row
pub struct CsvEvents<R: Read> {
    reader: csv::Reader<R>,
    headers: csv::StringRecord,
    row: usize,
}

impl<R: Read> CsvEvents<R> {
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let headers = reader.headers().context("Failed to read CSV header")?.clone();
        Ok(Self {
            reader,
            headers,
            row: 0,
        })
    }
}

impl CsvEvents<std::fs::File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("cannot open {}", path.display()))?;
        Self::from_reader(file)
    }
}

impl<R: Read> Iterator for CsvEvents<R> {
    type Item = Result<RawEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = csv::StringRecord::new();
        self.row += 1;
        match self.reader.read_record(&mut record) {
            Ok(false) => None,
            Ok(true) => Some(Ok(RawEvent::from_pairs(
                self.headers.iter().zip(record.iter()),
            ))),
            Err(e) => Some(Err(anyhow::Error::new(e).context(format!("CSV row {}", self.row)))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    const SAMPLE: &str = "\
customer_id,purchase_value,loyalty_score,purchase_timestamp
16,321.84,1.46,2022-01-05 14:37:14
3, 12.50 ,,2022-01-07 09:00:00
";

    #[test]
    fn test_rows_become_events() {
        let events: Vec<_> = CsvEvents::from_reader(SAMPLE.as_bytes())
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].get("customer_id"), Some(&Value::from("16")));
        assert_eq!(events[1].get("purchase_value"), Some(&Value::from("12.50")));
        assert_eq!(events[1].get("loyalty_score"), Some(&Value::from("")));
    }

    #[test]
    fn test_ragged_row_is_an_error_not_the_end() {
        let data = "a,b\n1,2\n3\n4,5\n";
        let results: Vec<_> = CsvEvents::from_reader(data.as_bytes()).unwrap().collect();

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert!(err.to_string().contains("CSV row 2"));
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_missing_file() {
        assert!(CsvEvents::open("/nonexistent/events.csv").is_err());
    }
}
