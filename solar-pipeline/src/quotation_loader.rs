//! CSV quotation row loader.
//!
//! Parses CSV files into [`LineDraft`]s. Expected columns:
//!   kind, description, quantity, unit_price, profit_percentage
//!
//! `kind` is `product` or `item`, case-insensitive. Numbers are read as
//! exact decimals, never through a float.

use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use crate::error::{LoaderError, LoaderResult};
use crate::types::{LineDraft, LineKind};

#[derive(Debug, Deserialize)]
struct LineRecord {
    #[serde(deserialize_with = "deserialize_kind")]
    kind: LineKind,
    #[serde(default)]
    description: String,
    #[serde(deserialize_with = "deserialize_decimal")]
    quantity: Decimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    unit_price: Decimal,
    #[serde(deserialize_with = "deserialize_decimal")]
    profit_percentage: Decimal,
}

impl From<LineRecord> for LineDraft {
    fn from(record: LineRecord) -> Self {
        Self {
            kind: record.kind,
            description: record.description,
            quantity: record.quantity,
            unit_price: record.unit_price,
            profit_percentage: record.profit_percentage,
        }
    }
}

/// Load quotation rows from a CSV reader.
///
/// Errors carry the file line number, counting the header as line 1.
pub fn load_lines<R: Read>(reader: R) -> LoaderResult<Vec<LineDraft>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut lines = Vec::new();
    for (line_num, result) in csv_reader.deserialize::<LineRecord>().enumerate() {
        let record = result.map_err(|source| LoaderError::Csv {
            line: line_num + 2,
            source,
        })?;
        lines.push(record.into());
    }

    Ok(lines)
}

/// Load quotation rows from a CSV file path.
pub fn load_lines_file(path: impl AsRef<Path>) -> LoaderResult<Vec<LineDraft>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| LoaderError::Io {
        path: path.display().to_string(),
        source,
    })?;
    load_lines(file)
}

fn deserialize_kind<'de, D>(deserializer: D) -> Result<LineKind, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    match s.to_lowercase().trim() {
        "product" | "products" | "p" => Ok(LineKind::Product),
        "item" | "items" | "i" => Ok(LineKind::Item),
        other => Err(serde::de::Error::custom(format!(
            "expected 'product' or 'item', got '{}'",
            other
        ))),
    }
}

/// Accepts plain and thousands-separated numbers (`1200000`, `1,200,000.50`).
fn deserialize_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    let cleaned: String = s.trim().chars().filter(|c| *c != ',' && *c != '_').collect();
    Decimal::from_str(&cleaned)
        .map_err(|e| serde::de::Error::custom(format!("invalid number '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE_CSV: &str = "\
kind,description,quantity,unit_price,profit_percentage
product,Panel 550W,20,650000,0.15
Product,Inverter 10kW,1,\"8,900,000\",0.12
item,DC cable 6mm (m),120,4800.50,0.2
ITEM,Installation labour,1,3500000,0
";

    #[test]
    fn load_sample_csv() {
        let lines = load_lines(SAMPLE_CSV.as_bytes()).unwrap();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].kind, LineKind::Product);
        assert_eq!(lines[0].description, "Panel 550W");
        assert_eq!(lines[0].quantity, dec!(20));
        assert_eq!(lines[1].unit_price, dec!(8900000));
        assert_eq!(lines[2].kind, LineKind::Item);
        assert_eq!(lines[2].unit_price, dec!(4800.50));
        assert_eq!(lines[3].kind, LineKind::Item);
        assert_eq!(lines[3].profit_percentage, Decimal::ZERO);
    }

    #[test]
    fn decimals_are_exact() {
        let csv_data = "\
kind,description,quantity,unit_price,profit_percentage
product,x,0.1,0.2,0.3
";
        let lines = load_lines(csv_data.as_bytes()).unwrap();
        assert_eq!(lines[0].quantity + lines[0].unit_price, dec!(0.3));
    }

    #[test]
    fn unknown_kind_reports_line_number() {
        let csv_data = "\
kind,description,quantity,unit_price,profit_percentage
product,ok,1,1,0
service,bad,1,1,0
";
        match load_lines(csv_data.as_bytes()) {
            Err(LoaderError::Csv { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected csv error, got {:?}", other),
        }
    }

    #[test]
    fn bad_number_is_rejected() {
        let csv_data = "\
kind,description,quantity,unit_price,profit_percentage
item,x,two,1,0
";
        assert!(matches!(
            load_lines(csv_data.as_bytes()),
            Err(LoaderError::Csv { line: 2, .. })
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.csv");
        assert!(matches!(load_lines_file(&path), Err(LoaderError::Io { .. })));
    }
}
