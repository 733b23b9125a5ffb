// 🧱 Cell Model - Raw sheet values
// Every loader produces these; detector and extractor only read them through the coercions below

use serde::{Deserialize, Serialize};

// ============================================================================
// CORE TYPES
// ============================================================================

/// One raw cell as produced by a loader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

/// RawSheet - rows of cells, index origin 0. Rows may have different lengths.
pub type RawSheet = Vec<Vec<CellValue>>;

impl CellValue {
    /// Text view of the cell
    ///
    /// Integral numbers render without a fraction (`100.0` → `"100"`), so a
    /// numeric company code reads the same as it would in the sheet.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => format_number(*n),
            CellValue::Empty => String::new(),
        }
    }

    /// Numeric view - only cells that already hold a number
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(self, CellValue::Number(_))
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// Holding quantity carried by this cell
    ///
    /// Numbers pass through; text is parsed after dropping thousands separators.
    /// Empty, unparsable, negative and non-finite values all come back as 0.
    pub fn quantity(&self) -> f64 {
        let raw = match self {
            CellValue::Number(n) => *n,
            CellValue::Text(s) => parse_decimal(s).unwrap_or(0.0),
            CellValue::Empty => 0.0,
        };

        if raw.is_finite() && raw > 0.0 {
            raw
        } else {
            0.0
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Parse "1,234.50" style text
pub fn parse_decimal(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return None;
    }

    cleaned.parse::<f64>().ok()
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_text_integral_number() {
        assert_eq!(CellValue::Number(100.0).as_text(), "100");
        assert_eq!(CellValue::Number(12.5).as_text(), "12.5");
        assert_eq!(CellValue::Empty.as_text(), "");
        assert_eq!(CellValue::from(" Infosys ").as_text(), " Infosys ");
    }

    #[test]
    fn test_quantity_from_text_with_separators() {
        assert_eq!(CellValue::from("1,23,456").quantity(), 123456.0);
        assert_eq!(CellValue::from(" 1,000.50 ").quantity(), 1000.5);
    }

    #[test]
    fn test_quantity_unparsable_is_zero() {
        assert_eq!(CellValue::from("n/a").quantity(), 0.0);
        assert_eq!(CellValue::from("").quantity(), 0.0);
        assert_eq!(CellValue::Empty.quantity(), 0.0);
    }

    #[test]
    fn test_quantity_negative_and_non_finite_are_zero() {
        assert_eq!(CellValue::Number(-5.0).quantity(), 0.0);
        assert_eq!(CellValue::from("-1,000").quantity(), 0.0);
        assert_eq!(CellValue::Number(f64::NAN).quantity(), 0.0);
        assert_eq!(CellValue::from("inf").quantity(), 0.0);
    }

    #[test]
    fn test_as_number_only_for_numbers() {
        assert_eq!(CellValue::Number(3.0).as_number(), Some(3.0));
        assert_eq!(CellValue::from("3").as_number(), None);
        assert!(CellValue::from("   ").is_empty());
    }
}
