//! Scan response envelope and row remapping.
//!
//! The scanner answers with positional rows: `{"s": "NASDAQ:AAPL", "d": [...]}`
//! where `d` follows the order of the requested columns. [`ScanResult`]
//! zips each `d` back onto the column names.

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Key under which the matched symbol is stored in each row.
pub const TICKER_KEY: &str = "ticker";

// ============================================================================
// Wire Types
// ============================================================================

/// Untouched response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResponse {
    #[serde(default)]
    pub total_count: u64,
    /// Omitted by the scanner for some zero-match queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<RawRow>>,
    /// Any other top-level keys, kept for passthrough
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// One matched symbol with its positional values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "d", default)]
    pub values: Vec<serde_json::Value>,
}

// ============================================================================
// Remapped Result
// ============================================================================

/// A row with values keyed by column name, in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRow {
    pub ticker: String,
    fields: Vec<(String, serde_json::Value)>,
}

impl ScanRow {
    /// Zip `values` onto `columns`.
    ///
    /// A length mismatch is tolerated: surplus values are dropped and
    /// unmatched columns are left out of the row. A selected column named
    /// `ticker` is dropped too; [`TICKER_KEY`] always holds the row symbol.
    pub fn from_raw(raw: RawRow, columns: &[String]) -> Self {
        if raw.values.len() != columns.len() {
            warn!(
                symbol = %raw.symbol,
                expected = columns.len(),
                actual = raw.values.len(),
                "Row value count does not match requested columns"
            );
        }

        let fields = columns
            .iter()
            .cloned()
            .zip(raw.values)
            .filter(|(name, _)| name != TICKER_KEY)
            .collect();
        Self {
            ticker: raw.symbol,
            fields,
        }
    }

    /// Value of a column, or `None` if it was not returned.
    pub fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(serde_json::Value::as_f64)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(serde_json::Value::as_str)
    }

    /// Column/value pairs in request order (ticker excluded).
    pub fn fields(&self) -> &[(String, serde_json::Value)] {
        &self.fields
    }

    /// Flat JSON object: `{"ticker": .., column: value, ..}`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::with_capacity(self.fields.len() + 1);
        map.insert(TICKER_KEY.into(), self.ticker.clone().into());
        for (name, value) in &self.fields {
            map.insert(name.clone(), value.clone());
        }
        serde_json::Value::Object(map)
    }
}

impl Serialize for ScanRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len() + 1))?;
        map.serialize_entry(TICKER_KEY, &self.ticker)?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Total match count plus the rows of the requested window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanResult {
    pub total_count: u64,
    pub rows: Vec<ScanRow>,
}

impl ScanResult {
    /// Remap a raw envelope against the columns the request was sent with.
    /// A missing `data` array yields an empty result.
    pub fn from_response(response: ScanResponse, columns: &[String]) -> Self {
        let rows = response
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|raw| ScanRow::from_raw(raw, columns))
            .collect();

        Self {
            total_count: response.total_count,
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScanRow> {
        self.rows.iter()
    }

    /// Symbols in server order.
    pub fn tickers(&self) -> Vec<&str> {
        self.rows.iter().map(|row| row.ticker.as_str()).collect()
    }
}

impl IntoIterator for ScanResult {
    type Item = ScanRow;
    type IntoIter = std::vec::IntoIter<ScanRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ScanResult {
    type Item = &'a ScanRow;
    type IntoIter = std::slice::Iter<'a, ScanRow>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_remap_row() {
        let response: ScanResponse = serde_json::from_value(json!({
            "totalCount": 1,
            "data": [{"s": "X:Y", "d": [1, "two", 3.5]}]
        }))
        .unwrap();

        let result = ScanResult::from_response(response, &columns(&["c1", "c2", "c3"]));
        assert_eq!(result.total_count, 1);
        assert_eq!(result.len(), 1);
        assert_eq!(
            result.rows[0].to_json(),
            json!({"ticker": "X:Y", "c1": 1, "c2": "two", "c3": 3.5})
        );
        assert_eq!(result.rows[0].get_str("c2"), Some("two"));
        assert_eq!(result.rows[0].get_f64("c3"), Some(3.5));
    }

    #[test]
    fn test_missing_or_empty_data() {
        for body in [json!({"totalCount": 42}), json!({"totalCount": 0, "data": []})] {
            let response: ScanResponse = serde_json::from_value(body).unwrap();
            let expected_total = response.total_count;
            let result = ScanResult::from_response(response, &columns(&["name"]));
            assert!(result.is_empty());
            assert_eq!(result.total_count, expected_total);
        }
    }

    #[test]
    fn test_length_mismatch_is_tolerated() {
        let short = RawRow {
            symbol: "NYSE:A".into(),
            values: vec![json!(1)],
        };
        let row = ScanRow::from_raw(short, &columns(&["close", "volume"]));
        assert_eq!(row.get("close"), Some(&json!(1)));
        assert_eq!(row.get("volume"), None);

        let long = RawRow {
            symbol: "NYSE:B".into(),
            values: vec![json!(1), json!(2), json!(3)],
        };
        let row = ScanRow::from_raw(long, &columns(&["close"]));
        assert_eq!(row.fields().len(), 1);
    }

    #[test]
    fn test_row_serializes_flat_and_in_order() {
        let row = ScanRow::from_raw(
            RawRow {
                symbol: "NASDAQ:AAPL".into(),
                values: vec![json!("AAPL"), json!(190.1)],
            },
            &columns(&["name", "close"]),
        );
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"ticker":"NASDAQ:AAPL","name":"AAPL","close":190.1}"#
        );
    }

    #[test]
    fn test_ticker_column_does_not_shadow_symbol() {
        let row = ScanRow::from_raw(
            RawRow {
                symbol: "NASDAQ:AAPL".into(),
                values: vec![json!("AAPL"), json!(190.1)],
            },
            &columns(&["ticker", "close"]),
        );
        assert_eq!(row.ticker, "NASDAQ:AAPL");
        assert_eq!(row.fields().len(), 1);
        assert_eq!(row.to_json(), json!({"ticker": "NASDAQ:AAPL", "close": 190.1}));
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"{"ticker":"NASDAQ:AAPL","close":190.1}"#
        );
    }

    #[test]
    fn test_extra_envelope_keys_preserved() {
        let response: ScanResponse = serde_json::from_value(json!({
            "totalCount": 0,
            "params": {"lang": "en"}
        }))
        .unwrap();
        assert_eq!(response.extra.get("params"), Some(&json!({"lang": "en"})));
        assert!(response.data.is_none());
    }
}
