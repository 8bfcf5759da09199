//! Helpers that sit beside the query builder.

use serde_json::json;

use crate::error::{Result, ScanError};
use crate::query::market_endpoint;
use crate::response::ScanResponse;
use crate::transport::{RequestOptions, Transport};

/// Every symbol the scanner lists for `market`, e.g. `["NASDAQ:AAPL", ...]`.
///
/// Posts an empty document, for which the scanner returns its full symbol
/// list without columns.
pub async fn get_all_symbols<T>(
    transport: &T,
    base_url: &str,
    market: &str,
    options: &RequestOptions,
) -> Result<Vec<String>>
where
    T: Transport + ?Sized,
{
    let url = market_endpoint(base_url, market);
    let response = transport
        .post(&url, &json!({}), options)
        .await?
        .error_for_status()?;

    let parsed: ScanResponse = serde_json::from_str(&response.body).map_err(ScanError::Decode)?;
    Ok(parsed
        .data
        .unwrap_or_default()
        .into_iter()
        .map(|row| row.symbol)
        .collect())
}

/// Label for a technical rating such as `Recommend.All` (range -1..=1).
pub fn format_technical_rating(rating: f64) -> &'static str {
    if rating >= 0.5 {
        "Strong Buy"
    } else if rating >= 0.1 {
        "Buy"
    } else if rating >= -0.1 {
        "Neutral"
    } else if rating >= -0.5 {
        "Sell"
    } else {
        "Strong Sell"
    }
}
