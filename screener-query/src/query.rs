//! Fluent scan query builder.
//!
//! [`Query`] owns a [`QueryDocument`] and the endpoint derived from its
//! market scope. Every configuration method consumes the builder and returns
//! it, so chains read naturally and a diverging variant is just a `clone()`:
//!
//! ```ignore
//! let base = Query::new()
//!     .select(["name", "close", "volume"])
//!     .filter([col("close").gt(5), col("volume").ge(1_000_000)]);
//! let crypto = base.clone().set_markets(["crypto"]);
//! let result = base.limit(10).execute(&HttpTransport::new()).await?;
//! ```
//!
//! # Filters
//!
//! `filter` (flat, implicitly AND-ed) and `filter_tree` (nested AND/OR) are
//! independent slots. Both may be populated and both are sent; how the
//! scanner combines them is undefined, so use one or the other.

use screener_common::config::ScannerConfig;
use screener_common::logging::generate_trace_id;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, Instrument};

use crate::error::{Result, ScanError};
use crate::filter::{FilterExpression, LogicalExpression};
use crate::response::{ScanResponse, ScanResult};
use crate::transport::{RequestOptions, Transport};

pub use screener_common::config::{DEFAULT_BASE_URL, DEFAULT_LANG, DEFAULT_MARKET};

// ============================================================================
// Constants
// ============================================================================

/// Path segment of the cross-market endpoint
pub const GLOBAL_MARKET: &str = "global";

/// `[offset, limit]` used when the document has no range
pub const DEFAULT_RANGE: [u64; 2] = [0, 50];

/// Columns selected by a fresh query
pub const DEFAULT_COLUMNS: &[&str] = &["name", "close", "volume", "market_cap_basic"];

/// Sort field the scanner's own UI defaults to
pub const DEFAULT_SORT_FIELD: &str = "Value.Traded";

/// Preset that turns `symbols.symbolset` into index-constituent scoping
pub const INDEX_PRESET: &str = "index_components_market_pages";

/// Endpoint for one market: `{base}/{market}/scan`.
pub fn market_endpoint(base_url: &str, market: &str) -> String {
    format!("{}/{}/scan", base_url.trim_end_matches('/'), market)
}

// ============================================================================
// Query Document
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sort {
    pub sort_by: String,
    pub sort_order: SortOrder,
    pub nulls_first: bool,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            sort_by: DEFAULT_SORT_FIELD.into(),
            sort_order: SortOrder::Desc,
            nulls_first: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolTypes {
    pub types: Vec<String>,
}

/// Symbol scoping: explicit tickers or an index symbol set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolScope {
    pub query: SymbolTypes,
    pub tickers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbolset: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub lang: String,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            lang: DEFAULT_LANG.into(),
        }
    }
}

/// The request document posted to the scanner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryDocument {
    pub markets: Vec<String>,
    pub symbols: SymbolScope,
    pub options: QueryOptions,
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Vec<FilterExpression>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter2: Option<LogicalExpression>,
    pub sort: Sort,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<[u64; 2]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// Top-level properties set through [`Query::set_property`] that have no
    /// typed slot (or did not fit one); these override typed fields of the
    /// same name on the wire.
    #[serde(skip)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for QueryDocument {
    fn default() -> Self {
        Self {
            markets: vec![DEFAULT_MARKET.into()],
            symbols: SymbolScope::default(),
            options: QueryOptions::default(),
            columns: DEFAULT_COLUMNS.iter().map(|c| c.to_string()).collect(),
            filter: None,
            filter2: None,
            sort: Sort::default(),
            range: Some(DEFAULT_RANGE),
            preset: None,
            extra: serde_json::Map::new(),
        }
    }
}

impl QueryDocument {
    /// Serialize to the wire JSON, merging `extra` on top.
    pub fn to_value(&self) -> Result<serde_json::Value> {
        let mut value = serde_json::to_value(self).map_err(ScanError::Encode)?;
        if let serde_json::Value::Object(map) = &mut value {
            for (key, extra) in &self.extra {
                map.insert(key.clone(), extra.clone());
            }
        }
        Ok(value)
    }
}

// ============================================================================
// Query Builder
// ============================================================================

/// Chainable scan query.
#[derive(Debug, Clone)]
pub struct Query {
    document: QueryDocument,
    base_url: String,
    endpoint: String,
    request: RequestOptions,
}

impl Query {
    /// Query over the default market with the default columns, sort and range.
    pub fn new() -> Self {
        Self::from_document(QueryDocument::default())
    }

    /// Query configured from the scanner section of the config.
    pub fn from_config(config: &ScannerConfig) -> Self {
        let document = QueryDocument {
            markets: vec![config.default_market.clone()],
            options: QueryOptions {
                lang: config.lang.clone(),
            },
            ..QueryDocument::default()
        };

        Self::from_document(document)
            .with_base_url(config.base_url.clone())
            .with_request_options(RequestOptions::from_config(config))
    }

    /// Wrap an existing document; the endpoint follows its markets.
    pub fn from_document(document: QueryDocument) -> Self {
        let endpoint = Self::derive_endpoint(DEFAULT_BASE_URL, &document.markets);
        Self {
            document,
            base_url: DEFAULT_BASE_URL.into(),
            endpoint,
            request: RequestOptions::default(),
        }
    }

    fn derive_endpoint(base_url: &str, markets: &[String]) -> String {
        match markets {
            [market] => market_endpoint(base_url, market),
            _ => market_endpoint(base_url, GLOBAL_MARKET),
        }
    }

    /// Point the query at another scanner host (keeps the market scope).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self.endpoint = Self::derive_endpoint(&self.base_url, &self.document.markets);
        self
    }

    /// Headers, timeout and cookie used when executing.
    pub fn with_request_options(mut self, options: RequestOptions) -> Self {
        self.request = options;
        self
    }

    // ------------------------------------------------------------------------
    // Projection, filtering, ordering
    // ------------------------------------------------------------------------

    /// Replace the selected columns. Result rows follow this order.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the flat filter list; the scanner ANDs its entries.
    pub fn filter<I>(mut self, expressions: I) -> Self
    where
        I: IntoIterator<Item = FilterExpression>,
    {
        self.document.filter = Some(expressions.into_iter().collect());
        self
    }

    /// Replace the nested filter tree.
    pub fn filter_tree(mut self, expression: LogicalExpression) -> Self {
        self.document.filter2 = Some(expression);
        self
    }

    /// Replace the sort specification.
    pub fn order_by(
        mut self,
        field: impl Into<String>,
        ascending: bool,
        nulls_first: bool,
    ) -> Self {
        self.document.sort = Sort {
            sort_by: field.into(),
            sort_order: if ascending {
                SortOrder::Asc
            } else {
                SortOrder::Desc
            },
            nulls_first,
        };
        self
    }

    /// `order_by(field, ascending = true, nulls_first = false)`
    pub fn sort_by(self, field: impl Into<String>) -> Self {
        self.order_by(field, true, false)
    }

    // ------------------------------------------------------------------------
    // Range window
    // ------------------------------------------------------------------------

    /// Set the limit, leaving the offset untouched.
    pub fn limit(mut self, limit: u64) -> Self {
        self.document.range.get_or_insert(DEFAULT_RANGE)[1] = limit;
        self
    }

    /// Set the offset, leaving the limit untouched.
    pub fn offset(mut self, offset: u64) -> Self {
        self.document.range.get_or_insert(DEFAULT_RANGE)[0] = offset;
        self
    }

    // ------------------------------------------------------------------------
    // Scope
    // ------------------------------------------------------------------------

    /// Scope to markets. One market uses its own endpoint; zero or several
    /// use the global endpoint (an empty list means every market).
    pub fn set_markets<I, S>(mut self, markets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document.markets = markets.into_iter().map(Into::into).collect();
        self.endpoint = Self::derive_endpoint(&self.base_url, &self.document.markets);
        self
    }

    /// Scope to explicit `EXCHANGE:SYMBOL` tickers across all markets.
    pub fn set_tickers<I, S>(mut self, tickers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document.symbols.tickers = tickers.into_iter().map(Into::into).collect();
        self.set_markets(Vec::<String>::new())
    }

    /// Scope to the constituents of one or more indices (e.g. `SYML:SP;SPX`).
    pub fn set_index<I, S>(mut self, indexes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.document.preset = Some(INDEX_PRESET.into());
        self.document.symbols.symbolset = Some(indexes.into_iter().map(Into::into).collect());
        self.set_markets(Vec::<String>::new())
    }

    /// Set an arbitrary top-level property of the request document.
    ///
    /// `columns`, `markets`, `range`, `sort`, `symbols`, `options` and
    /// `preset` land in their typed fields when the value has the expected
    /// shape, so the endpoint and row remapping stay in step. Any other key,
    /// or a value of the wrong shape, is sent verbatim.
    pub fn set_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        let key = key.into();
        let value = value.into();

        if self.assign_modeled(&key, &value) {
            self.document.extra.remove(&key);
        } else {
            self.document.extra.insert(key, value);
        }
        self
    }

    fn assign_modeled(&mut self, key: &str, value: &serde_json::Value) -> bool {
        let document = &mut self.document;
        match key {
            "columns" => assign(value, &mut document.columns),
            "range" => assign(value, &mut document.range),
            "sort" => assign(value, &mut document.sort),
            "symbols" => assign(value, &mut document.symbols),
            "options" => assign(value, &mut document.options),
            "preset" => assign(value, &mut document.preset),
            "markets" => {
                let assigned = assign(value, &mut document.markets);
                if assigned {
                    self.endpoint = Self::derive_endpoint(&self.base_url, &self.document.markets);
                }
                assigned
            }
            _ => false,
        }
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn document(&self) -> &QueryDocument {
        &self.document
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn columns(&self) -> &[String] {
        &self.document.columns
    }

    pub fn request_options(&self) -> &RequestOptions {
        &self.request
    }

    /// Independent deep copy of the document and endpoint.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Same endpoint and the same serialized document. A document that fails
    /// to serialize is equal to nothing.
    pub fn equals(&self, other: &Self) -> bool {
        if self.endpoint != other.endpoint {
            return false;
        }
        match (self.document.to_value(), other.document.to_value()) {
            (Ok(left), Ok(right)) => left == right,
            _ => false,
        }
    }

    /// Pretty-printed request document.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.document.to_value()?).map_err(ScanError::Encode)
    }

    // ------------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------------

    /// Execute and return the response envelope untouched.
    pub async fn execute_raw<T>(&self, transport: &T) -> Result<ScanResponse>
    where
        T: Transport + ?Sized,
    {
        let body = self.snapshot().to_value()?;
        self.send(transport, &body).await
    }

    /// Execute and remap each row onto the columns that were posted.
    pub async fn execute<T>(&self, transport: &T) -> Result<ScanResult>
    where
        T: Transport + ?Sized,
    {
        let body = self.snapshot().to_value()?;
        let columns = posted_columns(&body);
        let response = self.send(transport, &body).await?;
        Ok(ScanResult::from_response(response, &columns))
    }

    /// Document as it will be sent; the range is defaulted if absent.
    fn snapshot(&self) -> QueryDocument {
        let mut document = self.document.clone();
        document.range.get_or_insert(DEFAULT_RANGE);
        document
    }

    async fn send<T>(&self, transport: &T, body: &serde_json::Value) -> Result<ScanResponse>
    where
        T: Transport + ?Sized,
    {
        let trace_id = generate_trace_id();
        let span = tracing::info_span!("scan", trace_id = %trace_id, endpoint = %self.endpoint);

        async move {
            debug!(
                columns = body["columns"].as_array().map_or(0, Vec::len),
                range = %body["range"],
                "Executing scan"
            );

            let response = transport
                .post(&self.endpoint, body, &self.request)
                .await?
                .error_for_status()?;

            let parsed: ScanResponse =
                serde_json::from_str(&response.body).map_err(ScanError::Decode)?;

            debug!(
                total_count = parsed.total_count,
                rows = parsed.data.as_ref().map_or(0, Vec::len),
                "Scan completed"
            );
            Ok(parsed)
        }
        .instrument(span)
        .await
    }
}

fn assign<T: DeserializeOwned>(value: &serde_json::Value, slot: &mut T) -> bool {
    match T::deserialize(value) {
        Ok(parsed) => {
            *slot = parsed;
            true
        }
        Err(_) => false,
    }
}

/// Column names in the order they were posted; the scanner's `d` arrays
/// follow this order.
fn posted_columns(body: &serde_json::Value) -> Vec<String> {
    body.get("columns")
        .and_then(serde_json::Value::as_array)
        .map(|columns| {
            columns
                .iter()
                .map(|column| match column {
                    serde_json::Value::String(name) => name.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Query {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = self.to_json().map_err(|_| fmt::Error)?;
        write!(f, "Query({}) {}", self.endpoint, json)
    }
}
