//! Screener Query
//!
//! Fluent query builder and thin client for the market screener scan API.
//!
//! # Architecture
//!
//! ```text
//! Field ──gt/between/isin/..──▶ FilterExpression ──and/or──▶ LogicalExpression
//!                                      │                            │
//!                                      ▼                            ▼
//!                     Query::filter (flat, AND)        Query::filter_tree (nested)
//!                                      │
//!         select / order_by / limit / offset / set_markets / set_tickers / set_index
//!                                      │
//!                                      ▼
//!              QueryDocument ──Transport::post──▶ ScanResponse ──▶ ScanResult
//! ```
//!
//! The document is the only state. Execution snapshots it, posts it to the
//! endpoint derived from the market scope, and zips each positional row
//! back onto the selected columns.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod error;
pub mod filter;
pub mod query;
pub mod response;
pub mod transport;
pub mod util;

pub use error::{Result, ScanError};
pub use filter::{
    and, col, or, Connector, Field, FilterExpression, FilterNode, LogicalExpression, Operand,
    Operator, Value,
};
pub use query::{Query, QueryDocument, Sort, SortOrder, DEFAULT_RANGE};
pub use response::{RawRow, ScanResponse, ScanResult, ScanRow};
pub use transport::{HttpTransport, RequestOptions, Transport, TransportResponse};
pub use util::{format_technical_rating, get_all_symbols};
