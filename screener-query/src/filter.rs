//! Filter expressions for scanner queries.
//!
//! A [`Field`] handle produces leaf [`FilterExpression`]s (`left op right`).
//! Leaves and [`LogicalExpression`] composites combine through [`and`] and
//! [`or`] into trees of arbitrary depth. Nothing here validates field names
//! or operator/operand pairings; the remote scanner is authoritative.
//!
//! # Wire Shapes
//!
//! ```text
//! leaf:       {"left": "close", "operation": "greater", "right": 10}
//! composite:  {"operator": "and", "operands": [{"expression": leaf}, {"operation": composite}]}
//! ```

use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;
use std::fmt;

use crate::error::{Result, ScanError};

// ============================================================================
// Operators
// ============================================================================

/// Comparison operators understood by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Equal,
    NotEqual,
    InRange,
    NotInRange,
    Match,
    NotMatch,
    Has,
    HasNoneOf,
    Empty,
    NotEmpty,
    Crosses,
    CrossesAbove,
    CrossesBelow,
    AbovePercent,
    BelowPercent,
    InRangePercent,
    NotInRangePercent,
    InDayRange,
    InWeekRange,
    InMonthRange,
}

impl Operator {
    /// Wire name of the operator.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greater => "greater",
            Self::GreaterOrEqual => "egreater",
            Self::Less => "less",
            Self::LessOrEqual => "eless",
            Self::Equal => "equal",
            Self::NotEqual => "nequal",
            Self::InRange => "in_range",
            Self::NotInRange => "not_in_range",
            Self::Match => "match",
            Self::NotMatch => "nmatch",
            Self::Has => "has",
            Self::HasNoneOf => "has_none_of",
            Self::Empty => "empty",
            Self::NotEmpty => "nempty",
            Self::Crosses => "crosses",
            Self::CrossesAbove => "crosses_above",
            Self::CrossesBelow => "crosses_below",
            Self::AbovePercent => "above%",
            Self::BelowPercent => "below%",
            Self::InRangePercent => "in_range%",
            Self::NotInRangePercent => "not_in_range%",
            Self::InDayRange => "in_day_range",
            Self::InWeekRange => "in_week_range",
            Self::InMonthRange => "in_month_range",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Operands
// ============================================================================

/// A single right-hand term: a literal or a reference to another field.
///
/// Field references serialize as the bare field name, which is how the
/// scanner expresses field-to-field comparisons (`close > VWAP`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Field(String),
}

macro_rules! value_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Int(i64::from(v))
                }
            }
        )*
    };
}

value_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Value::Float(v as f64), Value::Int)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        i64::try_from(v).map_or(Value::Float(v as f64), Value::Int)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Field> for Value {
    fn from(field: Field) -> Self {
        Value::Field(field.name)
    }
}

impl From<&Field> for Value {
    fn from(field: &Field) -> Self {
        Value::Field(field.name.clone())
    }
}

/// Right-hand side of a leaf expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand (null checks); `right` is omitted on the wire
    None,
    /// One term
    Single(Value),
    /// Lower and upper bound
    Pair(Value, Value),
    /// Set of values
    List(Vec<Value>),
    /// Reference field scaled by one or two ratios: `[field, ratio...]`
    Relative { field: String, ratios: Vec<f64> },
}

impl Operand {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl Serialize for Operand {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::None => serializer.serialize_none(),
            Self::Single(value) => value.serialize(serializer),
            Self::Pair(low, high) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element(low)?;
                seq.serialize_element(high)?;
                seq.end()
            }
            Self::List(values) => values.serialize(serializer),
            Self::Relative { field, ratios } => {
                let mut seq = serializer.serialize_seq(Some(1 + ratios.len()))?;
                seq.serialize_element(field)?;
                for ratio in ratios {
                    seq.serialize_element(ratio)?;
                }
                seq.end()
            }
        }
    }
}

// ============================================================================
// Leaf Expression
// ============================================================================

/// A single `field operator operand` comparison.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterExpression {
    #[serde(rename = "left")]
    field: String,
    #[serde(rename = "operation")]
    operator: Operator,
    #[serde(rename = "right", skip_serializing_if = "Operand::is_none")]
    operand: Operand,
}

impl FilterExpression {
    /// Build a leaf directly. Prefer the [`Field`] methods.
    pub fn new(field: impl Into<String>, operator: Operator, operand: Operand) -> Self {
        Self {
            field: field.into(),
            operator,
            operand,
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn operand(&self) -> &Operand {
        &self.operand
    }
}

// ============================================================================
// Field Handle
// ============================================================================

/// Handle to a scanner field, used to build comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    name: String,
}

/// Shorthand for [`Field::new`].
pub fn col(name: impl Into<String>) -> Field {
    Field::new(name)
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn leaf(&self, operator: Operator, operand: Operand) -> FilterExpression {
        FilterExpression::new(self.name.clone(), operator, operand)
    }

    fn single(&self, operator: Operator, value: impl Into<Value>) -> FilterExpression {
        self.leaf(operator, Operand::Single(value.into()))
    }

    fn pair(
        &self,
        operator: Operator,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> FilterExpression {
        self.leaf(operator, Operand::Pair(low.into(), high.into()))
    }

    fn list<I, V>(&self, operator: Operator, values: I) -> FilterExpression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.leaf(
            operator,
            Operand::List(values.into_iter().map(Into::into).collect()),
        )
    }

    fn relative(&self, operator: Operator, field: &str, ratios: Vec<f64>) -> FilterExpression {
        self.leaf(
            operator,
            Operand::Relative {
                field: field.to_string(),
                ratios,
            },
        )
    }

    /// `self > value`
    pub fn gt(&self, value: impl Into<Value>) -> FilterExpression {
        self.single(Operator::Greater, value)
    }

    /// `self >= value`
    pub fn ge(&self, value: impl Into<Value>) -> FilterExpression {
        self.single(Operator::GreaterOrEqual, value)
    }

    /// `self < value`
    pub fn lt(&self, value: impl Into<Value>) -> FilterExpression {
        self.single(Operator::Less, value)
    }

    /// `self <= value`
    pub fn le(&self, value: impl Into<Value>) -> FilterExpression {
        self.single(Operator::LessOrEqual, value)
    }

    /// `self == value`
    pub fn equal(&self, value: impl Into<Value>) -> FilterExpression {
        self.single(Operator::Equal, value)
    }

    /// `self != value`
    pub fn not_equal(&self, value: impl Into<Value>) -> FilterExpression {
        self.single(Operator::NotEqual, value)
    }

    /// `low <= self <= high`
    pub fn between(&self, low: impl Into<Value>, high: impl Into<Value>) -> FilterExpression {
        self.pair(Operator::InRange, low, high)
    }

    pub fn not_between(&self, low: impl Into<Value>, high: impl Into<Value>) -> FilterExpression {
        self.pair(Operator::NotInRange, low, high)
    }

    /// Membership in a set of values.
    pub fn isin<I, V>(&self, values: I) -> FilterExpression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.list(Operator::InRange, values)
    }

    pub fn not_in<I, V>(&self, values: I) -> FilterExpression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.list(Operator::NotInRange, values)
    }

    /// For set-valued fields: matches when any of `values` is present.
    pub fn has<I, V>(&self, values: I) -> FilterExpression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.list(Operator::Has, values)
    }

    pub fn has_none_of<I, V>(&self, values: I) -> FilterExpression
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.list(Operator::HasNoneOf, values)
    }

    /// Case-insensitive substring/pattern match.
    pub fn like(&self, pattern: impl Into<Value>) -> FilterExpression {
        self.single(Operator::Match, pattern)
    }

    pub fn not_like(&self, pattern: impl Into<Value>) -> FilterExpression {
        self.single(Operator::NotMatch, pattern)
    }

    pub fn empty(&self) -> FilterExpression {
        self.leaf(Operator::Empty, Operand::None)
    }

    pub fn not_empty(&self) -> FilterExpression {
        self.leaf(Operator::NotEmpty, Operand::None)
    }

    pub fn crosses(&self, value: impl Into<Value>) -> FilterExpression {
        self.single(Operator::Crosses, value)
    }

    pub fn crosses_above(&self, value: impl Into<Value>) -> FilterExpression {
        self.single(Operator::CrossesAbove, value)
    }

    pub fn crosses_below(&self, value: impl Into<Value>) -> FilterExpression {
        self.single(Operator::CrossesBelow, value)
    }

    /// `self > field * ratio`
    ///
    /// ```ignore
    /// col("close").above_pct("VWAP", 1.03) // close is more than 3% above VWAP
    /// ```
    pub fn above_pct(&self, field: impl AsRef<str>, ratio: f64) -> FilterExpression {
        self.relative(Operator::AbovePercent, field.as_ref(), vec![ratio])
    }

    /// `self < field * ratio`
    pub fn below_pct(&self, field: impl AsRef<str>, ratio: f64) -> FilterExpression {
        self.relative(Operator::BelowPercent, field.as_ref(), vec![ratio])
    }

    /// `field * low <= self <= field * high`
    pub fn between_pct(&self, field: impl AsRef<str>, low: f64, high: f64) -> FilterExpression {
        self.relative(Operator::InRangePercent, field.as_ref(), vec![low, high])
    }

    pub fn not_between_pct(
        &self,
        field: impl AsRef<str>,
        low: f64,
        high: f64,
    ) -> FilterExpression {
        self.relative(Operator::NotInRangePercent, field.as_ref(), vec![low, high])
    }

    /// Date field within `[low, high]` days of today.
    pub fn in_day_range(&self, low: impl Into<Value>, high: impl Into<Value>) -> FilterExpression {
        self.pair(Operator::InDayRange, low, high)
    }

    pub fn in_week_range(&self, low: impl Into<Value>, high: impl Into<Value>) -> FilterExpression {
        self.pair(Operator::InWeekRange, low, high)
    }

    pub fn in_month_range(
        &self,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> FilterExpression {
        self.pair(Operator::InMonthRange, low, high)
    }
}

impl AsRef<str> for Field {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl From<Field> for String {
    fn from(field: Field) -> Self {
        field.name
    }
}

impl From<&Field> for String {
    fn from(field: &Field) -> Self {
        field.name.clone()
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

// ============================================================================
// Logical Composition
// ============================================================================

/// Boolean connector of a composite expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connector {
    And,
    Or,
}

/// One operand of a composite: a leaf or a nested composite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FilterNode {
    #[serde(rename = "expression")]
    Leaf(FilterExpression),
    #[serde(rename = "operation")]
    Composite(LogicalExpression),
}

impl From<FilterExpression> for FilterNode {
    fn from(expr: FilterExpression) -> Self {
        Self::Leaf(expr)
    }
}

impl From<LogicalExpression> for FilterNode {
    fn from(expr: LogicalExpression) -> Self {
        Self::Composite(expr)
    }
}

/// AND/OR over a non-empty list of nodes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicalExpression {
    #[serde(rename = "operator")]
    connector: Connector,
    operands: Vec<FilterNode>,
}

impl LogicalExpression {
    /// Combine `nodes` under `connector`. Fails on an empty list.
    pub fn new<I, N>(connector: Connector, nodes: I) -> Result<Self>
    where
        I: IntoIterator<Item = N>,
        N: Into<FilterNode>,
    {
        let operands: Vec<FilterNode> = nodes.into_iter().map(Into::into).collect();
        if operands.is_empty() {
            return Err(ScanError::EmptyLogicalExpression);
        }
        Ok(Self {
            connector,
            operands,
        })
    }

    pub fn connector(&self) -> Connector {
        self.connector
    }

    pub fn operands(&self) -> &[FilterNode] {
        &self.operands
    }

    /// Maximum nesting depth; a composite of leaves has depth 1.
    pub fn depth(&self) -> usize {
        1 + self
            .operands
            .iter()
            .map(|node| match node {
                FilterNode::Leaf(_) => 0,
                FilterNode::Composite(inner) => inner.depth(),
            })
            .max()
            .unwrap_or(0)
    }
}

/// All of `nodes` must match.
pub fn and<I, N>(nodes: I) -> Result<LogicalExpression>
where
    I: IntoIterator<Item = N>,
    N: Into<FilterNode>,
{
    LogicalExpression::new(Connector::And, nodes)
}

/// Any of `nodes` must match.
pub fn or<I, N>(nodes: I) -> Result<LogicalExpression>
where
    I: IntoIterator<Item = N>,
    N: Into<FilterNode>,
{
    LogicalExpression::new(Connector::Or, nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
        serde_json::to_value(value).unwrap()
    }

    #[test]
    fn test_scalar_comparisons() {
        let close = col("close");
        assert_eq!(
            to_json(&close.gt(10)),
            json!({"left": "close", "operation": "greater", "right": 10})
        );
        assert_eq!(
            to_json(&close.le(2.5)),
            json!({"left": "close", "operation": "eless", "right": 2.5})
        );
        assert_eq!(
            to_json(&col("type").equal("stock")),
            json!({"left": "type", "operation": "equal", "right": "stock"})
        );
        assert_eq!(
            to_json(&col("is_primary").not_equal(false)),
            json!({"left": "is_primary", "operation": "nequal", "right": false})
        );
    }

    #[test]
    fn test_field_to_field_comparison_resolves_name() {
        let vwap = col("VWAP");
        let expr = col("close").gt(&vwap);
        assert_eq!(expr.operand(), &Operand::Single(Value::Field("VWAP".into())));
        assert_eq!(
            to_json(&expr),
            json!({"left": "close", "operation": "greater", "right": "VWAP"})
        );

        let crossing = col("EMA5").crosses_above(col("EMA20"));
        assert_eq!(to_json(&crossing)["right"], json!("EMA20"));
        assert_eq!(crossing.operator(), Operator::CrossesAbove);
    }

    #[test]
    fn test_range_and_set_operators() {
        assert_eq!(
            to_json(&col("RSI").between(30, 70)),
            json!({"left": "RSI", "operation": "in_range", "right": [30, 70]})
        );
        assert_eq!(
            to_json(&col("close").not_between(col("low"), col("high"))),
            json!({"left": "close", "operation": "not_in_range", "right": ["low", "high"]})
        );
        assert_eq!(
            to_json(&col("exchange").isin(["NASDAQ", "NYSE"])),
            json!({"left": "exchange", "operation": "in_range", "right": ["NASDAQ", "NYSE"]})
        );
        assert_eq!(
            to_json(&col("exchange").not_in(["OTC"])),
            json!({"left": "exchange", "operation": "not_in_range", "right": ["OTC"]})
        );
        assert_eq!(
            to_json(&col("typespecs").has(Some("common"))),
            json!({"left": "typespecs", "operation": "has", "right": ["common"]})
        );
        assert_eq!(
            to_json(&col("typespecs").has_none_of(["preferred", "etf"]))["operation"],
            json!("has_none_of")
        );
    }

    #[test]
    fn test_pattern_and_null_checks() {
        assert_eq!(
            to_json(&col("description").like("apple")),
            json!({"left": "description", "operation": "match", "right": "apple"})
        );
        assert_eq!(
            to_json(&col("description").not_like("bank"))["operation"],
            json!("nmatch")
        );
        assert_eq!(
            to_json(&col("dividend_yield").empty()),
            json!({"left": "dividend_yield", "operation": "empty"})
        );
        assert_eq!(col("sector").not_empty().operator(), Operator::NotEmpty);
        assert!(col("sector").not_empty().operand().is_none());
    }

    #[test]
    fn test_percentage_relative_operators() {
        assert_eq!(
            to_json(&col("close").above_pct("VWAP", 1.03)),
            json!({"left": "close", "operation": "above%", "right": ["VWAP", 1.03]})
        );
        assert_eq!(
            to_json(&col("close").below_pct(&col("SMA50"), 0.9))["right"],
            json!(["SMA50", 0.9])
        );
        assert_eq!(
            to_json(&col("close").between_pct("EMA200", 1.2, 1.5)),
            json!({"left": "close", "operation": "in_range%", "right": ["EMA200", 1.2, 1.5]})
        );
        assert_eq!(
            to_json(&col("close").not_between_pct("EMA200", 0.8, 1.2))["operation"],
            json!("not_in_range%")
        );
    }

    #[test]
    fn test_temporal_ranges() {
        assert_eq!(
            to_json(&col("earnings_release_date").in_day_range(0, 0)),
            json!({"left": "earnings_release_date", "operation": "in_day_range", "right": [0, 0]})
        );
        assert_eq!(
            to_json(&col("earnings_release_date").in_week_range(0, 2))["operation"],
            json!("in_week_range")
        );
        assert_eq!(
            to_json(&col("earnings_release_date").in_month_range(-1, 1))["right"],
            json!([-1, 1])
        );
    }

    #[test]
    fn test_operator_wire_names_are_unique() {
        let all = [
            Operator::Greater,
            Operator::GreaterOrEqual,
            Operator::Less,
            Operator::LessOrEqual,
            Operator::Equal,
            Operator::NotEqual,
            Operator::InRange,
            Operator::NotInRange,
            Operator::Match,
            Operator::NotMatch,
            Operator::Has,
            Operator::HasNoneOf,
            Operator::Empty,
            Operator::NotEmpty,
            Operator::Crosses,
            Operator::CrossesAbove,
            Operator::CrossesBelow,
            Operator::AbovePercent,
            Operator::BelowPercent,
            Operator::InRangePercent,
            Operator::NotInRangePercent,
            Operator::InDayRange,
            Operator::InWeekRange,
            Operator::InMonthRange,
        ];
        let names: std::collections::HashSet<&str> = all.iter().map(Operator::as_str).collect();
        assert_eq!(names.len(), all.len());
        assert_eq!(Operator::AbovePercent.to_string(), "above%");
    }

    #[test]
    fn test_and_wraps_leaves() {
        let expr = and([col("close").gt(10), col("volume").ge(1_000_000)]).unwrap();
        assert_eq!(expr.connector(), Connector::And);
        assert_eq!(expr.depth(), 1);
        assert_eq!(
            to_json(&expr),
            json!({
                "operator": "and",
                "operands": [
                    {"expression": {"left": "close", "operation": "greater", "right": 10}},
                    {"expression": {"left": "volume", "operation": "egreater", "right": 1_000_000}}
                ]
            })
        );
    }

    #[test]
    fn test_nested_or_of_and() {
        let a = col("close").gt(10);
        let b = col("volume").gt(100);
        let c = col("type").equal("fund");

        let inner = and([a.clone(), b.clone()]).unwrap();
        let outer = or([FilterNode::from(inner), c.clone().into()]).unwrap();

        assert_eq!(outer.depth(), 2);
        assert_eq!(
            to_json(&outer),
            json!({
                "operator": "or",
                "operands": [
                    {"operation": {
                        "operator": "and",
                        "operands": [{"expression": to_json(&a)}, {"expression": to_json(&b)}]
                    }},
                    {"expression": to_json(&c)}
                ]
            })
        );
    }

    #[test]
    fn test_empty_combination_rejected() {
        let err = and(Vec::<FilterExpression>::new()).unwrap_err();
        assert!(matches!(err, ScanError::EmptyLogicalExpression));
        assert!(or(Vec::<FilterNode>::new()).is_err());
    }

    #[test]
    fn test_single_operand_combination_allowed() {
        let expr = or([col("close").gt(1)]).unwrap();
        assert_eq!(expr.operands().len(), 1);
    }
}
