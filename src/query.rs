//! Typed builder for vault query strings.
//!
//! Queries are assembled from [`Field`]s and [`Literal`]s and rendered in one
//! place, so thresholds can be tested without string formatting and literal
//! values are always escaped.

use std::fmt;

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::platform::types::{CallError, CallResult};

/// A literal value on the right-hand side of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Date(NaiveDate),
    Bool(bool),
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Str(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::Str(s)
    }
}

impl From<NaiveDate> for Literal {
    fn from(d: NaiveDate) -> Self {
        Literal::Date(d)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => write!(f, "'{}'", escape(s)),
            Literal::Date(d) => write!(f, "'{}'", d.format("%Y-%m-%d")),
            Literal::Bool(b) => write!(f, "{b}"),
        }
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || c == '\'' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// A field reference, optionally wrapped in `toName()` for picklist/type fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Plain(String),
    ToName(String),
}

impl Field {
    pub fn name(&self) -> &str {
        match self {
            Field::Plain(n) | Field::ToName(n) => n,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Plain(n) => f.write_str(n),
            Field::ToName(n) => write!(f, "toName({n})"),
        }
    }
}

pub fn field(name: &str) -> Field {
    Field::Plain(name.to_string())
}

pub fn to_name(name: &str) -> Field {
    Field::ToName(name.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Field, Literal),
    Ne(Field, Literal),
    Le(Field, Literal),
    /// Inclusive on both ends.
    Between(Field, Literal, Literal),
    Contains(Field, Vec<Literal>),
    /// The field holds the steady lifecycle state of the record.
    SteadyState(Field),
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Eq(fl, v) => write!(f, "{fl} = {v}"),
            Predicate::Ne(fl, v) => write!(f, "{fl} != {v}"),
            Predicate::Le(fl, v) => write!(f, "{fl} <= {v}"),
            Predicate::Between(fl, lo, hi) => write!(f, "{fl} between {lo} and {hi}"),
            Predicate::Contains(fl, values) => {
                let list = values
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{fl} contains ({list})")
            }
            Predicate::SteadyState(fl) => write!(f, "{fl} = steadyState()"),
        }
    }
}

/// A `select ... from ... where ...` query. All filters are joined with `and`.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub fields: Vec<String>,
    pub target: String,
    pub filters: Vec<Predicate>,
}

impl Query {
    pub fn select(fields: &[&str]) -> QueryBuilder {
        QueryBuilder {
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }
}

pub struct QueryBuilder {
    fields: Vec<String>,
}

impl QueryBuilder {
    pub fn from(self, target: &str) -> Query {
        Query {
            fields: self.fields,
            target: target.to_string(),
            filters: Vec::new(),
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "select {} from {}", self.fields.join(", "), self.target)?;
        for (i, p) in self.filters.iter().enumerate() {
            let joiner = if i == 0 { "where" } else { "and" };
            write!(f, " {joiner} {p}")?;
        }
        Ok(())
    }
}

/// One result row. Values arrive as JSON; getters coerce to the expected type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row(pub Map<String, Value>);

impl Row {
    /// String value of a field. Numbers are accepted and rendered without a fraction.
    pub fn string(&self, name: &str) -> CallResult<String> {
        match self.0.get(name) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n
                .as_i64()
                .map(|i| i.to_string())
                .unwrap_or_else(|| n.to_string())),
            Some(other) => Err(CallError::invalid_input(format!(
                "Field {name} is not a string: {other}"
            ))),
            None => Err(CallError::invalid_input(format!("Missing field {name}"))),
        }
    }

    pub fn date(&self, name: &str) -> CallResult<NaiveDate> {
        let raw = self.string(name)?;
        NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|e| CallError::invalid_input(format!("Field {name} is not a date ({raw}): {e}")))
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Row(map)
    }
}

impl TryFrom<Value> for Row {
    type Error = CallError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Row(map)),
            other => Err(CallError::invalid_input(format!(
                "Query row is not an object: {other}"
            ))),
        }
    }
}
