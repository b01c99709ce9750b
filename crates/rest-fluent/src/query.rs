//! Composable filter expressions.
//!
//! A [`Query`] is an ordered conjunction of clauses. Each clause is either a
//! raw fragment passed through verbatim or a `(field, operator, value)`
//! triple rendered as `op(field,value)`. Combining two queries never mutates
//! either operand.
//!
//! ```
//! use rest_fluent::Query;
//!
//! let q = Query::eq("status", "active").and(&Query::expr("gt(price,10)"));
//! assert_eq!(q.to_string(), "eq(status,active)&gt(price,10)");
//! ```

use std::fmt;
use std::ops::BitAnd;
use std::str::FromStr;

use url::form_urlencoded;

use crate::error::{Error, Result};

/// Token joining the clauses of a conjunction.
pub const AND_SEPARATOR: &str = "&";

/// Comparison operators understood by the query engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Out,
    Like,
    Ilike,
}

impl Operator {
    /// Every supported operator.
    pub const ALL: [Operator; 10] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Lt,
        Operator::Le,
        Operator::Gt,
        Operator::Ge,
        Operator::In,
        Operator::Out,
        Operator::Like,
        Operator::Ilike,
    ];

    /// Name used in the serialized expression.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Lt => "lt",
            Operator::Le => "le",
            Operator::Gt => "gt",
            Operator::Ge => "ge",
            Operator::In => "in",
            Operator::Out => "out",
            Operator::Like => "like",
            Operator::Ilike => "ilike",
        }
    }

    /// Whether the operator takes a list of values.
    pub fn is_list(&self) -> bool {
        matches!(self, Operator::In | Operator::Out)
    }
}

impl FromStr for Operator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Operator::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| Error::UnsupportedOperator(s.to_string()))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Clause {
    Raw(String),
    Field {
        field: String,
        op: Operator,
        values: Vec<String>,
    },
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Raw(text) => f.write_str(text),
            Clause::Field { field, op, values } => {
                let escaped: Vec<String> = values.iter().map(|v| escape(v)).collect();
                if op.is_list() {
                    write!(f, "{}({},({}))", op, field, escaped.join(","))
                } else {
                    write!(f, "{}({},{})", op, field, escaped.join(","))
                }
            }
        }
    }
}

fn escape(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// An immutable conjunction of filter clauses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    clauses: Vec<Clause>,
}

impl Query {
    /// An empty query (no filter applied).
    pub fn new() -> Self {
        Self::default()
    }

    /// A query made of a raw expression fragment. Blank text yields an
    /// empty query.
    pub fn expr(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.trim().is_empty() {
            return Self::new();
        }
        Self {
            clauses: vec![Clause::Raw(text)],
        }
    }

    /// A `(field, operator, value)` clause with the operator given by name.
    ///
    /// Fails with [`Error::UnsupportedOperator`] for unknown operator names.
    pub fn field(field: impl Into<String>, operator: &str, value: impl ToString) -> Result<Self> {
        let op: Operator = operator.parse()?;
        Ok(Self::with_operator(field, op, value))
    }

    /// A `(field, operator, value)` clause.
    pub fn with_operator(field: impl Into<String>, op: Operator, value: impl ToString) -> Self {
        Self::clause(field.into(), op, vec![value.to_string()])
    }

    /// Builds a clause from a double-underscore lookup key such as
    /// `product__id__in`: leading segments form the dotted field path and a
    /// trailing operator segment selects the operator (`eq` when absent).
    /// List operators split `value` on commas.
    pub fn lookup(key: &str, value: impl ToString) -> Result<Self> {
        let mut segments: Vec<&str> = key.split("__").collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::InvalidValue(format!("invalid lookup `{}`", key)));
        }
        let op = match segments.last().map(|s| s.parse::<Operator>()) {
            Some(Ok(op)) if segments.len() > 1 => {
                segments.pop();
                op
            }
            _ => Operator::Eq,
        };
        let value = value.to_string();
        let values = if op.is_list() {
            value.split(',').map(str::to_string).collect()
        } else {
            vec![value]
        };
        Ok(Self::clause(segments.join("."), op, values))
    }

    pub fn eq(field: impl Into<String>, value: impl ToString) -> Self {
        Self::with_operator(field, Operator::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl ToString) -> Self {
        Self::with_operator(field, Operator::Ne, value)
    }

    pub fn lt(field: impl Into<String>, value: impl ToString) -> Self {
        Self::with_operator(field, Operator::Lt, value)
    }

    pub fn le(field: impl Into<String>, value: impl ToString) -> Self {
        Self::with_operator(field, Operator::Le, value)
    }

    pub fn gt(field: impl Into<String>, value: impl ToString) -> Self {
        Self::with_operator(field, Operator::Gt, value)
    }

    pub fn ge(field: impl Into<String>, value: impl ToString) -> Self {
        Self::with_operator(field, Operator::Ge, value)
    }

    pub fn like(field: impl Into<String>, pattern: impl ToString) -> Self {
        Self::with_operator(field, Operator::Like, pattern)
    }

    pub fn ilike(field: impl Into<String>, pattern: impl ToString) -> Self {
        Self::with_operator(field, Operator::Ilike, pattern)
    }

    /// Field value is one of `values`.
    pub fn any_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Self::clause(
            field.into(),
            Operator::In,
            values.into_iter().map(|v| v.to_string()).collect(),
        )
    }

    /// Field value is none of `values`.
    pub fn none_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Self::clause(
            field.into(),
            Operator::Out,
            values.into_iter().map(|v| v.to_string()).collect(),
        )
    }

    fn clause(field: String, op: Operator, values: Vec<String>) -> Self {
        Self {
            clauses: vec![Clause::Field { field, op, values }],
        }
    }

    /// The conjunction of `self` and `other`.
    pub fn and(&self, other: &Query) -> Query {
        let mut clauses = Vec::with_capacity(self.clauses.len() + other.clauses.len());
        clauses.extend(self.clauses.iter().cloned());
        clauses.extend(other.clauses.iter().cloned());
        Query { clauses }
    }

    /// True when no clause was added.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Number of clauses in the conjunction.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(AND_SEPARATOR)?;
            }
            write!(f, "{}", clause)?;
        }
        Ok(())
    }
}

impl BitAnd for Query {
    type Output = Query;

    fn bitand(mut self, rhs: Query) -> Query {
        self.clauses.extend(rhs.clauses);
        self
    }
}

impl From<&str> for Query {
    fn from(text: &str) -> Self {
        Query::expr(text)
    }
}

impl From<String> for Query {
    fn from(text: String) -> Self {
        Query::expr(text)
    }
}

impl From<&Query> for Query {
    fn from(query: &Query) -> Self {
        query.clone()
    }
}
