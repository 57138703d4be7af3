//! Boolean predicates over fields already decoded from a packet.
//!
//! Criteria gate container inheritance (restriction criteria), context calibrator
//! selection, conditional entries, and discrete lookups.
use std::cmp::Ordering;
use std::fmt::Display;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::record::Record;
use crate::value::Value;
use crate::{Error, Result};

/// Relational operator.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl Operator {
    fn test(self, ord: Ordering) -> bool {
        match self {
            Operator::Eq => ord == Ordering::Equal,
            Operator::Ne => ord != Ordering::Equal,
            Operator::Lt => ord == Ordering::Less,
            Operator::Gt => ord == Ordering::Greater,
            Operator::Le => ord != Ordering::Greater,
            Operator::Ge => ord != Ordering::Less,
        }
    }

    /// Apply the operator to `left` and `right`.
    ///
    /// # Errors
    /// [Error::Comparison] if the values cannot be ordered.
    pub fn apply(self, left: &Value, right: &Value) -> Result<bool> {
        Ok(self.test(left.compare(right)?))
    }
}

impl FromStr for Operator {
    type Err = Error;

    /// Accepts symbolic (`==`, `<=`, ...), XML escaped (`&lt;`, ...), and mnemonic
    /// (`eq`, `leq`, ...) spellings.
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.trim() {
            "==" | "eq" => Operator::Eq,
            "!=" | "neq" => Operator::Ne,
            "<" | "&lt;" | "lt" => Operator::Lt,
            ">" | "&gt;" | "gt" => Operator::Gt,
            "<=" | "&lt;=" | "leq" => Operator::Le,
            ">=" | "&gt;=" | "geq" => Operator::Ge,
            other => {
                return Err(Error::InvalidSchema(format!(
                    "unrecognized comparison operator {other:?}"
                )))
            }
        })
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Ge => ">=",
        };
        write!(f, "{s}")
    }
}

fn default_true() -> bool {
    true
}

/// Compares a parameter with a literal value.
///
/// The literal is kept as text and coerced to the runtime type of the parameter value at
/// evaluation time.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Comparison {
    pub parameter: String,
    pub value: String,
    pub operator: Operator,
    #[serde(default = "default_true")]
    pub use_calibrated: bool,
}

impl Comparison {
    pub fn new(parameter: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        Comparison {
            parameter: parameter.into(),
            value: value.into(),
            operator,
            use_calibrated: true,
        }
    }

    /// Compare against the raw value rather than the calibrated value.
    #[must_use]
    pub fn raw(mut self) -> Self {
        self.use_calibrated = false;
        self
    }

    /// Evaluate against `record`. If the referenced parameter has not been decoded,
    /// `candidate` is used instead; this is how a calibrator refers to the raw value it is
    /// deciding whether to calibrate.
    ///
    /// # Errors
    /// [Error::UnresolvedReference] if the parameter is absent and there is no candidate,
    /// [Error::Comparison] if the literal cannot be coerced or compared.
    pub fn evaluate(&self, record: &Record, candidate: Option<&Value>) -> Result<bool> {
        let actual = match record.get(&self.parameter) {
            Some(field) => field.value(self.use_calibrated),
            None => match candidate {
                Some(value) => {
                    if self.use_calibrated {
                        warn!(
                            comparison = %self,
                            "comparison against the value being decoded requests a calibrated value; using the raw value"
                        );
                    }
                    value
                }
                None => return Err(Error::UnresolvedReference(self.parameter.clone())),
            },
        };
        let required = actual.coerce_literal(&self.value)?;
        self.operator.apply(actual, &required)
    }
}

impl Display for Comparison {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.parameter, self.operator, self.value)
    }
}

/// Right hand side of a [Condition].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Operand {
    Parameter { name: String, use_calibrated: bool },
    Literal(String),
}

/// Compares a parameter with another parameter or a literal.
///
/// Unlike [Comparison], both sides must already be present in the record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Condition {
    pub left: String,
    #[serde(default = "default_true")]
    pub left_use_calibrated: bool,
    pub operator: Operator,
    pub right: Operand,
}

impl Condition {
    pub fn new(left: impl Into<String>, operator: Operator, right: Operand) -> Self {
        Condition {
            left: left.into(),
            left_use_calibrated: true,
            operator,
            right,
        }
    }

    fn lookup<'r>(&self, record: &'r Record, name: &str, use_calibrated: bool) -> Result<&'r Value> {
        record
            .get(name)
            .map(|f| f.value(use_calibrated))
            .ok_or_else(|| {
                Error::Comparison(format!(
                    "condition {self} references {name}, which has not been decoded"
                ))
            })
    }

    /// # Errors
    /// [Error::Comparison] if either side is missing from `record` or the sides cannot be
    /// compared.
    pub fn evaluate(&self, record: &Record) -> Result<bool> {
        let left = self.lookup(record, &self.left, self.left_use_calibrated)?;
        let right = match &self.right {
            Operand::Parameter {
                name,
                use_calibrated,
            } => self.lookup(record, name, *use_calibrated)?.clone(),
            Operand::Literal(lit) => left.coerce_literal(lit)?,
        };
        self.operator.apply(left, &right)
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.right {
            Operand::Parameter { name, .. } => write!(f, "{}{}{}", self.left, self.operator, name),
            Operand::Literal(lit) => write!(f, "{}{}{}", self.left, self.operator, lit),
        }
    }
}

/// AND group of conditions and nested OR groups.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Anded {
    pub conditions: Vec<Condition>,
    pub ors: Vec<Ored>,
}

/// OR group of conditions and nested AND groups.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Ored {
    pub conditions: Vec<Condition>,
    pub ands: Vec<Anded>,
}

impl Anded {
    fn evaluate(&self, record: &Record) -> Result<bool> {
        for condition in &self.conditions {
            if !condition.evaluate(record)? {
                return Ok(false);
            }
        }
        for ored in &self.ors {
            if !ored.evaluate(record)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Ored {
    fn evaluate(&self, record: &Record) -> Result<bool> {
        for condition in &self.conditions {
            if condition.evaluate(record)? {
                return Ok(true);
            }
        }
        for anded in &self.ands {
            if anded.evaluate(record)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Tree of AND/OR groups over [Condition]s.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum BooleanExpression {
    Condition(Condition),
    And(Anded),
    Or(Ored),
}

impl BooleanExpression {
    /// Short-circuiting evaluation.
    ///
    /// # Errors
    /// See [Condition::evaluate].
    pub fn evaluate(&self, record: &Record) -> Result<bool> {
        match self {
            BooleanExpression::Condition(c) => c.evaluate(record),
            BooleanExpression::And(a) => a.evaluate(record),
            BooleanExpression::Or(o) => o.evaluate(record),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum MatchCriteria {
    Comparison(Comparison),
    Condition(Condition),
    BooleanExpression(BooleanExpression),
    /// Named custom algorithm. Never evaluated.
    CustomAlgorithm(String),
}

impl MatchCriteria {
    /// # Errors
    /// Any evaluation error of the underlying criteria, or [Error::Unsupported] for
    /// custom algorithms.
    pub fn evaluate(&self, record: &Record, candidate: Option<&Value>) -> Result<bool> {
        match self {
            MatchCriteria::Comparison(c) => c.evaluate(record, candidate),
            MatchCriteria::Condition(c) => c.evaluate(record),
            MatchCriteria::BooleanExpression(e) => e.evaluate(record),
            MatchCriteria::CustomAlgorithm(name) => Err(Error::Unsupported(format!(
                "custom algorithm match criteria {name}"
            ))),
        }
    }
}

impl From<Comparison> for MatchCriteria {
    fn from(c: Comparison) -> Self {
        MatchCriteria::Comparison(c)
    }
}

impl From<Condition> for MatchCriteria {
    fn from(c: Condition) -> Self {
        MatchCriteria::Condition(c)
    }
}

impl From<BooleanExpression> for MatchCriteria {
    fn from(e: BooleanExpression) -> Self {
        MatchCriteria::BooleanExpression(e)
    }
}

/// Evaluate a list of criteria with AND semantics, stopping at the first false.
///
/// An empty list is true.
///
/// # Errors
/// The first evaluation error encountered.
pub fn all_match(criteria: &[MatchCriteria], record: &Record, candidate: Option<&Value>) -> Result<bool> {
    for c in criteria {
        if !c.evaluate(record, candidate)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// A value that applies when all of its comparisons are true.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DiscreteLookup {
    pub comparisons: Vec<Comparison>,
    pub value: i64,
}

impl DiscreteLookup {
    /// Returns `Some(value)` if every comparison is true.
    ///
    /// # Errors
    /// See [Comparison::evaluate].
    pub fn evaluate(&self, record: &Record, candidate: Option<&Value>) -> Result<Option<i64>> {
        for c in &self.comparisons {
            if !c.evaluate(record, candidate)? {
                return Ok(None);
            }
        }
        Ok(Some(self.value))
    }
}

/// Evaluate lookups in order, returning the first value found.
///
/// # Errors
/// Any comparison error.
pub fn first_lookup(lookups: &[DiscreteLookup], record: &Record, candidate: Option<&Value>) -> Result<Option<i64>> {
    for lookup in lookups {
        if let Some(v) = lookup.evaluate(record, candidate)? {
            return Ok(Some(v));
        }
    }
    Ok(None)
}
