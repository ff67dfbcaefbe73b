//! Core domain types: users, expressions and the operation DAG.

use crate::error::ParseError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Opaque user identifier. The engine consumes it only as a partition key
/// and performs no authentication of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Expression identifier, dense per user, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExprId(pub i64);

/// Operation identifier, dense per `(user, expression)`, starting at 1.
///
/// Because the compiler appends operations in construction order, `OpId` is a
/// topological ordering of the DAG: every dependency has a strictly smaller id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    /// The operator's wire symbol.
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
        }
    }

    /// Parse a wire symbol. Returns `None` for anything that is not one of
    /// the four operators; workers report such tasks with the error flag.
    pub fn from_symbol(s: &str) -> Option<Self> {
        match s {
            "+" => Some(Operator::Add),
            "-" => Some(Operator::Sub),
            "*" => Some(Operator::Mul),
            "/" => Some(Operator::Div),
            _ => None,
        }
    }

    /// Infix binding strength: `+ -` bind at 1, `* /` at 2.
    pub fn precedence(&self) -> u8 {
        match self {
            Operator::Add | Operator::Sub => 1,
            Operator::Mul | Operator::Div => 2,
        }
    }

    /// Apply the operator. `None` signals division by zero.
    pub fn apply(&self, lhs: f64, rhs: f64) -> Option<f64> {
        match self {
            Operator::Add => Some(lhs + rhs),
            Operator::Sub => Some(lhs - rhs),
            Operator::Mul => Some(lhs * rhs),
            Operator::Div => {
                if rhs == 0.0 {
                    None
                } else {
                    Some(lhs / rhs)
                }
            }
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl Serialize for Operator {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.symbol())
    }
}

impl<'de> Deserialize<'de> for Operator {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Operator::from_symbol(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown operator symbol {s:?}")))
    }
}

/// One input slot of an operation: either a literal supplied at compile time,
/// or a reference to an earlier operation in the same expression.
///
/// The `-1` sentinel of the at-rest encoding exists only at the store
/// boundary; see [`crate::store`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Literal(f64),
    Ref(OpId),
}

impl Operand {
    /// The operation this slot depends on, if any.
    pub fn dependency(&self) -> Option<OpId> {
        match self {
            Operand::Literal(_) => None,
            Operand::Ref(id) => Some(*id),
        }
    }
}

/// A single binary arithmetic node in an expression's DAG.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub id: OpId,
    pub operator: Operator,
    pub lhs: Operand,
    pub rhs: Operand,
    /// Meaningful only once `completed` is set.
    pub result: f64,
    /// True while a worker holds the operation.
    pub dispatched: bool,
    /// Once set, never cleared.
    pub completed: bool,
}

impl Operation {
    pub fn new(id: OpId, operator: Operator, lhs: Operand, rhs: Operand) -> Self {
        Self {
            id,
            operator,
            lhs,
            rhs,
            result: 0.0,
            dispatched: false,
            completed: false,
        }
    }
}

/// Expression lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprStatus {
    /// Operations remain to be executed.
    UnderConsideration,
    /// Every operation completed; the expression carries its final value.
    Completed,
    /// A worker reported a division by zero; remaining operations are
    /// abandoned.
    DivisionByZero,
    /// The submission failed to compile; the expression has no operations.
    Rejected(ParseError),
}

impl ExprStatus {
    /// Terminal statuses never transition again and their operations are
    /// never mutated.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ExprStatus::UnderConsideration)
    }
}

impl fmt::Display for ExprStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprStatus::UnderConsideration => f.write_str("under consideration"),
            ExprStatus::Completed => f.write_str("completed"),
            ExprStatus::DivisionByZero => f.write_str("division by zero"),
            ExprStatus::Rejected(e) => write!(f, "{e}"),
        }
    }
}

impl FromStr for ExprStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "under consideration" => Ok(ExprStatus::UnderConsideration),
            "completed" => Ok(ExprStatus::Completed),
            "division by zero" => Ok(ExprStatus::DivisionByZero),
            "unknown operator" => Ok(ExprStatus::Rejected(ParseError::UnknownOperator)),
            "mismatched parenthesis" => {
                Ok(ExprStatus::Rejected(ParseError::MismatchedParenthesis))
            }
            "insufficient operands" => Ok(ExprStatus::Rejected(ParseError::InsufficientOperands)),
            "malformed expression" => Ok(ExprStatus::Rejected(ParseError::MalformedExpression)),
            other => Err(format!("unknown expression status {other:?}")),
        }
    }
}

impl Serialize for ExprStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ExprStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An expression as seen by the submitter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    pub id: ExprId,
    pub status: ExprStatus,
    pub result: f64,
    pub created_at: DateTime<Utc>,
}

/// A ready operation prepared for execution: dependency results substituted
/// into the argument slots and the simulated latency attached.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub user_id: UserId,
    pub expr_id: ExprId,
    pub op_id: OpId,
    pub operator: Operator,
    pub arg1: f64,
    pub arg2: f64,
    pub latency_ms: u64,
}
