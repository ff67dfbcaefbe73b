//! Error types for the abacus engine.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Expression compilation failures.
///
/// These are recovered at the submission boundary: the expression is still
/// persisted, with the error kind as its status, and the submitter sees a 422.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// Input contained a character that is neither a literal, an operator
    /// nor a parenthesis.
    #[error("unknown operator")]
    UnknownOperator,

    /// A `)` with no matching `(`, or an unclosed `(` at end of input.
    #[error("mismatched parenthesis")]
    MismatchedParenthesis,

    /// An operator reduction found fewer than two values on the stack.
    #[error("insufficient operands")]
    InsufficientOperands,

    /// The input did not reduce to exactly one value.
    #[error("malformed expression")]
    MalformedExpression,
}

/// Errors raised by the store, the scheduler and the session layer.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Underlying sled failure.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// A stored record failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("user {0} not found")]
    UserNotFound(i64),

    #[error("expression {expr} not found for user {user}")]
    ExpressionNotFound { user: i64, expr: i64 },

    #[error("operation {op} not found in expression {expr} of user {user}")]
    OperationNotFound { user: i64, expr: i64, op: i64 },

    #[error("login {0} is already taken")]
    LoginTaken(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("password hashing error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}
