//! Expression compiler: infix text to a dependency-ordered operation list.
//!
//! Shunting-yard over two working stacks. Every reduction emits one
//! [`Operation`] with the next dense id and pushes a reference to it back on
//! the value stack, so the emitted list is a topological order of the DAG by
//! construction.

mod token;

use crate::error::ParseError;
use crate::model::{OpId, Operand, Operation, Operator};
use token::{tokenize, Token};

/// Operator-stack entry; `(` acts as a sentinel below every precedence.
#[derive(Debug, Clone, Copy, PartialEq)]
enum StackOp {
    Op(Operator),
    LParen,
}

#[derive(Default)]
struct Builder {
    values: Vec<Operand>,
    operators: Vec<StackOp>,
    ops: Vec<Operation>,
}

impl Builder {
    /// Pop the top operator and the two top values, emit the next operation,
    /// and push a reference to it.
    fn reduce(&mut self) -> Result<(), ParseError> {
        let operator = match self.operators.pop() {
            Some(StackOp::Op(op)) => op,
            _ => return Err(ParseError::InsufficientOperands),
        };
        if self.values.len() < 2 {
            return Err(ParseError::InsufficientOperands);
        }
        let rhs = self.values.pop().unwrap_or(Operand::Literal(0.0));
        let lhs = self.values.pop().unwrap_or(Operand::Literal(0.0));
        let id = OpId(self.ops.len() as i64 + 1);
        self.ops.push(Operation::new(id, operator, lhs, rhs));
        self.values.push(Operand::Ref(id));
        Ok(())
    }
}

/// Compile an infix expression into its operation DAG.
///
/// A bare numeric literal compiles to one synthetic `literal + 0` operation
/// so that every expression has at least one operation to drive completion.
pub fn compile(input: &str) -> Result<Vec<Operation>, ParseError> {
    let tokens = tokenize(input)?;
    let mut builder = Builder::default();

    for tok in tokens {
        match tok {
            Token::Number(n) => builder.values.push(Operand::Literal(n)),
            Token::LParen => builder.operators.push(StackOp::LParen),
            Token::RParen => loop {
                match builder.operators.last().copied() {
                    Some(StackOp::Op(_)) => builder.reduce()?,
                    Some(StackOp::LParen) => {
                        builder.operators.pop();
                        break;
                    }
                    None => return Err(ParseError::MismatchedParenthesis),
                }
            },
            Token::Op(op) => {
                while matches!(
                    builder.operators.last(),
                    Some(StackOp::Op(top)) if top.precedence() >= op.precedence()
                ) {
                    builder.reduce()?;
                }
                builder.operators.push(StackOp::Op(op));
            }
        }
    }

    while let Some(top) = builder.operators.last().copied() {
        match top {
            StackOp::Op(_) => builder.reduce()?,
            StackOp::LParen => return Err(ParseError::MismatchedParenthesis),
        }
    }

    if builder.values.len() != 1 {
        return Err(ParseError::MalformedExpression);
    }

    if builder.ops.is_empty() {
        match builder.values[0] {
            Operand::Literal(n) => builder.ops.push(Operation::new(
                OpId(1),
                Operator::Add,
                Operand::Literal(n),
                Operand::Literal(0.0),
            )),
            // A lone reference without any emitted operation cannot occur.
            Operand::Ref(_) => return Err(ParseError::MalformedExpression),
        }
    }

    Ok(builder.ops)
}
