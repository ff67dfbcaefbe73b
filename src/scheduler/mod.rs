//! Task store front-end and scheduler.
//!
//! Sole mutator of expression and operation state. Dispatch selection, dense
//! id allocation and report transitions all serialise through one transaction
//! lock, which is what makes dispatch at-most-once under concurrent fetches.

use crate::compiler;
use crate::config::OperatorLatencies;
use crate::error::{EngineError, EngineResult, ParseError};
use crate::model::{ExprId, Expression, ExprStatus, OpId, Operand, Operation, Task, UserId};
use crate::store::TaskStore;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of a submission: the persisted expression id, plus the parse
/// error when compilation failed (the expression is persisted either way).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submission {
    pub expr_id: ExprId,
    pub rejected: Option<ParseError>,
}

/// Schedules persisted operation DAGs onto pull-based workers.
pub struct Scheduler {
    store: Arc<TaskStore>,
    latencies: OperatorLatencies,
    /// Serialises every state transition; see module docs.
    txn: Mutex<()>,
}

impl Scheduler {
    pub fn new(store: Arc<TaskStore>, latencies: OperatorLatencies) -> Self {
        Self {
            store,
            latencies,
            txn: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Compile and persist a submission.
    ///
    /// On parse failure the expression is persisted anyway, with the error
    /// kind as its status and no operations.
    pub async fn submit(&self, user: UserId, text: &str) -> EngineResult<Submission> {
        let _guard = self.txn.lock().await;
        match compiler::compile(text) {
            Ok(ops) => {
                let expr_id =
                    self.store
                        .insert_expression(user, ExprStatus::UnderConsideration, &ops)?;
                info!(user = %user, expr = %expr_id, ops = ops.len(), "expression accepted");
                Ok(Submission {
                    expr_id,
                    rejected: None,
                })
            }
            Err(err) => {
                let expr_id =
                    self.store
                        .insert_expression(user, ExprStatus::Rejected(err), &[])?;
                warn!(user = %user, expr = %expr_id, error = %err, "expression rejected");
                Ok(Submission {
                    expr_id,
                    rejected: Some(err),
                })
            }
        }
    }

    /// Select the next ready operation for one user and mark it dispatched.
    pub async fn next_ready(&self, user: UserId) -> EngineResult<Option<Task>> {
        let _guard = self.txn.lock().await;
        self.next_ready_locked(user)
    }

    /// Select the next ready operation across all users, scanning user
    /// partitions in ascending id order.
    pub async fn next_ready_any(&self) -> EngineResult<Option<Task>> {
        let _guard = self.txn.lock().await;
        for user in self.store.user_ids()? {
            if let Some(task) = self.next_ready_locked(user)? {
                return Ok(Some(task));
            }
        }
        Ok(None)
    }

    fn next_ready_locked(&self, user: UserId) -> EngineResult<Option<Task>> {
        for expr in self.store.expressions(user)? {
            if expr.status != ExprStatus::UnderConsideration {
                continue;
            }
            let ops = self.store.operations(user, expr.id)?;
            for op in &ops {
                if op.dispatched || op.completed {
                    continue;
                }
                let (Some(arg1), Some(arg2)) = (resolve(op.lhs, &ops), resolve(op.rhs, &ops))
                else {
                    continue;
                };
                self.store.mark_dispatched(user, expr.id, op.id)?;
                debug!(user = %user, expr = %expr.id, op = %op.id, "operation dispatched");
                return Ok(Some(Task {
                    user_id: user,
                    expr_id: expr.id,
                    op_id: op.id,
                    operator: op.operator,
                    arg1,
                    arg2,
                    latency_ms: self.latencies.for_operator(op.operator),
                }));
            }
        }
        Ok(None)
    }

    /// Record a worker report.
    ///
    /// An error flag marks the whole expression *division by zero* and
    /// abandons its remaining operations. Reports for operations that are
    /// already completed, or whose expression is already terminal, are
    /// no-ops, so replays cannot flip state backwards.
    pub async fn report(
        &self,
        user: UserId,
        expr: ExprId,
        op: OpId,
        value: f64,
        error: bool,
    ) -> EngineResult<()> {
        let _guard = self.txn.lock().await;

        let expression =
            self.store
                .expression(user, expr)?
                .ok_or(EngineError::ExpressionNotFound {
                    user: user.0,
                    expr: expr.0,
                })?;
        let operation =
            self.store
                .operation(user, expr, op)?
                .ok_or(EngineError::OperationNotFound {
                    user: user.0,
                    expr: expr.0,
                    op: op.0,
                })?;

        if expression.status.is_terminal() || operation.completed {
            debug!(user = %user, expr = %expr, op = %op, "stale report ignored");
            return Ok(());
        }

        if error {
            self.store
                .set_expression_outcome(user, expr, ExprStatus::DivisionByZero, 0.0)?;
            warn!(user = %user, expr = %expr, op = %op, "division by zero, expression abandoned");
            return Ok(());
        }

        self.store.record_result(user, expr, op, value)?;
        info!(user = %user, expr = %expr, op = %op, "operation completed");

        let ops = self.store.operations(user, expr)?;
        if ops.iter().all(|o| o.completed) {
            // The root is the last-emitted operation.
            let final_value = ops.last().map(|o| o.result).unwrap_or(0.0);
            self.store
                .set_expression_outcome(user, expr, ExprStatus::Completed, final_value)?;
            info!(user = %user, expr = %expr, result = final_value, "expression completed");
        }
        Ok(())
    }

    /// All expressions of a user.
    pub async fn list(&self, user: UserId) -> EngineResult<Vec<Expression>> {
        self.store.expressions(user)
    }

    /// One expression.
    pub async fn get(&self, user: UserId, expr: ExprId) -> EngineResult<Expression> {
        self.store
            .expression(user, expr)?
            .ok_or(EngineError::ExpressionNotFound {
                user: user.0,
                expr: expr.0,
            })
    }
}

/// A slot is resolved when it is a literal or references a completed
/// operation; the resolved value goes out in the dispatched task while the
/// stored operation keeps its placeholder.
fn resolve(operand: Operand, ops: &[Operation]) -> Option<f64> {
    match operand {
        Operand::Literal(v) => Some(v),
        Operand::Ref(id) => ops
            .get((id.0 - 1) as usize)
            .filter(|dep| dep.completed)
            .map(|dep| dep.result),
    }
}
