//! Durable task store backed by sled.
//!
//! Four trees: `users`, `logins` (login → user id), `expressions` keyed by
//! `(user, expr)` and `actions` keyed by `(user, expr, op)`. Keys are
//! big-endian-encoded integer tuples, so sled's lexicographic iteration is
//! exactly the ascending scan the scheduler's selection policy requires.
//! Values are serde_json documents.
//!
//! The store itself performs no locking beyond sled's; callers that need a
//! consistent read-modify-write (dispatch, dense id allocation) serialise
//! through the scheduler's transaction lock.

use crate::error::{EngineError, EngineResult};
use crate::model::{ExprId, Expression, ExprStatus, OpId, Operand, Operation, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Sentinel for an absent dependency slot in the at-rest encoding.
const NO_DEP: i64 = -1;

#[derive(Debug, Serialize, Deserialize)]
struct UserRecord {
    id: i64,
    login: String,
    password_hash: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExprRecord {
    status: ExprStatus,
    result: f64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ActionRecord {
    operator: crate::model::Operator,
    arg1: f64,
    arg2: f64,
    result: f64,
    depends: [i64; 2],
    completed: bool,
    dispatched: bool,
}

impl ActionRecord {
    fn from_operation(op: &Operation) -> Self {
        let (arg1, dep1) = encode_operand(op.lhs);
        let (arg2, dep2) = encode_operand(op.rhs);
        Self {
            operator: op.operator,
            arg1,
            arg2,
            result: op.result,
            depends: [dep1, dep2],
            completed: op.completed,
            dispatched: op.dispatched,
        }
    }

    fn into_operation(self, id: OpId) -> Operation {
        Operation {
            id,
            operator: self.operator,
            lhs: decode_operand(self.arg1, self.depends[0]),
            rhs: decode_operand(self.arg2, self.depends[1]),
            result: self.result,
            dispatched: self.dispatched,
            completed: self.completed,
        }
    }
}

fn encode_operand(operand: Operand) -> (f64, i64) {
    match operand {
        Operand::Literal(v) => (v, NO_DEP),
        Operand::Ref(id) => (0.0, id.0),
    }
}

fn decode_operand(arg: f64, dep: i64) -> Operand {
    if dep == NO_DEP {
        Operand::Literal(arg)
    } else {
        Operand::Ref(OpId(dep))
    }
}

fn user_key(user: UserId) -> [u8; 8] {
    user.0.to_be_bytes()
}

fn expr_key(user: UserId, expr: ExprId) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&user.0.to_be_bytes());
    key[8..].copy_from_slice(&expr.0.to_be_bytes());
    key
}

fn action_key(user: UserId, expr: ExprId, op: OpId) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..8].copy_from_slice(&user.0.to_be_bytes());
    key[8..16].copy_from_slice(&expr.0.to_be_bytes());
    key[16..].copy_from_slice(&op.0.to_be_bytes());
    key
}

fn trailing_id(key: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&key[key.len() - 8..]);
    i64::from_be_bytes(raw)
}

/// Durable owner of every user, expression and operation.
pub struct TaskStore {
    _db: sled::Db,
    users: sled::Tree,
    logins: sled::Tree,
    expressions: sled::Tree,
    actions: sled::Tree,
    /// Serialises user-id allocation and the login uniqueness check;
    /// expression and operation allocation is serialised by the scheduler.
    user_alloc: std::sync::Mutex<()>,
}

impl TaskStore {
    /// Open (creating if necessary) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> EngineResult<Self> {
        let db = sled::open(path)?;
        Ok(Self {
            users: db.open_tree("users")?,
            logins: db.open_tree("logins")?,
            expressions: db.open_tree("expressions")?,
            actions: db.open_tree("actions")?,
            _db: db,
            user_alloc: std::sync::Mutex::new(()),
        })
    }

    // ----- users -----

    /// Insert a new user with a dense id. Fails when the login is taken.
    pub fn create_user(&self, login: &str, password_hash: &str) -> EngineResult<UserId> {
        let _guard = self.user_alloc.lock().unwrap_or_else(|e| e.into_inner());
        if self.logins.contains_key(login.as_bytes())? {
            return Err(EngineError::LoginTaken(login.to_string()));
        }
        let next = self
            .users
            .last()?
            .map(|(key, _)| trailing_id(&key) + 1)
            .unwrap_or(1);
        let record = UserRecord {
            id: next,
            login: login.to_string(),
            password_hash: password_hash.to_string(),
        };
        self.users
            .insert(user_key(UserId(next)), serde_json::to_vec(&record)?)?;
        self.logins
            .insert(login.as_bytes(), &next.to_be_bytes())?;
        Ok(UserId(next))
    }

    /// Look up a user by login, returning `(id, password_hash)`.
    pub fn user_by_login(&self, login: &str) -> EngineResult<Option<(UserId, String)>> {
        let Some(raw) = self.logins.get(login.as_bytes())? else {
            return Ok(None);
        };
        let id = trailing_id(&raw);
        let Some(value) = self.users.get(user_key(UserId(id)))? else {
            return Ok(None);
        };
        let record: UserRecord = serde_json::from_slice(&value)?;
        Ok(Some((UserId(record.id), record.password_hash)))
    }

    /// All user ids in ascending order.
    pub fn user_ids(&self) -> EngineResult<Vec<UserId>> {
        let mut ids = Vec::new();
        for entry in self.users.iter() {
            let (key, _) = entry?;
            ids.push(UserId(trailing_id(&key)));
        }
        Ok(ids)
    }

    /// Remove a user together with every expression and action they own.
    pub fn delete_user(&self, user: UserId) -> EngineResult<()> {
        let Some(value) = self.users.get(user_key(user))? else {
            return Err(EngineError::UserNotFound(user.0));
        };
        let record: UserRecord = serde_json::from_slice(&value)?;

        let prefix = user_key(user);
        let mut expr_batch = sled::Batch::default();
        for entry in self.expressions.scan_prefix(prefix) {
            let (key, _) = entry?;
            expr_batch.remove(key);
        }
        let mut action_batch = sled::Batch::default();
        for entry in self.actions.scan_prefix(prefix) {
            let (key, _) = entry?;
            action_batch.remove(key);
        }
        self.expressions.apply_batch(expr_batch)?;
        self.actions.apply_batch(action_batch)?;
        self.logins.remove(record.login.as_bytes())?;
        self.users.remove(user_key(user))?;
        Ok(())
    }

    // ----- expressions -----

    /// Insert an expression and its operations, allocating the next dense
    /// per-user id. The operation list may be empty (rejected submissions).
    pub fn insert_expression(
        &self,
        user: UserId,
        status: ExprStatus,
        ops: &[Operation],
    ) -> EngineResult<ExprId> {
        let next = self
            .expressions
            .scan_prefix(user_key(user))
            .last()
            .transpose()?
            .map(|(key, _)| trailing_id(&key) + 1)
            .unwrap_or(1);
        let expr = ExprId(next);

        let record = ExprRecord {
            status,
            result: 0.0,
            created_at: Utc::now(),
        };
        self.expressions
            .insert(expr_key(user, expr), serde_json::to_vec(&record)?)?;

        let mut batch = sled::Batch::default();
        for op in ops {
            batch.insert(
                &action_key(user, expr, op.id),
                serde_json::to_vec(&ActionRecord::from_operation(op))?,
            );
        }
        self.actions.apply_batch(batch)?;
        Ok(expr)
    }

    /// All expressions of a user in ascending id order, without operations.
    pub fn expressions(&self, user: UserId) -> EngineResult<Vec<Expression>> {
        let mut result = Vec::new();
        for entry in self.expressions.scan_prefix(user_key(user)) {
            let (key, value) = entry?;
            let record: ExprRecord = serde_json::from_slice(&value)?;
            result.push(Expression {
                id: ExprId(trailing_id(&key)),
                status: record.status,
                result: record.result,
                created_at: record.created_at,
            });
        }
        Ok(result)
    }

    /// One expression, or `None`.
    pub fn expression(&self, user: UserId, expr: ExprId) -> EngineResult<Option<Expression>> {
        let Some(value) = self.expressions.get(expr_key(user, expr))? else {
            return Ok(None);
        };
        let record: ExprRecord = serde_json::from_slice(&value)?;
        Ok(Some(Expression {
            id: expr,
            status: record.status,
            result: record.result,
            created_at: record.created_at,
        }))
    }

    /// Overwrite an expression's status and result, preserving its timestamp.
    pub fn set_expression_outcome(
        &self,
        user: UserId,
        expr: ExprId,
        status: ExprStatus,
        result: f64,
    ) -> EngineResult<()> {
        let Some(value) = self.expressions.get(expr_key(user, expr))? else {
            return Err(EngineError::ExpressionNotFound {
                user: user.0,
                expr: expr.0,
            });
        };
        let mut record: ExprRecord = serde_json::from_slice(&value)?;
        record.status = status;
        record.result = result;
        self.expressions
            .insert(expr_key(user, expr), serde_json::to_vec(&record)?)?;
        Ok(())
    }

    // ----- operations -----

    /// All operations of an expression in ascending id order.
    pub fn operations(&self, user: UserId, expr: ExprId) -> EngineResult<Vec<Operation>> {
        let mut result = Vec::new();
        for entry in self.actions.scan_prefix(expr_key(user, expr)) {
            let (key, value) = entry?;
            let record: ActionRecord = serde_json::from_slice(&value)?;
            result.push(record.into_operation(OpId(trailing_id(&key))));
        }
        Ok(result)
    }

    /// One operation, or `None`.
    pub fn operation(
        &self,
        user: UserId,
        expr: ExprId,
        op: OpId,
    ) -> EngineResult<Option<Operation>> {
        let Some(value) = self.actions.get(action_key(user, expr, op))? else {
            return Ok(None);
        };
        let record: ActionRecord = serde_json::from_slice(&value)?;
        Ok(Some(record.into_operation(op)))
    }

    /// Flip the dispatched flag on an operation.
    pub fn mark_dispatched(&self, user: UserId, expr: ExprId, op: OpId) -> EngineResult<()> {
        self.update_action(user, expr, op, |record| {
            record.dispatched = true;
        })
    }

    /// Record a completed operation: result written, completed set,
    /// dispatched cleared.
    pub fn record_result(
        &self,
        user: UserId,
        expr: ExprId,
        op: OpId,
        result: f64,
    ) -> EngineResult<()> {
        self.update_action(user, expr, op, |record| {
            record.result = result;
            record.completed = true;
            record.dispatched = false;
        })
    }

    fn update_action(
        &self,
        user: UserId,
        expr: ExprId,
        op: OpId,
        mutate: impl FnOnce(&mut ActionRecord),
    ) -> EngineResult<()> {
        let key = action_key(user, expr, op);
        let Some(value) = self.actions.get(key)? else {
            return Err(EngineError::OperationNotFound {
                user: user.0,
                expr: expr.0,
                op: op.0,
            });
        };
        let mut record: ActionRecord = serde_json::from_slice(&value)?;
        mutate(&mut record);
        self.actions.insert(key, serde_json::to_vec(&record)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Operator;

    fn temp_store() -> (tempfile::TempDir, TaskStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = TaskStore::open(dir.path()).expect("open store");
        (dir, store)
    }

    fn sample_ops() -> Vec<Operation> {
        vec![
            Operation::new(
                OpId(1),
                Operator::Add,
                Operand::Literal(1.0),
                Operand::Literal(2.0),
            ),
            Operation::new(
                OpId(2),
                Operator::Mul,
                Operand::Ref(OpId(1)),
                Operand::Literal(3.0),
            ),
        ]
    }

    #[test]
    fn expression_ids_are_dense_per_user() {
        let (_dir, store) = temp_store();
        let alice = store.create_user("alice", "hash").unwrap();
        let bob = store.create_user("bob", "hash").unwrap();

        let ops = sample_ops();
        assert_eq!(
            store
                .insert_expression(alice, ExprStatus::UnderConsideration, &ops)
                .unwrap(),
            ExprId(1)
        );
        assert_eq!(
            store
                .insert_expression(alice, ExprStatus::UnderConsideration, &ops)
                .unwrap(),
            ExprId(2)
        );
        assert_eq!(
            store
                .insert_expression(bob, ExprStatus::UnderConsideration, &ops)
                .unwrap(),
            ExprId(1)
        );
    }

    #[test]
    fn operand_encoding_round_trips() {
        let (_dir, store) = temp_store();
        let user = store.create_user("alice", "hash").unwrap();
        let ops = sample_ops();
        let expr = store
            .insert_expression(user, ExprStatus::UnderConsideration, &ops)
            .unwrap();

        let loaded = store.operations(user, expr).unwrap();
        assert_eq!(loaded, ops);
        assert_eq!(loaded[1].lhs, Operand::Ref(OpId(1)));
    }

    #[test]
    fn record_result_clears_dispatched() {
        let (_dir, store) = temp_store();
        let user = store.create_user("alice", "hash").unwrap();
        let expr = store
            .insert_expression(user, ExprStatus::UnderConsideration, &sample_ops())
            .unwrap();

        store.mark_dispatched(user, expr, OpId(1)).unwrap();
        let op = store.operation(user, expr, OpId(1)).unwrap().unwrap();
        assert!(op.dispatched && !op.completed);

        store.record_result(user, expr, OpId(1), 3.0).unwrap();
        let op = store.operation(user, expr, OpId(1)).unwrap().unwrap();
        assert!(op.completed && !op.dispatched);
        assert_eq!(op.result, 3.0);
    }

    #[test]
    fn duplicate_login_is_rejected() {
        let (_dir, store) = temp_store();
        store.create_user("alice", "hash").unwrap();
        assert!(matches!(
            store.create_user("alice", "other"),
            Err(EngineError::LoginTaken(_))
        ));
    }

    #[test]
    fn delete_user_cascades() {
        let (_dir, store) = temp_store();
        let user = store.create_user("alice", "hash").unwrap();
        let expr = store
            .insert_expression(user, ExprStatus::UnderConsideration, &sample_ops())
            .unwrap();

        store.delete_user(user).unwrap();
        assert!(store.expression(user, expr).unwrap().is_none());
        assert!(store.operations(user, expr).unwrap().is_empty());
        assert!(store.user_by_login("alice").unwrap().is_none());

        // The login is free again.
        store.create_user("alice", "hash").unwrap();
    }
}
