//! Scheduler behaviour: dispatch gating, terminal transitions, idempotent
//! reports, and the literal end-to-end scenarios.

use abacus::config::OperatorLatencies;
use abacus::model::{ExprStatus, OpId, UserId};
use abacus::scheduler::Scheduler;
use abacus::store::TaskStore;
use abacus::{EngineError, ParseError};
use std::collections::HashSet;
use std::sync::Arc;

fn fixture() -> (tempfile::TempDir, Arc<Scheduler>, UserId) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(TaskStore::open(dir.path()).expect("open store"));
    let user = store.create_user("alice", "hash").expect("user");
    let scheduler = Arc::new(Scheduler::new(store, OperatorLatencies::default()));
    (dir, scheduler, user)
}

/// Pull and execute until the user's queue drains, like a worker pool with
/// zero simulated latency.
async fn drive(scheduler: &Scheduler, user: UserId) {
    while let Some(task) = scheduler.next_ready(user).await.expect("next_ready") {
        match task.operator.apply(task.arg1, task.arg2) {
            Some(value) => scheduler
                .report(user, task.expr_id, task.op_id, value, false)
                .await
                .expect("report"),
            None => scheduler
                .report(user, task.expr_id, task.op_id, 0.0, true)
                .await
                .expect("report"),
        }
    }
}

#[tokio::test]
async fn mixed_precedence_chain_completes_with_final_value() {
    let (_dir, scheduler, user) = fixture();
    let sub = scheduler.submit(user, "1012+123-24*10-4").await.unwrap();
    assert_eq!(sub.rejected, None);

    drive(&scheduler, user).await;

    let expr = scheduler.get(user, sub.expr_id).await.unwrap();
    assert_eq!(expr.status, ExprStatus::Completed);
    assert_eq!(expr.result, 891.0);
}

#[tokio::test]
async fn single_addition_completes() {
    let (_dir, scheduler, user) = fixture();
    let sub = scheduler.submit(user, "1+1").await.unwrap();
    drive(&scheduler, user).await;
    let expr = scheduler.get(user, sub.expr_id).await.unwrap();
    assert_eq!((expr.status, expr.result), (ExprStatus::Completed, 2.0));
}

#[tokio::test]
async fn bare_literal_completes_with_its_own_value() {
    let (_dir, scheduler, user) = fixture();
    let sub = scheduler.submit(user, "42").await.unwrap();
    drive(&scheduler, user).await;
    let expr = scheduler.get(user, sub.expr_id).await.unwrap();
    assert_eq!((expr.status, expr.result), (ExprStatus::Completed, 42.0));
}

#[tokio::test]
async fn parse_failures_are_persisted_with_their_error_kind() {
    let (_dir, scheduler, user) = fixture();

    let sub = scheduler.submit(user, "1238)").await.unwrap();
    assert_eq!(sub.rejected, Some(ParseError::MismatchedParenthesis));
    let expr = scheduler.get(user, sub.expr_id).await.unwrap();
    assert_eq!(
        expr.status,
        ExprStatus::Rejected(ParseError::MismatchedParenthesis)
    );

    let sub = scheduler.submit(user, "124+2-").await.unwrap();
    assert_eq!(sub.rejected, Some(ParseError::InsufficientOperands));
    let expr = scheduler.get(user, sub.expr_id).await.unwrap();
    assert_eq!(
        expr.status,
        ExprStatus::Rejected(ParseError::InsufficientOperands)
    );
}

#[tokio::test]
async fn division_by_zero_terminates_the_expression() {
    let (_dir, scheduler, user) = fixture();
    let sub = scheduler.submit(user, "10/(5-5)").await.unwrap();
    drive(&scheduler, user).await;
    let expr = scheduler.get(user, sub.expr_id).await.unwrap();
    assert_eq!((expr.status, expr.result), (ExprStatus::DivisionByZero, 0.0));
}

/// P3: a dispatched task always carries fully resolved arguments, and never
/// an unresolved placeholder from a pending dependency.
#[tokio::test]
async fn dispatched_tasks_have_resolved_arguments() {
    let (_dir, scheduler, user) = fixture();
    scheduler.submit(user, "(1+2)*(3+4)/(2+5)").await.unwrap();

    let mut pending = Vec::new();
    loop {
        match scheduler.next_ready(user).await.unwrap() {
            Some(task) => {
                // Dependencies of this expression only ever produce values
                // in 3..=21; a leaked placeholder would show up as 0.
                assert!(task.arg1 != 0.0 && task.arg2 != 0.0);
                pending.push(task);
            }
            None => {
                let Some(task) = pending.pop() else { break };
                let value = task.operator.apply(task.arg1, task.arg2).unwrap();
                scheduler
                    .report(user, task.expr_id, task.op_id, value, false)
                    .await
                    .unwrap();
            }
        }
    }

    let expressions = scheduler.list(user).await.unwrap();
    assert_eq!(expressions[0].status, ExprStatus::Completed);
    assert_eq!(expressions[0].result, 3.0);
}

/// P4: concurrent fetches over one user partition never hand out the same
/// operation twice.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_fetches_never_duplicate() {
    let (_dir, scheduler, user) = fixture();
    for _ in 0..12 {
        scheduler.submit(user, "1+2").await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..6 {
        let scheduler = scheduler.clone();
        handles.push(tokio::spawn(async move {
            let mut fetched = Vec::new();
            while let Some(task) = scheduler.next_ready(user).await.unwrap() {
                fetched.push((task.expr_id, task.op_id));
            }
            fetched
        }));
    }

    let mut seen = HashSet::new();
    for handle in handles {
        for key in handle.await.unwrap() {
            assert!(seen.insert(key), "operation {key:?} dispatched twice");
        }
    }
    assert_eq!(seen.len(), 12);
}

/// P5: a full report sequence always lands on a terminal status.
#[tokio::test]
async fn every_driven_expression_reaches_a_terminal_status() {
    let (_dir, scheduler, user) = fixture();
    for text in ["1+1", "10/(5-5)", "2*3-4", "7", "(1+2)*(3+4)"] {
        scheduler.submit(user, text).await.unwrap();
    }
    drive(&scheduler, user).await;

    for expr in scheduler.list(user).await.unwrap() {
        assert!(
            expr.status.is_terminal(),
            "expression {} still {:?}",
            expr.id,
            expr.status
        );
    }
}

/// P6: replaying a report for a completed operation changes nothing.
#[tokio::test]
async fn replayed_reports_are_no_ops() {
    let (_dir, scheduler, user) = fixture();
    let sub = scheduler.submit(user, "1+1").await.unwrap();
    let task = scheduler.next_ready(user).await.unwrap().unwrap();
    scheduler
        .report(user, task.expr_id, task.op_id, 2.0, false)
        .await
        .unwrap();

    // Replay with a different value, then with the error flag.
    scheduler
        .report(user, task.expr_id, task.op_id, 99.0, false)
        .await
        .unwrap();
    scheduler
        .report(user, task.expr_id, task.op_id, 0.0, true)
        .await
        .unwrap();

    let expr = scheduler.get(user, sub.expr_id).await.unwrap();
    assert_eq!((expr.status, expr.result), (ExprStatus::Completed, 2.0));
}

#[tokio::test]
async fn fetch_scans_user_partitions_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TaskStore::open(dir.path()).unwrap());
    let first = store.create_user("alice", "hash").unwrap();
    let second = store.create_user("bob", "hash").unwrap();
    let scheduler = Scheduler::new(store, OperatorLatencies::default());

    scheduler.submit(second, "1+1").await.unwrap();
    scheduler.submit(first, "2+2").await.unwrap();

    let task = scheduler.next_ready_any().await.unwrap().unwrap();
    assert_eq!(task.user_id, first);
    let task = scheduler.next_ready_any().await.unwrap().unwrap();
    assert_eq!(task.user_id, second);
    assert!(scheduler.next_ready_any().await.unwrap().is_none());
}

#[tokio::test]
async fn report_against_missing_expression_is_not_found() {
    let (_dir, scheduler, user) = fixture();
    let err = scheduler
        .report(user, abacus::ExprId(9), OpId(1), 0.0, false)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ExpressionNotFound { .. }));
}

#[tokio::test]
async fn get_for_unknown_expression_is_not_found() {
    let (_dir, scheduler, user) = fixture();
    let err = scheduler.get(user, abacus::ExprId(1)).await.unwrap_err();
    assert!(matches!(err, EngineError::ExpressionNotFound { .. }));
}
