//! The dispatch RPC contract, exercised against the service directly.

use abacus::config::OperatorLatencies;
use abacus::model::{ExprStatus, UserId};
use abacus::rpc::proto::dispatcher_server::Dispatcher;
use abacus::rpc::proto::{FetchTaskRequest, SubmitResultRequest};
use abacus::rpc::DispatchService;
use abacus::scheduler::Scheduler;
use abacus::store::TaskStore;
use std::sync::Arc;
use tonic::{Code, Request};

fn fixture() -> (tempfile::TempDir, Arc<Scheduler>, DispatchService, UserId) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(TaskStore::open(dir.path()).expect("open store"));
    let user = store.create_user("alice", "hash").expect("user");
    let latencies = OperatorLatencies {
        addition_ms: 111,
        subtraction_ms: 222,
        multiplication_ms: 333,
        division_ms: 444,
    };
    let scheduler = Arc::new(Scheduler::new(store, latencies));
    let service = DispatchService::new(scheduler.clone());
    (dir, scheduler, service, user)
}

#[tokio::test]
async fn fetch_returns_empty_when_idle() {
    let (_dir, _scheduler, service, _user) = fixture();
    let response = service
        .fetch_task(Request::new(FetchTaskRequest {}))
        .await
        .unwrap();
    assert!(response.into_inner().task.is_none());
}

#[tokio::test]
async fn fetch_carries_operator_arguments_and_latency() {
    let (_dir, scheduler, service, user) = fixture();
    scheduler.submit(user, "6*7").await.unwrap();

    let response = service
        .fetch_task(Request::new(FetchTaskRequest {}))
        .await
        .unwrap();
    let task = response.into_inner().task.unwrap();
    assert_eq!(task.user_id, user.0);
    assert_eq!((task.expr_id, task.op_id), (1, 1));
    assert_eq!(task.operator, "*");
    assert_eq!((task.arg1, task.arg2), (6.0, 7.0));
    assert_eq!(task.latency_ms, 333);

    // The operation is now held by the worker; nothing else is ready.
    let response = service
        .fetch_task(Request::new(FetchTaskRequest {}))
        .await
        .unwrap();
    assert!(response.into_inner().task.is_none());
}

#[tokio::test]
async fn submit_completes_the_expression() {
    let (_dir, scheduler, service, user) = fixture();
    let sub = scheduler.submit(user, "6*7").await.unwrap();

    let task = service
        .fetch_task(Request::new(FetchTaskRequest {}))
        .await
        .unwrap()
        .into_inner()
        .task
        .unwrap();
    let outcome = abacus::worker::execute(&task.operator, task.arg1, task.arg2);
    assert!(!outcome.error);

    service
        .submit_result(Request::new(SubmitResultRequest {
            user_id: task.user_id,
            expr_id: task.expr_id,
            op_id: task.op_id,
            value: outcome.value,
            error: outcome.error,
        }))
        .await
        .unwrap();

    let expr = scheduler.get(user, sub.expr_id).await.unwrap();
    assert_eq!((expr.status, expr.result), (ExprStatus::Completed, 42.0));
}

#[tokio::test]
async fn error_submission_marks_division_by_zero() {
    let (_dir, scheduler, service, user) = fixture();
    let sub = scheduler.submit(user, "1/0").await.unwrap();

    let task = service
        .fetch_task(Request::new(FetchTaskRequest {}))
        .await
        .unwrap()
        .into_inner()
        .task
        .unwrap();
    let outcome = abacus::worker::execute(&task.operator, task.arg1, task.arg2);
    assert!(outcome.error);

    service
        .submit_result(Request::new(SubmitResultRequest {
            user_id: task.user_id,
            expr_id: task.expr_id,
            op_id: task.op_id,
            value: outcome.value,
            error: outcome.error,
        }))
        .await
        .unwrap();

    let expr = scheduler.get(user, sub.expr_id).await.unwrap();
    assert_eq!((expr.status, expr.result), (ExprStatus::DivisionByZero, 0.0));
}

#[tokio::test]
async fn submit_for_unknown_operation_is_not_found() {
    let (_dir, _scheduler, service, user) = fixture();
    let status = service
        .submit_result(Request::new(SubmitResultRequest {
            user_id: user.0,
            expr_id: 5,
            op_id: 1,
            value: 0.0,
            error: false,
        }))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::NotFound);
}
