//! Worker pool: fetch, simulate, compute, report.
//!
//! Each worker owns one client connection for its lifetime and runs a
//! cooperative loop: fetch a task; when there is none, back off and retry;
//! otherwise sleep the operator's configured latency, apply the operator and
//! post the result back.

use crate::config::Settings;
use crate::model::Operator;
use crate::rpc::proto::dispatcher_client::DispatcherClient;
use crate::rpc::proto::{FetchTaskRequest, SubmitResultRequest};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{info, warn};

/// Idle and transport-failure back-off.
const BACKOFF: Duration = Duration::from_secs(1);

/// Attempts to deliver a computed result before giving it up. Reports are
/// idempotent on the orchestrator side, so retrying is safe.
const SUBMIT_ATTEMPTS: usize = 3;

/// Outcome of one computation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Computation {
    pub value: f64,
    pub error: bool,
}

/// Apply an operator to its resolved arguments. Division by zero and an
/// operator the worker does not recognise both raise the error flag.
pub fn execute(operator: &str, arg1: f64, arg2: f64) -> Computation {
    match Operator::from_symbol(operator) {
        Some(op) => match op.apply(arg1, arg2) {
            Some(value) => Computation {
                value,
                error: false,
            },
            None => Computation {
                value: 0.0,
                error: true,
            },
        },
        None => Computation {
            value: 0.0,
            error: true,
        },
    }
}

/// One worker's long-running loop. Never returns.
pub async fn run(worker: usize, endpoint: String) {
    let mut client = loop {
        match DispatcherClient::connect(endpoint.clone()).await {
            Ok(client) => break client,
            Err(err) => {
                warn!(worker, error = %err, "dispatcher unreachable, retrying");
                sleep(BACKOFF).await;
            }
        }
    };
    info!(worker, %endpoint, "worker connected");

    loop {
        let task = match client.fetch_task(FetchTaskRequest {}).await {
            Ok(response) => response.into_inner().task,
            Err(status) => {
                warn!(worker, error = %status, "fetch failed");
                sleep(BACKOFF).await;
                continue;
            }
        };
        let Some(task) = task else {
            sleep(BACKOFF).await;
            continue;
        };

        // Simulate the expensive computation.
        sleep(Duration::from_millis(u64::from(task.latency_ms))).await;
        let outcome = execute(&task.operator, task.arg1, task.arg2);

        let result = SubmitResultRequest {
            user_id: task.user_id,
            expr_id: task.expr_id,
            op_id: task.op_id,
            value: outcome.value,
            error: outcome.error,
        };
        for attempt in 1..=SUBMIT_ATTEMPTS {
            match client.submit_result(result.clone()).await {
                Ok(_) => break,
                Err(status) if attempt < SUBMIT_ATTEMPTS => {
                    warn!(worker, error = %status, attempt, "submit failed, retrying");
                    sleep(BACKOFF).await;
                }
                Err(status) => {
                    warn!(worker, error = %status, "submit abandoned");
                }
            }
        }
    }
}

/// Spawn the configured number of workers against the dispatcher endpoint.
pub fn spawn_pool(settings: &Settings, workers: usize) -> Vec<JoinHandle<()>> {
    let endpoint = settings.dispatcher_endpoint();
    (0..workers)
        .map(|worker| tokio::spawn(run(worker, endpoint.clone())))
        .collect()
}
