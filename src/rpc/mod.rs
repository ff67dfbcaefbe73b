//! Dispatch RPC: the pull-based contract between scheduler and workers.
//!
//! Two unary calls. `FetchTask` hands out one ready operation (absent task
//! means "no work right now"); `SubmitResult` posts a completed or errored
//! computation back.

use crate::error::EngineError;
use crate::model::{ExprId, OpId, Task, UserId};
use crate::scheduler::Scheduler;
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;
use tonic::{Request, Response, Status};
use tracing::info;

pub mod proto {
    tonic::include_proto!("dispatch.v1");
}

use proto::dispatcher_server::{Dispatcher, DispatcherServer};
use proto::{FetchTaskRequest, FetchTaskResponse, SubmitResultRequest, SubmitResultResponse};

/// gRPC facade over the scheduler.
pub struct DispatchService {
    scheduler: Arc<Scheduler>,
}

impl DispatchService {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}

#[tonic::async_trait]
impl Dispatcher for DispatchService {
    async fn fetch_task(
        &self,
        _request: Request<FetchTaskRequest>,
    ) -> Result<Response<FetchTaskResponse>, Status> {
        let task = self
            .scheduler
            .next_ready_any()
            .await
            .map_err(|e| Status::internal(e.to_string()))?;
        Ok(Response::new(FetchTaskResponse {
            task: task.map(task_to_proto),
        }))
    }

    async fn submit_result(
        &self,
        request: Request<SubmitResultRequest>,
    ) -> Result<Response<SubmitResultResponse>, Status> {
        let msg = request.into_inner();
        match self
            .scheduler
            .report(
                UserId(msg.user_id),
                ExprId(msg.expr_id),
                OpId(msg.op_id),
                msg.value,
                msg.error,
            )
            .await
        {
            Ok(()) => Ok(Response::new(SubmitResultResponse {})),
            Err(
                err @ (EngineError::ExpressionNotFound { .. }
                | EngineError::OperationNotFound { .. }),
            ) => Err(Status::not_found(err.to_string())),
            Err(err) => Err(Status::internal(err.to_string())),
        }
    }
}

fn task_to_proto(task: Task) -> proto::Task {
    proto::Task {
        user_id: task.user_id.0,
        expr_id: task.expr_id.0,
        op_id: task.op_id.0,
        operator: task.operator.symbol().to_string(),
        arg1: task.arg1,
        arg2: task.arg2,
        latency_ms: task.latency_ms as u32,
    }
}

/// Serve the dispatcher until the process exits.
pub async fn serve(scheduler: Arc<Scheduler>, port: u16) -> Result<(), tonic::transport::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "dispatcher listening");
    Server::builder()
        .add_service(DispatcherServer::new(DispatchService::new(scheduler)))
        .serve(addr)
        .await
}
