//! Abacus — distributed arithmetic expression evaluation.
//!
//! An orchestrator accepts infix expressions over HTTP, compiles each into a
//! DAG of binary operations, persists the graph, and hands ready operations
//! to a pool of pull-based workers over gRPC. Results flow back through the
//! same channel until the expression reaches a terminal status.

pub mod api;
pub mod compiler;
pub mod config;
pub mod error;
pub mod model;
pub mod rpc;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use config::Settings;
pub use error::{EngineError, EngineResult, ParseError};
pub use model::{ExprId, Expression, ExprStatus, OpId, Operand, Operation, Operator, Task, UserId};
pub use scheduler::Scheduler;
pub use store::TaskStore;
