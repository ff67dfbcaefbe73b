//! Runtime configuration loaded from the environment.
//!
//! Recognised variables: `PORT`, `GRPC_PORT`, `COMPUTING_POWER`,
//! `TIME_ADDITION_MS`, `TIME_SUBTRACTION_MS`, `TIME_MULTIPLICATIONS_MS`,
//! `TIME_DIVISIONS_MS`, `DATABASE_NAME`, `JWT_SECRET`, `ORCHESTRATOR_URL`.
//! Unset or unparsable values fall back to their defaults.

use crate::model::Operator;
use std::str::FromStr;

const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_LATENCY_MS: u64 = 1000;

// Development fallback only; real deployments set JWT_SECRET.
const DEV_JWT_SECRET: &str = "abacus-dev-secret";

/// Simulated per-operator execution duration, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorLatencies {
    pub addition_ms: u64,
    pub subtraction_ms: u64,
    pub multiplication_ms: u64,
    pub division_ms: u64,
}

impl OperatorLatencies {
    pub fn for_operator(&self, op: Operator) -> u64 {
        match op {
            Operator::Add => self.addition_ms,
            Operator::Sub => self.subtraction_ms,
            Operator::Mul => self.multiplication_ms,
            Operator::Div => self.division_ms,
        }
    }
}

impl Default for OperatorLatencies {
    fn default() -> Self {
        Self {
            addition_ms: DEFAULT_LATENCY_MS,
            subtraction_ms: DEFAULT_LATENCY_MS,
            multiplication_ms: DEFAULT_LATENCY_MS,
            division_ms: DEFAULT_LATENCY_MS,
        }
    }
}

/// Process configuration shared by the orchestrator and worker binaries.
#[derive(Debug, Clone)]
pub struct Settings {
    /// HTTP listener port.
    pub http_port: u16,
    /// Dispatcher (gRPC) listener port.
    pub grpc_port: u16,
    /// Worker clients spawned per worker process.
    pub computing_power: usize,
    /// Simulated operator latencies.
    pub latencies: OperatorLatencies,
    /// Path of the sled database directory.
    pub database_name: String,
    /// HS256 signing secret for session tokens.
    pub jwt_secret: String,
    /// Dispatcher endpoint override for workers running on another host.
    pub orchestrator_url: Option<String>,
}

impl Settings {
    /// Read settings from the process environment, applying defaults for
    /// anything unset or unparsable.
    pub fn from_env() -> Self {
        let http_port = env_parse("PORT", DEFAULT_HTTP_PORT);
        let grpc_port = env_parse("GRPC_PORT", http_port.wrapping_add(1));
        Self {
            http_port,
            grpc_port,
            computing_power: env_parse("COMPUTING_POWER", 1),
            latencies: OperatorLatencies {
                addition_ms: env_parse("TIME_ADDITION_MS", DEFAULT_LATENCY_MS),
                subtraction_ms: env_parse("TIME_SUBTRACTION_MS", DEFAULT_LATENCY_MS),
                multiplication_ms: env_parse("TIME_MULTIPLICATIONS_MS", DEFAULT_LATENCY_MS),
                division_ms: env_parse("TIME_DIVISIONS_MS", DEFAULT_LATENCY_MS),
            },
            database_name: std::env::var("DATABASE_NAME")
                .unwrap_or_else(|_| "./abacus_db".to_string()),
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| {
                tracing::warn!("JWT_SECRET not set, using development secret");
                DEV_JWT_SECRET.to_string()
            }),
            orchestrator_url: std::env::var("ORCHESTRATOR_URL").ok(),
        }
    }

    /// Endpoint the worker pool dials for fetch/submit.
    pub fn dispatcher_endpoint(&self) -> String {
        self.orchestrator_url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.grpc_port))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            grpc_port: DEFAULT_HTTP_PORT + 1,
            computing_power: 1,
            latencies: OperatorLatencies::default(),
            database_name: "./abacus_db".to_string(),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            orchestrator_url: None,
        }
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
