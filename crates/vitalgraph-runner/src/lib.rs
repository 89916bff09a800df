//! Execution side of the Vitalgraph console: the REST/stream boundary to the
//! agent execution backend, and the orchestrator that drives single-agent
//! tests and whole-workflow runs.

pub mod client;
pub mod orchestrator;

pub use client::{
    ApiClient, ContextSnapshot, ExecutionBackend, RunResult, RunStreamItem, TestRequest,
    TestResponse,
};
pub use orchestrator::{RunOrchestrator, RunPolicy, RunRecord, TestOutcome};
