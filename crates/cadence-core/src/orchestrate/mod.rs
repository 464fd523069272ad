pub mod engine;
pub mod scope;
pub mod worker;

pub use engine::{NoopVcs, NoopVerifier, Orchestrator, RunOutcome, ShellVerifier, Vcs, Verifier, VerifyOutcome};
pub use scope::{ExecutionPlan, ScopeGate};
pub use worker::{ProcessWorker, Worker, WorkerError, WorkerReport, WorkerRequest, WorkerStatus};
