//! Convoy - Dependency-driven suite orchestration
//!
//! This crate runs registered suites as a dependency graph: suites become
//! ready when every suite they depend on has succeeded, run isolated or
//! concurrently inside spawned workers, exchange payloads and shared state,
//! and persist their results so an interrupted run can resume where it
//! stopped.

pub mod capture;
pub mod graph;
pub mod options;
pub mod registry;
pub mod report;
pub mod reporter;
pub mod result;
pub mod runner;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod suite;
pub mod worker;

pub use capture::{CapturePolicy, CaptureRequest, DiagnosticCapture, FsCapture, NoopCapture};
pub use graph::DependencyGraph;
pub use options::{ReportFormat, ReportOptions, ResumeOptions, RunOptions};
pub use registry::{RegistrationError, SuiteRegistry};
pub use reporter::{CollectingReporter, RunEvent, RunReporter, TracingReporter};
pub use result::{ExecutionResult, ResultKey, StepResult};
pub use runner::{LaneSummary, Runner, RunnerError, RunSummary};
pub use scheduler::{Scheduler, SchedulerState, SuiteFailure};
pub use state::{SharedState, SharedValue};
pub use store::{DiskResultStore, MemoryResultStore, ResultStore, StoreError};
pub use suite::{RegisteredSuite, StepTable, SuiteBody, SuiteDescriptor};
pub use worker::{SuiteContext, WorkerMessage};
