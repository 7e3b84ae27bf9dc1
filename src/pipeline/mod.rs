//! 事件管道核心：接入、处理与状态推进

pub mod clock;
pub mod error;
pub mod intake;
pub mod paths;
pub mod transform;
pub mod worker;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{IngestStage, PipelineError, ProcessStage};
pub use intake::{Accepted, IntakeService};
pub use worker::{BatchFailurePolicy, BatchOutcome, ProcessingWorker, WorkerSettings};
