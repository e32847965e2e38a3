pub mod code_embedding;
pub mod indexing_job;
pub mod job;
pub mod queue;
pub mod reasoning;
pub mod schedule;
pub mod session;
pub mod subscription;

pub use code_embedding::CodeEmbedding;
pub use indexing_job::{IndexingJob, IndexingJobStatus};
pub use job::{Job, JobStatus};
pub use queue::{BackoffKind, JobOptions, Queue, RemovalPolicy};
pub use reasoning::{ReasoningStep, StepType};
pub use schedule::{Schedule, ScheduleTrigger};
pub use session::{Session, SessionStatus};
pub use subscription::{LifecycleEvent, Subscription};
