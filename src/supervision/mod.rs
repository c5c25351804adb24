//! Supervision job engine.
//!
//! Every job lives as a record under `Target/{ToDo,Pending,Finished,Failed}`
//! and moves forward one preconditioned transaction at a time. The
//! [`Supervisor`] re-derives all job state from a fresh snapshot each tick.

pub mod dispatch;
pub mod failed_follower;
pub mod failed_leader;
pub mod failed_server;
pub mod health;
pub mod job;
pub mod overview;
pub mod supervisor;
pub mod unassumed_leadership;

pub use dispatch::AnyJob;
pub use failed_follower::FailedFollowerJob;
pub use failed_leader::FailedLeaderJob;
pub use failed_server::FailedServerJob;
pub use health::HealthStatus;
pub use job::{Blocker, JobBase, JobContext, JobStatus, ShardRef, SupervisionJob};
pub use overview::{list_jobs, list_servers, JobSummary, ServerSummary};
pub use supervisor::{abort_job, JobOutcome, Supervisor, TickReport};
pub use unassumed_leadership::UnassumedLeadershipJob;
