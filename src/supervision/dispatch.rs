use serde_json::Value;

use crate::error::{Result, SupervisionError};
use crate::supervision::failed_follower::FailedFollowerJob;
use crate::supervision::failed_leader::FailedLeaderJob;
use crate::supervision::failed_server::FailedServerJob;
use crate::supervision::job::{
    JobContext, JobStatus, SupervisionJob, FAILED_FOLLOWER, FAILED_LEADER, FAILED_SERVER,
    UNASSUMED_LEADERSHIP,
};
use crate::supervision::unassumed_leadership::UnassumedLeadershipJob;

/// A job of any kind, selected by the `type` field of its record.
pub enum AnyJob<'a> {
    FailedServer(FailedServerJob<'a>),
    FailedLeader(FailedLeaderJob<'a>),
    FailedFollower(FailedFollowerJob<'a>),
    UnassumedLeadership(UnassumedLeadershipJob<'a>),
}

impl<'a> AnyJob<'a> {
    pub fn from_record(ctx: JobContext<'a>, job_id: &str, record: &Value) -> Result<Self> {
        let job_type = record.get("type").and_then(Value::as_str).unwrap_or("");
        let job = match job_type {
            FAILED_SERVER => AnyJob::FailedServer(FailedServerJob::from_record(ctx, job_id, record)?),
            FAILED_LEADER => AnyJob::FailedLeader(FailedLeaderJob::from_record(ctx, job_id, record)?),
            FAILED_FOLLOWER => {
                AnyJob::FailedFollower(FailedFollowerJob::from_record(ctx, job_id, record)?)
            }
            UNASSUMED_LEADERSHIP => AnyJob::UnassumedLeadership(
                UnassumedLeadershipJob::from_record(ctx, job_id, record)?,
            ),
            other => {
                return Err(SupervisionError::Unexpected(format!(
                    "job {} has unknown type '{}'",
                    job_id, other
                )))
            }
        };
        Ok(job)
    }

    /// Rebuilds the job from wherever its record lives in the snapshot.
    pub fn load(ctx: JobContext<'a>, job_id: &str) -> Result<Option<Self>> {
        let found = [
            JobStatus::ToDo,
            JobStatus::Pending,
            JobStatus::Finished,
            JobStatus::Failed,
        ]
        .into_iter()
        .filter_map(|status| status.prefix())
        .find_map(|prefix| ctx.snapshot.lookup(&format!("{}{}", prefix, job_id)));

        match found {
            Some(record) => Self::from_record(ctx, job_id, record).map(Some),
            None => Ok(None),
        }
    }

    pub fn job(&mut self) -> &mut dyn SupervisionJob<'a> {
        match self {
            AnyJob::FailedServer(job) => job,
            AnyJob::FailedLeader(job) => job,
            AnyJob::FailedFollower(job) => job,
            AnyJob::UnassumedLeadership(job) => job,
        }
    }

    pub fn as_job(&self) -> &dyn SupervisionJob<'a> {
        match self {
            AnyJob::FailedServer(job) => job,
            AnyJob::FailedLeader(job) => job,
            AnyJob::FailedFollower(job) => job,
            AnyJob::UnassumedLeadership(job) => job,
        }
    }
}
