use rand::RngCore;
use serde_json::{json, Value};

use crate::agency::Transaction;
use crate::error::Result;
use crate::supervision::job::{
    record_str, timestamp, Blocker, JobBase, JobContext, JobStatus, ShardRef, SupervisionJob,
    FAILED_LEADER,
};

/// Promotes the first follower of a shard whose leader failed. The old
/// leader is kept as the last follower so it can catch up once it returns.
pub struct FailedLeaderJob<'a> {
    base: JobBase<'a>,
    shard: ShardRef,
    from: String,
    to: String,
}

impl<'a> FailedLeaderJob<'a> {
    pub fn new(
        ctx: JobContext<'a>,
        job_id: &str,
        creator: &str,
        shard: ShardRef,
        from: &str,
        to: &str,
    ) -> Self {
        Self {
            base: JobBase::new(ctx, job_id, creator),
            shard,
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn from_record(ctx: JobContext<'a>, job_id: &str, record: &Value) -> Result<Self> {
        Ok(Self::new(
            ctx,
            job_id,
            &record_str(record, "creator")?,
            ShardRef::from_record(record)?,
            &record_str(record, "fromServer")?,
            &record_str(record, "toServer")?,
        ))
    }

    pub fn shard(&self) -> &ShardRef {
        &self.shard
    }

    pub fn to_server(&self) -> &str {
        &self.to
    }

    fn blocker(&self) -> Blocker {
        Blocker::Shard(self.shard.shard.clone())
    }
}

impl<'a> SupervisionJob<'a> for FailedLeaderJob<'a> {
    fn base(&self) -> &JobBase<'a> {
        &self.base
    }

    fn job_type(&self) -> &'static str {
        FAILED_LEADER
    }

    fn status(&mut self) -> Result<JobStatus> {
        let status = self.base.current_status();
        if status == JobStatus::Pending {
            let current = self.base.current_servers(&self.shard)?;
            if current.first() == Some(&self.to) {
                self.finish(true, None)?;
            }
        }
        Ok(self.base.current_status())
    }

    fn create(&mut self, envelope: Option<&mut Transaction>) -> Result<bool> {
        let record = json!({
            "type": FAILED_LEADER,
            "database": self.shard.database,
            "collection": self.shard.collection,
            "shard": self.shard.shard,
            "fromServer": self.from,
            "toServer": self.to,
            "jobId": self.base.job_id,
            "creator": self.base.creator,
            "timeCreated": timestamp(),
        });
        let guard = self.base.unique_guard();
        self.base.commit_create(record, guard, envelope)
    }

    fn start(&mut self, _rng: &mut dyn RngCore) -> Result<bool> {
        let todo = self.base.todo_record()?;

        let Some(planned) = self.base.planned_servers(&self.shard)? else {
            self.finish(false, Some(&format!("shard {} is no longer planned", self.shard)))?;
            return Ok(false);
        };
        if planned.first() != Some(&self.from) {
            let reason = format!("{} is no longer leader of {}", self.from, self.shard);
            self.finish(false, Some(&reason))?;
            return Ok(false);
        }
        if !planned.contains(&self.to) {
            let reason = format!("{} is not a follower of {}", self.to, self.shard);
            self.finish(false, Some(&reason))?;
            return Ok(false);
        }

        let mut servers = vec![self.to.clone()];
        servers.extend(
            planned
                .iter()
                .filter(|s| **s != self.to && **s != self.from)
                .cloned(),
        );
        servers.push(self.from.clone());

        let (mut trx, pending) = self.base.pending_transaction(todo);
        let plan = self.base.path(&self.shard.plan_path());
        let block = self.base.path(&self.blocker().path());
        trx.set(&plan, json!(servers))
            .expect_old(&plan, json!(planned))
            .set(&block, json!({"jobId": self.base.job_id}))
            .expect_empty(&block);

        if !self.base.commit_start(&trx, pending)? {
            return Ok(false);
        }
        tracing::info!(
            job_id = %self.base.job_id,
            shard = %self.shard,
            from = %self.from,
            to = %self.to,
            "Leadership handed over"
        );
        Ok(true)
    }

    fn finish(&mut self, success: bool, reason: Option<&str>) -> Result<bool> {
        let blocker = self.blocker();
        self.base.finish(&blocker, success, reason)
    }

    fn abort(&mut self) -> Result<bool> {
        if !self.base.current_status().is_in_flight() {
            return Ok(false);
        }
        self.finish(false, Some("aborted"))
    }
}
