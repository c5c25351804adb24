use rand::seq::SliceRandom;
use rand::RngCore;
use serde_json::{json, Value};

use crate::agency::Transaction;
use crate::error::Result;
use crate::supervision::job::{
    record_str, timestamp, Blocker, JobBase, JobContext, JobStatus, ShardRef, SupervisionJob,
    UNASSUMED_LEADERSHIP,
};

/// Handles a shard no server ever picked up while its planned leader is the
/// failed server: leadership moves to the first planned follower, or to a
/// random known server when the shard has no followers.
pub struct UnassumedLeadershipJob<'a> {
    base: JobBase<'a>,
    shard: ShardRef,
    server: String,
}

impl<'a> UnassumedLeadershipJob<'a> {
    pub fn new(ctx: JobContext<'a>, job_id: &str, creator: &str, shard: ShardRef, server: &str) -> Self {
        Self {
            base: JobBase::new(ctx, job_id, creator),
            shard,
            server: server.to_string(),
        }
    }

    pub fn from_record(ctx: JobContext<'a>, job_id: &str, record: &Value) -> Result<Self> {
        Ok(Self::new(
            ctx,
            job_id,
            &record_str(record, "creator")?,
            ShardRef::from_record(record)?,
            &record_str(record, "server")?,
        ))
    }

    pub fn shard(&self) -> &ShardRef {
        &self.shard
    }

    fn blocker(&self) -> Blocker {
        Blocker::Shard(self.shard.shard.clone())
    }
}

impl<'a> SupervisionJob<'a> for UnassumedLeadershipJob<'a> {
    fn base(&self) -> &JobBase<'a> {
        &self.base
    }

    fn job_type(&self) -> &'static str {
        UNASSUMED_LEADERSHIP
    }

    fn status(&mut self) -> Result<JobStatus> {
        if self.base.current_status() != JobStatus::Pending {
            return Ok(self.base.current_status());
        }
        let Some(to) = self
            .base
            .pending_record()
            .and_then(|record| record.get("toServer"))
            .and_then(Value::as_str)
            .map(str::to_string)
        else {
            return Ok(JobStatus::Pending);
        };

        if self.base.current_servers(&self.shard)?.first() == Some(&to) {
            self.finish(true, None)?;
        }
        Ok(self.base.current_status())
    }

    fn create(&mut self, envelope: Option<&mut Transaction>) -> Result<bool> {
        let record = json!({
            "type": UNASSUMED_LEADERSHIP,
            "database": self.shard.database,
            "collection": self.shard.collection,
            "shard": self.shard.shard,
            "server": self.server,
            "jobId": self.base.job_id,
            "creator": self.base.creator,
            "timeCreated": timestamp(),
        });
        let guard = self.base.unique_guard();
        self.base.commit_create(record, guard, envelope)
    }

    fn start(&mut self, rng: &mut dyn RngCore) -> Result<bool> {
        let mut todo = self.base.todo_record()?;

        let Some(planned) = self.base.planned_servers(&self.shard)? else {
            self.finish(false, Some(&format!("shard {} is no longer planned", self.shard)))?;
            return Ok(false);
        };
        if planned.first() != Some(&self.server) {
            let reason = format!("{} is not the planned leader of {}", self.server, self.shard);
            self.finish(true, Some(&reason))?;
            return Ok(false);
        }

        let to = match planned.get(1) {
            Some(follower) => Some(follower.clone()),
            None => {
                let candidates: Vec<String> = self
                    .base
                    .available_servers()
                    .into_iter()
                    .filter(|s| !planned.contains(s))
                    .collect();
                candidates.choose(&mut *rng).cloned()
            }
        };
        let Some(to) = to else {
            self.finish(false, Some("no server available to assume leadership"))?;
            return Ok(false);
        };

        let mut servers = vec![to.clone()];
        servers.extend(
            planned
                .iter()
                .filter(|s| **s != to && **s != self.server)
                .cloned(),
        );

        todo.insert("toServer".into(), json!(to));
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
            server = %self.server,
            to = %to,
            "Leadership assigned to unassumed shard"
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agency::{Agency, InMemoryAgency};
    use rand::rngs::mock::StepRng;

    fn agency(shard: Value) -> InMemoryAgency {
        InMemoryAgency::with_tree(json!({
            "Plan": {
                "DBServers": {"F": "none", "S1": "none", "S2": "none"},
                "Collections": {"db": {"c": {"replicationFactor": 1, "shards": {"s1": shard}}}}
            },
            "Current": {"Collections": {"db": {}}}
        }))
    }

    fn job<'a>(ctx: JobContext<'a>) -> UnassumedLeadershipJob<'a> {
        UnassumedLeadershipJob::new(ctx, "1-0", "1", ShardRef::new("db", "c", "s1"), "F")
    }

    #[test]
    fn test_follower_takes_over() {
        let agency = agency(json!(["F", "S1"]));
        let snap = agency.read("/").unwrap();
        assert_eq!(
            job(JobContext::new(&snap, &agency, "/")).run(&mut StepRng::new(0, 1)),
            JobStatus::Pending
        );

        let after = agency.read("/").unwrap();
        assert_eq!(after.get("/Plan/Collections/db/c/shards/s1").unwrap(), &json!(["S1"]));
        assert_eq!(after.get_str("/Target/Pending/1-0/toServer").unwrap(), "S1");
    }

    #[test]
    fn test_random_server_when_no_follower() {
        let agency = agency(json!(["F"]));
        let snap = agency.read("/").unwrap();
        job(JobContext::new(&snap, &agency, "/")).run(&mut StepRng::new(0, 1));

        let after = agency.read("/").unwrap();
        let to = after.get_str("/Target/Pending/1-0/toServer").unwrap();
        assert!(to == "S1" || to == "S2");
        assert_eq!(after.get("/Plan/Collections/db/c/shards/s1").unwrap(), &json!([to]));
    }

    #[test]
    fn test_not_leader_finishes_without_plan_change() {
        let agency = agency(json!(["S1", "F"]));
        let snap = agency.read("/").unwrap();
        assert_eq!(
            job(JobContext::new(&snap, &agency, "/")).run(&mut StepRng::new(0, 1)),
            JobStatus::Finished
        );
        let after = agency.read("/").unwrap();
        assert_eq!(after.get("/Plan/Collections/db/c/shards/s1").unwrap(), &json!(["S1", "F"]));
        assert!(!after.exists("/Target/BlockedShards/s1"));
    }

    #[test]
    fn test_no_candidate_fails() {
        let agency = InMemoryAgency::with_tree(json!({
            "Plan": {
                "DBServers": {"F": "none"},
                "Collections": {"db": {"c": {"shards": {"s1": ["F"]}}}}
            }
        }));
        let snap = agency.read("/").unwrap();
        assert_eq!(
            job(JobContext::new(&snap, &agency, "/")).run(&mut StepRng::new(0, 1)),
            JobStatus::Failed
        );
        assert_eq!(
            agency.read("/").unwrap().get_str("/Target/Failed/1-0/reason").unwrap(),
            "no server available to assume leadership"
        );
    }

    #[test]
    fn test_finishes_when_leader_reports() {
        let agency = agency(json!(["F", "S1"]));
        let snap = agency.read("/").unwrap();
        job(JobContext::new(&snap, &agency, "/")).run(&mut StepRng::new(0, 1));

        let mut trx = Transaction::new();
        trx.set("/Current/Collections/db/c/s1/servers", json!(["S1"]));
        agency.write(&trx).unwrap();

        let snap = agency.read("/").unwrap();
        let record = snap.get("/Target/Pending/1-0").unwrap();
        let mut job =
            UnassumedLeadershipJob::from_record(JobContext::new(&snap, &agency, "/"), "1-0", record)
                .unwrap();
        assert_eq!(job.status().unwrap(), JobStatus::Finished);
    }
}
