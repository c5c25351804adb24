use rand::seq::SliceRandom;
use rand::RngCore;
use serde_json::{json, Value};

use crate::agency::Transaction;
use crate::error::{Result, SupervisionError};
use crate::supervision::dispatch::AnyJob;
use crate::supervision::failed_follower::FailedFollowerJob;
use crate::supervision::failed_leader::FailedLeaderJob;
use crate::supervision::health::HealthStatus;
use crate::supervision::job::{
    record_str, sub_job_id, timestamp, Blocker, JobBase, JobContext, JobStatus, ShardRef,
    SupervisionJob, CURRENT_COLLECTIONS_PREFIX, FAILED_PREFIX, FAILED_SERVER,
    FAILED_SERVERS_PREFIX, HEALTH_PREFIX, PENDING_PREFIX, PLAN_COLLECTIONS_PREFIX, TODO_PREFIX,
};
use crate::supervision::unassumed_leadership::UnassumedLeadershipJob;

/// Fails over every shard placed on a server the health monitor reports as
/// BAD or FAILED.
///
/// While pending, the job blocks its server and waits for the per-shard
/// sub-jobs (`<jobId>-<n>`) it spawned on start.
pub struct FailedServerJob<'a> {
    base: JobBase<'a>,
    server: String,
}

impl<'a> FailedServerJob<'a> {
    pub fn new(ctx: JobContext<'a>, job_id: &str, creator: &str, server: &str) -> Self {
        Self {
            base: JobBase::new(ctx, job_id, creator),
            server: server.to_string(),
        }
    }

    pub fn from_record(ctx: JobContext<'a>, job_id: &str, record: &Value) -> Result<Self> {
        let server = record_str(record, "server")
            .map_err(|e| SupervisionError::Unexpected(format!("Failed to find job {} in agency: {}", job_id, e)))?;
        let creator = record_str(record, "creator").unwrap_or_default();
        Ok(Self::new(ctx, job_id, &creator, &server))
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    fn health_path(&self) -> String {
        format!("{}{}/Status", HEALTH_PREFIX, self.server)
    }

    fn health(&self) -> Option<HealthStatus> {
        self.base
            .snapshot()
            .lookup(&self.health_path())
            .and_then(Value::as_str)
            .and_then(HealthStatus::parse)
    }

    fn blocker(&self) -> Blocker {
        Blocker::Server(self.server.clone())
    }

    /// Walks the plan and runs one sub-job per affected shard, numbering
    /// them in iteration order.
    fn spawn_sub_jobs(&self, rng: &mut dyn RngCore) -> Result<usize> {
        let snapshot = self.base.snapshot();
        let ctx = self.base.ctx();
        let known = self.base.available_servers();
        let mut sub = 0;

        for database in snapshot.child_keys(PLAN_COLLECTIONS_PREFIX) {
            let db_path = format!("{}/{}", PLAN_COLLECTIONS_PREFIX, database);
            for collection in snapshot.child_keys(&db_path) {
                let coll_path = format!("{}/{}", db_path, collection);
                let shards_path = format!("{}/shards", coll_path);
                let current_path =
                    format!("{}/{}/{}", CURRENT_COLLECTIONS_PREFIX, database, collection);

                // Nobody ever picked the collection up
                if snapshot.child_keys(&current_path).is_empty() {
                    for shard in snapshot.child_keys(&shards_path) {
                        let mut job = UnassumedLeadershipJob::new(
                            ctx,
                            &sub_job_id(&self.base.job_id, sub),
                            &self.base.job_id,
                            ShardRef::new(database, collection, shard),
                            &self.server,
                        );
                        sub += 1;
                        job.run(rng);
                    }
                    continue;
                }

                let replication_factor = match snapshot.lookup(&format!("{}/replicationFactor", coll_path)) {
                    Some(value) => value.as_u64().ok_or_else(|| {
                        SupervisionError::malformed(format!("{}/replicationFactor", coll_path), "unsigned integer")
                    })?,
                    None => 1,
                };
                if replication_factor <= 1 {
                    continue;
                }

                let is_clone = snapshot
                    .lookup(&format!("{}/distributeShardsLike", coll_path))
                    .and_then(Value::as_str)
                    .is_some_and(|like| !like.is_empty());

                for shard in snapshot.child_keys(&shards_path) {
                    let shard_ref = ShardRef::new(database, collection, shard);
                    let Some(servers) = self.base.planned_servers(&shard_ref)? else {
                        continue;
                    };
                    let Some(pos) = servers.iter().position(|s| *s == self.server) else {
                        continue;
                    };

                    if pos == 0 {
                        let Some(to) = servers.get(1) else {
                            tracing::warn!(
                                job_id = %self.base.job_id,
                                shard = %shard_ref,
                                "Failed leader has no follower to take over"
                            );
                            continue;
                        };
                        let mut job = FailedLeaderJob::new(
                            ctx,
                            &sub_job_id(&self.base.job_id, sub),
                            &self.base.job_id,
                            shard_ref,
                            &self.server,
                            to,
                        );
                        sub += 1;
                        job.run(rng);
                        continue;
                    }

                    if is_clone {
                        continue;
                    }
                    let available: Vec<&String> =
                        known.iter().filter(|s| !servers.contains(s)).collect();
                    if let Some(to) = available.choose(&mut *rng) {
                        let mut job = FailedFollowerJob::new(
                            ctx,
                            &sub_job_id(&self.base.job_id, sub),
                            &self.base.job_id,
                            shard_ref,
                            &self.server,
                            to,
                        );
                        sub += 1;
                        job.run(rng);
                    }
                }
            }
        }

        Ok(sub)
    }
}

impl<'a> SupervisionJob<'a> for FailedServerJob<'a> {
    fn base(&self) -> &JobBase<'a> {
        &self.base
    }

    fn job_type(&self) -> &'static str {
        FAILED_SERVER
    }

    fn status(&mut self) -> Result<JobStatus> {
        let status = self.base.current_status();
        if status != JobStatus::Pending {
            return Ok(status);
        }

        let healthy = self.health() == Some(HealthStatus::Good);
        let todos = self.base.sub_jobs(TODO_PREFIX);
        let mut open = self.base.sub_jobs(PENDING_PREFIX).len();

        if !todos.is_empty() {
            if healthy {
                let mut trx = Transaction::new();
                for id in &todos {
                    let path = self.base.path(&format!("{}{}", TODO_PREFIX, id));
                    trx.delete(&path).expect_present(&path);
                }
                if let Err(e) = self.base.agency().write(&trx)?.ensure_accepted() {
                    tracing::warn!(
                        job_id = %self.base.job_id,
                        server = %self.server,
                        "Could not delete sub-jobs of recovered server"
                    );
                    return Err(e);
                }
                tracing::info!(
                    job_id = %self.base.job_id,
                    server = %self.server,
                    deleted = todos.len(),
                    "Server healthy again, dropped sub-jobs that never started"
                );
            } else {
                open += todos.len();
            }
        }

        if open > 0 {
            return Ok(JobStatus::Pending);
        }

        let failed = self.base.sub_jobs(FAILED_PREFIX);
        if failed.is_empty() {
            self.finish(true, None)?;
        } else {
            let reason = format!("sub-jobs failed: {}", failed.join(", "));
            self.finish(false, Some(&reason))?;
        }
        Ok(self.base.current_status())
    }

    fn create(&mut self, envelope: Option<&mut Transaction>) -> Result<bool> {
        tracing::debug!(job_id = %self.base.job_id, server = %self.server, "Todo: handle failover for server");

        let health = match self.health() {
            Some(health) if health.is_unhealthy() => health,
            _ => {
                tracing::debug!(server = %self.server, "Server not unhealthy, nothing to fail over");
                return Ok(false);
            }
        };

        let record = json!({
            "type": FAILED_SERVER,
            "server": self.server,
            "jobId": self.base.job_id,
            "creator": self.base.creator,
            "timeCreated": timestamp(),
        });

        let failed_servers = self.base.path(FAILED_SERVERS_PREFIX);
        let mut trx = Transaction::new();
        trx.set(&format!("{}/{}", failed_servers, self.server), json!([]))
            .expect_old(&self.base.path(&self.health_path()), json!(health.as_str()));
        match self.base.snapshot().lookup(FAILED_SERVERS_PREFIX) {
            Some(current) => trx.expect_old(&failed_servers, current.clone()),
            None => trx.expect_empty(&failed_servers),
        };

        self.base.commit_create(record, trx, envelope)
    }

    fn start(&mut self, rng: &mut dyn RngCore) -> Result<bool> {
        tracing::info!(job_id = %self.base.job_id, server = %self.server, "Start FailedServer job");

        let todo = self.base.todo_record()?;
        let (mut trx, pending) = self.base.pending_transaction(todo);
        let block = self.base.path(&self.blocker().path());
        trx.set(&block, json!({"jobId": self.base.job_id}))
            .expect_empty(&block);

        if !self.base.commit_start(&trx, pending)? {
            return Ok(false);
        }
        tracing::debug!(job_id = %self.base.job_id, server = %self.server, "Pending job for failed server");

        let spawned = self.spawn_sub_jobs(rng)?;
        tracing::info!(job_id = %self.base.job_id, server = %self.server, sub_jobs = spawned, "Failover fanned out");
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

        let ctx = self.base.ctx();
        for prefix in [TODO_PREFIX, PENDING_PREFIX] {
            for id in self.base.sub_jobs(prefix) {
                let aborted = AnyJob::load(ctx, id)
                    .and_then(|child| child.map_or(Ok(false), |mut child| child.job().abort()));
                match aborted {
                    Ok(_) => {}
                    Err(e) if e.is_retryable() => return Err(e),
                    Err(e) => {
                        tracing::warn!(
                            job_id = %self.base.job_id,
                            sub_job = %id,
                            error = %e,
                            "Skipping unreadable sub-job"
                        );
                    }
                }
            }
        }
        self.finish(false, Some("aborted"))
    }
}
