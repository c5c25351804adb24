use chrono::{SecondsFormat, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::agency::snapshot::join;
use crate::agency::{Agency, Snapshot, Transaction};
use crate::error::{Result, SupervisionError};

pub const TODO_PREFIX: &str = "/Target/ToDo/";
pub const PENDING_PREFIX: &str = "/Target/Pending/";
pub const FINISHED_PREFIX: &str = "/Target/Finished/";
pub const FAILED_PREFIX: &str = "/Target/Failed/";
pub const BLOCKED_SERVERS_PREFIX: &str = "/Target/BlockedServers/";
pub const BLOCKED_SHARDS_PREFIX: &str = "/Target/BlockedShards/";
pub const FAILED_SERVERS_PREFIX: &str = "/Target/FailedServers";
pub const CLEANED_SERVERS_PREFIX: &str = "/Target/CleanedServers";
pub const HEALTH_PREFIX: &str = "/Supervision/Health/";
pub const PLANNED_SERVERS_PREFIX: &str = "/Plan/DBServers";
pub const PLAN_COLLECTIONS_PREFIX: &str = "/Plan/Collections";
pub const CURRENT_COLLECTIONS_PREFIX: &str = "/Current/Collections";

pub const FAILED_SERVER: &str = "failedServer";
pub const FAILED_LEADER: &str = "failedLeader";
pub const FAILED_FOLLOWER: &str = "failedFollower";
pub const UNASSUMED_LEADERSHIP: &str = "unassumedLeadership";

/// Lifecycle position of a job, derived from where its record lives.
///
/// `NotFound → ToDo → Pending → {Finished | Failed}`. Records only ever move
/// forward: every transition is one transaction that requires the source
/// record to still exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    NotFound,
    ToDo,
    Pending,
    Finished,
    Failed,
}

impl JobStatus {
    /// Prefix of the record location for this state
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            JobStatus::NotFound => None,
            JobStatus::ToDo => Some(TODO_PREFIX),
            JobStatus::Pending => Some(PENDING_PREFIX),
            JobStatus::Finished => Some(FINISHED_PREFIX),
            JobStatus::Failed => Some(FAILED_PREFIX),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, JobStatus::ToDo | JobStatus::Pending)
    }

    /// Position in the lifecycle; both terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            JobStatus::NotFound => 0,
            JobStatus::ToDo => 1,
            JobStatus::Pending => 2,
            JobStatus::Finished | JobStatus::Failed => 3,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::NotFound => write!(f, "notfound"),
            JobStatus::ToDo => write!(f, "todo"),
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Finished => write!(f, "finished"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Exclusive claim a job holds while pending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blocker {
    Server(String),
    Shard(String),
}

impl Blocker {
    /// Path relative to the agency prefix
    pub fn path(&self) -> String {
        match self {
            Blocker::Server(server) => format!("{}{}", BLOCKED_SERVERS_PREFIX, server),
            Blocker::Shard(shard) => format!("{}{}", BLOCKED_SHARDS_PREFIX, shard),
        }
    }
}

/// A shard addressed by database, collection and shard name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRef {
    pub database: String,
    pub collection: String,
    pub shard: String,
}

impl ShardRef {
    pub fn new(database: &str, collection: &str, shard: &str) -> Self {
        Self {
            database: database.to_string(),
            collection: collection.to_string(),
            shard: shard.to_string(),
        }
    }

    /// Planned server list of the shard
    pub fn plan_path(&self) -> String {
        format!(
            "{}/{}/{}/shards/{}",
            PLAN_COLLECTIONS_PREFIX, self.database, self.collection, self.shard
        )
    }

    /// Servers reporting the shard as in sync
    pub fn current_servers_path(&self) -> String {
        format!(
            "{}/{}/{}/{}/servers",
            CURRENT_COLLECTIONS_PREFIX, self.database, self.collection, self.shard
        )
    }

    pub fn from_record(record: &Value) -> Result<Self> {
        Ok(Self {
            database: record_str(record, "database")?,
            collection: record_str(record, "collection")?,
            shard: record_str(record, "shard")?,
        })
    }
}

impl std::fmt::Display for ShardRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.database, self.collection, self.shard)
    }
}

/// Timestamp format used for `timeCreated`, `timeStarted` and `timeFinished`.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Id of the `n`th sub-job spawned by `parent`.
pub fn sub_job_id(parent: &str, n: usize) -> String {
    format!("{}-{}", parent, n)
}

/// String field of a job record.
pub fn record_str(record: &Value, field: &'static str) -> Result<String> {
    record
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| SupervisionError::malformed(format!("job record field {}", field), "string"))
}

/// Everything a job touches during one tick: the snapshot it decides on,
/// the store it writes to, and the prefix all store paths live under.
#[derive(Clone, Copy)]
pub struct JobContext<'a> {
    pub snapshot: &'a Snapshot,
    pub agency: &'a dyn Agency,
    pub prefix: &'a str,
}

impl<'a> JobContext<'a> {
    pub fn new(snapshot: &'a Snapshot, agency: &'a dyn Agency, prefix: &'a str) -> Self {
        Self {
            snapshot,
            agency,
            prefix,
        }
    }
}

/// State and record plumbing shared by every job kind.
///
/// The snapshot is read-only and may lag behind what this instance has
/// written during the same tick; `local` remembers the last record this
/// instance wrote so later steps of the same tick build on it.
pub struct JobBase<'a> {
    ctx: JobContext<'a>,
    pub job_id: String,
    pub creator: String,
    local: Option<(JobStatus, Value)>,
}

impl<'a> JobBase<'a> {
    pub fn new(ctx: JobContext<'a>, job_id: &str, creator: &str) -> Self {
        Self {
            ctx,
            job_id: job_id.to_string(),
            creator: creator.to_string(),
            local: None,
        }
    }

    pub fn ctx(&self) -> JobContext<'a> {
        self.ctx
    }

    pub fn snapshot(&self) -> &'a Snapshot {
        self.ctx.snapshot
    }

    pub fn agency(&self) -> &'a dyn Agency {
        self.ctx.agency
    }

    /// Absolute store path for a snapshot-relative path.
    pub fn path(&self, relative: &str) -> String {
        join(self.ctx.prefix, relative)
    }

    /// Snapshot-relative path of this job's record under `prefix`.
    pub fn record_path(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.job_id)
    }

    /// Where the record lives according to the snapshot: ToDo, Pending,
    /// Finished, Failed, checked in that order.
    pub fn exists(&self) -> JobStatus {
        [
            JobStatus::ToDo,
            JobStatus::Pending,
            JobStatus::Finished,
            JobStatus::Failed,
        ]
        .into_iter()
        .find(|status| {
            status
                .prefix()
                .is_some_and(|prefix| self.snapshot().exists(&self.record_path(prefix)))
        })
        .unwrap_or(JobStatus::NotFound)
    }

    /// Status including transitions this instance made during the tick.
    pub fn current_status(&self) -> JobStatus {
        match &self.local {
            Some((status, _)) => *status,
            None => self.exists(),
        }
    }

    /// The record for `status`, from the snapshot.
    pub fn record(&self, status: JobStatus) -> Option<&'a Value> {
        let prefix = status.prefix()?;
        self.snapshot().lookup(&self.record_path(prefix))
    }

    /// The ToDo record, from the snapshot or from this tick's `create`.
    pub fn todo_record(&self) -> Result<Map<String, Value>> {
        let record = match &self.local {
            Some((JobStatus::ToDo, record)) => Some(record),
            _ => self.record(JobStatus::ToDo),
        };
        let record = record.ok_or_else(|| {
            SupervisionError::NotFound(self.path(&self.record_path(TODO_PREFIX)))
        })?;
        record
            .as_object()
            .cloned()
            .ok_or_else(|| SupervisionError::malformed(self.record_path(TODO_PREFIX), "object"))
    }

    /// The Pending record, preferring the one this instance just wrote.
    pub fn pending_record(&self) -> Option<&Value> {
        match &self.local {
            Some((JobStatus::Pending, record)) => Some(record),
            Some(_) => None,
            None => self.record(JobStatus::Pending),
        }
    }

    /// Preconditions that keep a job from being created twice.
    pub fn unique_guard(&self) -> Transaction {
        let mut trx = Transaction::new();
        trx.expect_empty(&self.path(&self.record_path(TODO_PREFIX)))
            .expect_empty(&self.path(&self.record_path(PENDING_PREFIX)));
        trx
    }

    /// Writes (or stages into `envelope`) the ToDo record.
    ///
    /// `trx` must already hold the job's own preconditions; the ToDo write
    /// is added here.
    pub fn commit_create(
        &mut self,
        record: Value,
        mut trx: Transaction,
        envelope: Option<&mut Transaction>,
    ) -> Result<bool> {
        let todo = self.path(&self.record_path(TODO_PREFIX));
        trx.set(&todo, record.clone());

        if let Some(envelope) = envelope {
            envelope.merge(&trx);
            self.local = Some((JobStatus::ToDo, record));
            return Ok(true);
        }

        if !self.agency().write(&trx)?.successful() {
            tracing::info!(job_id = %self.job_id, "Failed to insert job");
            return Ok(false);
        }
        tracing::debug!(job_id = %self.job_id, "Job created");
        self.local = Some((JobStatus::ToDo, record));
        Ok(true)
    }

    /// Transaction moving `todo` to Pending, stamped with `timeStarted`.
    /// Requires the ToDo record to still exist.
    pub fn pending_transaction(&self, mut todo: Map<String, Value>) -> (Transaction, Value) {
        todo.insert("timeStarted".into(), json!(timestamp()));
        let pending = Value::Object(todo);

        let todo_path = self.path(&self.record_path(TODO_PREFIX));
        let mut trx = Transaction::new();
        trx.set(&self.path(&self.record_path(PENDING_PREFIX)), pending.clone())
            .delete(&todo_path)
            .expect_present(&todo_path);
        (trx, pending)
    }

    /// Submits a start transaction built from [`Self::pending_transaction`].
    pub fn commit_start(&mut self, trx: &Transaction, pending: Value) -> Result<bool> {
        if !self.agency().write(trx)?.successful() {
            tracing::info!(job_id = %self.job_id, "Precondition failed for starting job");
            return Ok(false);
        }
        self.local = Some((JobStatus::Pending, pending));
        Ok(true)
    }

    /// Moves the record to Finished or Failed and, if the job was pending,
    /// releases `blocker`, all in one transaction.
    pub fn finish(&mut self, blocker: &Blocker, success: bool, reason: Option<&str>) -> Result<bool> {
        let (source, record) = match &self.local {
            Some((status, record)) if status.is_in_flight() => (*status, record.clone()),
            Some(_) => return Ok(false),
            None => match (self.record(JobStatus::Pending), self.record(JobStatus::ToDo)) {
                (Some(record), _) => (JobStatus::Pending, record.clone()),
                (None, Some(record)) => (JobStatus::ToDo, record.clone()),
                (None, None) => {
                    tracing::debug!(job_id = %self.job_id, "Nothing in pending to finish up");
                    return Ok(false);
                }
            },
        };

        let mut finished = record.as_object().cloned().unwrap_or_default();
        finished.insert("timeFinished".into(), json!(timestamp()));
        if let Some(reason) = reason {
            finished.insert("reason".into(), json!(reason));
        }
        let finished = Value::Object(finished);

        let target = if success {
            FINISHED_PREFIX
        } else {
            FAILED_PREFIX
        };
        let source_prefix = source.prefix().unwrap_or(TODO_PREFIX);

        let mut trx = Transaction::new();
        trx.set(&self.path(&self.record_path(target)), finished.clone())
            .delete(&self.path(&self.record_path(PENDING_PREFIX)))
            .delete(&self.path(&self.record_path(TODO_PREFIX)))
            .expect_present(&self.path(&self.record_path(source_prefix)));
        // Only a pending job holds its block
        if source == JobStatus::Pending {
            trx.delete(&self.path(&blocker.path()));
        }

        if !self.agency().write(&trx)?.successful() {
            tracing::debug!(job_id = %self.job_id, "Finishing job was rejected");
            return Ok(false);
        }

        let status = if success {
            JobStatus::Finished
        } else {
            JobStatus::Failed
        };
        tracing::info!(job_id = %self.job_id, status = %status, reason = reason.unwrap_or(""), "Successfully finished job");
        self.local = Some((status, finished));
        Ok(true)
    }

    /// Known servers: `Plan/DBServers` minus `Target/CleanedServers`.
    pub fn available_servers(&self) -> Vec<String> {
        let snapshot = self.snapshot();
        let cleaned: Vec<&str> = snapshot
            .lookup(CLEANED_SERVERS_PREFIX)
            .and_then(Value::as_array)
            .map(|servers| servers.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        snapshot
            .child_keys(PLANNED_SERVERS_PREFIX)
            .into_iter()
            .filter(|server| !cleaned.contains(server))
            .map(str::to_string)
            .collect()
    }

    /// Planned server list of a shard; `None` if the shard is no longer planned.
    pub fn planned_servers(&self, shard: &ShardRef) -> Result<Option<Vec<String>>> {
        let path = shard.plan_path();
        let Some(list) = self.snapshot().lookup(&path) else {
            return Ok(None);
        };
        server_list(list, &path).map(Some)
    }

    /// Servers currently reporting the shard, empty if none.
    pub fn current_servers(&self, shard: &ShardRef) -> Result<Vec<String>> {
        let path = shard.current_servers_path();
        match self.snapshot().lookup(&path) {
            Some(list) => server_list(list, &path),
            None => Ok(Vec::new()),
        }
    }

    /// Ids of jobs under `prefix` that are sub-jobs of this one.
    pub fn sub_jobs(&self, prefix: &str) -> Vec<&'a str> {
        let child_prefix = format!("{}-", self.job_id);
        self.snapshot()
            .child_keys(prefix.trim_end_matches('/'))
            .into_iter()
            .filter(|id| id.starts_with(&child_prefix))
            .collect()
    }
}

fn server_list(list: &Value, path: &str) -> Result<Vec<String>> {
    list.as_array()
        .and_then(|servers| {
            servers
                .iter()
                .map(|s| s.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
        })
        .ok_or_else(|| SupervisionError::malformed(path, "array of server ids"))
}

/// Contract shared by every supervision job.
///
/// A job is rebuilt from the store on every tick and decides everything from
/// its snapshot; each step is one preconditioned transaction, so concurrent
/// or repeated ticks cannot apply the same step twice.
pub trait SupervisionJob<'a> {
    fn base(&self) -> &JobBase<'a>;

    fn job_type(&self) -> &'static str;

    /// Where the job stands. May finish a pending job whose work is done.
    fn status(&mut self) -> Result<JobStatus>;

    /// Writes the ToDo record, or stages it into `envelope`. `false` means
    /// the triggering condition no longer holds.
    fn create(&mut self, envelope: Option<&mut Transaction>) -> Result<bool>;

    /// Moves ToDo to Pending. `false` means a precondition failed; the job
    /// stays in ToDo for the next tick.
    fn start(&mut self, rng: &mut dyn RngCore) -> Result<bool>;

    /// Moves the record to Finished or Failed and releases its block.
    fn finish(&mut self, success: bool, reason: Option<&str>) -> Result<bool>;

    /// Fails an in-flight job with reason `aborted`.
    fn abort(&mut self) -> Result<bool>;

    fn job_id<'s>(&'s self) -> &'s str
    where
        'a: 's,
    {
        &self.base().job_id
    }

    /// Status dispatch for one tick without the error boundary.
    fn advance(&mut self, rng: &mut dyn RngCore) -> Result<JobStatus> {
        match self.status()? {
            JobStatus::NotFound => {
                if self.create(None)? {
                    self.start(rng)?;
                }
            }
            JobStatus::ToDo => {
                self.start(rng)?;
            }
            status => return Ok(status),
        }
        Ok(self.base().current_status())
    }

    /// One supervision tick. Never fails: soft errors leave the job for the
    /// next tick, anything else fails the job with the error as reason.
    fn run(&mut self, rng: &mut dyn RngCore) -> JobStatus {
        match self.advance(rng) {
            Ok(status) => status,
            Err(e) if e.is_retryable() => {
                tracing::debug!(job_id = %self.job_id(), error = %e, "Job deferred to next tick");
                self.base().current_status()
            }
            Err(e) => {
                tracing::warn!(
                    job_id = %self.job_id(),
                    job_type = self.job_type(),
                    error = %e,
                    "Job failed unexpectedly"
                );
                let reason = e.to_string();
                match self.finish(false, Some(&reason)) {
                    Ok(true) => JobStatus::Failed,
                    Ok(false) => self.base().current_status(),
                    Err(err) => {
                        tracing::warn!(job_id = %self.job_id(), error = %err, "Could not record job failure");
                        self.base().current_status()
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agency::InMemoryAgency;

    const PREFIX: &str = "/arango";

    fn fixture() -> InMemoryAgency {
        InMemoryAgency::with_tree(json!({
            "arango": {
                "Plan": {
                    "DBServers": {"A": "none", "B": "none", "C": "none"}
                },
                "Target": {
                    "CleanedServers": ["C"],
                    "ToDo": {
                        "7": {"type": "failedServer", "server": "A", "jobId": "7"},
                        "7-0": {"type": "failedLeader", "jobId": "7-0"}
                    },
                    "Pending": {
                        "8": {"type": "failedServer", "server": "B", "jobId": "8"},
                        "7-1": {"type": "failedFollower", "jobId": "7-1"}
                    },
                    "BlockedServers": {"B": {"jobId": "8"}}
                }
            }
        }))
    }

    #[test]
    fn test_status_display_and_rank() {
        assert_eq!(JobStatus::ToDo.to_string(), "todo");
        assert_eq!(JobStatus::NotFound.to_string(), "notfound");
        assert!(JobStatus::Pending.rank() < JobStatus::Failed.rank());
        assert_eq!(JobStatus::Finished.rank(), JobStatus::Failed.rank());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::ToDo.is_in_flight());
    }

    #[test]
    fn test_sub_job_id() {
        assert_eq!(sub_job_id("42", 0), "42-0");
        assert_eq!(sub_job_id("42", 11), "42-11");
    }

    #[test]
    fn test_exists_checks_all_prefixes() {
        let agency = fixture();
        let snap = agency.read(PREFIX).unwrap();
        let ctx = JobContext::new(&snap, &agency, PREFIX);

        assert_eq!(JobBase::new(ctx, "7", "test").exists(), JobStatus::ToDo);
        assert_eq!(JobBase::new(ctx, "8", "test").exists(), JobStatus::Pending);
        assert_eq!(JobBase::new(ctx, "9", "test").exists(), JobStatus::NotFound);
    }

    #[test]
    fn test_available_servers_excludes_cleaned() {
        let agency = fixture();
        let snap = agency.read(PREFIX).unwrap();
        let base = JobBase::new(JobContext::new(&snap, &agency, PREFIX), "7", "test");
        assert_eq!(base.available_servers(), vec!["A", "B"]);
    }

    #[test]
    fn test_sub_jobs_match_prefix_only() {
        let agency = fixture();
        let snap = agency.read(PREFIX).unwrap();
        let base = JobBase::new(JobContext::new(&snap, &agency, PREFIX), "7", "test");
        assert_eq!(base.sub_jobs(TODO_PREFIX), vec!["7-0"]);
        assert_eq!(base.sub_jobs(PENDING_PREFIX), vec!["7-1"]);
        assert!(base.sub_jobs(FAILED_PREFIX).is_empty());
    }

    #[test]
    fn test_finish_pending_releases_block() {
        let agency = fixture();
        let snap = agency.read(PREFIX).unwrap();
        let mut base = JobBase::new(JobContext::new(&snap, &agency, PREFIX), "8", "test");

        assert!(base
            .finish(&Blocker::Server("B".into()), true, None)
            .unwrap());
        assert_eq!(base.current_status(), JobStatus::Finished);

        let after = agency.read(PREFIX).unwrap();
        assert!(!after.exists("/Target/Pending/8"));
        assert!(!after.exists("/Target/BlockedServers/B"));
        assert_eq!(after.get_str("/Target/Finished/8/server").unwrap(), "B");
        assert!(after.exists("/Target/Finished/8/timeFinished"));

        // Second finish from the same instance is a no-op
        assert!(!base
            .finish(&Blocker::Server("B".into()), true, None)
            .unwrap());
    }

    #[test]
    fn test_finish_from_todo_keeps_foreign_block() {
        let agency = fixture();
        let snap = agency.read(PREFIX).unwrap();
        let mut base = JobBase::new(JobContext::new(&snap, &agency, PREFIX), "7", "test");

        assert!(base
            .finish(&Blocker::Server("B".into()), false, Some("boom"))
            .unwrap());

        let after = agency.read(PREFIX).unwrap();
        assert!(!after.exists("/Target/ToDo/7"));
        assert_eq!(after.get_str("/Target/Failed/7/reason").unwrap(), "boom");
        assert_eq!(after.get_str("/Target/BlockedServers/B/jobId").unwrap(), "8");
    }

    #[test]
    fn test_finish_with_stale_snapshot_is_rejected() {
        let agency = fixture();
        let snap = agency.read(PREFIX).unwrap();

        let mut first = JobBase::new(JobContext::new(&snap, &agency, PREFIX), "8", "a");
        let mut second = JobBase::new(JobContext::new(&snap, &agency, PREFIX), "8", "b");
        assert!(first.finish(&Blocker::Server("B".into()), true, None).unwrap());
        assert!(!second.finish(&Blocker::Server("B".into()), false, None).unwrap());

        let after = agency.read(PREFIX).unwrap();
        assert!(after.exists("/Target/Finished/8"));
        assert!(!after.exists("/Target/Failed/8"));
    }

    #[test]
    fn test_pending_transaction_requires_todo() {
        let agency = fixture();
        let snap = agency.read(PREFIX).unwrap();
        let mut base = JobBase::new(JobContext::new(&snap, &agency, PREFIX), "7", "test");

        let todo = base.todo_record().unwrap();
        let (trx, pending) = base.pending_transaction(todo.clone());
        assert!(base.commit_start(&trx, pending).unwrap());
        assert_eq!(base.current_status(), JobStatus::Pending);

        // Replaying the same start finds no ToDo record any more
        let mut again = JobBase::new(JobContext::new(&snap, &agency, PREFIX), "7", "test");
        let (trx, pending) = again.pending_transaction(todo);
        assert!(!again.commit_start(&trx, pending).unwrap());
    }

    #[test]
    fn test_planned_and_current_servers() {
        let agency = InMemoryAgency::with_tree(json!({
            "Plan": {"Collections": {"db": {"c": {"shards": {"s1": ["A", "B"], "s2": [1]}}}}},
            "Current": {"Collections": {"db": {"c": {"s1": {"servers": ["A"]}}}}}
        }));
        let snap = agency.read("/").unwrap();
        let base = JobBase::new(JobContext::new(&snap, &agency, "/"), "1", "test");

        let s1 = ShardRef::new("db", "c", "s1");
        assert_eq!(base.planned_servers(&s1).unwrap(), Some(vec!["A".into(), "B".into()]));
        assert_eq!(base.current_servers(&s1).unwrap(), vec!["A".to_string()]);

        let s2 = ShardRef::new("db", "c", "s2");
        assert!(base.planned_servers(&s2).is_err());
        assert!(base.current_servers(&s2).unwrap().is_empty());

        let gone = ShardRef::new("db", "c", "s3");
        assert_eq!(base.planned_servers(&gone).unwrap(), None);
    }
}
