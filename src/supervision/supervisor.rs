use std::collections::HashSet;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::agency::{Agency, Snapshot, Transaction};
use crate::config::SupervisionConfig;
use crate::error::{Result, SupervisionError};
use crate::supervision::dispatch::AnyJob;
use crate::supervision::failed_server::FailedServerJob;
use crate::supervision::health::HealthStatus;
use crate::supervision::job::{
    JobContext, JobStatus, SupervisionJob, BLOCKED_SERVERS_PREFIX, FAILED_SERVER,
    FAILED_SERVERS_PREFIX, HEALTH_PREFIX, PENDING_PREFIX, TODO_PREFIX,
};

/// Outcome of one job run during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    pub job_id: String,
    pub job_type: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    /// FailedServer jobs created by the health check
    pub created: Vec<String>,
    /// Servers dropped from `Target/FailedServers` after recovering
    pub recovered: Vec<String>,
    pub jobs: Vec<JobOutcome>,
    /// Records that could not be turned into a job
    pub errors: usize,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.created.is_empty() && self.recovered.is_empty() && self.jobs.is_empty() && self.errors == 0
    }
}

/// Drives supervision: turns health reports into FailedServer jobs and
/// ticks every in-flight job.
///
/// Holds no job state between ticks; everything is re-derived from a fresh
/// snapshot, so a restarted supervisor picks up where the last one stopped.
pub struct Supervisor {
    agency: Arc<dyn Agency>,
    config: SupervisionConfig,
    rng: Box<dyn RngCore + Send>,
}

impl Supervisor {
    pub fn new(agency: Arc<dyn Agency>, config: SupervisionConfig) -> Self {
        let rng: Box<dyn RngCore + Send> = match config.rng_seed {
            Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
            None => Box::new(StdRng::from_entropy()),
        };
        Self { agency, config, rng }
    }

    /// Replaces the random source used for follower selection.
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn config(&self) -> &SupervisionConfig {
        &self.config
    }

    pub fn agency(&self) -> &Arc<dyn Agency> {
        &self.agency
    }

    /// One supervision round: health check, then every ToDo and Pending job.
    pub fn tick(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();
        match self.check_health(&mut report) {
            Err(e) if e.is_retryable() => {
                tracing::debug!(error = %e, "Health check deferred to next tick");
            }
            other => other?,
        }
        self.work_jobs(&mut report)?;
        Ok(report)
    }

    /// Runs [`Self::tick`] every `tick_interval_ms` until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval());
        tracing::info!(
            prefix = %self.config.prefix,
            interval_ms = self.config.tick_interval_ms,
            "Supervision started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Supervision stopping");
                    break;
                }
                _ = interval.tick() => {
                    match self.tick() {
                        Ok(report) if !report.is_idle() => {
                            tracing::debug!(
                                created = report.created.len(),
                                recovered = report.recovered.len(),
                                jobs = report.jobs.len(),
                                errors = report.errors,
                                "Supervision tick"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "Supervision tick failed"),
                    }
                }
            }
        }
    }

    fn check_health(&mut self, report: &mut TickReport) -> Result<()> {
        let prefix = self.config.prefix.as_str();
        let agency: &dyn Agency = self.agency.as_ref();
        let snapshot = agency.read(prefix)?;
        let ctx = JobContext::new(&snapshot, agency, prefix);

        let busy = servers_with_failover(&snapshot);
        let failed_servers = snapshot.child_keys(FAILED_SERVERS_PREFIX);

        let mut envelope = Transaction::new();
        let mut created = Vec::new();
        let mut recovered = Vec::new();

        for server in snapshot.child_keys(HEALTH_PREFIX.trim_end_matches('/')) {
            let health = snapshot
                .lookup(&format!("{}{}/Status", HEALTH_PREFIX, server))
                .and_then(Value::as_str)
                .and_then(HealthStatus::parse);

            match health {
                Some(health) if health.is_unhealthy() => {
                    if failed_servers.contains(&server) || busy.contains(server) {
                        continue;
                    }
                    let job_id = Uuid::new_v4().simple().to_string();
                    let mut job = FailedServerJob::new(ctx, &job_id, &self.config.creator, server);
                    if job.create(Some(&mut envelope))? {
                        tracing::info!(job_id = %job_id, server = %server, health = %health, "Server unhealthy, failover scheduled");
                        created.push(job_id);
                    }
                }
                Some(HealthStatus::Good) => {
                    let blocked = snapshot.exists(&format!("{}{}", BLOCKED_SERVERS_PREFIX, server));
                    if failed_servers.contains(&server) && !busy.contains(server) && !blocked {
                        recovered.push(server.to_string());
                    }
                }
                _ => {}
            }
        }

        if !recovered.is_empty() {
            let list = ctx.snapshot.lookup(FAILED_SERVERS_PREFIX).cloned().unwrap_or_default();
            let path = crate::agency::snapshot::join(prefix, FAILED_SERVERS_PREFIX);
            for server in &recovered {
                envelope.delete(&format!("{}/{}", path, server));
            }
            envelope.expect_old(&path, list);
        }

        if envelope.is_empty() {
            return Ok(());
        }
        if !agency.write(&envelope)?.successful() {
            return Err(SupervisionError::StaleCondition(format!(
                "{} changed during health check",
                FAILED_SERVERS_PREFIX
            )));
        }
        for server in &recovered {
            tracing::info!(server = %server, "Server healthy again, removed from failed servers");
        }
        report.created = created;
        report.recovered = recovered;
        Ok(())
    }

    fn work_jobs(&mut self, report: &mut TickReport) -> Result<()> {
        let prefix = self.config.prefix.as_str();
        let agency: &dyn Agency = self.agency.as_ref();
        let snapshot = agency.read(prefix)?;
        let ctx = JobContext::new(&snapshot, agency, prefix);

        for location in [TODO_PREFIX, PENDING_PREFIX] {
            for job_id in snapshot.child_keys(location.trim_end_matches('/')) {
                let Some(record) = snapshot.lookup(&format!("{}{}", location, job_id)) else {
                    continue;
                };
                let mut job = match AnyJob::from_record(ctx, job_id, record) {
                    Ok(job) => job,
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Skipping unreadable job record");
                        report.errors += 1;
                        continue;
                    }
                };
                let job = job.job();
                let status = job.run(&mut *self.rng);
                report.jobs.push(JobOutcome {
                    job_id: job_id.to_string(),
                    job_type: job.job_type().to_string(),
                    status,
                });
            }
        }
        Ok(())
    }
}

/// Aborts the job `job_id` against a fresh snapshot. `false` when the job is
/// unknown or already terminal.
pub fn abort_job(agency: &dyn Agency, prefix: &str, job_id: &str) -> Result<bool> {
    let snapshot = agency.read(prefix)?;
    let ctx = JobContext::new(&snapshot, agency, prefix);
    match AnyJob::load(ctx, job_id)? {
        Some(mut job) => {
            let aborted = job.job().abort()?;
            if aborted {
                tracing::info!(job_id = %job_id, "Job aborted");
            }
            Ok(aborted)
        }
        None => Ok(false),
    }
}

/// Servers targeted by a failedServer job in ToDo or Pending.
fn servers_with_failover(snapshot: &Snapshot) -> HashSet<&str> {
    [TODO_PREFIX, PENDING_PREFIX]
        .into_iter()
        .flat_map(|location| {
            snapshot
                .lookup(location)
                .and_then(Value::as_object)
                .into_iter()
                .flat_map(|jobs| jobs.values())
        })
        .filter(|record| record.get("type").and_then(Value::as_str) == Some(FAILED_SERVER))
        .filter_map(|record| record.get("server").and_then(Value::as_str))
        .collect()
}
