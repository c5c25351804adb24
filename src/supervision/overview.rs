use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::agency::Snapshot;
use crate::supervision::job::{
    JobStatus, BLOCKED_SERVERS_PREFIX, BLOCKED_SHARDS_PREFIX, FAILED_SERVERS_PREFIX, HEALTH_PREFIX,
    PLANNED_SERVERS_PREFIX,
};

/// One job record as shown to operators.
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: JobStatus,
    pub job_type: String,
    /// Target server, or the failed server a sub-job reacts to
    pub server: Option<String>,
    pub shard: Option<String>,
    pub creator: Option<String>,
    pub reason: Option<String>,
    /// Seconds since the job entered its current state. A large value on a
    /// pending job marks it as stuck.
    pub age_secs: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerSummary {
    pub server: String,
    pub health: Option<String>,
    pub failed: bool,
    /// Job currently blocking the server
    pub blocked_by: Option<String>,
}

fn field(record: &Value, name: &str) -> Option<String> {
    record.get(name).and_then(Value::as_str).map(str::to_string)
}

fn seconds_since(record: &Value, stamp: &str, now: DateTime<Utc>) -> Option<i64> {
    let stamp = record.get(stamp)?.as_str()?;
    let at = DateTime::parse_from_rfc3339(stamp).ok()?;
    Some((now - at.with_timezone(&Utc)).num_seconds())
}

/// Every job record under `Target`, in lifecycle order, then by id.
pub fn list_jobs(snapshot: &Snapshot, now: DateTime<Utc>) -> Vec<JobSummary> {
    let mut jobs = Vec::new();
    for status in [
        JobStatus::ToDo,
        JobStatus::Pending,
        JobStatus::Finished,
        JobStatus::Failed,
    ] {
        let Some(prefix) = status.prefix() else {
            continue;
        };
        let Some(records) = snapshot.lookup(prefix).and_then(Value::as_object) else {
            continue;
        };
        let stamp = match status {
            JobStatus::ToDo => "timeCreated",
            JobStatus::Pending => "timeStarted",
            _ => "timeFinished",
        };
        for (job_id, record) in records {
            jobs.push(JobSummary {
                job_id: job_id.clone(),
                status,
                job_type: field(record, "type").unwrap_or_else(|| "unknown".to_string()),
                server: field(record, "server").or_else(|| field(record, "fromServer")),
                shard: field(record, "shard"),
                creator: field(record, "creator"),
                reason: field(record, "reason"),
                age_secs: seconds_since(record, stamp, now),
            });
        }
    }
    jobs
}

/// Servers known from health reports and the plan, with their failover state.
pub fn list_servers(snapshot: &Snapshot) -> Vec<ServerSummary> {
    let mut names: Vec<&str> = snapshot.child_keys(HEALTH_PREFIX.trim_end_matches('/'));
    names.extend(snapshot.child_keys(PLANNED_SERVERS_PREFIX));
    names.extend(snapshot.child_keys(FAILED_SERVERS_PREFIX));
    names.sort_unstable();
    names.dedup();

    names
        .into_iter()
        .map(|server| ServerSummary {
            server: server.to_string(),
            health: snapshot
                .lookup(&format!("{}{}/Status", HEALTH_PREFIX, server))
                .and_then(Value::as_str)
                .map(str::to_string),
            failed: snapshot.exists(&format!("{}/{}", FAILED_SERVERS_PREFIX, server)),
            blocked_by: snapshot
                .lookup(&format!("{}{}/jobId", BLOCKED_SERVERS_PREFIX, server))
                .and_then(Value::as_str)
                .map(str::to_string),
        })
        .collect()
}

/// Shard name to the job holding it.
pub fn blocked_shards(snapshot: &Snapshot) -> Vec<(String, String)> {
    snapshot
        .child_keys(BLOCKED_SHARDS_PREFIX.trim_end_matches('/'))
        .into_iter()
        .map(|shard| {
            let job = snapshot
                .lookup(&format!("{}{}/jobId", BLOCKED_SHARDS_PREFIX, shard))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            (shard.to_string(), job)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot() -> Snapshot {
        Snapshot::new(json!({
            "Supervision": {"Health": {"A": {"Status": "BAD"}, "B": {"Status": "GOOD"}}},
            "Plan": {"DBServers": {"A": "none", "B": "none", "C": "none"}},
            "Target": {
                "FailedServers": {"A": []},
                "BlockedServers": {"A": {"jobId": "1"}},
                "BlockedShards": {"s1": {"jobId": "1-0"}},
                "Pending": {
                    "1": {"type": "failedServer", "server": "A",
                          "timeStarted": "2026-01-01T00:00:00Z"}
                },
                "Failed": {
                    "1-0": {"type": "failedLeader", "fromServer": "A", "shard": "s1",
                            "reason": "aborted", "timeFinished": "2026-01-01T00:01:00Z"}
                }
            }
        }))
    }

    #[test]
    fn test_list_jobs_with_age() {
        let now = DateTime::parse_from_rfc3339("2026-01-01T00:10:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let jobs = list_jobs(&snapshot(), now);
        assert_eq!(jobs.len(), 2);

        assert_eq!(jobs[0].job_id, "1");
        assert_eq!(jobs[0].status, JobStatus::Pending);
        assert_eq!(jobs[0].age_secs, Some(600));

        assert_eq!(jobs[1].status, JobStatus::Failed);
        assert_eq!(jobs[1].server.as_deref(), Some("A"));
        assert_eq!(jobs[1].reason.as_deref(), Some("aborted"));
        assert_eq!(jobs[1].age_secs, Some(540));
    }

    #[test]
    fn test_list_servers() {
        let servers = list_servers(&snapshot());
        let names: Vec<&str> = servers.iter().map(|s| s.server.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);

        assert!(servers[0].failed);
        assert_eq!(servers[0].blocked_by.as_deref(), Some("1"));
        assert_eq!(servers[1].health.as_deref(), Some("GOOD"));
        assert!(servers[2].health.is_none());
    }

    #[test]
    fn test_blocked_shards() {
        assert_eq!(
            blocked_shards(&snapshot()),
            vec![("s1".to_string(), "1-0".to_string())]
        );
    }
}
