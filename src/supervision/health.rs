use serde::{Deserialize, Serialize};

/// Health classification published by the health monitor under
/// `Supervision/Health/<server>/Status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Good,
    Bad,
    Failed,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Good => "GOOD",
            HealthStatus::Bad => "BAD",
            HealthStatus::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "GOOD" => Some(HealthStatus::Good),
            "BAD" => Some(HealthStatus::Bad),
            "FAILED" => Some(HealthStatus::Failed),
            _ => None,
        }
    }

    /// BAD and FAILED both trigger failover.
    pub fn is_unhealthy(&self) -> bool {
        !matches!(self, HealthStatus::Good)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
