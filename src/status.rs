use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Execution status as reported by the backend.
///
/// The console never moves a node between statuses on its own; the only
/// client-side rewrite is the rerun preparation in [`crate::disabled`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    #[default]
    Ready,
    Disabled,
    Queued,
    Waiting,
    Preparing,
    Running,
    Paused,
    Killing,
    Killed,
    Failed,
    FailedFinishing,
    Succeeded,
    Skipped,
    Unknown,
}

impl Status {
    pub const ALL: [Status; 14] = [
        Status::Ready,
        Status::Disabled,
        Status::Queued,
        Status::Waiting,
        Status::Preparing,
        Status::Running,
        Status::Paused,
        Status::Killing,
        Status::Killed,
        Status::Failed,
        Status::FailedFinishing,
        Status::Succeeded,
        Status::Skipped,
        Status::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ready => "READY",
            Status::Disabled => "DISABLED",
            Status::Queued => "QUEUED",
            Status::Waiting => "WAITING",
            Status::Preparing => "PREPARING",
            Status::Running => "RUNNING",
            Status::Paused => "PAUSED",
            Status::Killing => "KILLING",
            Status::Killed => "KILLED",
            Status::Failed => "FAILED",
            Status::FailedFinishing => "FAILED_FINISHING",
            Status::Succeeded => "SUCCEEDED",
            Status::Skipped => "SKIPPED",
            Status::Unknown => "UNKNOWN",
        }
    }

    pub fn from_name(name: &str) -> Self {
        Status::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(name.trim()))
            .unwrap_or(Status::Unknown)
    }

    /// Numeric codes used by the executor's update endpoint.
    pub fn from_code(code: u64) -> Self {
        match code {
            10 => Status::Ready,
            20 => Status::Preparing,
            30 => Status::Running,
            40 => Status::Paused,
            50 => Status::Succeeded,
            55 => Status::Killing,
            60 => Status::Killed,
            70 => Status::Failed,
            80 => Status::FailedFinishing,
            90 => Status::Skipped,
            100 => Status::Disabled,
            110 => Status::Queued,
            _ => Status::Unknown,
        }
    }

    /// A flow in one of these states produces no further updates.
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Succeeded | Status::Failed | Status::Killed)
    }

    /// Not started yet; the poller checks these more often.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            Status::Unknown | Status::Waiting | Status::Preparing | Status::Queued | Status::Ready
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawStatus {
            Name(String),
            Code(u64),
        }

        Ok(match RawStatus::deserialize(deserializer)? {
            RawStatus::Name(name) => Status::from_name(&name),
            RawStatus::Code(code) => Status::from_code(code),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_names_and_codes() {
        let parsed: Vec<Status> =
            serde_json::from_str(r#"["RUNNING", 50, "failed_finishing", "BOGUS", 999]"#).unwrap();
        assert_eq!(
            parsed,
            vec![
                Status::Running,
                Status::Succeeded,
                Status::FailedFinishing,
                Status::Unknown,
                Status::Unknown
            ]
        );
        assert_eq!(serde_json::to_string(&Status::Killing).unwrap(), "\"KILLING\"");
    }

    #[test]
    fn terminal_and_pending_are_disjoint() {
        for status in Status::ALL {
            assert!(!(status.is_terminal() && status.is_pending()), "{status}");
        }
    }
}
