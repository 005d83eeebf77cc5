use chrono::{DateTime, Utc};

use conductor_types::{BashCommandRecord, FileOperationRecord, Session, ToolExecution};

use crate::error::{Error, Result};
use crate::time::parse_time_range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTypeFilter {
    Tool,
    Bash,
    File,
}

impl EventTypeFilter {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "tool" => Ok(EventTypeFilter::Tool),
            "bash" => Ok(EventTypeFilter::Bash),
            "file" => Ok(EventTypeFilter::File),
            other => Err(Error::InvalidEventType(other.to_string())),
        }
    }
}

/// Session-and-event filter. Every active dimension is AND-ed together;
/// `search` is a case-insensitive substring match against domain-appropriate
/// fields, and time bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    pub search: String,
    pub event_type: Option<EventTypeFilter>,
    pub errors_only: bool,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl SessionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn event_type(mut self, raw: &str) -> Result<Self> {
        self.event_type = Some(EventTypeFilter::parse(raw)?);
        Ok(self)
    }

    pub fn errors_only(mut self, errors_only: bool) -> Self {
        self.errors_only = errors_only;
        self
    }

    pub fn since(mut self, raw: &str) -> Result<Self> {
        self.since = parse_time_range(raw)?;
        Ok(self)
    }

    pub fn until(mut self, raw: &str) -> Result<Self> {
        self.until = parse_time_range(raw)?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(since), Some(until)) = (self.since, self.until) {
            if since > until {
                return Err(Error::SinceAfterUntil);
            }
        }
        Ok(())
    }

    fn in_time_range(&self, timestamp: DateTime<Utc>) -> bool {
        if let Some(since) = self.since {
            if timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if timestamp > until {
                return false;
            }
        }
        true
    }

    fn search_matches(&self, haystacks: &[&str]) -> bool {
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        haystacks.iter().any(|h| h.to_lowercase().contains(&needle))
    }

    pub fn matches_session(&self, session: &Session) -> bool {
        if !self.in_time_range(session.timestamp) {
            return false;
        }
        if self.errors_only && session.error_count == 0 {
            return false;
        }
        self.search_matches(&[
            session.project.as_str(),
            session.agent_name.as_deref().unwrap_or(""),
            session.status.as_str(),
            session.id.as_str(),
        ])
    }

    pub fn matches_tool(&self, exec: &ToolExecution) -> bool {
        if matches!(self.event_type, Some(t) if t != EventTypeFilter::Tool) {
            return false;
        }
        if self.errors_only && exec.total_errors == 0 {
            return false;
        }
        self.search_matches(&[exec.name.as_str()])
    }

    pub fn matches_bash(&self, cmd: &BashCommandRecord) -> bool {
        if matches!(self.event_type, Some(t) if t != EventTypeFilter::Bash) {
            return false;
        }
        if self.errors_only && cmd.success {
            return false;
        }
        self.search_matches(&[cmd.command.as_str()])
    }

    /// File operations carry no failure indicator, so `errorsOnly` excludes
    /// them entirely — there is nothing for it to select.
    pub fn matches_file(&self, op: &FileOperationRecord) -> bool {
        if matches!(self.event_type, Some(t) if t != EventTypeFilter::File) {
            return false;
        }
        if self.errors_only {
            return false;
        }
        self.search_matches(&[op.path.as_str(), op.operation.as_str()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn session() -> Session {
        Session {
            id: "abc123".to_string(),
            project: "conductor".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
            status: "completed".to_string(),
            agent_name: Some("claude-code".to_string()),
            duration_ms: 1000,
            success: true,
            error_count: 0,
        }
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let filter = SessionFilter::new().search("CLAUDE");
        assert!(filter.matches_session(&session()));
        let filter = SessionFilter::new().search("nonexistent");
        assert!(!filter.matches_session(&session()));
    }

    #[test]
    fn errors_only_excludes_clean_sessions() {
        let filter = SessionFilter::new().errors_only(true);
        assert!(!filter.matches_session(&session()));
    }

    #[test]
    fn time_range_is_inclusive() {
        let mut filter = SessionFilter::new();
        filter.since = Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
        filter.until = Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
        assert!(filter.matches_session(&session()));
    }

    #[test]
    fn since_after_until_fails_validation() {
        let filter = SessionFilter {
            since: Some(Utc.with_ymd_and_hms(2024, 1, 16, 0, 0, 0).unwrap()),
            until: Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        assert!(matches!(filter.validate(), Err(Error::SinceAfterUntil)));
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        assert!(SessionFilter::new().event_type("network").is_err());
    }

    #[test]
    fn errors_only_never_matches_file_operations() {
        let filter = SessionFilter::new().errors_only(true);
        let op = FileOperationRecord {
            operation: "read".to_string(),
            path: "/tmp/a".to_string(),
            size_bytes: 10,
        };
        assert!(!filter.matches_file(&op));
    }
}
