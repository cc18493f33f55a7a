use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "payment_method_enum")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "ONLINE")]
    Online,
    #[sea_orm(string_value = "OFFLINE")]
    Offline,
}

impl PaymentMethod {
    /// Value the router's payment resource uses for this method.
    pub fn router_value(&self) -> &'static str {
        match self {
            PaymentMethod::Online => "online",
            PaymentMethod::Offline => "cash",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text", enum_name = "payment_status_enum")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "PENDING")]
    Pending,
    #[sea_orm(string_value = "COMPLETED")]
    Completed,
    #[sea_orm(string_value = "FAILED")]
    Failed,
}

impl PaymentStatus {
    pub fn router_value(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "approved",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Lifecycle of a plan assignment, derived from the router's state code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssignmentState {
    Active,
    TimeElapsed,
    DataExhausted,
}

impl AssignmentState {
    pub fn from_code(code: Option<&str>) -> Self {
        match code.map(str::trim) {
            Some("used") => AssignmentState::TimeElapsed,
            Some("running") => AssignmentState::DataExhausted,
            _ => AssignmentState::Active,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentState::Active => "active",
            AssignmentState::TimeElapsed => "time-elapsed",
            AssignmentState::DataExhausted => "data-exhausted",
        }
    }
}

impl fmt::Display for AssignmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Closed,
}

const CLOSING_TOKENS: &[&str] = &["stop", "close-acked", "expired"];

impl SessionStatus {
    /// Classifies a comma-joined status string such as `"start,interim"`. Tokens are
    /// compared exactly as the router writes them, without trimming.
    pub fn classify(raw: &str) -> Self {
        let closed = raw.split(',').any(|token| CLOSING_TOKENS.contains(&token));
        if closed {
            SessionStatus::Closed
        } else {
            SessionStatus::Running
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Running => f.write_str("running"),
            SessionStatus::Closed => f.write_str("closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_status_classification() {
        assert_eq!(SessionStatus::classify("stop,interim"), SessionStatus::Closed);
        assert_eq!(SessionStatus::classify("start,interim"), SessionStatus::Running);
        assert_eq!(SessionStatus::classify("close-acked"), SessionStatus::Closed);
        assert_eq!(SessionStatus::classify("start,expired"), SessionStatus::Closed);
        assert_eq!(SessionStatus::classify("start, expired"), SessionStatus::Running);
        assert_eq!(SessionStatus::classify(""), SessionStatus::Running);
        assert_eq!(SessionStatus::classify("stopped"), SessionStatus::Running);
    }

    #[test]
    fn test_assignment_state_from_code() {
        assert_eq!(AssignmentState::from_code(Some("used")), AssignmentState::TimeElapsed);
        assert_eq!(AssignmentState::from_code(Some("running")), AssignmentState::DataExhausted);
        assert_eq!(AssignmentState::from_code(Some("running-active")), AssignmentState::Active);
        assert_eq!(AssignmentState::from_code(None), AssignmentState::Active);
        assert_eq!(AssignmentState::TimeElapsed.to_string(), "time-elapsed");
    }
}
