//! Post-commit hook contract between the store and whoever reacts to local changes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Entity kinds that have a router counterpart and can be pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    User,
    Plan,
    PlanAssignment,
    Payment,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Plan => "plan",
            EntityKind::PlanAssignment => "plan-assignment",
            EntityKind::Payment => "payment",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" | "users" => Ok(EntityKind::User),
            "plan" | "plans" => Ok(EntityKind::Plan),
            "plan-assignment" | "assignment" | "assignments" => Ok(EntityKind::PlanAssignment),
            "payment" | "payments" => Ok(EntityKind::Payment),
            other => Err(format!("unknown entity kind '{other}'")),
        }
    }
}

/// Who produced a committed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Admin edits, sign-ups, payment confirmations.
    Local,
    /// Rows written by pull-sync; they already mirror the router.
    Router,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEvent {
    pub kind: EntityKind,
    pub local_id: i32,
    /// External id as it stood when the row was committed.
    pub external_id: Option<String>,
    pub origin: ChangeOrigin,
}

impl CommitEvent {
    pub fn local(kind: EntityKind, local_id: i32, external_id: Option<String>) -> Self {
        Self {
            kind,
            local_id,
            external_id,
            origin: ChangeOrigin::Local,
        }
    }

    pub fn from_router(kind: EntityKind, local_id: i32, external_id: Option<String>) -> Self {
        Self {
            kind,
            local_id,
            external_id,
            origin: ChangeOrigin::Router,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum PushOp {
    Create,
    Update,
    /// Remove the remote record; the local row may already be gone.
    Delete { external_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushTask {
    pub kind: EntityKind,
    pub local_id: i32,
    #[serde(flatten)]
    pub op: PushOp,
}

impl PushTask {
    pub fn create(kind: EntityKind, local_id: i32) -> Self {
        Self {
            kind,
            local_id,
            op: PushOp::Create,
        }
    }

    pub fn update(kind: EntityKind, local_id: i32) -> Self {
        Self {
            kind,
            local_id,
            op: PushOp::Update,
        }
    }

    pub fn delete(kind: EntityKind, local_id: i32, external_id: impl Into<String>) -> Self {
        Self {
            kind,
            local_id,
            op: PushOp::Delete {
                external_id: external_id.into(),
            },
        }
    }
}

impl fmt::Display for PushTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            PushOp::Create => write!(f, "create {} #{}", self.kind, self.local_id),
            PushOp::Update => write!(f, "update {} #{}", self.kind, self.local_id),
            PushOp::Delete { external_id } => write!(f, "delete {} {}", self.kind, external_id),
        }
    }
}

/// Called synchronously by the store after a row is committed.
///
/// Returns the single push task the change requires, if any. Implementations must not
/// block; the caller enqueues the returned task.
pub trait CommitHook: Send + Sync {
    fn on_commit(&self, event: &CommitEvent) -> Option<PushTask>;
}

/// Hook that never schedules anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHook;

impl CommitHook for NoopHook {
    fn on_commit(&self, _event: &CommitEvent) -> Option<PushTask> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_parsing() {
        assert_eq!("plan".parse::<EntityKind>().unwrap(), EntityKind::Plan);
        assert_eq!("assignment".parse::<EntityKind>().unwrap(), EntityKind::PlanAssignment);
        assert!("session".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_push_task_json_shape() {
        let task = PushTask::delete(EntityKind::User, 4, "*9");
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "kind": "user", "local_id": 4, "op": "delete", "external_id": "*9" })
        );
    }
}
