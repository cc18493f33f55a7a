use tracing::debug;

use crate::db::hooks::{ChangeOrigin, CommitEvent, CommitHook, EntityKind, PushTask};

/// Turns committed local changes into push tasks.
///
/// Exactly one task per local commit of a user, plan or plan assignment: a create when
/// the row has no external id yet, an update otherwise. Rows written by pull-sync
/// already match the router and produce nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChangeDispatcher;

impl ChangeDispatcher {
    pub fn new() -> Self {
        Self
    }
}

impl CommitHook for ChangeDispatcher {
    fn on_commit(&self, event: &CommitEvent) -> Option<PushTask> {
        if event.origin == ChangeOrigin::Router {
            return None;
        }
        match event.kind {
            EntityKind::User | EntityKind::Plan | EntityKind::PlanAssignment => {}
            // Payments are pushed on demand from the admin surface.
            EntityKind::Payment => return None,
        }

        let task = match event.external_id {
            None => PushTask::create(event.kind, event.local_id),
            Some(_) => PushTask::update(event.kind, event.local_id),
        };
        debug!(%task, "Dispatching push task for committed change.");
        Some(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::hooks::PushOp;

    #[test]
    fn test_routes_by_external_id() {
        let dispatcher = ChangeDispatcher::new();

        let task = dispatcher
            .on_commit(&CommitEvent::local(EntityKind::Plan, 3, None))
            .unwrap();
        assert_eq!(task.op, PushOp::Create);
        assert_eq!(task.local_id, 3);

        let task = dispatcher
            .on_commit(&CommitEvent::local(EntityKind::User, 7, Some("*7".into())))
            .unwrap();
        assert_eq!(task.op, PushOp::Update);
        assert_eq!(task.kind, EntityKind::User);
    }

    #[test]
    fn test_router_writes_and_payments_are_ignored() {
        let dispatcher = ChangeDispatcher::new();
        assert!(dispatcher
            .on_commit(&CommitEvent::from_router(EntityKind::User, 1, Some("*1".into())))
            .is_none());
        assert!(dispatcher
            .on_commit(&CommitEvent::local(EntityKind::Payment, 1, None))
            .is_none());
    }
}
