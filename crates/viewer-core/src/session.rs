//! Reconciliation sessions and the busy flag.
//!
//! Every structural mutation runs inside a [`ReconcileSession`]. Opening a
//! session claims the viewer's [`BusyFlag`]; dropping it releases the flag,
//! so a panic or an early `?` return can never leave the viewer stuck busy.
//! The session is threaded by `&mut` through the whole call chain and carries
//! the per-operation state (selection restore bookkeeping, the change report,
//! queued listener notifications) that would otherwise live in viewer-wide
//! mutable fields.

use std::cell::Cell;

use crate::{InvariantViolation, NodeId};

/// Reentrancy guard shared by a viewer and its sessions.
#[derive(Debug, Default)]
pub struct BusyFlag {
    busy: Cell<bool>,
    rejection_logged: Cell<bool>,
}

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    fn claim(&self, operation: &'static str) -> Result<(), InvariantViolation> {
        if self.busy.replace(true) {
            return Err(InvariantViolation::ReentrantMutation { operation });
        }
        Ok(())
    }

    fn release(&self) {
        self.busy.set(false);
    }

    /// Logs a rejected reentrant call. Only the first rejection per viewer is
    /// logged at `warn`; later ones would flood the log.
    pub fn log_rejection(&self, operation: &'static str) {
        if self.rejection_logged.replace(true) {
            log::trace!("ignored reentrant `{operation}`");
        } else {
            log::warn!(
                "ignored reentrant `{operation}`: the viewer is busy reconciling; \
                 further rejections are not logged"
            );
        }
    }
}

/// Listener events gathered during a session and dispatched once the
/// structural pass is over.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification<E> {
    Associated(E, NodeId),
    Disassociated(NodeId),
    FilteredOut(E),
    SelectionChanged(Vec<E>),
    /// The selection preserved across an operation could not be fully
    /// restored.
    InvalidSelection { previous: Vec<E>, restored: Vec<E> },
}

/// What a structural operation did to the nodes. Elementless placeholder
/// children of collapsed tree nodes are not counted.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeReport {
    pub created: Vec<NodeId>,
    pub disposed: Vec<NodeId>,
    /// Nodes whose element was swapped for an equivalent instance.
    pub reassociated: Vec<NodeId>,
    /// Label updates applied.
    pub relabeled: usize,
    /// Nodes left elementless because of a per-node inconsistency.
    pub skipped: Vec<NodeId>,
    /// The operation was refused because the viewer was busy.
    pub rejected: bool,
    /// The operation was queued and runs once the current session ends.
    pub deferred: bool,
}

impl ChangeReport {
    pub fn rejected() -> Self {
        Self {
            rejected: true,
            ..Self::default()
        }
    }

    pub fn deferred() -> Self {
        Self {
            deferred: true,
            ..Self::default()
        }
    }

    /// No node was created or disposed.
    pub fn is_structurally_empty(&self) -> bool {
        self.created.is_empty() && self.disposed.is_empty()
    }

    pub fn merge(&mut self, other: ChangeReport) {
        self.created.extend(other.created);
        self.disposed.extend(other.disposed);
        self.reassociated.extend(other.reassociated);
        self.relabeled += other.relabeled;
        self.skipped.extend(other.skipped);
        self.rejected |= other.rejected;
        self.deferred |= other.deferred;
    }
}

pub struct ReconcileSession<'a, E> {
    flag: &'a BusyFlag,
    operation: &'static str,
    preserving_depth: u32,
    restore_selection: bool,
    pub(crate) report: ChangeReport,
    pub(crate) notifications: Vec<Notification<E>>,
}

impl<'a, E> ReconcileSession<'a, E> {
    /// Claims `flag` for `operation`. Fails if another session holds it.
    pub fn begin(flag: &'a BusyFlag, operation: &'static str) -> Result<Self, InvariantViolation> {
        flag.claim(operation)?;
        Ok(Self {
            flag,
            operation,
            preserving_depth: 0,
            restore_selection: false,
            report: ChangeReport::default(),
            notifications: Vec::new(),
        })
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn report(&self) -> &ChangeReport {
        &self.report
    }

    pub fn notify(&mut self, notification: Notification<E>) {
        self.notifications.push(notification);
    }

    /// Enters a selection-preserving block. Returns `true` for the outermost
    /// block, which owns the snapshot and the restore.
    pub(crate) fn enter_preserving(&mut self) -> bool {
        self.preserving_depth += 1;
        if self.preserving_depth == 1 {
            self.restore_selection = true;
            true
        } else {
            false
        }
    }

    /// Leaves a block; returns whether the outermost block should restore.
    pub(crate) fn leave_preserving(&mut self) -> bool {
        self.preserving_depth = self.preserving_depth.saturating_sub(1);
        self.preserving_depth == 0 && std::mem::replace(&mut self.restore_selection, false)
    }

    pub fn is_preserving(&self) -> bool {
        self.preserving_depth > 0
    }

    /// An explicit selection made mid-operation wins over the snapshot.
    pub(crate) fn cancel_restore(&mut self) {
        self.restore_selection = false;
    }

    /// Ends the session, releasing the busy flag, and hands back the report
    /// and pending notifications.
    pub fn finish(mut self) -> (ChangeReport, Vec<Notification<E>>) {
        let report = std::mem::take(&mut self.report);
        let notifications = std::mem::take(&mut self.notifications);
        (report, notifications)
    }
}

impl<E> Drop for ReconcileSession<'_, E> {
    fn drop(&mut self) {
        self.flag.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_session_is_rejected() {
        let flag = BusyFlag::new();
        let outer = ReconcileSession::<u32>::begin(&flag, "refresh").expect("outer session");
        assert!(flag.is_busy());
        let inner = ReconcileSession::<u32>::begin(&flag, "add");
        assert_eq!(
            inner.err(),
            Some(InvariantViolation::ReentrantMutation { operation: "add" })
        );
        drop(outer);
        assert!(!flag.is_busy());
    }

    #[test]
    fn flag_is_released_on_unwind() {
        let flag = BusyFlag::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _session = ReconcileSession::<u32>::begin(&flag, "refresh").expect("session");
            panic!("label provider blew up");
        }));
        assert!(result.is_err());
        assert!(!flag.is_busy());
    }

    #[test]
    fn only_outermost_preserving_block_restores() {
        let flag = BusyFlag::new();
        let mut session = ReconcileSession::<u32>::begin(&flag, "refresh").expect("session");
        assert!(session.enter_preserving());
        assert!(!session.enter_preserving());
        assert!(!session.leave_preserving());
        assert!(session.leave_preserving());
        assert!(session.enter_preserving());
        session.cancel_restore();
        assert!(!session.leave_preserving());
    }
}
