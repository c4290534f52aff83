/*!
 * Rollback Guards
 *
 * LIFO undo stack for all-or-nothing creation paths
 */

use tracing::debug;

type UndoStep<'a> = Box<dyn FnOnce() + 'a>;

/// Undo stack that unwinds on drop unless committed
///
/// Each successful step of a multi-step operation pushes the action that
/// reverses it. If the operation returns early, dropping the guard runs the
/// recorded actions newest first, so resources are released in exactly the
/// reverse order they were acquired.
///
/// # Example
///
/// ```ignore
/// let mut rollback = RollbackGuard::new("create_team");
/// register(&team)?;
/// rollback.push("unregister", || unregister(&team));
/// load_image(&team)?;          // early return unwinds `unregister`
/// rollback.commit();
/// ```
#[must_use = "dropping the guard immediately rolls everything back"]
pub struct RollbackGuard<'a> {
    operation: &'static str,
    steps: Vec<(&'static str, UndoStep<'a>)>,
    committed: bool,
}

impl<'a> RollbackGuard<'a> {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            steps: Vec::new(),
            committed: false,
        }
    }

    /// Record the action that undoes the step just performed
    pub fn push<F>(&mut self, step: &'static str, undo: F)
    where
        F: FnOnce() + 'a,
    {
        self.steps.push((step, Box::new(undo)));
    }

    /// Number of recorded undo actions
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Keep every step; the undo actions are dropped unrun
    pub fn commit(mut self) {
        self.committed = true;
        self.steps.clear();
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        while let Some((step, undo)) = self.steps.pop() {
            debug!(operation = self.operation, step, "Rolling back");
            undo();
        }
    }
}
