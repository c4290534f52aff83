/*!
 * Stable Table Iterator
 *
 * An iterator is a sentinel slot linked into the table's entry list. Each
 * `next()` walks forward from the sentinel (skipping other sentinels and
 * invisible entries), then re-links the sentinel right after the object it
 * returns. The table lock is held only for that walk, so callers may insert,
 * remove or block between steps:
 * - removing an already-returned object cannot disturb the walk, since the
 *   sentinel is linked after it, not through it;
 * - objects appended behind the sentinel are returned by later steps.
 */

use super::{ObjectTable, SlotKind, TableObject};
use std::sync::Arc;

/// Iterator over the visible objects of an [`ObjectTable`]
pub struct TableIterator<'a, T: TableObject> {
    table: &'a ObjectTable<T>,
    sentinel: usize,
}

impl<'a, T: TableObject> TableIterator<'a, T> {
    pub(super) fn new(table: &'a ObjectTable<T>) -> Self {
        let mut state = table.state().write();
        let sentinel = state.alloc(SlotKind::Sentinel);
        state.link_after(sentinel, None);
        drop(state);

        Self { table, sentinel }
    }
}

impl<T: TableObject> Iterator for TableIterator<'_, T> {
    type Item = Arc<T>;

    fn next(&mut self) -> Option<Arc<T>> {
        let mut state = self.table.state().write();

        let mut cursor = state.next_of(self.sentinel);
        while let Some(idx) = cursor {
            let found = match &state.slots[idx].kind {
                SlotKind::Object {
                    object,
                    visible: true,
                } => Some(Arc::clone(object)),
                _ => None,
            };

            if let Some(object) = found {
                state.unlink(self.sentinel);
                state.link_after(self.sentinel, Some(idx));
                return Some(object);
            }
            cursor = state.next_of(idx);
        }
        None
    }
}

impl<T: TableObject> Drop for TableIterator<'_, T> {
    fn drop(&mut self) {
        let mut state = self.table.state().write();
        state.unlink(self.sentinel);
        state.release(self.sentinel);
    }
}
