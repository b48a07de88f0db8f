// SPDX-License-Identifier: MIT

/// Per-radio work queue granting exclusive radio access to one item at a
/// time.
///
/// Items are ordered by integer priority, lower values first, FIFO within
/// a priority. A new item may overtake pending items of lower priority but
/// never one that has already been started.
#[derive(Debug, Default)]
pub(crate) struct RadioWorkQueue {
    items: Vec<WorkItem>,
    next_id: u32,
}

#[derive(Debug)]
struct WorkItem {
    id: u32,
    priority: i32,
    started: bool,
}

impl RadioWorkQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Admits an item and returns its queue id.
    pub(crate) fn insert(&mut self, priority: i32) -> u32 {
        self.next_id += 1;
        let id = self.next_id;

        let pos = self
            .items
            .iter()
            .position(|item| !item.started && item.priority > priority)
            .unwrap_or(self.items.len());
        self.items.insert(
            pos,
            WorkItem {
                id,
                priority,
                started: false,
            },
        );
        id
    }

    /// Grants execution to the head item if nothing is running yet,
    /// marking it started.
    pub(crate) fn start_next(&mut self) -> Option<u32> {
        let head = self.items.first_mut()?;
        if head.started {
            return None;
        }
        head.started = true;
        Some(head.id)
    }

    /// The id of the currently executing item, if any.
    pub(crate) fn running(&self) -> Option<u32> {
        self.items.first().filter(|item| item.started).map(|i| i.id)
    }

    pub(crate) fn is_running(&self, id: u32) -> bool {
        self.running() == Some(id)
    }

    /// Removes an item, running or pending. The caller decides when to
    /// grant the next item via [Self::start_next].
    pub(crate) fn done(&mut self, id: u32) -> bool {
        let Some(pos) = self.items.iter().position(|item| item.id == id)
        else {
            return false;
        };
        self.items.remove(pos);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_within_one_priority() {
        let mut queue = RadioWorkQueue::new();
        let a = queue.insert(2);
        let b = queue.insert(2);

        assert_eq!(queue.start_next(), Some(a));
        assert_eq!(queue.start_next(), None);
        assert!(queue.is_running(a));
        assert!(!queue.is_running(b));

        assert!(queue.done(a));
        assert_eq!(queue.start_next(), Some(b));
    }

    #[test]
    fn higher_priority_overtakes_pending_items_only() {
        let mut queue = RadioWorkQueue::new();
        let running = queue.insert(4);
        assert_eq!(queue.start_next(), Some(running));

        let pending_low = queue.insert(4);
        let urgent = queue.insert(2);

        // The running item keeps the radio
        assert_eq!(queue.start_next(), None);

        queue.done(running);
        assert_eq!(queue.start_next(), Some(urgent));
        queue.done(urgent);
        assert_eq!(queue.start_next(), Some(pending_low));
    }

    #[test]
    fn removing_a_pending_item_leaves_the_running_one() {
        let mut queue = RadioWorkQueue::new();
        let a = queue.insert(2);
        let b = queue.insert(2);
        queue.start_next();

        assert!(queue.done(b));
        assert!(queue.is_running(a));
        assert!(!queue.done(b));
    }
}
