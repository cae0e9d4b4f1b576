//! Task lists - doubly linked lists threaded through the TCB arena
//!
//! Ready queues (one per priority class) and the suspended list share this
//! type. A task is on exactly one list at a time, so a single link pair per
//! TCB is enough. Links are task ids, not pointers, which keeps the arena
//! free of aliasing and lets the whole scheduler live in one value.

use crate::task::Tcb;
use crate::types::TaskId;

/// List of tasks linked through [`Tcb::link`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskList {
    head: Option<TaskId>,
    tail: Option<TaskId>,
}

impl TaskList {
    /// Create a new empty list
    pub const fn new() -> Self {
        TaskList {
            head: None,
            tail: None,
        }
    }

    /// Get head of list (first to be scheduled)
    #[inline]
    pub fn head(&self) -> Option<TaskId> {
        self.head
    }

    /// Get tail of list
    #[inline]
    pub fn tail(&self) -> Option<TaskId> {
        self.tail
    }

    /// Check if list is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Whether more than one task is queued
    #[inline]
    pub fn has_peers(&self) -> bool {
        self.head != self.tail
    }

    /// Insert a task at the tail (FIFO order)
    ///
    /// The task must not be on any list.
    pub fn insert_tail(&mut self, tcbs: &mut [Tcb], id: TaskId) {
        let prev = self.tail;
        self.link_between(tcbs, id, prev, None);
    }

    /// Insert a task behind every task of the same or higher priority
    ///
    /// Keeps the list sorted by descending priority; tasks of equal priority
    /// stay in arrival order.
    pub fn insert_by_prio(&mut self, tcbs: &mut [Tcb], id: TaskId) {
        let prio = tcbs[id.index()].prio;

        let mut current = self.head;
        let mut prev: Option<TaskId> = None;

        while let Some(cur) = current {
            let cur_ref = &tcbs[cur.index()];
            if prio > cur_ref.prio {
                break;
            }
            prev = current;
            current = cur_ref.link.next;
        }

        self.link_between(tcbs, id, prev, current);
    }

    fn link_between(
        &mut self,
        tcbs: &mut [Tcb],
        id: TaskId,
        prev: Option<TaskId>,
        next: Option<TaskId>,
    ) {
        let link = &mut tcbs[id.index()].link;
        link.prev = prev;
        link.next = next;

        match prev {
            Some(p) => tcbs[p.index()].link.next = Some(id),
            None => self.head = Some(id),
        }

        match next {
            Some(n) => tcbs[n.index()].link.prev = Some(id),
            None => self.tail = Some(id),
        }
    }

    /// Remove a task from the list
    ///
    /// The task must be on this list.
    pub fn remove(&mut self, tcbs: &mut [Tcb], id: TaskId) {
        let link = tcbs[id.index()].link;

        match link.prev {
            Some(prev) => tcbs[prev.index()].link.next = link.next,
            None => self.head = link.next,
        }

        match link.next {
            Some(next) => tcbs[next.index()].link.prev = link.prev,
            None => self.tail = link.prev,
        }

        tcbs[id.index()].link = crate::task::Link::UNLINKED;
    }

    /// Walk the list from head to tail
    pub fn iter<'a>(&self, tcbs: &'a [Tcb]) -> TaskListIter<'a> {
        TaskListIter {
            tcbs,
            next: self.head,
        }
    }
}

impl Default for TaskList {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the ids of a [`TaskList`]
pub struct TaskListIter<'a> {
    tcbs: &'a [Tcb],
    next: Option<TaskId>,
}

impl Iterator for TaskListIter<'_> {
    type Item = TaskId;

    fn next(&mut self) -> Option<TaskId> {
        let id = self.next?;
        self.next = self.tcbs[id.index()].link.next;
        Some(id)
    }
}
