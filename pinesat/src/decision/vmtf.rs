//! The VMTF branching queue.
//!
//! Variables live on a doubly-linked list ordered by the time they were last bumped. A bump
//! moves the variable to the tail of the queue. Decisions pick the most-recently-bumped
//! unassigned variable, found by walking from a cached search head towards older entries.
//!
//! Invariant: after propagation every variable behind (newer than) `unassigned` is assigned, so
//! the walk never has to revisit that part of the queue.

use pinesat_formula::lit::LitIdx;
use pinesat_formula::Var;

use crate::prop::Assignment;

const NONE: LitIdx = LitIdx::max_value();

#[derive(Copy, Clone)]
struct Link {
    prev: LitIdx,
    next: LitIdx,
}

impl Default for Link {
    fn default() -> Link {
        Link {
            prev: NONE,
            next: NONE,
        }
    }
}

/// The VMTF branching queue.
#[derive(Default)]
pub struct Vmtf {
    links: Vec<Link>,
    /// Timestamp of the last bump of each variable.
    btab: Vec<u64>,
    head: LitIdx,
    tail: LitIdx,
    /// Cached search head: the most-recently-bumped variable that may be unassigned.
    unassigned: LitIdx,
    stamp: u64,
    len: usize,
}

impl Vmtf {
    /// Update structures for a new variable count, enqueuing new variables.
    pub fn set_var_count(&mut self, count: usize) {
        let old_count = self.links.len();
        if count < old_count {
            return;
        }
        self.links.resize(count, Link::default());
        self.btab.resize(count, 0);
        if old_count == 0 {
            self.head = NONE;
            self.tail = NONE;
            self.unassigned = NONE;
        }
        for index in old_count..count {
            self.enqueue(Var::from_index(index));
        }
    }

    /// The bump timestamp of a variable.
    pub fn stamp_of(&self, var: Var) -> u64 {
        self.btab[var.index()]
    }

    /// Whether a variable is currently on the queue.
    pub fn contains(&self, var: Var) -> bool {
        let index = var.index() as LitIdx;
        self.links[var.index()].prev != NONE
            || self.links[var.index()].next != NONE
            || self.head == index
    }

    /// Append a variable at the tail of the queue.
    pub fn enqueue(&mut self, var: Var) {
        let index = var.index() as LitIdx;
        debug_assert!(!self.contains(var));
        self.stamp += 1;
        self.btab[var.index()] = self.stamp;
        self.links[var.index()] = Link {
            prev: self.tail,
            next: NONE,
        };
        if self.tail != NONE {
            self.links[self.tail as usize].next = index;
        } else {
            self.head = index;
        }
        self.tail = index;
        self.unassigned = index;
        self.len += 1;
    }

    /// Unlink a variable from the queue.
    pub fn dequeue(&mut self, var: Var) {
        let index = var.index() as LitIdx;
        if !self.contains(var) {
            return;
        }
        let link = self.links[var.index()];
        if link.prev != NONE {
            self.links[link.prev as usize].next = link.next;
        } else {
            self.head = link.next;
        }
        if link.next != NONE {
            self.links[link.next as usize].prev = link.prev;
        } else {
            self.tail = link.prev;
        }
        if self.unassigned == index {
            self.unassigned = if link.prev != NONE { link.prev } else { self.head };
        }
        self.links[var.index()] = Link::default();
        self.len -= 1;
    }

    /// Move a variable to the tail of the queue.
    ///
    /// `assigned` tells whether the variable is currently assigned; an unassigned bumped
    /// variable becomes the new search head.
    pub fn bump(&mut self, var: Var, assigned: bool) {
        self.dequeue(var);
        self.enqueue(var);
        if assigned {
            // The new tail is assigned, the search head stays where it was before the bump.
            let prev = self.links[var.index()].prev;
            if prev != NONE {
                self.unassigned = prev;
            }
        }
    }

    /// Tell the queue that a variable became unassigned again.
    pub fn make_available(&mut self, var: Var) {
        if self.unassigned == NONE
            || self.btab[var.index()] > self.btab[self.unassigned as usize]
        {
            self.unassigned = var.index() as LitIdx;
        }
    }

    /// Find the most-recently-bumped unassigned variable.
    ///
    /// Moves the search head along, restoring the queue invariant.
    pub fn next_decision(&mut self, assignment: &Assignment) -> Option<Var> {
        let mut cursor = self.unassigned;
        while cursor != NONE {
            let var = Var::from_index(cursor as usize);
            if assignment.var_value(var).is_none() {
                self.unassigned = cursor;
                return Some(var);
            }
            cursor = self.links[cursor as usize].prev;
        }
        self.unassigned = if cursor == NONE { self.head } else { cursor };
        None
    }

    /// Timestamp of the most-recently-bumped unassigned variable without moving the head.
    pub fn next_decision_stamp(&mut self, assignment: &Assignment) -> Option<u64> {
        self.next_decision(assignment)
            .map(|var| self.btab[var.index()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assignment_with(count: usize, assigned: &[Var]) -> Assignment {
        let mut assignment = Assignment::default();
        assignment.set_var_count(count);
        for &var in assigned {
            assignment.assign_lit(var.positive());
        }
        assignment
    }

    #[test]
    fn decisions_follow_bump_order() {
        let mut vmtf = Vmtf::default();
        vmtf.set_var_count(4);

        let assignment = assignment_with(4, &[]);
        // Most recently enqueued first
        assert_eq!(vmtf.next_decision(&assignment), Some(Var::from_index(3)));

        vmtf.bump(Var::from_index(1), false);
        assert_eq!(vmtf.next_decision(&assignment), Some(Var::from_index(1)));
    }

    #[test]
    fn skips_assigned_vars() {
        let mut vmtf = Vmtf::default();
        vmtf.set_var_count(3);

        let assignment = assignment_with(3, &[Var::from_index(2), Var::from_index(1)]);
        assert_eq!(vmtf.next_decision(&assignment), Some(Var::from_index(0)));

        let all = [Var::from_index(0), Var::from_index(1), Var::from_index(2)];
        let assignment = assignment_with(3, &all);
        let mut vmtf = Vmtf::default();
        vmtf.set_var_count(3);
        assert_eq!(vmtf.next_decision(&assignment), None);
    }

    #[test]
    fn make_available_restores_search_head() {
        let mut vmtf = Vmtf::default();
        vmtf.set_var_count(3);

        let all = [Var::from_index(0), Var::from_index(1), Var::from_index(2)];
        let all_assigned = assignment_with(3, &all);
        assert_eq!(vmtf.next_decision(&all_assigned), None);

        vmtf.make_available(Var::from_index(2));
        let assignment = assignment_with(3, &[Var::from_index(0), Var::from_index(1)]);
        assert_eq!(vmtf.next_decision(&assignment), Some(Var::from_index(2)));
    }

    #[test]
    fn dequeue_and_requeue() {
        let mut vmtf = Vmtf::default();
        vmtf.set_var_count(3);

        vmtf.dequeue(Var::from_index(2));
        let assignment = assignment_with(3, &[]);
        let mut vmtf2 = vmtf;
        assert_eq!(vmtf2.next_decision(&assignment), Some(Var::from_index(1)));

        vmtf2.enqueue(Var::from_index(2));
        assert_eq!(vmtf2.next_decision(&assignment), Some(Var::from_index(2)));
    }
}
