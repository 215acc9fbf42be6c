//! The EVSIDS branching heuristic.
//!
//! Each variable has a score. On every conflict the variables involved in the analysis are
//! bumped by the current score increment, and the increment itself grows by the inverse decay
//! factor. Apart from a scaling factor common to all variables this is equivalent to decaying
//! all scores each conflict. When the increment would overflow, all scores and the increment are
//! rescored by a common factor.
//!
//! Decisions branch on the unassigned variable of largest score, maintained in a binary heap.

use pinesat_formula::Var;

/// The EVSIDS branching heuristic.
pub struct Evsids {
    /// The score of each variable.
    score: Vec<f64>,
    /// A binary max-heap of the variables.
    heap: Vec<Var>,
    /// The position in the binary heap for each variable.
    position: Vec<Option<usize>>,
    /// The value to add on bumping.
    score_inc: f64,
    /// The inverse of the decay factor.
    inv_decay: f64,
}

impl Default for Evsids {
    fn default() -> Evsids {
        Evsids {
            score: vec![],
            heap: vec![],
            position: vec![],
            score_inc: 1.0,
            inv_decay: 1.0 / 0.95,
        }
    }
}

impl Evsids {
    /// Rescore when a value exceeds this threshold.
    const RESCORE_LIMIT: f64 = 1e150;

    /// Update structures for a new variable count.
    pub fn set_var_count(&mut self, count: usize) {
        let old_count = self.score.len();
        if count < old_count {
            return;
        }
        self.score.resize(count, 0.0);
        self.position.resize(count, None);

        for i in old_count..count {
            self.make_available(Var::from_index(i));
        }
    }

    /// Change the decay factor.
    pub fn set_decay(&mut self, decay: f64) {
        assert!(decay < 1.0);
        assert!(decay > 0.5);
        self.inv_decay = 1.0 / decay;
    }

    /// The score of a variable.
    pub fn score(&self, var: Var) -> f64 {
        self.score[var.index()]
    }

    /// Bump a variable by increasing its score.
    pub fn bump(&mut self, var: Var) {
        let rescore = {
            let value = &mut self.score[var.index()];
            *value += self.score_inc;
            *value >= Self::RESCORE_LIMIT
        };
        if rescore {
            self.rescore();
        }
        if let Some(pos) = self.position[var.index()] {
            self.sift_up(pos);
        }
    }

    /// Grow the score increment, which decays all existing scores relatively.
    pub fn decay(&mut self) {
        self.score_inc *= self.inv_decay;
        if self.score_inc >= Self::RESCORE_LIMIT {
            self.rescore();
        }
    }

    /// Rescore all values to avoid an overflow.
    fn rescore(&mut self) {
        let factor = 1.0 / Self::RESCORE_LIMIT;
        for score in &mut self.score {
            *score *= factor;
        }
        self.score_inc *= factor;
        if self.score_inc < 1.0 {
            self.score_inc = 1.0;
        }
    }

    /// Insert a variable into the heap if not already present.
    pub fn make_available(&mut self, var: Var) {
        if self.position[var.index()].is_none() {
            let position = self.heap.len();
            self.position[var.index()] = Some(position);
            self.heap.push(var);
            self.sift_up(position);
        }
    }

    /// Remove a variable from the heap.
    pub fn remove(&mut self, var: Var) {
        if let Some(pos) = self.position[var.index()] {
            let last = self.heap.len() - 1;
            self.heap.swap(pos, last);
            self.heap.pop();
            self.position[var.index()] = None;
            if pos <= last && pos < self.heap.len() {
                let moved = self.heap[pos];
                self.position[moved.index()] = Some(pos);
                self.sift_down(pos);
                self.sift_up(self.position[moved.index()].unwrap());
            }
        }
    }

    /// The unassigned candidate of largest score, without removing it.
    pub fn peek(&self) -> Option<Var> {
        self.heap.first().cloned()
    }

    /// Remove and return the variable of largest score.
    pub fn pop(&mut self) -> Option<Var> {
        if self.heap.is_empty() {
            None
        } else {
            let var = self.heap.swap_remove(0);
            if !self.heap.is_empty() {
                let top_var = self.heap[0];
                self.position[top_var.index()] = Some(0);
                self.sift_down(0);
            }
            self.position[var.index()] = None;
            Some(var)
        }
    }

    /// Move a variable closer to the root until the heap property is satisfied.
    fn sift_up(&mut self, mut pos: usize) {
        let var = self.heap[pos];
        loop {
            if pos == 0 {
                return;
            }
            let parent_pos = (pos - 1) / 2;
            let parent_var = self.heap[parent_pos];
            if self.score[parent_var.index()] >= self.score[var.index()] {
                return;
            }
            self.position[var.index()] = Some(parent_pos);
            self.heap[parent_pos] = var;
            self.position[parent_var.index()] = Some(pos);
            self.heap[pos] = parent_var;
            pos = parent_pos;
        }
    }

    /// Move a variable away from the root until the heap property is satisfied.
    fn sift_down(&mut self, mut pos: usize) {
        let var = self.heap[pos];
        loop {
            let mut largest_pos = pos;
            let mut largest_var = var;

            let left_pos = pos * 2 + 1;
            if left_pos < self.heap.len() {
                let left_var = self.heap[left_pos];

                if self.score[largest_var.index()] < self.score[left_var.index()] {
                    largest_pos = left_pos;
                    largest_var = left_var;
                }
            }

            let right_pos = pos * 2 + 2;
            if right_pos < self.heap.len() {
                let right_var = self.heap[right_pos];

                if self.score[largest_var.index()] < self.score[right_var.index()] {
                    largest_pos = right_pos;
                    largest_var = right_var;
                }
            }

            if largest_pos == pos {
                return;
            }

            self.position[var.index()] = Some(largest_pos);
            self.heap[largest_pos] = var;
            self.position[largest_var.index()] = Some(pos);
            self.heap[pos] = largest_var;
            pos = largest_pos;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_sorts() {
        let mut evsids = Evsids::default();
        evsids.set_var_count(8);

        for _ in 0..8 {
            evsids.pop();
        }

        for i in 0..8 {
            for _ in 0..i {
                evsids.bump(Var::from_index(i));
            }
        }

        for i in 0..8 {
            evsids.make_available(Var::from_index((i * 5) % 8));
        }

        for i in (0..8).rev() {
            assert_eq!(evsids.pop(), Some(Var::from_index(i)));
        }
        assert_eq!(evsids.pop(), None);
    }

    #[test]
    fn growing_increment_decays_old_scores() {
        let mut evsids = Evsids::default();
        evsids.set_var_count(2);
        evsids.set_decay(0.5);

        for _ in 0..2 {
            evsids.pop();
        }

        evsids.bump(Var::from_index(0));
        for _ in 0..10 {
            evsids.decay();
        }
        evsids.bump(Var::from_index(1));

        assert!(evsids.score(Var::from_index(1)) > evsids.score(Var::from_index(0)));
    }

    #[test]
    fn rescore_keeps_order() {
        let mut evsids = Evsids::default();
        evsids.set_var_count(3);
        evsids.set_decay(0.6);

        for _ in 0..3 {
            evsids.pop();
        }

        for round in 0..2000 {
            evsids.bump(Var::from_index(round % 2));
            evsids.bump(Var::from_index(2));
            evsids.decay();
        }

        for i in 0..3 {
            evsids.make_available(Var::from_index(i));
        }

        assert_eq!(evsids.pop(), Some(Var::from_index(2)));
    }

    #[test]
    fn remove_keeps_heap_consistent() {
        let mut evsids = Evsids::default();
        evsids.set_var_count(5);

        for i in 0..5 {
            for _ in 0..i {
                evsids.bump(Var::from_index(i));
            }
        }

        evsids.remove(Var::from_index(4));
        assert_eq!(evsids.pop(), Some(Var::from_index(3)));
        assert_eq!(evsids.pop(), Some(Var::from_index(2)));
    }
}
