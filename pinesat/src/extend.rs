//! The extension stack.
//!
//! Clauses removed by variable elimination, blocked clause elimination or equivalent literal
//! substitution are not logically implied to be satisfiable by every model of the remaining
//! formula; the extension stack records enough information to fix up such a model. Each record
//! holds a witness (the literals to flip), the removed clause's id and its literals, all in the
//! external encoding.
//!
//! The stack is a flat stream of 32-bit words. One record reads
//! `0, witness..., 0, id_lo, id_hi, 0, clause...` and records are concatenated, so that the
//! stream can be walked from the top by popping clause literals until a zero, the two id words,
//! and the witness. Model extension walks top to bottom: if the recorded clause is not satisfied
//! by the candidate model, all witness literals are made true.

use pinesat_formula::Lit;

use pinesat_proof::ClauseId;

/// A record recovered from the extension stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtensionRecord {
    pub witness: Vec<Lit>,
    pub id: ClauseId,
    pub clause: Vec<Lit>,
}

/// The extension stack.
#[derive(Default)]
pub struct Extender {
    stack: Vec<i32>,
}

fn encode(lit: Lit) -> i32 {
    lit.to_dimacs() as i32
}

fn decode(word: i32) -> Lit {
    Lit::from_dimacs(word as isize)
}

impl Extender {
    /// Push a record for a removed clause.
    ///
    /// Witness and clause literals are external. The witness must satisfy the clause.
    pub fn push_record(&mut self, witness: &[Lit], id: ClauseId, clause: &[Lit]) {
        debug_assert!(witness.iter().any(|lit| clause.contains(lit)));
        self.stack.push(0);
        for &lit in witness {
            self.stack.push(encode(lit));
        }
        self.stack.push(0);
        self.stack.push(id as u32 as i32);
        self.stack.push((id >> 32) as u32 as i32);
        self.stack.push(0);
        for &lit in clause {
            self.stack.push(encode(lit));
        }
    }

    /// Iterate over the records from the top of the stack to the bottom.
    pub fn walk_backward<'a>(&'a self) -> impl Iterator<Item = ExtensionRecord> + 'a {
        BackwardWalk {
            stack: &self.stack,
            pos: self.stack.len(),
        }
    }

    /// Extend a candidate model to the removed clauses.
    ///
    /// `values` is indexed by external variable index and is extended as needed. Variables of
    /// the stack without a value default to the witness being false and are flipped whenever a
    /// recorded clause is not satisfied.
    pub fn extend_model(&self, values: &mut Vec<Option<bool>>) {
        for record in self.walk_backward() {
            for &lit in record.witness.iter() {
                if values.len() <= lit.index() {
                    values.resize(lit.index() + 1, None);
                }
                if values[lit.index()].is_none() {
                    values[lit.index()] = Some(lit.is_negative());
                }
            }
            let satisfied = record.clause.iter().any(|&lit| {
                values
                    .get(lit.index())
                    .cloned()
                    .flatten()
                    .map(|value| value == lit.is_positive())
                    .unwrap_or(false)
            });
            if !satisfied {
                for &lit in record.witness.iter() {
                    values[lit.index()] = Some(lit.is_positive());
                }
            }
        }
    }

    /// Remove and return all records whose witness mentions the given external variable.
    ///
    /// Used to restore clauses when a new input clause mentions a variable that was removed.
    pub fn take_records_with_witness_var(
        &mut self,
        external: pinesat_formula::Var,
    ) -> Vec<ExtensionRecord> {
        let mut taken = vec![];
        let mut keep = Extender::default();

        let records: Vec<ExtensionRecord> = {
            let mut records: Vec<_> = self.walk_backward().collect();
            records.reverse();
            records
        };

        for record in records {
            if record.witness.iter().any(|lit| lit.var() == external) {
                taken.push(record);
            } else {
                keep.push_record(&record.witness, record.id, &record.clause);
            }
        }

        self.stack = keep.stack;
        taken
    }

}

struct BackwardWalk<'a> {
    stack: &'a [i32],
    pos: usize,
}

impl<'a> Iterator for BackwardWalk<'a> {
    type Item = ExtensionRecord;

    fn next(&mut self) -> Option<ExtensionRecord> {
        if self.pos == 0 {
            return None;
        }

        let mut clause = vec![];
        while self.stack[self.pos - 1] != 0 {
            clause.push(decode(self.stack[self.pos - 1]));
            self.pos -= 1;
        }
        clause.reverse();
        self.pos -= 1; // zero before the clause

        let id_hi = self.stack[self.pos - 1] as u32 as u64;
        let id_lo = self.stack[self.pos - 2] as u32 as u64;
        let id = (id_hi << 32) | id_lo;
        self.pos -= 2;
        debug_assert_eq!(self.stack[self.pos - 1], 0);
        self.pos -= 1; // zero before the id

        let mut witness = vec![];
        while self.stack[self.pos - 1] != 0 {
            witness.push(decode(self.stack[self.pos - 1]));
            self.pos -= 1;
        }
        witness.reverse();
        self.pos -= 1; // leading zero of the record

        Some(ExtensionRecord {
            witness,
            id,
            clause,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pinesat_formula::lits;

    #[test]
    fn roundtrip_records() {
        let mut extender = Extender::default();
        extender.push_record(&lits![2], 7, &lits![2, -3]);
        extender.push_record(&lits![-1], 9, &lits![-1, 4, 5]);

        let records: Vec<_> = extender.walk_backward().collect();
        assert_eq!(
            records,
            vec![
                ExtensionRecord {
                    witness: lits![-1].to_vec(),
                    id: 9,
                    clause: lits![-1, 4, 5].to_vec(),
                },
                ExtensionRecord {
                    witness: lits![2].to_vec(),
                    id: 7,
                    clause: lits![2, -3].to_vec(),
                },
            ]
        );
    }

    #[test]
    fn extend_flips_witness() {
        let mut extender = Extender::default();
        // Clause (1 v 2) was removed with witness 1.
        extender.push_record(&lits![1], 3, &lits![1, 2]);

        // Model has 2 false, so 1 must be flipped to true.
        let mut values = vec![None, Some(false)];
        extender.extend_model(&mut values);
        assert_eq!(values[0], Some(true));

        // Model has 2 true, so the default value suffices.
        let mut values = vec![None, Some(true)];
        extender.extend_model(&mut values);
        assert_eq!(values[0], Some(false));
    }

    #[test]
    fn substitution_pair_extends() {
        let mut extender = Extender::default();
        // Variable 1 was substituted by 2: records for (1 v -2) and (-1 v 2).
        extender.push_record(&lits![1], 4, &lits![1, -2]);
        extender.push_record(&lits![-1], 5, &lits![-1, 2]);

        let mut values = vec![None, Some(true)];
        extender.extend_model(&mut values);
        assert_eq!(values[0], Some(true));

        let mut values = vec![None, Some(false)];
        extender.extend_model(&mut values);
        assert_eq!(values[0], Some(false));
    }

    #[test]
    fn restore_takes_matching_records() {
        let mut extender = Extender::default();
        extender.push_record(&lits![1], 1, &lits![1, 2]);
        extender.push_record(&lits![3], 2, &lits![3, -2]);

        let taken = extender.take_records_with_witness_var(pinesat_formula::var!(1));
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].id, 1);

        let remaining: Vec<_> = extender.walk_backward().collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, 2);
    }
}
