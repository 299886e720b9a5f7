use crate::float::Float;
use crate::opcode::{OpCode, UNUSED};

impl<F: Float> super::Recorder<F> {
    /// Rewrite multiply-accumulate pairs into fused records.
    ///
    /// `Add(y, t)`, `Add(t, y)`, and `Sub(y, t)` where `t` comes from a
    /// `Mul(a, b)` read nowhere else (and not marked dependent) become a single
    /// `FusedMulAdd(y, a, b)` / `FusedMulSub(y, a, b)` at the position of the
    /// add/sub. The `Mul` record is dropped; its slot becomes a hole that
    /// [`compact_slots`](Self::compact_slots) removes. Slots are
    /// single-assignment, so evaluating `a * b` later yields the same value.
    ///
    /// Returns the number of pairs fused.
    pub(super) fn fuse_accumulations(&mut self) -> usize {
        let n_slots = self.next_slot as usize;
        let n = self.opcodes.len();

        // def[slot] = record producing it; uses[slot] = number of readers.
        let mut def = vec![UNUSED; n_slots];
        let mut uses = vec![0u32; n_slots];
        for i in 0..n {
            let op = self.opcodes[i];
            for &a in &self.arg_indices[i][..op.slot_operands()] {
                uses[a as usize] += 1;
            }
            let r = self.result_indices[i];
            if r != UNUSED {
                def[r as usize] = i as u32;
            }
        }

        let mut removed = vec![false; n];
        let mut fused = 0;

        // A single-reader Mul feeding record `i`, if any.
        let fusable = |slot: u32, removed: &[bool]| -> Option<usize> {
            let m = def[slot as usize];
            if m == UNUSED || uses[slot as usize] != 1 {
                return None;
            }
            let m = m as usize;
            (self.opcodes[m] == OpCode::Mul && !removed[m]).then_some(m)
        };

        let mut rewrites: Vec<(usize, OpCode, [u32; 3])> = Vec::new();
        for i in 0..n {
            let [x, y, _] = self.arg_indices[i];
            let candidate = match self.opcodes[i] {
                OpCode::Add => fusable(y, &removed)
                    .map(|m| (m, x))
                    .or_else(|| fusable(x, &removed).map(|m| (m, y))),
                OpCode::Sub => fusable(y, &removed).map(|m| (m, x)),
                _ => None,
            };
            if let Some((m, acc)) = candidate {
                let [a, b, _] = self.arg_indices[m];
                let op = if self.opcodes[i] == OpCode::Add {
                    OpCode::FusedMulAdd
                } else {
                    OpCode::FusedMulSub
                };
                removed[m] = true;
                rewrites.push((i, op, [acc, a, b]));
                fused += 1;
            }
        }

        for (i, op, args) in rewrites {
            self.opcodes[i] = op;
            self.arg_indices[i] = args;
        }

        if fused > 0 {
            let mut write = 0;
            for (read, &gone) in removed.iter().enumerate() {
                if !gone {
                    self.opcodes[write] = self.opcodes[read];
                    self.arg_indices[write] = self.arg_indices[read];
                    self.result_indices[write] = self.result_indices[read];
                    write += 1;
                }
            }
            self.opcodes.truncate(write);
            self.arg_indices.truncate(write);
            self.result_indices.truncate(write);
        }
        fused
    }

    /// Renumber slots densely in record order, removing holes.
    ///
    /// Updates operand slots, independent and dependent slot lists, and
    /// `next_slot` (the tape's location count).
    pub(super) fn compact_slots(&mut self) {
        let mut remap = vec![UNUSED; self.next_slot as usize];
        let mut next = 0u32;

        for i in 0..self.opcodes.len() {
            let op = self.opcodes[i];
            let k = op.slot_operands();
            for a in &mut self.arg_indices[i][..k] {
                *a = remap[*a as usize];
            }
            let r = &mut self.result_indices[i];
            if *r != UNUSED {
                remap[*r as usize] = next;
                *r = next;
                next += 1;
            }
        }

        for s in self.independents.iter_mut().chain(self.dependents.iter_mut()) {
            *s = remap[*s as usize];
        }
        self.next_slot = next;
    }
}
