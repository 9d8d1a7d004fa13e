//! Finite state machines
//!
//! Each pass gets one machine that recognizes, glyph by glyph, which of the pass's rules
//!     match at the current position.
//! The columns of the machine are the machine classes of [columns]: groups of glyphs the
//!     rules of the pass cannot tell apart.
//! The states are built breadth first by the number of slots matched, and equivalent
//!     states are merged (see [states]).
//!
//! The final numbering of states follows the layout the engine expects.
//! Transitional states that are not success states come first, then transitional success
//!     states, then final success states.
//! Only transitional states have a row in the transition table, and only success states
//!     have a rule list.

mod columns;
mod states;

pub use columns::symbol_glyphs;

use crate::rule::{Pass, Renderer, Symbol};
use font::{Font, Glyph};
use std::fmt::Write;

/// A column of the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineClass {
    /// Pass-internal IDs of the relevant symbols containing the glyphs.
    pub sources: Vec<usize>,
    /// Member glyphs, sorted.
    pub glyphs: Vec<Glyph>,
}

impl MachineClass {
    /// Contiguous runs of member glyphs, all mapping to the given column.
    pub fn ranges(&self, column: u16) -> Vec<GlyphRange> {
        let mut ranges: Vec<GlyphRange> = vec![];
        for glyph in &self.glyphs {
            match ranges.last_mut() {
                Some(range) if range.last.0 + 1 == glyph.0 => range.last = *glyph,
                _ => ranges.push(GlyphRange {
                    first: *glyph,
                    last: *glyph,
                    column,
                }),
            }
        }
        ranges
    }
}

/// A run of consecutive glyph IDs that map to one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlyphRange {
    pub first: Glyph,
    pub last: Glyph,
    pub column: u16,
}

/// The finished machine of a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub columns: Vec<MachineClass>,
    /// Glyph ranges of all columns, sorted by first glyph.
    pub ranges: Vec<GlyphRange>,
    pub num_states: usize,
    pub num_transitional: usize,
    pub num_success: usize,
    /// One row per transitional state, one cell per column.
    /// A cell of 0 means there is no transition: the initial state is never a target.
    pub transitions: Vec<Vec<u16>>,
    /// Rules that succeed in each success state, in the order they are tried.
    /// Entry `i` belongs to state `num_states - num_success + i`.
    pub success_rules: Vec<Vec<u16>>,
    /// The state to start in when `i` pre-context slots are missing.
    pub start_states: Vec<u16>,
    pub min_pre: usize,
    pub max_pre: usize,
    /// Number of states before merging.
    pub raw_states: usize,
    pub merged_states: usize,
}

impl Machine {
    /// Column of a glyph, found by binary search in the glyph ranges.
    pub fn column(&self, glyph: Glyph) -> Option<u16> {
        let i = self.ranges.partition_point(|r| r.last < glyph);
        let range = self.ranges.get(i)?;
        if range.first <= glyph {
            Some(range.column)
        } else {
            None
        }
    }

    pub fn next_state(&self, state: u16, column: u16) -> Option<u16> {
        let row = self.transitions.get(state as usize)?;
        match row.get(column as usize) {
            None | Some(0) => None,
            Some(next) => Some(*next),
        }
    }

    pub fn is_success(&self, state: u16) -> bool {
        (state as usize) >= self.num_states - self.num_success && (state as usize) < self.num_states
    }

    /// Rules that succeed in a state; empty for non-success states.
    pub fn rules_at(&self, state: u16) -> &[u16] {
        if !self.is_success(state) {
            return &[];
        }
        let i = state as usize - (self.num_states - self.num_success);
        &self.success_rules[i]
    }
}

impl std::fmt::Display for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "states: {} ({} transitional, {} success, {} merged of {})",
            self.num_states,
            self.num_transitional,
            self.num_success,
            self.merged_states,
            self.raw_states
        )?;
        writeln!(f, "pre-context: {}..={}", self.min_pre, self.max_pre)?;
        writeln!(f, "start states: {:?}", self.start_states)?;
        writeln!(f, "columns:")?;
        for (i, class) in self.columns.iter().enumerate() {
            let mut glyphs = String::new();
            for range in class.ranges(i as u16) {
                if !glyphs.is_empty() {
                    glyphs.push(' ');
                }
                if range.first == range.last {
                    write!(glyphs, "{}", range.first)?;
                } else {
                    write!(glyphs, "{}-{}", range.first, range.last)?;
                }
            }
            writeln!(f, "  {i:>3}: {glyphs}")?;
        }
        writeln!(f, "transitions:")?;
        for (state, row) in self.transitions.iter().enumerate() {
            let cells: Vec<String> = row.iter().map(|c| format!("{c:>3}")).collect();
            writeln!(f, "  {state:>3}: {}", cells.join(" "))?;
        }
        writeln!(f, "rules:")?;
        for (i, rules) in self.success_rules.iter().enumerate() {
            let state = self.num_states - self.num_success + i;
            writeln!(f, "  {state:>3}: {rules:?}")?;
        }
        Ok(())
    }
}

/// Error building a machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsmError {
    TooManyStates(usize),
    TooManyColumns(usize),
    /// A state that neither transitions nor succeeds. Carries the raw state index.
    DeadState(usize),
    /// Feeding phantom glyphs from the initial state got stuck. Carries the number fed.
    MissingStartState(usize),
}

impl std::fmt::Display for FsmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FsmError::TooManyStates(n) => write!(f, "{n} states, the limit is {}", u16::MAX),
            FsmError::TooManyColumns(n) => write!(f, "{n} columns, the limit is {}", u16::MAX),
            FsmError::DeadState(s) => write!(f, "state {s} neither transitions nor succeeds"),
            FsmError::MissingStartState(i) => {
                write!(f, "no start state after {i} phantom glyphs")
            }
        }
    }
}

impl std::error::Error for FsmError {}

/// Builds the machine of a pass.
///
/// Returns [None] for a pass with no usable rules.
/// The pass must have been normalized by [crate::precontext::normalize].
pub fn build(
    pass: &Pass,
    renderer: &Renderer,
    font: &dyn Font,
) -> Result<Option<Machine>, FsmError> {
    if !pass.has_usable_rules() {
        return Ok(None);
    }
    let mut symbols: Vec<Symbol> = vec![];
    let mut rules: Vec<states::InputRule> = vec![];
    for (index, rule) in pass.usable_rules() {
        let mut inputs = vec![];
        for item in rule.items.iter().filter(|i| !i.is_insertion()) {
            let id = match symbols.iter().position(|s| *s == item.input) {
                Some(id) => id,
                None => {
                    symbols.push(item.input);
                    symbols.len() - 1
                }
            };
            inputs.push(id);
        }
        rules.push(states::InputRule { index, inputs });
    }

    let columns = columns::build(&symbols, renderer, font);
    let num_columns = columns.classes.len();
    if num_columns > u16::MAX as usize {
        return Err(FsmError::TooManyColumns(num_columns));
    }
    let raw = states::build(&rules, &columns.symbol_columns, num_columns);

    let mut bands: [Vec<usize>; 3] = [vec![], vec![], vec![]];
    for (i, state) in raw.states.iter().enumerate() {
        if state.merged_into.is_some() {
            continue;
        }
        let transitional = state.cells.iter().any(Option::is_some);
        let success = !state.succeeded.is_empty();
        let band = match (transitional, success) {
            (true, false) => 0,
            (true, true) => 1,
            (false, true) => 2,
            (false, false) => return Err(FsmError::DeadState(i)),
        };
        bands[band].push(i);
    }
    let num_states = bands.iter().map(Vec::len).sum::<usize>();
    if num_states > u16::MAX as usize {
        return Err(FsmError::TooManyStates(num_states));
    }
    let mut final_index = vec![0_u16; raw.states.len()];
    for (n, &s) in bands.iter().flatten().enumerate() {
        final_index[s] = n as u16;
    }
    let lookup = |s: usize| final_index[raw.resolve(s)];

    let transitions: Vec<Vec<u16>> = bands[0]
        .iter()
        .chain(&bands[1])
        .map(|&s| {
            raw.states[s]
                .cells
                .iter()
                .map(|cell| cell.map(lookup).unwrap_or(0))
                .collect()
        })
        .collect();
    let success_rules: Vec<Vec<u16>> = bands[1]
        .iter()
        .chain(&bands[2])
        .map(|&s| {
            let mut succeeded: Vec<usize> = raw.states[s]
                .succeeded
                .iter()
                .map(|r| rules[*r].index)
                .collect();
            succeeded.sort_by_key(|r| (std::cmp::Reverse(pass.rules[*r].sort_key()), *r));
            succeeded.into_iter().map(|r| r as u16).collect()
        })
        .collect();

    let phantom = columns
        .glyph_columns
        .get(font.phantom_glyph().0 as usize)
        .copied()
        .flatten();
    let mut start_states = vec![];
    let mut state = 0_usize;
    for i in 0..=(pass.max_pre - pass.min_pre) {
        if i > 0 {
            state = phantom
                .and_then(|column| raw.next(state, column))
                .ok_or(FsmError::MissingStartState(i))?;
        }
        start_states.push(lookup(state));
    }

    let mut ranges: Vec<GlyphRange> = columns
        .classes
        .iter()
        .enumerate()
        .flat_map(|(i, class)| class.ranges(i as u16))
        .collect();
    ranges.sort_by_key(|r| r.first);

    let machine = Machine {
        columns: columns.classes,
        ranges,
        num_states,
        num_transitional: bands[0].len() + bands[1].len(),
        num_success: bands[1].len() + bands[2].len(),
        transitions,
        success_rules,
        start_states,
        min_pre: pass.min_pre,
        max_pre: pass.max_pre,
        raw_states: raw.states.len(),
        merged_states: raw.merged(),
    };
    tracing::debug!(
        columns = machine.columns.len(),
        states = machine.num_states,
        raw = machine.raw_states,
        merged = machine.merged_states,
        "built state machine"
    );
    Ok(Some(machine))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precontext;
    use crate::rule::Output;
    use crate::testing::*;

    fn machine(class_glyphs: Vec<Vec<u16>>, rules: Vec<crate::rule::Rule>) -> Machine {
        let r = renderer(class_glyphs, vec![]);
        let mut pass = Pass::new(rules);
        precontext::normalize(&mut pass);
        build(&pass, &r, &font(10)).unwrap().unwrap()
    }

    #[test]
    fn two_rules_sharing_a_prefix() {
        // A B > X; A C > Y;
        let m = machine(
            vec![vec![1], vec![2], vec![3], vec![4], vec![5]],
            vec![
                rule(vec![context(0), subst(1, Output::Class(3))]),
                rule(vec![context(0), subst(2, Output::Class(4))]),
            ],
        );
        assert_eq!(m.columns.len(), 3);
        assert_eq!(m.num_states, 4);
        assert_eq!(m.num_transitional, 2);
        assert_eq!(m.num_success, 2);
        assert_eq!(m.transitions, vec![vec![1, 0, 0], vec![0, 2, 3]]);
        assert_eq!(m.success_rules, vec![vec![0], vec![1]]);
        assert_eq!(m.start_states, vec![0]);
        assert_eq!(m.merged_states, 0);
    }

    #[test]
    fn equivalent_states_are_merged() {
        let m = machine(
            vec![vec![1, 2], vec![7], vec![5], vec![1], vec![8]],
            vec![
                rule(vec![context(0), subst(1, Output::Class(1))]),
                rule(vec![context(2), context(3), subst(4, Output::Class(4))]),
            ],
        );
        // The ANY padding splits state 0 six ways; only the column of glyph 5 stays apart.
        assert_eq!(m.raw_states, 14);
        assert_eq!(m.merged_states, 7);
        assert_eq!(m.num_states, 7);
        assert!(m.num_states <= m.raw_states);
        let via_1 = m.next_state(0, m.column(Glyph(1)).unwrap());
        let via_2 = m.next_state(0, m.column(Glyph(2)).unwrap());
        assert!(via_1.is_some());
        assert_eq!(via_1, via_2);
    }

    #[test]
    fn rule_lists_are_sorted_by_precedence() {
        // Both rules succeed on the same glyphs, the longer one is tried first.
        let m = machine(
            vec![vec![1], vec![2], vec![3]],
            vec![
                rule(vec![subst(0, Output::Class(2)), context(1)]),
                rule(vec![any(), subst(0, Output::Class(2)), context(1)]),
            ],
        );
        assert_eq!(m.start_states.len(), 2);
        let mut state = m.start_states[1];
        for glyph in [1, 2] {
            state = m.next_state(state, m.column(Glyph(glyph)).unwrap()).unwrap();
        }
        assert_eq!(m.rules_at(state), &[1, 0]);
    }

    #[test]
    fn start_states_follow_phantom_glyphs() {
        let m = machine(
            vec![vec![1], vec![2]],
            vec![
                rule(vec![subst(0, Output::Class(1))]),
                rule(vec![context(1), context(1), subst(0, Output::Class(1))]),
            ],
        );
        assert_eq!((m.min_pre, m.max_pre), (0, 2));
        assert_eq!(m.start_states.len(), 3);
        assert_eq!(m.start_states[0], 0);
        let phantom = m.column(font(10).phantom_glyph()).unwrap();
        let once = m.next_state(0, phantom).unwrap();
        assert_eq!(m.start_states[1], once);
        assert_eq!(m.start_states[2], m.next_state(once, phantom).unwrap());
    }

    #[test]
    fn every_final_index_appears_once() {
        let m = machine(
            vec![vec![1, 2], vec![7], vec![5], vec![1], vec![8]],
            vec![
                rule(vec![context(0), subst(1, Output::Class(1))]),
                rule(vec![context(2), context(3), subst(4, Output::Class(4))]),
            ],
        );
        let mut targets: Vec<u16> = m.transitions.iter().flatten().copied().collect();
        targets.retain(|t| *t != 0);
        targets.sort();
        targets.dedup();
        assert_eq!(targets, (1..m.num_states as u16).collect::<Vec<_>>());
    }

    #[test]
    fn pass_without_usable_rules() {
        let r = renderer(vec![vec![1]], vec![]);
        let mut bad = rule(vec![subst(0, Output::Deletion)]);
        bad.bad = true;
        let pass = Pass::new(vec![bad]);
        assert_eq!(build(&pass, &r, &font(4)), Ok(None));
        assert_eq!(pass.max_rule_context(), 0);
    }

    #[test]
    fn column_lookup() {
        let m = machine(
            vec![vec![1, 2, 3, 6], vec![4]],
            vec![rule(vec![subst(0, Output::Class(1))])],
        );
        assert_eq!(m.column(Glyph(0)), None);
        assert_eq!(m.column(Glyph(2)), Some(0));
        assert_eq!(m.column(Glyph(6)), Some(0));
        assert_eq!(m.column(Glyph(5)), None);
        assert_eq!(m.ranges.len(), 2);
    }
}
