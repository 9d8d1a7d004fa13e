//! State construction
//!
//! A raw state records the rules still matching after some number of slots.
//! From a state with `k` slots matched, a rule whose input is `k` items long succeeds
//!     there, and every other rule moves on to the successor state of each column its
//!     `k`-th input item matches.
//! Once all transitions out of group `k` exist, the states of group `k + 1` with the
//!     same matched and succeeded rules are merged into the earliest of them.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// A usable rule as the builder sees it.
pub(super) struct InputRule {
    /// Index of the rule in its pass.
    pub index: usize,
    /// Relevant-symbol ID of each input item.
    pub inputs: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct RawState {
    pub slots: usize,
    /// Successor state for each column.
    pub cells: Vec<Option<usize>>,
    /// Positions in the input rule list, ascending.
    pub matched: Vec<usize>,
    pub succeeded: Vec<usize>,
    pub merged_into: Option<usize>,
}

impl RawState {
    fn new(slots: usize, num_columns: usize, matched: Vec<usize>) -> RawState {
        RawState {
            slots,
            cells: vec![None; num_columns],
            matched,
            succeeded: vec![],
            merged_into: None,
        }
    }
}

pub(super) struct RawMachine {
    pub states: Vec<RawState>,
}

impl RawMachine {
    /// Follows merge targets to the state that stands for `state`.
    pub fn resolve(&self, state: usize) -> usize {
        let mut s = state;
        while let Some(target) = self.states[s].merged_into {
            s = target;
        }
        s
    }

    pub fn next(&self, state: usize, column: usize) -> Option<usize> {
        let from = self.resolve(state);
        self.states[from]
            .cells
            .get(column)
            .copied()
            .flatten()
            .map(|s| self.resolve(s))
    }

    pub fn merged(&self) -> usize {
        self.states
            .iter()
            .filter(|s| s.merged_into.is_some())
            .count()
    }
}

pub(super) fn build(
    rules: &[InputRule],
    symbol_columns: &[Vec<usize>],
    num_columns: usize,
) -> RawMachine {
    let mut states = vec![RawState::new(0, num_columns, (0..rules.len()).collect())];
    set_succeeded(&mut states, &[0], rules);
    let mut group = vec![0];
    let mut slots = 0;
    while !group.is_empty() {
        let mut next_group = vec![];
        for &s in &group {
            if states[s].merged_into.is_some() {
                continue;
            }
            let matched = states[s].matched.clone();
            for r in matched {
                let Some(&symbol) = rules[r].inputs.get(slots) else {
                    continue;
                };
                for &column in &symbol_columns[symbol] {
                    let target = match states[s].cells[column] {
                        Some(target) => target,
                        None => {
                            states.push(RawState::new(slots + 1, num_columns, vec![]));
                            let target = states.len() - 1;
                            states[s].cells[column] = Some(target);
                            next_group.push(target);
                            target
                        }
                    };
                    states[target].matched.push(r);
                }
            }
        }
        set_succeeded(&mut states, &next_group, rules);
        merge(&mut states, &next_group);
        group = next_group;
        slots += 1;
    }
    RawMachine { states }
}

fn set_succeeded(states: &mut [RawState], group: &[usize], rules: &[InputRule]) {
    for &s in group {
        let state = &mut states[s];
        state.succeeded = state
            .matched
            .iter()
            .copied()
            .filter(|r| rules[*r].inputs.len() == state.slots)
            .collect();
    }
}

/// Group members are in creation order, so the earliest equal state is kept.
fn merge(states: &mut [RawState], group: &[usize]) {
    let mut seen: HashMap<(Vec<usize>, Vec<usize>), usize> = HashMap::new();
    for &s in group {
        let key = (states[s].matched.clone(), states[s].succeeded.clone());
        match seen.entry(key) {
            Entry::Occupied(earliest) => states[s].merged_into = Some(*earliest.get()),
            Entry::Vacant(entry) => {
                entry.insert(s);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input_rule(index: usize, inputs: Vec<usize>) -> InputRule {
        InputRule { index, inputs }
    }

    #[test]
    fn merged_states_get_no_transitions() {
        // Symbol 0 covers columns 0 and 1, so both lead to a state matching only rule 0.
        let rules = vec![input_rule(0, vec![0, 1]), input_rule(1, vec![2])];
        let symbol_columns = vec![vec![0, 1], vec![3], vec![2]];
        let raw = build(&rules, &symbol_columns, 4);
        let first = raw.states[0].cells[0].unwrap();
        let second = raw.states[0].cells[1].unwrap();
        assert_ne!(first, second);
        assert_eq!(raw.states[second].merged_into, Some(first));
        assert!(raw.states[second].cells.iter().all(Option::is_none));
        assert_eq!(raw.next(0, 1), Some(first));
        assert_eq!(raw.merged(), 1);
    }

    #[test]
    fn success_and_continuation_in_one_state() {
        // Rule 0 is a prefix of rule 1.
        let rules = vec![input_rule(0, vec![0]), input_rule(1, vec![0, 0])];
        let raw = build(&rules, &[vec![0]], 1);
        let after_one = raw.states[0].cells[0].unwrap();
        assert_eq!(raw.states[after_one].succeeded, vec![0]);
        assert_eq!(raw.states[after_one].matched, vec![0, 1]);
        let after_two = raw.states[after_one].cells[0].unwrap();
        assert_eq!(raw.states[after_two].succeeded, vec![1]);
        assert_eq!(raw.states.len(), 3);
    }
}
