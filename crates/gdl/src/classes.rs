//! Replacement class IDs
//!
//! Substitution instructions name glyph classes by ID.
//! A class used as the output of a substitution is stored in definition order
//!     ("linear") so the engine can fetch the glyph at a given index.
//! A class used to find that index from an input glyph is stored sorted by glyph ID
//!     ("indexed") so the engine can binary search it.
//! Linear classes are numbered first.

use crate::diag::{DiagnosticKind, Diagnostics, Location};
use crate::rule::{ClassId, ItemKind, Output, Renderer, Rule, Symbol};
use font::Glyph;
use std::collections::{BTreeSet, HashMap};

/// Replacement class table.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReplacementClasses {
    /// Linear classes, indexed by ID.
    pub linear: Vec<Vec<Glyph>>,
    /// Indexed classes: pairs of glyph and its index in the class, sorted by glyph.
    /// The class with ID `linear.len() + i` is `indexed[i]`.
    pub indexed: Vec<Vec<(Glyph, u16)>>,
    output_ids: HashMap<ClassId, u16>,
    input_ids: HashMap<ClassId, u16>,
}

impl ReplacementClasses {
    /// Assigns IDs to every class used by a substitution in a usable rule.
    pub fn assign(renderer: &Renderer, diagnostics: &mut Diagnostics) -> ReplacementClasses {
        let mut outputs = BTreeSet::new();
        let mut inputs = BTreeSet::new();
        for table in renderer.tables.iter().filter(|t| !t.bad) {
            for pass in table.passes.iter() {
                for (_, rule) in pass.usable_rules() {
                    collect_roles(renderer, rule, &mut outputs, &mut inputs);
                }
            }
        }
        let mut result = ReplacementClasses::default();
        for &class in &outputs {
            let glyphs = &renderer.classes[class].glyphs;
            result
                .output_ids
                .insert(class, result.linear.len() as u16);
            result.linear.push(glyphs.clone());
        }
        for &class in &inputs {
            let glyphs = &renderer.classes[class].glyphs;
            if glyphs.len() <= 1 {
                if let Some(&id) = result.output_ids.get(&class) {
                    result.input_ids.insert(class, id);
                    continue;
                }
            }
            let id = (result.linear.len() + result.indexed.len()) as u16;
            result.input_ids.insert(class, id);
            let mut pairs: Vec<(Glyph, u16)> = vec![];
            for (i, glyph) in glyphs.iter().enumerate() {
                if !pairs.iter().any(|(g, _)| g == glyph) {
                    pairs.push((*glyph, i as u16));
                }
            }
            pairs.sort();
            result.indexed.push(pairs);
        }
        let count = result.len();
        if count > crate::MAX_REPLACEMENT_CLASSES {
            diagnostics.push(
                DiagnosticKind::TooManyReplacementClasses { count },
                Location::default(),
            );
        }
        tracing::debug!(
            linear = result.linear.len(),
            indexed = result.indexed.len(),
            "assigned replacement classes"
        );
        result
    }

    /// Total number of class IDs.
    pub fn len(&self) -> usize {
        self.linear.len() + self.indexed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn output_id(&self, class: ClassId) -> Option<u16> {
        self.output_ids.get(&class).copied()
    }

    pub fn input_id(&self, class: ClassId) -> Option<u16> {
        self.input_ids.get(&class).copied()
    }

    /// Index of a glyph within the class with the given ID.
    pub fn input_index(&self, id: u16, glyph: Glyph) -> Option<u16> {
        let id = id as usize;
        match self.linear.get(id) {
            Some(glyphs) => glyphs.iter().position(|g| *g == glyph).map(|i| i as u16),
            None => {
                let pairs = self.indexed.get(id - self.linear.len())?;
                pairs
                    .binary_search_by_key(&glyph, |(g, _)| *g)
                    .ok()
                    .map(|i| pairs[i].1)
            }
        }
    }

    /// Glyph at an index of a linear class.
    pub fn output_glyph(&self, id: u16, index: u16) -> Option<Glyph> {
        self.linear.get(id as usize)?.get(index as usize).copied()
    }
}

/// The input symbol of the slot that selects the output of a substitution item.
pub fn selector_symbol(rule: &Rule, item: usize) -> Option<Symbol> {
    let ItemKind::Substitution(s) = &rule.items.get(item)?.kind else {
        return None;
    };
    let source = match s.selector {
        None => item,
        Some(r) => r.item,
    };
    rule.items.get(source).map(|i| i.input)
}

fn collect_roles(
    renderer: &Renderer,
    rule: &Rule,
    outputs: &mut BTreeSet<ClassId>,
    inputs: &mut BTreeSet<ClassId>,
) {
    for (i, item) in rule.items.iter().enumerate() {
        let ItemKind::Substitution(s) = &item.kind else {
            continue;
        };
        let Output::Class(out) = s.output else {
            continue;
        };
        let Some(out_class) = renderer.class(out) else {
            continue;
        };
        outputs.insert(out);
        if out_class.glyphs.len() <= 1 {
            continue;
        }
        if let Some(Symbol::Class(input)) = selector_symbol(rule, i) {
            if renderer.class(input).is_some() {
                inputs.insert(input);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::TableKind;
    use crate::testing::*;

    #[test]
    fn linear_first_then_indexed() {
        let r = renderer(
            vec![vec![5, 3, 4], vec![10, 11, 12], vec![20]],
            vec![table(
                TableKind::Substitution,
                vec![vec![
                    rule(vec![subst(0, Output::Class(1))]),
                    rule(vec![subst(2, Output::Class(2))]),
                ]],
            )],
        );
        let mut diagnostics = Diagnostics::default();
        let classes = ReplacementClasses::assign(&r, &mut diagnostics);
        assert!(diagnostics.is_empty());
        assert_eq!(classes.output_id(1), Some(0));
        assert_eq!(classes.output_id(2), Some(1));
        assert_eq!(classes.input_id(0), Some(2));
        assert_eq!(classes.input_id(2), None);
        assert_eq!(classes.len(), 3);
        assert_eq!(
            classes.indexed[0],
            vec![(Glyph(3), 1), (Glyph(4), 2), (Glyph(5), 0)]
        );
        assert_eq!(classes.input_index(2, Glyph(4)), Some(2));
        assert_eq!(classes.input_index(2, Glyph(6)), None);
        assert_eq!(classes.output_glyph(0, 2), Some(Glyph(12)));
    }

    #[test]
    fn single_glyph_input_reuses_output_id() {
        let r = renderer(
            vec![vec![1], vec![7, 8]],
            vec![table(
                TableKind::Substitution,
                vec![vec![
                    rule(vec![subst(1, Output::Class(0))]),
                    rule(vec![subst(0, Output::Class(1))]),
                ]],
            )],
        );
        let classes = ReplacementClasses::assign(&r, &mut Diagnostics::default());
        assert_eq!(classes.output_id(0), Some(0));
        assert_eq!(classes.input_id(0), Some(0));
        assert_eq!(classes.len(), 2);
        assert_eq!(classes.input_index(0, Glyph(1)), Some(0));
    }
}
