//! Input and output stream indices
//!
//! A rule is written as a list of items,
//!     but the engine sees two streams:
//!     the glyphs the rule matched (input) and the glyphs it leaves behind (output).
//! Insertions have no input glyph and deletions have no output glyph,
//!     so an item's position in the rule is not its position in either stream.
//! This module assigns each item its stream indices and rewrites every slot reference
//!     to use them.
//! After it runs no downstream code needs to translate slot references again.

use crate::expr::{Expr, SlotRef};
use crate::rule::{ItemKind, Rule, Symbol};

/// Position of an item in the input or output stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotIndex {
    /// The item occupies position `n` of the stream.
    Real(u16),
    /// The item is an insertion: it has no input glyph and is inserted before the
    ///     item whose input index is `n`.
    InsertBefore(u16),
    /// The item is a deletion: it has no output glyph.
    /// The next surviving item gets output index `n`.
    DeleteAt(u16),
}

impl SlotIndex {
    /// The stream position the index refers to.
    ///
    /// For insertions and deletions this is the position of the nearest following real item.
    pub fn position(&self) -> u16 {
        match self {
            SlotIndex::Real(n) | SlotIndex::InsertBefore(n) | SlotIndex::DeleteAt(n) => *n,
        }
    }

    pub fn is_real(&self) -> bool {
        matches!(self, SlotIndex::Real(_))
    }
}

impl std::fmt::Display for SlotIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotIndex::Real(n) => write!(f, "{n}"),
            SlotIndex::InsertBefore(n) => write!(f, "insert-before({n})"),
            SlotIndex::DeleteAt(n) => write!(f, "delete-at({n})"),
        }
    }
}

/// Assigns stream indices to the items of a rule and resolves all of its slot references.
///
/// Slot references that name an item outside the rule are left unresolved;
///     the error-checking pass rejects such rules before this runs.
pub fn resolve(rule: &mut Rule) {
    let mut input = 0_u16;
    let mut output = 0_u16;
    for item in &mut rule.items {
        let is_insertion = item.input == Symbol::Empty;
        let is_deletion = item.is_deletion();
        item.input_index = Some(if is_insertion {
            SlotIndex::InsertBefore(input)
        } else {
            input += 1;
            SlotIndex::Real(input - 1)
        });
        item.output_index = Some(if is_deletion {
            SlotIndex::DeleteAt(output)
        } else {
            output += 1;
            SlotIndex::Real(output - 1)
        });
    }
    let input_map: Vec<SlotIndex> = rule.items.iter().filter_map(|i| i.input_index).collect();
    let output_map: Vec<SlotIndex> = rule.items.iter().filter_map(|i| i.output_index).collect();

    let resolve_input = |r: &mut SlotRef| r.stream = input_map.get(r.item).copied();
    let resolve_output = |r: &mut SlotRef| r.stream = output_map.get(r.item).copied();
    let resolve_expr = |e: &mut Expr| {
        for r in e.slot_refs_mut() {
            resolve_input(r);
        }
    };

    for constraint in &mut rule.constraints {
        resolve_expr(constraint);
    }
    for item in &mut rule.items {
        if let Some(constraint) = &mut item.constraint {
            resolve_expr(constraint);
        }
        let (settings, substitution) = match &mut item.kind {
            ItemKind::Context | ItemKind::LineBreak => continue,
            ItemKind::SetAttr(settings) => (settings, None),
            ItemKind::Substitution(s) => (&mut s.settings, Some((&mut s.selector, &mut s.associations))),
        };
        if let Some((selector, associations)) = substitution {
            if let Some(selector) = selector {
                resolve_input(selector);
            }
            for association in associations {
                resolve_input(association);
            }
        }
        for setting in settings {
            match (setting.attr, &mut setting.value) {
                (crate::attr::SlotAttr::AttachTo, Expr::Slot(target)) => resolve_output(target),
                (_, value) => resolve_expr(value),
            }
        }
    }

    rule.output_advance = Some(match rule.caret {
        None => output,
        Some(caret) => match rule.items.get(caret).and_then(|i| i.output_index) {
            None => output,
            Some(index) => index.position(),
        },
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::Output;
    use crate::testing::*;

    #[test]
    fn plain_items_consume_both_counters() {
        let mut rule = rule(vec![context(0), subst(1, Output::Class(2))]);
        resolve(&mut rule);
        assert_eq!(rule.items[0].input_index, Some(SlotIndex::Real(0)));
        assert_eq!(rule.items[1].input_index, Some(SlotIndex::Real(1)));
        assert_eq!(rule.items[1].output_index, Some(SlotIndex::Real(1)));
        assert_eq!(rule.output_advance, Some(2));
    }

    #[test]
    fn insertion_and_deletion() {
        // A _ B > A X _ ; the insertion goes before B, B is deleted.
        let mut rule = rule(vec![
            context(0),
            insertion(2),
            subst(1, Output::Deletion),
            context(3),
        ]);
        resolve(&mut rule);
        let inputs: Vec<_> = rule.items.iter().map(|i| i.input_index.unwrap()).collect();
        let outputs: Vec<_> = rule.items.iter().map(|i| i.output_index.unwrap()).collect();
        assert_eq!(
            inputs,
            vec![
                SlotIndex::Real(0),
                SlotIndex::InsertBefore(1),
                SlotIndex::Real(1),
                SlotIndex::Real(2)
            ]
        );
        assert_eq!(
            outputs,
            vec![
                SlotIndex::Real(0),
                SlotIndex::Real(1),
                SlotIndex::DeleteAt(2),
                SlotIndex::Real(2)
            ]
        );
        assert_eq!(rule.output_advance, Some(3));
    }

    #[test]
    fn real_indices_are_in_order_and_encodings_point_forward() {
        let mut rule = rule(vec![
            insertion(2),
            subst(0, Output::Deletion),
            subst(1, Output::Deletion),
            context(0),
            insertion(2),
        ]);
        resolve(&mut rule);
        let mut next_input = 0;
        let mut next_output = 0;
        for item in &rule.items {
            match item.input_index.unwrap() {
                SlotIndex::Real(n) => {
                    assert_eq!(n, next_input);
                    next_input += 1;
                }
                SlotIndex::InsertBefore(n) => assert_eq!(n, next_input),
                SlotIndex::DeleteAt(_) => panic!("deletion encoding in the input stream"),
            }
            match item.output_index.unwrap() {
                SlotIndex::Real(n) => {
                    assert_eq!(n, next_output);
                    next_output += 1;
                }
                SlotIndex::DeleteAt(n) => assert_eq!(n, next_output),
                SlotIndex::InsertBefore(_) => panic!("insertion encoding in the output stream"),
            }
        }
        assert_eq!(next_input, 3);
        assert_eq!(next_output, 3);
    }

    #[test]
    fn caret_on_deleted_item_resolves_to_insertion_point() {
        let mut rule = rule(vec![context(0), subst(1, Output::Deletion), context(0)]);
        rule.caret = Some(1);
        resolve(&mut rule);
        assert_eq!(rule.output_advance, Some(1));
    }

    #[test]
    fn selectors_use_input_map_and_attach_uses_output_map() {
        // _ A B > X:3 @2 _ { attach.to = @4 } C
        let mut sub = substitution(Output::Copy);
        sub.selector = Some(SlotRef::new(2));
        let mut rule = rule(vec![
            insertion(2),
            with_kind(0, ItemKind::Substitution(sub)),
            subst(1, Output::Deletion),
            with_settings(3, vec![attach_to(4)]),
            context(0),
        ]);
        resolve(&mut rule);
        let ItemKind::Substitution(s) = &rule.items[1].kind else {
            panic!("expected substitution")
        };
        assert_eq!(s.selector.unwrap().stream, Some(SlotIndex::Real(1)));
        let ItemKind::SetAttr(settings) = &rule.items[3].kind else {
            panic!("expected attribute setter")
        };
        let Expr::Slot(target) = &settings[0].value else {
            panic!("expected slot reference")
        };
        assert_eq!(target.stream, Some(SlotIndex::Real(3)));
    }
}
