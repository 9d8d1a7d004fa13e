//! Pre-context padding
//!
//! The state machine of a pass starts matching every rule at the same position,
//!     so all rules in a pass must have the same number of items before their first
//!     modified item.
//! Rules with a shorter pre-context are padded with synthetic `ANY` items.

use crate::rule::{ItemKind, Pass, RuleItem, Symbol};

/// Pads the usable rules of a pass and sets its pre-context bounds.
///
/// Running this twice is the same as running it once.
pub fn normalize(pass: &mut Pass) {
    let mut bounds: Option<(usize, usize)> = None;
    for rule in pass.rules.iter_mut() {
        if !rule.is_usable() {
            continue;
        }
        rule.pre_context = rule.leading() - rule.prepended;
        let own = rule.pre_context;
        bounds = Some(match bounds {
            None => (own, own),
            Some((min, max)) => (min.min(own), max.max(own)),
        });
    }
    let (min_pre, max_pre) = bounds.unwrap_or((0, 0));
    pass.min_pre = min_pre;
    pass.max_pre = max_pre;
    if pass.bad {
        return;
    }
    for rule in pass.rules.iter_mut().filter(|r| r.is_usable()) {
        let n = max_pre - rule.leading();
        if n == 0 {
            continue;
        }
        for item in rule.items.iter_mut() {
            for r in item.slot_refs_mut() {
                r.item += n;
            }
        }
        for constraint in rule.constraints.iter_mut() {
            for r in constraint.slot_refs_mut() {
                r.item += n;
            }
        }
        if let Some(caret) = &mut rule.caret {
            *caret += n;
        }
        let padding = (0..n).map(|_| RuleItem {
            synthetic: true,
            ..RuleItem::new(Symbol::Any, ItemKind::Context)
        });
        rule.items.splice(0..0, padding);
        rule.prepended += n;
    }
    tracing::debug!(min_pre, max_pre, "normalized pre-context");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::SlotRef;
    use crate::rule::{Output, Pass};
    use crate::testing::*;

    fn sample_pass() -> Pass {
        let mut short = rule(vec![subst(1, Output::Class(2)), context(0)]);
        short.caret = Some(1);
        let mut sub = substitution(Output::Copy);
        sub.selector = Some(SlotRef::new(0));
        let long = rule(vec![
            context(0),
            context(3),
            with_kind(1, crate::rule::ItemKind::Substitution(sub)),
        ]);
        Pass::new(vec![short, long])
    }

    #[test]
    fn pads_to_longest_pre_context() {
        let mut pass = sample_pass();
        normalize(&mut pass);
        assert_eq!((pass.min_pre, pass.max_pre), (0, 2));
        let short = &pass.rules[0];
        assert_eq!(short.items.len(), 4);
        assert_eq!(short.prepended, 2);
        assert!(short.items[0].synthetic && short.items[1].synthetic);
        assert_eq!(short.items[0].input, Symbol::Any);
        assert_eq!(short.caret, Some(3));
        assert_eq!(short.sort_key(), 2);
        assert_eq!(pass.rules[1].prepended, 0);
    }

    #[test]
    fn zero_padding_changes_nothing() {
        let mut pass = sample_pass();
        let before = pass.rules[1].clone();
        normalize(&mut pass);
        assert_eq!(pass.rules[1].items, before.items);
    }

    #[test]
    fn idempotent() {
        let mut pass = sample_pass();
        normalize(&mut pass);
        let once = pass.clone();
        normalize(&mut pass);
        assert_eq!(pass, once);
    }

    #[test]
    fn shifts_slot_references() {
        let mut sub = substitution(Output::Copy);
        sub.selector = Some(SlotRef::new(1));
        let short = rule(vec![
            with_kind(1, crate::rule::ItemKind::Substitution(sub)),
            context(0),
        ]);
        let long = rule(vec![context(0), subst(1, Output::Class(2))]);
        let mut pass = Pass::new(vec![short, long]);
        normalize(&mut pass);
        let selector = pass.rules[0].items[1]
            .substitution()
            .and_then(|s| s.selector)
            .map(|s| s.item);
        assert_eq!(selector, Some(2));
    }

    #[test]
    fn bad_rules_are_left_alone() {
        let mut pass = sample_pass();
        pass.rules[0].bad = true;
        normalize(&mut pass);
        assert_eq!((pass.min_pre, pass.max_pre), (2, 2));
        assert_eq!(pass.rules[0].items.len(), 2);
    }
}
