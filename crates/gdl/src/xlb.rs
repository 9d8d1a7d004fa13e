//! Cross-line-boundary context
//!
//! When text is broken into lines the shaper reruns passes near the break.
//! It needs to know how many glyphs on either side of a line break a rule can look at.

use crate::rule::{Pass, Renderer, Rule, RuleItem, TableKind};

/// Number of glyphs a rule may touch on one side of a line break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Bound {
    Finite(u8),
    /// Reprocessing means any number of glyphs may be touched.
    Infinite,
}

impl Bound {
    /// Largest finite bound; larger counts saturate to it.
    pub const MAX_FINITE: u8 = 0xFE;

    pub fn finite(n: usize) -> Bound {
        Bound::Finite(n.min(Bound::MAX_FINITE as usize) as u8)
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Bound::Finite(n) => n,
            Bound::Infinite => 0xFF,
        }
    }

    pub fn from_byte(b: u8) -> Bound {
        match b {
            0xFF => Bound::Infinite,
            n => Bound::Finite(n),
        }
    }
}

impl Default for Bound {
    fn default() -> Self {
        Bound::Finite(0)
    }
}

impl std::fmt::Display for Bound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Bound::Finite(n) => write!(f, "{n}"),
            Bound::Infinite => write!(f, "infinite"),
        }
    }
}

/// The cross-line-boundary context of a whole program.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct XlbContext {
    /// Glyphs before a line break.
    pub pre: Bound,
    /// Glyphs after a line break.
    pub post: Bound,
    /// Whether any rule contains a line-break item.
    pub line_break: bool,
}

/// Largest number of real items before and after a line-break item, over the usable
///     rules of a pass.
fn pass_context(pass: &Pass) -> Option<(usize, usize)> {
    let mut result: Option<(usize, usize)> = None;
    for (_, rule) in pass.usable_rules() {
        for (pre, post) in rule_context(rule) {
            let (p, q) = result.unwrap_or((0, 0));
            result = Some((p.max(pre), q.max(post)));
        }
    }
    result
}

fn rule_context(rule: &Rule) -> impl Iterator<Item = (usize, usize)> + '_ {
    rule.items
        .iter()
        .enumerate()
        .filter(|(_, item)| item.is_line_break())
        .map(|(i, _)| {
            let real = |item: &&RuleItem| !item.synthetic;
            let pre = rule.items[..i].iter().filter(real).count();
            let post = rule.items[i + 1..].iter().filter(real).count();
            (pre, post)
        })
}

/// Computes the cross-line-boundary context.
///
/// The rules must have been padded.
pub fn analyze(renderer: &Renderer) -> XlbContext {
    let mut context = XlbContext {
        line_break: renderer
            .tables
            .iter()
            .flat_map(|t| t.passes.iter())
            .flat_map(|p| p.usable_rules())
            .any(|(_, r)| r.has_line_break()),
        ..Default::default()
    };
    let (mut pre, mut post) = (0_usize, 0_usize);
    let mut reprocessing = false;
    for table in renderer.tables.iter().filter(|t| !t.bad) {
        if table.kind == TableKind::LineBreak {
            continue;
        }
        let mut factor = 1_usize;
        for pass in &table.passes {
            reprocessing |= pass.has_reprocessing();
            if let Some((p, q)) = pass_context(pass) {
                if reprocessing {
                    tracing::debug!(table = %table.kind, "line-break rule after reprocessing");
                    return XlbContext {
                        pre: Bound::Infinite,
                        post: Bound::Infinite,
                        ..context
                    };
                }
                let (p, q) = if table.kind.is_substitution_like() {
                    (p.saturating_mul(factor), q.saturating_mul(factor))
                } else {
                    (p, q)
                };
                pre = pre.max(p);
                post = post.max(q);
            }
            if pass.has_usable_rules() {
                factor = factor.saturating_mul(pass.max_rule_context());
            }
        }
    }
    context.pre = Bound::finite(pre);
    context.post = Bound::finite(post);
    tracing::debug!(pre = %context.pre, post = %context.post, "cross-line-boundary context");
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::precontext;
    use crate::rule::{Output, Table};
    use crate::testing::*;

    fn analyze_tables(mut tables: Vec<Table>) -> XlbContext {
        for table in tables.iter_mut() {
            for pass in table.passes.iter_mut() {
                precontext::normalize(pass);
            }
        }
        analyze(&renderer(vec![vec![1], vec![2], vec![3], vec![4], vec![5]], tables))
    }

    #[test]
    fn line_break_in_the_middle() {
        // A B # C D
        let xlb = analyze_tables(vec![table(
            TableKind::Substitution,
            vec![vec![rule(vec![
                context(0),
                context(1),
                line_break(),
                subst(2, Output::Class(4)),
                context(3),
            ])]],
        )]);
        assert_eq!(
            xlb,
            XlbContext {
                pre: Bound::Finite(2),
                post: Bound::Finite(2),
                line_break: true,
            }
        );
    }

    #[test]
    fn padding_does_not_count() {
        let xlb = analyze_tables(vec![table(
            TableKind::Positioning,
            vec![vec![
                rule(vec![line_break(), subst(0, Output::Class(4))]),
                rule(vec![context(0), context(1), context(2), subst(3, Output::Class(4))]),
            ]],
        )]);
        assert_eq!(xlb.pre, Bound::Finite(0));
        assert_eq!(xlb.post, Bound::Finite(1));
    }

    #[test]
    fn earlier_passes_multiply_substitution_context() {
        let xlb = analyze_tables(vec![table(
            TableKind::Substitution,
            vec![
                vec![rule(vec![context(0), context(1), subst(2, Output::Class(4))])],
                vec![rule(vec![context(0), line_break(), subst(2, Output::Class(4))])],
            ],
        )]);
        assert_eq!(xlb.pre, Bound::Finite(3));
        assert_eq!(xlb.post, Bound::Finite(3));
    }

    #[test]
    fn positioning_takes_plain_max() {
        let xlb = analyze_tables(vec![table(
            TableKind::Positioning,
            vec![
                vec![rule(vec![context(0), context(1), subst(2, Output::Class(4))])],
                vec![rule(vec![context(0), line_break(), subst(2, Output::Class(4))])],
            ],
        )]);
        assert_eq!(xlb.pre, Bound::Finite(1));
    }

    #[test]
    fn reprocessing_upstream_is_infinite() {
        let mut reprocess = rule(vec![subst(0, Output::Class(4)), context(1)]);
        reprocess.caret = Some(0);
        let xlb = analyze_tables(vec![table(
            TableKind::Substitution,
            vec![
                vec![reprocess],
                vec![rule(vec![line_break(), subst(2, Output::Class(4))])],
            ],
        )]);
        assert_eq!(xlb.pre, Bound::Infinite);
        assert_eq!(xlb.post, Bound::Infinite);
        assert!(xlb.line_break);
    }

    #[test]
    fn reprocessing_in_an_earlier_table_is_infinite() {
        let mut reprocess = rule(vec![subst(0, Output::Class(4)), context(1)]);
        reprocess.caret = Some(0);
        let xlb = analyze_tables(vec![
            table(TableKind::Substitution, vec![vec![reprocess]]),
            table(
                TableKind::Positioning,
                vec![vec![rule(vec![line_break(), subst(2, Output::Class(4))])]],
            ),
        ]);
        assert_eq!(xlb.pre, Bound::Infinite);
        assert_eq!(xlb.post, Bound::Infinite);
        assert!(xlb.line_break);
    }

    #[test]
    fn line_break_table_is_exempt() {
        let xlb = analyze_tables(vec![table(
            TableKind::LineBreak,
            vec![vec![rule(vec![context(0), line_break(), subst(1, Output::Class(4))])]],
        )]);
        assert_eq!(xlb.pre, Bound::Finite(0));
        assert!(xlb.line_break);
    }

    #[test]
    fn bound_bytes() {
        assert_eq!(Bound::Infinite.to_byte(), 0xFF);
        assert_eq!(Bound::from_byte(0xFF), Bound::Infinite);
        assert_eq!(Bound::finite(1000), Bound::Finite(0xFE));
    }
}
