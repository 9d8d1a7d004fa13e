//! Error checking
//!
//! This pass validates every rule against the table it lives in.
//! Rules, items and settings are checked independently of each other.
//! Fatal problems mark the smallest enclosing scope bad so later phases skip it;
//!     warnings are only recorded.
//!
//! After checking, the expressions of the remaining rules are simplified.

use crate::attr::{Access, Ops, SlotAttr, ValueType};
use crate::diag::{DiagnosticKind, Diagnostics, Location};
use crate::expr::{Expr, ExprType, Lookup};
use crate::rule::{
    ItemKind, Output, Pass, Renderer, Rule, RuleItem, SetOp, Substitution, Symbol, Table,
    TableKind,
};
use font::Font;

/// Checks the whole program.
///
/// Also puts the tables in pipeline order.
pub fn check(renderer: &mut Renderer, font: &dyn Font, diagnostics: &mut Diagnostics) {
    let _span = tracing::info_span!("check").entered();
    renderer.tables.sort_by_key(|t| t.kind);
    for i in 1..renderer.tables.len() {
        let kind = renderer.tables[i].kind;
        if renderer.tables[i - 1].kind == kind {
            diagnostics.push(DiagnosticKind::DuplicateTable(kind), Location::table(kind));
            renderer.tables[i].bad = true;
        }
    }

    let mut position = 0_usize;
    for t in 0..renderer.tables.len() {
        if renderer.tables[t].bad {
            continue;
        }
        let kind = renderer.tables[t].kind;
        for p in 0..renderer.tables[t].passes.len() {
            let ctx = PassContext {
                renderer: &*renderer,
                kind,
                pass_index: p,
                position,
            };
            let outcome = check_pass(&ctx, &renderer.tables[t].passes[p], diagnostics);
            let pass = &mut renderer.tables[t].passes[p];
            outcome.apply(pass);
            position += 1;
        }
        if kind == TableKind::Justification {
            check_justification_status(&renderer.tables[t], diagnostics);
        }
    }

    let count = renderer.tables.iter().filter(|t| !t.bad).map(|t| t.passes.len()).sum();
    if count > crate::MAX_PASSES {
        diagnostics.push(DiagnosticKind::TooManyPasses { count }, Location::default());
        let mut seen = 0;
        for table in renderer.tables.iter_mut().filter(|t| !t.bad) {
            for pass in table.passes.iter_mut() {
                seen += 1;
                if seen > crate::MAX_PASSES {
                    pass.bad = true;
                }
            }
        }
    }

    for rule in renderer.rules_mut().filter(|r| !r.bad) {
        simplify_rule(rule, font);
    }
}

struct PassContext<'a> {
    renderer: &'a Renderer,
    kind: TableKind,
    pass_index: usize,
    /// Position of the pass among all passes, in pipeline order.
    position: usize,
}

#[derive(Default)]
struct PassOutcome {
    bad: bool,
    bad_rules: Vec<usize>,
    unmatchable_rules: Vec<usize>,
}

impl PassOutcome {
    fn apply(self, pass: &mut Pass) {
        pass.bad |= self.bad;
        for r in self.bad_rules {
            pass.rules[r].bad = true;
        }
        for r in self.unmatchable_rules {
            pass.rules[r].unmatchable = true;
        }
    }
}

fn check_pass(ctx: &PassContext, pass: &Pass, diagnostics: &mut Diagnostics) -> PassOutcome {
    let mut outcome = PassOutcome::default();
    if pass.rules.len() > crate::MAX_RULES_PER_PASS {
        diagnostics.push(
            DiagnosticKind::TooManyRules {
                count: pass.rules.len(),
            },
            Location::pass(ctx.kind, ctx.pass_index),
        );
        outcome.bad = true;
        return outcome;
    }
    for (r, rule) in pass.rules.iter().enumerate() {
        let location = Location::rule(ctx.kind, ctx.pass_index, r, rule.line);
        let mut checker = RuleChecker {
            ctx,
            rule,
            location,
            diagnostics: &mut *diagnostics,
            fatal: false,
        };
        checker.check();
        if checker.fatal {
            outcome.bad_rules.push(r);
            continue;
        }
        if let Some(class) = empty_input_class(ctx.renderer, rule) {
            diagnostics.push(DiagnosticKind::RuleNeverMatches { class }, location);
            outcome.unmatchable_rules.push(r);
        }
    }
    outcome
}

fn empty_input_class(renderer: &Renderer, rule: &Rule) -> Option<usize> {
    rule.items.iter().find_map(|item| match item.input {
        Symbol::Class(c) if renderer.symbol_size(item.input) == Some(0) => Some(c),
        _ => None,
    })
}

fn check_justification_status(table: &Table, diagnostics: &mut Diagnostics) {
    let tested = table
        .passes
        .iter()
        .flat_map(|p| p.rules.iter())
        .any(|rule| {
            rule.constraints.iter().any(Expr::tests_justify_mode)
                || rule
                    .items
                    .iter()
                    .filter_map(|i| i.constraint.as_ref())
                    .any(Expr::tests_justify_mode)
        });
    if !tested && table.passes.iter().any(|p| !p.rules.is_empty()) {
        diagnostics.push(
            DiagnosticKind::NoJustificationStatusTest,
            Location::table(table.kind),
        );
    }
}

struct RuleChecker<'a, 'b> {
    ctx: &'a PassContext<'a>,
    rule: &'a Rule,
    location: Location,
    diagnostics: &'b mut Diagnostics,
    fatal: bool,
}

impl<'a, 'b> RuleChecker<'a, 'b> {
    fn report(&mut self, kind: DiagnosticKind, item: Option<usize>) {
        let location = match item {
            None => self.location,
            Some(i) => self.location.with_item(i),
        };
        self.fatal |= self.diagnostics.push(kind, location);
    }

    fn allowed(&self) -> Ops {
        self.ctx.kind.allowed_ops()
    }

    fn check(&mut self) {
        let rule = self.rule;
        if rule.items.len() > crate::MAX_SLOTS_PER_RULE {
            self.report(
                DiagnosticKind::TooManySlots {
                    count: rule.items.len(),
                },
                None,
            );
        }
        if rule.items.iter().all(RuleItem::is_insertion) {
            self.report(DiagnosticKind::NoInputItems, None);
        }
        if rule.first_modified().is_none() {
            self.report(DiagnosticKind::NoModifiedItem, None);
        }
        if let Some(caret) = rule.caret {
            if caret > rule.items.len() {
                self.report(DiagnosticKind::CaretOutOfRange { caret }, None);
            }
        }
        for constraint in &rule.constraints {
            self.check_expr(constraint, None);
        }
        for (i, item) in rule.items.iter().enumerate() {
            self.check_item(i, item);
        }
    }

    fn check_class(&mut self, symbol: Symbol, item: usize) {
        if let Symbol::Class(c) = symbol {
            if self.ctx.renderer.class(c).is_none() {
                self.report(DiagnosticKind::UnknownClass(c), Some(item));
            }
        }
    }

    fn check_item(&mut self, i: usize, item: &RuleItem) {
        self.check_class(item.input, i);
        if item.is_line_break() && item.input != Symbol::LineBreak {
            self.report(DiagnosticKind::InvalidLineBreakItem, Some(i));
        }
        if let Some(constraint) = &item.constraint {
            if item.is_insertion() {
                self.report(DiagnosticKind::ConstraintOnInsertion, Some(i));
            }
            self.check_expr(constraint, Some(i));
        }
        if let ItemKind::Substitution(s) = &item.kind {
            self.check_substitution(i, item, s);
        }
        let settings = item.settings();
        let has_attach_to = settings.iter().any(|s| s.attr == SlotAttr::AttachTo);
        for setting in settings {
            let attr = setting.attr;
            let required = attr.required_ops();
            if !self.allowed().contains(required) {
                self.report(
                    DiagnosticKind::OperationNotAllowed {
                        what: format!("setting {attr}"),
                        table: self.ctx.kind,
                    },
                    Some(i),
                );
            } else if attr == SlotAttr::Dir
                && matches!(self.ctx.renderer.bidi_pass, Some(bidi) if self.ctx.position >= bidi)
            {
                self.report(DiagnosticKind::DirectionAfterBidi, Some(i));
            }
            if attr.access() == Access::ReadOnly {
                self.report(DiagnosticKind::AttrReadOnly(attr), Some(i));
            }
            if attr.is_indexed() != setting.index.is_some() {
                self.report(
                    DiagnosticKind::AttrIndexMismatch {
                        attr,
                        indexed: attr.is_indexed(),
                    },
                    Some(i),
                );
            }
            if attr.is_attachment_point() && !has_attach_to {
                self.report(DiagnosticKind::AttachmentWithoutAttachTo(attr), Some(i));
            }
            if item.is_deletion() {
                self.report(DiagnosticKind::SettingOnDeletedItem(attr), Some(i));
            }
            self.check_value(i, item, attr, setting.op, &setting.value);
        }
    }

    fn check_substitution(&mut self, i: usize, item: &RuleItem, s: &Substitution) {
        let renderer = self.ctx.renderer;
        if let Output::Class(c) = s.output {
            self.check_class(Symbol::Class(c), i);
        }
        let copies_self = s.output == Output::Copy && s.selector.map_or(true, |r| r.item == i);
        let changes_stream = item.is_insertion() || !copies_self;
        if changes_stream && !self.allowed().contains(Ops::SUBSTITUTION) {
            self.report(
                DiagnosticKind::OperationNotAllowed {
                    what: "substitution".into(),
                    table: self.ctx.kind,
                },
                Some(i),
            );
        }
        if item.is_insertion() {
            if copies_self {
                self.report(
                    DiagnosticKind::InvalidInsertion {
                        reason: "an inserted item cannot copy itself",
                    },
                    Some(i),
                );
            }
            if s.output == Output::Deletion {
                self.report(
                    DiagnosticKind::InvalidInsertion {
                        reason: "an inserted item cannot be deleted",
                    },
                    Some(i),
                );
            }
        }
        if let Some(selector) = s.selector {
            self.check_role(i, selector.item, "selector");
        }
        for association in &s.associations {
            self.check_role(i, association.item, "association");
        }
        if s.associations.len() > u8::MAX as usize {
            self.report(
                DiagnosticKind::TooManyAssociations {
                    count: s.associations.len(),
                },
                Some(i),
            );
        }

        let Output::Class(out) = s.output else {
            return;
        };
        let Some(out_size) = renderer.symbol_size(Symbol::Class(out)) else {
            return;
        };
        let source = s.selector.map_or(i, |r| r.item);
        let Some(source_symbol) = self.rule.items.get(source).map(|it| it.input) else {
            return;
        };
        match source_symbol {
            Symbol::Class(_) => {
                if let Some(in_size) = renderer.symbol_size(source_symbol) {
                    if out_size > 1 && in_size != out_size {
                        self.report(
                            DiagnosticKind::ClassSizeMismatch {
                                input: in_size,
                                output: out_size,
                            },
                            Some(i),
                        );
                    }
                }
            }
            Symbol::Any | Symbol::LineBreak => {
                if out_size > 1 {
                    self.report(
                        DiagnosticKind::SubstitutionFromUnindexable {
                            output_size: out_size,
                        },
                        Some(i),
                    );
                }
            }
            Symbol::Empty => {}
        }
    }

    fn check_role(&mut self, i: usize, slot: usize, role: &'static str) {
        let Some(target) = self.rule.items.get(slot) else {
            let kind = if role == "selector" {
                DiagnosticKind::SelectorOutOfRange { slot }
            } else {
                DiagnosticKind::AssociationOutOfRange { slot }
            };
            self.report(kind, Some(i));
            return;
        };
        let invalid_target = if target.is_line_break() {
            Some("a line-break item")
        } else if target.is_insertion() {
            Some("an inserted item")
        } else {
            None
        };
        if let Some(target) = invalid_target {
            self.report(DiagnosticKind::SlotRoleInvalid { slot, role, target }, Some(i));
        }
    }

    fn check_value(&mut self, i: usize, item: &RuleItem, attr: SlotAttr, op: SetOp, value: &Expr) {
        let expected = attr.value_type();
        let got = value.ty();
        if expected == ValueType::SlotRef {
            match value {
                Expr::Slot(target) => {
                    if target.item >= self.rule.items.len() {
                        self.report(
                            DiagnosticKind::SlotRefOutOfRange { slot: target.item },
                            Some(i),
                        );
                    } else if attr == SlotAttr::ComponentRef {
                        if self.rule.items[target.item].is_insertion() {
                            self.report(
                                DiagnosticKind::SlotRefToInsertion { slot: target.item },
                                Some(i),
                            );
                        }
                        let associations = item
                            .substitution()
                            .map(|s| s.associations.as_slice())
                            .unwrap_or(&[]);
                        if !associations.is_empty()
                            && !associations.iter().any(|a| a.item == target.item)
                        {
                            self.report(
                                DiagnosticKind::ComponentRefNotAssociated { slot: target.item },
                                Some(i),
                            );
                        }
                    }
                    if op != SetOp::Assign {
                        self.report(
                            DiagnosticKind::TypeMismatch {
                                attr,
                                expected: expected.into(),
                                got: ExprType::Number,
                            },
                            Some(i),
                        );
                    }
                }
                _ => self.report(
                    DiagnosticKind::TypeMismatch {
                        attr,
                        expected: expected.into(),
                        got,
                    },
                    Some(i),
                ),
            }
            return;
        }
        self.check_expr(value, Some(i));
        match (expected, got) {
            (_, ExprType::SlotRef) => self.report(
                DiagnosticKind::TypeMismatch {
                    attr,
                    expected: expected.into(),
                    got,
                },
                Some(i),
            ),
            (ValueType::Number | ValueType::Measurement, ExprType::Boolean) => self.report(
                DiagnosticKind::TypeMismatch {
                    attr,
                    expected: expected.into(),
                    got,
                },
                Some(i),
            ),
            (ValueType::Measurement, ExprType::Number) if *value != Expr::Number(0) => {
                self.report(DiagnosticKind::NumberAssignedToMeasurement(attr), Some(i))
            }
            _ => {}
        }
    }

    /// Checks an expression evaluated for item `current` (or the rule, if [None]).
    fn check_expr(&mut self, expr: &Expr, current: Option<usize>) {
        let mut found: Vec<DiagnosticKind> = vec![];
        let rule = self.rule;
        expr.visit(&mut |e| {
            match e {
                Expr::String(_) => found.push(DiagnosticKind::StringInExpression),
                Expr::Unary { op, operand } => {
                    let ty = operand.ty();
                    if !ty.is_scalar() && ty != ExprType::String {
                        found.push(DiagnosticKind::ExpressionTypeMismatch {
                            operator: format!("{op:?}"),
                            operand: ty,
                        });
                    }
                }
                Expr::Binary { op, lhs, rhs } => {
                    for ty in [lhs.ty(), rhs.ty()] {
                        if !ty.is_scalar() && ty != ExprType::String {
                            found.push(DiagnosticKind::ExpressionTypeMismatch {
                                operator: format!("{op:?}"),
                                operand: ty,
                            });
                        }
                    }
                }
                Expr::Cond { test, .. } => {
                    let ty = test.ty();
                    if !ty.is_scalar() && ty != ExprType::String {
                        found.push(DiagnosticKind::ExpressionTypeMismatch {
                            operator: "?:".into(),
                            operand: ty,
                        });
                    }
                }
                Expr::Lookup(Lookup::SlotAttr { attr, index, .. }) => {
                    if attr.access() == Access::WriteOnly {
                        found.push(DiagnosticKind::AttrWriteOnly(*attr));
                    }
                    if attr.is_indexed() != index.is_some() {
                        found.push(DiagnosticKind::AttrIndexMismatch {
                            attr: *attr,
                            indexed: attr.is_indexed(),
                        });
                    }
                }
                _ => {}
            }
        });
        for slot in expr.slot_refs() {
            match rule.items.get(slot.item) {
                None => found.push(DiagnosticKind::SlotRefOutOfRange { slot: slot.item }),
                Some(target) if target.is_insertion() && Some(slot.item) != current => {
                    found.push(DiagnosticKind::SlotRefToInsertion { slot: slot.item })
                }
                Some(_) => {}
            }
        }
        for kind in found {
            self.report(kind, current);
        }
    }
}

fn simplify_rule(rule: &mut Rule, font: &dyn Font) {
    let simplify = |e: &mut Expr| {
        if let Some(simpler) = e.simplify(font) {
            *e = simpler;
        }
    };
    rule.constraints.iter_mut().for_each(simplify);
    for item in rule.items.iter_mut() {
        if let Some(constraint) = &mut item.constraint {
            simplify(constraint);
        }
        if let Some(settings) = item.settings_mut() {
            for setting in settings {
                simplify(&mut setting.value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOp, SlotRef};
    use crate::rule::AttrSetting;
    use crate::testing::*;

    fn run(mut r: Renderer) -> (Renderer, Vec<u16>) {
        let mut diagnostics = Diagnostics::default();
        check(&mut r, &font(100), &mut diagnostics);
        (r, diagnostics.codes())
    }

    fn single_rule(kind: TableKind, rule: Rule) -> Renderer {
        renderer(
            vec![vec![1, 2], vec![3, 4], vec![5], vec![]],
            vec![table(kind, vec![vec![rule]])],
        )
    }

    macro_rules! check_tests {
        ( $( ($name: ident, $kind: expr, $rule: expr, $want_codes: expr, $want_bad: expr), )+ ) => {
            $(
                #[test]
                fn $name() {
                    let (r, codes) = run(single_rule($kind, $rule));
                    let want: Vec<u16> = $want_codes;
                    assert_eq!(codes, want);
                    assert_eq!(r.tables[0].passes[0].rules[0].bad, $want_bad);
                }
            )+
        };
    }

    fn with_selector(class: usize, output: Output, selector: usize) -> RuleItem {
        let mut s = substitution(output);
        s.selector = Some(SlotRef::new(selector));
        with_kind(class, ItemKind::Substitution(s))
    }

    fn with_constraint(mut item: RuleItem, constraint: Expr) -> RuleItem {
        item.constraint = Some(constraint);
        item
    }

    check_tests!(
        (
            valid_substitution,
            TableKind::Substitution,
            rule(vec![context(0), subst(0, Output::Class(1))]),
            vec![],
            false
        ),
        (
            no_modified_item,
            TableKind::Substitution,
            rule(vec![context(0), context(1)]),
            vec![2018],
            true
        ),
        (
            selector_out_of_range,
            TableKind::Substitution,
            rule(vec![with_selector(0, Output::Copy, 5)]),
            vec![2001],
            true
        ),
        (
            selector_on_line_break,
            TableKind::Substitution,
            rule(vec![line_break(), with_selector(0, Output::Copy, 0)]),
            vec![2003],
            true
        ),
        (
            selector_on_insertion,
            TableKind::Substitution,
            rule(vec![insertion(2), with_selector(0, Output::Copy, 0)]),
            vec![2003],
            true
        ),
        (
            insertion_copies_itself,
            TableKind::Substitution,
            rule(vec![
                context(0),
                RuleItem::new(Symbol::Empty, ItemKind::Substitution(substitution(Output::Copy)))
            ]),
            vec![2005],
            true
        ),
        (
            constraint_on_insertion,
            TableKind::Substitution,
            rule(vec![context(0), with_constraint(insertion(2), Expr::Number(1))]),
            vec![2004],
            true
        ),
        (
            class_size_mismatch,
            TableKind::Substitution,
            rule(vec![subst(2, Output::Class(0))]),
            vec![1002],
            false
        ),
        (
            too_many_associations,
            TableKind::Substitution,
            rule(vec![
                context(0),
                with_kind(
                    0,
                    ItemKind::Substitution(Substitution {
                        associations: vec![SlotRef::new(0); 256],
                        ..substitution(Output::Class(1))
                    })
                ),
            ]),
            vec![2031],
            true
        ),
        (
            substitution_from_any,
            TableKind::Substitution,
            rule(vec![RuleItem::new(
                Symbol::Any,
                ItemKind::Substitution(substitution(Output::Class(0)))
            )]),
            vec![2008],
            true
        ),
        (
            substitution_in_positioning,
            TableKind::Positioning,
            rule(vec![subst(0, Output::Class(1))]),
            vec![2009],
            true
        ),
        (
            positioning_in_substitution,
            TableKind::Substitution,
            rule(vec![with_settings(
                0,
                vec![set(SlotAttr::ShiftX, Expr::Measure { value: 10, scale: 1000 })]
            )]),
            vec![2009],
            true
        ),
        (
            read_only_attribute,
            TableKind::Positioning,
            rule(vec![with_settings(
                0,
                vec![set(SlotAttr::PositionX, Expr::Measure { value: 10, scale: 1000 })]
            )]),
            vec![2010],
            true
        ),
        (
            write_only_attribute_read,
            TableKind::Positioning,
            rule(vec![with_settings(
                0,
                vec![set(SlotAttr::ShiftX, Expr::slot_attr(SlotAttr::AttachTo, None))]
            )]),
            vec![2011, 2013],
            true
        ),
        (
            missing_index,
            TableKind::Substitution,
            rule(vec![with_settings(0, vec![set(SlotAttr::User, Expr::Number(1))])]),
            vec![2012],
            true
        ),
        (
            boolean_into_number,
            TableKind::Substitution,
            rule(vec![with_settings(
                0,
                vec![set(
                    SlotAttr::Break,
                    Expr::binary(BinaryOp::Lt, Expr::Number(1), Expr::Number(2))
                )]
            )]),
            vec![2013],
            true
        ),
        (
            number_into_measurement,
            TableKind::Positioning,
            rule(vec![with_settings(0, vec![set(SlotAttr::ShiftX, Expr::Number(5))])]),
            vec![1005],
            false
        ),
        (
            slot_ref_required,
            TableKind::Positioning,
            rule(vec![context(0), with_settings(0, vec![set(SlotAttr::AttachTo, Expr::Number(1))])]),
            vec![2013],
            true
        ),
        (
            attachment_without_attach_to,
            TableKind::Positioning,
            rule(vec![with_settings(0, vec![set(SlotAttr::AttachAtGpoint, Expr::Number(1))])]),
            vec![1006],
            false
        ),
        (
            setting_on_deleted_item,
            TableKind::Substitution,
            rule(vec![with_kind(
                0,
                ItemKind::Substitution(Substitution {
                    settings: vec![set(SlotAttr::Break, Expr::Number(1))],
                    ..substitution(Output::Deletion)
                })
            )]),
            vec![1007],
            false
        ),
        (
            slot_ref_out_of_range,
            TableKind::Substitution,
            rule(vec![with_constraint(
                subst(0, Output::Class(1)),
                Expr::binary(
                    BinaryOp::Gt,
                    Expr::slot_attr(SlotAttr::AdvanceX, Some(3)),
                    Expr::Number(0)
                )
            )]),
            vec![2006],
            true
        ),
        (
            slot_ref_to_insertion,
            TableKind::Substitution,
            rule(vec![
                insertion(2),
                with_constraint(
                    subst(0, Output::Class(1)),
                    Expr::binary(
                        BinaryOp::Gt,
                        Expr::slot_attr(SlotAttr::AdvanceX, Some(0)),
                        Expr::Number(0)
                    )
                )
            ]),
            vec![2007],
            true
        ),
        (
            string_in_expression,
            TableKind::Substitution,
            rule(vec![with_constraint(
                subst(0, Output::Class(1)),
                Expr::binary(BinaryOp::Eq, Expr::String("a".into()), Expr::Number(0))
            )]),
            vec![2024],
            true
        ),
        (
            slot_ref_as_operand,
            TableKind::Substitution,
            rule(vec![with_constraint(
                subst(0, Output::Class(1)),
                Expr::binary(BinaryOp::Add, Expr::Slot(SlotRef::new(0)), Expr::Number(1))
            )]),
            vec![2030],
            true
        ),
        (
            component_ref_not_associated,
            TableKind::Substitution,
            rule(vec![
                context(0),
                context(1),
                with_kind(
                    0,
                    ItemKind::Substitution(Substitution {
                        associations: vec![SlotRef::new(0)],
                        settings: vec![AttrSetting {
                            index: Some(0),
                            ..set(SlotAttr::ComponentRef, Expr::Slot(SlotRef::new(1)))
                        }],
                        ..substitution(Output::Class(2))
                    })
                )
            ]),
            vec![1001],
            false
        ),
        (
            never_matches,
            TableKind::Substitution,
            rule(vec![context(3), subst(0, Output::Class(1))]),
            vec![1009],
            false
        ),
        (
            caret_out_of_range,
            TableKind::Substitution,
            Rule {
                caret: Some(5),
                ..rule(vec![subst(0, Output::Class(1))])
            },
            vec![2023],
            true
        ),
        (
            line_break_item_must_match_line_break,
            TableKind::Substitution,
            rule(vec![RuleItem::new(Symbol::Any, ItemKind::LineBreak), subst(0, Output::Class(1))]),
            vec![2029],
            true
        ),
        (
            unknown_class,
            TableKind::Substitution,
            rule(vec![subst(9, Output::Class(1))]),
            vec![2022],
            true
        ),
    );

    #[test]
    fn never_matching_rule_is_not_usable() {
        let (r, _) = run(single_rule(
            TableKind::Substitution,
            rule(vec![context(3), subst(0, Output::Class(1))]),
        ));
        let rule = &r.tables[0].passes[0].rules[0];
        assert!(rule.unmatchable);
        assert!(!rule.is_usable());
    }

    #[test]
    fn duplicate_tables() {
        let r = renderer(
            vec![vec![1]],
            vec![
                table(TableKind::Positioning, vec![]),
                table(TableKind::Substitution, vec![]),
                table(TableKind::Positioning, vec![]),
            ],
        );
        let (r, codes) = run(r);
        assert_eq!(codes, vec![2021]);
        assert_eq!(r.tables[0].kind, TableKind::Substitution);
        assert!(!r.tables[1].bad);
        assert!(r.tables[2].bad);
    }

    #[test]
    fn justification_status_warning() {
        let plain = rule(vec![with_settings(
            0,
            vec![AttrSetting {
                index: Some(0),
                ..set(SlotAttr::JustifyWeight, Expr::Number(1))
            }],
        )]);
        let (_, codes) = run(single_rule(TableKind::Justification, plain.clone()));
        assert_eq!(codes, vec![1003]);

        let mut tested = plain;
        tested.constraints.push(Expr::binary(
            BinaryOp::Eq,
            Expr::Lookup(Lookup::ProcState(crate::attr::ProcState::JustifyMode)),
            Expr::Number(1),
        ));
        let (_, codes) = run(single_rule(TableKind::Justification, tested));
        assert_eq!(codes, Vec::<u16>::new());
    }

    #[test]
    fn direction_after_bidi() {
        let mut r = single_rule(
            TableKind::Substitution,
            rule(vec![with_settings(0, vec![set(SlotAttr::Dir, Expr::Number(1))])]),
        );
        r.bidi_pass = Some(0);
        let (_, codes) = run(r);
        assert_eq!(codes, vec![1004]);
    }

    #[test]
    fn too_many_passes() {
        let passes = (0..crate::MAX_PASSES + 1)
            .map(|_| vec![rule(vec![subst(0, Output::Class(1))])])
            .collect();
        let r = renderer(vec![vec![1], vec![2]], vec![table(TableKind::Substitution, passes)]);
        let (r, codes) = run(r);
        assert_eq!(codes, vec![2016]);
        assert!(!r.tables[0].passes[crate::MAX_PASSES - 1].bad);
        assert!(r.tables[0].passes[crate::MAX_PASSES].bad);
    }

    #[test]
    fn simplifies_expressions() {
        let (r, _) = run(single_rule(
            TableKind::Positioning,
            rule(vec![with_settings(
                0,
                vec![set(
                    SlotAttr::ShiftX,
                    Expr::binary(
                        BinaryOp::Mul,
                        Expr::Measure { value: 5, scale: 1000 },
                        Expr::Number(2),
                    ),
                )],
            )]),
        ));
        let settings = r.tables[0].passes[0].rules[0].items[0].settings();
        assert_eq!(settings[0].value, Expr::Measure { value: 10, scale: 1000 });
    }
}
