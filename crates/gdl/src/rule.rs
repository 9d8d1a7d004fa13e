//! The rule program
//!
//! A [Renderer] holds glyph classes and rule tables.
//! Tables hold passes, passes hold rules, and rules hold items.
//! The types here are what the compiler receives from the parser,
//!     and the compiler phases annotate them in place:
//!     padding items, stream indices, bad flags and so on.

use crate::attr::{Ops, SlotAttr};
use crate::expr::{Expr, SlotRef};
use crate::index::SlotIndex;
use font::Glyph;

/// A named glyph class, flattened.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlyphClass {
    pub name: String,
    /// Glyphs in definition order.
    pub glyphs: Vec<Glyph>,
}

impl GlyphClass {
    pub fn new<S: Into<String>>(name: S, glyphs: Vec<u16>) -> GlyphClass {
        GlyphClass {
            name: name.into(),
            glyphs: glyphs.into_iter().map(Glyph).collect(),
        }
    }
}

/// Index of a class in [Renderer::classes].
pub type ClassId = usize;

/// What a rule item matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Symbol {
    Class(ClassId),
    /// Every glyph, including the line-break and phantom glyphs.
    Any,
    /// The line-break glyph, written `#`.
    LineBreak,
    /// Nothing, written `_`. As an input this makes the item an insertion.
    Empty,
}

/// What a substitution item produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Output {
    /// The glyph of the selected slot, mapped through the input class into this class.
    Class(ClassId),
    /// The selected slot's glyph, unchanged. Written `@` or `@N`.
    Copy,
    /// Nothing: the item is deleted. Written `_`.
    Deletion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SetOp {
    Assign,
    Add,
    Sub,
}

/// An assignment to a slot attribute, like `shift.x += 10m`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AttrSetting {
    pub attr: SlotAttr,
    #[cfg_attr(feature = "serde", serde(default))]
    pub index: Option<u8>,
    #[cfg_attr(feature = "serde", serde(default = "default_set_op"))]
    pub op: SetOp,
    pub value: Expr,
}

#[cfg(feature = "serde")]
fn default_set_op() -> SetOp {
    SetOp::Assign
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Substitution {
    pub output: Output,
    /// The slot whose glyph selects the output glyph. [None] means the item itself.
    #[cfg_attr(feature = "serde", serde(default))]
    pub selector: Option<SlotRef>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub associations: Vec<SlotRef>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub settings: Vec<AttrSetting>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ItemKind {
    /// A plain item that is matched but not modified.
    Context,
    /// A `#` item.
    LineBreak,
    /// An item whose attributes are set but whose glyph is unchanged.
    SetAttr(Vec<AttrSetting>),
    Substitution(Substitution),
}

/// An item of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleItem {
    pub input: Symbol,
    #[cfg_attr(feature = "serde", serde(default))]
    pub constraint: Option<Expr>,
    pub kind: ItemKind,
    /// Whether the item was added by pre-context padding.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub synthetic: bool,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub input_index: Option<SlotIndex>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub output_index: Option<SlotIndex>,
}

impl RuleItem {
    pub fn new(input: Symbol, kind: ItemKind) -> RuleItem {
        RuleItem {
            input,
            constraint: None,
            kind,
            synthetic: false,
            input_index: None,
            output_index: None,
        }
    }

    /// Whether the item changes the glyph stream or slot attributes.
    pub fn is_modified(&self) -> bool {
        matches!(self.kind, ItemKind::SetAttr(_) | ItemKind::Substitution(_))
    }

    pub fn is_insertion(&self) -> bool {
        self.input == Symbol::Empty
    }

    pub fn is_deletion(&self) -> bool {
        matches!(
            &self.kind,
            ItemKind::Substitution(Substitution {
                output: Output::Deletion,
                ..
            })
        )
    }

    pub fn is_line_break(&self) -> bool {
        matches!(self.kind, ItemKind::LineBreak)
    }

    pub fn settings(&self) -> &[AttrSetting] {
        match &self.kind {
            ItemKind::SetAttr(settings) => settings,
            ItemKind::Substitution(s) => &s.settings,
            ItemKind::Context | ItemKind::LineBreak => &[],
        }
    }

    pub fn settings_mut(&mut self) -> Option<&mut Vec<AttrSetting>> {
        match &mut self.kind {
            ItemKind::SetAttr(settings) => Some(settings),
            ItemKind::Substitution(s) => Some(&mut s.settings),
            ItemKind::Context | ItemKind::LineBreak => None,
        }
    }

    pub fn substitution(&self) -> Option<&Substitution> {
        match &self.kind {
            ItemKind::Substitution(s) => Some(s),
            _ => None,
        }
    }

    /// Every slot reference held by the item: selector, associations,
    ///     and those in the constraint and setting values.
    pub fn slot_refs_mut(&mut self) -> Vec<&mut SlotRef> {
        let mut out: Vec<&mut SlotRef> = vec![];
        if let Some(constraint) = &mut self.constraint {
            out.extend(constraint.slot_refs_mut());
        }
        let settings = match &mut self.kind {
            ItemKind::Context | ItemKind::LineBreak => return out,
            ItemKind::SetAttr(settings) => settings,
            ItemKind::Substitution(s) => {
                out.extend(s.selector.as_mut());
                out.extend(s.associations.iter_mut());
                &mut s.settings
            }
        };
        for setting in settings {
            out.extend(setting.value.slot_refs_mut());
        }
        out
    }
}

/// A rule.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rule {
    pub items: Vec<RuleItem>,
    /// One boolean expression per `if`/`elseif` clause the rule sits under.
    #[cfg_attr(feature = "serde", serde(default))]
    pub constraints: Vec<Expr>,
    /// Index of the item scanning resumes at after the rule fires.
    /// A value equal to the number of items puts the caret at the end.
    #[cfg_attr(feature = "serde", serde(default))]
    pub caret: Option<usize>,
    /// Source line, used in diagnostics.
    #[cfg_attr(feature = "serde", serde(default))]
    pub line: u32,
    /// Number of synthetic items prepended by pre-context padding.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub prepended: usize,
    /// Number of leading unmodified items, not counting padding.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub pre_context: usize,
    /// Where scanning resumes in the output stream. Set by [crate::index::resolve].
    #[cfg_attr(feature = "serde", serde(skip))]
    pub output_advance: Option<u16>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub bad: bool,
    /// Set when an input item matches no glyph at all.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub unmatchable: bool,
}

impl Rule {
    pub fn new(items: Vec<RuleItem>) -> Rule {
        Rule {
            items,
            constraints: vec![],
            caret: None,
            line: 0,
            prepended: 0,
            pre_context: 0,
            output_advance: None,
            bad: false,
            unmatchable: false,
        }
    }

    /// Whether later phases should process the rule.
    pub fn is_usable(&self) -> bool {
        !self.bad && !self.unmatchable
    }

    pub fn first_modified(&self) -> Option<usize> {
        self.items.iter().position(RuleItem::is_modified)
    }

    pub fn last_modified(&self) -> Option<usize> {
        self.items.iter().rposition(RuleItem::is_modified)
    }

    /// Number of items before the first modified item.
    pub fn leading(&self) -> usize {
        self.first_modified().unwrap_or(self.items.len())
    }

    /// Precedence of the rule: longer rules are tried first.
    /// Padding does not count.
    pub fn sort_key(&self) -> usize {
        self.items.len() - self.prepended
    }

    /// Number of glyphs the rule matches.
    pub fn input_len(&self) -> usize {
        self.items.iter().filter(|i| !i.is_insertion()).count()
    }

    pub fn has_line_break(&self) -> bool {
        self.items.iter().any(RuleItem::is_line_break)
    }
}

/// A pass: rules that are matched together by one state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pass {
    pub rules: Vec<Rule>,
    /// How many times rules may fire at one position before the engine moves on.
    #[cfg_attr(feature = "serde", serde(default = "default_max_rule_loop"))]
    pub max_rule_loop: u8,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub bad: bool,
    /// Sequential ID over all passes with usable rules.
    #[cfg_attr(feature = "serde", serde(skip))]
    pub global_id: Option<u16>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub min_pre: usize,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub max_pre: usize,
}

#[cfg(feature = "serde")]
fn default_max_rule_loop() -> u8 {
    Pass::DEFAULT_MAX_RULE_LOOP
}

impl Pass {
    pub const DEFAULT_MAX_RULE_LOOP: u8 = 5;

    pub fn new(rules: Vec<Rule>) -> Pass {
        Pass {
            rules,
            max_rule_loop: Pass::DEFAULT_MAX_RULE_LOOP,
            bad: false,
            global_id: None,
            min_pre: 0,
            max_pre: 0,
        }
    }

    /// Rules later phases should process, with their indices.
    pub fn usable_rules(&self) -> impl Iterator<Item = (usize, &Rule)> {
        let bad = self.bad;
        self.rules
            .iter()
            .enumerate()
            .filter(move |(_, r)| !bad && r.is_usable())
    }

    pub fn has_usable_rules(&self) -> bool {
        self.usable_rules().next().is_some()
    }

    /// Largest number of items in a usable rule, padding included.
    pub fn max_rule_context(&self) -> usize {
        self.usable_rules()
            .map(|(_, r)| r.items.len())
            .max()
            .unwrap_or(0)
    }

    /// Whether a usable rule resumes scanning before its default position.
    pub fn has_reprocessing(&self) -> bool {
        self.usable_rules().any(|(_, r)| match r.caret {
            None => false,
            Some(caret) => caret <= r.last_modified().unwrap_or(r.items.len()),
        })
    }
}

/// Kind of rule table. The order of the variants is the order tables run in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TableKind {
    LineBreak,
    Substitution,
    Justification,
    Positioning,
}

impl TableKind {
    pub fn allowed_ops(&self) -> Ops {
        match self {
            TableKind::LineBreak => {
                Ops::BREAK | Ops::INSERT | Ops::USER | Ops::DIRECTION | Ops::PRE_BIDI
            }
            TableKind::Substitution => {
                Ops::SUBSTITUTION
                    | Ops::BREAK
                    | Ops::DIRECTION
                    | Ops::INSERT
                    | Ops::COMPONENTS
                    | Ops::USER
                    | Ops::PRE_BIDI
            }
            TableKind::Justification => {
                Ops::SUBSTITUTION
                    | Ops::JUSTIFICATION
                    | Ops::BREAK
                    | Ops::INSERT
                    | Ops::USER
                    | Ops::MEASURE
            }
            TableKind::Positioning => {
                Ops::POSITIONING | Ops::JUSTIFICATION | Ops::USER | Ops::MEASURE | Ops::INSERT
            }
        }
    }

    /// Whether rules in later passes of the table see the output of earlier passes,
    ///     so that context sizes compound.
    pub fn is_substitution_like(&self) -> bool {
        matches!(self, TableKind::Substitution | TableKind::Justification)
    }

    pub fn name(&self) -> &'static str {
        match self {
            TableKind::LineBreak => "linebreak",
            TableKind::Substitution => "substitution",
            TableKind::Justification => "justification",
            TableKind::Positioning => "positioning",
        }
    }
}

impl std::fmt::Display for TableKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Table {
    pub kind: TableKind,
    pub passes: Vec<Pass>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub bad: bool,
}

impl Table {
    pub fn new(kind: TableKind, passes: Vec<Pass>) -> Table {
        Table {
            kind,
            passes,
            bad: false,
        }
    }
}

/// A complete rule program.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Renderer {
    pub classes: Vec<GlyphClass>,
    pub tables: Vec<Table>,
    /// Position, counting all passes in pipeline order, of the pass the bidi algorithm runs before.
    #[cfg_attr(feature = "serde", serde(default))]
    pub bidi_pass: Option<usize>,
}

impl Renderer {
    pub fn class(&self, id: ClassId) -> Option<&GlyphClass> {
        self.classes.get(id)
    }

    /// Number of glyphs a symbol stands for, if it is finite and known.
    pub fn symbol_size(&self, symbol: Symbol) -> Option<usize> {
        match symbol {
            Symbol::Class(id) => self.class(id).map(|c| c.glyphs.len()),
            Symbol::LineBreak => Some(1),
            Symbol::Empty => Some(0),
            Symbol::Any => None,
        }
    }

    pub fn passes(&self) -> impl Iterator<Item = &Pass> {
        self.tables.iter().flat_map(|t| t.passes.iter())
    }

    pub fn rules_mut(&mut self) -> impl Iterator<Item = &mut Rule> {
        self.tables
            .iter_mut()
            .flat_map(|t| t.passes.iter_mut())
            .flat_map(|p| p.rules.iter_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn modified_items() {
        let rule = rule(vec![
            context(0),
            subst(1, Output::Class(2)),
            context(0),
            with_settings(0, vec![]),
            context(1),
        ]);
        assert_eq!(rule.first_modified(), Some(1));
        assert_eq!(rule.last_modified(), Some(3));
        assert_eq!(rule.leading(), 1);
        assert_eq!(rule.sort_key(), 5);
    }

    #[test]
    fn input_len_skips_insertions() {
        let rule = rule(vec![context(0), insertion(1), subst(1, Output::Deletion)]);
        assert_eq!(rule.input_len(), 2);
    }

    #[test]
    fn reprocessing() {
        let mut r = rule(vec![context(0), subst(1, Output::Class(2)), context(0)]);
        let mut pass = Pass::new(vec![r.clone()]);
        assert!(!pass.has_reprocessing());
        r.caret = Some(1);
        pass.rules.push(r);
        assert!(pass.has_reprocessing());
    }

    #[test]
    fn max_rule_context_ignores_bad_rules() {
        let mut long = rule(vec![context(0), context(0), subst(1, Output::Class(2))]);
        long.bad = true;
        let pass = Pass::new(vec![long, rule(vec![subst(1, Output::Class(2))])]);
        assert_eq!(pass.max_rule_context(), 1);
    }

    #[test]
    fn table_ops() {
        assert!(TableKind::LineBreak.allowed_ops().contains(Ops::PRE_BIDI));
        assert!(!TableKind::Positioning.allowed_ops().contains(Ops::SUBSTITUTION));
        assert!(TableKind::Justification.is_substitution_like());
        assert!(!TableKind::Positioning.is_substitution_like());
        assert!(TableKind::LineBreak < TableKind::Positioning);
    }
}
