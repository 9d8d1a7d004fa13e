//! Builders for small rule programs used in tests.

use crate::attr::SlotAttr;
use crate::expr::{Expr, SlotRef};
use crate::rule::*;
use font::MemoryFont;

pub fn font(glyph_count: u16) -> MemoryFont {
    MemoryFont::new(glyph_count)
}

pub fn classes(classes: Vec<Vec<u16>>) -> Vec<GlyphClass> {
    classes
        .into_iter()
        .enumerate()
        .map(|(i, glyphs)| GlyphClass::new(format!("c{i}"), glyphs))
        .collect()
}

pub fn renderer(class_glyphs: Vec<Vec<u16>>, tables: Vec<Table>) -> Renderer {
    Renderer {
        classes: classes(class_glyphs),
        tables,
        bidi_pass: None,
    }
}

pub fn table(kind: TableKind, passes: Vec<Vec<Rule>>) -> Table {
    Table::new(kind, passes.into_iter().map(Pass::new).collect())
}

pub fn rule(items: Vec<RuleItem>) -> Rule {
    Rule::new(items)
}

pub fn context(class: ClassId) -> RuleItem {
    RuleItem::new(Symbol::Class(class), ItemKind::Context)
}

pub fn any() -> RuleItem {
    RuleItem::new(Symbol::Any, ItemKind::Context)
}

pub fn line_break() -> RuleItem {
    RuleItem::new(Symbol::LineBreak, ItemKind::LineBreak)
}

pub fn substitution(output: Output) -> Substitution {
    Substitution {
        output,
        selector: None,
        associations: vec![],
        settings: vec![],
    }
}

pub fn subst(class: ClassId, output: Output) -> RuleItem {
    with_kind(class, ItemKind::Substitution(substitution(output)))
}

pub fn insertion(output_class: ClassId) -> RuleItem {
    RuleItem::new(
        Symbol::Empty,
        ItemKind::Substitution(substitution(Output::Class(output_class))),
    )
}

pub fn with_kind(class: ClassId, kind: ItemKind) -> RuleItem {
    RuleItem::new(Symbol::Class(class), kind)
}

pub fn with_settings(class: ClassId, settings: Vec<AttrSetting>) -> RuleItem {
    with_kind(class, ItemKind::SetAttr(settings))
}

pub fn set(attr: SlotAttr, value: Expr) -> AttrSetting {
    AttrSetting {
        attr,
        index: None,
        op: SetOp::Assign,
        value,
    }
}

pub fn attach_to(item: usize) -> AttrSetting {
    set(SlotAttr::AttachTo, Expr::Slot(SlotRef::new(item)))
}
