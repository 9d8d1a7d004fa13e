//! Rule code generation
//!
//! The action program starts with the engine's cursor on the first modified item.
//! Each item from there to the last modified item emits its effects and then `Next`.
//! Trailing unmodified items are covered by the return value, which tells the engine
//!     where scanning resumes relative to the cursor.
//!
//! The constraint program is run by the engine once for each input slot the rule matched.
//! Every constraint is wrapped in a `CntxtItem` guard naming the slot it belongs to,
//!     relative to the first modified item; the guard skips the constraint on other slots.

use super::{CodeBuffer, CodeError, Opcode, RuleCode};
use crate::attr::{SlotAttr, ValueType};
use crate::classes::{selector_symbol, ReplacementClasses};
use crate::expr::{CodeContext, Expr};
use crate::index::SlotIndex;
use crate::rule::{AttrSetting, ClassId, Output, Rule, SetOp, Symbol};
use crate::Version;

/// Everything code generation needs beyond the rule itself.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub version: Version,
    pub units_per_em: u16,
    pub classes: &'a ReplacementClasses,
}

/// Compiles the constraint and action programs of a rule.
///
/// The rule must have been padded and resolved.
pub fn compile_rule(rule: &Rule, ctx: &RuleContext) -> Result<RuleCode, CodeError> {
    Ok(RuleCode {
        constraints: constraint_code(rule, ctx)?,
        actions: action_code(rule, ctx)?,
    })
}

/// Lowest engine version that can run the code of a rule.
pub fn min_version(rule: &Rule, classes: &ReplacementClasses) -> Version {
    let mut version = Version::V1_0;
    for constraint in &rule.constraints {
        version = version.max(constraint.min_version());
    }
    let wide = |id: Option<u16>| id.is_some_and(|id| id > u8::MAX as u16);
    for (i, item) in rule.items.iter().enumerate() {
        if let Some(constraint) = &item.constraint {
            version = version.max(constraint.min_version());
        }
        for setting in item.settings() {
            version = version.max(setting.value.min_version());
            if setting.attr.value_type() == ValueType::Measurement {
                version = version.max(Version::V2_0);
            }
        }
        let Some(substitution) = item.substitution() else {
            continue;
        };
        if let Output::Class(class) = substitution.output {
            let input = match selector_symbol(rule, i) {
                Some(Symbol::Class(input)) => classes.input_id(input),
                _ => None,
            };
            if wide(classes.output_id(class)) || wide(input) {
                version = version.max(Version::V2_0);
            }
        }
    }
    if !forward_attachments(rule).is_empty() {
        version = version.max(Version::V2_0);
    }
    version
}

/// Items whose `attach.to` names a later item.
fn forward_attachments(rule: &Rule) -> Vec<usize> {
    rule.items
        .iter()
        .enumerate()
        .filter(|(i, item)| {
            item.settings().iter().any(|s| match (s.attr, &s.value) {
                (SlotAttr::AttachTo, Expr::Slot(target)) => target.item > *i,
                _ => false,
            })
        })
        .map(|(i, _)| i)
        .collect()
}

fn input_position(rule: &Rule, item: usize) -> Result<u16, CodeError> {
    rule.items[item]
        .input_index
        .map(|index| index.position())
        .ok_or(CodeError::UnresolvedSlotRef(item))
}

fn constraint_code(rule: &Rule, ctx: &RuleContext) -> Result<Vec<u8>, CodeError> {
    let anchor = match rule.first_modified() {
        None => 0,
        Some(first) => input_position(rule, first)? as i32,
    };
    let mut guarded: Vec<(i32, &Expr)> = rule.constraints.iter().map(|c| (anchor, c)).collect();
    for item in &rule.items {
        if let (Some(constraint), Some(SlotIndex::Real(n))) = (&item.constraint, item.input_index) {
            guarded.push((n as i32, constraint));
        }
    }
    let mut buf = CodeBuffer::default();
    if guarded.is_empty() {
        return Ok(buf.into_bytes());
    }
    for (i, (slot, expr)) in guarded.into_iter().enumerate() {
        let offset = slot - anchor;
        buf.op(Opcode::CntxtItem);
        buf.i8(i8::try_from(offset).map_err(|_| CodeError::SlotOffsetOutOfRange(offset))?);
        let skip = buf.placeholder_u8();
        let start = buf.len();
        expr.generate_code(
            &mut buf,
            &CodeContext {
                version: ctx.version,
                units_per_em: ctx.units_per_em,
                current: slot,
            },
        )?;
        let len = buf.len() - start;
        buf.patch_u8(
            skip,
            u8::try_from(len).map_err(|_| CodeError::ConstraintTooLong(len))?,
        );
        if i > 0 {
            buf.op(Opcode::And);
        }
    }
    buf.op(Opcode::PopRet);
    Ok(buf.into_bytes())
}

fn action_code(rule: &Rule, ctx: &RuleContext) -> Result<Vec<u8>, CodeError> {
    let mut buf = CodeBuffer::default();
    let (Some(first), Some(last)) = (rule.first_modified(), rule.last_modified()) else {
        buf.op(Opcode::RetZero);
        return Ok(buf.into_bytes());
    };
    // The item after a forward attachment must not be split from it.
    let followers: Vec<usize> = forward_attachments(rule)
        .into_iter()
        .map(|i| i + 1)
        .filter(|i| *i < rule.items.len())
        .collect();
    let extended = followers.contains(&(last + 1));
    let end = if extended { last + 1 } else { last };

    for i in first..=end {
        let item = &rule.items[i];
        let output = item.output_index.ok_or(CodeError::UnresolvedSlotRef(i))?;
        let expr_ctx = CodeContext {
            version: ctx.version,
            units_per_em: ctx.units_per_em,
            current: input_position(rule, i)? as i32,
        };
        if let Some(substitution) = item.substitution() {
            if item.is_insertion() {
                buf.op(Opcode::Insert);
            }
            match substitution.output {
                Output::Deletion => buf.op(Opcode::Delete),
                Output::Copy => {
                    buf.op(Opcode::PutCopy);
                    buf.i8(expr_ctx.slot_operand(substitution.selector.as_ref())?);
                }
                Output::Class(class) => put_glyph(&mut buf, rule, i, class, ctx, &expr_ctx)?,
            }
            if !substitution.associations.is_empty() {
                buf.op(Opcode::Assoc);
                let len = substitution.associations.len();
                buf.u8(u8::try_from(len).map_err(|_| CodeError::TooManyAssociations(len))?);
                for association in &substitution.associations {
                    buf.i8(expr_ctx.slot_operand(Some(association))?);
                }
            }
        }
        for setting in item.settings() {
            emit_setting(&mut buf, setting, output, &expr_ctx)?;
        }
        if followers.contains(&i) {
            buf.push_int(0);
            buf.op(Opcode::AttrSet);
            buf.u8(SlotAttr::Insert.code());
        }
        buf.op(Opcode::Next);
    }

    let cursor = match rule.items[end].output_index {
        Some(SlotIndex::Real(n)) => n as i32 + 1,
        Some(index) => index.position() as i32,
        None => return Err(CodeError::UnresolvedSlotRef(end)),
    };
    match (rule.caret, extended) {
        (None, false) => buf.op(Opcode::RetZero),
        (None, true) => {
            buf.push_int(-1);
            buf.op(Opcode::PopRet);
        }
        (Some(_), _) => {
            let advance = rule.output_advance.ok_or(CodeError::UnresolvedSlotRef(end))?;
            buf.push_int(advance as i32 - cursor);
            buf.op(Opcode::PopRet);
        }
    }
    Ok(buf.into_bytes())
}

fn put_glyph(
    buf: &mut CodeBuffer,
    rule: &Rule,
    item: usize,
    class: ClassId,
    ctx: &RuleContext,
    expr_ctx: &CodeContext,
) -> Result<(), CodeError> {
    let output = ctx
        .classes
        .output_id(class)
        .ok_or(CodeError::MissingClassId(class))?;
    let output_len = ctx.classes.linear.get(output as usize).map_or(0, Vec::len);
    let input = match selector_symbol(rule, item) {
        Some(Symbol::Class(input)) if output_len > 1 => Some(
            ctx.classes
                .input_id(input)
                .ok_or(CodeError::MissingClassId(input))?,
        ),
        _ => None,
    };
    let wide = ctx.version.has_wide_operands();
    let narrow = |id: u16| u8::try_from(id).map_err(|_| CodeError::OperandTooWide(id as u32));
    match input {
        None if wide => {
            buf.op(Opcode::PutGlyph);
            buf.u16(output);
        }
        None => {
            buf.op(Opcode::PutGlyphV1_2);
            buf.u8(narrow(output)?);
        }
        Some(input) => {
            let selector = rule.items[item]
                .substitution()
                .and_then(|s| s.selector.as_ref());
            let slot = expr_ctx.slot_operand(selector)?;
            if wide {
                buf.op(Opcode::PutSubs);
                buf.i8(slot);
                buf.u16(input);
                buf.u16(output);
            } else {
                buf.op(Opcode::PutSubsV1_2);
                buf.i8(slot);
                buf.u8(narrow(input)?);
                buf.u8(narrow(output)?);
            }
        }
    }
    Ok(())
}

fn emit_setting(
    buf: &mut CodeBuffer,
    setting: &AttrSetting,
    output: SlotIndex,
    ctx: &CodeContext,
) -> Result<(), CodeError> {
    let attr = setting.attr;
    if attr.value_type() == ValueType::SlotRef {
        let Expr::Slot(target) = &setting.value else {
            return Err(CodeError::InvalidValue(attr));
        };
        // attach.to is resolved against the output stream, everything else the input.
        let offset = if attr == SlotAttr::AttachTo {
            let target = target
                .stream
                .ok_or(CodeError::UnresolvedSlotRef(target.item))?;
            target.position() as i32 - output.position() as i32
        } else {
            ctx.slot_operand(Some(target))? as i32
        };
        buf.push_int(offset);
        match setting.index {
            None => {
                buf.op(Opcode::AttrSetSlot);
                buf.u8(attr.code());
            }
            Some(index) => {
                buf.op(Opcode::IAttrSetSlot);
                buf.u8(attr.code());
                buf.u8(index);
            }
        }
        return Ok(());
    }
    setting.value.generate_code(buf, ctx)?;
    let op = match (setting.op, setting.index.is_some()) {
        (SetOp::Assign, false) => Opcode::AttrSet,
        (SetOp::Add, false) => Opcode::AttrAdd,
        (SetOp::Sub, false) => Opcode::AttrSub,
        (SetOp::Assign, true) => Opcode::IAttrSet,
        (SetOp::Add, true) => Opcode::IAttrAdd,
        (SetOp::Sub, true) => Opcode::IAttrSub,
    };
    buf.op(op);
    buf.u8(attr.code());
    if let Some(index) = setting.index {
        buf.u8(index);
    }
    Ok(())
}
