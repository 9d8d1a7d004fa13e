//! Expressions
//!
//! Expressions appear in rule constraints and as the values of attribute settings.
//! This module defines the expression tree along with:
//!
//! - type inference ([Expr::ty]),
//! - simplification: measurement unscaling and constant folding ([Expr::simplify]),
//! - code generation ([Expr::generate_code]).

use crate::attr::{ProcState, SlotAttr, ValueType};
use crate::code::{CodeBuffer, CodeError, Opcode};
use crate::index::SlotIndex;
use crate::Version;
use font::{Font, GlyphMetric};

/// Type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprType {
    Unknown,
    Number,
    Measurement,
    Boolean,
    SlotRef,
    String,
}

impl ExprType {
    pub fn name(&self) -> &'static str {
        match self {
            ExprType::Unknown => "unknown",
            ExprType::Number => "number",
            ExprType::Measurement => "measurement",
            ExprType::Boolean => "boolean",
            ExprType::SlotRef => "slot reference",
            ExprType::String => "string",
        }
    }

    /// Whether a value of this type can be used as an arithmetic or logical operand.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            ExprType::Number | ExprType::Measurement | ExprType::Boolean | ExprType::Unknown
        )
    }
}

impl From<ValueType> for ExprType {
    fn from(value: ValueType) -> Self {
        match value {
            ValueType::Number => ExprType::Number,
            ValueType::Measurement => ExprType::Measurement,
            ValueType::Boolean => ExprType::Boolean,
            ValueType::SlotRef => ExprType::SlotRef,
        }
    }
}

/// Reference to an item of the rule, like `@2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SlotRef {
    /// Position of the item in the rule, zero based.
    pub item: usize,
    /// Stream index of the item, set by [crate::index::resolve].
    #[cfg_attr(feature = "serde", serde(skip))]
    pub stream: Option<SlotIndex>,
}

impl SlotRef {
    pub fn new(item: usize) -> SlotRef {
        SlotRef { item, stream: None }
    }
}

impl std::fmt::Display for SlotRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.item + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn opcode(&self) -> Opcode {
        match self {
            UnaryOp::Neg => Opcode::Neg,
            UnaryOp::Not => Opcode::Not,
            UnaryOp::BitNot => Opcode::BitNot,
        }
    }

    pub fn apply(&self, a: i32) -> i32 {
        match self {
            UnaryOp::Neg => a.wrapping_neg(),
            UnaryOp::Not => (a == 0) as i32,
            UnaryOp::BitNot => !a,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Min,
    Max,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
}

impl BinaryOp {
    pub fn opcode(&self) -> Opcode {
        use BinaryOp::*;
        match self {
            Add => Opcode::Add,
            Sub => Opcode::Sub,
            Mul => Opcode::Mul,
            Div => Opcode::Div,
            Min => Opcode::Min,
            Max => Opcode::Max,
            Eq => Opcode::Equal,
            Ne => Opcode::NotEq,
            Lt => Opcode::Less,
            Gt => Opcode::Gtr,
            Le => Opcode::LessEq,
            Ge => Opcode::GtrEq,
            And => Opcode::And,
            Or => Opcode::Or,
            BitAnd => Opcode::BitAnd,
            BitOr => Opcode::BitOr,
        }
    }

    pub fn from_opcode(op: Opcode) -> Option<BinaryOp> {
        use BinaryOp::*;
        Some(match op {
            Opcode::Add => Add,
            Opcode::Sub => Sub,
            Opcode::Mul => Mul,
            Opcode::Div => Div,
            Opcode::Min => Min,
            Opcode::Max => Max,
            Opcode::Equal => Eq,
            Opcode::NotEq => Ne,
            Opcode::Less => Lt,
            Opcode::Gtr => Gt,
            Opcode::LessEq => Le,
            Opcode::GtrEq => Ge,
            Opcode::And => And,
            Opcode::Or => Or,
            Opcode::BitAnd => BitAnd,
            Opcode::BitOr => BitOr,
            _ => return None,
        })
    }

    /// Applies the operator. Returns [None] on division by zero.
    pub fn apply(&self, a: i32, b: i32) -> Option<i32> {
        use BinaryOp::*;
        Some(match self {
            Add => a.wrapping_add(b),
            Sub => a.wrapping_sub(b),
            Mul => a.wrapping_mul(b),
            Div => {
                if b == 0 {
                    return None;
                }
                a.wrapping_div(b)
            }
            Min => a.min(b),
            Max => a.max(b),
            Eq => (a == b) as i32,
            Ne => (a != b) as i32,
            Lt => (a < b) as i32,
            Gt => (a > b) as i32,
            Le => (a <= b) as i32,
            Ge => (a >= b) as i32,
            And => (a != 0 && b != 0) as i32,
            Or => (a != 0 || b != 0) as i32,
            BitAnd => a & b,
            BitOr => a | b,
        })
    }

    pub fn is_comparison(&self) -> bool {
        use BinaryOp::*;
        matches!(self, Eq | Ne | Lt | Gt | Le | Ge)
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_bitwise(&self) -> bool {
        matches!(self, BinaryOp::BitAnd | BinaryOp::BitOr)
    }

    fn symbol(&self) -> &'static str {
        use BinaryOp::*;
        match self {
            Add => "+",
            Sub => "-",
            Mul => "*",
            Div => "/",
            Min => "min",
            Max => "max",
            Eq => "==",
            Ne => "!=",
            Lt => "<",
            Gt => ">",
            Le => "<=",
            Ge => ">=",
            And => "&&",
            Or => "||",
            BitAnd => "&",
            BitOr => "|",
        }
    }
}

/// A value read from the engine or the font.
///
/// A `slot` of [None] refers to the slot the expression is evaluated for.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Lookup {
    SlotAttr {
        attr: SlotAttr,
        #[cfg_attr(feature = "serde", serde(default))]
        slot: Option<SlotRef>,
        #[cfg_attr(feature = "serde", serde(default))]
        index: Option<u8>,
    },
    GlyphAttr {
        attr: u16,
        #[cfg_attr(feature = "serde", serde(default))]
        slot: Option<SlotRef>,
    },
    Metric {
        metric: GlyphMetric,
        #[cfg_attr(feature = "serde", serde(default))]
        slot: Option<SlotRef>,
        /// Attachment level the metric is aggregated over; 0 is the glyph itself.
        #[cfg_attr(feature = "serde", serde(default))]
        level: i8,
    },
    Feature {
        feature: u8,
        #[cfg_attr(feature = "serde", serde(default))]
        slot: Option<SlotRef>,
    },
    ProcState(ProcState),
    Version,
}

impl Lookup {
    fn slot(&self) -> Option<&SlotRef> {
        match self {
            Lookup::SlotAttr { slot, .. }
            | Lookup::GlyphAttr { slot, .. }
            | Lookup::Metric { slot, .. }
            | Lookup::Feature { slot, .. } => slot.as_ref(),
            Lookup::ProcState(_) | Lookup::Version => None,
        }
    }

    fn slot_mut(&mut self) -> Option<&mut SlotRef> {
        match self {
            Lookup::SlotAttr { slot, .. }
            | Lookup::GlyphAttr { slot, .. }
            | Lookup::Metric { slot, .. }
            | Lookup::Feature { slot, .. } => slot.as_mut(),
            Lookup::ProcState(_) | Lookup::Version => None,
        }
    }

    pub fn ty(&self) -> ExprType {
        match self {
            Lookup::SlotAttr { attr, .. } => attr.value_type().into(),
            Lookup::Metric { .. } => ExprType::Measurement,
            Lookup::GlyphAttr { .. }
            | Lookup::Feature { .. }
            | Lookup::ProcState(_)
            | Lookup::Version => ExprType::Number,
        }
    }
}

/// An expression.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Expr {
    Number(i32),
    /// A measurement written in a coordinate system with `scale` units per em.
    Measure {
        value: i32,
        scale: u16,
    },
    Slot(SlotRef),
    String(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Cond {
        test: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Lookup(Lookup),
}

/// Where an expression's code runs.
#[derive(Debug, Clone, Copy)]
pub struct CodeContext {
    pub version: Version,
    pub units_per_em: u16,
    /// Input index of the item the expression is evaluated for.
    /// Slot operands are relative to it.
    pub current: i32,
}

impl CodeContext {
    /// Operand addressing the given slot, relative to the current item in the input stream.
    pub fn slot_operand(&self, slot: Option<&SlotRef>) -> Result<i8, CodeError> {
        let Some(slot) = slot else {
            return Ok(0);
        };
        let target = slot.stream.ok_or(CodeError::UnresolvedSlotRef(slot.item))?;
        let offset = target.position() as i32 - self.current;
        i8::try_from(offset).map_err(|_| CodeError::SlotOffsetOutOfRange(offset))
    }
}

/// Converts a measurement to font design units, rounding half away from zero.
pub fn unscale(value: i32, scale: u16, units_per_em: u16) -> i32 {
    if scale == 0 || scale == units_per_em {
        return value;
    }
    let n = value as i64 * units_per_em as i64;
    let d = scale as i64;
    let q = (n.abs() + d / 2) / d;
    let q = if n < 0 { -q } else { q };
    q.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

impl Expr {
    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn cond(test: Expr, then: Expr, otherwise: Expr) -> Expr {
        Expr::Cond {
            test: Box::new(test),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn slot_attr(attr: SlotAttr, slot: Option<usize>) -> Expr {
        Expr::Lookup(Lookup::SlotAttr {
            attr,
            slot: slot.map(SlotRef::new),
            index: None,
        })
    }

    pub fn ty(&self) -> ExprType {
        match self {
            Expr::Number(_) => ExprType::Number,
            Expr::Measure { .. } => ExprType::Measurement,
            Expr::Slot(_) => ExprType::SlotRef,
            Expr::String(_) => ExprType::String,
            Expr::Unary { op, operand } => match op {
                UnaryOp::Neg => operand.ty(),
                UnaryOp::Not => ExprType::Boolean,
                UnaryOp::BitNot => ExprType::Number,
            },
            Expr::Binary { op, lhs, rhs } => {
                if op.is_comparison() || op.is_logical() {
                    ExprType::Boolean
                } else if op.is_bitwise() {
                    ExprType::Number
                } else {
                    numeric_join(lhs.ty(), rhs.ty())
                }
            }
            Expr::Cond {
                then, otherwise, ..
            } => {
                let (a, b) = (then.ty(), otherwise.ty());
                if a == b {
                    a
                } else if a.is_scalar() && b.is_scalar() {
                    numeric_join(a, b)
                } else {
                    ExprType::Unknown
                }
            }
            Expr::Lookup(lookup) => lookup.ty(),
        }
    }

    /// Value of the expression if it is a number known at compile time.
    ///
    /// Measurements count as constants only once they are in font design units.
    pub fn constant_value(&self, units_per_em: u16) -> Option<i32> {
        match self {
            Expr::Number(n) => Some(*n),
            Expr::Measure { value, scale } if *scale == units_per_em => Some(*value),
            _ => None,
        }
    }

    /// Unscales measurements and folds constants.
    ///
    /// Returns [None] if the expression is already as simple as it gets.
    /// Division by zero is not folded; the engine reports it at run time.
    pub fn simplify(&self, font: &dyn Font) -> Option<Expr> {
        self.simplify_with(font.units_per_em())
    }

    fn simplify_with(&self, upem: u16) -> Option<Expr> {
        match self {
            Expr::Number(_) | Expr::Slot(_) | Expr::String(_) | Expr::Lookup(_) => None,
            Expr::Measure { value, scale } => {
                if *scale == upem {
                    None
                } else {
                    Some(Expr::Measure {
                        value: unscale(*value, *scale, upem),
                        scale: upem,
                    })
                }
            }
            Expr::Unary { op, operand } => {
                let new = operand.simplify_with(upem);
                let operand_ref = new.as_ref().unwrap_or(&**operand);
                if let Some(a) = operand_ref.constant_value(upem) {
                    let is_measure = matches!(operand_ref, Expr::Measure { .. });
                    return Some(constant(op.apply(a), is_measure && *op == UnaryOp::Neg, upem));
                }
                new.map(|operand| Expr::unary(*op, operand))
            }
            Expr::Binary { op, lhs, rhs } => {
                let (new_lhs, new_rhs) = (lhs.simplify_with(upem), rhs.simplify_with(upem));
                let lhs_ref = new_lhs.as_ref().unwrap_or(&**lhs);
                let rhs_ref = new_rhs.as_ref().unwrap_or(&**rhs);
                if let (Some(a), Some(b)) = (
                    lhs_ref.constant_value(upem),
                    rhs_ref.constant_value(upem),
                ) {
                    if let Some(v) = op.apply(a, b) {
                        let is_measure = !op.is_comparison()
                            && !op.is_logical()
                            && !op.is_bitwise()
                            && (matches!(lhs_ref, Expr::Measure { .. })
                                || matches!(rhs_ref, Expr::Measure { .. }));
                        return Some(constant(v, is_measure, upem));
                    }
                }
                if new_lhs.is_none() && new_rhs.is_none() {
                    return None;
                }
                Some(Expr::binary(
                    *op,
                    new_lhs.unwrap_or_else(|| lhs.as_ref().clone()),
                    new_rhs.unwrap_or_else(|| rhs.as_ref().clone()),
                ))
            }
            Expr::Cond {
                test,
                then,
                otherwise,
            } => {
                let new_test = test.simplify_with(upem);
                let new_then = then.simplify_with(upem);
                let new_otherwise = otherwise.simplify_with(upem);
                let test_ref = new_test.as_ref().unwrap_or(&**test);
                if let Some(c) = test_ref.constant_value(upem) {
                    let (taken, new_taken) = if c != 0 {
                        (then, new_then)
                    } else {
                        (otherwise, new_otherwise)
                    };
                    return Some(new_taken.unwrap_or_else(|| taken.as_ref().clone()));
                }
                if new_test.is_none() && new_then.is_none() && new_otherwise.is_none() {
                    return None;
                }
                Some(Expr::cond(
                    new_test.unwrap_or_else(|| test.as_ref().clone()),
                    new_then.unwrap_or_else(|| then.as_ref().clone()),
                    new_otherwise.unwrap_or_else(|| otherwise.as_ref().clone()),
                ))
            }
        }
    }

    /// Calls `f` on this expression and every sub-expression, parents first.
    pub fn visit<F: FnMut(&Expr)>(&self, f: &mut F) {
        f(self);
        match self {
            Expr::Number(_)
            | Expr::Measure { .. }
            | Expr::Slot(_)
            | Expr::String(_)
            | Expr::Lookup(_) => {}
            Expr::Unary { operand, .. } => operand.visit(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit(f);
                rhs.visit(f);
            }
            Expr::Cond {
                test,
                then,
                otherwise,
            } => {
                test.visit(f);
                then.visit(f);
                otherwise.visit(f);
            }
        }
    }

    /// All slot references in the expression, including the slots of lookups.
    pub fn slot_refs(&self) -> Vec<&SlotRef> {
        let mut out = vec![];
        self.collect_slot_refs(&mut out);
        out
    }

    fn collect_slot_refs<'a>(&'a self, out: &mut Vec<&'a SlotRef>) {
        match self {
            Expr::Number(_) | Expr::Measure { .. } | Expr::String(_) => {}
            Expr::Slot(r) => out.push(r),
            Expr::Lookup(lookup) => out.extend(lookup.slot()),
            Expr::Unary { operand, .. } => operand.collect_slot_refs(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_slot_refs(out);
                rhs.collect_slot_refs(out);
            }
            Expr::Cond {
                test,
                then,
                otherwise,
            } => {
                test.collect_slot_refs(out);
                then.collect_slot_refs(out);
                otherwise.collect_slot_refs(out);
            }
        }
    }

    pub fn slot_refs_mut(&mut self) -> Vec<&mut SlotRef> {
        let mut out = vec![];
        self.collect_slot_refs_mut(&mut out);
        out
    }

    fn collect_slot_refs_mut<'a>(&'a mut self, out: &mut Vec<&'a mut SlotRef>) {
        match self {
            Expr::Number(_) | Expr::Measure { .. } | Expr::String(_) => {}
            Expr::Slot(r) => out.push(r),
            Expr::Lookup(lookup) => out.extend(lookup.slot_mut()),
            Expr::Unary { operand, .. } => operand.collect_slot_refs_mut(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_slot_refs_mut(out);
                rhs.collect_slot_refs_mut(out);
            }
            Expr::Cond {
                test,
                then,
                otherwise,
            } => {
                test.collect_slot_refs_mut(out);
                then.collect_slot_refs_mut(out);
                otherwise.collect_slot_refs_mut(out);
            }
        }
    }

    /// Whether the expression reads the justification status of the line.
    pub fn tests_justify_mode(&self) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if matches!(e, Expr::Lookup(Lookup::ProcState(ProcState::JustifyMode))) {
                found = true;
            }
        });
        found
    }

    /// Lowest engine version that can run this expression.
    pub fn min_version(&self) -> Version {
        let mut version = Version::V1_0;
        self.visit(&mut |e| {
            let required = match e {
                Expr::Unary {
                    op: UnaryOp::BitNot,
                    ..
                } => Version::V3_0,
                Expr::Binary { op, .. } if op.is_bitwise() => Version::V3_0,
                Expr::Lookup(Lookup::GlyphAttr { attr, .. }) if *attr > u8::MAX as u16 => {
                    Version::V2_0
                }
                _ => Version::V1_0,
            };
            version = version.max(required);
        });
        version
    }

    /// Appends code that leaves the value of the expression on the engine stack.
    pub fn generate_code(&self, buf: &mut CodeBuffer, ctx: &CodeContext) -> Result<(), CodeError> {
        match self {
            Expr::Number(n) => buf.push_int(*n),
            Expr::Measure { value, scale } => {
                buf.push_int(unscale(*value, *scale, ctx.units_per_em))
            }
            Expr::Slot(slot) => buf.push_int(ctx.slot_operand(Some(slot))? as i32),
            Expr::String(_) => return Err(CodeError::StringInExpression),
            Expr::Unary { op, operand } => {
                operand.generate_code(buf, ctx)?;
                buf.op(op.opcode());
            }
            Expr::Binary { op, lhs, rhs } => {
                lhs.generate_code(buf, ctx)?;
                rhs.generate_code(buf, ctx)?;
                buf.op(op.opcode());
            }
            Expr::Cond {
                test,
                then,
                otherwise,
            } => {
                test.generate_code(buf, ctx)?;
                then.generate_code(buf, ctx)?;
                otherwise.generate_code(buf, ctx)?;
                buf.op(Opcode::Cond);
            }
            Expr::Lookup(lookup) => {
                let slot = ctx.slot_operand(lookup.slot())?;
                match lookup {
                    Lookup::SlotAttr { attr, index, .. } => match index {
                        None => {
                            buf.op(Opcode::PushSlotAttr);
                            buf.u8(attr.code());
                            buf.i8(slot);
                        }
                        Some(index) => {
                            buf.op(Opcode::PushISlotAttr);
                            buf.u8(attr.code());
                            buf.i8(slot);
                            buf.u8(*index);
                        }
                    },
                    Lookup::GlyphAttr { attr, .. } => {
                        if ctx.version.has_wide_operands() {
                            buf.op(Opcode::PushGlyphAttr);
                            buf.u16(*attr);
                        } else {
                            let narrow = u8::try_from(*attr)
                                .map_err(|_| CodeError::OperandTooWide(*attr as u32))?;
                            buf.op(Opcode::PushGlyphAttrV1_2);
                            buf.u8(narrow);
                        }
                        buf.i8(slot);
                    }
                    Lookup::Metric { metric, level, .. } => {
                        buf.op(Opcode::PushGlyphMetric);
                        buf.u8(*metric as u8);
                        buf.i8(slot);
                        buf.i8(*level);
                    }
                    Lookup::Feature { feature, .. } => {
                        buf.op(Opcode::PushFeat);
                        buf.u8(*feature);
                        buf.i8(slot);
                    }
                    Lookup::ProcState(state) => {
                        buf.op(Opcode::PushProcState);
                        buf.u8(*state as u8);
                    }
                    Lookup::Version => buf.op(Opcode::PushVersion),
                }
            }
        }
        Ok(())
    }
}

fn numeric_join(a: ExprType, b: ExprType) -> ExprType {
    if a == ExprType::Measurement || b == ExprType::Measurement {
        ExprType::Measurement
    } else {
        ExprType::Number
    }
}

fn constant(value: i32, is_measure: bool, upem: u16) -> Expr {
    if is_measure {
        Expr::Measure { value, scale: upem }
    } else {
        Expr::Number(value)
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Number(n) => write!(f, "{n}"),
            Expr::Measure { value, scale } => write!(f, "{value}m/{scale}"),
            Expr::Slot(r) => write!(f, "{r}"),
            Expr::String(s) => write!(f, "{s:?}"),
            Expr::Unary { op, operand } => write!(f, "{}({operand})", op.symbol()),
            Expr::Binary { op, lhs, rhs } => match op {
                BinaryOp::Min | BinaryOp::Max => write!(f, "{}({lhs}, {rhs})", op.symbol()),
                _ => write!(f, "({lhs} {} {rhs})", op.symbol()),
            },
            Expr::Cond {
                test,
                then,
                otherwise,
            } => write!(f, "({test} ? {then} : {otherwise})"),
            Expr::Lookup(lookup) => {
                let prefix = |slot: &Option<SlotRef>| match slot {
                    None => String::new(),
                    Some(r) => format!("{r}."),
                };
                match lookup {
                    Lookup::SlotAttr { attr, slot, index } => {
                        write!(f, "{}{attr}", prefix(slot))?;
                        if let Some(index) = index {
                            write!(f, "[{index}]")?;
                        }
                        Ok(())
                    }
                    Lookup::GlyphAttr { attr, slot } => {
                        write!(f, "{}glyphattr({attr})", prefix(slot))
                    }
                    Lookup::Metric {
                        metric,
                        slot,
                        level,
                    } => {
                        write!(f, "{}{}", prefix(slot), metric.name())?;
                        if *level != 0 {
                            write!(f, "(level {level})")?;
                        }
                        Ok(())
                    }
                    Lookup::Feature { feature, slot } => {
                        write!(f, "{}feature({feature})", prefix(slot))
                    }
                    Lookup::ProcState(state) => write!(f, "{}", state.name()),
                    Lookup::Version => write!(f, "version"),
                }
            }
        }
    }
}
