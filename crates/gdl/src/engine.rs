//! Reference engine
//!
//! Runs compiled passes over a glyph buffer.
//! This is the oracle for the compiler's output: a program that compiles should behave
//!     as written when its machines and code are run here.
//! It is not a shaper.
//! There is no bidi reordering or justification, and positions are plain sums of advances.
//!
//! Scanning works like this.
//! The scan position of a pass is the buffer index aligned with the first modified item
//!     of the rules.
//! The machine is started up to `max_pre` slots before it, in the start state for the
//!     number of missing pre-context slots, and fed glyphs until it has no transition.
//! Every rule that succeeds along the way is a candidate.
//! Candidates are tried longest first; the first whose constraints hold fires.

use crate::attr::SlotAttr;
use crate::code::{disassemble, DisasmError, Instruction, Opcode, Operand};
use crate::compile::{Compiled, CompiledPass, Options};
use crate::expr::{BinaryOp, UnaryOp};
use font::{Font, Glyph, GlyphMetric};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};

/// A slot of the glyph buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub glyph: Glyph,
    /// Identifier of the slot, unique within a run.
    /// Slots of the initial buffer are numbered by position.
    pub id: usize,
    /// Attribute values set by rules, keyed by attribute and index.
    pub attrs: BTreeMap<(SlotAttr, u8), i32>,
    pub attached_to: Option<usize>,
    pub associations: Vec<usize>,
}

impl Slot {
    pub fn new(glyph: Glyph, id: usize) -> Slot {
        Slot {
            glyph,
            id,
            attrs: Default::default(),
            attached_to: None,
            associations: vec![],
        }
    }

    pub fn attr(&self, attr: SlotAttr, index: u8) -> Option<i32> {
        self.attrs.get(&(attr, index)).copied()
    }
}

/// Record of one rule firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Firing {
    /// Global ID of the pass.
    pub pass: u16,
    /// Index of the rule in its pass.
    pub rule: usize,
    /// Scan position the rule fired at.
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub slots: Vec<Slot>,
    pub firings: Vec<Firing>,
}

impl Output {
    pub fn glyphs(&self) -> Vec<Glyph> {
        self.slots.iter().map(|s| s.glyph).collect()
    }
}

/// A problem running the code of one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    DivisionByZero,
    StackUnderflow,
    BadCode(DisasmError),
    /// The instruction is not valid where it appears.
    InvalidInstruction {
        offset: usize,
        opcode: Opcode,
    },
    /// The instruction addresses a slot outside the buffer.
    SlotOutOfRange {
        offset: usize,
    },
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fault::DivisionByZero => write!(f, "division by zero"),
            Fault::StackUnderflow => write!(f, "stack underflow"),
            Fault::BadCode(err) => write!(f, "{err}"),
            Fault::InvalidInstruction { offset, opcode } => {
                write!(f, "{opcode} is not valid at offset {offset}")
            }
            Fault::SlotOutOfRange { offset } => {
                write!(f, "instruction at offset {offset} addresses a missing slot")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    Code { pass: u16, rule: usize, fault: Fault },
    LoopLimit { pass: u16, limit: usize },
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Code { pass, rule, fault } => {
                write!(f, "pass {pass} rule {}: {fault}", rule + 1)
            }
            EngineError::LoopLimit { pass, limit } => {
                write!(f, "pass {pass}: more than {limit} rules fired")
            }
        }
    }
}

impl std::error::Error for EngineError {}

/// Runs compiled passes.
pub struct Engine<'a> {
    compiled: &'a Compiled,
    font: &'a dyn Font,
    loop_limit: usize,
    features: HashMap<u8, i32>,
}

impl<'a> Engine<'a> {
    pub fn new(compiled: &'a Compiled, font: &'a dyn Font) -> Engine<'a> {
        Engine {
            compiled,
            font,
            loop_limit: Options::DEFAULT_LOOP_LIMIT,
            features: Default::default(),
        }
    }

    /// Sets the maximum number of rule firings in one pass.
    pub fn with_loop_limit(mut self, loop_limit: usize) -> Self {
        self.loop_limit = loop_limit;
        self
    }

    /// Sets the value of a feature. Unset features are 0.
    pub fn with_feature(mut self, feature: u8, value: i32) -> Self {
        self.features.insert(feature, value);
        self
    }

    /// Runs every pass over a glyph sequence.
    pub fn run(&self, glyphs: &[Glyph]) -> Result<Output, EngineError> {
        let mut slots: Vec<Slot> = glyphs
            .iter()
            .enumerate()
            .map(|(i, glyph)| Slot::new(*glyph, i))
            .collect();
        let mut firings = vec![];
        for pass in &self.compiled.passes {
            self.run_pass(pass, &mut slots, &mut firings)?;
        }
        Ok(Output { slots, firings })
    }

    /// Runs one pass over a buffer.
    pub fn run_pass(
        &self,
        pass: &CompiledPass,
        slots: &mut Vec<Slot>,
        firings: &mut Vec<Firing>,
    ) -> Result<(), EngineError> {
        let _span = tracing::debug_span!("run_pass", pass = pass.global_id).entered();
        let mut next_id = slots.iter().map(|s| s.id + 1).max().unwrap_or(0);
        let mut pos = 0_usize;
        let mut loops = 0_u8;
        let mut fired = 0_usize;
        while pos <= slots.len() {
            let Some((rule, new_pos)) = self.fire(pass, slots, pos, &mut next_id)? else {
                pos += 1;
                continue;
            };
            fired += 1;
            if fired > self.loop_limit {
                return Err(EngineError::LoopLimit {
                    pass: pass.global_id,
                    limit: self.loop_limit,
                });
            }
            tracing::trace!(rule, pos, new_pos, "rule fired");
            firings.push(Firing {
                pass: pass.global_id,
                rule,
                position: pos,
            });
            if new_pos > pos {
                loops = 0;
                pos = new_pos;
                continue;
            }
            loops += 1;
            if loops >= pass.max_rule_loop {
                loops = 0;
                pos += 1;
            } else {
                pos = new_pos;
            }
        }
        Ok(())
    }

    /// Positions in the pass's rule list of the rules the machine matches at `pos`,
    ///     in the order they are tried.
    fn candidates(&self, pass: &CompiledPass, slots: &[Slot], pos: usize) -> Vec<usize> {
        let m = &pass.machine;
        let avail = pos.min(m.max_pre);
        if avail < m.min_pre {
            return vec![];
        }
        let Some(mut state) = m.start_states.get(m.max_pre - avail).copied() else {
            return vec![];
        };
        let mut found: Vec<usize> = m.rules_at(state).iter().map(|r| *r as usize).collect();
        for slot in &slots[pos - avail..] {
            let Some(next) = m.column(slot.glyph).and_then(|c| m.next_state(state, c)) else {
                break;
            };
            state = next;
            found.extend(m.rules_at(state).iter().map(|r| *r as usize));
        }
        found.retain(|r| *r < pass.rules.len());
        found.sort_by_key(|r| (Reverse(pass.rules[*r].sort_key), pass.rules[*r].index));
        found.dedup();
        found
    }

    /// Fires the first matching rule at `pos`.
    ///
    /// Returns the index of the rule in its pass and the new scan position.
    fn fire(
        &self,
        pass: &CompiledPass,
        slots: &mut Vec<Slot>,
        pos: usize,
        next_id: &mut usize,
    ) -> Result<Option<(usize, usize)>, EngineError> {
        for r in self.candidates(pass, slots, pos) {
            let rule = &pass.rules[r];
            let error = |fault| EngineError::Code {
                pass: pass.global_id,
                rule: rule.index,
                fault,
            };
            let mut vm = Vm::new(self, pass, slots, pos, rule.input_len, next_id);
            if !vm.constraints_hold(&rule.code.constraints).map_err(error)? {
                continue;
            }
            let ret = vm.execute(&rule.code.actions, false).map_err(error)?;
            return Ok(Some((rule.index, vm.finish(ret))));
        }
        Ok(None)
    }
}

/// State of one rule application.
struct Vm<'v, 'e> {
    engine: &'v Engine<'e>,
    max_pre: isize,
    slots: &'v mut Vec<Slot>,
    /// The slots the rule matched, before any action ran. [None] for missing pre-context.
    inputs: Vec<Option<Slot>>,
    /// Current buffer index of each input slot.
    input_map: Vec<isize>,
    rule_start: isize,
    cursor: usize,
    cur_input: isize,
    cur_output: isize,
    inserted: bool,
    deleted: HashSet<usize>,
    /// Slot ID and output position of each pending `attach.to`.
    attachments: Vec<(usize, isize)>,
    next_id: &'v mut usize,
}

fn pop(stack: &mut Vec<i32>) -> Result<i32, Fault> {
    stack.pop().ok_or(Fault::StackUnderflow)
}

fn slot_attr(instr: &Instruction, i: usize) -> Result<SlotAttr, Fault> {
    instr
        .operand(i)
        .and_then(|code| u8::try_from(code).ok())
        .and_then(SlotAttr::from_code)
        .ok_or(Fault::InvalidInstruction {
            offset: instr.offset,
            opcode: instr.opcode,
        })
}

impl<'v, 'e> Vm<'v, 'e> {
    fn new(
        engine: &'v Engine<'e>,
        pass: &CompiledPass,
        slots: &'v mut Vec<Slot>,
        pos: usize,
        input_len: usize,
        next_id: &'v mut usize,
    ) -> Vm<'v, 'e> {
        let max_pre = pass.machine.max_pre as isize;
        let rule_start = pos as isize - max_pre;
        let input_map: Vec<isize> = (0..input_len as isize).map(|k| rule_start + k).collect();
        let inputs = input_map
            .iter()
            .map(|b| usize::try_from(*b).ok().and_then(|b| slots.get(b)).cloned())
            .collect();
        Vm {
            engine,
            max_pre,
            slots,
            inputs,
            input_map,
            rule_start,
            cursor: pos,
            cur_input: max_pre,
            cur_output: max_pre,
            inserted: false,
            deleted: Default::default(),
            attachments: vec![],
            next_id,
        }
    }

    /// Runs the constraint program once for every matched slot.
    fn constraints_hold(&mut self, code: &[u8]) -> Result<bool, Fault> {
        if code.is_empty() {
            return Ok(true);
        }
        for p in 0..self.inputs.len() {
            if self.rule_start + (p as isize) < 0 {
                continue;
            }
            self.cur_input = p as isize;
            if self.execute(code, true)? == 0 {
                return Ok(false);
            }
        }
        self.cur_input = self.max_pre;
        Ok(true)
    }

    /// Buffer index of the input slot at `offset` from the current one.
    fn buffer_index(&self, offset: i32) -> isize {
        let k = self.cur_input + offset as isize;
        usize::try_from(k)
            .ok()
            .and_then(|k| self.input_map.get(k))
            .copied()
            .unwrap_or(self.rule_start + k)
    }

    fn live_slot(&self, offset: i32) -> Option<&Slot> {
        usize::try_from(self.buffer_index(offset))
            .ok()
            .and_then(|b| self.slots.get(b))
    }

    fn glyph(&self, offset: i32) -> Glyph {
        self.live_slot(offset)
            .map_or(self.engine.font.phantom_glyph(), |s| s.glyph)
    }

    /// The input slot at `offset` as it was before the rule ran.
    fn input_slot(&self, offset: i32) -> Option<&Slot> {
        let k = self.cur_input + offset as isize;
        match usize::try_from(k).ok().and_then(|k| self.inputs.get(k)) {
            Some(slot) => slot.as_ref(),
            None => self.live_slot(offset),
        }
    }

    fn current(&mut self, offset: usize) -> Result<&mut Slot, Fault> {
        self.slots
            .get_mut(self.cursor)
            .ok_or(Fault::SlotOutOfRange { offset })
    }

    fn read_attr(&self, attr: SlotAttr, index: u8, offset: i32) -> i32 {
        let Some(slot) = self.live_slot(offset) else {
            return 0;
        };
        if let Some(value) = slot.attr(attr, index) {
            return value;
        }
        let font = self.engine.font;
        match attr {
            SlotAttr::AdvanceX => font.metric(slot.glyph, GlyphMetric::AdvWidth),
            SlotAttr::AdvanceY => font.metric(slot.glyph, GlyphMetric::AdvHeight),
            SlotAttr::PositionX => {
                let end = usize::try_from(self.buffer_index(offset))
                    .unwrap_or(0)
                    .min(self.slots.len());
                self.slots[..end]
                    .iter()
                    .map(|s| {
                        s.attr(SlotAttr::AdvanceX, 0)
                            .unwrap_or_else(|| font.metric(s.glyph, GlyphMetric::AdvWidth))
                    })
                    .sum()
            }
            _ => 0,
        }
    }

    fn next(&mut self) {
        if !self.inserted {
            self.cur_input += 1;
        }
        let deleted = self
            .slots
            .get(self.cursor)
            .is_some_and(|s| self.deleted.contains(&s.id));
        if !deleted {
            self.cur_output += 1;
        }
        self.cursor += 1;
        self.inserted = false;
    }

    fn insert(&mut self, offset: usize) -> Result<(), Fault> {
        if self.cursor > self.slots.len() {
            return Err(Fault::SlotOutOfRange { offset });
        }
        let id = *self.next_id;
        *self.next_id += 1;
        self.slots.insert(self.cursor, Slot::new(Glyph(0), id));
        let cursor = self.cursor as isize;
        for b in self.input_map.iter_mut().filter(|b| **b >= cursor) {
            *b += 1;
        }
        self.inserted = true;
        Ok(())
    }

    fn execute(&mut self, code: &[u8], constraint: bool) -> Result<i32, Fault> {
        let program = disassemble(code).map_err(Fault::BadCode)?;
        let mut stack: Vec<i32> = vec![];
        let mut i = 0;
        while let Some(instr) = program.get(i) {
            i += 1;
            let opcode = instr.opcode;
            let invalid = Fault::InvalidInstruction {
                offset: instr.offset,
                opcode,
            };
            if constraint && !opcode.allowed_in_constraints() {
                return Err(invalid);
            }
            let arg = |n: usize| instr.operand(n).unwrap_or(0);
            if let Some(op) = BinaryOp::from_opcode(opcode) {
                let b = pop(&mut stack)?;
                let a = pop(&mut stack)?;
                stack.push(op.apply(a, b).ok_or(Fault::DivisionByZero)?);
                continue;
            }
            use Opcode::*;
            match opcode {
                Nop => {}
                PushByte | PushByteU | PushShort | PushShortU | PushLong => stack.push(arg(0)),
                Neg | Not | BitNot => {
                    let op = match opcode {
                        Neg => UnaryOp::Neg,
                        Not => UnaryOp::Not,
                        _ => UnaryOp::BitNot,
                    };
                    let a = pop(&mut stack)?;
                    stack.push(op.apply(a));
                }
                Trunc8 => {
                    let a = pop(&mut stack)?;
                    stack.push(a & 0xFF);
                }
                Trunc16 => {
                    let a = pop(&mut stack)?;
                    stack.push(a & 0xFFFF);
                }
                Cond => {
                    let otherwise = pop(&mut stack)?;
                    let then = pop(&mut stack)?;
                    let test = pop(&mut stack)?;
                    stack.push(if test != 0 { then } else { otherwise });
                }
                CntxtItem => {
                    if self.cur_input != self.max_pre + arg(0) as isize {
                        let to = instr.offset + instr.len + arg(1) as usize;
                        i = program.partition_point(|x| x.offset < to);
                        stack.push(1);
                    }
                }
                PopRet => return pop(&mut stack),
                RetZero => return Ok(0),
                RetTrue => return Ok(1),
                Next | CopyNext => self.next(),
                NextN => {
                    for _ in 0..arg(0).max(0) {
                        self.next();
                    }
                }
                Insert => self.insert(instr.offset)?,
                Delete => {
                    let id = self.current(instr.offset)?.id;
                    self.deleted.insert(id);
                }
                PutGlyph | PutGlyphV1_2 => {
                    let glyph = self
                        .engine
                        .compiled
                        .classes
                        .output_glyph(arg(0) as u16, 0)
                        .ok_or(invalid)?;
                    self.current(instr.offset)?.glyph = glyph;
                }
                PutSubs | PutSubsV1_2 => {
                    let classes = &self.engine.compiled.classes;
                    let source = self
                        .input_slot(arg(0))
                        .map_or(self.engine.font.phantom_glyph(), |s| s.glyph);
                    let glyph = classes
                        .input_index(arg(1) as u16, source)
                        .and_then(|index| classes.output_glyph(arg(2) as u16, index));
                    if let Some(glyph) = glyph {
                        self.current(instr.offset)?.glyph = glyph;
                    }
                }
                PutCopy => {
                    let source = self
                        .input_slot(arg(0))
                        .cloned()
                        .ok_or(Fault::SlotOutOfRange {
                            offset: instr.offset,
                        })?;
                    let slot = self.current(instr.offset)?;
                    slot.glyph = source.glyph;
                    slot.attrs = source.attrs;
                }
                Assoc => {
                    let Some(Operand::Slots(offsets)) = instr.operands.first() else {
                        return Err(invalid);
                    };
                    let ids: Vec<usize> = offsets
                        .iter()
                        .filter_map(|o| self.input_slot(*o as i32).map(|s| s.id))
                        .collect();
                    self.current(instr.offset)?.associations = ids;
                }
                AttrSet | AttrAdd | AttrSub | IAttrSet | IAttrAdd | IAttrSub => {
                    let attr = slot_attr(instr, 0)?;
                    let index = match opcode {
                        IAttrSet | IAttrAdd | IAttrSub => arg(1) as u8,
                        _ => 0,
                    };
                    let value = pop(&mut stack)?;
                    let old = self.read_attr(attr, index, self.cursor_offset());
                    let value = match opcode {
                        AttrAdd | IAttrAdd => old.wrapping_add(value),
                        AttrSub | IAttrSub => old.wrapping_sub(value),
                        _ => value,
                    };
                    self.current(instr.offset)?.attrs.insert((attr, index), value);
                }
                AttrSetSlot | IAttrSetSlot => {
                    let attr = slot_attr(instr, 0)?;
                    let value = pop(&mut stack)?;
                    if attr == SlotAttr::AttachTo {
                        let id = self.current(instr.offset)?.id;
                        self.attachments
                            .push((id, self.cur_output + value as isize));
                    } else {
                        let index = if opcode == IAttrSetSlot { arg(1) as u8 } else { 0 };
                        let target = self.input_slot(value).map(|s| s.id as i32);
                        if let Some(target) = target {
                            self.current(instr.offset)?.attrs.insert((attr, index), target);
                        }
                    }
                }
                PushSlotAttr => {
                    let attr = slot_attr(instr, 0)?;
                    stack.push(self.read_attr(attr, 0, arg(1)));
                }
                PushISlotAttr => {
                    let attr = slot_attr(instr, 0)?;
                    stack.push(self.read_attr(attr, arg(2) as u8, arg(1)));
                }
                PushGlyphAttr | PushGlyphAttrV1_2 => {
                    let glyph = self.glyph(arg(1));
                    stack.push(self.engine.font.glyph_attr(glyph, arg(0) as u16));
                }
                PushGlyphMetric => {
                    let metric = u8::try_from(arg(0))
                        .ok()
                        .and_then(GlyphMetric::from_code)
                        .ok_or(invalid)?;
                    let glyph = self.glyph(arg(1));
                    stack.push(self.engine.font.metric(glyph, metric));
                }
                PushFeat => {
                    let feature = arg(0) as u8;
                    stack.push(self.engine.features.get(&feature).copied().unwrap_or(0));
                }
                PushProcState => stack.push(0),
                PushVersion => stack.push(self.engine.compiled.version.0 as i32),
                _ => return Err(invalid),
            }
        }
        Ok(stack.pop().unwrap_or(0))
    }

    /// Offset from the current input slot to the slot under the cursor.
    fn cursor_offset(&self) -> i32 {
        let cursor = self.cursor as isize;
        match self.input_map.iter().position(|b| *b == cursor) {
            Some(k) => (k as isize - self.cur_input) as i32,
            None => (cursor - self.rule_start - self.cur_input) as i32,
        }
    }

    /// Applies pending attachments and deletions and returns the new scan position.
    fn finish(self, ret: i32) -> usize {
        let outputs: Vec<Option<usize>> = (self.rule_start..self.slots.len() as isize)
            .filter_map(|b| match usize::try_from(b) {
                Err(_) => Some(None),
                Ok(b) => {
                    let id = self.slots[b].id;
                    (!self.deleted.contains(&id)).then_some(Some(id))
                }
            })
            .collect();
        for (id, target) in &self.attachments {
            let target = usize::try_from(*target)
                .ok()
                .and_then(|t| outputs.get(t).copied().flatten());
            if let Some(slot) = self.slots.iter_mut().find(|s| s.id == *id) {
                slot.attached_to = target;
            }
        }
        let cursor = self.cursor.min(self.slots.len());
        let removed = self.slots[..cursor]
            .iter()
            .filter(|s| self.deleted.contains(&s.id))
            .count();
        let deleted = self.deleted;
        self.slots.retain(|s| !deleted.contains(&s.id));
        let pos = self.cursor as isize - removed as isize + ret as isize;
        pos.clamp(0, self.slots.len() as isize) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, Lookup};
    use crate::rule::{Output as RuleOutput, Renderer, Rule, Table, TableKind};
    use crate::testing::*;
    use crate::{compile, MemoryFont};

    fn compiled(r: &mut Renderer, font: &MemoryFont) -> Compiled {
        compile(r, font, &Options::default()).unwrap()
    }

    fn glyphs(ids: &[u16]) -> Vec<Glyph> {
        ids.iter().copied().map(Glyph).collect()
    }

    fn run(class_glyphs: Vec<Vec<u16>>, tables: Vec<Table>, input: &[u16]) -> Output {
        let mut r = renderer(class_glyphs, tables);
        let font = font(10);
        let compiled = compiled(&mut r, &font);
        Engine::new(&compiled, &font).run(&glyphs(input)).unwrap()
    }

    fn substitution_pass(rules: Vec<Rule>) -> Vec<Table> {
        vec![table(TableKind::Substitution, vec![rules])]
    }

    #[test]
    fn class_substitution() {
        let output = run(
            vec![vec![1, 2], vec![3, 4]],
            substitution_pass(vec![rule(vec![subst(0, RuleOutput::Class(1))])]),
            &[1, 2, 5],
        );
        assert_eq!(output.glyphs(), glyphs(&[3, 4, 5]));
        let positions: Vec<usize> = output.firings.iter().map(|f| f.position).collect();
        assert_eq!(positions, vec![0, 1]);
    }

    fn prefix_rules() -> Vec<Table> {
        substitution_pass(vec![
            rule(vec![subst(0, RuleOutput::Class(3)), context(1)]),
            rule(vec![subst(0, RuleOutput::Class(4)), context(2)]),
            rule(vec![subst(0, RuleOutput::Class(2))]),
        ])
    }

    macro_rules! matching_tests {
        ( $( ($name: ident, $input: expr, $want: expr $(,)? ), )+ ) => {
            $(
                #[test]
                fn $name() {
                    let output = run(
                        vec![vec![1], vec![2], vec![3], vec![4], vec![5]],
                        prefix_rules(),
                        &$input,
                    );
                    similar_asserts::assert_eq!(output.glyphs(), glyphs(&$want));
                }
            )+
        };
    }

    matching_tests!(
        (first_long_rule, [1, 2], [4, 2]),
        (second_long_rule, [1, 3], [5, 3]),
        (short_rule_fallback, [1, 1], [3, 3]),
        (short_rule_at_end, [2, 1], [2, 3]),
        (no_match, [2, 3, 4], [2, 3, 4]),
        (mixed, [1, 3, 1, 2, 1], [5, 3, 4, 2, 3]),
    );

    #[test]
    fn deletion() {
        let output = run(
            vec![vec![1], vec![2]],
            substitution_pass(vec![rule(vec![
                context(0),
                subst(1, RuleOutput::Deletion),
            ])]),
            &[1, 2, 2],
        );
        assert_eq!(output.glyphs(), glyphs(&[1]));
        assert_eq!(output.firings.len(), 2);
    }

    #[test]
    fn insertion_adds_glyphs() {
        let output = run(
            vec![vec![1], vec![2]],
            substitution_pass(vec![rule(vec![context(0), insertion(1)])]),
            &[1, 1],
        );
        assert_eq!(output.glyphs(), glyphs(&[1, 2, 1, 2]));
        let ids: Vec<usize> = output.slots.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![0, 2, 1, 3]);
    }

    fn reprocessing() -> Vec<Table> {
        let mut reprocess = rule(vec![subst(0, RuleOutput::Class(0))]);
        reprocess.caret = Some(0);
        substitution_pass(vec![reprocess])
    }

    #[test]
    fn rule_loop_is_cut_off() {
        let output = run(vec![vec![1]], reprocessing(), &[1]);
        assert_eq!(output.glyphs(), glyphs(&[1]));
        assert_eq!(output.firings.len(), 5);
    }

    #[test]
    fn loop_limit() {
        let mut r = renderer(vec![vec![1]], reprocessing());
        let font = font(10);
        let compiled = compiled(&mut r, &font);
        let err = Engine::new(&compiled, &font)
            .with_loop_limit(3)
            .run(&glyphs(&[1]))
            .unwrap_err();
        assert_eq!(err, EngineError::LoopLimit { pass: 0, limit: 3 });
    }

    #[test]
    fn backward_attachment() {
        let output = run(
            vec![vec![1], vec![2]],
            vec![table(
                TableKind::Positioning,
                vec![vec![rule(vec![
                    context(0),
                    with_settings(1, vec![attach_to(0)]),
                ])]],
            )],
            &[1, 2],
        );
        assert_eq!(output.slots[1].attached_to, Some(0));
        assert_eq!(output.slots[0].attached_to, None);
    }

    #[test]
    fn constraint_reads_features() {
        let mut gated = rule(vec![subst(0, RuleOutput::Class(1))]);
        gated.constraints.push(Expr::binary(
            crate::expr::BinaryOp::Eq,
            Expr::Lookup(Lookup::Feature {
                feature: 1,
                slot: None,
            }),
            Expr::Number(1),
        ));
        let mut r = renderer(vec![vec![1], vec![2]], substitution_pass(vec![gated]));
        let font = font(10);
        let compiled = compiled(&mut r, &font);
        let off = Engine::new(&compiled, &font).run(&glyphs(&[1])).unwrap();
        assert_eq!(off.glyphs(), glyphs(&[1]));
        let on = Engine::new(&compiled, &font)
            .with_feature(1, 1)
            .run(&glyphs(&[1]))
            .unwrap();
        assert_eq!(on.glyphs(), glyphs(&[2]));
    }

    #[test]
    fn passes_run_in_order() {
        let output = run(
            vec![vec![1], vec![2], vec![3]],
            vec![table(
                TableKind::Substitution,
                vec![
                    vec![rule(vec![subst(0, RuleOutput::Class(1))])],
                    vec![rule(vec![subst(1, RuleOutput::Class(2))])],
                ],
            )],
            &[1],
        );
        assert_eq!(output.glyphs(), glyphs(&[3]));
        let passes: Vec<u16> = output.firings.iter().map(|f| f.pass).collect();
        assert_eq!(passes, vec![0, 1]);
    }
}
