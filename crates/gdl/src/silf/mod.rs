//! Silf table serialization
//!
//! Compiled programs are stored in the font's Silf table:
//!     a header, the replacement class map and one subtable per pass.
//! All values are big endian.
//! Offsets are in bytes from the start of the structure that contains them.
//!
//! The serialized form is built in two steps.
//! [PassTable], [ClassMap] and [SilfTable] hold the values exactly as they are stored,
//!     with every count narrowed to its field width.
//! Serializing them is then infallible except for code and class offsets that do not fit.
//! Deserializing produces the same structures, so a round trip can be checked with `==`.

mod deserialize;
mod serialize;

pub use deserialize::{deserialize, deserialize_classes, deserialize_pass};
pub use serialize::{serialize, serialize_classes, serialize_pass};

use crate::classes::ReplacementClasses;
use crate::compile::{Compiled, CompiledPass};
use crate::fsm::GlyphRange;
use crate::rule::TableKind;
use crate::xlb::XlbContext;
use crate::Version;
use font::Glyph;

/// Error serializing or deserializing a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A value does not fit in its field.
    Overflow { field: &'static str, value: usize },
    /// The data ends before the field.
    Truncated { field: &'static str, offset: usize },
    /// The field contradicts the rest of the data.
    Inconsistent { field: &'static str, value: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Overflow { field, value } => {
                write!(f, "{field}: value {value} does not fit in the field")
            }
            Error::Truncated { field, offset } => {
                write!(f, "{field}: data ends before offset {offset}")
            }
            Error::Inconsistent { field, value } => {
                write!(f, "{field}: value {value} is inconsistent with the rest of the table")
            }
        }
    }
}

impl std::error::Error for Error {}

fn to_u8(field: &'static str, value: usize) -> Result<u8, Error> {
    u8::try_from(value).map_err(|_| Error::Overflow { field, value })
}

fn to_u16(field: &'static str, value: usize) -> Result<u16, Error> {
    u16::try_from(value).map_err(|_| Error::Overflow { field, value })
}

/// Binary search header for `n` records of `size` bytes:
///     search range, entry selector and range shift.
fn search_header(n: usize, size: usize) -> [u16; 3] {
    if n == 0 {
        return [0, 0, 0];
    }
    let entry_selector = n.ilog2();
    let search_range = size << entry_selector;
    let range_shift = size * n - search_range;
    [
        search_range as u16,
        entry_selector as u16,
        range_shift as u16,
    ]
}

/// One pass subtable.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassTable {
    pub flags: u8,
    pub max_rule_loop: u8,
    pub max_rule_context: u8,
    pub max_backup: u8,
    pub num_states: u16,
    pub num_transitional: u16,
    pub num_success: u16,
    pub num_columns: u16,
    pub ranges: Vec<GlyphRange>,
    /// Rules of each success state.
    pub rule_map: Vec<Vec<u16>>,
    pub min_pre: u8,
    pub max_pre: u8,
    pub start_states: Vec<u16>,
    pub sort_keys: Vec<u16>,
    pub pre_context: Vec<u8>,
    pub collision_threshold: u8,
    /// One row per transitional state.
    pub transitions: Vec<Vec<u16>>,
    pub pass_constraint: Vec<u8>,
    pub constraints: Vec<Vec<u8>>,
    pub actions: Vec<Vec<u8>>,
}

impl PassTable {
    pub fn new(pass: &CompiledPass) -> Result<PassTable, Error> {
        let m = &pass.machine;
        Ok(PassTable {
            flags: 0,
            max_rule_loop: pass.max_rule_loop,
            max_rule_context: to_u8("max rule context", pass.max_rule_context)?,
            max_backup: to_u8("max backup", pass.max_backup)?,
            num_states: to_u16("states", m.num_states)?,
            num_transitional: to_u16("transitional states", m.num_transitional)?,
            num_success: to_u16("success states", m.num_success)?,
            num_columns: to_u16("columns", m.columns.len())?,
            ranges: m.ranges.clone(),
            rule_map: m.success_rules.clone(),
            min_pre: to_u8("min pre-context", m.min_pre)?,
            max_pre: to_u8("max pre-context", m.max_pre)?,
            start_states: m.start_states.clone(),
            sort_keys: pass
                .rules
                .iter()
                .map(|r| to_u16("sort key", r.sort_key))
                .collect::<Result<_, _>>()?,
            pre_context: pass
                .rules
                .iter()
                .map(|r| to_u8("rule pre-context", r.pre_context))
                .collect::<Result<_, _>>()?,
            collision_threshold: 0,
            transitions: m.transitions.clone(),
            pass_constraint: vec![],
            constraints: pass.rules.iter().map(|r| r.code.constraints.clone()).collect(),
            actions: pass.rules.iter().map(|r| r.code.actions.clone()).collect(),
        })
    }

    pub fn num_rules(&self) -> usize {
        self.sort_keys.len()
    }
}

/// The replacement class map.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ClassMap {
    pub linear: Vec<Vec<Glyph>>,
    pub indexed: Vec<Vec<(Glyph, u16)>>,
}

impl From<&ReplacementClasses> for ClassMap {
    fn from(value: &ReplacementClasses) -> Self {
        ClassMap {
            linear: value.linear.clone(),
            indexed: value.indexed.clone(),
        }
    }
}

/// The whole table.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SilfTable {
    pub version: Version,
    /// Index of the first substitution, justification and positioning pass.
    /// A table without passes points at the next table's first pass.
    pub first_pass: [u8; 3],
    pub xlb: XlbContext,
    pub classes: ClassMap,
    pub passes: Vec<PassTable>,
}

impl SilfTable {
    pub const FLAG_LINE_BREAK: u8 = 1;

    pub fn new(compiled: &Compiled) -> Result<SilfTable, Error> {
        to_u8("passes", compiled.passes.len())?;
        let first = |kind: TableKind| {
            let i = compiled
                .passes
                .iter()
                .position(|p| p.table >= kind)
                .unwrap_or(compiled.passes.len());
            i as u8
        };
        Ok(SilfTable {
            version: compiled.version,
            first_pass: [
                first(TableKind::Substitution),
                first(TableKind::Justification),
                first(TableKind::Positioning),
            ],
            xlb: compiled.xlb,
            classes: (&compiled.classes).into(),
            passes: compiled
                .passes
                .iter()
                .map(PassTable::new)
                .collect::<Result<_, _>>()?,
        })
    }
}
