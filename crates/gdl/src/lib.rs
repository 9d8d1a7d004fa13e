//! Compiler core for Graphite rule programs
//!
//! A Graphite rule program is a list of rule tables (linebreak, substitution,
//!     justification and positioning),
//!     each made of passes,
//!     each made of rules.
//! At shaping time every pass is driven by a finite state machine that recognizes
//!     which rules match at the current position in the glyph stream,
//!     and by per-rule engine code that tests the rule's constraints and performs its actions.
//!
//! This crate takes a symbol-resolved program (a [rule::Renderer]) and a font accessor ([Font])
//!     and produces both: see [compile()].
//! The pipeline is:
//!
//! 1. [check]: validate rules against their table and mark bad scopes.
//! 1. [precontext]: pad rules so that all rules in a pass share the same pre-context length.
//! 1. [classes]: assign IDs to the glyph classes used by substitutions.
//! 1. [index]: assign input and output stream indices and rewrite slot references.
//! 1. Version negotiation: see [code::min_version].
//! 1. [fsm]: build each pass's state machine.
//! 1. [code]: generate constraint and action code.
//! 1. [xlb]: compute the cross-line-boundary context.
//!
//! The [silf] module serializes the result and the [engine] module runs it on a glyph buffer.

pub mod attr;
pub mod check;
pub mod classes;
pub mod code;
pub mod compile;
pub mod diag;
pub mod engine;
pub mod expr;
pub mod fsm;
pub mod index;
pub mod precontext;
pub mod rule;
pub mod silf;
pub mod xlb;

#[cfg(test)]
mod testing;

pub use compile::{compile, Compiled, Failure, InternalError, Options};
pub use font::{Font, Glyph, GlyphMetric, MemoryFont};

/// Maximum number of items in a rule, after padding.
pub const MAX_SLOTS_PER_RULE: usize = 64;

/// Maximum number of passes, over all tables.
pub const MAX_PASSES: usize = 128;

/// Maximum number of rules in a pass.
pub const MAX_RULES_PER_PASS: usize = u16::MAX as usize;

/// Maximum number of replacement class IDs.
pub const MAX_REPLACEMENT_CLASSES: usize = u16::MAX as usize;

/// Version of the engine instruction set, in 16.16 fixed point.
///
/// The version determines operand widths and which opcodes are available.
/// For example version 2.0 introduced 16-bit replacement class IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Version(pub u32);

impl Version {
    pub const V1_0: Version = Version(0x0001_0000);
    pub const V2_0: Version = Version(0x0002_0000);
    pub const V3_0: Version = Version(0x0003_0000);

    /// Highest version this compiler can generate code for.
    pub const MAX_SUPPORTED: Version = Version::V3_0;

    pub fn major(&self) -> u16 {
        (self.0 >> 16) as u16
    }

    pub fn minor(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Whether 16-bit replacement class and glyph attribute operands are available.
    pub fn has_wide_operands(&self) -> bool {
        *self >= Version::V2_0
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::V2_0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

/// Error returned when parsing a [Version] from a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseVersionError(pub String);

impl std::fmt::Display for ParseVersionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid version `{}`; expected a version like `2.0` or `0x00020000`",
            self.0
        )
    }
}

impl std::error::Error for ParseVersionError {}

impl std::str::FromStr for Version {
    type Err = ParseVersionError;

    /// Parses `2`, `2.0`, `2.1` or the fixed point form `0x00020000`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseVersionError(s.to_string());
        if let Some(hex) = s.strip_prefix("0x") {
            return u32::from_str_radix(hex, 16).map(Version).map_err(|_| err());
        }
        let (major, minor) = match s.split_once('.') {
            None => (s, "0"),
            Some(pair) => pair,
        };
        let major: u16 = major.parse().map_err(|_| err())?;
        let minor: u16 = minor.parse().map_err(|_| err())?;
        Ok(Version(((major as u32) << 16) | minor as u32))
    }
}
