//! Diagnostics
//!
//! Problems found while compiling are recorded in a [Diagnostics] list that is passed
//!     to every phase.
//! A diagnostic is either a warning, which never stops compilation,
//!     or a fatal error, which marks the offending rule, pass or table bad.
//! Later phases skip bad scopes,
//!     and no compiled output is produced if any fatal error was recorded.

use crate::attr::SlotAttr;
use crate::expr::ExprType;
use crate::rule::{ClassId, TableKind};
use crate::Version;

/// Codes at or above this value are fatal errors.
pub const FATAL_BASE: u16 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Fatal,
}

/// Kind of a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    ComponentRefNotAssociated {
        slot: usize,
    },
    ClassSizeMismatch {
        input: usize,
        output: usize,
    },
    NoJustificationStatusTest,
    DirectionAfterBidi,
    NumberAssignedToMeasurement(SlotAttr),
    AttachmentWithoutAttachTo(SlotAttr),
    SettingOnDeletedItem(SlotAttr),
    VersionBumped {
        requested: Version,
        required: Version,
    },
    RuleNeverMatches {
        class: ClassId,
    },

    SelectorOutOfRange {
        slot: usize,
    },
    AssociationOutOfRange {
        slot: usize,
    },
    /// A selector or association names an item that has no input glyph of its own.
    SlotRoleInvalid {
        slot: usize,
        role: &'static str,
        target: &'static str,
    },
    ConstraintOnInsertion,
    /// An insertion that copies itself, or that is deleted.
    InvalidInsertion {
        reason: &'static str,
    },
    SlotRefOutOfRange {
        slot: usize,
    },
    SlotRefToInsertion {
        slot: usize,
    },
    /// Substituting `ANY` or `#` into a class of more than one glyph.
    SubstitutionFromUnindexable {
        output_size: usize,
    },
    OperationNotAllowed {
        what: String,
        table: TableKind,
    },
    AttrReadOnly(SlotAttr),
    AttrWriteOnly(SlotAttr),
    AttrIndexMismatch {
        attr: SlotAttr,
        indexed: bool,
    },
    TypeMismatch {
        attr: SlotAttr,
        expected: ExprType,
        got: ExprType,
    },
    TooManySlots {
        count: usize,
    },
    TooManyRules {
        count: usize,
    },
    TooManyPasses {
        count: usize,
    },
    TooManyReplacementClasses {
        count: usize,
    },
    NoModifiedItem,
    NoInputItems,
    VersionTooLow {
        requested: Version,
        required: Version,
    },
    DuplicateTable(TableKind),
    UnknownClass(ClassId),
    CaretOutOfRange {
        caret: usize,
    },
    StringInExpression,
    ConstraintTooLong {
        len: usize,
    },
    SlotOffsetOutOfRange {
        offset: i32,
    },
    TooManyStates {
        count: usize,
    },
    TooManyColumns {
        count: usize,
    },
    InvalidLineBreakItem,
    ExpressionTypeMismatch {
        operator: String,
        operand: ExprType,
    },
    TooManyAssociations {
        count: usize,
    },
}

impl DiagnosticKind {
    /// Numeric code of the diagnostic. Warnings are below [FATAL_BASE].
    pub fn code(&self) -> u16 {
        use DiagnosticKind::*;
        match self {
            ComponentRefNotAssociated { .. } => 1001,
            ClassSizeMismatch { .. } => 1002,
            NoJustificationStatusTest => 1003,
            DirectionAfterBidi => 1004,
            NumberAssignedToMeasurement(_) => 1005,
            AttachmentWithoutAttachTo(_) => 1006,
            SettingOnDeletedItem(_) => 1007,
            VersionBumped { .. } => 1008,
            RuleNeverMatches { .. } => 1009,
            SelectorOutOfRange { .. } => 2001,
            AssociationOutOfRange { .. } => 2002,
            SlotRoleInvalid { .. } => 2003,
            ConstraintOnInsertion => 2004,
            InvalidInsertion { .. } => 2005,
            SlotRefOutOfRange { .. } => 2006,
            SlotRefToInsertion { .. } => 2007,
            SubstitutionFromUnindexable { .. } => 2008,
            OperationNotAllowed { .. } => 2009,
            AttrReadOnly(_) => 2010,
            AttrWriteOnly(_) => 2011,
            AttrIndexMismatch { .. } => 2012,
            TypeMismatch { .. } => 2013,
            TooManySlots { .. } => 2014,
            TooManyRules { .. } => 2015,
            TooManyPasses { .. } => 2016,
            TooManyReplacementClasses { .. } => 2017,
            NoModifiedItem => 2018,
            NoInputItems => 2019,
            VersionTooLow { .. } => 2020,
            DuplicateTable(_) => 2021,
            UnknownClass(_) => 2022,
            CaretOutOfRange { .. } => 2023,
            StringInExpression => 2024,
            ConstraintTooLong { .. } => 2025,
            SlotOffsetOutOfRange { .. } => 2026,
            TooManyStates { .. } => 2027,
            TooManyColumns { .. } => 2028,
            InvalidLineBreakItem => 2029,
            ExpressionTypeMismatch { .. } => 2030,
            TooManyAssociations { .. } => 2031,
        }
    }

    pub fn severity(&self) -> Severity {
        if self.code() >= FATAL_BASE {
            Severity::Fatal
        } else {
            Severity::Warning
        }
    }

    pub fn message(&self) -> String {
        use DiagnosticKind::*;
        match self {
            ComponentRefNotAssociated { slot } => format!(
                "component reference to @{} which is not one of the item's associations",
                slot + 1
            ),
            ClassSizeMismatch { input, output } => format!(
                "input class has {input} glyphs but output class has {output}; extra glyphs are not substituted"
            ),
            NoJustificationStatusTest => {
                "justification table has no constraint testing the justification status".into()
            }
            DirectionAfterBidi => "setting dir after the bidi pass has no effect".into(),
            NumberAssignedToMeasurement(attr) => {
                format!("plain number assigned to measurement attribute {attr}; assuming design units")
            }
            AttachmentWithoutAttachTo(attr) => {
                format!("{attr} is set but attach.to is not")
            }
            SettingOnDeletedItem(attr) => format!("{attr} is set on an item that is deleted"),
            VersionBumped {
                requested,
                required,
            } => format!("engine version raised from {requested} to {required}"),
            RuleNeverMatches { class } => {
                format!("rule can never match: class {class} is empty")
            }
            SelectorOutOfRange { slot } => format!("selector @{} is out of range", slot + 1),
            AssociationOutOfRange { slot } => {
                format!("association @{} is out of range", slot + 1)
            }
            SlotRoleInvalid { slot, role, target } => {
                format!("{role} @{} refers to {target}", slot + 1)
            }
            ConstraintOnInsertion => "constraint on an inserted item".into(),
            InvalidInsertion { reason } => format!("invalid insertion: {reason}"),
            SlotRefOutOfRange { slot } => {
                format!("slot reference @{} is out of range", slot + 1)
            }
            SlotRefToInsertion { slot } => format!(
                "slot reference @{} refers to an inserted item, which has no input glyph",
                slot + 1
            ),
            SubstitutionFromUnindexable { output_size } => format!(
                "cannot substitute from ANY or # into a class of {output_size} glyphs"
            ),
            OperationNotAllowed { what, table } => {
                format!("{what} is not allowed in the {table} table")
            }
            AttrReadOnly(attr) => format!("{attr} is read only"),
            AttrWriteOnly(attr) => format!("{attr} cannot be read"),
            AttrIndexMismatch { attr, indexed } => {
                if *indexed {
                    format!("{attr} requires an index")
                } else {
                    format!("{attr} does not take an index")
                }
            }
            TypeMismatch {
                attr,
                expected,
                got,
            } => format!(
                "{attr} expects a {} value, got a {}",
                expected.name(),
                got.name()
            ),
            TooManySlots { count } => format!(
                "rule has {count} items; the limit is {}",
                crate::MAX_SLOTS_PER_RULE
            ),
            TooManyRules { count } => format!(
                "pass has {count} rules; the limit is {}",
                crate::MAX_RULES_PER_PASS
            ),
            TooManyPasses { count } => format!(
                "program has {count} passes; the limit is {}",
                crate::MAX_PASSES
            ),
            TooManyReplacementClasses { count } => format!(
                "program needs {count} replacement classes; the limit is {}",
                crate::MAX_REPLACEMENT_CLASSES
            ),
            NoModifiedItem => "rule does not modify any item".into(),
            NoInputItems => "rule does not match any input".into(),
            VersionTooLow {
                requested,
                required,
            } => format!("rule requires engine version {required} but {requested} was requested"),
            DuplicateTable(kind) => format!("more than one {kind} table"),
            UnknownClass(class) => format!("unknown class {class}"),
            CaretOutOfRange { caret } => format!("caret position {caret} is out of range"),
            StringInExpression => "string literal in expression".into(),
            ConstraintTooLong { len } => {
                format!("constraint compiles to {len} bytes; the limit is 255")
            }
            SlotOffsetOutOfRange { offset } => {
                format!("slot offset {offset} is out of range")
            }
            TooManyStates { count } => format!(
                "state machine has {count} states; the limit is {}",
                u16::MAX
            ),
            TooManyColumns { count } => format!(
                "state machine has {count} columns; the limit is {}",
                u16::MAX
            ),
            InvalidLineBreakItem => "line-break item must match #".into(),
            ExpressionTypeMismatch { operator, operand } => {
                format!("operator {operator} cannot take a {} operand", operand.name())
            }
            TooManyAssociations { count } => {
                format!("item has {count} associations; the limit is 255")
            }
        }
    }
}

/// Where in the program a diagnostic applies.
///
/// Pass, rule and item numbers are zero-based positions in their parent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub table: Option<TableKind>,
    pub pass: Option<usize>,
    pub rule: Option<usize>,
    pub item: Option<usize>,
    pub line: Option<u32>,
}

impl Location {
    pub fn table(kind: TableKind) -> Location {
        Location {
            table: Some(kind),
            ..Default::default()
        }
    }

    pub fn pass(kind: TableKind, pass: usize) -> Location {
        Location {
            pass: Some(pass),
            ..Location::table(kind)
        }
    }

    pub fn rule(kind: TableKind, pass: usize, rule: usize, line: u32) -> Location {
        Location {
            rule: Some(rule),
            line: if line == 0 { None } else { Some(line) },
            ..Location::pass(kind, pass)
        }
    }

    pub fn with_item(self, item: usize) -> Location {
        Location {
            item: Some(item),
            ..self
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = vec![];
        if let Some(table) = self.table {
            parts.push(format!("{table} table"));
        }
        if let Some(pass) = self.pass {
            parts.push(format!("pass {}", pass + 1));
        }
        if let Some(rule) = self.rule {
            parts.push(format!("rule {}", rule + 1));
        }
        if let Some(item) = self.item {
            parts.push(format!("item {}", item + 1));
        }
        if let Some(line) = self.line {
            parts.push(format!("line {line}"));
        }
        if parts.is_empty() {
            write!(f, "program")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub location: Location,
}

impl Diagnostic {
    pub fn is_fatal(&self) -> bool {
        self.kind.severity() == Severity::Fatal
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.kind.severity() {
            Severity::Warning => "warning",
            Severity::Fatal => "error",
        };
        write!(
            f,
            "{label}[{}]: {} ({})",
            self.kind.code(),
            self.kind.message(),
            self.location
        )
    }
}

/// Diagnostics recorded during one compilation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    diagnostics: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Records a diagnostic and logs it. Returns true if it is fatal.
    pub fn push(&mut self, kind: DiagnosticKind, location: Location) -> bool {
        let diagnostic = Diagnostic { kind, location };
        let fatal = diagnostic.is_fatal();
        if fatal {
            tracing::error!(code = diagnostic.kind.code(), "{}", diagnostic);
        } else {
            tracing::warn!(code = diagnostic.kind.code(), "{}", diagnostic);
        }
        self.diagnostics.push(diagnostic);
        fatal
    }

    pub fn has_fatal(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_fatal)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| !d.is_fatal())
    }

    pub fn fatal(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_fatal())
    }

    /// Codes of all diagnostics, in the order they were recorded.
    pub fn codes(&self) -> Vec<u16> {
        self.diagnostics.iter().map(|d| d.kind.code()).collect()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_follows_code() {
        assert_eq!(
            DiagnosticKind::NoJustificationStatusTest.severity(),
            Severity::Warning
        );
        assert_eq!(DiagnosticKind::NoModifiedItem.severity(), Severity::Fatal);
        assert!(DiagnosticKind::ExpressionTypeMismatch {
            operator: "+".into(),
            operand: ExprType::String
        }
        .code()
            >= FATAL_BASE);
    }

    #[test]
    fn push_tracks_fatal() {
        let mut diagnostics = Diagnostics::default();
        assert!(!diagnostics.push(
            DiagnosticKind::DirectionAfterBidi,
            Location::default()
        ));
        assert!(!diagnostics.has_fatal());
        assert!(diagnostics.push(
            DiagnosticKind::NoInputItems,
            Location::rule(TableKind::Substitution, 0, 2, 17)
        ));
        assert!(diagnostics.has_fatal());
        assert_eq!(diagnostics.codes(), vec![1004, 2019]);
        assert_eq!(diagnostics.warnings().count(), 1);
    }

    #[test]
    fn display() {
        let d = Diagnostic {
            kind: DiagnosticKind::SelectorOutOfRange { slot: 4 },
            location: Location::rule(TableKind::Positioning, 1, 0, 12).with_item(2),
        };
        assert_eq!(
            d.to_string(),
            "error[2001]: selector @5 is out of range (positioning table, pass 2, rule 1, item 3, line 12)"
        );
    }
}
