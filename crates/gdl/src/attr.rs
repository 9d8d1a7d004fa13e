//! Slot attributes, process states and table operations
//!
//! Every slot in the glyph stream carries a fixed set of attributes
//!     that rules can read in constraints and expressions,
//!     and that attribute-setter items can write.
//! Which attributes can be written depends on the kind of table the rule lives in:
//!     see [Ops].

/// Set of rule construction operations.
///
/// Each table kind allows a fixed set of operations ([crate::rule::TableKind::allowed_ops]);
///     each writable slot attribute requires one.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ops(pub u16);

impl Ops {
    pub const NONE: Ops = Ops(0);
    pub const BREAK: Ops = Ops(0x0001);
    pub const DIRECTION: Ops = Ops(0x0002);
    pub const INSERT: Ops = Ops(0x0004);
    pub const SUBSTITUTION: Ops = Ops(0x0008);
    pub const POSITIONING: Ops = Ops(0x0010);
    pub const JUSTIFICATION: Ops = Ops(0x0020);
    pub const COMPONENTS: Ops = Ops(0x0040);
    pub const USER: Ops = Ops(0x0080);
    pub const MEASURE: Ops = Ops(0x0100);
    /// Direction can only be set before the bidi pass.
    pub const PRE_BIDI: Ops = Ops(0x0200);

    const NAMED: [(Ops, &'static str); 10] = [
        (Ops::BREAK, "break"),
        (Ops::DIRECTION, "direction"),
        (Ops::INSERT, "insert"),
        (Ops::SUBSTITUTION, "substitution"),
        (Ops::POSITIONING, "positioning"),
        (Ops::JUSTIFICATION, "justification"),
        (Ops::COMPONENTS, "components"),
        (Ops::USER, "user"),
        (Ops::MEASURE, "measure"),
        (Ops::PRE_BIDI, "pre-bidi"),
    ];

    pub fn contains(&self, other: Ops) -> bool {
        self.0 & other.0 == other.0
    }

    /// Names of the operations in this set.
    pub fn names(&self) -> Vec<&'static str> {
        Ops::NAMED
            .iter()
            .filter(|(op, _)| self.contains(*op))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for Ops {
    type Output = Ops;

    fn bitor(self, rhs: Self) -> Self::Output {
        Ops(self.0 | rhs.0)
    }
}

/// Type of value an attribute holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Number,
    Measurement,
    Boolean,
    SlotRef,
}

/// Whether an attribute can be read, written or both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadWrite,
    ReadOnly,
    WriteOnly,
}

/// A slot attribute.
///
/// The discriminant is the operand used by the attribute instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum SlotAttr {
    AdvanceX = 0,
    AdvanceY = 1,
    AttachTo = 2,
    AttachAtX = 3,
    AttachAtY = 4,
    AttachAtGpoint = 5,
    AttachAtXoff = 6,
    AttachAtYoff = 7,
    AttachWithX = 8,
    AttachWithY = 9,
    AttachWithGpoint = 10,
    AttachWithXoff = 11,
    AttachWithYoff = 12,
    AttachLevel = 13,
    Break = 14,
    ComponentRef = 15,
    Dir = 16,
    Insert = 17,
    PositionX = 18,
    PositionY = 19,
    ShiftX = 20,
    ShiftY = 21,
    User = 22,
    MeasureSol = 23,
    MeasureEol = 24,
    JustifyStretch = 25,
    JustifyShrink = 26,
    JustifyStep = 27,
    JustifyWeight = 28,
    JustifyWidth = 29,
}

impl SlotAttr {
    pub const ALL: [SlotAttr; 30] = {
        use SlotAttr::*;
        [
            AdvanceX,
            AdvanceY,
            AttachTo,
            AttachAtX,
            AttachAtY,
            AttachAtGpoint,
            AttachAtXoff,
            AttachAtYoff,
            AttachWithX,
            AttachWithY,
            AttachWithGpoint,
            AttachWithXoff,
            AttachWithYoff,
            AttachLevel,
            Break,
            ComponentRef,
            Dir,
            Insert,
            PositionX,
            PositionY,
            ShiftX,
            ShiftY,
            User,
            MeasureSol,
            MeasureEol,
            JustifyStretch,
            JustifyShrink,
            JustifyStep,
            JustifyWeight,
            JustifyWidth,
        ]
    };

    pub fn from_code(code: u8) -> Option<SlotAttr> {
        SlotAttr::ALL.get(code as usize).copied()
    }

    pub fn code(&self) -> u8 {
        *self as u8
    }

    /// Name of the attribute as written in rule programs.
    pub fn name(&self) -> &'static str {
        use SlotAttr::*;
        match self {
            AdvanceX => "advance.x",
            AdvanceY => "advance.y",
            AttachTo => "attach.to",
            AttachAtX => "attach.at.x",
            AttachAtY => "attach.at.y",
            AttachAtGpoint => "attach.at.gpoint",
            AttachAtXoff => "attach.at.xoffset",
            AttachAtYoff => "attach.at.yoffset",
            AttachWithX => "attach.with.x",
            AttachWithY => "attach.with.y",
            AttachWithGpoint => "attach.with.gpoint",
            AttachWithXoff => "attach.with.xoffset",
            AttachWithYoff => "attach.with.yoffset",
            AttachLevel => "attach.level",
            Break => "breakweight",
            ComponentRef => "component.ref",
            Dir => "dir",
            Insert => "insert",
            PositionX => "position.x",
            PositionY => "position.y",
            ShiftX => "shift.x",
            ShiftY => "shift.y",
            User => "user",
            MeasureSol => "measure.startofline",
            MeasureEol => "measure.endofline",
            JustifyStretch => "justify.stretch",
            JustifyShrink => "justify.shrink",
            JustifyStep => "justify.step",
            JustifyWeight => "justify.weight",
            JustifyWidth => "justify.width",
        }
    }

    pub fn value_type(&self) -> ValueType {
        use SlotAttr::*;
        match self {
            AttachTo | ComponentRef => ValueType::SlotRef,
            Insert => ValueType::Boolean,
            AttachAtGpoint | AttachWithGpoint | AttachLevel | Break | Dir | User
            | JustifyWeight => ValueType::Number,
            AdvanceX | AdvanceY | AttachAtX | AttachAtY | AttachAtXoff | AttachAtYoff
            | AttachWithX | AttachWithY | AttachWithXoff | AttachWithYoff | PositionX
            | PositionY | ShiftX | ShiftY | MeasureSol | MeasureEol | JustifyStretch
            | JustifyShrink | JustifyStep | JustifyWidth => ValueType::Measurement,
        }
    }

    pub fn access(&self) -> Access {
        use SlotAttr::*;
        match self {
            PositionX | PositionY => Access::ReadOnly,
            AttachTo | ComponentRef => Access::WriteOnly,
            _ => Access::ReadWrite,
        }
    }

    /// The operation a table must allow for this attribute to be set there.
    pub fn required_ops(&self) -> Ops {
        use SlotAttr::*;
        match self {
            AdvanceX | AdvanceY | AttachTo | AttachAtX | AttachAtY | AttachAtGpoint
            | AttachAtXoff | AttachAtYoff | AttachWithX | AttachWithY | AttachWithGpoint
            | AttachWithXoff | AttachWithYoff | AttachLevel | PositionX | PositionY | ShiftX
            | ShiftY => Ops::POSITIONING,
            Break => Ops::BREAK,
            ComponentRef => Ops::COMPONENTS,
            Dir => Ops::DIRECTION,
            Insert => Ops::INSERT,
            User => Ops::USER,
            MeasureSol | MeasureEol => Ops::MEASURE,
            JustifyStretch | JustifyShrink | JustifyStep | JustifyWeight | JustifyWidth => {
                Ops::JUSTIFICATION
            }
        }
    }

    /// Whether the attribute is an array that must be accessed with an index.
    ///
    /// Component references are indexed by component, user attributes by number,
    ///     and justification attributes by justification level.
    pub fn is_indexed(&self) -> bool {
        use SlotAttr::*;
        matches!(
            self,
            ComponentRef
                | User
                | JustifyStretch
                | JustifyShrink
                | JustifyStep
                | JustifyWeight
                | JustifyWidth
        )
    }

    /// Whether setting this attribute is part of an attachment.
    pub fn is_attachment_point(&self) -> bool {
        use SlotAttr::*;
        matches!(
            self,
            AttachAtX
                | AttachAtY
                | AttachAtGpoint
                | AttachAtXoff
                | AttachAtYoff
                | AttachWithX
                | AttachWithY
                | AttachWithGpoint
                | AttachWithXoff
                | AttachWithYoff
                | AttachLevel
        )
    }
}

impl std::fmt::Display for SlotAttr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Engine process state readable with `PushProcState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[repr(u8)]
pub enum ProcState {
    /// Justification status of the current line: whether justification is running.
    JustifyMode = 1,
    JustifyLevel = 2,
}

impl ProcState {
    pub fn from_code(code: u8) -> Option<ProcState> {
        match code {
            1 => Some(ProcState::JustifyMode),
            2 => Some(ProcState::JustifyLevel),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProcState::JustifyMode => "JustifyMode",
            ProcState::JustifyLevel => "JustifyLevel",
        }
    }
}
