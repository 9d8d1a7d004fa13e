use super::*;

/// Serializes a compiled program as a Silf table.
pub fn serialize(compiled: &Compiled) -> Result<Vec<u8>, Error> {
    SilfTable::new(compiled)?.serialize()
}

/// Serializes one compiled pass as a pass subtable.
pub fn serialize_pass(pass: &CompiledPass) -> Result<Vec<u8>, Error> {
    PassTable::new(pass)?.serialize()
}

/// Serializes the replacement class map.
pub fn serialize_classes(classes: &ReplacementClasses) -> Result<Vec<u8>, Error> {
    ClassMap::from(classes).serialize()
}

trait Serializable {
    fn serialize(&self, b: &mut Vec<u8>);
}

impl Serializable for u8 {
    fn serialize(&self, b: &mut Vec<u8>) {
        b.push(*self)
    }
}

impl Serializable for u16 {
    fn serialize(&self, b: &mut Vec<u8>) {
        b.extend(self.to_be_bytes())
    }
}

impl Serializable for u32 {
    fn serialize(&self, b: &mut Vec<u8>) {
        b.extend(self.to_be_bytes())
    }
}

impl Serializable for Glyph {
    fn serialize(&self, b: &mut Vec<u8>) {
        self.0.serialize(b)
    }
}

impl Serializable for GlyphRange {
    fn serialize(&self, b: &mut Vec<u8>) {
        self.first.serialize(b);
        self.last.serialize(b);
        self.column.serialize(b);
    }
}

impl Serializable for (Glyph, u16) {
    fn serialize(&self, b: &mut Vec<u8>) {
        self.0.serialize(b);
        self.1.serialize(b);
    }
}

impl<T: Serializable> Serializable for Vec<T> {
    fn serialize(&self, b: &mut Vec<u8>) {
        for element in self {
            element.serialize(b)
        }
    }
}

impl<T: Serializable, const N: usize> Serializable for [T; N] {
    fn serialize(&self, b: &mut Vec<u8>) {
        for element in self {
            element.serialize(b)
        }
    }
}

/// Writes `count + 1` running offsets: the start of each block, then the end of the last.
fn serialize_offsets(
    field: &'static str,
    lens: impl Iterator<Item = usize>,
    b: &mut Vec<u8>,
) -> Result<(), Error> {
    let mut offset = 0_usize;
    to_u16(field, offset)?.serialize(b);
    for len in lens {
        offset += len;
        to_u16(field, offset)?.serialize(b);
    }
    Ok(())
}

/// Size of the fixed header of a pass subtable.
pub(super) const PASS_HEADER_LEN: usize = 24;

impl PassTable {
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let mut b = vec![0_u8; PASS_HEADER_LEN];
        [b[0], b[1], b[2], b[3]] = [
            self.flags,
            self.max_rule_loop,
            self.max_rule_context,
            self.max_backup,
        ];

        let fsm_offset = b.len();
        [
            self.num_states,
            self.num_transitional,
            self.num_success,
            self.num_columns,
        ]
        .serialize(&mut b);
        to_u16("glyph ranges", self.ranges.len())?.serialize(&mut b);
        search_header(self.ranges.len(), 6).serialize(&mut b);
        self.ranges.serialize(&mut b);

        serialize_offsets("rule map", self.rule_map.iter().map(Vec::len), &mut b)?;
        for rules in &self.rule_map {
            rules.serialize(&mut b);
        }
        self.min_pre.serialize(&mut b);
        self.max_pre.serialize(&mut b);
        self.start_states.serialize(&mut b);
        self.sort_keys.serialize(&mut b);
        self.pre_context.serialize(&mut b);
        self.collision_threshold.serialize(&mut b);
        to_u16("pass constraint", self.pass_constraint.len())?.serialize(&mut b);
        serialize_offsets("constraint code", self.constraints.iter().map(Vec::len), &mut b)?;
        serialize_offsets("action code", self.actions.iter().map(Vec::len), &mut b)?;
        for row in &self.transitions {
            row.serialize(&mut b);
        }
        // reserved
        b.push(0);

        let pass_constraint = b.len();
        b.extend(&self.pass_constraint);
        let constraints = b.len();
        for code in &self.constraints {
            b.extend(code);
        }
        let actions = b.len();
        for code in &self.actions {
            b.extend(code);
        }

        let mut header = vec![];
        to_u16("rules", self.num_rules())?.serialize(&mut header);
        to_u16("fsm offset", fsm_offset)?.serialize(&mut header);
        for offset in [pass_constraint, constraints, actions] {
            (offset as u32).serialize(&mut header);
        }
        // debug info offset
        0_u32.serialize(&mut header);
        b[4..PASS_HEADER_LEN].copy_from_slice(&header);
        Ok(b)
    }
}

impl ClassMap {
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let num_classes = self.linear.len() + self.indexed.len();
        let mut b = vec![];
        to_u16("classes", num_classes)?.serialize(&mut b);
        to_u16("linear classes", self.linear.len())?.serialize(&mut b);
        let offsets_at = b.len();
        b.resize(b.len() + 4 * (num_classes + 1), 0);

        let mut offsets = vec![];
        for class in &self.linear {
            offsets.push(b.len());
            class.serialize(&mut b);
        }
        for class in &self.indexed {
            offsets.push(b.len());
            to_u16("indexed class", class.len())?.serialize(&mut b);
            search_header(class.len(), 4).serialize(&mut b);
            class.serialize(&mut b);
        }
        offsets.push(b.len());

        let mut encoded = vec![];
        for offset in offsets {
            let offset = u32::try_from(offset).map_err(|_| Error::Overflow {
                field: "class offset",
                value: offset,
            })?;
            offset.serialize(&mut encoded);
        }
        b[offsets_at..offsets_at + encoded.len()].copy_from_slice(&encoded);
        Ok(b)
    }
}

/// Size of the fixed header of the table, before the offsets.
pub(super) const SILF_HEADER_LEN: usize = 12;

impl SilfTable {
    pub fn serialize(&self) -> Result<Vec<u8>, Error> {
        let num_passes = to_u8("passes", self.passes.len())?;
        let mut b = vec![];
        self.version.0.serialize(&mut b);
        num_passes.serialize(&mut b);
        self.first_pass.serialize(&mut b);
        let flags = if self.xlb.line_break {
            SilfTable::FLAG_LINE_BREAK
        } else {
            0
        };
        [flags, self.xlb.pre.to_byte(), self.xlb.post.to_byte(), 0].serialize(&mut b);

        // class map offset, then one offset per pass and the end
        let offsets_at = b.len();
        b.resize(b.len() + 4 * (self.passes.len() + 2), 0);
        let mut offsets = vec![b.len()];
        b.extend(self.classes.serialize()?);
        for pass in &self.passes {
            offsets.push(b.len());
            b.extend(pass.serialize()?);
        }
        offsets.push(b.len());

        let mut encoded = vec![];
        for offset in offsets {
            let offset = u32::try_from(offset).map_err(|_| Error::Overflow {
                field: "pass offset",
                value: offset,
            })?;
            offset.serialize(&mut encoded);
        }
        b[offsets_at..offsets_at + encoded.len()].copy_from_slice(&encoded);
        Ok(b)
    }
}
