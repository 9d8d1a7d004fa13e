use super::serialize::{PASS_HEADER_LEN, SILF_HEADER_LEN};
use super::*;
use crate::xlb::Bound;

/// Deserializes a Silf table.
pub fn deserialize(b: &[u8]) -> Result<SilfTable, Error> {
    let mut r = Reader::new(b, 0, "table header");
    let version = Version(r.read()?);
    let num_passes: u8 = r.read()?;
    let first_pass = [r.read()?, r.read()?, r.read()?];
    let [flags, pre, post, _reserved]: [u8; 4] = [r.read()?, r.read()?, r.read()?, r.read()?];
    debug_assert_eq!(r.pos, SILF_HEADER_LEN);
    r.field = "table offsets";
    let offsets: Vec<u32> = r.read_n(num_passes as usize + 2)?;
    let block = |i: usize, field| {
        let (start, end) = (offsets[i] as usize, offsets[i + 1] as usize);
        if start > end {
            return Err(Error::Inconsistent { field, value: end });
        }
        b.get(start..end).ok_or(Error::Truncated { field, offset: end })
    };
    let classes = deserialize_classes(block(0, "class map")?)?;
    let mut passes = vec![];
    for i in 1..=num_passes as usize {
        passes.push(deserialize_pass(block(i, "pass")?)?);
    }
    Ok(SilfTable {
        version,
        first_pass,
        xlb: XlbContext {
            pre: Bound::from_byte(pre),
            post: Bound::from_byte(post),
            line_break: flags & SilfTable::FLAG_LINE_BREAK != 0,
        },
        classes,
        passes,
    })
}

/// Deserializes a pass subtable.
pub fn deserialize_pass(b: &[u8]) -> Result<PassTable, Error> {
    let mut r = Reader::new(b, 0, "pass header");
    let [flags, max_rule_loop, max_rule_context, max_backup]: [u8; 4] =
        [r.read()?, r.read()?, r.read()?, r.read()?];
    let num_rules: u16 = r.read()?;
    let fsm_offset: u16 = r.read()?;
    let [pass_constraint_at, constraints_at, actions_at, _debug]: [u32; 4] =
        [r.read()?, r.read()?, r.read()?, r.read()?];
    debug_assert_eq!(r.pos, PASS_HEADER_LEN);

    let mut r = Reader::new(b, fsm_offset as usize, "state machine");
    let [num_states, num_transitional, num_success, num_columns]: [u16; 4] =
        [r.read()?, r.read()?, r.read()?, r.read()?];
    if num_transitional > num_states || num_success > num_states {
        return Err(Error::Inconsistent {
            field: "state counts",
            value: num_states as usize,
        });
    }
    let num_ranges: u16 = r.read()?;
    let _search_header: [u16; 3] = [r.read()?, r.read()?, r.read()?];
    r.field = "glyph ranges";
    let ranges = r.read_n(num_ranges as usize)?;

    r.field = "rule map";
    let rule_offsets: Vec<u16> = r.read_n(num_success as usize + 1)?;
    let total = rule_offsets.last().copied().unwrap_or(0) as usize;
    let entries: Vec<u16> = r.read_n(total)?;
    let rule_map = split(&entries, &rule_offsets, "rule map")?;

    r.field = "pre-context";
    let min_pre: u8 = r.read()?;
    let max_pre: u8 = r.read()?;
    if min_pre > max_pre {
        return Err(Error::Inconsistent {
            field: "pre-context",
            value: min_pre as usize,
        });
    }
    let start_states = r.read_n((max_pre - min_pre) as usize + 1)?;
    r.field = "rules";
    let sort_keys = r.read_n(num_rules as usize)?;
    let pre_context = r.read_n(num_rules as usize)?;
    let collision_threshold: u8 = r.read()?;
    let pass_constraint_len: u16 = r.read()?;
    r.field = "code offsets";
    let constraint_offsets: Vec<u16> = r.read_n(num_rules as usize + 1)?;
    let action_offsets: Vec<u16> = r.read_n(num_rules as usize + 1)?;
    r.field = "transitions";
    let mut transitions = vec![];
    for _ in 0..num_transitional {
        transitions.push(r.read_n(num_columns as usize)?);
    }

    let code = |at: u32, len: usize, field| {
        let at = at as usize;
        b.get(at..at + len)
            .ok_or(Error::Truncated {
                field,
                offset: at + len,
            })
    };
    let code_len = |offsets: &[u16]| offsets.last().copied().unwrap_or(0) as usize;
    let pass_constraint = code(
        pass_constraint_at,
        pass_constraint_len as usize,
        "pass constraint",
    )?
    .to_vec();
    let constraints = split(
        code(constraints_at, code_len(&constraint_offsets), "constraint code")?,
        &constraint_offsets,
        "constraint code",
    )?;
    let actions = split(
        code(actions_at, code_len(&action_offsets), "action code")?,
        &action_offsets,
        "action code",
    )?;

    Ok(PassTable {
        flags,
        max_rule_loop,
        max_rule_context,
        max_backup,
        num_states,
        num_transitional,
        num_success,
        num_columns,
        ranges,
        rule_map,
        min_pre,
        max_pre,
        start_states,
        sort_keys,
        pre_context,
        collision_threshold,
        transitions,
        pass_constraint,
        constraints,
        actions,
    })
}

/// Deserializes the replacement class map.
pub fn deserialize_classes(b: &[u8]) -> Result<ClassMap, Error> {
    let mut r = Reader::new(b, 0, "class map header");
    let num_classes: u16 = r.read()?;
    let num_linear: u16 = r.read()?;
    if num_linear > num_classes {
        return Err(Error::Inconsistent {
            field: "linear classes",
            value: num_linear as usize,
        });
    }
    r.field = "class offsets";
    let offsets: Vec<u32> = r.read_n(num_classes as usize + 1)?;
    let mut classes = ClassMap::default();
    for (i, window) in offsets.windows(2).enumerate() {
        let (start, end) = (window[0] as usize, window[1] as usize);
        if start > end {
            return Err(Error::Inconsistent {
                field: "class offsets",
                value: end,
            });
        }
        let mut r = Reader::new(b, start, "class");
        if i < num_linear as usize {
            classes.linear.push(r.read_n((end - start) / 2)?);
        } else {
            let n: u16 = r.read()?;
            let _search_header: [u16; 3] = [r.read()?, r.read()?, r.read()?];
            classes.indexed.push(r.read_n(n as usize)?);
        }
    }
    Ok(classes)
}

/// Splits `entries` at running offsets.
fn split<T: Clone>(entries: &[T], offsets: &[u16], field: &'static str) -> Result<Vec<Vec<T>>, Error> {
    offsets
        .windows(2)
        .map(|window| {
            let (start, end) = (window[0] as usize, window[1] as usize);
            if start > end {
                return Err(Error::Inconsistent { field, value: end });
            }
            entries
                .get(start..end)
                .map(<[T]>::to_vec)
                .ok_or(Error::Truncated { field, offset: end })
        })
        .collect()
}

/// Implementations of this trait consume a fixed number of bytes when deserializing.
trait Deserializable: Sized {
    const NUM_BYTES: usize;

    /// Decodes a value from exactly [Deserializable::NUM_BYTES] bytes.
    fn deserialize(b: &[u8]) -> Self;
}

impl Deserializable for u8 {
    const NUM_BYTES: usize = 1;
    fn deserialize(b: &[u8]) -> Self {
        b[0]
    }
}

impl Deserializable for u16 {
    const NUM_BYTES: usize = 2;
    fn deserialize(b: &[u8]) -> Self {
        u16::from_be_bytes([b[0], b[1]])
    }
}

impl Deserializable for u32 {
    const NUM_BYTES: usize = 4;
    fn deserialize(b: &[u8]) -> Self {
        u32::from_be_bytes([b[0], b[1], b[2], b[3]])
    }
}

impl Deserializable for Glyph {
    const NUM_BYTES: usize = 2;
    fn deserialize(b: &[u8]) -> Self {
        Glyph(u16::deserialize(b))
    }
}

impl Deserializable for GlyphRange {
    const NUM_BYTES: usize = 6;
    fn deserialize(b: &[u8]) -> Self {
        GlyphRange {
            first: Glyph::deserialize(b),
            last: Glyph::deserialize(&b[2..]),
            column: u16::deserialize(&b[4..]),
        }
    }
}

impl Deserializable for (Glyph, u16) {
    const NUM_BYTES: usize = 4;
    fn deserialize(b: &[u8]) -> Self {
        (Glyph::deserialize(b), u16::deserialize(&b[2..]))
    }
}

/// Bounds-checked cursor over a byte slice.
struct Reader<'a> {
    b: &'a [u8],
    pos: usize,
    /// Name of the field being read, for errors.
    field: &'static str,
}

impl<'a> Reader<'a> {
    fn new(b: &'a [u8], pos: usize, field: &'static str) -> Reader<'a> {
        Reader { b, pos, field }
    }

    fn read<T: Deserializable>(&mut self) -> Result<T, Error> {
        let end = self.pos + T::NUM_BYTES;
        let chunk = self.b.get(self.pos..end).ok_or(Error::Truncated {
            field: self.field,
            offset: end,
        })?;
        self.pos = end;
        Ok(T::deserialize(chunk))
    }

    fn read_n<T: Deserializable>(&mut self, n: usize) -> Result<Vec<T>, Error> {
        (0..n).map(|_| self.read()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{Output, Renderer, TableKind};
    use crate::testing::*;
    use crate::{compile, Options};

    fn compiled() -> Compiled {
        // A B > X; A C > Y; in one pass, then a positioning pass.
        let mut r: Renderer = renderer(
            vec![vec![1, 2], vec![3], vec![4, 5, 6], vec![7, 8], vec![9]],
            vec![
                table(
                    TableKind::Substitution,
                    vec![vec![
                        rule(vec![subst(0, Output::Class(3)), context(1)]),
                        rule(vec![subst(0, Output::Class(4)), context(2)]),
                    ]],
                ),
                table(
                    TableKind::Positioning,
                    vec![vec![rule(vec![context(1), with_settings(2, vec![attach_to(0)])])]],
                ),
            ],
        );
        compile(&mut r, &font(12), &Options::default()).unwrap()
    }

    #[test]
    fn pass_round_trip() {
        let compiled = compiled();
        for pass in &compiled.passes {
            let want = PassTable::new(pass).unwrap();
            let got = deserialize_pass(&serialize_pass(pass).unwrap()).unwrap();
            similar_asserts::assert_eq!(got, want);
        }
    }

    #[test]
    fn pass_header() {
        let compiled = compiled();
        let b = serialize_pass(&compiled.passes[0]).unwrap();
        // flags, max rule loop, max rule context, max backup
        assert_eq!(b[0..4], [0, 5, 2, 0]);
        // rules, fsm offset
        assert_eq!(b[4..8], [0, 2, 0, PASS_HEADER_LEN as u8]);
        // states, transitional, success, columns
        assert_eq!(b[24..32], [0, 4, 0, 2, 0, 2, 0, 3]);
    }

    #[test]
    fn table_round_trip() {
        let compiled = compiled();
        let want = SilfTable::new(&compiled).unwrap();
        let got = deserialize(&serialize(&compiled).unwrap()).unwrap();
        similar_asserts::assert_eq!(got, want);
        assert_eq!(got.first_pass, [0, 1, 1]);
        assert_eq!(got.version, Version::V2_0);
    }

    #[test]
    fn class_map_round_trip() {
        let classes = ClassMap {
            linear: vec![vec![Glyph(7), Glyph(3)], vec![Glyph(9)]],
            indexed: vec![vec![(Glyph(1), 1), (Glyph(2), 0)]],
        };
        let b = classes.serialize().unwrap();
        assert_eq!(b[0..4], [0, 3, 0, 2]);
        assert_eq!(deserialize_classes(&b).unwrap(), classes);
    }

    macro_rules! deserialize_error_tests {
        ( $( ($name: ident, $input: expr, $want: expr $(,)? ), )+ ) => {
            $(
                #[test]
                fn $name() {
                    let input: Vec<u8> = $input;
                    assert_eq!(deserialize_pass(&input), Err($want));
                }
            )+
        };
    }

    deserialize_error_tests!(
        (
            empty_pass,
            vec![],
            Error::Truncated {
                field: "pass header",
                offset: 1
            },
        ),
        (
            fsm_past_end,
            {
                let mut b = vec![0; 24];
                b[7] = 24;
                b
            },
            Error::Truncated {
                field: "state machine",
                offset: 26
            },
        ),
        (
            too_many_transitional_states,
            {
                let mut b = vec![0; 40];
                b[7] = 24;
                b[25] = 1;
                b[27] = 2;
                b
            },
            Error::Inconsistent {
                field: "state counts",
                value: 1
            },
        ),
    );

    #[test]
    fn truncated_code() {
        let compiled = compiled();
        let b = serialize_pass(&compiled.passes[0]).unwrap();
        assert_eq!(
            deserialize_pass(&b[..b.len() - 1]),
            Err(Error::Truncated {
                field: "action code",
                offset: b.len()
            })
        );
    }
}
