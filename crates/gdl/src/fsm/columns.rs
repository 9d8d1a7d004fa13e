//! Machine classes
//!
//! Two glyphs are indistinguishable to a pass's machine if they belong to exactly the same
//!     pass-relevant classes.
//! Each group of indistinguishable glyphs becomes one column of the transition table.

use super::MachineClass;
use crate::rule::{Renderer, Symbol};
use font::{Font, Glyph};
use std::collections::HashMap;

/// Glyphs a symbol matches.
pub fn symbol_glyphs(symbol: Symbol, renderer: &Renderer, font: &dyn Font) -> Vec<Glyph> {
    match symbol {
        Symbol::Class(id) => renderer
            .class(id)
            .map(|c| c.glyphs.clone())
            .unwrap_or_default(),
        Symbol::Any => (0..font.glyph_count())
            .map(Glyph)
            .chain([font.line_break_glyph(), font.phantom_glyph()])
            .collect(),
        Symbol::LineBreak => vec![font.line_break_glyph()],
        Symbol::Empty => vec![],
    }
}

/// Result of partitioning the glyphs.
pub(super) struct Columns {
    pub classes: Vec<MachineClass>,
    /// For each relevant symbol, the columns whose glyphs it matches.
    pub symbol_columns: Vec<Vec<usize>>,
    /// Column of each glyph, indexed by glyph ID.
    pub glyph_columns: Vec<Option<usize>>,
}

/// Partitions the glyphs matched by the relevant symbols into columns.
///
/// Symbols are identified by their position in `symbols`.
pub(super) fn build(symbols: &[Symbol], renderer: &Renderer, font: &dyn Font) -> Columns {
    let size = font.max_glyph().0 as usize + 1;
    let mut source_sets: Vec<Vec<usize>> = vec![vec![]; size];
    for (id, symbol) in symbols.iter().enumerate() {
        for glyph in symbol_glyphs(*symbol, renderer, font) {
            let Some(set) = source_sets.get_mut(glyph.0 as usize) else {
                continue;
            };
            if set.last() != Some(&id) {
                set.push(id);
            }
        }
    }

    // Buckets are keyed by the sum of the source IDs. Different sets can share a key,
    // so candidates within a bucket are compared exactly.
    let mut buckets: HashMap<u32, Vec<usize>> = HashMap::new();
    let mut classes: Vec<MachineClass> = vec![];
    let mut glyph_columns = vec![None; size];
    for (g, set) in source_sets.into_iter().enumerate() {
        if set.is_empty() {
            continue;
        }
        let key: u32 = set.iter().map(|id| *id as u32).sum();
        let bucket = buckets.entry(key).or_default();
        let column = match bucket.iter().copied().find(|c| classes[*c].sources == set) {
            Some(c) => c,
            None => {
                classes.push(MachineClass {
                    sources: set,
                    glyphs: vec![],
                });
                bucket.push(classes.len() - 1);
                classes.len() - 1
            }
        };
        classes[column].glyphs.push(Glyph(g as u16));
        glyph_columns[g] = Some(column);
    }

    let mut symbol_columns = vec![vec![]; symbols.len()];
    for (column, class) in classes.iter().enumerate() {
        for id in &class.sources {
            symbol_columns[*id].push(column);
        }
    }
    Columns {
        classes,
        symbol_columns,
        glyph_columns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn overlapping_classes() {
        // Glyphs 1 and 2 are in both classes, 3 only in the second.
        let r = renderer(vec![vec![2, 1], vec![1, 2, 3], vec![9]], vec![]);
        let font = font(10);
        let columns = build(&[Symbol::Class(0), Symbol::Class(1)], &r, &font);
        assert_eq!(columns.classes.len(), 2);
        assert_eq!(columns.classes[0].sources, vec![0, 1]);
        assert_eq!(columns.classes[0].glyphs, vec![Glyph(1), Glyph(2)]);
        assert_eq!(columns.classes[1].glyphs, vec![Glyph(3)]);
        assert_eq!(columns.symbol_columns, vec![vec![0], vec![0, 1]]);
        assert_eq!(columns.glyph_columns[9], None);
    }

    #[test]
    fn colliding_keys_are_separated() {
        // Glyph 1 is in {0, 3}, glyph 2 in {1, 2}: both sets sum to 3.
        let r = renderer(vec![vec![1], vec![2], vec![2], vec![1]], vec![]);
        let symbols: Vec<Symbol> = (0..4).map(Symbol::Class).collect();
        let columns = build(&symbols, &r, &font(5));
        assert_eq!(columns.classes.len(), 2);
        assert_eq!(columns.glyph_columns[1], Some(0));
        assert_eq!(columns.glyph_columns[2], Some(1));
    }

    #[test]
    fn any_includes_sentinels() {
        let r = renderer(vec![vec![0]], vec![]);
        let font = font(3);
        let columns = build(&[Symbol::Any, Symbol::Class(0)], &r, &font);
        // {ANY, c0} for glyph 0 and {ANY} for glyphs 1, 2 and both sentinels.
        assert_eq!(columns.classes.len(), 2);
        assert_eq!(
            columns.classes[1].glyphs,
            vec![Glyph(1), Glyph(2), Glyph(3), Glyph(4)]
        );
    }
}
