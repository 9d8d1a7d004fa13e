//! Glyph and metric abstractions
//!
//! The Graphite rule compiler never reads font files itself.
//! Everything it needs from the font goes through the [Font] trait:
//!     the size of the glyph ID space,
//!     per-glyph metrics,
//!     glyph attribute values,
//!     and the two reserved glyph IDs used for line breaks and phantom glyphs.

use std::collections::HashMap;

/// A glyph ID.
///
/// Glyph IDs are opaque 16-bit integers.
/// Some of them denote real glyphs in the font,
///     some are pseudo-glyphs standing in for code points the font doesn't map,
///     and two are reserved markers: see [Font::line_break_glyph] and [Font::phantom_glyph].
#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Glyph(pub u16);

impl From<u16> for Glyph {
    fn from(value: u16) -> Self {
        Glyph(value)
    }
}

impl std::fmt::Display for Glyph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Bounding box of a glyph, in font design units.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    pub x_min: i16,
    pub y_min: i16,
    pub x_max: i16,
    pub y_max: i16,
}

/// Metrics of one glyph, in font design units.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Metrics {
    pub advance_width: i16,
    #[cfg_attr(feature = "serde", serde(default))]
    pub advance_height: i16,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bbox: BoundingBox,
}

/// A glyph metric that rules can read.
///
/// The discriminant is the operand used by the `PushGlyphMetric` instruction.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum GlyphMetric {
    Lsb = 0,
    Rsb = 1,
    BbTop = 2,
    BbBottom = 3,
    BbLeft = 4,
    BbRight = 5,
    BbHeight = 6,
    BbWidth = 7,
    AdvWidth = 8,
    AdvHeight = 9,
    Ascent = 10,
    Descent = 11,
}

impl GlyphMetric {
    pub const ALL: [GlyphMetric; 12] = [
        GlyphMetric::Lsb,
        GlyphMetric::Rsb,
        GlyphMetric::BbTop,
        GlyphMetric::BbBottom,
        GlyphMetric::BbLeft,
        GlyphMetric::BbRight,
        GlyphMetric::BbHeight,
        GlyphMetric::BbWidth,
        GlyphMetric::AdvWidth,
        GlyphMetric::AdvHeight,
        GlyphMetric::Ascent,
        GlyphMetric::Descent,
    ];

    pub fn from_code(code: u8) -> Option<GlyphMetric> {
        GlyphMetric::ALL.get(code as usize).copied()
    }

    /// Name of the metric as written in rule programs.
    pub fn name(&self) -> &'static str {
        use GlyphMetric::*;
        match self {
            Lsb => "lsb",
            Rsb => "rsb",
            BbTop => "bb.top",
            BbBottom => "bb.bottom",
            BbLeft => "bb.left",
            BbRight => "bb.right",
            BbHeight => "bb.height",
            BbWidth => "bb.width",
            AdvWidth => "advancewidth",
            AdvHeight => "advanceheight",
            Ascent => "ascent",
            Descent => "descent",
        }
    }
}

/// Font accessor.
///
/// This is the only view of the font the compiler has.
pub trait Font {
    /// Number of glyph IDs in use, including pseudo-glyphs.
    ///
    /// Glyphs `0..glyph_count()` make up the `ANY` class along with the two reserved glyphs.
    fn glyph_count(&self) -> u16;

    /// Number of design units per em.
    ///
    /// Used to unscale measurements written with an explicit scale.
    fn units_per_em(&self) -> u16;

    /// Metrics of a glyph, or [None] if the glyph has no outline data (pseudo-glyphs for example).
    fn metrics(&self, glyph: Glyph) -> Option<Metrics>;

    /// The glyph that stands for a line break in rule contexts.
    fn line_break_glyph(&self) -> Glyph;

    /// The glyph that is fed to a pass's machine to stand in for missing pre-context.
    fn phantom_glyph(&self) -> Glyph;

    /// Font ascent, in design units.
    fn ascent(&self) -> i16 {
        0
    }

    /// Font descent, in design units.
    fn descent(&self) -> i16 {
        0
    }

    /// Value of a glyph attribute. Missing values are zero.
    fn glyph_attr(&self, _glyph: Glyph, _attr: u16) -> i32 {
        0
    }

    /// Value of a glyph metric. Glyphs without metrics read as zero.
    fn metric(&self, glyph: Glyph, metric: GlyphMetric) -> i32 {
        use GlyphMetric::*;
        match metric {
            Ascent => return self.ascent() as i32,
            Descent => return self.descent() as i32,
            _ => {}
        }
        let m = match self.metrics(glyph) {
            None => return 0,
            Some(m) => m,
        };
        let b = m.bbox;
        match metric {
            Lsb => b.x_min as i32,
            Rsb => m.advance_width as i32 - b.x_max as i32,
            BbTop => b.y_max as i32,
            BbBottom => b.y_min as i32,
            BbLeft => b.x_min as i32,
            BbRight => b.x_max as i32,
            BbHeight => b.y_max as i32 - b.y_min as i32,
            BbWidth => b.x_max as i32 - b.x_min as i32,
            AdvWidth => m.advance_width as i32,
            AdvHeight => m.advance_height as i32,
            Ascent | Descent => unreachable!("handled above"),
        }
    }

    /// Largest glyph ID that can appear anywhere, sentinels included.
    fn max_glyph(&self) -> Glyph {
        let last_real = self.glyph_count().saturating_sub(1);
        Glyph(
            last_real
                .max(self.line_break_glyph().0)
                .max(self.phantom_glyph().0),
        )
    }
}

/// A glyph attribute value in a [MemoryFont].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlyphAttrValue {
    pub glyph: Glyph,
    pub attr: u16,
    pub value: i32,
}

/// A font held entirely in memory.
///
/// This is what the command line tool reads from JSON, and what tests build by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryFont {
    pub glyph_count: u16,
    #[cfg_attr(feature = "serde", serde(default = "default_units_per_em"))]
    pub units_per_em: u16,
    #[cfg_attr(feature = "serde", serde(default))]
    pub ascent: i16,
    #[cfg_attr(feature = "serde", serde(default))]
    pub descent: i16,
    /// Metrics indexed by glyph ID. Glyphs past the end have no metrics.
    #[cfg_attr(feature = "serde", serde(default))]
    pub metrics: Vec<Metrics>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub glyph_attrs: Vec<GlyphAttrValue>,
    /// Defaults to `glyph_count`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub line_break: Option<Glyph>,
    /// Defaults to `glyph_count + 1`.
    #[cfg_attr(feature = "serde", serde(default))]
    pub phantom: Option<Glyph>,
    #[cfg_attr(feature = "serde", serde(skip))]
    attr_index: HashMap<(Glyph, u16), i32>,
}

#[cfg(feature = "serde")]
fn default_units_per_em() -> u16 {
    1000
}

impl MemoryFont {
    /// Returns a font with the given number of glyphs and no metrics.
    pub fn new(glyph_count: u16) -> Self {
        MemoryFont {
            glyph_count,
            units_per_em: 1000,
            ascent: 0,
            descent: 0,
            metrics: vec![],
            glyph_attrs: vec![],
            line_break: None,
            phantom: None,
            attr_index: Default::default(),
        }
    }

    /// Sets a glyph attribute.
    pub fn set_glyph_attr(&mut self, glyph: Glyph, attr: u16, value: i32) {
        self.glyph_attrs.push(GlyphAttrValue { glyph, attr, value });
        self.attr_index.insert((glyph, attr), value);
    }

    /// Rebuilds the glyph attribute lookup table.
    ///
    /// This needs to be called after deserializing or after modifying `glyph_attrs` directly.
    pub fn reindex(&mut self) {
        self.attr_index = self
            .glyph_attrs
            .iter()
            .map(|v| ((v.glyph, v.attr), v.value))
            .collect();
    }
}

impl Font for MemoryFont {
    fn glyph_count(&self) -> u16 {
        self.glyph_count
    }

    fn units_per_em(&self) -> u16 {
        self.units_per_em
    }

    fn metrics(&self, glyph: Glyph) -> Option<Metrics> {
        self.metrics.get(glyph.0 as usize).copied()
    }

    fn line_break_glyph(&self) -> Glyph {
        self.line_break.unwrap_or(Glyph(self.glyph_count))
    }

    fn phantom_glyph(&self) -> Glyph {
        self.phantom
            .unwrap_or(Glyph(self.glyph_count.saturating_add(1)))
    }

    fn ascent(&self) -> i16 {
        self.ascent
    }

    fn descent(&self) -> i16 {
        self.descent
    }

    fn glyph_attr(&self, glyph: Glyph, attr: u16) -> i32 {
        self.attr_index.get(&(glyph, attr)).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sentinels_follow_real_glyphs() {
        let font = MemoryFont::new(10);
        assert_eq!(font.line_break_glyph(), Glyph(10));
        assert_eq!(font.phantom_glyph(), Glyph(11));
        assert_eq!(font.max_glyph(), Glyph(11));
    }

    #[test]
    fn explicit_sentinels() {
        let mut font = MemoryFont::new(10);
        font.line_break = Some(Glyph(0xFFFE));
        font.phantom = Some(Glyph(0xFFFD));
        assert_eq!(font.max_glyph(), Glyph(0xFFFE));
    }

    #[test]
    fn metrics_derived_from_bbox() {
        let mut font = MemoryFont::new(2);
        font.metrics = vec![
            Metrics::default(),
            Metrics {
                advance_width: 600,
                advance_height: 0,
                bbox: BoundingBox {
                    x_min: 50,
                    y_min: -10,
                    x_max: 500,
                    y_max: 700,
                },
            },
        ];
        let g = Glyph(1);
        assert_eq!(font.metric(g, GlyphMetric::Lsb), 50);
        assert_eq!(font.metric(g, GlyphMetric::Rsb), 100);
        assert_eq!(font.metric(g, GlyphMetric::BbHeight), 710);
        assert_eq!(font.metric(g, GlyphMetric::BbWidth), 450);
        assert_eq!(font.metric(g, GlyphMetric::AdvWidth), 600);
        assert_eq!(font.metric(Glyph(7), GlyphMetric::AdvWidth), 0);
    }

    #[test]
    fn glyph_attrs() {
        let mut font = MemoryFont::new(4);
        font.set_glyph_attr(Glyph(2), 7, -30);
        assert_eq!(font.glyph_attr(Glyph(2), 7), -30);
        assert_eq!(font.glyph_attr(Glyph(2), 8), 0);
    }

    #[test]
    fn metric_codes_round_trip() {
        for metric in GlyphMetric::ALL {
            assert_eq!(GlyphMetric::from_code(metric as u8), Some(metric));
        }
        assert_eq!(GlyphMetric::from_code(12), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn deserialize_and_reindex() {
        let mut font: MemoryFont = serde_json::from_str(
            r#"{"glyph_count": 3, "glyph_attrs": [{"glyph": 1, "attr": 2, "value": 5}]}"#,
        )
        .unwrap();
        font.reindex();
        assert_eq!(font.units_per_em, 1000);
        assert_eq!(font.glyph_attr(Glyph(1), 2), 5);
    }
}
