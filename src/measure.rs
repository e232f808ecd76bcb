use crate::error::Error;
use crate::model::FontSpec;

/// Width and height of a measured glyph run, in millimetres.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextMetrics {
    pub width: f64,
    pub height: f64,
}

/// Text measurement seam. Layout only needs per-character advances; shaping
/// is left to whoever supplies the implementation.
pub trait TextMeasure: Send + Sync {
    /// Horizontal advance of `ch` set in `font`, in millimetres.
    fn advance(&self, ch: char, font: &FontSpec) -> f64;

    fn measure(&self, text: &str, font: &FontSpec) -> TextMetrics {
        TextMetrics {
            width: text.chars().map(|ch| self.advance(ch, font)).sum(),
            height: font.size,
        }
    }
}

/// Metric-free estimate: wide (CJK, fullwidth) characters take a full em,
/// everything else half an em.
#[derive(Clone, Copy, Debug)]
pub struct FixedAdvance {
    pub narrow: f64,
    pub wide: f64,
}

impl Default for FixedAdvance {
    fn default() -> Self {
        Self {
            narrow: 0.5,
            wide: 1.0,
        }
    }
}

impl TextMeasure for FixedAdvance {
    fn advance(&self, ch: char, font: &FontSpec) -> f64 {
        if ch.is_control() {
            0.0
        } else if is_wide(ch) {
            self.wide * font.size
        } else {
            self.narrow * font.size
        }
    }
}

/// East Asian wide characters: these may break a line anywhere.
pub fn is_wide(ch: char) -> bool {
    matches!(ch as u32,
        0x1100..=0x115F
        | 0x2E80..=0x303E
        | 0x3041..=0x33FF
        | 0x3400..=0x4DBF
        | 0x4E00..=0x9FFF
        | 0xA000..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6
        | 0x20000..=0x2FFFD
        | 0x30000..=0x3FFFD)
}

/// Advances from a TrueType/OpenType face. Characters the face does not map
/// fall back to [`FixedAdvance`].
pub struct TtfMeasure {
    data: Vec<u8>,
    face_index: u32,
    units_per_em: f64,
    fallback: FixedAdvance,
}

impl TtfMeasure {
    pub fn from_bytes(data: Vec<u8>, face_index: u32) -> Result<Self, Error> {
        let units_per_em = {
            let face = ttf_parser::Face::parse(&data, face_index)
                .map_err(|e| Error::Configuration(format!("font face cannot be parsed: {e}")))?;
            face.units_per_em() as f64
        };
        log::debug!(
            "Loaded font face {face_index} ({} bytes, {units_per_em} units/em)",
            data.len()
        );
        Ok(Self {
            data,
            face_index,
            units_per_em,
            fallback: FixedAdvance::default(),
        })
    }

    pub fn from_file(path: &std::path::Path, face_index: u32) -> Result<Self, Error> {
        let data = std::fs::read(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", e, path.display()),
            ))
        })?;
        Self::from_bytes(data, face_index)
    }

    fn face(&self) -> Option<ttf_parser::Face<'_>> {
        ttf_parser::Face::parse(&self.data, self.face_index).ok()
    }
}

impl TextMeasure for TtfMeasure {
    fn advance(&self, ch: char, font: &FontSpec) -> f64 {
        self.face()
            .and_then(|face| {
                let gid = face.glyph_index(ch)?;
                face.glyph_hor_advance(gid)
            })
            .map(|adv| adv as f64 / self.units_per_em * font.size)
            .unwrap_or_else(|| self.fallback.advance(ch, font))
    }

    fn measure(&self, text: &str, font: &FontSpec) -> TextMetrics {
        // Parse once per run rather than once per character.
        let Some(face) = self.face() else {
            return self.fallback.measure(text, font);
        };
        let width = text
            .chars()
            .map(|ch| {
                face.glyph_index(ch)
                    .and_then(|gid| face.glyph_hor_advance(gid))
                    .map(|adv| adv as f64 / self.units_per_em * font.size)
                    .unwrap_or_else(|| self.fallback.advance(ch, font))
            })
            .sum();
        TextMetrics {
            width,
            height: font.size,
        }
    }
}
