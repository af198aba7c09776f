use std::collections::HashMap;
use std::sync::Mutex;

use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use ttf_parser::{Face, GlyphId};

use crate::style::{FontSlant, FontSpec, FontWeight};

/// Vertical metrics of one text line at a given size, in canvas units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontExtents {
    pub ascent: f32,
    pub descent: f32,
}

impl FontExtents {
    pub fn height(self) -> f32 {
        self.ascent + self.descent
    }
}

/// The layout engine's only view of text measurement. Both methods are total:
/// a missing font falls back to synthetic metrics rather than failing, so a
/// headless host still produces a diagram with plausible proportions.
pub trait TextShaper {
    fn font_extents(&self, font: &FontSpec, size: f32) -> FontExtents;
    fn advance_width(&self, font: &FontSpec, size: f32, line: &str) -> f32;
}

const FALLBACK_ASCENT: f32 = 0.8;
const FALLBACK_DESCENT: f32 = 0.2;
const FALLBACK_ADVANCE: f32 = 0.56;

/// Shaper backed by the host's installed fonts. Construction is free; the
/// font database loads lazily on first query and parsed faces are cached per
/// family/slant/weight for the process lifetime.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemShaper;

static MEASURER: Lazy<Mutex<Measurer>> = Lazy::new(|| Mutex::new(Measurer::new()));

impl TextShaper for SystemShaper {
    fn font_extents(&self, font: &FontSpec, size: f32) -> FontExtents {
        if size <= 0.0 {
            return FontExtents {
                ascent: 0.0,
                descent: 0.0,
            };
        }
        let fallback = FontExtents {
            ascent: size * FALLBACK_ASCENT,
            descent: size * FALLBACK_DESCENT,
        };
        let Ok(mut guard) = MEASURER.lock() else {
            return fallback;
        };
        guard.extents(font, size).unwrap_or(fallback)
    }

    fn advance_width(&self, font: &FontSpec, size: f32, line: &str) -> f32 {
        if line.is_empty() || size <= 0.0 {
            return 0.0;
        }
        let fallback = line.chars().count() as f32 * size * FALLBACK_ADVANCE;
        let Ok(mut guard) = MEASURER.lock() else {
            return fallback;
        };
        let normalized = line.replace('\t', "    ");
        guard.advance(font, size, &normalized).unwrap_or(fallback)
    }
}

struct Measurer {
    db: Database,
    loaded_system_fonts: bool,
    cache: HashMap<String, Option<LoadedFace>>,
}

impl Measurer {
    fn new() -> Self {
        Self {
            db: Database::new(),
            loaded_system_fonts: false,
            cache: HashMap::new(),
        }
    }

    fn extents(&mut self, font: &FontSpec, size: f32) -> Option<FontExtents> {
        let face = self.face_for(font)?;
        let scale = size / face.units_per_em as f32;
        Some(FontExtents {
            ascent: face.ascender as f32 * scale,
            descent: -face.descender as f32 * scale,
        })
    }

    fn advance(&mut self, font: &FontSpec, size: f32, line: &str) -> Option<f32> {
        let fallback = size * FALLBACK_ADVANCE;
        let face = self.face_for(font)?;
        let scale = size / face.units_per_em as f32;

        if line.is_ascii() {
            let mut width = 0.0f32;
            for byte in line.as_bytes() {
                let advance = face.ascii_advances[*byte as usize];
                if advance == 0 {
                    width += fallback;
                } else {
                    width += advance as f32 * scale;
                }
            }
            return Some(width.max(0.0));
        }

        let mut width = 0.0f32;
        for ch in line.chars() {
            match face.glyph_advance(ch) {
                Some(advance) => width += advance as f32 * scale,
                None => width += fallback,
            }
        }
        Some(width.max(0.0))
    }

    fn face_for(&mut self, font: &FontSpec) -> Option<&mut LoadedFace> {
        let key = cache_key(font);
        if !self.cache.contains_key(&key) {
            let face = self.load_face(font);
            self.cache.insert(key.clone(), face);
        }
        self.cache.get_mut(&key).and_then(|face| face.as_mut())
    }

    fn load_face(&mut self, font: &FontSpec) -> Option<LoadedFace> {
        let mut names: Vec<String> = Vec::new();
        let mut order: Vec<FamilyToken> = Vec::new();
        for part in font.family.split(',') {
            let raw = part.trim().trim_matches('"').trim_matches('\'');
            if raw.is_empty() {
                continue;
            }
            match raw.to_ascii_lowercase().as_str() {
                "serif" => order.push(FamilyToken::Generic(Family::Serif)),
                "sans-serif" => order.push(FamilyToken::Generic(Family::SansSerif)),
                "monospace" => order.push(FamilyToken::Generic(Family::Monospace)),
                "cursive" => order.push(FamilyToken::Generic(Family::Cursive)),
                "fantasy" => order.push(FamilyToken::Generic(Family::Fantasy)),
                "system-ui" | "-apple-system" | "ui-sans-serif" => {
                    order.push(FamilyToken::Generic(Family::SansSerif))
                }
                "ui-monospace" => order.push(FamilyToken::Generic(Family::Monospace)),
                _ => {
                    let idx = names.len();
                    names.push(raw.to_string());
                    order.push(FamilyToken::Name(idx));
                }
            }
        }
        if order.is_empty() {
            order.push(FamilyToken::Generic(Family::SansSerif));
        }

        let families: Vec<Family<'_>> = order
            .into_iter()
            .map(|token| match token {
                FamilyToken::Generic(family) => family,
                FamilyToken::Name(idx) => Family::Name(names[idx].as_str()),
            })
            .collect();

        if !self.loaded_system_fonts {
            self.db.load_system_fonts();
            self.loaded_system_fonts = true;
        }

        let query = Query {
            families: &families,
            weight: match font.weight {
                FontWeight::Normal => Weight::NORMAL,
                FontWeight::Bold => Weight::BOLD,
            },
            stretch: Stretch::Normal,
            style: match font.slant {
                FontSlant::Normal => Style::Normal,
                FontSlant::Italic => Style::Italic,
                FontSlant::Oblique => Style::Oblique,
            },
        };
        let id = self.db.query(&query)?;
        let mut loaded: Option<LoadedFace> = None;
        self.db.with_face_data(id, |data, index| {
            loaded = LoadedFace::parse(data.to_vec(), index);
        });
        loaded
    }
}

#[derive(Clone, Copy)]
enum FamilyToken {
    Generic(Family<'static>),
    Name(usize),
}

fn cache_key(font: &FontSpec) -> String {
    let family = font.family.trim();
    let family = if family.is_empty() {
        "sans-serif"
    } else {
        family
    };
    format!("{family}|{:?}|{:?}", font.slant, font.weight)
}

struct LoadedFace {
    // Backs `face`; never touched directly after parse.
    _data: Vec<u8>,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    face: Face<'static>,
    ascii_advances: [u16; 128],
    glyph_cache: HashMap<char, Option<u16>>,
}

impl LoadedFace {
    fn parse(data: Vec<u8>, index: u32) -> Option<Self> {
        let parsed = Face::parse(&data, index).ok()?;
        // The face borrows `data`, which lives exactly as long as self.
        let face = unsafe { std::mem::transmute::<Face<'_>, Face<'static>>(parsed) };
        let units_per_em = face.units_per_em().max(1);
        let ascender = face.ascender();
        let descender = face.descender();
        let mut ascii_advances = [0u16; 128];
        for byte in 0u8..=127 {
            if let Some(glyph_id) = face.glyph_index(byte as char) {
                ascii_advances[byte as usize] = face.glyph_hor_advance(glyph_id).unwrap_or(0);
            }
        }
        Some(Self {
            _data: data,
            units_per_em,
            ascender,
            descender,
            face,
            ascii_advances,
            glyph_cache: HashMap::new(),
        })
    }

    fn glyph_advance(&mut self, ch: char) -> Option<u16> {
        let glyph = match self.glyph_cache.get(&ch) {
            Some(cached) => *cached,
            None => {
                let glyph = self.face.glyph_index(ch).map(|id| id.0);
                self.glyph_cache.insert(ch, glyph);
                glyph
            }
        }?;
        self.face.glyph_hor_advance(GlyphId(glyph))
    }
}

/// Deterministic shaper for tests and benches: every glyph is `0.6 * size`
/// wide, ascent and descent are fixed fractions of the size. Layout under
/// this shaper is reproducible on any host, fonts installed or not.
#[derive(Debug, Clone, Copy)]
pub struct FixedMetrics {
    pub char_width: f32,
    pub ascent: f32,
    pub descent: f32,
}

impl Default for FixedMetrics {
    fn default() -> Self {
        Self {
            char_width: 0.6,
            ascent: 0.8,
            descent: 0.2,
        }
    }
}

impl TextShaper for FixedMetrics {
    fn font_extents(&self, _font: &FontSpec, size: f32) -> FontExtents {
        FontExtents {
            ascent: self.ascent * size,
            descent: self.descent * size,
        }
    }

    fn advance_width(&self, _font: &FontSpec, size: f32, line: &str) -> f32 {
        line.chars().count() as f32 * self.char_width * size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_metrics_scale_linearly() {
        let shaper = FixedMetrics::default();
        let font = FontSpec::new("sans-serif");
        assert_eq!(shaper.advance_width(&font, 10.0, "abcd"), 24.0);
        assert_eq!(shaper.advance_width(&font, 20.0, "abcd"), 48.0);
        let extents = shaper.font_extents(&font, 10.0);
        assert_eq!(extents.height(), 10.0);
    }

    #[test]
    fn system_shaper_handles_empty_and_degenerate_input() {
        let shaper = SystemShaper;
        let font = FontSpec::new("sans-serif");
        assert_eq!(shaper.advance_width(&font, 12.0, ""), 0.0);
        assert_eq!(shaper.advance_width(&font, 0.0, "text"), 0.0);
        let extents = shaper.font_extents(&font, 0.0);
        assert_eq!(extents.height(), 0.0);
    }

    #[test]
    fn system_shaper_extents_are_positive() {
        let shaper = SystemShaper;
        let font = FontSpec::new("sans-serif");
        let extents = shaper.font_extents(&font, 10.0);
        assert!(extents.ascent > 0.0);
        assert!(extents.descent >= 0.0);
        assert!(extents.height() <= 20.0);
    }
}
