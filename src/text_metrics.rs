use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;
use std::sync::Mutex;
use ttf_parser::Face;

/// Width of an unmapped glyph relative to the font size.
const FALLBACK_ADVANCE: f32 = 0.56;
const LINE_HEIGHT: f32 = 1.2;

pub trait TextMeasure {
    /// Advance width of a single-line label.
    fn text_width(&self, text: &str, font_size: f32) -> f32;

    /// Height of one text line.
    fn line_height(&self, font_size: f32) -> f32 {
        font_size * LINE_HEIGHT
    }
}

/// Measures with the first installed face matching a CSS font-family list.
#[derive(Debug, Clone)]
pub struct FontMetrics {
    pub font_family: String,
}

impl FontMetrics {
    pub fn new(font_family: impl Into<String>) -> Self {
        Self {
            font_family: font_family.into(),
        }
    }
}

impl TextMeasure for FontMetrics {
    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        measure_text_width(text, font_size, &self.font_family)
            .unwrap_or_else(|| text.chars().count() as f32 * font_size * FALLBACK_ADVANCE)
    }
}

/// Every character has the same advance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedMetrics {
    /// Character advance as a fraction of the font size.
    pub char_width: f32,
    pub line_height: f32,
}

impl Default for FixedMetrics {
    fn default() -> Self {
        Self {
            char_width: 0.5,
            line_height: LINE_HEIGHT,
        }
    }
}

impl TextMeasure for FixedMetrics {
    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        text.chars().count() as f32 * font_size * self.char_width
    }

    fn line_height(&self, font_size: f32) -> f32 {
        font_size * self.line_height
    }
}

static FONT_CACHE: Lazy<Mutex<FontCache>> = Lazy::new(|| Mutex::new(FontCache::default()));

/// Measures `text` with the system font resolved from `font_family`.
/// Returns `None` when no usable face is installed.
pub fn measure_text_width(text: &str, font_size: f32, font_family: &str) -> Option<f32> {
    if text.is_empty() || font_size <= 0.0 {
        return Some(0.0);
    }
    let mut cache = FONT_CACHE.lock().ok()?;
    let face = cache.face(font_family)?;
    Some(face.width(text, font_size))
}

#[derive(Default)]
struct FontCache {
    db: Option<Database>,
    faces: HashMap<String, Option<LoadedFace>>,
}

impl FontCache {
    fn face(&mut self, font_family: &str) -> Option<&LoadedFace> {
        let key = family_key(font_family);
        if !self.faces.contains_key(&key) {
            let face = LoadedFace::from_disk_cache(&key).or_else(|| self.query(&key));
            self.faces.insert(key.clone(), face);
        }
        self.faces.get(&key)?.as_ref()
    }

    fn query(&mut self, key: &str) -> Option<LoadedFace> {
        let names: Vec<&str> = key
            .split(',')
            .map(|part| part.trim().trim_matches(|c| c == '"' || c == '\''))
            .filter(|part| !part.is_empty())
            .collect();
        let mut families: Vec<Family<'_>> = names.iter().map(|name| css_family(name)).collect();
        if families.is_empty() {
            families.push(Family::SansSerif);
        }

        let db = self.db.get_or_insert_with(|| {
            let mut db = Database::new();
            db.load_system_fonts();
            db
        });
        let id = db.query(&Query {
            families: &families,
            weight: Weight::NORMAL,
            stretch: Stretch::Normal,
            style: Style::Normal,
        })?;
        let (bytes, index) = db.with_face_data(id, |data, index| (data.to_vec(), index))?;
        let face = LoadedFace::parse(bytes, index)?;
        face.store(key);
        Some(face)
    }
}

fn css_family(name: &str) -> Family<'_> {
    match name.to_ascii_lowercase().as_str() {
        "serif" => Family::Serif,
        "monospace" | "ui-monospace" => Family::Monospace,
        "cursive" => Family::Cursive,
        "fantasy" => Family::Fantasy,
        "sans-serif" | "system-ui" | "-apple-system" | "ui-sans-serif" => Family::SansSerif,
        _ => Family::Name(name),
    }
}

fn family_key(font_family: &str) -> String {
    let trimmed = font_family.trim();
    if trimmed.is_empty() {
        "sans-serif".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Font bytes plus the ASCII advance table, which covers nearly every job
/// id. Other characters re-parse the face on demand.
struct LoadedFace {
    data: Vec<u8>,
    index: u32,
    units_per_em: f32,
    ascii: [u16; 128],
}

impl LoadedFace {
    fn parse(data: Vec<u8>, index: u32) -> Option<Self> {
        let face = Face::parse(&data, index).ok()?;
        let mut ascii = [0u16; 128];
        for (code, slot) in ascii.iter_mut().enumerate() {
            let advance = char::from_u32(code as u32)
                .and_then(|ch| face.glyph_index(ch))
                .and_then(|glyph| face.glyph_hor_advance(glyph));
            *slot = advance.unwrap_or(0);
        }
        let units_per_em = f32::from(face.units_per_em().max(1));
        Some(Self {
            data,
            index,
            units_per_em,
            ascii,
        })
    }

    fn width(&self, text: &str, font_size: f32) -> f32 {
        let scale = font_size / self.units_per_em;
        let fallback = font_size * FALLBACK_ADVANCE;
        let face = if text.is_ascii() {
            None
        } else {
            Face::parse(&self.data, self.index).ok()
        };

        text.chars()
            .filter(|&ch| ch != '\n')
            .map(|ch| {
                let ch = if ch == '\t' { ' ' } else { ch };
                let advance = if ch.is_ascii() {
                    Some(self.ascii[ch as usize]).filter(|&adv| adv > 0)
                } else {
                    face.as_ref()
                        .and_then(|face| face.glyph_index(ch).and_then(|g| face.glyph_hor_advance(g)))
                };
                advance.map_or(fallback, |adv| f32::from(adv) * scale)
            })
            .sum()
    }

    fn from_disk_cache(key: &str) -> Option<Self> {
        let (font_path, meta_path) = cache_paths(key)?;
        let index: u32 = fs::read_to_string(meta_path).ok()?.trim().parse().ok()?;
        Self::parse(fs::read(font_path).ok()?, index)
    }

    fn store(&self, key: &str) {
        let Some((font_path, meta_path)) = cache_paths(key) else {
            return;
        };
        if font_path.exists() {
            return;
        }
        if let Some(dir) = font_path.parent()
            && fs::create_dir_all(dir).is_ok()
        {
            let _ = fs::write(&font_path, &self.data);
            let _ = fs::write(&meta_path, self.index.to_string());
        }
    }
}

fn cache_paths(key: &str) -> Option<(PathBuf, PathBuf)> {
    let base = std::env::var_os("XDG_CACHE_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))?;
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let stem = format!("{:x}", hasher.finish());
    let dir = base.join("flowlayer").join("fonts");
    Some((dir.join(format!("{stem}.font")), dir.join(format!("{stem}.meta"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_metrics_scale_with_font_size() {
        let metrics = FixedMetrics::default();
        assert_eq!(metrics.text_width("abcd", 10.0), 20.0);
        assert_eq!(metrics.text_width("", 10.0), 0.0);
        assert_eq!(metrics.line_height(10.0), 12.0);
    }

    #[test]
    fn font_metrics_never_fail() {
        let metrics = FontMetrics::new("no-such-font-family, sans-serif");
        let short = metrics.text_width("job", 12.0);
        let long = metrics.text_width("job-with-a-longer-name", 12.0);
        assert!(short > 0.0);
        assert!(long > short);
    }

    #[test]
    fn generic_families_map_to_fontdb() {
        assert_eq!(css_family("Monospace"), Family::Monospace);
        assert_eq!(css_family("system-ui"), Family::SansSerif);
        assert_eq!(css_family("Inter"), Family::Name("Inter"));
    }
}
