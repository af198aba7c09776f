use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Dash pattern used by every dashed stroke.
pub const DASH_PATTERN: [f32; 2] = [6.0, 4.0];

pub type Color = [f32; 3];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontSlant {
    #[default]
    Normal,
    Italic,
    Oblique,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    #[default]
    Normal,
    Bold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    pub family: String,
    #[serde(default)]
    pub slant: FontSlant,
    #[serde(default)]
    pub weight: FontWeight,
}

impl FontSpec {
    pub fn new(family: &str) -> Self {
        Self {
            family: family.to_string(),
            slant: FontSlant::Normal,
            weight: FontWeight::Normal,
        }
    }
}

/// One configured style value. Untagged so overlay files can write plain
/// numbers, 3- and 4-element arrays, strings and font objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StyleValue {
    Dim(f32),
    Pair([f32; 2]),
    Color([f32; 3]),
    Quad([f32; 4]),
    Keyword(String),
    Font(FontSpec),
}

/// A flat mapping from dotted selector to typed value, immutable for the
/// duration of one compile. Lookups cascade: for components
/// `[c1, c2, .., ck, prop]` the candidates are `c1.c2..ck.prop`,
/// `c1..ck-1.prop`, .. down to the bare `prop` — the second-to-last component
/// is dropped first. Candidate keys are built from structured component
/// lists, never by re-splitting strings, so a component containing a dot
/// cannot shift the cascade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleSheet {
    rules: HashMap<String, StyleValue>,
}

impl StyleSheet {
    pub fn insert(&mut self, selector: &str, value: StyleValue) {
        self.rules.insert(selector.to_string(), value);
    }

    /// Overlay rules win over existing ones.
    pub fn merge(&mut self, overlay: StyleSheet) {
        self.rules.extend(overlay.rules);
    }

    pub fn resolve(&self, prefix: &[&str], prop: &str) -> Result<&StyleValue> {
        for keep in (0..=prefix.len()).rev() {
            let key = join_selector(&prefix[..keep], prop);
            if let Some(value) = self.rules.get(&key) {
                return Ok(value);
            }
        }
        Err(Error::StyleNotFound(join_selector(prefix, prop)))
    }

    pub fn dim(&self, prefix: &[&str], prop: &str) -> Result<f32> {
        match self.resolve(prefix, prop)? {
            StyleValue::Dim(value) => Ok(*value),
            other => Err(type_error(prefix, prop, "a dimension", other)),
        }
    }

    pub fn pair(&self, prefix: &[&str], prop: &str) -> Result<[f32; 2]> {
        match self.resolve(prefix, prop)? {
            StyleValue::Pair(value) => Ok(*value),
            other => Err(type_error(prefix, prop, "a pair", other)),
        }
    }

    pub fn color(&self, prefix: &[&str], prop: &str) -> Result<Color> {
        match self.resolve(prefix, prop)? {
            StyleValue::Color(value) => Ok(*value),
            other => Err(type_error(prefix, prop, "a color", other)),
        }
    }

    /// 4-tuples are `(top, right, bottom, left)`.
    pub fn quad(&self, prefix: &[&str], prop: &str) -> Result<[f32; 4]> {
        match self.resolve(prefix, prop)? {
            StyleValue::Quad(value) => Ok(*value),
            other => Err(type_error(prefix, prop, "a 4-tuple", other)),
        }
    }

    pub fn keyword(&self, prefix: &[&str], prop: &str) -> Result<&str> {
        match self.resolve(prefix, prop)? {
            StyleValue::Keyword(value) => Ok(value),
            other => Err(type_error(prefix, prop, "a keyword", other)),
        }
    }

    pub fn font(&self, prefix: &[&str], prop: &str) -> Result<&FontSpec> {
        match self.resolve(prefix, prop)? {
            StyleValue::Font(value) => Ok(value),
            other => Err(type_error(prefix, prop, "a font", other)),
        }
    }
}

pub fn join_selector(components: &[&str], prop: &str) -> String {
    let mut key = String::new();
    for component in components {
        key.push_str(component);
        key.push('.');
    }
    key.push_str(prop);
    key
}

fn type_error(prefix: &[&str], prop: &str, expected: &str, got: &StyleValue) -> Error {
    Error::InvalidOperand(format!(
        "style {:?} is not {expected} (found {got:?})",
        join_selector(prefix, prop)
    ))
}

/// The built-in sheet. The engine hardcodes none of these: every property it
/// queries must resolve here (or in an overlay), down to the bare fallback.
pub fn default_stylesheet() -> StyleSheet {
    let mut sheet = StyleSheet::default();
    let rules: &[(&str, StyleValue)] = &[
        ("font-face", StyleValue::Font(FontSpec::new("sans-serif"))),
        ("font-size", StyleValue::Dim(10.0)),
        ("line-spacing", StyleValue::Dim(1.0)),
        ("text-color", StyleValue::Color([0.0, 0.0, 0.0])),
        ("background-color", StyleValue::Color([1.0, 1.0, 1.0])),
        ("line-width", StyleValue::Dim(1.0)),
        ("line-type", StyleValue::Keyword("regular".into())),
        ("wait-height", StyleValue::Dim(23.0)),
        ("color", StyleValue::Color([0.0, 0.0, 0.0])),
        ("activity-box-width", StyleValue::Dim(10.0)),
        ("page.padding", StyleValue::Quad([0.0, 0.0, 5.0, 0.0])),
        ("entity.padding", StyleValue::Quad([5.0, 10.0, 23.0, 10.0])),
        ("entity.margin", StyleValue::Quad([5.0, 10.0, 5.0, 10.0])),
        ("lifeline.line-type", StyleValue::Keyword("dash".into())),
        ("block.padding", StyleValue::Quad([5.0, 10.0, 5.0, 10.0])),
        ("block.margin", StyleValue::Quad([5.0, 10.0, 5.0, 10.0])),
        ("block.separator-style", StyleValue::Keyword("dash".into())),
        ("note.padding", StyleValue::Quad([10.0, 10.0, 10.0, 10.0])),
        ("note.margin", StyleValue::Quad([10.0, 10.0, 10.0, 10.0])),
        ("note.background-color", StyleValue::Color([0.9, 0.9, 0.5])),
        ("message.padding", StyleValue::Quad([5.0, 0.0, 5.0, 0.0])),
        ("message.margin", StyleValue::Quad([0.0, 5.0, 0.0, 5.0])),
        ("message.arrowhead-size", StyleValue::Pair([12.0, 12.0])),
        (
            "message.arrowhead-fill-color",
            StyleValue::Color([0.0, 0.0, 0.0]),
        ),
        (
            "message.call.arrowhead-type",
            StyleValue::Keyword("filled".into()),
        ),
        (
            "message.send.arrowhead-type",
            StyleValue::Keyword("line".into()),
        ),
        (
            "message.respond.arrowhead-type",
            StyleValue::Keyword("line".into()),
        ),
        (
            "message.respond.line-type",
            StyleValue::Keyword("dash".into()),
        ),
        ("destroy.cross-size", StyleValue::Dim(14.0)),
        ("destroy.margin", StyleValue::Quad([4.0, 0.0, 4.0, 0.0])),
    ];
    for (selector, value) in rules {
        sheet.insert(selector, value.clone());
    }
    sheet
}

/// Default sheet plus an optional JSON5 overlay file mapping dotted selectors
/// to values.
pub fn load_stylesheet(path: Option<&Path>) -> anyhow::Result<StyleSheet> {
    let mut sheet = default_stylesheet();
    let Some(path) = path else {
        return Ok(sheet);
    };
    let contents = std::fs::read_to_string(path)?;
    let overlay: StyleSheet = json5::from_str(&contents)?;
    sheet.merge(overlay);
    Ok(sheet)
}
