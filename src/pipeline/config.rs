//! Typed views of the pipeline configuration files.
//!
//! `config.json` names the font families, regional subfamilies, styles, and
//! build orderings; `hinting-config.json` maps kanji inputs to hinting
//! parameter groups. Both are read through the oracle layer as raw JSON (so
//! the value fingerprint covers the whole file) and deserialized into these
//! structs inside producers.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{ForgeError, ForgeResult};

/// Root of `config.json`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    /// Release version, stamped into archive names.
    pub version: String,
    /// Family name to family traits.
    pub families: BTreeMap<String, Family>,
    /// Regional subfamily key (`sc`, `tc`, `j`, ...) to subfamily data.
    pub subfamilies: BTreeMap<String, Subfamily>,
    /// Style key to style data.
    pub styles: BTreeMap<String, Style>,
    /// Families in output order.
    pub family_order: Vec<String>,
    /// Subfamilies in output order.
    pub subfamily_order: Vec<String>,
    /// Styles in output order, upright and italic interlaced.
    pub style_order: Vec<String>,
    /// Maps region and style keys to CJK source font name parts.
    pub shs_source_map: ShsSourceMap,
}

/// Traits of one font family.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Family {
    /// Latin source group merged into this family.
    pub latin_group: String,
    /// Half-width CJK punctuation.
    #[serde(default)]
    pub is_mono: bool,
    /// Typesetting variant.
    #[serde(default)]
    pub is_type: bool,
    /// Force proportional-width forms.
    #[serde(default, rename = "isPWID")]
    pub is_pwid: bool,
    /// Terminal variant.
    #[serde(default)]
    pub is_term: bool,
}

/// One regional subfamily.
#[derive(Debug, Clone, Deserialize)]
pub struct Subfamily {
    /// Display name embedded into the font.
    pub name: String,
}

/// One style entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    /// For italic styles, the upright style whose width/AS intermediates
    /// they reuse.
    #[serde(default)]
    pub upright_style_map: Option<String>,
}

/// Region/style key translation for the CJK source fonts.
#[derive(Debug, Clone, Deserialize)]
pub struct ShsSourceMap {
    /// Region key to source font family part.
    pub region: BTreeMap<String, String>,
    /// Style key to source font style part.
    pub style: BTreeMap<String, String>,
}

impl BuildConfig {
    /// Looks up a family by name.
    pub fn family(&self, name: &str) -> ForgeResult<&Family> {
        self.families
            .get(name)
            .ok_or_else(|| ForgeError::value(format!("unknown family '{name}' in config.json")))
    }

    /// Looks up a subfamily by key.
    pub fn subfamily(&self, key: &str) -> ForgeResult<&Subfamily> {
        self.subfamilies
            .get(key)
            .ok_or_else(|| ForgeError::value(format!("unknown subfamily '{key}' in config.json")))
    }

    /// Maps a (possibly italic) style name to its upright counterpart.
    ///
    /// Hyphen-joined compound names are mapped token by token; tokens that
    /// are not styles (or have no upright mapping) pass through unchanged.
    #[must_use]
    pub fn upright_style_of(&self, name: &str) -> String {
        name.split('-')
            .map(|w| match self.styles.get(w).and_then(|s| s.upright_style_map.as_deref()) {
                Some(upright) => upright,
                None => w,
            })
            .collect::<Vec<_>>()
            .join("-")
    }

    /// The CJK source font file stem for a region/style pair.
    pub fn shs_source_name(&self, region: &str, style: &str) -> ForgeResult<String> {
        let r = self.shs_source_map.region.get(region).ok_or_else(|| {
            ForgeError::value(format!("region '{region}' missing from shsSourceMap"))
        })?;
        let s = self.shs_source_map.style.get(style).ok_or_else(|| {
            ForgeError::value(format!("style '{style}' missing from shsSourceMap"))
        })?;
        Ok(format!("{r}-{s}"))
    }
}

/// Root of `hinting-config.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct HintConfig {
    /// Instruction padding and VTT options passed to the hint applier.
    pub settings: HintSettings,
    /// Kanji inputs and the parameter group each belongs to.
    pub fonts: Vec<HintFont>,
}

/// Hint application settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HintSettings {
    /// CVT table padding, in entries.
    #[serde(default)]
    pub cvt_padding: Option<u32>,
    /// fpgm table padding, in entries.
    #[serde(default)]
    pub fpgm_padding: Option<u32>,
    /// Reserve room for the VTT shell.
    #[serde(default, rename = "use_VTTShell")]
    pub use_vtt_shell: bool,
}

/// One hinted kanji font.
#[derive(Debug, Clone, Deserialize)]
pub struct HintFont {
    /// Kanji font stem (`sc-regular`, ...).
    pub input: String,
    /// Hinting parameter group id.
    pub param: String,
}

impl HintConfig {
    /// The parameter group a kanji input belongs to.
    pub fn group_of(&self, input: &str) -> ForgeResult<&str> {
        self.fonts
            .iter()
            .find(|f| f.input == input)
            .map(|f| f.param.as_str())
            .ok_or_else(|| {
                ForgeError::value(format!(
                    "kanji font '{input}' missing from hinting-config.json"
                ))
            })
    }

    /// All parameter groups, first-appearance order, deduplicated.
    #[must_use]
    pub fn groups(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for font in &self.fonts {
            if !seen.contains(&font.param) {
                seen.push(font.param.clone());
            }
        }
        seen
    }

    /// The inputs belonging to one parameter group, in declaration order.
    #[must_use]
    pub fn inputs_of(&self, group: &str) -> Vec<&str> {
        self.fonts
            .iter()
            .filter(|f| f.param == group)
            .map(|f| f.input.as_str())
            .collect()
    }
}
