//! Engine configuration

use crate::attachment::GroupKind;
use crate::error::Result;
use crate::geometry::{PageBounds, Size};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// US Letter, the standard page of every generated letter and label
pub const LETTER: Size = Size::new(612.0, 792.0);
/// Largest page an image may get (11x17 in)
pub const TABLOID: Size = Size::new(792.0, 1224.0);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BinderConfig {
    pub letterhead: Letterhead,
    pub page: PageConfig,
    pub deposit: DepositTiers,
    pub sections: SectionTitles,
    pub reference: ReferenceConfig,
    /// false routes every request through the fallback assembler
    pub primary_merge: bool,
}

impl Default for BinderConfig {
    fn default() -> Self {
        Self {
            letterhead: Letterhead::default(),
            page: PageConfig::default(),
            deposit: DepositTiers::default(),
            sections: SectionTitles::default(),
            reference: ReferenceConfig::default(),
            primary_merge: true,
        }
    }
}

impl BinderConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Letterhead {
    pub organization: String,
    pub department: String,
    /// signs the letter
    pub committee: String,
}

impl Default for Letterhead {
    fn default() -> Self {
        Self {
            organization: "Lakeside Community Association".to_string(),
            department: "Architectural Review Committee".to_string(),
            committee: "Architectural Review Committee".to_string(),
        }
    }
}

/// Page dimensions in points
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PageConfig {
    pub size: Size,
    pub margin: f64,
    pub image_padding: f64,
    pub image_max: Size,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            size: LETTER,
            margin: 72.0,
            image_padding: 40.0,
            image_max: TABLOID,
        }
    }
}

impl PageConfig {
    pub fn image_bounds(&self) -> PageBounds {
        PageBounds {
            padding: self.image_padding,
            max: self.image_max,
            min: self.size,
        }
    }
}

/// Construction deposit, in whole dollars
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepositTiers {
    pub new_construction: u32,
    pub standard: u32,
    /// case-insensitive substrings of the project type selecting the higher tier
    pub new_construction_keywords: Vec<String>,
}

impl Default for DepositTiers {
    fn default() -> Self {
        Self {
            new_construction: 2000,
            standard: 500,
            new_construction_keywords: vec!["new home".to_string(), "new construction".to_string()],
        }
    }
}

impl DepositTiers {
    pub fn amount_for(&self, project_type: &str) -> u32 {
        let pt = project_type.to_lowercase();
        if self
            .new_construction_keywords
            .iter()
            .any(|k| !k.is_empty() && pt.contains(&k.to_lowercase()))
        {
            self.new_construction
        } else {
            self.standard
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionTitles {
    pub site_conditions: String,
    pub submitted_files: String,
}

impl Default for SectionTitles {
    fn default() -> Self {
        Self {
            site_conditions: "Current Site Conditions".to_string(),
            submitted_files: "Submitted Plans".to_string(),
        }
    }
}

impl SectionTitles {
    pub fn title(&self, kind: GroupKind) -> &str {
        match kind {
            GroupKind::SiteConditions => &self.site_conditions,
            GroupKind::SubmittedFiles => &self.submitted_files,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReferenceConfig {
    pub title: String,
    /// file stem under `<base_url>/assets/`
    pub asset_name: String,
    /// base64 PDF; preferred over the network
    pub embedded_base64: Option<String>,
    pub base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            title: "Architectural Guidelines".to_string(),
            asset_name: "architectural-guidelines".to_string(),
            embedded_base64: None,
            base_url: None,
            timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_tier_follows_project_type() {
        let tiers = DepositTiers::default();
        assert_eq!(tiers.amount_for("New Home"), 2000);
        assert_eq!(tiers.amount_for("NEW CONSTRUCTION - garage"), 2000);
        assert_eq!(tiers.amount_for("Fence"), 500);
        assert_eq!(tiers.amount_for(""), 500);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: BinderConfig =
            serde_json::from_str(r#"{ "letterhead": { "organization": "Pine Ridge HOA" }, "primary_merge": false }"#)
                .unwrap();
        assert_eq!(cfg.letterhead.organization, "Pine Ridge HOA");
        assert_eq!(cfg.letterhead.committee, "Architectural Review Committee");
        assert_eq!(cfg.page.size, LETTER);
        assert!(!cfg.primary_merge);
    }
}
