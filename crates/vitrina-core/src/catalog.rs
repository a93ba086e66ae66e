//! Site content the assistant may point visitors to.
//!
//! The CMS exports its sections and the single tutorial video as plain JSON;
//! this is only a read-only view of that export.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRecord {
    pub slug: String,
    pub title: String,
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub src: String,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteCatalog {
    #[serde(default)]
    pub sections: Vec<SectionRecord>,
    #[serde(default)]
    pub video: Option<VideoRecord>,
}

impl SiteCatalog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Failed to read catalog {:?}: {}", path, e))?;
        let catalog: SiteCatalog = serde_json::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse catalog {:?}: {}", path, e))?;
        Ok(catalog)
    }

    pub fn find_section(&self, slug: &str) -> Option<&SectionRecord> {
        self.sections.iter().find(|s| s.slug == slug)
    }

    pub fn slugs(&self) -> Vec<&str> {
        self.sections.iter().map(|s| s.slug.as_str()).collect()
    }
}
