//! Read-only region registry keyed by name

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use super::region::Region;
use crate::{AutomationError, Result};

/// Stable index of a region inside its catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegionId(usize);

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default = "default_width")]
    reference_width: u32,
    #[serde(default = "default_height")]
    reference_height: u32,
    #[serde(default)]
    regions: Vec<Region>,
}

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

/// Arena of immutable regions plus a name index
///
/// Built once at startup; every region is validated on insertion so a bad
/// rectangle or threshold is rejected before any round runs.
#[derive(Debug, Clone)]
pub struct RegionCatalog {
    reference: (u32, u32),
    regions: Vec<Region>,
    index: HashMap<String, RegionId>,
}

impl RegionCatalog {
    /// Build a validated catalog
    pub fn new(reference: (u32, u32), regions: Vec<Region>) -> Result<Self> {
        if reference.0 == 0 || reference.1 == 0 {
            return Err(AutomationError::configuration(
                "catalog reference resolution must be non-zero",
            ));
        }

        let mut index = HashMap::with_capacity(regions.len());
        for (i, region) in regions.iter().enumerate() {
            region.validate(reference)?;
            if index.insert(region.name.clone(), RegionId(i)).is_some() {
                return Err(AutomationError::configuration(format!(
                    "duplicate region name '{}'",
                    region.name
                )));
            }
        }

        Ok(Self {
            reference,
            regions,
            index,
        })
    }

    /// Empty catalog at the given reference resolution
    pub fn empty(reference: (u32, u32)) -> Self {
        Self {
            reference,
            regions: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Load a catalog document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(&text)?;
        log::info!(
            "Loaded {} regions from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(text)?;
        Self::new((file.reference_width, file.reference_height), file.regions)
    }

    pub fn reference_size(&self) -> (u32, u32) {
        self.reference
    }

    pub fn get(&self, name: &str) -> Option<&Region> {
        self.index.get(name).map(|id| &self.regions[id.0])
    }

    /// Look up a region, failing with `UnknownRegion`
    pub fn require(&self, name: &str) -> Result<&Region> {
        self.get(name)
            .ok_or_else(|| AutomationError::UnknownRegion(name.to_string()))
    }

    pub fn id_of(&self, name: &str) -> Option<RegionId> {
        self.index.get(name).copied()
    }

    pub fn by_id(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(id.0)
    }

    /// Regions tagged with a status-variant label
    pub fn with_status<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Region> + 'a {
        self.regions
            .iter()
            .filter(move |r| r.status.as_deref() == Some(label))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
