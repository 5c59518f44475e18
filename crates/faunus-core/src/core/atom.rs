use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

fn default_mass() -> f64 {
    1.0
}

/// Per-type parameters for one atomic species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomKind {
    pub name: String,
    /// Molecular weight (g/mol), used for mass-center calculations.
    #[serde(default = "default_mass")]
    pub mass: f64,
    /// Hard/soft-sphere radius (Å).
    #[serde(default)]
    pub radius: f64,
    /// Valency (e).
    #[serde(default)]
    pub charge: f64,
    /// Chemical activity (mol/l); nonzero marks a grand-canonical species.
    #[serde(default)]
    pub activity: f64,
    /// Acid dissociation constant for titratable sites.
    #[serde(default)]
    pub pka: Option<f64>,
    /// Default translational displacement parameter (Å).
    #[serde(default)]
    pub dp: f64,
}

impl AtomKind {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            mass: 1.0,
            radius: 0.0,
            charge: 0.0,
            activity: 0.0,
            pka: None,
            dp: 0.0,
        }
    }
}

/// Immutable table of atomic species, indexed by dense type id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AtomTable {
    kinds: Vec<AtomKind>,
    #[serde(skip)]
    by_name: HashMap<String, usize>,
}

static GLOBAL: OnceLock<AtomTable> = OnceLock::new();

impl AtomTable {
    pub fn new(kinds: Vec<AtomKind>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(kinds.len());
        for (id, kind) in kinds.iter().enumerate() {
            if by_name.insert(kind.name.clone(), id).is_some() {
                return Err(CoreError::Config(format!(
                    "duplicate atom type '{}'",
                    kind.name
                )));
            }
        }
        Ok(Self { kinds, by_name })
    }

    pub fn get(&self, id: usize) -> Option<&AtomKind> {
        self.kinds.get(id)
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn kinds(&self) -> &[AtomKind] {
        &self.kinds
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Install the process-wide table. Idempotent for identical content;
    /// re-initialization with different species is an error.
    pub fn initialize(kinds: Vec<AtomKind>) -> Result<&'static AtomTable> {
        let table = Self::new(kinds)?;
        let installed = GLOBAL.get_or_init(|| table.clone());
        if installed.kinds != table.kinds {
            return Err(CoreError::AtomTableInitialized);
        }
        Ok(installed)
    }

    pub fn global() -> Result<&'static AtomTable> {
        GLOBAL.get().ok_or(CoreError::AtomTableMissing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_name_and_id_agree() {
        let table = AtomTable::new(vec![AtomKind::new("Na"), AtomKind::new("Cl")]).unwrap();
        let na = table.find("Na").unwrap();
        let cl = table.find("Cl").unwrap();
        assert_eq!(table.get(na).unwrap().name, "Na");
        assert_eq!(table.get(cl).unwrap().name, "Cl");
        assert!(table.find("K").is_none());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let result = AtomTable::new(vec![AtomKind::new("Na"), AtomKind::new("Na")]);
        assert!(matches!(result, Err(CoreError::Config(_))));
    }
}
