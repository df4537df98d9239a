//! The class taxonomy: a bidirectional `ClassId <-> name` mapping.

use std::collections::BTreeMap;

use thiserror::Error;

use super::ids::ClassId;

/// Raised when inserting a class would break uniqueness in either direction.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TaxonomyConflict {
    #[error("class id {id} is already named '{existing}'")]
    DuplicateId { id: ClassId, existing: String },

    #[error("class name '{name}' is already used by class id {existing}")]
    DuplicateName { name: String, existing: ClassId },
}

/// Class ids and names, each unique.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassTaxonomy {
    by_id: BTreeMap<ClassId, String>,
    by_name: BTreeMap<String, ClassId>,
}

impl ClassTaxonomy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a taxonomy from `(id, name)` pairs, failing on the first
    /// conflict.
    pub fn from_pairs<I, N>(pairs: I) -> Result<Self, TaxonomyConflict>
    where
        I: IntoIterator<Item = (ClassId, N)>,
        N: Into<String>,
    {
        let mut taxonomy = Self::new();
        for (id, name) in pairs {
            taxonomy.insert(id, name)?;
        }
        Ok(taxonomy)
    }

    pub fn insert(&mut self, id: ClassId, name: impl Into<String>) -> Result<(), TaxonomyConflict> {
        let name = name.into();
        if let Some(existing) = self.by_id.get(&id) {
            return Err(TaxonomyConflict::DuplicateId {
                id,
                existing: existing.clone(),
            });
        }
        if let Some(existing) = self.by_name.get(&name) {
            return Err(TaxonomyConflict::DuplicateName {
                name,
                existing: *existing,
            });
        }
        self.by_name.insert(name.clone(), id);
        self.by_id.insert(id, name);
        Ok(())
    }

    pub fn name(&self, id: ClassId) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    pub fn id(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, id: ClassId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Classes in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &str)> + '_ {
        self.by_id.iter().map(|(id, name)| (*id, name.as_str()))
    }

    pub fn ids(&self) -> impl Iterator<Item = ClassId> + '_ {
        self.by_id.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}
