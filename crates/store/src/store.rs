//! Session state container for fields and mappings. Mutations are
//! written through to the injected persister; a failed save degrades to
//! an in-memory session instead of failing the operation.

use crate::persist::{PersistedState, StatePersister};
use fieldsync_protocol::{
    validate_mapping, Field, FieldMapping, FieldSource, Transformation, ValidationResult,
};
use log::{error, warn};
use serde::{Deserialize, Serialize};

/// Partial mapping update. Absent members leave the mapping untouched;
/// `clear_transformation` unsets the transform.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MappingUpdate {
    #[serde(default)]
    pub notion_field_id: Option<String>,
    #[serde(default)]
    pub website_field_id: Option<String>,
    #[serde(default)]
    pub transformation: Option<Transformation>,
    #[serde(default)]
    pub clear_transformation: bool,
}

pub struct MappingStore {
    fields: Vec<Field>,
    mappings: Vec<FieldMapping>,
    persister: Box<dyn StatePersister>,
}

impl MappingStore {
    /// Open a session, restoring whatever the persister has. A load
    /// failure starts the session empty with a warning.
    #[must_use]
    pub fn open(persister: Box<dyn StatePersister>) -> Self {
        let restored = match persister.load() {
            Ok(state) => state,
            Err(err) => {
                warn!("Store restore failed, starting fresh: {err}");
                None
            }
        };
        let (fields, mappings) = restored
            .map(|state| (state.fields, state.mappings))
            .unwrap_or_default();
        Self {
            fields,
            mappings,
            persister,
        }
    }

    #[must_use]
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    #[must_use]
    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    #[must_use]
    pub fn field(&self, id: &str, source: FieldSource) -> Option<&Field> {
        self.fields
            .iter()
            .find(|f| f.id == id && f.source == source)
    }

    #[must_use]
    pub fn mapping(&self, id: &str) -> Option<&FieldMapping> {
        self.mappings.iter().find(|m| m.id == id)
    }

    #[must_use]
    pub fn mappings_referencing(&self, field_id: &str) -> Vec<&FieldMapping> {
        self.mappings
            .iter()
            .filter(|m| m.notion_field_id == field_id || m.website_field_id == field_id)
            .collect()
    }

    /// Append a field. Uniqueness is the caller's concern.
    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
        self.persist();
    }

    /// Remove a field and every mapping referencing it on either side.
    /// Returns false when the id is unknown.
    pub fn remove_field(&mut self, id: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| f.id != id);
        if self.fields.len() == before {
            return false;
        }
        self.mappings
            .retain(|m| m.notion_field_id != id && m.website_field_id != id);
        self.persist();
        true
    }

    /// Pair two fields. The validation result computed here is stored
    /// on the mapping; an incompatible pair is still created and the
    /// caller reads the verdict off the returned mapping.
    pub fn add_mapping(&mut self, notion_field_id: &str, website_field_id: &str) -> FieldMapping {
        let notion = self.field(notion_field_id, FieldSource::Notion);
        let website = self.field(website_field_id, FieldSource::Website);
        let validation = validate_mapping(notion, website);

        let mapping = FieldMapping {
            id: FieldMapping::pair_id(notion_field_id, website_field_id),
            notion_field_id: notion_field_id.to_string(),
            website_field_id: website_field_id.to_string(),
            transformation: None,
            validation: Some(validation),
        };
        self.mappings.push(mapping.clone());
        self.persist();
        mapping
    }

    /// Returns false when the id is unknown.
    pub fn remove_mapping(&mut self, id: &str) -> bool {
        let before = self.mappings.len();
        self.mappings.retain(|m| m.id != id);
        if self.mappings.len() == before {
            return false;
        }
        self.persist();
        true
    }

    /// Apply a partial update. No-op returning false when the id is
    /// unknown. Re-pairing refreshes the stored validation.
    pub fn update_mapping(&mut self, id: &str, update: MappingUpdate) -> bool {
        let Some(index) = self.mappings.iter().position(|m| m.id == id) else {
            return false;
        };

        {
            let mapping = &mut self.mappings[index];
            if let Some(notion_field_id) = update.notion_field_id {
                mapping.notion_field_id = notion_field_id;
            }
            if let Some(website_field_id) = update.website_field_id {
                mapping.website_field_id = website_field_id;
            }
            if update.clear_transformation {
                mapping.transformation = None;
            } else if let Some(transformation) = update.transformation {
                mapping.transformation = Some(transformation);
            }
        }

        let refreshed = {
            let mapping = &self.mappings[index];
            let notion = self.field(&mapping.notion_field_id, FieldSource::Notion);
            let website = self.field(&mapping.website_field_id, FieldSource::Website);
            validate_mapping(notion, website)
        };
        self.mappings[index].validation = Some(refreshed);
        self.persist();
        true
    }

    /// Recompute validation for a mapping from live field state. The
    /// snapshot stored on the mapping is what was true at creation
    /// time; this is what is true now.
    #[must_use]
    pub fn validation_for(&self, mapping_id: &str) -> Option<ValidationResult> {
        let mapping = self.mapping(mapping_id)?;
        let notion = self.field(&mapping.notion_field_id, FieldSource::Notion);
        let website = self.field(&mapping.website_field_id, FieldSource::Website);
        Some(validate_mapping(notion, website))
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.mappings.clear();
        self.persist();
    }

    fn persist(&self) {
        let state = PersistedState::new(self.fields.clone(), self.mappings.clone());
        if let Err(err) = self.persister.save(&state) {
            error!("Store write-through failed: {err}");
        }
    }
}
