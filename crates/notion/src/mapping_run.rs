//! Apply stored mappings to one fetched page. Failures are collected
//! per field; one bad property never aborts the batch.

use crate::client::Page;
use fieldsync_protocol::{apply_transformation, FieldMapping, NotionProperty};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingIssue {
    pub field: String,
    pub error: String,
}

/// Outcome of running the mapping set against one page: the mapped
/// values keyed by website field id, plus whatever went wrong.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MappingRun {
    pub values: serde_json::Map<String, Value>,
    #[serde(default)]
    pub issues: Vec<MappingIssue>,
}

#[must_use]
pub fn apply_mappings(page: &Page, mappings: &[FieldMapping]) -> MappingRun {
    let mut run = MappingRun::default();

    for mapping in mappings {
        let Some((_, raw)) = page.property_by_field_id(&mapping.notion_field_id) else {
            run.issues.push(MappingIssue {
                field: mapping.website_field_id.clone(),
                error: format!(
                    "Property with id {} not found in Notion page",
                    mapping.notion_field_id
                ),
            });
            continue;
        };

        let property = NotionProperty::from_json(raw);
        let mut value = property.extract();
        if let Some(transformation) = &mapping.transformation {
            value = apply_transformation(transformation, value);
        }
        run.values
            .insert(mapping.website_field_id.clone(), value.to_json());
    }

    run
}
