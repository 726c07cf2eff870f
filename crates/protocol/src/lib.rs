pub mod compatibility;
pub mod envelope;
pub mod fields;
pub mod notion_value;
pub mod transform;

pub use compatibility::{
    compatible_targets, conversion_suggestion, validate_mapping, validate_pair,
};
pub use envelope::Envelope;
pub use fields::{
    Field, FieldMapping, FieldSource, FieldType, Transformation, ValidationDetails,
    ValidationResult,
};
pub use notion_value::{ExtractedValue, NotionProperty};
pub use transform::apply_transformation;
