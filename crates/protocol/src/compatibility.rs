//! Static type-compatibility table and the pure validators built on it.

use crate::fields::{Field, FieldType, ValidationDetails, ValidationResult};

const NO_SELECTION_ERROR: &str = "Fields not selected";
const GENERIC_SUGGESTION: &str =
    "No automatic conversion available, add a transformation or pick a compatible field";

/// Destination field types a source type can be mapped to directly.
///
/// The table is neither reflexive nor symmetric; membership is checked
/// from source to target only.
#[must_use]
pub fn compatible_targets(source: FieldType) -> &'static [FieldType] {
    use FieldType::*;
    match source {
        Title => &[Text],
        RichText => &[Text, Url],
        Text => &[Text, Select, MultiSelect],
        Number => &[Number],
        Boolean => &[Boolean],
        Checkbox => &[Boolean],
        Date => &[Date],
        Select => &[Text, Select],
        MultiSelect => &[Text, MultiSelect],
        Status => &[Text, Select],
        Url => &[Url, Text, Image],
        Email => &[Text, Email],
        Image => &[Image, File],
        File => &[File, Image],
    }
}

/// Curated hint for an incompatible pair, when one exists.
#[must_use]
pub fn conversion_suggestion(source: FieldType, target: FieldType) -> Option<&'static str> {
    use FieldType::*;
    match (source, target) {
        (Title, MultiSelect) | (Title, Select) => {
            Some("Split the title into words with a split transformation")
        }
        (RichText, MultiSelect) => Some("Split the text into words or paragraphs"),
        (Select, MultiSelect) => Some("Wrap the single value in a list"),
        (Number, Text) => Some("Convert the number to text with a to_text transformation"),
        (Date, Text) => Some("Format the date as readable text"),
        (Checkbox, Text) => Some("Convert the checkbox to \"Yes\"/\"No\" text"),
        (File, Text) => Some("Extract file names or URLs as text"),
        (File, Url) => Some("Extract the first file URL with a first_only transformation"),
        (RichText, Select) => Some("Pick a single value from the text"),
        (MultiSelect, Select) => Some("Keep the first value with a first_only transformation"),
        _ => None,
    }
}

/// Pure compatibility check for a pair of field types.
///
/// Valid iff `target` appears in the table entry for `source`. On
/// failure the error names both types and `details` carries the
/// compatible target list plus a suggestion.
#[must_use]
pub fn validate_pair(source: FieldType, target: FieldType) -> ValidationResult {
    let targets = compatible_targets(source);
    if targets.contains(&target) {
        return ValidationResult::valid();
    }

    let suggestion = conversion_suggestion(source, target).unwrap_or(GENERIC_SUGGESTION);
    ValidationResult::invalid(format!(
        "Field type '{source}' is not compatible with '{target}'"
    ))
    .with_details(ValidationDetails {
        compatible_types: targets.to_vec(),
        suggestion: Some(suggestion.to_string()),
    })
}

/// Validate a proposed mapping between two optional field selections.
///
/// Either side missing short-circuits to a distinct "not selected"
/// result; the compatibility table is never consulted in that case.
#[must_use]
pub fn validate_mapping(notion: Option<&Field>, website: Option<&Field>) -> ValidationResult {
    let (Some(notion), Some(website)) = (notion, website) else {
        return ValidationResult::invalid(NO_SELECTION_ERROR).with_details(ValidationDetails {
            compatible_types: Vec::new(),
            suggestion: Some("Select a field on both sides before mapping".to_string()),
        });
    };
    validate_pair(notion.field_type, website.field_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldSource;
    use pretty_assertions::assert_eq;

    fn field(id: &str, field_type: FieldType, source: FieldSource) -> Field {
        Field {
            id: id.to_string(),
            name: id.to_string(),
            field_type,
            required: false,
            source,
        }
    }

    #[test]
    fn title_maps_to_text() {
        let out = validate_pair(FieldType::Title, FieldType::Text);
        assert_eq!(out, ValidationResult::valid());
    }

    #[test]
    fn number_to_image_is_invalid_and_names_both_types() {
        let out = validate_pair(FieldType::Number, FieldType::Image);
        assert!(!out.is_valid);
        let error = out.error.expect("error message");
        assert!(error.contains("number"), "missing source type: {error}");
        assert!(error.contains("image"), "missing target type: {error}");
        let details = out.details.expect("details");
        assert_eq!(details.compatible_types, vec![FieldType::Number]);
        assert!(details.suggestion.is_some());
    }

    #[test]
    fn validity_matches_table_membership_for_all_pairs() {
        use FieldType::*;
        let all = [
            Title,
            RichText,
            Text,
            Number,
            Boolean,
            Checkbox,
            Date,
            Select,
            MultiSelect,
            Status,
            Url,
            Email,
            Image,
            File,
        ];
        for source in all {
            for target in all {
                let expected = compatible_targets(source).contains(&target);
                let out = validate_pair(source, target);
                assert_eq!(
                    out.is_valid, expected,
                    "table disagreement for {source} -> {target}"
                );
            }
        }
    }

    #[test]
    fn table_is_not_reflexive() {
        assert!(!validate_pair(FieldType::Title, FieldType::Title).is_valid);
    }

    #[test]
    fn incompatible_pair_reports_curated_suggestion() {
        let out = validate_pair(FieldType::Checkbox, FieldType::Text);
        let suggestion = out.details.and_then(|d| d.suggestion).expect("suggestion");
        assert!(suggestion.contains("Yes"), "unexpected hint: {suggestion}");
    }

    #[test]
    fn missing_fields_short_circuit() {
        let notion = field("n1", FieldType::Title, FieldSource::Notion);
        for (left, right) in [
            (None, None),
            (Some(&notion), None),
            (None, Some(&notion)),
        ] {
            let out = validate_mapping(left, right);
            assert!(!out.is_valid);
            assert_eq!(out.error.as_deref(), Some("Fields not selected"));
        }
    }

    #[test]
    fn selected_fields_defer_to_pair_check() {
        let notion = field("n1", FieldType::Title, FieldSource::Notion);
        let website = field("w1", FieldType::Text, FieldSource::Website);
        assert!(validate_mapping(Some(&notion), Some(&website)).is_valid);
    }
}
