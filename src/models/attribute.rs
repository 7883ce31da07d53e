//! Per-category attribute schema and the values listings carry
use std::borrow::Cow;
use std::collections::HashMap;

use validator::{ValidationError, ValidationErrors};

use models::validation_rules::contains_forbidden_content;
use types::{AttributeId, AttributeOptionId, AttributeValueId, CategoryId, ListingId};

varchar_enum! {
    #[serde(rename_all = "snake_case")]
    pub enum InputType {
        Text => "text",
        Number => "number",
        Select => "select",
    }
}

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct Attribute {
    pub id: AttributeId,
    pub category_id: CategoryId,
    pub name: String,
    pub input_type: InputType,
    /// display hint only
    pub ui_type: String,
    pub is_required: bool,
    pub position: i32,
}

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct AttributeOption {
    pub id: AttributeOptionId,
    pub attribute_id: AttributeId,
    pub value: String,
    pub position: i32,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct AttributeWithOptions {
    pub attribute: Attribute,
    pub options: Vec<AttributeOption>,
}

#[derive(Debug, Serialize, Deserialize, Queryable, Clone, PartialEq)]
pub struct AttributeValue {
    pub id: AttributeValueId,
    pub listing_id: ListingId,
    pub attribute_id: AttributeId,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewAttributeValue {
    pub attribute_id: AttributeId,
    pub value: String,
}

fn attribute_error(message: String) -> ValidationError {
    ValidationError {
        code: Cow::from("attribute"),
        message: Some(Cow::from(message)),
        params: HashMap::new(),
    }
}

/// Checks values against the category schema: numbers must parse, select
/// values are an option id or free "other" text, free text must be clean.
pub fn validate_attribute_values(schema: &[AttributeWithOptions], values: &[NewAttributeValue]) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();

    for value in values {
        let attr = match schema.iter().find(|a| a.attribute.id == value.attribute_id) {
            Some(attr) => attr,
            None => {
                errors.add(
                    "attributes",
                    attribute_error(format!("Attribute {} does not belong to the category", value.attribute_id)),
                );
                continue;
            }
        };

        let raw = value.value.trim();
        match attr.attribute.input_type {
            InputType::Number => {
                if raw.parse::<f64>().is_err() {
                    errors.add(
                        "attributes",
                        attribute_error(format!("{} must be a number", attr.attribute.name)),
                    );
                }
            }
            InputType::Select => {
                let is_option = raw
                    .parse::<i32>()
                    .ok()
                    .map(|id| attr.options.iter().any(|o| o.id == AttributeOptionId(id)))
                    .unwrap_or(false);
                if !is_option && contains_forbidden_content(raw) {
                    errors.add(
                        "attributes",
                        attribute_error(format!("{} contains links or HTML", attr.attribute.name)),
                    );
                }
            }
            InputType::Text => {
                if contains_forbidden_content(raw) {
                    errors.add(
                        "attributes",
                        attribute_error(format!("{} contains links or HTML", attr.attribute.name)),
                    );
                }
            }
        }
    }

    for attr in schema.iter().filter(|a| a.attribute.is_required) {
        let present = values
            .iter()
            .any(|v| v.attribute_id == attr.attribute.id && !v.value.trim().is_empty());
        if !present {
            errors.add("attributes", attribute_error(format!("{} is required", attr.attribute.name)));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
