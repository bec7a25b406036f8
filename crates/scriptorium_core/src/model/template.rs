//! Character sheet templates.
//!
//! Templates are opaque to the core apart from the minimal envelope check in
//! [`validate_template`]. Field semantics belong to the editor.

use crate::model::lore::LoreValidationError;
use serde_json::{json, Value};

/// Template served when a collection has none stored. Never persisted.
pub fn default_character_template() -> Value {
    json!({
        "version": 1,
        "fields": [
            {"id": "firstname", "type": "text", "label": "First name", "builtin": true, "required": true},
            {"id": "lastname", "type": "text", "label": "Last name", "builtin": true, "required": true},
            {"id": "age", "type": "number", "label": "Age", "builtin": true},
            {"id": "birthdate", "type": "date", "label": "Birth date", "builtin": true},
            {"id": "avatarUrl", "type": "text", "label": "Portrait (URL)", "builtin": true},
            {"id": "bio", "type": "richtext", "label": "Biography"}
        ]
    })
}

/// Checks the `{ fields: [{ id, type, label }, ...] }` envelope.
pub fn validate_template(template: &Value) -> Result<(), LoreValidationError> {
    let fields = template
        .as_object()
        .and_then(|object| object.get("fields"))
        .and_then(Value::as_array)
        .ok_or(LoreValidationError::InvalidTemplate(
            "expected an object with a `fields` array",
        ))?;

    for field in fields {
        let complete = field
            .as_object()
            .is_some_and(|field| ["id", "type", "label"].iter().all(|key| field.contains_key(*key)));
        if !complete {
            return Err(LoreValidationError::InvalidTemplate(
                "each field needs `id`, `type` and `label`",
            ));
        }
    }
    Ok(())
}
