//! Static model catalog

use serde_json::{json, Value};

/// Catalog entries as `(id, created)`
pub const MODEL_CATALOG: &[(&str, i64)] = &[
    ("gpt-4", 1_677_610_602),
    ("gpt-4-turbo", 1_692_904_200),
    ("gpt-3.5-turbo", 1_677_610_602),
    ("gpt-3.5-turbo-16k", 1_685_474_247),
];

const DEFAULT_CREATED: i64 = 1_677_610_602;

pub fn model_object(id: &str, created: i64) -> Value {
    json!({
        "id": id,
        "object": "model",
        "created": created,
        "owned_by": "openai",
        "permission": [],
        "root": id,
        "parent": null
    })
}

pub(crate) fn catalog() -> Value {
    let data: Vec<Value> = MODEL_CATALOG
        .iter()
        .map(|(id, created)| model_object(id, *created))
        .collect();
    json!({"object": "list", "data": data})
}

/// Any id is answered; unknown ids are echoed back as a model object.
pub(crate) fn lookup(id: &str) -> Value {
    let created = MODEL_CATALOG
        .iter()
        .find(|(known, _)| *known == id)
        .map(|(_, created)| *created)
        .unwrap_or(DEFAULT_CREATED);
    model_object(id, created)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_lists_every_model() {
        let catalog = catalog();
        assert_eq!(catalog["object"], "list");
        assert_eq!(catalog["data"].as_array().map(Vec::len), Some(MODEL_CATALOG.len()));
        assert_eq!(catalog["data"][1]["id"], "gpt-4-turbo");
    }

    #[test]
    fn test_lookup_echoes_unknown_ids() {
        let model = lookup("qwen-7b");
        assert_eq!(model["id"], "qwen-7b");
        assert_eq!(model["root"], "qwen-7b");
        assert_eq!(model["created"], DEFAULT_CREATED);
    }
}
