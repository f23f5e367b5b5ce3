use serde_json::{json, Value};

use litrag_core::filter::{FieldSpec, FieldType};

pub const COMPARATORS: [&str; 8] = ["eq", "ne", "gt", "gte", "lt", "lte", "contain", "like"];

/// JSON schema the model's answer must conform to.
pub fn output_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "filters": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "field": { "type": "string" },
                        "comparator": { "type": "string", "enum": COMPARATORS },
                        "value": { "type": ["string", "number"] }
                    },
                    "required": ["field", "comparator", "value"]
                }
            }
        },
        "required": ["filters"]
    })
}

fn type_label(t: FieldType) -> &'static str {
    match t {
        FieldType::Text => "string (free text)",
        FieldType::Keyword => "string (exact value)",
        FieldType::Integer => "integer",
        FieldType::Float => "float",
        FieldType::Year => "integer (calendar year)",
    }
}

pub fn build_prompt(question: &str, document_description: &str, fields: &[FieldSpec]) -> String {
    let attributes = fields
        .iter()
        .map(|f| format!("- {} ({}): {}", f.name, type_label(f.field_type), f.description))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Your goal is to extract metadata filters from a user question.\n\
         The documents being searched are: {document_description}.\n\
         \n\
         Available attributes:\n{attributes}\n\
         \n\
         Answer with a JSON object {{\"filters\": [...]}} where each filter is \
         {{\"field\": <attribute name>, \"comparator\": <one of {comparators}>, \"value\": <value>}}.\n\
         Only use the attributes listed above. Use only conditions the question states explicitly; \
         if there are none, answer {{\"filters\": []}}. Do not restate the topic of the question as a filter.\n\
         \n\
         Question: {question}\n",
        comparators = COMPARATORS.join(", "),
    )
}
