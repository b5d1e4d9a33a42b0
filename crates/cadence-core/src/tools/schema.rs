use cadence_types::{Error, Result};
use serde_json::{Map, Value, json};

/// Semantic types a tool field can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    fn example(&self) -> Value {
        match self {
            FieldType::String => json!("example"),
            FieldType::Integer => json!(1),
            FieldType::Number => json!(1.5),
            FieldType::Boolean => json!(true),
            FieldType::Array => json!([]),
            FieldType::Object => json!({}),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub description: String,
}

/// Typed schema record for one tool: field name → semantic type + required
/// flag. One validator coerces inputs; handlers receive already-typed
/// values.
#[derive(Debug, Clone, Default)]
pub struct ToolSchema {
    fields: Vec<FieldSpec>,
}

impl ToolSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(mut self, name: &str, field_type: FieldType, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            field_type,
            required: true,
            description: description.to_string(),
        });
        self
    }

    pub fn optional(mut self, name: &str, field_type: FieldType, description: &str) -> Self {
        self.fields.push(FieldSpec {
            name: name.to_string(),
            field_type,
            required: false,
            description: description.to_string(),
        });
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Coerce and validate params against the schema. Every offending field
    /// is reported, not just the first. Unknown fields pass through.
    pub fn validate(&self, params: &Value) -> Result<Value> {
        let mut object = match params {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            _ => {
                return Err(Error::invalid_parameters(
                    vec!["params".into()],
                    "params must be an object",
                ));
            }
        };

        let mut offending = Vec::new();

        for field in &self.fields {
            match object.get(&field.name) {
                None | Some(Value::Null) => {
                    if field.required {
                        offending.push(field.name.clone());
                    }
                }
                Some(value) => match coerce(value, field.field_type) {
                    Some(coerced) => {
                        object.insert(field.name.clone(), coerced);
                    }
                    None => offending.push(field.name.clone()),
                },
            }
        }

        if !offending.is_empty() {
            return Err(Error::invalid_parameters(
                offending,
                "params failed schema validation",
            ));
        }

        Ok(Value::Object(object))
    }

    /// JSON Schema-shaped description for `_list_tools` and the adapter
    pub fn to_json(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for field in &self.fields {
            properties.insert(
                field.name.clone(),
                json!({
                    "type": field.field_type.as_str(),
                    "description": field.description,
                }),
            );
            if field.required {
                required.push(Value::String(field.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Minimal params that satisfy this schema; used to prove listed tools
    /// validate their own example.
    pub fn example(&self) -> Value {
        let mut object = Map::new();
        for field in self.fields.iter().filter(|f| f.required) {
            object.insert(field.name.clone(), field.field_type.example());
        }
        Value::Object(object)
    }
}

fn coerce(value: &Value, target: FieldType) -> Option<Value> {
    match target {
        FieldType::String => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) => Some(Value::String(n.to_string())),
            _ => None,
        },
        FieldType::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
            Value::Number(n) => {
                let f = n.as_f64()?;
                (f.fract() == 0.0).then(|| json!(f as i64))
            }
            Value::String(s) => s.parse::<i64>().ok().map(|i| json!(i)),
            _ => None,
        },
        FieldType::Number => match value {
            Value::Number(_) => Some(value.clone()),
            Value::String(s) => s.parse::<f64>().ok().map(|f| json!(f)),
            _ => None,
        },
        FieldType::Boolean => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::String(s) => match s.as_str() {
                "true" => Some(json!(true)),
                "false" => Some(json!(false)),
                _ => None,
            },
            _ => None,
        },
        FieldType::Array => matches!(value, Value::Array(_)).then(|| value.clone()),
        FieldType::Object => matches!(value, Value::Object(_)).then(|| value.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> ToolSchema {
        ToolSchema::new()
            .required("project", FieldType::String, "project name")
            .required("lines", FieldType::Integer, "estimated lines")
            .optional("force", FieldType::Boolean, "override failures")
    }

    #[test]
    fn valid_params_pass_through() {
        let out = schema()
            .validate(&json!({ "project": "demo", "lines": 100 }))
            .unwrap();
        assert_eq!(out["project"], "demo");
        assert_eq!(out["lines"], 100);
    }

    #[test]
    fn all_offending_fields_are_reported() {
        let err = schema()
            .validate(&json!({ "lines": "not-a-number" }))
            .unwrap_err();
        match err {
            Error::InvalidParameters { fields, .. } => {
                assert!(fields.contains(&"project".to_string()));
                assert!(fields.contains(&"lines".to_string()));
            }
            other => panic!("expected InvalidParameters, got {:?}", other),
        }
    }

    #[test]
    fn integral_floats_and_numeric_strings_coerce() {
        let out = schema()
            .validate(&json!({ "project": "demo", "lines": 100.0 }))
            .unwrap();
        assert_eq!(out["lines"], 100);

        let out = schema()
            .validate(&json!({ "project": "demo", "lines": "250" }))
            .unwrap();
        assert_eq!(out["lines"], 250);
    }

    #[test]
    fn unknown_fields_pass_through_untouched() {
        let out = schema()
            .validate(&json!({ "project": "demo", "lines": 1, "extra": [1, 2] }))
            .unwrap();
        assert_eq!(out["extra"], json!([1, 2]));
    }

    #[test]
    fn schema_validates_its_own_example() {
        let s = schema();
        assert!(s.validate(&s.example()).is_ok());
    }

    #[test]
    fn json_shape_lists_required_fields() {
        let out = schema().to_json();
        assert_eq!(out["type"], "object");
        assert_eq!(out["required"], json!(["project", "lines"]));
    }
}
