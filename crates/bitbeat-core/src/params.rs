//! Parameter sources and merging.
//!
//! A request carries parameters from three sources. They are merged into one
//! bag with fixed precedence `body > query > path`: on a key collision the
//! later source wins.

use crate::schema::{FieldType, Schema};
use serde_json::{Map, Value};

/// Merged parameter bag.
pub type Params = Map<String, Value>;

/// Parameters as received, one map per source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSources {
    /// Parameters captured from the route pattern.
    pub path: Params,
    /// Parameters decoded from the query string.
    pub query: Params,
    /// Parameters decoded from the request body.
    pub body: Params,
}

impl ParamSources {
    /// Merges the sources into one bag.
    ///
    /// String values from the path and query, which are untyped on the wire,
    /// are coerced to the declared input type when it is `number` or
    /// `boolean` and the string parses cleanly. Body values are taken as-is.
    #[must_use]
    pub fn merge(&self, inputs: &Schema) -> Params {
        let mut merged = Params::new();
        for source in [&self.path, &self.query] {
            for (key, value) in source {
                let value = match inputs.get(key) {
                    Some(schema) => coerce(value, schema.field_type()),
                    None => value.clone(),
                };
                merged.insert(key.clone(), value);
            }
        }
        for (key, value) in &self.body {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

/// Coerces a wire string to the declared type, or returns the value unchanged.
#[must_use]
pub fn coerce(value: &Value, field_type: FieldType) -> Value {
    let Value::String(raw) = value else {
        return value.clone();
    };
    match field_type {
        FieldType::Number => {
            if let Ok(int) = raw.parse::<i64>() {
                return Value::from(int);
            }
            raw.parse::<f64>()
                .ok()
                .filter(|n| n.is_finite())
                .map_or_else(|| value.clone(), Value::from)
        }
        FieldType::Boolean => match raw.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => value.clone(),
        },
        FieldType::String | FieldType::Object => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldSchema;
    use proptest::prelude::*;
    use serde_json::json;

    fn map(value: Value) -> Params {
        match value {
            Value::Object(map) => map,
            _ => Params::new(),
        }
    }

    fn single(key: &str, value: i32) -> Params {
        let mut params = Params::new();
        params.insert(key.to_string(), json!(value));
        params
    }

    #[test]
    fn test_body_wins_over_query_and_path() {
        let sources = ParamSources {
            path: map(json!({"id": "path", "a": 1})),
            query: map(json!({"id": "query", "b": 2})),
            body: map(json!({"id": "body"})),
        };
        let merged = sources.merge(&Schema::new());
        assert_eq!(merged["id"], "body");
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn test_query_wins_over_path() {
        let sources = ParamSources {
            path: map(json!({"id": "path"})),
            query: map(json!({"id": "query"})),
            body: Params::new(),
        };
        assert_eq!(sources.merge(&Schema::new())["id"], "query");
    }

    #[test]
    fn test_query_strings_are_coerced() {
        let mut inputs = Schema::new();
        inputs.insert("count".into(), FieldSchema::number());
        inputs.insert("ratio".into(), FieldSchema::number());
        inputs.insert("flag".into(), FieldSchema::boolean());
        inputs.insert("name".into(), FieldSchema::string());

        let sources = ParamSources {
            query: map(json!({
                "count": "5", "ratio": "0.5", "flag": "true", "name": "42", "extra": "7"
            })),
            ..ParamSources::default()
        };
        let merged = sources.merge(&inputs);
        assert_eq!(merged["count"], json!(5));
        assert_eq!(merged["ratio"], json!(0.5));
        assert_eq!(merged["flag"], json!(true));
        assert_eq!(merged["name"], json!("42"));
        assert_eq!(merged["extra"], json!("7"));
    }

    #[test]
    fn test_body_strings_are_not_coerced() {
        let mut inputs = Schema::new();
        inputs.insert("count".into(), FieldSchema::number());
        let sources = ParamSources {
            body: map(json!({"count": "5"})),
            ..ParamSources::default()
        };
        assert_eq!(sources.merge(&inputs)["count"], json!("5"));
    }

    #[test]
    fn test_unparseable_strings_kept() {
        assert_eq!(coerce(&json!("abc"), FieldType::Number), json!("abc"));
        assert_eq!(coerce(&json!("NaN"), FieldType::Number), json!("NaN"));
        assert_eq!(coerce(&json!("yes"), FieldType::Boolean), json!("yes"));
        assert_eq!(coerce(&json!(3), FieldType::Boolean), json!(3));
    }

    proptest! {
        #[test]
        fn prop_later_source_wins(key in "[a-z]{1,8}", p in any::<i32>(), q in any::<i32>(), b in any::<i32>()) {
            let sources = ParamSources {
                path: single(&key, p),
                query: single(&key, q),
                body: single(&key, b),
            };
            let merged = sources.merge(&Schema::new());
            prop_assert_eq!(merged.len(), 1);
            prop_assert_eq!(&merged[&key], &json!(b));
        }

        #[test]
        fn prop_integer_strings_coerce(n in any::<i64>()) {
            prop_assert_eq!(coerce(&json!(n.to_string()), FieldType::Number), json!(n));
        }
    }
}
