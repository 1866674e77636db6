//! Argument schema registry for the ten supported operations.
//!
//! A static table describing each operation's name, purpose, and parameters,
//! with serialisers that turn the table into OpenAI function-calling
//! descriptors for the classifier boundary.  The same table backs argument
//! validation before dispatch, so the classifier prompt and the validator
//! can never drift apart.

use regex::Regex;
use serde_json::{json, Value};

/// JSON-Schema-like parameter definition.
#[derive(Debug, Clone)]
pub struct OpParam {
    pub name: &'static str,
    /// JSON Schema type: "string" or "integer".
    pub param_type: &'static str,
    pub required: bool,
    /// Optional regex constraint on string values.
    pub pattern: Option<&'static str>,
}

/// One operation the classifier may select.
#[derive(Debug, Clone)]
pub struct OpDef {
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [OpParam],
}

const fn string(name: &'static str) -> OpParam {
    OpParam { name, param_type: "string", required: true, pattern: None }
}

// ── Registry ────────────────────────────────────────────────────────────────

pub static OPS: &[OpDef] = &[
    OpDef {
        name: "A1",
        description: "Run datagen.py locally using the given email to generate required files.",
        params: &[OpParam {
            name: "email",
            param_type: "string",
            required: true,
            pattern: Some(r"[\w\.-]+@[\w\.-]+\.\w+"),
        }],
    },
    OpDef {
        name: "A2",
        description: "Format a markdown file using a specified version of Prettier.",
        params: &[
            OpParam {
                name: "prettier_version",
                param_type: "string",
                required: true,
                pattern: Some(r"prettier@\d+\.\d+\.\d+"),
            },
            OpParam {
                name: "filename",
                param_type: "string",
                required: true,
                pattern: Some(r".*/(.*\.md)"),
            },
        ],
    },
    OpDef {
        name: "A3",
        description: "Count the number of occurrences of a specified weekday in a dates file \
                      and write the count to a target file.",
        params: &[string("filename"), string("targetfile"), string("weekday")],
    },
    OpDef {
        name: "A4",
        description: "Sort the contacts JSON file by last_name then first_name and write the \
                      result to a target file.",
        params: &[string("filename"), string("targetfile")],
    },
    OpDef {
        name: "A5",
        description: "Write the first line of the most recent log files from a directory to an \
                      output file.",
        params: &[
            string("log_dir_path"),
            string("output_file_path"),
            OpParam { name: "num_files", param_type: "integer", required: true, pattern: None },
        ],
    },
    OpDef {
        name: "A6",
        description: "Extract the first H1 title from each Markdown file in a directory and \
                      create an index mapping file.",
        params: &[string("doc_dir_path"), string("output_file_path")],
    },
    OpDef {
        name: "A7",
        description: "Extract the sender's email address from an email file and write it to an \
                      output file.",
        params: &[string("filename"), string("output_file")],
    },
    OpDef {
        name: "A8",
        description: "Extract a credit card number from an image and write it (without spaces) \
                      to an output file.",
        params: &[string("filename"), string("image_path")],
    },
    OpDef {
        name: "A9",
        description: "Find the most similar pair of comments in a file and write them to an \
                      output file.",
        params: &[string("filename"), string("output_filename")],
    },
    OpDef {
        name: "A10",
        description: "Execute an SQL query on a SQLite database and write the result to an \
                      output file.",
        params: &[string("filename"), string("output_filename"), string("query")],
    },
];

/// Look up an operation by its registered name.
pub fn op_by_name(name: &str) -> Option<&'static OpDef> {
    OPS.iter().find(|op| op.name == name)
}

// ── Classifier boundary serialisation ───────────────────────────────────────

fn params_to_json_schema(params: &[OpParam]) -> (Value, Value) {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();

    for p in params {
        let mut prop = serde_json::Map::new();
        prop.insert("type".into(), json!(p.param_type));
        if let Some(pattern) = p.pattern {
            prop.insert("pattern".into(), json!(pattern));
        }
        properties.insert(p.name.to_string(), Value::Object(prop));
        if p.required {
            required.push(json!(p.name));
        }
    }

    (Value::Object(properties), Value::Array(required))
}

/// OpenAI / OpenAI-compatible function-calling format.
///
/// ```json
/// { "type": "function", "function": { "name", "description", "parameters": { … } } }
/// ```
pub fn ops_openai() -> Vec<Value> {
    OPS.iter()
        .map(|op| {
            let (properties, required) = params_to_json_schema(op.params);
            json!({
                "type": "function",
                "function": {
                    "name": op.name,
                    "description": op.description,
                    "parameters": {
                        "type": "object",
                        "properties": properties,
                        "required": required,
                    }
                }
            })
        })
        .collect()
}

// ── Validation ──────────────────────────────────────────────────────────────

/// Check extracted arguments against an operation's schema: required
/// parameters present, types correct, pattern constraints satisfied.
/// Unknown extra keys are ignored.
pub fn validate_args(def: &OpDef, args: &Value) -> Result<(), String> {
    let obj = args
        .as_object()
        .ok_or_else(|| "arguments must be a JSON object".to_string())?;

    for p in def.params {
        let value = match obj.get(p.name) {
            Some(v) => v,
            None if p.required => {
                return Err(format!("missing required parameter '{}'", p.name));
            }
            None => continue,
        };

        match p.param_type {
            "integer" => {
                if !value.is_u64() {
                    return Err(format!(
                        "parameter '{}' must be a non-negative integer",
                        p.name
                    ));
                }
            }
            _ => {
                let s = value.as_str().ok_or_else(|| {
                    format!("parameter '{}' must be a string", p.name)
                })?;
                if let Some(pattern) = p.pattern {
                    let re = Regex::new(pattern).expect("valid parameter pattern");
                    if !re.is_match(s) {
                        return Err(format!(
                            "parameter '{}' value '{}' does not match pattern {}",
                            p.name, s, pattern
                        ));
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_has_ten_unique_ops() {
        assert_eq!(OPS.len(), 10);
        for (i, op) in OPS.iter().enumerate() {
            assert!(
                OPS.iter().skip(i + 1).all(|other| other.name != op.name),
                "duplicate operation name {}",
                op.name
            );
        }
    }

    #[test]
    fn test_op_by_name() {
        assert_eq!(op_by_name("A3").unwrap().params.len(), 3);
        assert!(op_by_name("A11").is_none());
        assert!(op_by_name("a3").is_none(), "lookup is exact, never partial");
    }

    #[test]
    fn test_openai_format() {
        let ops = ops_openai();
        assert_eq!(ops.len(), 10);
        assert_eq!(ops[0]["type"], "function");
        assert_eq!(ops[0]["function"]["name"], "A1");
        assert!(ops[0]["function"]["parameters"]["properties"]["email"].is_object());
        assert_eq!(
            ops[0]["function"]["parameters"]["required"][0],
            "email"
        );
        // Pattern constraints survive serialisation.
        assert_eq!(
            ops[1]["function"]["parameters"]["properties"]["prettier_version"]["pattern"],
            r"prettier@\d+\.\d+\.\d+"
        );
    }

    #[test]
    fn test_validate_args_missing_required() {
        let def = op_by_name("A3").unwrap();
        let err = validate_args(def, &json!({ "filename": "/data/dates.txt" })).unwrap_err();
        assert!(err.contains("targetfile"));
    }

    #[test]
    fn test_validate_args_wrong_type() {
        let def = op_by_name("A5").unwrap();
        let args = json!({
            "log_dir_path": "/data/logs",
            "output_file_path": "/data/logs-recent.txt",
            "num_files": "ten"
        });
        let err = validate_args(def, &args).unwrap_err();
        assert!(err.contains("num_files"));
    }

    #[test]
    fn test_validate_args_pattern() {
        let def = op_by_name("A2").unwrap();
        let bad = json!({ "prettier_version": "prettier@latest", "filename": "/data/format.md" });
        assert!(validate_args(def, &bad).is_err());

        let good = json!({ "prettier_version": "prettier@3.4.2", "filename": "/data/format.md" });
        assert!(validate_args(def, &good).is_ok());
    }

    #[test]
    fn test_validate_args_not_an_object() {
        let def = op_by_name("A4").unwrap();
        assert!(validate_args(def, &json!("not an object")).is_err());
    }
}
