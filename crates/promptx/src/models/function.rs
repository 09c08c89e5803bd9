use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A function as advertised to a plugin: everything but the handler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDef {
    /// The name of the function
    pub name: String,
    /// A description of what the function does
    pub description: String,
    /// JSON schema of the arguments the function accepts
    pub parameters: Value,
}

impl FunctionDef {
    /// Create a new definition. `None` parameters become an empty schema object.
    pub fn new<N, D>(name: N, description: D, parameters: Option<Value>) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        FunctionDef {
            name: name.into(),
            description: description.into(),
            parameters: parameters.unwrap_or_else(|| json!({})),
        }
    }

    /// Catalogue entry used when the plugin has no native function support
    pub fn catalogue_entry(&self) -> String {
        format!(
            "- {}:\n\t- description: {}\n\t- parameters: {}\n",
            self.name, self.description, self.parameters
        )
    }
}

/// A function call requested by the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    /// Identifier echoed back in the matching function message
    pub id: String,
    /// The name of the function to execute
    pub name: String,
    /// The arguments for the execution, always a JSON object
    pub arguments: Value,
}

impl FunctionCall {
    pub fn new<I: Into<String>, N: Into<String>>(id: I, name: N, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameters_default_to_empty_object() {
        let def = FunctionDef::new("lights_on", "turns the lights on", None);
        assert_eq!(def.parameters, json!({}));
    }

    #[test]
    fn test_catalogue_entry_format() {
        let def = FunctionDef::new(
            "set_color",
            "sets the light color",
            Some(json!({"type": "object"})),
        );

        assert_eq!(
            def.catalogue_entry(),
            "- set_color:\n\t- description: sets the light color\n\t- parameters: {\"type\":\"object\"}\n"
        );
    }
}
