use serde_json::Value;
use std::collections::HashMap;

use crate::errors::{PromptError, PromptResult};
use crate::models::function::FunctionCall;

#[derive(Debug, Default, Clone)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

/// Assembles function calls from streamed deltas.
///
/// Providers send each call in pieces keyed by a positional index: the id and
/// name usually once, the arguments as a growing JSON fragment. Calls keep the
/// order in which their index was first seen.
#[derive(Debug, Default)]
pub struct FunctionCallAccumulator {
    calls: Vec<PartialCall>,
    positions: HashMap<usize, usize>,
}

impl FunctionCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        let position = *self.positions.entry(index).or_insert_with(|| {
            self.calls.push(PartialCall::default());
            self.calls.len() - 1
        });
        let call = &mut self.calls[position];

        if let Some(id) = id.filter(|id| !id.is_empty()) {
            call.id = id.to_string();
        }
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            call.name = name.to_string();
        }
        if let Some(arguments) = arguments {
            call.arguments.push_str(arguments);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Parse the accumulated arguments. Empty arguments mean `{}`; anything
    /// that is not a JSON object fails the whole set.
    pub fn finish(self) -> PromptResult<Vec<FunctionCall>> {
        self.calls
            .into_iter()
            .map(|call| {
                let arguments = if call.arguments.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str::<Value>(&call.arguments).map_err(|e| {
                        PromptError::InvalidArguments {
                            id: call.id.clone(),
                            reason: e.to_string(),
                        }
                    })?
                };

                if !arguments.is_object() {
                    return Err(PromptError::InvalidArguments {
                        id: call.id,
                        reason: format!("expected a JSON object, got {}", arguments),
                    });
                }

                Ok(FunctionCall::new(call.id, call.name, arguments))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accumulates_fragments_per_index() -> anyhow::Result<()> {
        let mut acc = FunctionCallAccumulator::new();
        acc.push(0, Some("call_1"), Some("set_color"), Some("{\"co"));
        acc.push(1, Some("call_2"), Some("lights_on"), None);
        acc.push(0, None, None, Some("lor\": \"red\"}"));

        let calls = acc.finish()?;
        assert_eq!(
            calls,
            vec![
                FunctionCall::new("call_1", "set_color", json!({"color": "red"})),
                FunctionCall::new("call_2", "lights_on", json!({})),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_first_seen_order_wins() -> anyhow::Result<()> {
        let mut acc = FunctionCallAccumulator::new();
        acc.push(3, Some("b"), Some("second"), Some("{}"));
        acc.push(1, Some("a"), Some("first"), Some("{}"));

        let calls = acc.finish()?;
        assert_eq!(calls[0].id, "b");
        assert_eq!(calls[1].id, "a");
        Ok(())
    }

    #[test]
    fn test_id_survives_empty_repeats() -> anyhow::Result<()> {
        let mut acc = FunctionCallAccumulator::new();
        acc.push(0, Some("call_1"), Some("lights_off"), Some(""));
        acc.push(0, Some(""), Some(""), Some("{}"));

        assert_eq!(acc.finish()?[0].id, "call_1");
        Ok(())
    }

    #[test]
    fn test_invalid_json_is_fatal() {
        let mut acc = FunctionCallAccumulator::new();
        acc.push(0, Some("call_1"), Some("set_color"), Some("{\"color\": "));

        match acc.finish() {
            Err(PromptError::InvalidArguments { id, .. }) => assert_eq!(id, "call_1"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_non_object_arguments_rejected() {
        let mut acc = FunctionCallAccumulator::new();
        acc.push(0, Some("call_1"), Some("set_color"), Some("[1, 2]"));
        assert!(acc.finish().is_err());
    }
}
