use serde::Deserialize;

/// Tunables for how a prompt runs its turns
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Fail a streaming turn once this many bytes are buffered without
    /// rendering. `None` keeps buffering until the stream ends.
    pub max_pending_bytes: Option<usize>,
    /// Maximum plugin invocations in one turn, counting every round of
    /// function calls. `None` removes the limit.
    pub max_rounds: Option<usize>,
    /// Run the function calls of one model message concurrently. Results
    /// are recorded in call order either way.
    pub concurrent_functions: bool,
    /// Trim surrounding whitespace from text input
    pub trim_input: bool,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_pending_bytes: None,
            max_rounds: Some(16),
            concurrent_functions: true,
            trim_input: true,
        }
    }
}
