//! Action plans: the structured output of the planner and the unit of work
//! carried through the task queue.
//!
//! A plan travels as JSON text: a list of `{"tool": ..., "parameters": {...}}`
//! objects. Decoding happens in two stages so callers can tell a malformed
//! step apart from a well-formed step that names a tool we do not have.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PlanError;

/// A single desktop action the executor knows how to perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "parameters", rename_all = "snake_case")]
pub enum Action {
    /// Launch a program by executable or document name.
    OpenApplication { app_name: String },
    /// Type text into whatever window has focus. `\n` presses Enter.
    WriteText { text_to_write: String },
}

impl Action {
    /// Every tool name in the capability registry.
    pub const TOOL_NAMES: &'static [&'static str] = &["open_application", "write_text"];

    /// The wire name of this action's tool.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Action::OpenApplication { .. } => "open_application",
            Action::WriteText { .. } => "write_text",
        }
    }

    /// Whether `name` is a tool in the capability registry.
    pub fn is_known_tool(name: &str) -> bool {
        Self::TOOL_NAMES.contains(&name)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::OpenApplication { app_name } => write!(f, "open_application({app_name:?})"),
            Action::WriteText { text_to_write } => write!(f, "write_text({text_to_write:?})"),
        }
    }
}

/// A step as it appears on the wire, before the tool name is checked.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawStep {
    pub tool: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl RawStep {
    /// Decode into a typed [`Action`]. `index` is only used for error reporting.
    pub fn decode(&self, index: usize) -> Result<Action, PlanError> {
        if !Action::is_known_tool(&self.tool) {
            return Err(PlanError::UnknownTool {
                index,
                tool: self.tool.clone(),
            });
        }

        let value = serde_json::json!({
            "tool": self.tool,
            "parameters": Value::Object(self.parameters.clone()),
        });
        serde_json::from_value(value).map_err(|e| PlanError::MalformedStep {
            index,
            reason: e.to_string(),
        })
    }
}

/// Parse plan text into raw steps without checking tool names.
///
/// Fails if the text is not JSON, is not a list, or contains an element that
/// is not a `{tool, parameters}` object.
pub fn parse_raw_steps(text: &str) -> Result<Vec<RawStep>, PlanError> {
    let value: Value =
        serde_json::from_str(text.trim()).map_err(|e| PlanError::InvalidJson(e.to_string()))?;

    let Value::Array(items) = value else {
        return Err(PlanError::NotASequence);
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<RawStep>(item).map_err(|e| PlanError::MalformedStep {
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// An ordered sequence of validated actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Plan {
    steps: Vec<Action>,
}

impl Plan {
    /// Strictly parse plan text: every step must be well-formed and name a
    /// known tool.
    pub fn parse(text: &str) -> Result<Self, PlanError> {
        let steps = parse_raw_steps(text)?
            .iter()
            .enumerate()
            .map(|(index, raw)| raw.decode(index))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[Action] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
