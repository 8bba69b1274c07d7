//! Input and output binding declarations.

use serde::{Deserialize, Serialize};

use crate::DataShape;

/// Whether a binding feeds the handler or receives its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    In,
    Out,
}

/// Declares a named binding between a handler argument and an external resource.
///
/// When `path_pattern` is set, `{placeholder}` tokens are filled from the trigger's
/// route parameters and the resulting path addresses the blob store. Without a
/// pattern, an input binding reads the event payload registered under `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingDecl {
    pub name: String,
    pub direction: Direction,
    #[serde(default)]
    pub shape: DataShape,
    #[serde(default)]
    pub path_pattern: Option<String>,
}

impl BindingDecl {
    /// Input binding backed by the blob store at `path_pattern`.
    pub fn input(name: impl Into<String>, path_pattern: impl Into<String>, shape: DataShape) -> Self {
        Self {
            name: name.into(),
            direction: Direction::In,
            shape,
            path_pattern: Some(path_pattern.into()),
        }
    }

    /// Output binding written to the blob store at `path_pattern` after a successful run.
    pub fn output(name: impl Into<String>, path_pattern: impl Into<String>, shape: DataShape) -> Self {
        Self {
            name: name.into(),
            direction: Direction::Out,
            shape,
            path_pattern: Some(path_pattern.into()),
        }
    }

    /// Input binding read from the event payload of the same name.
    pub fn event_input(name: impl Into<String>, shape: DataShape) -> Self {
        Self {
            name: name.into(),
            direction: Direction::In,
            shape,
            path_pattern: None,
        }
    }
}
