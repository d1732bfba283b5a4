//! Signal Sources and Bindings
//!
//! Every node input in the graph is either a constant or the live output of
//! another node. [`SignalSource`] is that stored choice; [`Binding`] is the
//! value a host hands to a node when it rebinds one of its inputs, and
//! [`Input`] is what a source resolves to while a tick is running.
//!
//! A stream source only carries the upstream [`NodeId`]. It never owns the
//! upstream node, so arbitrarily connected graphs (including ones that would
//! form ownership cycles) stay safe to tear down: the server's arena is the
//! sole owner of every node.

use crate::matrix::Matrix;
use crate::server::NodeId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Stored input of a node: a constant or a weak link to an upstream node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SignalSource {
    /// Constant value, broadcast across the whole block
    Scalar(f64),

    /// Output block of an upstream node, looked up through the server
    Stream(NodeId),
}

impl SignalSource {
    pub fn is_stream(&self) -> bool {
        matches!(self, SignalSource::Stream(_))
    }

    /// Upstream node, if this source is a stream
    pub fn node(&self) -> Option<NodeId> {
        match self {
            SignalSource::Scalar(_) => None,
            SignalSource::Stream(id) => Some(*id),
        }
    }
}

impl Default for SignalSource {
    fn default() -> Self {
        SignalSource::Scalar(0.0)
    }
}

impl From<f64> for SignalSource {
    fn from(value: f64) -> Self {
        SignalSource::Scalar(value)
    }
}

impl From<NodeId> for SignalSource {
    fn from(id: NodeId) -> Self {
        SignalSource::Stream(id)
    }
}

/// A resolved source for the current tick
#[derive(Debug, Clone, Copy)]
pub enum Input<'a> {
    Scalar(f64),
    Stream(&'a [f64]),
}

/// Value supplied by the host when rebinding a node input
#[derive(Debug, Clone)]
pub enum Binding {
    Scalar(f64),
    Node(NodeId),
    Matrix(Arc<Matrix>),
}

impl Binding {
    /// Human-readable kind, used in error reports
    pub fn kind(&self) -> &'static str {
        match self {
            Binding::Scalar(_) => "scalar",
            Binding::Node(_) => "node",
            Binding::Matrix(_) => "matrix",
        }
    }

    /// Interpret this binding as a signal for the named input
    pub fn into_signal(self, input: &str) -> Result<SignalSource, BindError> {
        match self {
            Binding::Scalar(v) if v.is_finite() => Ok(SignalSource::Scalar(v)),
            Binding::Scalar(_) => Err(BindError::NonFinite {
                input: input.to_string(),
            }),
            Binding::Node(id) => Ok(SignalSource::Stream(id)),
            Binding::Matrix(_) => Err(BindError::WrongKind {
                input: input.to_string(),
                expected: "scalar or node",
                found: "matrix",
            }),
        }
    }

    /// Interpret this binding as a matrix for the named input
    pub fn into_matrix(self, input: &str) -> Result<Arc<Matrix>, BindError> {
        match self {
            Binding::Matrix(matrix) => Ok(matrix),
            other => Err(BindError::WrongKind {
                input: input.to_string(),
                expected: "matrix",
                found: other.kind(),
            }),
        }
    }
}

impl From<f64> for Binding {
    fn from(value: f64) -> Self {
        Binding::Scalar(value)
    }
}

impl From<NodeId> for Binding {
    fn from(id: NodeId) -> Self {
        Binding::Node(id)
    }
}

impl From<Arc<Matrix>> for Binding {
    fn from(matrix: Arc<Matrix>) -> Self {
        Binding::Matrix(matrix)
    }
}

impl From<Matrix> for Binding {
    fn from(matrix: Matrix) -> Self {
        Binding::Matrix(Arc::new(matrix))
    }
}

impl From<SignalSource> for Binding {
    fn from(source: SignalSource) -> Self {
        match source {
            SignalSource::Scalar(v) => Binding::Scalar(v),
            SignalSource::Stream(id) => Binding::Node(id),
        }
    }
}

/// Configuration errors raised by a rebind. The node keeps its previous binding.
#[derive(Debug, Clone, PartialEq)]
pub enum BindError {
    WrongKind {
        input: String,
        expected: &'static str,
        found: &'static str,
    },
    NonFinite {
        input: String,
    },
    DivisionByZero,
    UnknownInput(String),
    Unavailable(NodeId),
    /// Reading the node would make it an upstream of itself
    WouldCycle {
        input: String,
        node: NodeId,
    },
}

impl std::fmt::Display for BindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindError::WrongKind {
                input,
                expected,
                found,
            } => write!(f, "Input '{}' expects a {}, got a {}", input, expected, found),
            BindError::NonFinite { input } => {
                write!(f, "Input '{}' must be a finite number", input)
            }
            BindError::DivisionByZero => write!(f, "Cannot divide by a constant zero"),
            BindError::UnknownInput(name) => write!(f, "Unknown input '{}'", name),
            BindError::Unavailable(id) => write!(f, "Node {:?} is not registered", id),
            BindError::WouldCycle { input, node } => write!(
                f,
                "Input '{}' cannot read node {:?}: it already depends on this node",
                input, node
            ),
        }
    }
}

impl std::error::Error for BindError {}
