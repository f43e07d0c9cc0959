//! Read-only call graph executed as one simulated transaction.
//!
//! Inputs are shared by index. A call argument refers either to an input or to
//! the result of an earlier call in the same graph, which is how the chained
//! referral lookup threads its tracker handle.

use crate::domain::ObjectId;
use serde::{Deserialize, Serialize};

/// Fully qualified view function.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewTarget {
    pub package: ObjectId,
    pub module: String,
    pub function: String,
}

impl ViewTarget {
    pub fn new(package: ObjectId, module: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            package,
            module: module.into(),
            function: function.into(),
        }
    }
}

impl std::fmt::Display for ViewTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}::{}::{}", self.package.short(), self.module, self.function)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum CallInput {
    /// Shared or owned object, read-only.
    Object(ObjectId),
    /// Pre-encoded pure value.
    Pure(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CallArg {
    Input(u16),
    Result(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewCall {
    pub target: ViewTarget,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<CallArg>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallGraph {
    pub sender: ObjectId,
    pub inputs: Vec<CallInput>,
    pub calls: Vec<ViewCall>,
}

impl CallGraph {
    /// Empty graph sent from the zero address; simulation needs no signature.
    pub fn new() -> Self {
        Self {
            sender: ObjectId::zero(),
            inputs: Vec::new(),
            calls: Vec::new(),
        }
    }

    /// Add an object input, reusing the slot if the object is already present.
    pub fn object(&mut self, id: &ObjectId) -> CallArg {
        let existing = self
            .inputs
            .iter()
            .position(|input| matches!(input, CallInput::Object(o) if o == id));
        match existing {
            Some(index) => CallArg::Input(index as u16),
            None => {
                self.inputs.push(CallInput::Object(id.clone()));
                CallArg::Input((self.inputs.len() - 1) as u16)
            }
        }
    }

    pub fn pure(&mut self, bytes: Vec<u8>) -> CallArg {
        self.inputs.push(CallInput::Pure(bytes));
        CallArg::Input((self.inputs.len() - 1) as u16)
    }

    /// Append a call and return a handle to its result.
    pub fn call(
        &mut self,
        target: ViewTarget,
        type_arguments: Vec<String>,
        arguments: Vec<CallArg>,
    ) -> CallArg {
        self.calls.push(ViewCall {
            target,
            type_arguments,
            arguments,
        });
        CallArg::Result((self.calls.len() - 1) as u16)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl Default for CallGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ExecutionStatus {
    Success,
    Failure { error: String },
}

/// One return value: raw canonical bytes plus the type tag reported by the node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(Vec<u8>, String)", into = "(Vec<u8>, String)")]
pub struct ReturnValue {
    pub bytes: Vec<u8>,
    pub type_tag: String,
}

impl From<(Vec<u8>, String)> for ReturnValue {
    fn from((bytes, type_tag): (Vec<u8>, String)) -> Self {
        Self { bytes, type_tag }
    }
}

impl From<ReturnValue> for (Vec<u8>, String) {
    fn from(value: ReturnValue) -> Self {
        (value.bytes, value.type_tag)
    }
}

impl ReturnValue {
    pub fn u64(value: u64) -> Self {
        Self {
            bytes: value.to_le_bytes().to_vec(),
            type_tag: "u64".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallResult {
    #[serde(default)]
    pub return_values: Vec<ReturnValue>,
}

impl CallResult {
    /// First return value decoded as a little-endian u64.
    pub fn first_u64(&self) -> Option<u64> {
        self.return_values
            .first()
            .and_then(|value| decode_u64_le(&value.bytes))
    }
}

/// Outcome of a simulated execution. `results` align 1:1 with the graph's calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResponse {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub results: Vec<CallResult>,
}

impl SimulationResponse {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Success)
    }
}

/// Fixed-width 8-byte little-endian u64. Any other width is rejected.
pub fn decode_u64_le(bytes: &[u8]) -> Option<u64> {
    let array: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_le_bytes(array))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(function: &str) -> ViewTarget {
        ViewTarget::new(ObjectId::parse("0xbeef").unwrap(), "lending_view", function)
    }

    #[test]
    fn test_object_inputs_are_deduplicated() {
        let pool = ObjectId::parse("0x1").unwrap();
        let mut graph = CallGraph::new();
        let a = graph.object(&pool);
        let b = graph.object(&ObjectId::parse("0x2").unwrap());
        let c = graph.object(&pool);
        assert_eq!(a, CallArg::Input(0));
        assert_eq!(b, CallArg::Input(1));
        assert_eq!(c, CallArg::Input(0));
        assert_eq!(graph.inputs.len(), 2);
    }

    #[test]
    fn test_call_returns_result_handle() {
        let mut graph = CallGraph::new();
        let pool = graph.object(&ObjectId::parse("0x1").unwrap());
        let first = graph.call(target("tracker"), vec![], vec![pool]);
        let second = graph.call(target("earned"), vec![], vec![first]);
        assert_eq!(first, CallArg::Result(0));
        assert_eq!(second, CallArg::Result(1));
        assert_eq!(graph.calls[1].arguments, vec![CallArg::Result(0)]);
        assert_eq!(graph.sender, ObjectId::zero());
    }

    #[test]
    fn test_decode_u64_le_requires_eight_bytes() {
        assert_eq!(decode_u64_le(&840u64.to_le_bytes()), Some(840));
        assert_eq!(decode_u64_le(&[1, 0, 0, 0]), None);
        assert_eq!(decode_u64_le(&[0u8; 9]), None);
    }

    #[test]
    fn test_simulation_response_wire_shape() {
        let json = serde_json::json!({
            "status": {"status": "success"},
            "results": [
                {"returnValues": [[[72, 3, 0, 0, 0, 0, 0, 0], "u64"]]},
                {}
            ]
        });
        let response: SimulationResponse = serde_json::from_value(json).unwrap();
        assert!(response.is_success());
        assert_eq!(response.results[0].first_u64(), Some(840));
        assert_eq!(response.results[1].first_u64(), None);
    }

    #[test]
    fn test_failure_status_carries_error() {
        let json = serde_json::json!({"status": {"status": "failure", "error": "MoveAbort"}});
        let response: SimulationResponse = serde_json::from_value(json).unwrap();
        assert_eq!(
            response.status,
            ExecutionStatus::Failure {
                error: "MoveAbort".to_string()
            }
        );
    }
}
