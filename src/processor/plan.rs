//! Execution plan types and phase bookkeeping.
//!
//! A resolved intent carries a flat list of [`ExecutionStep`]s. Steps
//! sharing an `order` value form a phase; phases run strictly in
//! ascending order and steps inside one phase run concurrently. A step's
//! `depends_on` names phase numbers whose results must already exist.
//!
//! Phase results are stored per step, keyed by tool id, so a fan-out
//! phase loses nothing: a downstream step depending on a single-step
//! phase sees that step's value directly, while depending on a fan-out
//! phase yields an object mapping tool id to value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Semantic intent resolved from a request, consumed by the processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIntent {
    pub action: String,
    pub resource: String,
    /// Tool ids in plan order; the first is the intent's primary tool.
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub auth_required: bool,
    /// Auth type the route implies, overridable per call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
    #[serde(default)]
    pub execution_plan: Vec<ExecutionStep>,
}

impl ResolvedIntent {
    pub fn new(action: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            resource: resource.into(),
            tools: Vec::new(),
            auth_required: false,
            auth_type: None,
            execution_plan: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_step(mut self, step: ExecutionStep) -> Self {
        self.execution_plan.push(step);
        self
    }

    pub fn with_auth(mut self, auth_type: Option<String>) -> Self {
        self.auth_required = true;
        self.auth_type = auth_type;
        self
    }

    /// The tool rate limiting applies to.
    pub fn primary_tool(&self) -> Option<&str> {
        self.tools.first().map(String::as_str)
    }

    /// Tag for metrics and logs: `action.resource`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.action, self.resource)
    }
}

/// One tool invocation inside an execution plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStep {
    pub tool_id: String,
    /// Phase this step belongs to.
    pub order: u32,
    /// Phase numbers whose results must exist before this step runs.
    #[serde(default)]
    pub depends_on: Vec<u32>,
    /// Per-step deadline in milliseconds on the wire.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "opt_duration_ms")]
    pub timeout: Option<Duration>,
}

impl ExecutionStep {
    pub fn new(tool_id: impl Into<String>, order: u32) -> Self {
        Self {
            tool_id: tool_id.into(),
            order,
            depends_on: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_depends_on(mut self, phases: Vec<u32>) -> Self {
        self.depends_on = phases;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// `Option<Duration>` as a plain millisecond count on the wire.
mod opt_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&(duration.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

// =============================================================================
// Phase bookkeeping
// =============================================================================

/// Steps grouped by `order`, ascending.
pub(crate) fn group_into_phases(steps: &[ExecutionStep]) -> Vec<(u32, Vec<&ExecutionStep>)> {
    let mut by_order: BTreeMap<u32, Vec<&ExecutionStep>> = BTreeMap::new();
    for step in steps {
        by_order.entry(step.order).or_default().push(step);
    }
    by_order.into_iter().collect()
}

/// Results of completed phases, every step's output retained.
#[derive(Debug, Default)]
pub(crate) struct PhaseResults {
    by_phase: BTreeMap<u32, Vec<(String, Value)>>,
}

impl PhaseResults {
    /// Store a completed phase's results in step order.
    pub fn insert_phase(&mut self, order: u32, results: Vec<(String, Value)>) {
        self.by_phase.insert(order, results);
    }

    pub fn contains_phase(&self, order: u32) -> bool {
        self.by_phase.contains_key(&order)
    }

    /// Dependencies of `step` that have not produced a result yet.
    pub fn missing_dependencies(&self, step: &ExecutionStep) -> Vec<u32> {
        step.depends_on
            .iter()
            .copied()
            .filter(|order| !self.contains_phase(*order))
            .collect()
    }

    /// Input for `step`: the folded result of the highest-numbered phase
    /// among its dependencies.
    pub fn previous_for(&self, step: &ExecutionStep) -> Option<Value> {
        step.depends_on
            .iter()
            .max()
            .and_then(|order| self.folded(*order))
    }

    /// A phase's folded value: a single step's output directly, or an
    /// object keyed by tool id when the phase fanned out.
    pub fn folded(&self, order: u32) -> Option<Value> {
        self.by_phase.get(&order).map(|results| fold(results))
    }

    /// Folded value of the last phase, `Null` for an empty plan.
    pub fn final_output(&self) -> Value {
        self.by_phase
            .values()
            .next_back()
            .map(|results| fold(results))
            .unwrap_or(Value::Null)
    }
}

fn fold(results: &[(String, Value)]) -> Value {
    match results {
        [] => Value::Null,
        [(_, value)] => value.clone(),
        many => {
            let mut map = Map::new();
            for (tool_id, value) in many {
                map.insert(tool_id.clone(), value.clone());
            }
            Value::Object(map)
        }
    }
}
