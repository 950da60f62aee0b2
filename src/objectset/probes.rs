//! Availability probes evaluated against live objects.

use serde_json::Value;

use crate::crd::{ObjectSetProbe, Probe, ProbeConditionSpec, ProbeFieldComparisonSpec};

/// Resolve a dotted field path inside a JSON object.
fn field_value<'a>(obj: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = obj;
    for segment in path.split('.').filter(|s| !s.is_empty()) {
        current = current.get(segment)?;
    }
    Some(current)
}

fn object_group(obj: &Value) -> &str {
    obj.get("apiVersion")
        .and_then(Value::as_str)
        .map(|v| v.split_once('/').map_or("", |(group, _)| group))
        .unwrap_or("")
}

fn object_kind(obj: &Value) -> &str {
    obj.get("kind").and_then(Value::as_str).unwrap_or("")
}

fn probe_condition(spec: &ProbeConditionSpec, obj: &Value) -> Result<(), String> {
    let generation = field_value(obj, "metadata.generation").and_then(Value::as_i64);

    let conditions = field_value(obj, "status.conditions")
        .and_then(Value::as_array)
        .ok_or_else(|| format!("condition {:?} not reported", spec.type_))?;

    let condition = conditions
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(spec.type_.as_str()))
        .ok_or_else(|| format!("condition {:?} not reported", spec.type_))?;

    // Stale conditions from an older generation never count as passing
    if let (Some(generation), Some(observed)) = (
        generation,
        condition.get("observedGeneration").and_then(Value::as_i64),
    ) {
        if observed != generation {
            return Err(format!("condition {:?} is outdated", spec.type_));
        }
    }

    let status = condition.get("status").and_then(Value::as_str).unwrap_or("");
    if status != spec.status {
        return Err(format!(
            "condition {:?} is {:?}, expected {:?}",
            spec.type_, status, spec.status
        ));
    }
    Ok(())
}

fn probe_field_comparison(spec: &ProbeFieldComparisonSpec, obj: &Value) -> Result<(), String> {
    let a = field_value(obj, &spec.field_a);
    let b = field_value(obj, &spec.field_b);
    if a.is_some() && a == b {
        Ok(())
    } else {
        Err(format!(
            "fields {:?} and {:?} differ",
            spec.field_a, spec.field_b
        ))
    }
}

fn run_probe(probe: &Probe, obj: &Value) -> Result<(), String> {
    if let Some(condition) = &probe.condition {
        probe_condition(condition, obj)?;
    }
    if let Some(comparison) = &probe.field_comparison {
        probe_field_comparison(comparison, obj)?;
    }
    Ok(())
}

/// Compiled set of availability probes for one ObjectSet.
pub struct Prober {
    probes: Vec<ObjectSetProbe>,
}

impl Prober {
    pub fn new(probes: Vec<ObjectSetProbe>) -> Self {
        Self { probes }
    }

    /// Run every probe whose selector matches the object. Returns the first
    /// failure message, if any.
    pub fn probe(&self, obj: &Value) -> Result<(), String> {
        let group = object_group(obj);
        let kind = object_kind(obj);

        for set_probe in &self.probes {
            let Some(selector) = &set_probe.selector.kind else {
                continue;
            };
            if selector.group != group || selector.kind != kind {
                continue;
            }
            for probe in &set_probe.probes {
                run_probe(probe, obj)?;
            }
        }
        Ok(())
    }
}
