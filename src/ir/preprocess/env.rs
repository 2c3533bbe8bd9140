use super::IrPreprocessor;
use crate::error::PipelineError;
use crate::ir::{EnvVar, Ir};
use crate::qa::QuestionBridge;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$\(([A-Za-z_][A-Za-z0-9_]*)\)")
            .expect("valid regex")
    })
}

fn has_reference(value: &str) -> bool {
    reference_regex().is_match(value)
}

/// Collapses duplicate variables (last definition wins, first position kept)
/// and expands `${VAR}` / `$(VAR)` references to sibling variables.
///
/// Expansion runs to a fixed point. References to unknown variables and
/// cyclic references are left as written.
pub struct EnvPreprocessor;

fn resolve(env: Vec<EnvVar>) -> Vec<EnvVar> {
    let mut order: Vec<String> = Vec::new();
    let mut values: BTreeMap<String, String> = BTreeMap::new();
    for var in env {
        if !values.contains_key(&var.name) {
            order.push(var.name.clone());
        }
        values.insert(var.name, var.value);
    }

    let re = reference_regex();
    loop {
        let mut changed = false;
        for name in &order {
            let value = &values[name];
            if !has_reference(value) {
                continue;
            }
            let expanded = re
                .replace_all(value, |caps: &regex::Captures| {
                    let target = caps
                        .get(1)
                        .or_else(|| caps.get(2))
                        .map(|m| m.as_str())
                        .unwrap_or_default();
                    match values.get(target) {
                        Some(v) if target != name.as_str() && !has_reference(v) => v.clone(),
                        _ => caps[0].to_string(),
                    }
                })
                .into_owned();
            if &expanded != value {
                values.insert(name.clone(), expanded);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    order
        .into_iter()
        .map(|name| {
            let value = values.remove(&name).unwrap_or_default();
            EnvVar { name, value }
        })
        .collect()
}

impl IrPreprocessor for EnvPreprocessor {
    fn name(&self) -> &'static str {
        "env"
    }

    fn preprocess(&self, mut ir: Ir, _qa: &QuestionBridge) -> Result<Ir, PipelineError> {
        for service in ir.services.values_mut() {
            for container in service.containers.iter_mut() {
                let env = std::mem::take(&mut container.env);
                container.env = resolve(env);
            }
        }
        Ok(ir)
    }
}
