//! Pipeline definition: declarative YAML/JSON form of a pipeline
//!
//! ```yaml
//! name: cleanup
//! log_eval: true
//! steps:
//!   - name: tag_source
//!     function: set_header
//!     kwargs:
//!       key: source
//!       value: sensor-3
//!   - name: halt
//!     function: stop_if
//!     kwargs:
//!       key: done
//! ```
//!
//! `function` defaults to the step name. Functions are resolved against a
//! [`StepRegistry`] when the pipeline is built.

use crate::error::{PipetreeError, Result};
use crate::pipeline::Pipeline;
use crate::registry::StepRegistry;
use crate::value::{Mapping, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,

    #[serde(default)]
    pub log_eval: bool,

    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,

    /// Registered function name. Defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,

    #[serde(default)]
    pub kwargs: BTreeMap<String, serde_json::Value>,
}

impl StepDefinition {
    pub fn function_name(&self) -> &str {
        self.function.as_deref().unwrap_or(&self.name)
    }

    pub fn kwargs_mapping(&self) -> Mapping {
        self.kwargs
            .iter()
            .map(|(k, v)| (k.clone(), Value::from(v.clone())))
            .collect()
    }
}

impl PipelineDefinition {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| PipetreeError::InvalidDefinition(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| PipetreeError::InvalidDefinition(e.to_string()))
    }

    /// Read a definition file; `.json` files are parsed as JSON, anything
    /// else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        }
    }

    /// Assemble a pipeline, resolving every function against `registry`.
    pub fn build(&self, registry: &StepRegistry) -> Result<Pipeline> {
        let steps = self
            .steps
            .iter()
            .map(|def| registry.step(&def.name, def.function_name(), def.kwargs_mapping()))
            .collect::<Result<Vec<_>>>()?;

        let mut pipeline = Pipeline::new(&self.name).with_log_eval(self.log_eval);
        pipeline.add_steps(steps)?;
        Ok(pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;

    const YAML: &str = r#"
name: tagging
log_eval: true
steps:
  - name: tag
    function: set
    kwargs:
      key: source
      value: sensor
  - name: set
"#;

    fn registry() -> StepRegistry {
        let mut registry = StepRegistry::new();
        registry.register("set", |c: &mut Container, kw: &Mapping| {
            let key = kw.get("key").and_then(Value::as_str).unwrap_or("touched").to_string();
            let value = kw.get("value").cloned().unwrap_or(Value::Bool(true));
            c.header_mut().insert(key, value);
            Ok(())
        });
        registry
    }

    #[test]
    fn test_build_from_yaml() {
        let def = PipelineDefinition::from_yaml(YAML).unwrap();
        assert_eq!(def.steps[1].function_name(), "set");

        let mut pipeline = def.build(&registry()).unwrap();
        assert_eq!(pipeline.name(), "tagging");
        assert!(pipeline.log_eval());
        assert_eq!(pipeline.step_names(), vec!["tag", "set"]);

        let mut root = Container::branch("root");
        pipeline.eval(&mut root).unwrap();
        assert_eq!(root.header()["source"], Value::from("sensor"));
        assert_eq!(root.header()["touched"], Value::Bool(true));
    }

    #[test]
    fn test_build_from_json() {
        let def = PipelineDefinition::from_json(
            r#"{"name": "j", "steps": [{"name": "set", "kwargs": {"key": "n", "value": 3}}]}"#,
        )
        .unwrap();
        assert!(!def.log_eval);
        assert_eq!(def.steps[0].kwargs_mapping()["value"], Value::Int(3));
    }

    #[test]
    fn test_unknown_function() {
        let def = PipelineDefinition::from_yaml("name: x\nsteps:\n  - name: nope\n").unwrap();
        assert!(matches!(def.build(&registry()).unwrap_err(), PipetreeError::NotFound(_)));
    }

    #[test]
    fn test_duplicate_step_names() {
        let def = PipelineDefinition::from_yaml(
            "name: x\nsteps:\n  - name: set\n  - name: set\n",
        )
        .unwrap();
        assert!(matches!(def.build(&registry()).unwrap_err(), PipetreeError::DuplicateName(_)));
    }

    #[test]
    fn test_malformed_yaml() {
        assert!(matches!(
            PipelineDefinition::from_yaml("steps: [").unwrap_err(),
            PipetreeError::InvalidDefinition(_)
        ));
    }
}
