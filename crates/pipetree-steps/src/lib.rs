//! Pipetree Steps: reusable step functions for the pipeline evaluator.
//!
//! These steps only touch tree structure, headers and metadata; they never
//! interpret payloads. They act as building blocks for declarative
//! pipelines and as examples of the step contract.
//!
//! | function      | kwargs                                   |
//! |---------------|------------------------------------------|
//! | `set_header`  | `key`, `value`, optional `target`        |
//! | `set_meta`    | `target`, `key`, `value`                 |
//! | `stop`        | none                                     |
//! | `stop_if`     | `key` (root header entry)                |
//! | `drop_nodes`  | `names` (string or list of strings)      |
//! | `copy_node`   | `from`, `to`, optional `parent`          |
//! | `rename_node` | `from`, `to`                             |

mod control;
mod kwargs;
mod metadata;
mod tree_ops;

pub use control::{StopIfStep, StopStep};
pub use kwargs::StepConfigError;
pub use metadata::{SetHeaderStep, SetMetaStep};
pub use tree_ops::{CopyNodeStep, DropNodesStep, RenameNodeStep};

use once_cell::sync::Lazy;
use pipetree_core::StepRegistry;

static DEFAULT_REGISTRY: Lazy<StepRegistry> = Lazy::new(build_registry);

fn build_registry() -> StepRegistry {
    let mut registry = StepRegistry::new();
    registry
        .register_function("set_header", SetHeaderStep)
        .register_function("set_meta", SetMetaStep)
        .register_function("stop", StopStep)
        .register_function("stop_if", StopIfStep)
        .register_function("drop_nodes", DropNodesStep)
        .register_function("copy_node", CopyNodeStep)
        .register_function("rename_node", RenameNodeStep);
    registry
}

/// Registry holding every step in this crate under its function name.
pub fn default_registry() -> StepRegistry {
    DEFAULT_REGISTRY.clone()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pipetree_core::{mapping, Container, Mapping, Pipeline, PipelineDefinition, StepFunction, Value};

    fn sample() -> Container {
        let mut root = Container::branch("root");
        root.add_with_metadata(
            "signal",
            Value::from(vec![1, 2, 3]),
            mapping! { "source" => "sensor" },
            mapping! { "labels" => vec!["a", "b", "c"] },
        )
        .unwrap();
        root.attach(Container::branch("scratch")).unwrap();
        root.add_under("scratch", "tmp", Value::Null).unwrap();
        root
    }

    fn apply(step: impl StepFunction, mut root: Container, kwargs: Mapping) -> anyhow::Result<Container> {
        step.run(&mut root, &kwargs)?;
        Ok(root)
    }

    #[test]
    fn test_default_registry_names() {
        let registry = default_registry();
        assert_eq!(
            registry.names(),
            vec!["copy_node", "drop_nodes", "rename_node", "set_header", "set_meta", "stop", "stop_if"]
        );
    }

    #[test]
    fn test_set_header_on_root_and_target() {
        let out = apply(SetHeaderStep, sample(), mapping! { "key" => "stage", "value" => 2 }).unwrap();
        assert_eq!(out.header()["stage"], Value::Int(2));

        let out = apply(
            SetHeaderStep,
            out,
            mapping! { "key" => "checked", "value" => true, "target" => "signal" },
        )
        .unwrap();
        assert_eq!(out["signal"].header()["checked"], Value::Bool(true));
        assert_eq!(out["signal"].header()["source"], Value::from("sensor"));
    }

    #[test]
    fn test_set_header_missing_kwarg() {
        let err = apply(SetHeaderStep, sample(), mapping! { "value" => 1 }).unwrap_err();
        assert_eq!(
            err.downcast_ref::<StepConfigError>(),
            Some(&StepConfigError::Missing("key".into()))
        );
    }

    #[test]
    fn test_set_meta_unknown_target() {
        let err = apply(
            SetMetaStep,
            sample(),
            mapping! { "target" => "ghost", "key" => "k", "value" => 1 },
        )
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_stop_if() {
        let mut root = sample();
        root.header_mut().insert("done".into(), Value::Bool(false));
        StopIfStep.run(&mut root, &mapping! { "key" => "done" }).unwrap();
        assert!(!root.early_stop_requested());

        root.header_mut().insert("done".into(), Value::Bool(true));
        StopIfStep.run(&mut root, &mapping! { "key" => "done" }).unwrap();
        assert!(root.early_stop_requested());

        assert!(apply(StopStep, sample(), Mapping::new()).unwrap().early_stop_requested());
    }

    #[test]
    fn test_drop_nodes_skips_missing() {
        let out = apply(DropNodesStep, sample(), mapping! { "names" => vec!["scratch", "nothing"] })
            .unwrap();
        assert_eq!(out.list_names(), vec!["root", "signal"]);
    }

    #[test]
    fn test_copy_node_keeps_metadata() {
        let out = apply(
            CopyNodeStep,
            sample(),
            mapping! { "from" => "signal", "to" => "backup", "parent" => "scratch" },
        )
        .unwrap();
        assert_eq!(out.list_names(), vec!["root", "signal", "scratch", "tmp", "backup"]);
        assert_eq!(out["backup"].meta(), out["signal"].meta());
        assert_eq!(out["backup"].value(), out["signal"].value());

        let err = apply(CopyNodeStep, out, mapping! { "from" => "scratch", "to" => "x" }).unwrap_err();
        assert!(err.to_string().contains("branch"));
    }

    #[test]
    fn test_copy_node_rejects_non_string_parent() {
        let mut root = sample();
        let err = CopyNodeStep
            .run(&mut root, &mapping! { "from" => "signal", "to" => "backup", "parent" => 7 })
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StepConfigError>(),
            Some(StepConfigError::WrongType { key, .. }) if key == "parent"
        ));
        assert!(!root.contains("backup"));
    }

    #[test]
    fn test_rename_node() {
        let out = apply(RenameNodeStep, sample(), mapping! { "from" => "tmp", "to" => "cache" }).unwrap();
        assert!(out.contains("cache"));
        assert!(!out.contains("tmp"));
    }

    #[test]
    fn test_declarative_pipeline_with_default_registry() {
        let def = PipelineDefinition::from_yaml(
            r#"
name: tidy
log_eval: true
steps:
  - name: drop_scratch
    function: drop_nodes
    kwargs:
      names: scratch
  - name: mark
    function: set_header
    kwargs:
      key: tidy
      value: true
  - name: halt
    function: stop_if
    kwargs:
      key: tidy
  - name: never
    function: rename_node
    kwargs:
      from: signal
      to: renamed
"#,
        )
        .unwrap();

        let mut pipeline: Pipeline = def.build(&default_registry()).unwrap();
        let mut root = sample();
        pipeline.eval(&mut root).unwrap();

        assert!(root.early_stop_requested());
        assert!(root.contains("signal"));
        assert!(!root.contains("scratch"));
        assert_eq!(
            pipeline.last_run().unwrap().executed_steps(),
            vec!["drop_scratch", "mark", "halt"]
        );
    }
}
