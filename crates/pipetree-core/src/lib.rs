//! Pipetree Core: container tree, name index, persistence and pipelines
//!
//! Two primitives compose into inspectable processing workflows:
//!
//! - [`Container`], a tree of named nodes holding payloads plus free-form
//!   `header` and `meta` mappings. Names are unique across the whole tree.
//! - [`Pipeline`], an ordered list of named, configurable steps that run
//!   user-supplied [`StepFunction`]s against a container in place.
//!
//! ```
//! use pipetree_core::{mapping, Container, Mapping, Pipeline, Step, Value};
//!
//! let mut root = Container::branch("root");
//! root.add("array_1", Value::from(vec![1, 2, 3, 4])).unwrap();
//!
//! let mut pipeline = Pipeline::new("demo");
//! pipeline
//!     .add_steps([
//!         Step::with_kwargs(
//!             "double",
//!             |c: &mut Container, kw: &Mapping| {
//!                 let factor = kw["factor"].as_i64().unwrap_or(1);
//!                 let doubled: Vec<i64> = c["array_1"]
//!                     .value()
//!                     .and_then(Value::as_list)
//!                     .unwrap_or(&[])
//!                     .iter()
//!                     .filter_map(Value::as_i64)
//!                     .map(|x| x * factor)
//!                     .collect();
//!                 c.add("array_2", Value::from(doubled))?;
//!                 Ok(())
//!             },
//!             mapping! { "factor" => 2 },
//!         ),
//!         Step::new("halt", |c: &mut Container, _: &Mapping| {
//!             c.request_early_stop();
//!             Ok(())
//!         }),
//!     ])
//!     .unwrap();
//!
//! pipeline.eval(&mut root).unwrap();
//! assert_eq!(root["array_2"].value(), Some(&Value::from(vec![2, 4, 6, 8])));
//! assert!(root.early_stop_requested());
//! ```

pub mod container;
pub mod definition;
pub mod error;
pub mod eval_log;
pub mod evaluator;
pub mod index;
pub mod persist;
pub mod pipeline;
pub mod registry;
pub mod step;
pub mod value;

pub use container::{Container, NodeMut, Payload, Shape, EARLY_STOP_KEY};
pub use definition::{PipelineDefinition, StepDefinition};
pub use error::{PipetreeError, Result};
pub use eval_log::{EvalLog, RunState, StepRecord, StepStatus};
pub use index::NameIndex;
pub use persist::{load, save};
pub use pipeline::Pipeline;
pub use registry::StepRegistry;
pub use step::{SharedStepFunction, Step, StepFunction};
pub use value::{Mapping, Opaque, Value};

/// Pipetree engine version.
pub const PIPETREE_VERSION: &str = "1.0.0";
