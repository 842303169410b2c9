//! Evaluator: threads a container through the pipeline's steps
//!
//! Steps run one at a time in list order. After each step the container
//! header is checked for [`EARLY_STOP_KEY`]; a truthy value ends the run
//! successfully. A failing step ends the run with
//! [`PipetreeError::StepFailed`], and later steps are never invoked. The
//! container stays with the caller either way, so the effects of the steps
//! that ran before a failure can still be inspected.
//!
//! [`EARLY_STOP_KEY`]: crate::container::EARLY_STOP_KEY

use crate::container::Container;
use crate::error::{PipetreeError, Result};
use crate::eval_log::{EvalLog, RunState, StepRecord, StepStatus};
use crate::pipeline::Pipeline;
use chrono::Utc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Span};

impl Pipeline {
    /// Run every step against `container` in place.
    ///
    /// With `log_eval` enabled the run is recorded and available from
    /// [`Pipeline::last_run`] afterwards, including failed runs.
    pub fn eval(&mut self, container: &mut Container) -> Result<()> {
        self.last_run = None;
        let log_eval = self.log_eval();
        let mut log = log_eval.then(|| EvalLog::start(self.name()));

        let span = if log_eval {
            info_span!("pipeline.eval", pipeline = %self.name(), steps = self.len())
        } else {
            Span::none()
        };
        let _enter = span.enter();

        let mut state = RunState::Ready;

        for (index, step) in self.steps.iter().enumerate() {
            state = RunState::Running {
                step: step.name().to_string(),
            };
            let step_span = if log_eval {
                info_span!("step", step = step.name(), index)
            } else {
                Span::none()
            };
            let _step_enter = step_span.enter();
            debug!(step = step.name(), index, "running step");

            let started_at = Utc::now();
            let start = Instant::now();
            let result = step.call(container);
            let latency_ms = start.elapsed().as_millis() as u64;
            let finished_at = Utc::now();

            if let Err(source) = result {
                if let Some(log) = log.as_mut() {
                    warn!(step = step.name(), error = %source, "step failed");
                    log.record(StepRecord {
                        step: step.name().to_string(),
                        index,
                        started_at,
                        finished_at,
                        latency_ms,
                        status: StepStatus::Failed,
                        error: Some(format!("{:#}", source)),
                    });
                    log.finish(RunState::Failed {
                        step: step.name().to_string(),
                    });
                }
                self.last_run = log;
                return Err(PipetreeError::StepFailed {
                    step: step.name().to_string(),
                    source,
                });
            }

            let stop = container.early_stop_requested();

            if let Some(log) = log.as_mut() {
                info!(step = step.name(), latency_ms, stop, "step finished");
                log.record(StepRecord {
                    step: step.name().to_string(),
                    index,
                    started_at,
                    finished_at,
                    latency_ms,
                    status: if stop {
                        StepStatus::StoppedEarly
                    } else {
                        StepStatus::Completed
                    },
                    error: None,
                });
            }

            if stop {
                state = RunState::StoppedEarly {
                    step: step.name().to_string(),
                };
                break;
            }
        }

        if !state.is_terminal() {
            state = RunState::Completed;
        }
        debug!(?state, "evaluation finished");

        if let Some(mut log) = log {
            log.finish(state);
            self.last_run = Some(log);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::EARLY_STOP_KEY;
    use crate::mapping;
    use crate::step::Step;
    use crate::value::{Mapping, Value};
    use std::sync::{Arc, Mutex};

    type Calls = Arc<Mutex<Vec<String>>>;

    fn tracked(name: &str, calls: &Calls) -> Step {
        let calls = Arc::clone(calls);
        let label = name.to_string();
        Step::new(name, move |_, _| {
            calls.lock().unwrap().push(label.clone());
            Ok(())
        })
    }

    fn stopper(name: &str, calls: &Calls) -> Step {
        let calls = Arc::clone(calls);
        let label = name.to_string();
        Step::new(name, move |c: &mut Container, _: &Mapping| {
            calls.lock().unwrap().push(label.clone());
            c.request_early_stop();
            Ok(())
        })
    }

    fn failing(name: &str, calls: &Calls) -> Step {
        let calls = Arc::clone(calls);
        let label = name.to_string();
        Step::new(name, move |_: &mut Container, _: &Mapping| -> anyhow::Result<()> {
            calls.lock().unwrap().push(label.clone());
            anyhow::bail!("sensor offline")
        })
    }

    #[test]
    fn test_runs_steps_in_order() {
        let calls = Calls::default();
        let mut p = Pipeline::new("ordered");
        p.add_steps(vec![tracked("s1", &calls), tracked("s2", &calls), tracked("s3", &calls)])
            .unwrap();

        p.eval(&mut Container::branch("root")).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["s1", "s2", "s3"]);
    }

    #[test]
    fn test_early_stop_skips_remaining_steps() {
        let calls = Calls::default();
        let mut p = Pipeline::new("stopping").with_log_eval(true);
        p.add_steps(vec![stopper("s1", &calls), tracked("s2", &calls), tracked("s3", &calls)])
            .unwrap();

        let mut root = Container::branch("root");
        p.eval(&mut root).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["s1"]);
        assert!(root.early_stop_requested());

        let log = p.last_run().unwrap();
        assert_eq!(log.state, RunState::StoppedEarly { step: "s1".into() });
        assert_eq!(log.steps[0].status, StepStatus::StoppedEarly);
    }

    #[test]
    fn test_falsy_stop_flag_does_not_stop() {
        let calls = Calls::default();
        let mut p = Pipeline::new("flag");
        p.add_step(Step::new("unset", |c: &mut Container, _: &Mapping| {
            c.header_mut().insert(EARLY_STOP_KEY.into(), Value::Bool(false));
            Ok(())
        }))
        .unwrap();
        p.add_step(tracked("after", &calls)).unwrap();

        p.eval(&mut Container::branch("root")).unwrap();
        assert_eq!(*calls.lock().unwrap(), vec!["after"]);
    }

    #[test]
    fn test_failure_propagates_and_halts() {
        let calls = Calls::default();
        let mut p = Pipeline::new("failing").with_log_eval(true);
        p.add_steps(vec![tracked("s1", &calls), failing("s2", &calls), tracked("s3", &calls)])
            .unwrap();

        let err = p.eval(&mut Container::branch("root")).unwrap_err();
        match err {
            PipetreeError::StepFailed { step, source } => {
                assert_eq!(step, "s2");
                assert_eq!(source.to_string(), "sensor offline");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(*calls.lock().unwrap(), vec!["s1", "s2"]);

        let log = p.last_run().unwrap();
        assert_eq!(log.executed_steps(), vec!["s1", "s2"]);
        assert_eq!(log.state, RunState::Failed { step: "s2".into() });
        assert_eq!(log.failed_step().unwrap().error.as_deref(), Some("sensor offline"));
    }

    #[test]
    fn test_container_keeps_earlier_effects_after_failure() {
        let calls = Calls::default();
        let mut p = Pipeline::new("partial");
        p.add_step(Step::new("s1", |c: &mut Container, _: &Mapping| {
            c.add("from_s1", Value::from(vec![1, 2]))?;
            Ok(())
        }))
        .unwrap();
        p.add_steps(vec![failing("s2", &calls), tracked("s3", &calls)]).unwrap();

        let mut root = Container::branch("root");
        assert!(p.eval(&mut root).is_err());
        assert_eq!(root.list_names(), vec!["root", "from_s1"]);
        assert_eq!(root["from_s1"].value(), Some(&Value::from(vec![1, 2])));
        assert_eq!(*calls.lock().unwrap(), vec!["s2"]);
    }

    #[test]
    fn test_step_may_replace_the_tree() {
        let mut p = Pipeline::new("swap");
        p.add_step(Step::new("swap", |c: &mut Container, _: &Mapping| {
            *c = Container::leaf("replacement", 1);
            Ok(())
        }))
        .unwrap();
        let mut root = Container::branch("root");
        p.eval(&mut root).unwrap();
        assert_eq!(root.name(), "replacement");
    }

    #[test]
    fn test_kwargs_reach_step() {
        let mut p = Pipeline::new("kw");
        p.add_step(Step::with_kwargs(
            "label",
            |c: &mut Container, kw: &Mapping| {
                c.header_mut().insert("label".into(), kw["text"].clone());
                Ok(())
            },
            mapping! { "text" => "first" },
        ))
        .unwrap();

        let mut root = Container::branch("root");
        p.eval(&mut root).unwrap();
        assert_eq!(root.header()["label"], Value::from("first"));

        p.set_step_kwargs("label", mapping! { "text" => "second" }).unwrap();
        p.eval(&mut root).unwrap();
        assert_eq!(root.header()["label"], Value::from("second"));
    }

    #[test]
    fn test_pipeline_is_reusable_and_log_resets() {
        let calls = Calls::default();
        let mut p = Pipeline::new("reuse").with_log_eval(true);
        p.add_steps(vec![tracked("a", &calls), tracked("b", &calls)]).unwrap();

        p.eval(&mut Container::branch("first")).unwrap();
        p.eval(&mut Container::branch("second")).unwrap();

        let log = p.last_run().unwrap();
        assert_eq!(log.state, RunState::Completed);
        assert_eq!(log.steps.len(), 2);
        assert_eq!(calls.lock().unwrap().len(), 4);
    }

    #[test]
    fn test_no_log_without_log_eval() {
        let mut p = Pipeline::new("quiet");
        p.add_step(Step::new("noop", |_, _| Ok(()))).unwrap();
        p.eval(&mut Container::branch("root")).unwrap();
        assert!(p.last_run().is_none());
    }

    #[test]
    fn test_empty_pipeline_leaves_input_untouched() {
        let mut p = Pipeline::new("empty").with_log_eval(true);
        let input = Container::leaf("x", 3);
        let mut out = input.clone();
        p.eval(&mut out).unwrap();
        assert_eq!(out, input);
        assert_eq!(p.last_run().unwrap().state, RunState::Completed);
    }
}
