//! `MockTransform`: a test double for `StepTransform`.
//!
//! Useful in unit and integration tests where calling a real model is
//! either unavailable or irrelevant.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{StepRole, StepTransform, TransformOutcome, TransformRequest};

/// What the mock does to its input when no failure is scripted for a step.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Return the input uppercased.
    Uppercase,
    /// Return the input unchanged.
    Echo,
    /// Ignore the input and return a fixed text.
    Return(String),
}

/// One call observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub step_name: String,
    pub input: String,
    pub role: StepRole,
}

/// A mock transform that records every call and answers from a script.
#[derive(Debug, Clone)]
pub struct MockTransform {
    behaviour: MockBehaviour,
    /// Step name → scripted outcome, checked before `behaviour`.
    scripted: HashMap<String, TransformOutcome>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockTransform {
    fn with_behaviour(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            scripted: HashMap::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn uppercase() -> Self {
        Self::with_behaviour(MockBehaviour::Uppercase)
    }

    pub fn echo() -> Self {
        Self::with_behaviour(MockBehaviour::Echo)
    }

    pub fn returning(text: impl Into<String>) -> Self {
        Self::with_behaviour(MockBehaviour::Return(text.into()))
    }

    /// Fail the step named `step_name` with `error` and no output.
    pub fn failing_on(mut self, step_name: impl Into<String>, error: impl Into<String>) -> Self {
        self.scripted.insert(step_name.into(), TransformOutcome::failure(error));
        self
    }

    /// Fail the step named `step_name` but still hand back `output`.
    pub fn partial_on(
        mut self,
        step_name: impl Into<String>,
        output: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        self.scripted
            .insert(step_name.into(), TransformOutcome::partial(output, error));
        self
    }

    /// All calls seen so far, in call order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of times a step has been transformed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl StepTransform for MockTransform {
    async fn transform(&self, request: TransformRequest<'_>) -> TransformOutcome {
        self.calls.lock().unwrap().push(RecordedCall {
            step_name: request.step_name.to_string(),
            input: request.input.to_string(),
            role: request.role,
        });

        if let Some(outcome) = self.scripted.get(request.step_name) {
            return outcome.clone();
        }

        match &self.behaviour {
            MockBehaviour::Uppercase => TransformOutcome::success(request.input.to_uppercase()),
            MockBehaviour::Echo => TransformOutcome::success(request.input),
            MockBehaviour::Return(text) => TransformOutcome::success(text.clone()),
        }
    }
}
