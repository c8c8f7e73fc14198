//! Role-conditioned prompt templates.

use crate::traits::{StepRole, TransformRequest};

const START_FALLBACK: &str = "Pass the input through.";
const END_FALLBACK: &str = "Output the final result.";

/// Render the prompt sent to the model for one step.
pub fn build_prompt(request: &TransformRequest<'_>) -> String {
    let name = request.step_name;
    let input = request.input;

    match request.role {
        StepRole::Start => {
            let description = or_fallback(request.description, START_FALLBACK);
            format!(
                "You are running the first step of a text-processing workflow.\n\n\
                 Step name: {name}\n\
                 Step description: {description}\n\n\
                 Input text from the user:\n---\n{input}\n---\n\n\
                 Apply only what the step description asks for. If the description is empty \
                 or just says \"start\", return the input text unchanged.\n\
                 Reply with only the transformed text, without explanation or markdown."
            )
        }
        StepRole::Normal => {
            let description = request.description;
            format!(
                "You are running one step of a text-processing workflow.\n\n\
                 Step name: {name}\n\
                 Step description: {description}\n\n\
                 Current text (output of the previous step):\n---\n{input}\n---\n\n\
                 Do exactly what the step description says to this text.\n\
                 Reply with only the resulting text, without explanation or markdown."
            )
        }
        StepRole::End => {
            let description = or_fallback(request.description, END_FALLBACK);
            format!(
                "You are running the final step of a text-processing workflow.\n\n\
                 Step name: {name}\n\
                 Step description: {description}\n\n\
                 Current text (output of the previous step):\n---\n{input}\n---\n\n\
                 Apply the step description and produce the final output.\n\
                 Reply with only the final text, without explanation or markdown."
            )
        }
    }
}

fn or_fallback<'a>(description: &'a str, fallback: &'a str) -> &'a str {
    if description.trim().is_empty() {
        fallback
    } else {
        description
    }
}
