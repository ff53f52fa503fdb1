//! Progress reporting for polling clients

use evote_saga_types::{ElectionStep, Progress, WorkflowContext};

/// Progress of a saga positioned at `step`.
pub fn progress_for_step(step: ElectionStep) -> Progress {
    let percent = u16::from(step.ordinal()) * 100 / u16::from(ElectionStep::Finish.ordinal());
    Progress {
        percent: u8::try_from(percent).unwrap_or(100),
        is_terminal: step.is_terminal(),
    }
}

/// Progress of a saga; reads the step cursor only.
pub fn progress(context: &WorkflowContext) -> Progress {
    progress_for_step(context.step)
}
