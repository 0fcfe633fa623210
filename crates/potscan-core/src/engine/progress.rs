/// Events emitted while a workflow runs.
#[derive(Debug, Clone)]
pub enum Progress {
    /// A job starts evaluating `total_frames` frames.
    JobStart { name: String, total_frames: u64 },
    /// One frame of the current job was evaluated. `energies` holds the
    /// values written for the frame, in kJ/mol.
    FrameEvaluated { index: usize, energies: Vec<f64> },
    JobFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

/// Forwards [`Progress`] events to an optional callback.
#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    /// A reporter that drops every event.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    pub fn message(&self, text: impl Into<String>) {
        self.report(Progress::Message(text.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reporter_forwards_events_to_callback() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::Message(text) = event {
                seen.lock().unwrap().push(text);
            }
        }));
        reporter.message("hello");
        reporter.report(Progress::JobFinish);
        drop(reporter);
        assert_eq!(seen.into_inner().unwrap(), vec!["hello".to_string()]);
    }

    #[test]
    fn default_reporter_ignores_events() {
        ProgressReporter::new().report(Progress::JobFinish);
    }
}
