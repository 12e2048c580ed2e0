#[derive(Debug, Clone)]
pub enum Progress {
    StepStart { name: &'static str },
    StepFinish,

    PassesStart { total_passes: u64 },
    PassFinish,
    PassesFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn reporter_forwards_events_to_the_callback() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::PassesStart { total_passes } = event {
                seen.lock().unwrap().push(total_passes);
            }
        }));
        reporter.report(Progress::PassesStart { total_passes: 3 });
        reporter.report(Progress::PassFinish);
        drop(reporter);
        assert_eq!(seen.into_inner().unwrap(), vec![3]);
    }

    #[test]
    fn silent_reporter_ignores_events() {
        ProgressReporter::new().report(Progress::Message("ignored".to_string()));
    }
}
