use fail::FailScenario;

/// Configures failpoints for the life of the value and turns them off again on drop.
pub struct SyncFailScenario<'a> {
    _scenario: FailScenario<'a>,
    failpoints: Vec<String>,
}

impl<'a> SyncFailScenario<'a> {
    /// Applies each `(failpoint, action)` pair, e.g. `("worker.before_bulk_write", "1*return")`.
    pub fn setup(failpoints: &[(&str, &str)]) -> SyncFailScenario<'a> {
        let scenario = FailScenario::setup();

        for (failpoint, action) in failpoints {
            fail::cfg(*failpoint, action).unwrap();
        }

        Self {
            _scenario: scenario,
            failpoints: failpoints
                .iter()
                .map(|(failpoint, _)| failpoint.to_string())
                .collect(),
        }
    }

    pub fn teardown(self) {
        drop(self);
    }
}

impl Drop for SyncFailScenario<'_> {
    fn drop(&mut self) {
        for failpoint in &self.failpoints {
            let _ = fail::cfg(failpoint.as_str(), "off");
        }
    }
}
