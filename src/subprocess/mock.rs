use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::error::ProcessError;
use super::runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner};

/// Scriptable runner for tests. Expectations are matched by program name and
/// an optional argument predicate; each expectation carries an ordered queue
/// of responses, with the final response repeating once the queue drains.
#[derive(Clone, Default)]
pub struct MockProcessRunner {
    expectations: Arc<Mutex<Vec<MockExpectation>>>,
    call_history: Arc<Mutex<Vec<ProcessCommand>>>,
}

struct MockExpectation {
    program: String,
    #[allow(clippy::type_complexity)]
    args_matcher: Option<Box<dyn Fn(&[String]) -> bool + Send + Sync>>,
    responses: Vec<ProcessOutput>,
    next: usize,
}

pub struct MockCommandConfig {
    runner: MockProcessRunner,
    expectation: MockExpectation,
}

fn output(code: i32, stdout: &str, stderr: &str) -> ProcessOutput {
    ProcessOutput {
        status: if code == 0 {
            ExitStatus::Success
        } else {
            ExitStatus::Error(code)
        },
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
        duration: Duration::from_millis(1),
    }
}

impl MockProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expect(&self, program: &str) -> MockCommandConfig {
        MockCommandConfig {
            runner: self.clone(),
            expectation: MockExpectation {
                program: program.to_string(),
                args_matcher: None,
                responses: Vec::new(),
                next: 0,
            },
        }
    }

    /// Number of recorded calls whose full argv satisfies `predicate`.
    pub fn calls_matching<F>(&self, predicate: F) -> usize
    where
        F: Fn(&ProcessCommand) -> bool,
    {
        self.call_history
            .lock()
            .unwrap()
            .iter()
            .filter(|cmd| predicate(cmd))
            .count()
    }

    pub fn call_history(&self) -> Vec<ProcessCommand> {
        self.call_history.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProcessRunner for MockProcessRunner {
    async fn run(&self, command: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        self.call_history.lock().unwrap().push(command.clone());

        let mut expectations = self.expectations.lock().unwrap();
        for expectation in expectations.iter_mut() {
            if expectation.program != command.program {
                continue;
            }
            if let Some(ref matcher) = expectation.args_matcher {
                if !matcher(&command.args) {
                    continue;
                }
            }

            // Empty queue means "always succeed with no output".
            if expectation.responses.is_empty() {
                return Ok(output(0, "", ""));
            }
            let index = expectation.next.min(expectation.responses.len() - 1);
            expectation.next += 1;
            return Ok(expectation.responses[index].clone());
        }

        Err(ProcessError::MockExpectationNotMet(format!(
            "no expectation for: {} {:?}",
            command.program, command.args
        )))
    }
}

impl MockCommandConfig {
    pub fn with_args<F>(mut self, matcher: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        self.expectation.args_matcher = Some(Box::new(matcher));
        self
    }

    /// Match commands whose argv contains every one of `parts`.
    pub fn with_args_containing(self, parts: &[&str]) -> Self {
        let parts: Vec<String> = parts.iter().map(|s| s.to_string()).collect();
        self.with_args(move |args| parts.iter().all(|p| args.iter().any(|a| a == p)))
    }

    /// Queue a successful response with the given stdout.
    pub fn succeeds_with(mut self, stdout: &str) -> Self {
        self.expectation.responses.push(output(0, stdout, ""));
        self
    }

    pub fn succeeds(self) -> Self {
        self.succeeds_with("")
    }

    /// Queue a failing response with the given exit code and stderr.
    pub fn fails(mut self, code: i32, stderr: &str) -> Self {
        self.expectation.responses.push(output(code, "", stderr));
        self
    }

    pub fn finish(self) {
        self.runner
            .expectations
            .lock()
            .unwrap()
            .push(self.expectation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subprocess::ProcessCommandBuilder;

    #[tokio::test]
    async fn matches_by_program_and_args() {
        let mock = MockProcessRunner::new();
        mock.expect("gcloud")
            .with_args_containing(&["projects", "create"])
            .succeeds_with("created")
            .finish();

        let cmd = ProcessCommandBuilder::new("gcloud")
            .args(["projects", "create", "demo-1"])
            .build();
        let out = mock.run(cmd).await.unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "created");
    }

    #[tokio::test]
    async fn responses_drain_in_order_then_repeat() {
        let mock = MockProcessRunner::new();
        mock.expect("gcloud")
            .fails(1, "rate limit")
            .fails(1, "rate limit")
            .succeeds_with("done")
            .finish();

        let cmd = ProcessCommandBuilder::new("gcloud").build();
        assert!(!mock.run(cmd.clone()).await.unwrap().success());
        assert!(!mock.run(cmd.clone()).await.unwrap().success());
        assert!(mock.run(cmd.clone()).await.unwrap().success());
        // Queue exhausted: final response repeats.
        assert!(mock.run(cmd).await.unwrap().success());
    }

    #[tokio::test]
    async fn unmatched_command_errors() {
        let mock = MockProcessRunner::new();
        let cmd = ProcessCommandBuilder::new("kubectl").build();
        let err = mock.run(cmd).await.unwrap_err();
        assert!(matches!(err, ProcessError::MockExpectationNotMet(_)));
    }

    #[tokio::test]
    async fn records_call_history() {
        let mock = MockProcessRunner::new();
        mock.expect("gcloud").succeeds().finish();

        let cmd = ProcessCommandBuilder::new("gcloud")
            .args(["services", "enable", "iam.googleapis.com"])
            .build();
        mock.run(cmd).await.unwrap();

        assert_eq!(
            mock.calls_matching(|c| c.args.iter().any(|a| a == "enable")),
            1
        );
        assert_eq!(mock.call_history().len(), 1);
    }
}
