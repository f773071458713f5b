//! Scripted fakes for the process facility (testing only)
//!
//! `ScriptedRunner` answers each [`CommandSpec`] with a canned
//! [`ProcessOutput`] chosen by the first matching rule, and records every call
//! so tests can assert how often a tool was actually invoked.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::deadline::Deadline;
use crate::error::Result;
use crate::process::{CommandRunner, CommandSpec, ProcessOutput};

struct Rule {
    program: String,
    needle: Option<String>,
    responses: VecDeque<ProcessOutput>,
}

impl Rule {
    fn matches(&self, cmd: &CommandSpec) -> bool {
        if cmd.program != self.program {
            return false;
        }
        match &self.needle {
            Some(needle) => cmd.args.iter().any(|a| a.contains(needle.as_str())),
            None => true,
        }
    }

    /// Pops scripted responses in order; the last one repeats.
    fn next(&mut self) -> ProcessOutput {
        if self.responses.len() > 1 {
            self.responses.pop_front().unwrap_or_else(ProcessOutput::timed_out)
        } else {
            self.responses
                .front()
                .cloned()
                .unwrap_or_else(ProcessOutput::timed_out)
        }
    }
}

/// [`CommandRunner`] that replays scripted outputs.
///
/// Commands with no matching rule exit with code 127 and a
/// "command not found" message.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every invocation of `program` with `output`.
    pub fn on(self, program: &str, output: ProcessOutput) -> Self {
        self.push_rule(program, None, vec![output])
    }

    /// Answer invocations of `program` having an argument containing `needle`.
    pub fn on_arg(self, program: &str, needle: &str, output: ProcessOutput) -> Self {
        self.push_rule(program, Some(needle), vec![output])
    }

    /// Answer successive invocations with successive outputs (last repeats).
    pub fn on_sequence(self, program: &str, outputs: Vec<ProcessOutput>) -> Self {
        self.push_rule(program, None, outputs)
    }

    fn push_rule(self, program: &str, needle: Option<&str>, outputs: Vec<ProcessOutput>) -> Self {
        self.rules
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Rule {
                program: program.to_string(),
                needle: needle.map(str::to_string),
                responses: outputs.into(),
            });
        self
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of invocations of `program`.
    pub fn call_count(&self, program: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.program == program)
            .count()
    }

    /// Number of invocations of `program` with an argument containing `needle`.
    pub fn call_count_with_arg(&self, program: &str, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.program == program && c.args.iter().any(|a| a.contains(needle)))
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, cmd: &CommandSpec, deadline: Deadline) -> Result<ProcessOutput> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(cmd.clone());

        if deadline.is_expired() {
            return Ok(ProcessOutput::timed_out());
        }

        let mut rules = self.rules.lock().unwrap_or_else(PoisonError::into_inner);
        match rules.iter_mut().find(|r| r.matches(cmd)) {
            Some(rule) => Ok(rule.next()),
            None => Ok(ProcessOutput::failed(
                127,
                "",
                format!("{}: command not found", cmd.program),
            )),
        }
    }
}
