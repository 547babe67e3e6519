//! Scripted Executor
//!
//! In-process [`SystemExecutor`] that records every command and answers from
//! registered rules. Used to exercise reconciliation logic without touching
//! the host.

use crate::domain::ports::{CommandOutput, SystemCommand, SystemExecutor};
use crate::error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

type Handler = Box<dyn Fn(&SystemCommand) -> CommandOutput + Send + Sync>;

struct Rule {
    program: String,
    args_prefix: Vec<String>,
    handler: Handler,
}

impl Rule {
    fn matches(&self, command: &SystemCommand) -> bool {
        command.program == self.program
            && command.args.len() >= self.args_prefix.len()
            && command
                .args
                .iter()
                .zip(&self.args_prefix)
                .all(|(a, p)| a == p)
    }
}

/// Executor that never spawns anything
///
/// Commands without a matching rule succeed with empty output. When several
/// rules match, the most recently registered one answers.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Vec<Rule>,
    calls: Mutex<Vec<SystemCommand>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call to `program` with `handler`
    pub fn on<F>(self, program: &str, handler: F) -> Self
    where
        F: Fn(&SystemCommand) -> CommandOutput + Send + Sync + 'static,
    {
        self.on_args(program, &[], handler)
    }

    /// Answer calls to `program` whose arguments start with `args_prefix`
    pub fn on_args<F>(mut self, program: &str, args_prefix: &[&str], handler: F) -> Self
    where
        F: Fn(&SystemCommand) -> CommandOutput + Send + Sync + 'static,
    {
        self.rules.push(Rule {
            program: program.to_string(),
            args_prefix: args_prefix.iter().map(|s| s.to_string()).collect(),
            handler: Box::new(handler),
        });
        self
    }

    /// Answer every call to `program` with a fixed output
    pub fn respond(self, program: &str, output: CommandOutput) -> Self {
        self.on(program, move |_| output.clone())
    }

    /// Every command seen so far, in order
    pub fn calls(&self) -> Vec<SystemCommand> {
        self.calls.lock().clone()
    }

    /// Commands seen for one program
    pub fn calls_to(&self, program: &str) -> Vec<SystemCommand> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.program == program)
            .cloned()
            .collect()
    }

    pub fn was_called(&self, program: &str) -> bool {
        self.calls.lock().iter().any(|c| c.program == program)
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

#[async_trait]
impl SystemExecutor for ScriptedExecutor {
    async fn run(&self, command: &SystemCommand) -> Result<CommandOutput> {
        self.calls.lock().push(command.clone());
        let output = self
            .rules
            .iter()
            .rev()
            .find(|r| r.matches(command))
            .map(|r| (r.handler)(command))
            .unwrap_or_default();
        Ok(output)
    }
}
