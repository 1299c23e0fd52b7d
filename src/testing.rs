//! Scripted command runner for unit tests

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Mutex;

use crate::process::{CommandOutput, CommandRunner};

enum Scripted {
    Output(CommandOutput),
    SpawnError(String),
}

struct Rule {
    program: String,
    args_prefix: Vec<String>,
    response: Scripted,
}

/// A `CommandRunner` that replays canned responses and records every call.
///
/// Rules are matched first-to-last on program name plus an argument prefix;
/// unmatched calls succeed with empty output so tests only script the
/// commands they care about.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, program: &str, args_prefix: &[&str], output: CommandOutput) {
        self.rules.lock().unwrap().push(Rule {
            program: program.to_string(),
            args_prefix: args_prefix.iter().map(|s| s.to_string()).collect(),
            response: Scripted::Output(output),
        });
    }

    /// Simulate the binary not existing at all
    pub fn fail_to_spawn(&self, program: &str) {
        self.rules.lock().unwrap().push(Rule {
            program: program.to_string(),
            args_prefix: Vec::new(),
            response: Scripted::SpawnError(format!("No such file or directory: {program}")),
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.contains(needle))
            .count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(
        &self,
        program: &str,
        args: &[&str],
        _cwd: Option<&Path>,
    ) -> Result<CommandOutput> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", program, args.join(" ")));

        let rules = self.rules.lock().unwrap();
        for rule in rules.iter() {
            if rule.program != program {
                continue;
            }
            let prefix: Vec<&str> = rule.args_prefix.iter().map(String::as_str).collect();
            if args.len() < prefix.len() || args[..prefix.len()] != prefix[..] {
                continue;
            }
            return match &rule.response {
                Scripted::Output(output) => Ok(output.clone()),
                Scripted::SpawnError(message) => bail!("{message}"),
            };
        }

        Ok(CommandOutput::ok(""))
    }
}
