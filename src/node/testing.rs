//! Scripted runner for tests
//!
//! Replays queued outputs in order and records every invocation it receives.

use super::runner::{CommandOutput, CommandRunner, Invocation};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

type Scripted = Result<CommandOutput, String>;

#[derive(Default)]
pub struct ScriptedRunner {
    responses: Mutex<VecDeque<Scripted>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, response: Scripted) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, String> {
        self.invocations.lock().unwrap().push(invocation.clone());
        // An exhausted script behaves like a silent process.
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(CommandOutput {
                code: Some(0),
                ..CommandOutput::default()
            }))
    }
}

pub fn output(code: Option<i32>, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

pub fn ok(stdout: &str) -> Scripted {
    Ok(output(Some(0), stdout, ""))
}

pub fn exit(code: i32, stderr: &str) -> Scripted {
    Ok(output(Some(code), "", stderr))
}

pub fn spawn_error(reason: &str) -> Scripted {
    Err(reason.to_string())
}
