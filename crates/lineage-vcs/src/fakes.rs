//! In-memory command runner (testing only)
//!
//! `ScriptedRunner` answers invocations with canned output keyed by an
//! argument subsequence, so parsers and engines can be driven without a
//! real repository.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::VcsResult;
use crate::runner::{CommandOutput, CommandRunner, Invocation};

#[derive(Debug)]
struct Script {
    needle: Vec<String>,
    outputs: Vec<CommandOutput>,
    served: usize,
}

/// Canned-output [`CommandRunner`].
///
/// Each rule matches when its needle appears as a contiguous run inside the
/// invocation's arguments; the first matching rule wins. Queued outputs are
/// served in order and the last one repeats. An unmatched invocation exits
/// with code 128, like git refusing an unknown revision.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    scripts: Mutex<Vec<Script>>,
    calls: Mutex<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer invocations containing `needle` with `output`.
    pub fn on(self, needle: &[&str], output: CommandOutput) -> Self {
        self.push(needle, output);
        self
    }

    /// Queue another output for `needle` (by-reference variant of [`Self::on`]).
    pub fn push(&self, needle: &[&str], output: CommandOutput) {
        let needle: Vec<String> = needle.iter().map(|s| s.to_string()).collect();
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.iter_mut().find(|s| s.needle == needle) {
            Some(script) => script.outputs.push(output),
            None => scripts.push(Script {
                needle,
                outputs: vec![output],
                served: 0,
            }),
        }
    }

    /// Every invocation received so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of received invocations whose args contain `needle`.
    pub fn call_count(&self, needle: &[&str]) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|inv| contains_run(&inv.args, needle))
            .count()
    }
}

fn contains_run<S: AsRef<str>>(args: &[String], needle: &[S]) -> bool {
    if needle.is_empty() {
        return true;
    }
    args.windows(needle.len())
        .any(|w| w.iter().zip(needle).all(|(a, n)| a == n.as_ref()))
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, invocation: &Invocation) -> VcsResult<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        let mut scripts = self.scripts.lock().unwrap();
        let Some(script) = scripts
            .iter_mut()
            .find(|s| contains_run(&invocation.args, &s.needle))
        else {
            return Ok(CommandOutput::exited(
                128,
                Vec::new(),
                format!("unscripted invocation: {}", invocation.render()),
            ));
        };

        let index = script.served.min(script.outputs.len() - 1);
        script.served += 1;
        Ok(script.outputs[index].clone())
    }
}
