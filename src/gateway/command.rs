//! Command gateway.
//!
//! Spawns a configured program per request. The request envelope is written
//! to the program's stdin as JSON; the reply is read from its stdout. Both
//! output pipes are drained on their own threads while the child runs, so a
//! large reply never stalls the program. The program is killed when it
//! exceeds the timeout.
//!
//! Envelope:
//!
//! ```json
//! {"request": "key_mapping", "payload": {...}, "system": "...", "prompt": "..."}
//! ```

use std::io::{ErrorKind, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::prompt::{category_prompt, key_mapping_prompt, mapping_proposal_prompt, SYSTEM_PROMPT};
use super::reply::{parse_category_reply, parse_key_suggestion, parse_mapping_proposal};
use super::traits::{
    CategorySuggestionRequest, KeySuggestionRequest, MappingProposal, MappingProposalRequest,
    SuggestionGateway,
};
use crate::core::Suggestion;
use crate::error::{ProdmapError, Result};

const GATEWAY_NAME: &str = "command";

#[derive(Serialize)]
struct Envelope<'a, P: Serialize> {
    request: &'a str,
    payload: &'a P,
    system: &'a str,
    prompt: String,
}

/// Gateway backed by an external program.
#[derive(Debug, Clone)]
pub struct CommandGateway {
    program: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl CommandGateway {
    /// Create a gateway from `[program, args...]`.
    ///
    /// # Errors
    ///
    /// Returns a config error if the command is empty.
    pub fn new(command: &[String], timeout: Option<Duration>) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .filter(|(program, _)| !program.trim().is_empty())
            .ok_or_else(|| ProdmapError::config("command gateway requires a program"))?;

        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    fn call<P: Serialize>(&self, request: &str, payload: &P, prompt: String) -> Result<String> {
        let envelope = Envelope {
            request,
            payload,
            system: SYSTEM_PROMPT,
            prompt,
        };
        let body = serde_json::to_vec(&envelope)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    ProdmapError::config(format!(
                        "gateway program '{}' not found",
                        self.program
                    ))
                } else {
                    ProdmapError::gateway_unavailable(
                        GATEWAY_NAME,
                        format!("failed to start '{}': {}", self.program, e),
                    )
                }
            })?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(&body) {
                // A program that ignores its input may close stdin early.
                tracing::debug!("gateway program closed stdin: {}", e);
            }
        }

        let status = match wait_timeout(&mut child, self.timeout) {
            Ok(status) => status,
            Err(e) => {
                let stderr = collect_if_finished(stderr);
                return Err(ProdmapError::gateway_unavailable(
                    GATEWAY_NAME,
                    format!("{}. stderr: {}", e, stderr.trim()),
                ));
            }
        };

        let stdout = collect(stdout);
        let stderr = collect(stderr);
        if !status.success() {
            return Err(ProdmapError::gateway_unavailable(
                GATEWAY_NAME,
                format!("'{}' exited with {}: {}", self.program, status, stderr.trim()),
            ));
        }

        Ok(stdout)
    }
}

/// Read a child pipe to the end on a background thread.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            if let Err(e) = pipe.read_to_end(&mut buf) {
                tracing::debug!("gateway pipe read failed: {}", e);
            }
            buf
        })
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    reader
        .and_then(|handle| handle.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

/// Collect a reader only if it is done; a grandchild may still hold the pipe.
fn collect_if_finished(reader: Option<JoinHandle<Vec<u8>>>) -> String {
    match reader {
        Some(handle) if handle.is_finished() => collect(Some(handle)),
        _ => String::new(),
    }
}

/// Wait for a child, killing it after `timeout`.
fn wait_timeout(
    child: &mut Child,
    timeout: Option<Duration>,
) -> std::result::Result<ExitStatus, String> {
    let Some(timeout) = timeout else {
        return child.wait().map_err(|e| e.to_string());
    };

    let start = Instant::now();
    loop {
        if let Some(status) = child
            .try_wait()
            .map_err(|e| format!("failed to poll child status: {e}"))?
        {
            return Ok(status);
        }

        if start.elapsed() > timeout {
            let _ = child.kill();
            let _ = child.wait();
            // Give the stderr reader a moment to see EOF.
            thread::sleep(Duration::from_millis(20));
            return Err(format!("timed out after {}ms", timeout.as_millis()));
        }

        thread::sleep(Duration::from_millis(20));
    }
}

impl SuggestionGateway for CommandGateway {
    fn name(&self) -> &'static str {
        GATEWAY_NAME
    }

    fn suggest_key_mapping(&self, request: &KeySuggestionRequest) -> Result<Suggestion> {
        let reply = self.call("key_mapping", request, key_mapping_prompt(request))?;
        parse_key_suggestion(GATEWAY_NAME, &reply)
    }

    fn suggest_category(&self, request: &CategorySuggestionRequest) -> Result<Option<String>> {
        let reply = self.call("category", request, category_prompt(request))?;
        parse_category_reply(GATEWAY_NAME, &reply)
    }

    fn propose_mapping(&self, request: &MappingProposalRequest) -> Result<MappingProposal> {
        let reply = self.call("mapping", request, mapping_proposal_prompt(request))?;
        parse_mapping_proposal(GATEWAY_NAME, &reply)
    }
}
