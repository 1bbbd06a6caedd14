//! Local CLI binary invoked per-request instead of an upstream HTTP call.
//!
//! The request body is handed to the process on stdin as JSON and its stdout
//! is taken verbatim as the response body. This runs on `local_response`,
//! which core calls synchronously from inside its async retry loop, so the
//! blocking `Command::output()` call below parks the current tokio worker
//! thread for the duration of the subprocess. That's an accepted tradeoff
//! here: making the hook asynchronous would change the signature every other
//! provider implements.

use std::io::IsTerminal;
use std::path::{Component, Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value as JsonValue;

use spx_provider_core::{
    Credential, DispatchRule, DispatchTable, GenerateContentRequest, Headers, ProviderConfig,
    ProviderError, ProviderResult, Request, UpstreamBody, UpstreamCtx, UpstreamHttpResponse,
    UpstreamProvider, header_set,
};

const PROVIDER_NAME: &str = "local_process";

/// Flag injected when stdout/stdin aren't attached to a controlling terminal,
/// mirroring how interactive CLIs are told to stop prompting when scripted.
const NO_TTY_FLAG: &str = "--dangerously-skip-permissions";

const DISPATCH_TABLE: DispatchTable = DispatchTable::new([
    DispatchRule::Native, // ClaudeGenerate
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported, // GeminiGenerate
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported, // OpenAIChatGenerate
    DispatchRule::Unsupported,
    DispatchRule::Unsupported, // OpenAIResponseGenerate
    DispatchRule::Unsupported,
    DispatchRule::Unsupported, // OpenAIInputTokens
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
    DispatchRule::Unsupported, // OAuthStart
    DispatchRule::Unsupported,
    DispatchRule::Unsupported,
]);

#[derive(Debug, Default)]
pub struct LocalProcessProvider;

impl LocalProcessProvider {
    pub fn new() -> Self {
        Self
    }
}

fn process_config(
    config: &ProviderConfig,
) -> ProviderResult<&spx_provider_core::config::LocalProcessConfig> {
    match config {
        ProviderConfig::LocalProcess(cfg) => Ok(cfg),
        _ => Err(ProviderError::InvalidConfig(
            "expected ProviderConfig::LocalProcess".to_string(),
        )),
    }
}

/// Lexically resolves `.`/`..` components without touching the filesystem,
/// collapsing `a/b/../c` to `a/c` the same way a shell would.
fn normalize_components(path: &Path) -> Vec<Component<'_>> {
    let mut out: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.last(), Some(Component::Normal(_))) {
                    out.pop();
                } else {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Walks every string leaf of a JSON value and rejects any that look like a
/// filesystem path resolving outside `root` once joined to it.
fn check_path_sandbox(value: &JsonValue, root: &Path) -> ProviderResult<()> {
    match value {
        JsonValue::String(s) => {
            if looks_like_path(s) {
                let candidate = if Path::new(s).is_absolute() {
                    PathBuf::from(s)
                } else {
                    root.join(s)
                };
                let root_norm = normalize_components(root);
                let candidate_norm = normalize_components(&candidate);
                let escapes = candidate_norm.len() < root_norm.len()
                    || candidate_norm[..root_norm.len()] != root_norm[..];
                if escapes {
                    return Err(ProviderError::InvalidConfig(format!(
                        "attachment path escapes sandbox root: {s}"
                    )));
                }
            }
            Ok(())
        }
        JsonValue::Array(items) => {
            for item in items {
                check_path_sandbox(item, root)?;
            }
            Ok(())
        }
        JsonValue::Object(map) => {
            for item in map.values() {
                check_path_sandbox(item, root)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn looks_like_path(s: &str) -> bool {
    s.contains('/') && (s.starts_with('/') || s.starts_with('.') || s.contains("../"))
}

#[async_trait::async_trait]
impl UpstreamProvider for LocalProcessProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn dispatch_table(&self, _config: &ProviderConfig) -> DispatchTable {
        DISPATCH_TABLE
    }

    fn local_response(
        &self,
        _ctx: &UpstreamCtx,
        config: &ProviderConfig,
        _credential: &Credential,
        req: &Request,
    ) -> ProviderResult<Option<UpstreamHttpResponse>> {
        let Request::GenerateContent(GenerateContentRequest::Claude(claude_req)) = req else {
            return Ok(None);
        };
        let cfg = process_config(config)?;

        let request_json = serde_json::to_value(&claude_req.body)
            .map_err(|err| ProviderError::Other(err.to_string()))?;

        let working_dir = cfg
            .working_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        check_path_sandbox(&request_json, &working_dir)?;

        let stdin_payload = serde_json::to_vec(&request_json)
            .map_err(|err| ProviderError::Other(err.to_string()))?;

        let mut command = Command::new(&cfg.binary);
        command
            .args(&cfg.base_args)
            .current_dir(&working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let attended = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
        if !attended {
            command.arg(NO_TTY_FLAG);
        }

        let mut child = command
            .spawn()
            .map_err(|err| ProviderError::Other(format!("spawn {}: {err}", cfg.binary)))?;

        {
            use std::io::Write;
            let mut stdin = child.stdin.take().ok_or_else(|| {
                ProviderError::Other("failed to open child stdin".to_string())
            })?;
            stdin
                .write_all(&stdin_payload)
                .map_err(|err| ProviderError::Other(err.to_string()))?;
        }

        let timeout = Duration::from_secs(cfg.timeout_secs);
        let output = wait_with_timeout(child, timeout)
            .map_err(|err| ProviderError::Other(format!("{}: {err}", cfg.binary)))?;

        if !output.status.success() {
            return Err(ProviderError::Other(format!(
                "{} exited with {}: {}",
                cfg.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let mut headers: Headers = Vec::new();
        header_set(&mut headers, "Content-Type", "application/json");
        Ok(Some(UpstreamHttpResponse {
            status: 200,
            headers,
            body: UpstreamBody::Bytes(Bytes::from(output.stdout)),
        }))
    }
}

/// `std::process::Child` has no built-in wait-with-timeout; poll at a short
/// interval and kill on expiry rather than pull in a new dependency for it.
fn wait_with_timeout(
    mut child: std::process::Child,
    timeout: Duration,
) -> std::io::Result<std::process::Output> {
    let start = std::time::Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            let mut stdout = Vec::new();
            let mut stderr = Vec::new();
            if let Some(mut out) = child.stdout.take() {
                use std::io::Read;
                let _ = out.read_to_end(&mut stdout);
            }
            if let Some(mut err) = child.stderr.take() {
                use std::io::Read;
                let _ = err.read_to_end(&mut stderr);
            }
            return Ok(std::process::Output {
                status,
                stdout,
                stderr,
            });
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "process timed out",
            ));
        }
        std::thread::sleep(Duration::from_millis(25));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_path_escaping_root() {
        let root = Path::new("/tmp/sandbox");
        let value = serde_json::json!({ "attachment": "../../etc/passwd" });
        assert!(check_path_sandbox(&value, root).is_err());
    }

    #[test]
    fn allows_path_within_root() {
        let root = Path::new("/tmp/sandbox");
        let value = serde_json::json!({ "attachment": "./notes/todo.txt" });
        assert!(check_path_sandbox(&value, root).is_ok());
    }

    #[test]
    fn ignores_non_path_strings() {
        let root = Path::new("/tmp/sandbox");
        let value = serde_json::json!({ "prompt": "hello there" });
        assert!(check_path_sandbox(&value, root).is_ok());
    }
}
