//! Vantage inspect: process-runner seam and out-of-band harvest of container
//! environment variables from the container runtime.

#![forbid(unsafe_code)]

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use vantage_core::EnvVar;

/// What to launch. The argv shape (no shell) is the observable contract.
#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub exe: String,
    pub argv: Vec<String>,
    /// Take the whole process tree down when the run is abandoned.
    pub kill_tree: bool,
}

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Launches short-lived helper processes. Dropping the in-flight future kills
/// the child, so a timeout or cancellation releases the subprocess.
#[async_trait::async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput>;
}

/// Default runner backed by tokio's process support.
pub struct TokioRunner;

#[async_trait::async_trait]
impl ProcessRunner for TokioRunner {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput> {
        let mut cmd = tokio::process::Command::new(&spec.exe);
        cmd.args(&spec.argv)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        let out = cmd
            .output()
            .await
            .with_context(|| format!("spawning {}", spec.exe))?;
        Ok(ProcessOutput {
            exit_code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

pub fn docker_bin() -> String {
    std::env::var("VANTAGE_DOCKER_BIN").unwrap_or_else(|_| "docker".to_string())
}

/// How long one inspect invocation may take before it is abandoned.
pub fn inspect_timeout() -> Duration {
    let secs: u64 = std::env::var("VANTAGE_INSPECT_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);
    Duration::from_secs(secs)
}

/// The one runtime command this system ever issues.
pub fn inspect_spec(container_id: &str) -> ProcessSpec {
    ProcessSpec {
        exe: docker_bin(),
        argv: vec![
            "container".to_string(),
            "inspect".to_string(),
            "--format={{json .Config.Env}}".to_string(),
            container_id.to_string(),
        ],
        kill_tree: true,
    }
}

/// Read `Config.Env` for a container out of the runtime.
pub async fn inspect_env(runner: &dyn ProcessRunner, container_id: &str) -> Result<Vec<EnvVar>> {
    let spec = inspect_spec(container_id);
    debug!(container_id, exe = %spec.exe, "inspecting container env");
    let out = runner.run(&spec).await?;
    match out.exit_code {
        Some(0) => {}
        code => {
            return Err(anyhow!(
                "inspect exited with {:?}: {}",
                code,
                out.stderr.trim()
            ))
        }
    }
    let body = out.stdout.trim();
    if body.is_empty() {
        return Err(anyhow!("inspect printed no output"));
    }
    parse_env_json(body)
}

/// Parse a JSON array of `"KEY=VALUE"` strings, splitting on the first `=`.
pub fn parse_env_json(json: &str) -> Result<Vec<EnvVar>> {
    let entries: Vec<String> = serde_json::from_str(json).context("parsing runtime env output")?;
    Ok(entries
        .iter()
        .map(|e| match e.split_once('=') {
            Some((name, value)) => EnvVar::new(name, value),
            None => EnvVar { name: Some(e.clone()), value: None },
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_env_array_splitting_on_first_equals() {
        let env = parse_env_json(r#"["PATH=/usr/bin","OPTS=a=b=c","FLAG"]"#).expect("parses");
        assert_eq!(env[0], EnvVar::new("PATH", "/usr/bin"));
        assert_eq!(env[1], EnvVar::new("OPTS", "a=b=c"));
        assert_eq!(env[2], EnvVar { name: Some("FLAG".into()), value: None });
    }

    #[test]
    fn rejects_non_array_output() {
        assert!(parse_env_json("null").is_err());
        assert!(parse_env_json(r#"{"PATH":"/usr/bin"}"#).is_err());
        assert!(parse_env_json("").is_err());
    }

    #[test]
    fn inspect_spec_addresses_one_container() {
        let spec = inspect_spec("abc123");
        assert_eq!(spec.argv.last().map(String::as_str), Some("abc123"));
        assert!(spec.argv.iter().any(|a| a.contains(".Config.Env")));
    }

    #[tokio::test]
    async fn tokio_runner_collects_stdout_and_exit_code() {
        let out = TokioRunner
            .run(&ProcessSpec {
                exe: "sh".into(),
                argv: vec!["-c".into(), "printf hello".into()],
                kill_tree: false,
            })
            .await
            .expect("sh runs");
        assert_eq!(out.exit_code, Some(0));
        assert_eq!(out.stdout, "hello");
    }

    #[tokio::test]
    async fn tokio_runner_reports_nonzero_exit() {
        let out = TokioRunner
            .run(&ProcessSpec {
                exe: "sh".into(),
                argv: vec!["-c".into(), "echo oops >&2; exit 3".into()],
                kill_tree: false,
            })
            .await
            .expect("sh runs");
        assert_eq!(out.exit_code, Some(3));
        assert_eq!(out.stderr.trim(), "oops");
    }

    struct Canned(ProcessOutput);

    #[async_trait::async_trait]
    impl ProcessRunner for Canned {
        async fn run(&self, _spec: &ProcessSpec) -> Result<ProcessOutput> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn inspect_env_happy_path() {
        let runner = Canned(ProcessOutput {
            exit_code: Some(0),
            stdout: "[\"A=1\",\"B=2\"]\n".into(),
            stderr: String::new(),
        });
        let env = inspect_env(&runner, "id").await.expect("parses");
        assert_eq!(env, vec![EnvVar::new("A", "1"), EnvVar::new("B", "2")]);
    }

    #[tokio::test]
    async fn inspect_env_rejects_failure_and_empty_output() {
        let failed = Canned(ProcessOutput {
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "no such container".into(),
        });
        assert!(inspect_env(&failed, "id").await.is_err());

        let empty = Canned(ProcessOutput {
            exit_code: Some(0),
            stdout: "  \n".into(),
            stderr: String::new(),
        });
        assert!(inspect_env(&empty, "id").await.is_err());
    }
}
