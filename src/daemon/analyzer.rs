use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::DiveInError;
use crate::models::SourceKind;

/// Runs the external analysis tool.
///
/// Implementations return the raw JSON report on success. Failures are
/// `Tool` or `Timeout` errors whose message is shown to the user as-is.
#[async_trait]
pub trait AnalysisRunner: Send + Sync {
    async fn run(
        &self,
        source: SourceKind,
        target: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, DiveInError>;

    /// Whether the tool can currently be located.
    fn is_available(&self) -> bool {
        true
    }
}

/// Invokes the `dive` CLI as `dive --source <source> <target> --json <file>`.
pub struct DiveCli {
    program: String,
}

impl DiveCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn locate(&self) -> Option<PathBuf> {
        locate_executable(&self.program)
    }
}

/// Resolve `program` to an executable path. Names without a directory part
/// are searched on `PATH`.
pub fn locate_executable(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.is_absolute() || candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }

    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(program))
        .find(|path| is_executable(path))
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Render a timeout the way it appears in failure messages, e.g. `5m` or `30s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if duration.subsec_millis() != 0 || secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[async_trait]
impl AnalysisRunner for DiveCli {
    async fn run(
        &self,
        source: SourceKind,
        target: &str,
        timeout: Duration,
    ) -> Result<Vec<u8>, DiveInError> {
        let program = self
            .locate()
            .ok_or_else(|| DiveInError::Tool("Dive binary not found in PATH".to_string()))?;

        // Removed when dropped, on every return path below.
        let output_file = tempfile::Builder::new()
            .prefix("dive-result-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| {
                DiveInError::Internal(format!("Failed to prepare analysis output: {}", e))
            })?;
        let output_path = output_file.path().to_path_buf();

        let mut command = tokio::process::Command::new(&program);
        command
            .arg("--source")
            .arg(source.as_str())
            .arg(target)
            .arg("--json")
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            "Running {} --source {} {} --json {}",
            program.display(),
            source,
            target,
            output_path.display()
        );

        let child = command
            .spawn()
            .map_err(|e| DiveInError::Tool(format!("Dive failed: {}", e)))?;

        // On timeout the child is dropped with the future and killed.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Err(_) => {
                return Err(DiveInError::Timeout(format!(
                    "Dive timed out after {}",
                    format_duration(timeout)
                )))
            }
            Ok(Err(e)) => return Err(DiveInError::Tool(format!("Dive failed: {}", e))),
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let mut combined = output.stdout;
            combined.extend_from_slice(&output.stderr);
            let text = String::from_utf8_lossy(&combined);
            let message = match text.trim() {
                "" => output.status.to_string(),
                trimmed => trimmed.to_string(),
            };
            return Err(DiveInError::Tool(format!("Dive failed: {}", message)));
        }

        let report = tokio::fs::read(&output_path).await.map_err(|e| {
            DiveInError::Tool(format!("Failed to read analysis output: {}", e))
        })?;
        if serde_json::from_slice::<serde::de::IgnoredAny>(&report).is_err() {
            return Err(DiveInError::Tool(
                "Dive output was not valid JSON".to_string(),
            ));
        }

        Ok(report)
    }

    fn is_available(&self) -> bool {
        self.locate().is_some()
    }
}
