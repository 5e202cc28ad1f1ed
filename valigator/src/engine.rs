//! Invocation of the Spectral linting engine as a subprocess.
//!
//! Exit status policy:
//! - `0`: the document is clean.
//! - `1`: the engine ran and reported findings. This is a successful run and
//!   its report is returned.
//! - anything else, termination by signal, or failure to launch: the run
//!   failed and no report is produced.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::config::{OutputMode, ValigatorConfig};
use crate::error::LintError;
use crate::format::OutputFormat;
use crate::report::strip_banner;

/// Options for one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintInvocation {
    /// Staged document, passed as the last positional argument.
    pub document: PathBuf,
    /// Value for `--ruleset`.
    pub ruleset: String,
    pub format: OutputFormat,
    /// One `--skip-rule` pair is emitted per entry, in order.
    pub skip_rules: Vec<String>,
    pub display_only_failures: bool,
}

impl LintInvocation {
    /// Report file used in [`OutputMode::File`]: the staged document's path
    /// with a `.report.<format>` extension.
    #[must_use]
    pub fn output_path(&self) -> PathBuf {
        self.document
            .with_extension(format!("report.{}", self.format.extension()))
    }

    /// Command line arguments for the engine, without the program name.
    #[must_use]
    pub fn to_args(&self, mode: OutputMode) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "lint".into(),
            "--ruleset".into(),
            self.ruleset.clone().into(),
            "--format".into(),
            self.format.engine_name().into(),
        ];
        for rule in &self.skip_rules {
            args.push("--skip-rule".into());
            args.push(rule.clone().into());
        }
        if self.display_only_failures {
            args.push("--display-only-failures".into());
        }
        if mode == OutputMode::File {
            args.push("--output".into());
            args.push(self.output_path().into_os_string());
            args.push("--quiet".into());
        }
        args.push(self.document.clone().into_os_string());
        args
    }
}

/// How an engine exit status is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    Clean,
    FindingsPresent,
    Failed,
}

/// Classify an exit code; `None` means the process was killed by a signal.
#[must_use]
pub const fn classify_exit(code: Option<i32>) -> ExitClass {
    match code {
        Some(0) => ExitClass::Clean,
        Some(1) => ExitClass::FindingsPresent,
        _ => ExitClass::Failed,
    }
}

/// A report produced by a successful engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LintOutcome {
    /// Exit code 0.
    Clean(String),
    /// Exit code 1: the report lists the findings.
    FindingsPresent(String),
}

impl LintOutcome {
    #[must_use]
    pub fn report(&self) -> &str {
        match self {
            Self::Clean(report) | Self::FindingsPresent(report) => report,
        }
    }

    #[must_use]
    pub fn into_report(self) -> String {
        match self {
            Self::Clean(report) | Self::FindingsPresent(report) => report,
        }
    }

    #[must_use]
    pub const fn has_findings(&self) -> bool {
        matches!(self, Self::FindingsPresent(_))
    }
}

/// Handle to the engine executable.
#[derive(Debug, Clone)]
pub struct Spectral {
    program: PathBuf,
    mode: OutputMode,
    timeout: Option<Duration>,
}

impl Spectral {
    /// Engine at `program`, capturing standard output, without a deadline.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            mode: OutputMode::Stdout,
            timeout: None,
        }
    }

    #[must_use]
    pub fn from_config(config: &ValigatorConfig) -> Self {
        Self::new(&config.spectral_path)
            .with_mode(config.output_mode)
            .with_timeout(config.lint_timeout())
    }

    #[must_use]
    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    #[must_use]
    pub const fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Run the engine for one document and return its filtered report.
    ///
    /// The child process is killed if this future is dropped or the deadline
    /// passes. In file mode the report file is removed before returning,
    /// whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns a [`LintError`] when the engine cannot be launched, exits with
    /// a code other than 0 or 1, exceeds the deadline, or (in file mode) does
    /// not leave a readable report file.
    pub async fn lint(&self, invocation: &LintInvocation) -> Result<LintOutcome, LintError> {
        let args = invocation.to_args(self.mode);
        let command_line = display_command(&self.program, &args);
        tracing::info!(command = %command_line, "Linting request");

        let report_file = (self.mode == OutputMode::File)
            .then(|| ReportFile::new(invocation.output_path()));

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                tracing::error!(command = %command_line, error = %source, "Failed to launch engine");
                LintError::Launch {
                    program: self.program.clone(),
                    source,
                }
            })?;

        let waited = if let Some(limit) = self.timeout {
            // Dropping the child on expiry kills it.
            let Ok(waited) = tokio::time::timeout(limit, child.wait_with_output()).await else {
                tracing::error!(command = %command_line, timeout_secs = limit.as_secs(), "Engine timed out and was killed");
                return Err(LintError::Timeout(limit));
            };
            waited
        } else {
            child.wait_with_output().await
        };
        let output = waited.map_err(|e| {
            tracing::error!(command = %command_line, error = %e, "Failed waiting for engine");
            LintError::Wait(e)
        })?;

        let code = output.status.code();
        let findings = match classify_exit(code) {
            ExitClass::Clean => false,
            ExitClass::FindingsPresent => {
                tracing::info!(ruleset = %invocation.ruleset, "Engine reported findings");
                true
            }
            ExitClass::Failed => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
                tracing::error!(command = %command_line, code = ?code, stderr = %stderr, "Engine run failed");
                return Err(LintError::Exit { code, stderr });
            }
        };

        let raw = if let Some(file) = report_file {
            let read = file.read().await;
            file.remove().await;
            read.inspect_err(|e| {
                tracing::error!(command = %command_line, error = %e, "Engine output file missing");
            })?
        } else {
            String::from_utf8_lossy(&output.stdout).into_owned()
        };
        let report = strip_banner(&raw);

        Ok(if findings {
            LintOutcome::FindingsPresent(report)
        } else {
            LintOutcome::Clean(report)
        })
    }
}

/// Engine output file. [`ReportFile::remove`] deletes it once read; dropping
/// it unread (failed or cancelled runs) deletes it synchronously.
struct ReportFile {
    path: PathBuf,
    removed: bool,
}

impl ReportFile {
    const fn new(path: PathBuf) -> Self {
        Self {
            path,
            removed: false,
        }
    }

    async fn remove(mut self) {
        self.removed = true;
        if let Err(e) = tokio::fs::remove_file(&self.path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove engine output file");
        }
    }

    async fn read(&self) -> Result<String, LintError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| LintError::MissingOutput {
                path: self.path.clone(),
                source,
            })?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl Drop for ReportFile {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove engine output file");
        }
    }
}

fn display_command(program: &Path, args: &[OsString]) -> String {
    let mut line = program.to_string_lossy().into_owned();
    for arg in args {
        line.push(' ');
        line.push_str(&arg.to_string_lossy());
    }
    line
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn invocation() -> LintInvocation {
        LintInvocation {
            document: PathBuf::from("/tmp/doc.yml"),
            ruleset: "rulesets/v5.yaml".to_owned(),
            format: OutputFormat::Json,
            skip_rules: vec![],
            display_only_failures: false,
        }
    }

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_args_minimal() {
        let args = invocation().to_args(OutputMode::Stdout);
        assert_eq!(
            strings(&args),
            vec![
                "lint",
                "--ruleset",
                "rulesets/v5.yaml",
                "--format",
                "json",
                "/tmp/doc.yml"
            ]
        );
    }

    #[test]
    fn test_args_skip_rules_in_order_and_flags() {
        let mut inv = invocation();
        inv.format = OutputFormat::Html;
        inv.skip_rules = vec!["info-contact".to_owned(), "oas3-api-servers".to_owned()];
        inv.display_only_failures = true;

        let args = strings(&inv.to_args(OutputMode::Stdout));
        assert_eq!(
            args,
            vec![
                "lint",
                "--ruleset",
                "rulesets/v5.yaml",
                "--format",
                "html",
                "--skip-rule",
                "info-contact",
                "--skip-rule",
                "oas3-api-servers",
                "--display-only-failures",
                "/tmp/doc.yml"
            ]
        );
    }

    #[test]
    fn test_args_file_mode() {
        let args = strings(&invocation().to_args(OutputMode::File));
        assert_eq!(
            &args[5..],
            &["--output", "/tmp/doc.report.json", "--quiet", "/tmp/doc.yml"]
        );
        assert_eq!(args.last().map(String::as_str), Some("/tmp/doc.yml"));
    }

    #[test]
    fn test_classify_exit() {
        assert_eq!(classify_exit(Some(0)), ExitClass::Clean);
        assert_eq!(classify_exit(Some(1)), ExitClass::FindingsPresent);
        assert_eq!(classify_exit(Some(2)), ExitClass::Failed);
        assert_eq!(classify_exit(Some(-1)), ExitClass::Failed);
        assert_eq!(classify_exit(Some(127)), ExitClass::Failed);
        assert_eq!(classify_exit(None), ExitClass::Failed);
    }

    #[test]
    fn test_outcome_accessors() {
        let clean = LintOutcome::Clean("[]".to_owned());
        assert!(!clean.has_findings());
        assert_eq!(clean.report(), "[]");

        let findings = LintOutcome::FindingsPresent("[{}]".to_owned());
        assert!(findings.has_findings());
        assert_eq!(findings.into_report(), "[{}]");
    }

    #[tokio::test]
    async fn test_report_file_remove_after_read() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("doc.report.json");
        std::fs::write(&path, "[]").unwrap();

        let file = ReportFile::new(path.clone());
        assert_eq!(file.read().await.unwrap(), "[]");
        file.remove().await;
        assert!(!path.exists());

        // Removing an output the engine never wrote is not an error.
        ReportFile::new(path.clone()).remove().await;
    }

    #[test]
    fn test_report_file_drop_removes_unread_output() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("doc.report.html");
        std::fs::write(&path, "<html/>").unwrap();

        drop(ReportFile::new(path.clone()));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let spectral = Spectral::new(tmp.path().join("no-such-engine"));
        let err = spectral.lint(&invocation()).await.unwrap_err();
        assert!(matches!(err, LintError::Launch { .. }), "got: {err:?}");
    }

    #[cfg(unix)]
    mod fake_engine {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Write an executable shell script standing in for the engine.
        fn script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("spectral");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn staged(dir: &Path) -> LintInvocation {
            let document = dir.join("doc.yml");
            std::fs::write(&document, "openapi: 3.0.0\n").unwrap();
            LintInvocation {
                document,
                ..invocation()
            }
        }

        #[tokio::test]
        async fn test_exit_zero_is_clean() {
            let tmp = tempfile::TempDir::new().unwrap();
            let engine = script(tmp.path(), "echo '[]'\nexit 0");
            let outcome = Spectral::new(engine).lint(&staged(tmp.path())).await.unwrap();
            assert_eq!(outcome, LintOutcome::Clean("[]".to_owned()));
        }

        #[tokio::test]
        async fn test_exit_one_returns_findings_without_banner() {
            let tmp = tempfile::TempDir::new().unwrap();
            let engine = script(
                tmp.path(),
                "echo 'OpenAPI 2.0 (Swagger) detected'\necho '[{\"code\":\"info-contact\"}'\necho ']'\nexit 1",
            );
            let outcome = Spectral::new(engine).lint(&staged(tmp.path())).await.unwrap();
            assert_eq!(
                outcome,
                LintOutcome::FindingsPresent("[{\"code\":\"info-contact\"}]".to_owned())
            );
        }

        #[tokio::test]
        async fn test_other_exit_code_is_error() {
            let tmp = tempfile::TempDir::new().unwrap();
            let engine = script(tmp.path(), "echo 'partial'\necho 'bad ruleset' >&2\nexit 2");
            let err = Spectral::new(engine)
                .lint(&staged(tmp.path()))
                .await
                .unwrap_err();
            match err {
                LintError::Exit { code, stderr } => {
                    assert_eq!(code, Some(2));
                    assert_eq!(stderr, "bad ruleset");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_engine_receives_arguments() {
            let tmp = tempfile::TempDir::new().unwrap();
            let engine = script(tmp.path(), "printf '%s|' \"$@\"");
            let mut inv = staged(tmp.path());
            inv.skip_rules = vec!["r1".to_owned()];
            let outcome = Spectral::new(engine).lint(&inv).await.unwrap();
            let expected = format!(
                "lint|--ruleset|rulesets/v5.yaml|--format|json|--skip-rule|r1|{}|",
                inv.document.display()
            );
            assert_eq!(outcome.report(), expected);
        }

        #[tokio::test]
        async fn test_file_mode_reads_and_removes_output() {
            let tmp = tempfile::TempDir::new().unwrap();
            // $7 is the value following --output when no skip rules are set.
            let engine = script(
                tmp.path(),
                "echo 'OpenAPI 2.0 (Swagger) detected' > \"$7\"\necho '{\"ok\":true}' >> \"$7\"\necho 'ignored stdout'\nexit 1",
            );
            let inv = staged(tmp.path());
            let outcome = Spectral::new(engine)
                .with_mode(OutputMode::File)
                .lint(&inv)
                .await
                .unwrap();
            assert_eq!(
                outcome,
                LintOutcome::FindingsPresent("{\"ok\":true}".to_owned())
            );
            assert!(!inv.output_path().exists());
        }

        #[tokio::test]
        async fn test_file_mode_missing_output_is_error() {
            let tmp = tempfile::TempDir::new().unwrap();
            let engine = script(tmp.path(), "exit 0");
            let err = Spectral::new(engine)
                .with_mode(OutputMode::File)
                .lint(&staged(tmp.path()))
                .await
                .unwrap_err();
            assert!(matches!(err, LintError::MissingOutput { .. }), "got: {err:?}");
        }

        #[tokio::test]
        async fn test_timeout_kills_engine() {
            let tmp = tempfile::TempDir::new().unwrap();
            let engine = script(tmp.path(), "sleep 5");
            let err = Spectral::new(engine)
                .with_timeout(Some(Duration::from_millis(200)))
                .lint(&staged(tmp.path()))
                .await
                .unwrap_err();
            assert!(matches!(err, LintError::Timeout(_)), "got: {err:?}");
        }
    }
}
