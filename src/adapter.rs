//! Session adapters: the control surface for reading and switching the
//! host session's active tier.
//!
//! The core engine only depends on the two-method [`SessionAdapter`]
//! capability. [`CommandAdapter`] reaches an out-of-process control
//! surface by shelling out to an external CLI; [`StaticAdapter`] is an
//! in-memory implementation for tests and embedders without one.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use tokio::process::Command;

use crate::error::{Error, Result};
use crate::tier::Tier;

/// Abstraction over the host session's tier control surface.
#[async_trait]
pub trait SessionAdapter: Send + Sync {
    /// Read the session's active tier. `Ok(None)` means the surface is
    /// reachable but the tier is unknown.
    async fn get_current_tier(&self) -> Result<Option<Tier>>;

    /// Switch the session to `tier`.
    async fn set_tier(&self, tier: Tier) -> Result<()>;
}

/// Configuration for [`CommandAdapter`].
#[derive(Debug, Clone)]
pub struct CommandAdapterConfig {
    /// Path to the control binary. Falls back to PATH lookup and common
    /// install locations.
    pub binary_path: Option<String>,
    /// Arguments for the tier read command.
    pub get_args: Vec<String>,
    /// Arguments for the tier write command; the tier name is appended.
    pub set_args: Vec<String>,
    /// Upper bound on each invocation.
    pub timeout: Duration,
}

impl Default for CommandAdapterConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            get_args: vec!["tier".into(), "get".into()],
            set_args: vec!["tier".into(), "set".into()],
            timeout: Duration::from_secs(10),
        }
    }
}

impl CommandAdapterConfig {
    /// Create configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            binary_path: std::env::var("TIERSWITCH_CTL_BINARY").ok(),
            timeout: std::env::var("TIERSWITCH_CTL_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_secs(10)),
            ..Default::default()
        }
    }
}

const DEFAULT_BINARY: &str = "sessionctl";

/// Adapter that shells out to an external command-line control tool.
///
/// Stdout is parsed as JSON first, then as `key=value`, then scanned for
/// a recognizable tier name. Parsing is a thin I/O detail; everything the
/// engine relies on is the [`SessionAdapter`] contract.
pub struct CommandAdapter {
    binary: String,
    config: CommandAdapterConfig,
}

impl CommandAdapter {
    /// Create an adapter, resolving the control binary now so a missing
    /// tool fails at construction.
    pub fn new(config: CommandAdapterConfig) -> Result<Self> {
        let binary = Self::find_binary(&config)?;
        Ok(Self { binary, config })
    }

    /// Create an adapter configured from the environment.
    pub fn from_env() -> Result<Self> {
        Self::new(CommandAdapterConfig::from_env())
    }

    fn find_binary(config: &CommandAdapterConfig) -> Result<String> {
        if let Some(path) = &config.binary_path {
            let expanded = shellexpand::tilde(path);
            return Ok(expanded.to_string());
        }

        if let Ok(path) = which::which(DEFAULT_BINARY) {
            return Ok(path.to_string_lossy().to_string());
        }

        let common_paths = [
            "/usr/local/bin/sessionctl",
            "/opt/homebrew/bin/sessionctl",
            "~/.local/bin/sessionctl",
        ];
        for path in common_paths {
            let expanded = shellexpand::tilde(path);
            if std::path::Path::new(expanded.as_ref()).exists() {
                return Ok(expanded.to_string());
            }
        }

        Err(Error::config(format!(
            "control binary not found. Set TIERSWITCH_CTL_BINARY or install {}.",
            DEFAULT_BINARY
        )))
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output> {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        tokio::time::timeout(self.config.timeout, command.output())
            .await
            .map_err(|_| Error::timeout(self.config.timeout.as_millis() as u64))?
            .map_err(|e| Error::adapter(format!("failed to run {}: {}", self.binary, e)))
    }
}

#[async_trait]
impl SessionAdapter for CommandAdapter {
    async fn get_current_tier(&self) -> Result<Option<Tier>> {
        let output = self.run(&self.config.get_args).await?;
        if !output.status.success() {
            return Err(Error::adapter(format!(
                "tier read exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(None);
        }
        parse_tier_output(&stdout)
            .map(Some)
            .ok_or_else(|| Error::adapter(format!("unparsable tier output: {:?}", stdout.trim())))
    }

    async fn set_tier(&self, tier: Tier) -> Result<()> {
        let mut args = self.config.set_args.clone();
        args.push(tier.as_str().to_string());

        let output = self.run(&args).await?;
        if !output.status.success() {
            return Err(Error::switch_failed(
                tier,
                format!(
                    "control command exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }
        Ok(())
    }
}

static KV_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?im)^\s*(?:current_|model_)?tier\s*[=:]\s*"?([a-z_-]+)"#)
        .expect("invalid regex")
});

/// Recover a tier from control-tool stdout: JSON payload first, then
/// `key=value`/`key: value`, then a bare tier name anywhere in the text.
fn parse_tier_output(stdout: &str) -> Option<Tier> {
    if let Ok(value) = serde_json::from_str::<Value>(stdout.trim()) {
        if let Some(tier) = tier_from_json(&value) {
            return Some(tier);
        }
    }

    if let Some(caps) = KV_PATTERN.captures(stdout) {
        if let Some(tier) = Tier::parse(&caps[1]) {
            return Some(tier);
        }
    }

    stdout.split_whitespace().find_map(Tier::parse)
}

fn tier_from_json(value: &Value) -> Option<Tier> {
    match value {
        Value::String(s) => Tier::parse(s),
        Value::Object(map) => ["tier", "current_tier", "model_tier", "current"]
            .iter()
            .find_map(|key| map.get(*key).and_then(tier_from_json)),
        _ => None,
    }
}

/// In-memory adapter for tests and embedders without a control surface.
///
/// Failure modes can be scripted to exercise the engine's degradation
/// paths, and call counts are tracked so tests can assert the no-I/O
/// fast path.
#[derive(Debug, Default)]
pub struct StaticAdapter {
    tier: Mutex<Option<Tier>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    get_calls: AtomicUsize,
    set_calls: AtomicUsize,
    history: Mutex<Vec<Tier>>,
}

impl StaticAdapter {
    /// Create an adapter reporting `tier`.
    pub fn new(tier: Tier) -> Self {
        Self {
            tier: Mutex::new(Some(tier)),
            ..Default::default()
        }
    }

    /// Create an adapter that reports an unknown tier.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// The tier the adapter currently holds.
    pub fn current(&self) -> Option<Tier> {
        *self.tier.lock().expect("tier lock poisoned")
    }

    /// Make subsequent reads fail.
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `get_current_tier` calls observed.
    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Number of `set_tier` calls observed.
    pub fn set_calls(&self) -> usize {
        self.set_calls.load(Ordering::SeqCst)
    }

    /// Every tier successfully written, in order.
    pub fn history(&self) -> Vec<Tier> {
        self.history.lock().expect("history lock poisoned").clone()
    }
}

#[async_trait]
impl SessionAdapter for StaticAdapter {
    async fn get_current_tier(&self) -> Result<Option<Tier>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::adapter("scripted read failure"));
        }
        Ok(self.current())
    }

    async fn set_tier(&self, tier: Tier) -> Result<()> {
        self.set_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::switch_failed(tier, "scripted write failure"));
        }
        *self.tier.lock().expect("tier lock poisoned") = Some(tier);
        self.history
            .lock()
            .expect("history lock poisoned")
            .push(tier);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_object() {
        assert_eq!(
            parse_tier_output(r#"{"tier": "balanced"}"#),
            Some(Tier::Balanced)
        );
        assert_eq!(
            parse_tier_output(r#"{"session": 1, "current_tier": "opus"}"#),
            Some(Tier::Flagship)
        );
        assert_eq!(parse_tier_output(r#""fast""#), Some(Tier::Fast));
    }

    #[test]
    fn test_parse_key_value_fallback() {
        assert_eq!(
            parse_tier_output("session=abc\ntier=flagship\n"),
            Some(Tier::Flagship)
        );
        assert_eq!(
            parse_tier_output("Current_Tier: sonnet"),
            Some(Tier::Balanced)
        );
    }

    #[test]
    fn test_parse_bare_word_fallback() {
        assert_eq!(parse_tier_output("running on haiku\n"), Some(Tier::Fast));
        assert_eq!(parse_tier_output("no tier here at all"), None);
    }

    #[tokio::test]
    async fn test_static_adapter_roundtrip() {
        let adapter = StaticAdapter::new(Tier::Fast);
        assert_eq!(adapter.get_current_tier().await.unwrap(), Some(Tier::Fast));

        adapter.set_tier(Tier::Flagship).await.unwrap();
        assert_eq!(adapter.current(), Some(Tier::Flagship));
        assert_eq!(adapter.history(), vec![Tier::Flagship]);
        assert_eq!(adapter.get_calls(), 1);
        assert_eq!(adapter.set_calls(), 1);
    }

    #[tokio::test]
    async fn test_static_adapter_scripted_failures() {
        let adapter = StaticAdapter::new(Tier::Fast);
        adapter.fail_reads(true);
        assert!(matches!(
            adapter.get_current_tier().await,
            Err(Error::Adapter(_))
        ));

        adapter.fail_writes(true);
        assert!(matches!(
            adapter.set_tier(Tier::Balanced).await,
            Err(Error::SwitchFailed { .. })
        ));
        // Failed write leaves the tier unchanged.
        assert_eq!(adapter.current(), Some(Tier::Fast));
    }

    #[cfg(unix)]
    mod command {
        use super::*;
        use std::io::Write;
        use std::os::unix::fs::PermissionsExt;

        fn script(dir: &std::path::Path, body: &str) -> String {
            let path = dir.join("sessionctl");
            let mut file = std::fs::File::create(&path).expect("create script");
            writeln!(file, "#!/bin/sh\n{}", body).expect("write script");
            let mut perms = file.metadata().expect("metadata").permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).expect("chmod script");
            path.to_string_lossy().to_string()
        }

        fn adapter_for(binary: String, timeout: Duration) -> CommandAdapter {
            CommandAdapter::new(CommandAdapterConfig {
                binary_path: Some(binary),
                timeout,
                ..Default::default()
            })
            .expect("adapter construction")
        }

        #[tokio::test]
        async fn test_command_adapter_reads_json() {
            let dir = tempfile::tempdir().expect("tempdir");
            let binary = script(dir.path(), r#"echo '{"tier": "balanced"}'"#);
            let adapter = adapter_for(binary, Duration::from_secs(5));

            let tier = adapter.get_current_tier().await.unwrap();
            assert_eq!(tier, Some(Tier::Balanced));
        }

        #[tokio::test]
        async fn test_command_adapter_set_passes_tier_name() {
            let dir = tempfile::tempdir().expect("tempdir");
            let record = dir.path().join("record");
            let binary = script(
                dir.path(),
                &format!("echo \"$@\" > {}", record.display()),
            );
            let adapter = adapter_for(binary, Duration::from_secs(5));

            adapter.set_tier(Tier::Flagship).await.unwrap();
            let recorded = std::fs::read_to_string(record).expect("record file");
            assert_eq!(recorded.trim(), "tier set flagship");
        }

        #[tokio::test]
        async fn test_command_adapter_nonzero_exit_is_error() {
            let dir = tempfile::tempdir().expect("tempdir");
            let binary = script(dir.path(), "echo broken >&2; exit 3");
            let adapter = adapter_for(binary, Duration::from_secs(5));

            assert!(matches!(
                adapter.get_current_tier().await,
                Err(Error::Adapter(_))
            ));
            assert!(matches!(
                adapter.set_tier(Tier::Fast).await,
                Err(Error::SwitchFailed { .. })
            ));
        }

        #[tokio::test]
        async fn test_command_adapter_times_out() {
            let dir = tempfile::tempdir().expect("tempdir");
            let binary = script(dir.path(), "sleep 5");
            let adapter = adapter_for(binary, Duration::from_millis(100));

            assert!(matches!(
                adapter.get_current_tier().await,
                Err(Error::Timeout { .. })
            ));
        }
    }
}
