//! Command runner abstraction for executing shell commands.
//!
//! `CommandRunner` is what the validation gate and the convergence engine use
//! to run validators and reload actions. `ShellRunner` spawns `sh -c`;
//! `MockRunner` records calls and fails commands matching a scripted pattern.

use std::process::Command;
use std::sync::Mutex;

use log::debug;

/// Executes one shell command string. Stdout on success, stderr on failure.
pub trait CommandRunner: Send + Sync {
    fn run(&self, cmd: &str) -> Result<String, String>;
}

/// Production runner that spawns `sh -c <cmd>`.
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, cmd: &str) -> Result<String, String> {
        debug!("Running: {}", cmd);
        let output = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .output()
            .map_err(|e| format!("Failed to execute: {}", e))?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                Err(format!("exited with {}", output.status))
            } else {
                Err(stderr)
            }
        }
    }
}

/// Test double: records every command; commands containing a registered
/// pattern fail with the associated message.
#[derive(Default)]
pub struct MockRunner {
    commands: Mutex<Vec<String>>,
    failures: Mutex<Vec<(String, String)>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every command containing `pattern` fail with `message`
    pub fn fail_on(self, pattern: &str, message: &str) -> Self {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push((pattern.to_string(), message.to_string()));
        }
        self
    }

    pub fn executed_commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .map(|commands| commands.clone())
            .unwrap_or_default()
    }

    /// Commands containing `pattern`, in execution order
    pub fn commands_matching(&self, pattern: &str) -> Vec<String> {
        self.executed_commands()
            .into_iter()
            .filter(|cmd| cmd.contains(pattern))
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut commands) = self.commands.lock() {
            commands.clear();
        }
    }
}

impl CommandRunner for MockRunner {
    fn run(&self, cmd: &str) -> Result<String, String> {
        if let Ok(mut commands) = self.commands.lock() {
            commands.push(cmd.to_string());
        }
        let failures = self
            .failures
            .lock()
            .map_err(|_| "mock runner poisoned".to_string())?;
        let failure = failures
            .iter()
            .find(|(pattern, _)| cmd.contains(pattern.as_str()))
            .map(|(_, message)| message.clone());
        match failure {
            Some(message) => Err(message),
            None => Ok(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_runner_records_commands() {
        let runner = MockRunner::new();
        assert!(runner.run("wg-quick strip /tmp/wg0.conf").is_ok());
        assert!(runner.run("systemctl reload frr").is_ok());
        assert_eq!(
            runner.executed_commands(),
            vec!["wg-quick strip /tmp/wg0.conf", "systemctl reload frr"]
        );
        assert_eq!(runner.commands_matching("frr").len(), 1);
    }

    #[test]
    fn mock_runner_fails_matching_commands() {
        let runner = MockRunner::new().fail_on("vtysh", "line 3: % Unknown command");
        assert_eq!(
            runner.run("vtysh --dryrun --inputfile /tmp/frr.conf"),
            Err("line 3: % Unknown command".to_string())
        );
        assert!(runner.run("wg-quick strip /tmp/wg0.conf").is_ok());
        runner.clear();
        assert!(runner.executed_commands().is_empty());
    }

    #[test]
    fn shell_runner_reports_stderr() {
        let runner = ShellRunner;
        assert_eq!(runner.run("printf ok").unwrap(), "ok");
        assert_eq!(runner.run("echo broken >&2; exit 3").unwrap_err(), "broken");
    }
}
