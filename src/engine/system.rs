use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::config::EngineConfig;
use crate::engine::{CommandOutcome, EngineControl, EngineError};

/// Runs the engine binary and the service manager as child processes.
#[derive(Debug, Clone)]
pub struct SystemEngine {
    config: EngineConfig,
}

impl SystemEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// `<binary> --policy <policy> --validate --user <account>`
    fn validate_command(&self, policy: &Path) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("--policy")
            .arg(policy)
            .arg("--validate")
            .arg("--user")
            .arg(&self.config.service_account);
        cmd
    }

    /// `<manager> restart <unit>`
    fn restart_command(&self) -> Command {
        let mut cmd = Command::new(&self.config.service_manager);
        cmd.arg("restart").arg(&self.config.service_unit);
        cmd
    }
}

/// Run `cmd` to completion within `deadline`, capturing stdout then stderr.
async fn run(
    mut cmd: Command,
    program: String,
    deadline: Duration,
) -> Result<CommandOutcome, EngineError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|source| EngineError::Spawn {
        program: program.clone(),
        source,
    })?;

    let output = match tokio::time::timeout(deadline, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => return Err(EngineError::Spawn { program, source }),
        Err(_) => {
            tracing::warn!(program = %program, timeout = ?deadline, "Command timed out");
            return Ok(CommandOutcome::failure(format!(
                "{program} did not finish within {}s",
                deadline.as_secs()
            )));
        }
    };

    let mut log = String::from_utf8_lossy(&output.stdout).into_owned();
    log.push_str(&String::from_utf8_lossy(&output.stderr));

    tracing::debug!(program = %program, status = %output.status, "Command finished");

    Ok(CommandOutcome {
        ok: output.status.success(),
        log,
    })
}

#[async_trait]
impl EngineControl for SystemEngine {
    async fn validate(&self, policy: &Path) -> Result<CommandOutcome, EngineError> {
        run(
            self.validate_command(policy),
            self.config.binary.display().to_string(),
            Duration::from_secs(self.config.validate_timeout_secs),
        )
        .await
    }

    async fn restart(&self) -> Result<CommandOutcome, EngineError> {
        run(
            self.restart_command(),
            self.config.service_manager.clone(),
            Duration::from_secs(self.config.restart_timeout_secs),
        )
        .await
    }
}
