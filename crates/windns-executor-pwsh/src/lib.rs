// # PowerShell Remoting Executor
//
// This crate provides a RemoteExecutor that runs windns scripts on a Windows DNS
// server through PowerShell remoting.
//
// ## How a script is run
//
// A local PowerShell process (`pwsh`, or `powershell.exe` on Windows) is started with
// `-NonInteractive -NoProfile -Command <wrapper>`. The wrapper opens a remote session to
// `ClientConfig::server` with `Invoke-Command` and runs the rendered script inside it:
//
// - WinRM / WinRM over HTTPS: `-ComputerName <server> -Credential <user/password> [-UseSSL]`
// - SSH: `-HostName <server> -UserName <user>` (key-based authentication)
//
// ## Result mapping
//
// - Anything on stderr is a failure; an `ObjectNotFound` report becomes `Error::NotFound`,
//   everything else `Error::Execution` with the remote text verbatim
// - A non-zero exit status without stderr is an `Error::Execution`
// - Otherwise stdout, with trailing line breaks removed, is the output
//
// ## Security
//
// The password never appears in the command line or the script text. It is handed to
// the child process through an environment variable and never logged.
//
// ## Constraints
//
// - One process per call; no retries, no internal timeout, no caching of remote state

use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use windns_core::command::{Script, quote};
use windns_core::{ClientConfig, Error, RemoteExecutor, Result, Transport};

/// Environment variable through which the password reaches the child process
const PASSWORD_ENV: &str = "WINDNS_REMOTE_PASSWORD";

/// Scripts longer than this are truncated in trace logs
const LOG_TRUNCATE_LIMIT: usize = 512;

/// Runs scripts through a local PowerShell process that remotes into the server
#[derive(Debug, Clone)]
pub struct PowerShellExecutor {
    program: String,
}

impl PowerShellExecutor {
    /// Use the platform's PowerShell: `powershell.exe` on Windows, `pwsh` elsewhere
    pub fn new() -> Self {
        let program = if cfg!(windows) { "powershell.exe" } else { "pwsh" };
        Self::with_program(program)
    }

    /// Use a specific PowerShell binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Wrap `script` in an `Invoke-Command` remote session for `config`
    pub fn wrap(config: &ClientConfig, script: &Script) -> String {
        let session = match config.transport {
            Transport::Ssh => format!(
                "Invoke-Command -HostName {} -UserName {}",
                quote(&config.server),
                quote(&config.username)
            ),
            Transport::WinRm | Transport::WinRmHttps => {
                let ssl = if config.transport == Transport::WinRmHttps {
                    " -UseSSL"
                } else {
                    ""
                };
                format!(
                    "$password = ConvertTo-SecureString $env:{env} -AsPlainText -Force\n\
                     $credential = New-Object \
                     System.Management.Automation.PSCredential({user}, $password)\n\
                     Invoke-Command -ComputerName {server} -Credential $credential{ssl}",
                    env = PASSWORD_ENV,
                    user = quote(&config.username),
                    server = quote(&config.server),
                    ssl = ssl,
                )
            }
        };

        format!(
            "$ErrorActionPreference = 'Stop'\n{} -ScriptBlock {{\n{}\n}}",
            session, script.text
        )
    }
}

impl Default for PowerShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteExecutor for PowerShellExecutor {
    async fn execute(&self, config: &ClientConfig, script: &Script) -> Result<String> {
        let wrapped = Self::wrap(config, script);

        tracing::debug!(
            program = %self.program,
            server = %config.server,
            transport = ?config.transport,
            operation = %script.operation,
            "Running remote script"
        );
        tracing::trace!(script = %truncate_for_log(script.as_str()), "Script body");

        let mut command = Command::new(&self.program);
        command
            .arg("-NonInteractive")
            .arg("-NoProfile")
            .arg("-Command")
            .arg(&wrapped)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(password) = &config.password {
            command.env(PASSWORD_ENV, password);
        }

        let output = command.output().await.map_err(|e| {
            Error::execution(format!("failed to start {}: {}", self.program, e))
        })?;

        let result = interpret(output.status.success(), &output.stdout, &output.stderr);
        match &result {
            Ok(_) => tracing::debug!(operation = %script.operation, "Remote script completed"),
            Err(e) => tracing::debug!(operation = %script.operation, "Remote script failed: {}", e),
        }
        result
    }

    fn executor_name(&self) -> &'static str {
        "pwsh"
    }
}

/// Map a finished PowerShell process onto the executor result contract
fn interpret(success: bool, stdout: &[u8], stderr: &[u8]) -> Result<String> {
    let stdout = String::from_utf8_lossy(stdout);
    let stdout = stdout.trim_end_matches(['\r', '\n']);
    let stderr = String::from_utf8_lossy(stderr);
    let stderr = stderr.trim();

    if !stderr.is_empty() {
        return Err(Error::from_remote_stderr(stderr));
    }

    if !success {
        return Err(Error::execution(if stdout.is_empty() {
            "PowerShell exited with a failure status".to_string()
        } else {
            format!("PowerShell exited with a failure status: {}", stdout)
        }));
    }

    Ok(stdout.to_string())
}

fn truncate_for_log(s: &str) -> String {
    if s.len() <= LOG_TRUNCATE_LIMIT {
        return s.to_string();
    }
    let mut end = LOG_TRUNCATE_LIMIT;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated, total {} bytes]", &s[..end], s.len())
}
