//! Command Executor (§4.7): pre-compiled check/reload hook templates, run
//! through a shell with a POSIX process-group kill on timeout/cancel.

use crate::error::{ConfdError, Result};
use crate::store::StopSignal;
use std::time::{Duration, Instant};
use tera::Tera;
use tokio::process::Command;
use tokio::time::sleep;

const OUTPUT_TRUNCATE_BYTES: usize = 500;

#[derive(Debug, Clone, Default)]
pub struct CmdExecutorOptions {
    pub check_cmd: Option<String>,
    pub reload_cmd: Option<String>,
    pub check_cmd_timeout: Duration,
    pub reload_cmd_timeout: Duration,
    pub min_reload_interval: Duration,
    pub sync_only: bool,
}

/// Runs a resource's `check_cmd`/`reload_cmd` hooks. The hook templates
/// are compiled once at construction so a malformed hook is caught at
/// load time rather than at first use.
pub struct CmdExecutor {
    options: CmdExecutorOptions,
    check_template: Option<Tera>,
    reload_template: Option<Tera>,
    last_reload_time: Option<Instant>,
}

impl CmdExecutor {
    pub fn new(options: CmdExecutorOptions) -> Result<Self> {
        let check_template = options
            .check_cmd
            .as_deref()
            .map(|src| compile_hook("check_cmd", src))
            .transpose()?;
        let reload_template = options
            .reload_cmd
            .as_deref()
            .map(|src| compile_hook("reload_cmd", src))
            .transpose()?;

        Ok(Self {
            options,
            check_template,
            reload_template,
            last_reload_time: None,
        })
    }

    /// Run `check_cmd` against the staged file. Skipped when there is no
    /// check command or `sync_only` is set.
    pub async fn execute_check(&self, stage_path: &str, stop: &mut StopSignal) -> Result<()> {
        let Some(template) = &self.check_template else {
            return Ok(());
        };
        if self.options.sync_only {
            return Ok(());
        }

        let rendered = render_hook(template, stage_path, None)?;
        match run(&rendered, self.options.check_cmd_timeout, stop).await {
            Ok(_) => Ok(()),
            Err(ConfdError::CommandCancelled) => Err(ConfdError::CommandCancelled),
            Err(e) => Err(ConfdError::check_failed(e.to_string())),
        }
    }

    /// Run `reload_cmd` against the staged/dest files, rate-limited by
    /// `min_reload_interval`. A skip because of rate limiting is not an
    /// error and does not advance `last_reload_time`.
    pub async fn execute_reload(&mut self, stage_path: &str, dest_path: &str, stop: &mut StopSignal) -> Result<()> {
        let Some(template) = &self.reload_template else {
            return Ok(());
        };
        if self.options.sync_only {
            return Ok(());
        }

        if !self.options.min_reload_interval.is_zero() {
            if let Some(last) = self.last_reload_time {
                if last.elapsed() < self.options.min_reload_interval {
                    tracing::warn!(dest = dest_path, "reload skipped: min_reload_interval not elapsed");
                    return Ok(());
                }
            }
        }

        let rendered = render_hook(template, stage_path, Some(dest_path))?;
        run(&rendered, self.options.reload_cmd_timeout, stop)
            .await
            .map_err(|e| match e {
                ConfdError::CommandCancelled => ConfdError::CommandCancelled,
                other => ConfdError::reload_failed(other.to_string()),
            })?;

        self.last_reload_time = Some(Instant::now());
        Ok(())
    }
}

fn compile_hook(field: &str, source: &str) -> Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_template("hook", source)
        .map_err(|e| ConfdError::configuration(field, format!("invalid hook template: {}", e)))?;
    Ok(tera)
}

fn render_hook(tera: &Tera, src: &str, dest: Option<&str>) -> Result<String> {
    let mut ctx = tera::Context::new();
    ctx.insert("src", src);
    if let Some(dest) = dest {
        ctx.insert("dest", dest);
    }
    tera.render("hook", &ctx)
        .map_err(|e| ConfdError::backend(format!("hook template render failed: {}", e)))
}

/// Spawn `cmd` in a shell (`/bin/sh -c` on POSIX, `cmd /C` on Windows),
/// in its own process group on POSIX so a timeout/cancel kills the whole
/// tree. `timeout_duration` of zero means no per-command deadline.
/// Distinguishes deadline-exceeded from parent-cancelled: both send
/// `SIGKILL` to the process group, but cancellation reports
/// [`ConfdError::CommandCancelled`] rather than [`ConfdError::CommandTimeout`].
pub async fn run(cmd: &str, timeout_duration: Duration, stop: &mut StopSignal) -> Result<String> {
    let mut command = build_shell_command(cmd);
    let mut child = command.spawn().map_err(ConfdError::from)?;
    let pid = child.id();

    let wait = child.wait_with_output();
    tokio::pin!(wait);

    let output = tokio::select! {
        result = &mut wait => result.map_err(ConfdError::from)?,
        _ = stop.cancelled() => {
            kill_process_group(pid);
            return Err(ConfdError::CommandCancelled);
        }
        _ = sleep(timeout_duration), if !timeout_duration.is_zero() => {
            kill_process_group(pid);
            return Err(ConfdError::CommandTimeout(timeout_duration));
        }
    };

    let combined = merge_and_truncate(&output.stdout, &output.stderr);
    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        return Err(ConfdError::command_failed(code, combined));
    }
    Ok(combined)
}

#[cfg(unix)]
fn build_shell_command(cmd: &str) -> Command {
    use std::os::unix::process::CommandExt;
    let mut command = Command::new("/bin/sh");
    command.arg("-c").arg(cmd);
    command.process_group(0);
    command.kill_on_drop(true);
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::piped());
    command
}

#[cfg(windows)]
fn build_shell_command(cmd: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(cmd);
    command.kill_on_drop(true);
    command.stdout(std::process::Stdio::piped());
    command.stderr(std::process::Stdio::piped());
    command
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

fn merge_and_truncate(stdout: &[u8], stderr: &[u8]) -> String {
    let mut combined = Vec::with_capacity(stdout.len() + stderr.len());
    combined.extend_from_slice(stdout);
    combined.extend_from_slice(stderr);
    combined.truncate(OUTPUT_TRUNCATE_BYTES);
    String::from_utf8_lossy(&combined).into_owned()
}
