use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{Command, Output};

use crate::config::StageCommand;

use super::{PipelineError, Result};

/// Launch one external stage and block until it exits.
///
/// The stage runs in its configured working directory, with its configured
/// search-path directories prepended to the inherited value of its search
/// path variable. Failure to launch and a non-zero exit are both fatal,
/// reported with the full command line, the working directory, and whatever
/// diagnostics the process produced.
pub fn run_stage(stage: &'static str, cmd: &StageCommand, extra_args: &[String]) -> Result<Output> {
    let (program, base_args) = cmd
        .command
        .split_first()
        .ok_or(PipelineError::EmptyCommand { stage })?;

    let mut command = Command::new(program);
    command
        .args(base_args)
        .args(extra_args)
        .current_dir(&cmd.workdir);
    if !cmd.search_paths.is_empty() {
        let joined = join_search_path(
            &cmd.search_paths,
            env::var_os(&cmd.search_path_env),
            &cmd.search_path_env,
        )?;
        command.env(&cmd.search_path_env, joined);
    }

    let rendered = display_command(&cmd.command, extra_args);
    log::debug!("Running {} in {}", rendered, cmd.workdir.display());

    let output = command.output().map_err(|e| PipelineError::CommandFailed {
        command: rendered.clone(),
        cwd: cmd.workdir.clone(),
        details: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(PipelineError::CommandFailed {
            command: rendered,
            cwd: cmd.workdir.clone(),
            details: capture_details(&output),
        });
    }
    Ok(output)
}

/// Configured directories first, the inherited value after.
fn join_search_path(
    extra: &[PathBuf],
    existing: Option<OsString>,
    var: &str,
) -> Result<OsString> {
    let mut paths = extra.to_vec();
    if let Some(existing) = existing {
        paths.extend(env::split_paths(&existing));
    }
    env::join_paths(paths).map_err(|source| PipelineError::SearchPath {
        var: var.to_string(),
        source,
    })
}

/// Trimmed stderr, else trimmed stdout, else a fixed placeholder.
fn capture_details(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if !stderr.is_empty() {
        return stderr.to_string();
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        return stdout.to_string();
    }
    "No subprocess output captured.".to_string()
}

fn display_command(command: &[String], extra_args: &[String]) -> String {
    command
        .iter()
        .chain(extra_args.iter())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}
