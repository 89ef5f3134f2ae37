//! Execution of a work's function or command. Both paths stamp timing,
//! normalize the outcome into the work, and coerce every failure into
//! `status=failure`; nothing raised here escapes the executor.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};
use tokio::process::Command;
use tracing::{error, info};

use conveyor_common::{now, Work, WorkStatus};

use crate::error::WorkerError;
use crate::registry::{Registered, Registry};
use crate::shutdown::Shutdown;
use crate::validate::{self, Outcome};

/// Execute the work's registered function.
pub async fn function(registry: &Registry, work: &mut Work, shutdown: &Shutdown) {
    let started = Instant::now();
    if work.start.is_none() {
        work.start = Some(now());
    }
    match run_function(registry, work, shutdown).await {
        Ok(value) => {
            let outcome = validate::outcome(value);
            merge(work, outcome);
            validate::size(work);
            work.status = WorkStatus::Success;
        }
        Err(err) => {
            error!(error = %err, "function execution failed");
            work.status = WorkStatus::Failure;
        }
    }
    work.stop = Some(now());
    info!(
        elapsed_seconds = started.elapsed().as_secs_f64(),
        "execution finished"
    );
}

async fn run_function(
    registry: &Registry,
    work: &mut Work,
    shutdown: &Shutdown,
) -> Result<Value, WorkerError> {
    let path = work.function.clone().ok_or(WorkerError::NoExecutable)?;
    let handler = validate::function(registry, &path)?;
    let deadline = Duration::from_secs(work.timeout as u64);
    let task = match handler {
        Registered::Function(handler) => {
            let parameters = work.parameters.clone().unwrap_or_default();
            info!(function = %path, "executing handler");
            tokio::task::spawn_blocking(move || handler.call(&parameters))
        }
        Registered::Cli(handler) => {
            // Discover defaults for parameters the work did not carry.
            let mut parameters = work.parameters.clone().unwrap_or_default();
            for (name, default) in handler.params() {
                parameters.entry(name).or_insert(default);
            }
            let argv = cli_arguments(&parameters);
            work.parameters = Some(parameters);
            info!(function = %path, args = ?argv, "executing CLI handler");
            tokio::task::spawn_blocking(move || handler.invoke(&argv))
        }
    };
    tokio::select! {
        joined = tokio::time::timeout(deadline, task) => match joined {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(err))) => Err(WorkerError::UserFailure(err.to_string())),
            Ok(Err(join)) => Err(WorkerError::UserFailure(join.to_string())),
            Err(_) => Err(WorkerError::Timeout),
        },
        _ = shutdown.wait() => Err(WorkerError::Interrupted),
    }
}

/// Render parameters as `--name=value` argv entries, in parameter order.
fn cli_arguments(parameters: &Map<String, Value>) -> Vec<String> {
    parameters
        .iter()
        .map(|(name, value)| {
            let rendered = match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            format!("--{name}={rendered}")
        })
        .collect()
}

/// Merge a normalized outcome into the work: new result keys override,
/// artifact lists are concatenated.
fn merge(work: &mut Work, outcome: Outcome) {
    if let Some(results) = outcome.results {
        match &mut work.results {
            Some(existing) => existing.extend(results),
            None => work.results = Some(results),
        }
    }
    if let Some(products) = outcome.products {
        work.products.get_or_insert_with(Vec::new).extend(products);
    }
    if let Some(plots) = outcome.plots {
        work.plots.get_or_insert_with(Vec::new).extend(plots);
    }
}

/// Execute the work's command in a subprocess.
pub async fn command(work: &mut Work, shutdown: &Shutdown) {
    let started = Instant::now();
    if work.start.is_none() {
        work.start = Some(now());
    }
    match run_command(work, shutdown).await {
        Ok(()) => work.status = WorkStatus::Success,
        Err(err) => {
            error!(error = %err, "command execution failed");
            work.status = WorkStatus::Failure;
        }
    }
    work.stop = Some(now());
    info!(
        elapsed_seconds = started.elapsed().as_secs_f64(),
        "execution finished"
    );
}

async fn run_command(work: &mut Work, shutdown: &Shutdown) -> Result<(), WorkerError> {
    let argv = work.command.clone().ok_or(WorkerError::NoExecutable)?;
    let arg0 = argv.first().ok_or(WorkerError::NoExecutable)?;
    if !validate::command(arg0) {
        return Err(WorkerError::MissingCommand(arg0.clone()));
    }
    info!(command = ?argv, "executing command");

    let mut builder = Command::new(arg0);
    builder
        .args(&argv[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    builder.process_group(0);
    let child = builder.spawn()?;
    let pid = child.id();
    let deadline = Duration::from_secs(work.timeout as u64);

    let output = tokio::select! {
        waited = tokio::time::timeout(deadline, child.wait_with_output()) => match waited {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => return Err(err.into()),
            Err(_) => {
                kill_group(pid);
                return Err(WorkerError::Timeout);
            }
        },
        _ = shutdown.wait() => {
            kill_group(pid);
            return Err(WorkerError::Interrupted);
        }
    };

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        let tail = stderr.lines().last().unwrap_or("");
        return Err(WorkerError::UserFailure(format!(
            "command exited with {code}: {tail}"
        )));
    }

    // The last stdout line may carry a structured outcome.
    let outcome = stdout
        .lines()
        .last()
        .and_then(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .map(validate::outcome)
        .unwrap_or_default();

    if outcome.results.is_none() && outcome.products.is_none() && outcome.plots.is_none() {
        let mut results = Map::new();
        results.insert("args".into(), json!(argv));
        results.insert(
            "stdout".into(),
            json!(stdout.lines().collect::<Vec<_>>()),
        );
        results.insert(
            "stderr".into(),
            json!(stderr.lines().collect::<Vec<_>>()),
        );
        results.insert("returncode".into(), json!(output.status.code().unwrap_or(0)));
        work.results = Some(results);
    } else {
        if outcome.results.is_some() {
            work.results = outcome.results;
        }
        if outcome.products.is_some() {
            work.products = outcome.products;
        }
        if outcome.plots.is_some() {
            work.plots = outcome.plots;
        }
    }
    validate::size(work);
    Ok(())
}

#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    if let Some(pid) = pid {
        // The child leads its own process group; take the whole tree down.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}
