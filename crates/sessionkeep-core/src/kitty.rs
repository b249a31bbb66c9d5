//! kitty remote-control adapter.
//!
//! Each controller call spawns `kitty @ [--to <socket>] <command> ...` and
//! reads its stdout. Argument vectors are built by pure functions so they
//! can be checked without a running terminal.

use std::io::ErrorKind;

use tokio::process::Command;
use tracing::{debug, trace};

use crate::config::ControllerConfig;
use crate::controller::{
    ControllerError, ControllerFuture, LaunchRequest, LaunchType, TabRef, WorkspaceController,
};

#[derive(Debug, Clone)]
pub struct KittyRemote {
    binary: String,
    socket: Option<String>,
}

impl KittyRemote {
    #[must_use]
    pub fn new(binary: impl Into<String>, socket: Option<String>) -> Self {
        Self {
            binary: binary.into(),
            socket,
        }
    }

    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(config.binary.clone(), config.socket.clone())
    }

    /// Full argv (after the binary) for a remote-control command.
    #[must_use]
    pub fn command_args(&self, command: &[String]) -> Vec<String> {
        let mut args = vec!["@".to_string()];
        if let Some(socket) = &self.socket {
            args.push("--to".to_string());
            args.push(socket.clone());
        }
        args.extend_from_slice(command);
        args
    }

    async fn run(&self, command: Vec<String>) -> Result<String, ControllerError> {
        let args = self.command_args(&command);
        trace!(binary = %self.binary, command = %command.first().map_or("", String::as_str), "kitty @");
        let output = Command::new(&self.binary)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    ControllerError::BinaryNotFound(self.binary.clone())
                } else {
                    ControllerError::CommandFailed(e.to_string())
                }
            })?;

        if output.status.success() {
            return String::from_utf8(output.stdout)
                .map_err(|e| ControllerError::ParseError(e.to_string()));
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        debug!(status = ?output.status.code(), stderr = %stderr, "kitty @ command failed");
        Err(classify_failure(&stderr))
    }
}

/// Map kitty's error text onto the controller taxonomy.
fn classify_failure(stderr: &str) -> ControllerError {
    let lower = stderr.to_lowercase();
    if lower.contains("remote control")
        || lower.contains("could not connect")
        || lower.contains("connection refused")
    {
        ControllerError::NotRunning
    } else {
        ControllerError::CommandFailed(stderr.to_string())
    }
}

fn launch_type_arg(launch_type: LaunchType) -> &'static str {
    match launch_type {
        LaunchType::NewOsWindow => "os-window",
        LaunchType::NewTab => "tab",
        LaunchType::NewWindowInTab => "window",
    }
}

/// `launch` arguments for a request.
#[must_use]
pub fn launch_args(request: &LaunchRequest) -> Vec<String> {
    let mut args = vec![
        "launch".to_string(),
        format!("--type={}", launch_type_arg(request.launch_type)),
        format!("--cwd={}", request.cwd),
    ];
    for (key, value) in &request.env {
        args.push("--env".to_string());
        args.push(format!("{key}={value}"));
    }
    for (key, value) in &request.tags {
        args.push("--var".to_string());
        args.push(format!("{key}={value}"));
    }
    if request.hold {
        args.push("--hold".to_string());
    }
    if let Some(cmdline) = request.cmdline.as_ref().filter(|argv| !argv.is_empty()) {
        // Ends option parsing, so an argv like `-zsh` is not read as an option.
        args.push("--".to_string());
        args.extend(cmdline.iter().cloned());
    }
    args
}

#[must_use]
pub fn focus_tab_args(tab: TabRef) -> Vec<String> {
    let matcher = match tab {
        TabRef::Id(id) => format!("--match=id:{id}"),
        TabRef::ContainingWindow(window_id) => format!("--match=window_id:{window_id}"),
    };
    vec!["focus-tab".to_string(), matcher, "--no-response".to_string()]
}

impl WorkspaceController for KittyRemote {
    fn launch(&self, request: LaunchRequest) -> ControllerFuture<'_, u64> {
        Box::pin(async move {
            let out = self.run(launch_args(&request)).await.map_err(|e| match e {
                ControllerError::CommandFailed(msg) => ControllerError::LaunchFailed(msg),
                other => other,
            })?;
            out.trim().parse::<u64>().map_err(|_| {
                ControllerError::ParseError(format!("launch did not return a window id: {:?}", out.trim()))
            })
        })
    }

    fn apply_layout<'a>(&'a self, layout: &'a str) -> ControllerFuture<'a, ()> {
        Box::pin(async move {
            self.run(vec!["goto-layout".to_string(), layout.to_string()])
                .await
                .map_err(|e| match e {
                    ControllerError::CommandFailed(msg)
                        if msg.to_lowercase().contains("layout") =>
                    {
                        ControllerError::UnknownLayout(layout.to_string())
                    }
                    other => other,
                })?;
            Ok(())
        })
    }

    fn focus_tab(&self, tab: TabRef) -> ControllerFuture<'_, ()> {
        Box::pin(async move {
            self.run(focus_tab_args(tab)).await?;
            Ok(())
        })
    }

    fn close_window(&self, window_id: u64) -> ControllerFuture<'_, ()> {
        Box::pin(async move {
            self.run(vec![
                "close-window".to_string(),
                format!("--match=id:{window_id}"),
            ])
            .await?;
            Ok(())
        })
    }

    fn introspect<'a>(&'a self, filter: Option<&'a str>) -> ControllerFuture<'a, String> {
        Box::pin(async move {
            let mut command = vec!["ls".to_string()];
            if let Some(filter) = filter {
                command.push(format!("--match={filter}"));
            }
            self.run(command).await
        })
    }

    fn set_tag<'a>(
        &'a self,
        window_id: u64,
        key: &'a str,
        value: &'a str,
    ) -> ControllerFuture<'a, ()> {
        Box::pin(async move {
            self.run(vec![
                "set-user-vars".to_string(),
                format!("--match=id:{window_id}"),
                format!("{key}={value}"),
            ])
            .await?;
            Ok(())
        })
    }
}
