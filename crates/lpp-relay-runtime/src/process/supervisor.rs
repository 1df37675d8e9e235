//! Ownership of the correction client process.
//!
//! At most one client runs per supervisor. `start()` spawns it and
//! resolves when it exits; meanwhile `interrupt()`, `quit()` and `write()`
//! may be called from other tasks. Observers follow the lifecycle through
//! a watch channel of [`ProcessState`].
//!
//! The child is only reaped while the handle lock is held, and the handle is
//! cleared in the same critical section. A pid read under that lock is
//! therefore never one the OS could have reused.

use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use nix::sys::signal::Signal;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::net::unix::pipe;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::signal::send_signal;
use crate::client::LaunchCommand;

/// Exit code reported when the client could not be launched at all.
///
/// Signal deaths report `-signum`, so the sentinel sits outside that range.
pub const LAUNCH_FAILED: i32 = i32::MIN;

/// How often the exit status of a running client is checked.
const REAP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for buffered output after the client exits.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of the supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    Running { pid: u32 },
    Exited { code: i32 },
}

/// Control surface the reconfiguration loop needs from a running client.
#[async_trait]
pub trait ChildControl: Send + Sync {
    async fn is_running(&self) -> bool;

    /// Ask the client to stop gracefully. Returns false if nothing was signalled.
    async fn interrupt(&self) -> bool;

    /// Send raw bytes to the client's control input. Never fails.
    async fn write(&self, data: &[u8]);
}

struct RunningChild {
    pid: u32,
    child: Child,
    stdin: Option<ChildStdin>,
}

pub struct ProcessSupervisor {
    command: LaunchCommand,
    handle: Mutex<Option<RunningChild>>,
    state: watch::Sender<ProcessState>,
}

impl ProcessSupervisor {
    pub fn new(command: LaunchCommand) -> Self {
        let (state, _) = watch::channel(ProcessState::NotStarted);
        Self {
            command,
            handle: Mutex::new(None),
            state,
        }
    }

    pub const fn command(&self) -> &LaunchCommand {
        &self.command
    }

    /// Receiver observing every state transition.
    pub fn subscribe(&self) -> watch::Receiver<ProcessState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ProcessState {
        *self.state.borrow()
    }

    /// Spawn the client and wait for it to exit.
    ///
    /// Returns the client's exit code, `-signum` if it was killed by a
    /// signal, or [`LAUNCH_FAILED`] if it could not be spawned.
    pub async fn start(&self) -> i32 {
        let mut guard = self.handle.lock().await;
        if let Some(running) = guard.as_ref() {
            warn!(pid = running.pid, "correction client already running");
            return LAUNCH_FAILED;
        }

        let (mut child, output) = match self.spawn() {
            Ok(spawned) => spawned,
            Err(e) => {
                error!(program = %self.command.program.display(), error = %e, "failed to launch correction client");
                drop(guard);
                self.state.send_replace(ProcessState::Exited {
                    code: LAUNCH_FAILED,
                });
                return LAUNCH_FAILED;
            }
        };

        let Some(pid) = child.id() else {
            error!("correction client exited before its pid could be read");
            drop(guard);
            self.state.send_replace(ProcessState::Exited {
                code: LAUNCH_FAILED,
            });
            return LAUNCH_FAILED;
        };

        let relay = spawn_output_relay(output);

        let stdin = child.stdin.take();
        *guard = Some(RunningChild { pid, child, stdin });
        drop(guard);
        info!(pid, command = %self.command, "correction client started");
        self.state.send_replace(ProcessState::Running { pid });

        let code = match self.reap().await {
            Ok(status) => exit_code(status),
            Err(e) => {
                error!(pid, error = %e, "failed waiting for correction client");
                LAUNCH_FAILED
            }
        };

        if timeout(OUTPUT_DRAIN_TIMEOUT, relay).await.is_err() {
            debug!(pid, "client output still open after exit, detaching relay");
        }

        info!(pid, code, "correction client exited");
        self.state.send_replace(ProcessState::Exited { code });
        code
    }

    /// Spawn the client with stdout and stderr sharing one pipe, so its
    /// output is relayed in the order it was written.
    fn spawn(&self) -> io::Result<(Child, pipe::Receiver)> {
        let (reader, writer) = io::pipe()?;
        let stderr = writer.try_clone()?;
        let child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(writer)
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()?;
        // The command and its copies of the write end are gone, so the
        // reader sees end of file once the client closes its output.
        let output = pipe::Receiver::from_owned_fd(OwnedFd::from(reader))?;
        Ok((child, output))
    }

    /// Wait for the running client to exit and clear the handle.
    async fn reap(&self) -> io::Result<ExitStatus> {
        loop {
            {
                let mut guard = self.handle.lock().await;
                let Some(running) = guard.as_mut() else {
                    return Err(io::Error::other("client handle cleared while running"));
                };
                match running.child.try_wait() {
                    Ok(Some(status)) => {
                        guard.take();
                        return Ok(status);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // Dropping the child kills it.
                        guard.take();
                        return Err(e);
                    }
                }
            }
            tokio::time::sleep(REAP_POLL_INTERVAL).await;
        }
    }

    /// Send SIGINT to the running client.
    pub async fn interrupt(&self) -> bool {
        self.signal(Signal::SIGINT).await
    }

    /// Send SIGKILL to the running client.
    pub async fn quit(&self) -> bool {
        self.signal(Signal::SIGKILL).await
    }

    pub async fn is_running(&self) -> bool {
        self.handle.lock().await.is_some()
    }

    /// Write to the client's stdin. A no-op when no client is running;
    /// write errors are logged and the input channel is closed.
    pub async fn write(&self, data: &[u8]) {
        let mut guard = self.handle.lock().await;
        let Some(running) = guard.as_mut() else {
            debug!("no correction client running, dropping write");
            return;
        };
        let Some(stdin) = running.stdin.as_mut() else {
            debug!(pid = running.pid, "client input closed, dropping write");
            return;
        };

        let result = async {
            stdin.write_all(data).await?;
            stdin.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!(pid = running.pid, error = %e, "write to correction client failed");
            running.stdin = None;
        }
    }

    async fn signal(&self, signal: Signal) -> bool {
        // Held until the signal is sent so the child cannot be reaped meanwhile.
        let guard = self.handle.lock().await;
        let Some(pid) = guard.as_ref().map(|r| r.pid) else {
            debug!(signal = signal.as_str(), "no correction client running, nothing to signal");
            return false;
        };
        match send_signal(pid, signal) {
            Ok(delivered) => {
                info!(pid, signal = signal.as_str(), delivered, "signalled correction client");
                delivered
            }
            Err(e) => {
                warn!(pid, signal = signal.as_str(), error = %e, "failed to signal correction client");
                false
            }
        }
    }
}

#[async_trait]
impl ChildControl for ProcessSupervisor {
    async fn is_running(&self) -> bool {
        Self::is_running(self).await
    }

    async fn interrupt(&self) -> bool {
        Self::interrupt(self).await
    }

    async fn write(&self, data: &[u8]) {
        Self::write(self, data).await;
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signum| -signum))
        .unwrap_or(LAUNCH_FAILED)
}

/// Relay the client's merged output to the log, line by line.
///
/// Lines that are not valid UTF-8 are reported and skipped.
fn spawn_output_relay(stream: impl AsyncRead + Unpin + Send + 'static) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf: Vec<u8> = Vec::with_capacity(1024);

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    while matches!(buf.last(), Some(b'\n' | b'\r')) {
                        buf.pop();
                    }
                    match std::str::from_utf8(&buf) {
                        Ok(line) => info!(target: "lpp_client", "{line}"),
                        Err(e) => {
                            warn!(target: "lpp_client", error = %e, "skipping undecodable output line");
                        }
                    }
                }
                Err(e) => {
                    debug!(error = %e, "client output relay exiting due to read error");
                    break;
                }
            }
        }
    })
}
