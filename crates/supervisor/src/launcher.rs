//! Process launcher
//!
//! The supervisor never touches `std::process` directly: it asks a
//! [`ProcessLauncher`] for a [`WorkerHandle`] and drives every signal through
//! that handle. [`SystemLauncher`] is the production implementation.

use std::io::{self, PipeReader};
use std::process::{Child, Command, ExitStatus, Stdio};

use crate::resolver::LaunchSpec;

/// Control surface of one spawned worker
pub trait WorkerHandle: Send {
    fn pid(&self) -> u32;

    /// Exit status if the process has exited, reaping it when needed
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;

    /// SIGTERM
    fn terminate(&mut self) -> io::Result<()>;

    /// SIGKILL through the owned handle
    fn kill(&mut self) -> io::Result<()>;

    /// SIGKILL sent straight to the pid with kill(2)
    fn kill_pid(&mut self) -> io::Result<()>;
}

/// Starts workers from a resolved [`LaunchSpec`]
pub trait ProcessLauncher: Send + Sync {
    /// Spawn the worker and return it with the read end of its combined output
    fn launch(&self, spec: &LaunchSpec) -> io::Result<(Box<dyn WorkerHandle>, PipeReader)>;
}

/// Spawns real OS processes with an inherited environment and one combined output pipe
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, spec: &LaunchSpec) -> io::Result<(Box<dyn WorkerHandle>, PipeReader)> {
        let (child, reader) = spawn(spec)?;
        Ok((Box::new(OsChild(child)), reader))
    }
}

pub(crate) fn spawn(spec: &LaunchSpec) -> io::Result<(Child, PipeReader)> {
    let (reader, writer) = io::pipe()?;

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .env("PYTHONUNBUFFERED", "1")
        .stdin(Stdio::null())
        .stdout(writer.try_clone()?)
        .stderr(writer);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    let child = command.spawn()?;
    // The command holds our copies of the write end; EOF needs them closed
    drop(command);
    Ok((child, reader))
}

struct OsChild(Child);

impl WorkerHandle for OsChild {
    fn pid(&self) -> u32 {
        self.0.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.0.try_wait()
    }

    fn terminate(&mut self) -> io::Result<()> {
        send_terminate(self.0.id())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.0.kill()
    }

    fn kill_pid(&mut self) -> io::Result<()> {
        send_kill(self.0.id())
    }
}

#[cfg(unix)]
fn signal(pid: u32, sig: libc::c_int) -> io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions
    if unsafe { libc::kill(pid, sig) } == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> io::Result<()> {
    signal(pid, libc::SIGTERM)
}

#[cfg(unix)]
fn send_kill(pid: u32) -> io::Result<()> {
    signal(pid, libc::SIGKILL)
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "graceful termination needs unix signals",
    ))
}

#[cfg(not(unix))]
fn send_kill(_pid: u32) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "kill(2) needs unix signals",
    ))
}
