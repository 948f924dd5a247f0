//! Process detachment and the daemon-side entrypoint.
//!
//! Instead of forking, the launcher re-executes the current binary with a
//! marker environment variable set and a new session id, so the child is
//! independent of the parent's lifetime and console. The binary's `main`
//! checks [`is_daemon_process`] and, when the marker is present, hands
//! control to [`run_daemon`], which takes over the process: logging goes to
//! a file, stdio is rerouted into the log, and the supervisor runs the
//! services until the process dies.

use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};

use tracing_subscriber::EnvFilter;

use crate::config::DaemonConfig;
use crate::error::{Result, SupervisorError};
use crate::launch::DaemonSpawner;
use crate::logstream::LoggerStream;
use crate::supervisor::Supervisor;

/// Environment variable marking a process as the daemon entrypoint.
pub const DAEMON_ENTRYPOINT_ENV: &str = "VELADOR_DAEMON";

/// Whether the current process was spawned as the daemon entrypoint.
#[must_use]
pub fn is_daemon_process() -> bool {
    std::env::var_os(DAEMON_ENTRYPOINT_ENV).is_some()
}

/// Spawns the current binary as a detached daemon process.
///
/// The child runs in its own session (so it survives the parent and has no
/// controlling terminal), carries the entrypoint marker in its environment,
/// and gets a recognizable process title. Its exit status is reaped on a
/// background thread.
///
/// # Errors
/// Returns an error if the current executable cannot be resolved or the
/// process cannot be spawned.
pub fn spawn_daemon(config: &DaemonConfig) -> Result<()> {
    let exe = std::env::current_exe()?;
    let mut cmd = Command::new(&exe);
    cmd.args(std::env::args_os().skip(1))
        .env(DAEMON_ENTRYPOINT_ENV, "1")
        .arg0(format!("{} [{}]", config.name, config.build_root.display()))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());

    // setsid is async-signal-safe, so it is legal between fork and exec.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(|e| std::io::Error::from_raw_os_error(e as i32))
        });
    }

    let mut child = cmd.spawn()?;
    tracing::debug!(pid = child.id(), exe = %exe.display(), "spawned daemon process");

    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

/// [`DaemonSpawner`] that re-executes the current binary.
pub struct ExecSpawner {
    config: DaemonConfig,
}

impl ExecSpawner {
    /// Creates a spawner for the given configuration.
    #[must_use]
    pub fn new(config: DaemonConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl DaemonSpawner for ExecSpawner {
    async fn spawn(&self) -> Result<()> {
        spawn_daemon(&self.config)
    }
}

/// Takes over the current process as the daemon and runs it to completion.
///
/// Order matters here: the panic handler is installed before anything else
/// can fail, logging is switched to the daemon's log file, the inherited
/// stdio descriptors are replaced (not merely wrapped) so stray writes land
/// in the log, and only then are the socket map published and the services
/// set up and run.
///
/// # Errors
/// Returns an error if takeover fails or the supervised services fail.
pub async fn run_daemon(supervisor: &Supervisor) -> Result<()> {
    let config = supervisor.config().clone();
    let log = open_log_file(&config)?;
    install_panic_handler(&log)?;
    init_logging(&config, &log)?;
    redirect_stdio(&log)?;

    tracing::info!(
        pid = std::process::id(),
        build_root = %config.build_root.display(),
        log_level = %config.log_level,
        "velador daemon starting"
    );

    supervisor.publish_socket_map().await?;
    supervisor.setup_services()?;
    supervisor.run_services().await
}

fn open_log_file(config: &DaemonConfig) -> Result<File> {
    std::fs::create_dir_all(config.log_dir())?;
    let log = File::options()
        .create(true)
        .append(true)
        .open(config.log_path())?;
    Ok(log)
}

/// Routes panics into the log file before the process dies.
///
/// The hook writes to the raw file descriptor as well as through tracing,
/// so a panic inside the logging stack itself still leaves a trace.
fn install_panic_handler(log: &File) -> Result<()> {
    let sink = log.try_clone()?;
    std::panic::set_hook(Box::new(move |info| {
        let message = format!("velador panicked: {info}");
        let mut raw = &sink;
        let _ = writeln!(raw, "{message}");
        tracing::error!(target: "velador::panic", "{message}");
    }));
    Ok(())
}

fn init_logging(config: &DaemonConfig, log: &File) -> Result<()> {
    let filter = EnvFilter::try_new(&config.log_level)
        .map_err(|e| SupervisorError::config(format!("invalid log_level: {e}")))?;
    let sink = log.try_clone()?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(sink))
        .with_ansi(false)
        .try_init()
        .map_err(|e| SupervisorError::config(format!("failed to initialize logging: {e}")))?;
    Ok(())
}

/// Replaces the inherited stdio descriptors.
///
/// stdin is pointed at `/dev/null`. stdout and stderr are pointed at pipes
/// whose read ends are pumped through [`LoggerStream`], so anything written
/// to them (including by code that bypasses tracing) becomes log records.
fn redirect_stdio(log: &File) -> Result<()> {
    let null = File::open("/dev/null")?;
    dup_over(null.as_raw_fd(), 0)?;

    let (out_read, out_write) = make_pipe()?;
    dup_over(out_write.as_raw_fd(), 1)?;
    pump_stream(File::from(out_read), LoggerStream::stdout(log));

    let (err_read, err_write) = make_pipe()?;
    dup_over(err_write.as_raw_fd(), 2)?;
    pump_stream(File::from(err_read), LoggerStream::stderr(log));

    Ok(())
}

fn make_pipe() -> Result<(std::os::fd::OwnedFd, std::os::fd::OwnedFd)> {
    nix::unistd::pipe()
        .map_err(|e| SupervisorError::Io(std::io::Error::from_raw_os_error(e as i32)))
}

fn dup_over(source: std::os::unix::io::RawFd, target: std::os::unix::io::RawFd) -> Result<()> {
    nix::unistd::dup2(source, target)
        .map(|_| ())
        .map_err(|e| SupervisorError::Io(std::io::Error::from_raw_os_error(e as i32)))
}

fn pump_stream(mut source: File, mut sink: LoggerStream) {
    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            match source.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    let _ = sink.write(&buf[..n]);
                }
            }
        }
    });
}
