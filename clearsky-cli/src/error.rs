//! CLI error handling with user-friendly messages.
//!
//! Centralizes error reporting for the CLI so every command prints the
//! same way and exits non-zero.

use std::fmt;
use std::process;

use clearsky::config::ConfigFileError;
use clearsky::dispatch::DispatchError;
use clearsky::job::JobError;
use clearsky::queue::TransportError;
use clearsky::source::SourceError;
use clearsky::worker::WorkerError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file or startup parameter error
    Config(ConfigFileError),
    /// Invalid command-line arguments
    Usage(String),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// Failed to build the job list
    Dispatch(DispatchError),
    /// Failed to create the publisher
    Transport(TransportError),
    /// Some jobs could not be published
    PublishFailures { failed: u64, total: u64 },
    /// Failed to create the source resolver
    Source(SourceError),
    /// Failed to read or decode a job record
    Job(JobError),
    /// Failed to read an input file
    FileRead { path: String, error: std::io::Error },
    /// A composite job failed
    Worker(WorkerError),
    /// HTTP server error
    Serve(std::io::Error),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::Config(ConfigFileError::Missing { .. }) => {
                eprintln!();
                eprintln!("Set the value in ~/.clearsky/config.ini, pass --config <path>,");
                eprintln!("or give the matching command-line flag.");
            }
            CliError::PublishFailures { .. } => {
                eprintln!();
                eprintln!("Failed tiles are listed in the log; dispatch does not retry.");
                eprintln!("Re-run with the same plan once the queue is reachable.");
            }
            CliError::Serve(_) => {
                eprintln!();
                eprintln!("Common issues:");
                eprintln!("  1. Address in use: choose another port with --listen or PORT");
                eprintln!("  2. Privileged port: ports below 1024 need elevated permissions");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Usage(msg) => write!(f, "{}", msg),
            CliError::Runtime(e) => write!(f, "Failed to start runtime: {}", e),
            CliError::Dispatch(e) => write!(f, "Dispatch failed: {}", e),
            CliError::Transport(e) => write!(f, "Failed to create publisher: {}", e),
            CliError::PublishFailures { failed, total } => {
                write!(f, "{} of {} jobs could not be published", failed, total)
            }
            CliError::Source(e) => write!(f, "Failed to create source resolver: {}", e),
            CliError::Job(e) => write!(f, "Invalid job: {}", e),
            CliError::FileRead { path, error } => {
                write!(f, "Failed to read file '{}': {}", path, error)
            }
            CliError::Worker(e) => write!(f, "Composite job failed: {}", e),
            CliError::Serve(e) => write!(f, "HTTP server error: {}", e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::Dispatch(e) => Some(e),
            CliError::Transport(e) => Some(e),
            CliError::Source(e) => Some(e),
            CliError::Job(e) => Some(e),
            CliError::FileRead { error, .. } => Some(error),
            CliError::Worker(e) => Some(e),
            CliError::Serve(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<DispatchError> for CliError {
    fn from(e: DispatchError) -> Self {
        CliError::Dispatch(e)
    }
}

impl From<TransportError> for CliError {
    fn from(e: TransportError) -> Self {
        CliError::Transport(e)
    }
}

impl From<SourceError> for CliError {
    fn from(e: SourceError) -> Self {
        CliError::Source(e)
    }
}

impl From<JobError> for CliError {
    fn from(e: JobError) -> Self {
        CliError::Job(e)
    }
}

impl From<WorkerError> for CliError {
    fn from(e: WorkerError) -> Self {
        CliError::Worker(e)
    }
}
