use std::path::PathBuf;
use thiserror::Error;

use crate::outcome::Step;

type Source = Box<dyn std::error::Error + Send + Sync>;

/// A file entry that is not exactly `"<local>:<remote>"`.
#[derive(Debug, Error)]
#[error("invalid file pair {raw:?}: expected exactly one ':' separator")]
pub struct FilePairError {
    pub raw: String,
}

/**
 * Failures raised by a Transport while reaching or provisioning a host.
 *
 * The variants matter: the session maps them back to the step that failed
 * so the outcome can say where a deploy came apart.
 */
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ssh handshake with {addr} failed")]
    Handshake {
        addr: String,
        #[source]
        source: Source,
    },
    #[error("host key verification failed for {host}: {reason}")]
    HostKey { host: String, reason: String },
    #[error("authentication failed for {user}@{host}")]
    Auth { user: String, host: String },
    #[error("failed to upload {} to {remote}", .local.display())]
    Upload {
        local: PathBuf,
        remote: String,
        #[source]
        source: Source,
    },
    #[error("remote command failed to run")]
    Exec {
        #[source]
        source: Source,
    },
}

/**
 * Anything that aborts a single host's deploy. These never cross the job
 * boundary as errors; they travel inside the job's Outcome.
 */
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to load descriptor {}", .path.display())]
    Descriptor {
        path: PathBuf,
        #[source]
        source: Source,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Only raised under ParseMode::Strict
    #[error(transparent)]
    FilePair(#[from] FilePairError),
}

impl SessionError {
    /// The session step this failure belongs to.
    pub fn step(&self) -> Step {
        match self {
            SessionError::Descriptor { .. } => Step::Descriptor,
            SessionError::FilePair(_) => Step::FilePair,
            SessionError::Transport(err) => match err {
                TransportError::Connect { .. } | TransportError::Handshake { .. } => Step::Connect,
                TransportError::HostKey { .. } => Step::HostKey,
                TransportError::Auth { .. } => Step::Auth,
                TransportError::Upload { .. } => Step::Upload,
                TransportError::Exec { .. } => Step::Command,
            },
        }
    }
}
