use std::fmt;
use std::path::PathBuf;

use crate::error::SessionError;

/// The session steps a deploy can fail at, in the order they run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Descriptor,
    Connect,
    HostKey,
    Auth,
    FilePair,
    Upload,
    Command,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Step::Descriptor => "descriptor",
            Step::Connect => "connect",
            Step::HostKey => "host-key",
            Step::Auth => "auth",
            Step::FilePair => "file-pair",
            Step::Upload => "upload",
            Step::Command => "command",
        };
        write!(f, "{}", name)
    }
}

/**
 * What a single remote command did. Command failures are recorded here as
 * data rather than raised as errors: they never abort the session and never
 * flip the job's success flag.
 */
#[derive(Clone, Debug)]
pub struct CommandRecord {
    pub command: String,
    /// None when the transport failed before an exit status was known
    pub exit: Option<i32>,
    pub error: Option<String>,
}

impl CommandRecord {
    pub fn ok(&self) -> bool {
        self.exit == Some(0)
    }
}

/// Tally of everything a successful session actually did.
#[derive(Clone, Debug, Default)]
pub struct SessionReport {
    pub uploads: usize,
    pub skipped_pairs: usize,
    pub commands: Vec<CommandRecord>,
}

/**
 * The structured result of one job, exactly one per submitted host
 * directory. `success()` preserves the original boolean semantics: a job
 * succeeds when descriptor load, host verification, authentication,
 * connection, and every upload succeeded, regardless of command exits.
 */
#[derive(Debug)]
pub struct Outcome {
    pub host_dir: PathBuf,
    /// Host address, once the descriptor was readable
    pub host: Option<String>,
    pub result: Result<SessionReport, SessionError>,
}

impl Outcome {
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn failing_step(&self) -> Option<Step> {
        self.result.as_ref().err().map(|err| err.step())
    }

    /// Short label for reports, the host directory's name.
    pub fn name(&self) -> String {
        self.host_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.host_dir.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SessionError, TransportError};

    #[test]
    fn success_ignores_command_exits() {
        let outcome = Outcome {
            host_dir: PathBuf::from("/deploys/web01"),
            host: Some("web01.example.com".to_string()),
            result: Ok(SessionReport {
                uploads: 2,
                skipped_pairs: 0,
                commands: vec![CommandRecord {
                    command: "false".to_string(),
                    exit: Some(1),
                    error: None,
                }],
            }),
        };
        assert!(outcome.success());
        assert!(outcome.failing_step().is_none());
    }

    #[test]
    fn failing_step_surfaces_transport_classification() {
        let outcome = Outcome {
            host_dir: PathBuf::from("/deploys/web01"),
            host: Some("web01.example.com".to_string()),
            result: Err(SessionError::Transport(TransportError::Auth {
                user: "admin".to_string(),
                host: "web01.example.com".to_string(),
            })),
        };
        assert!(!outcome.success());
        assert_eq!(outcome.failing_step(), Some(Step::Auth));
    }

    #[test]
    fn name_is_the_directory_name() {
        let outcome = Outcome {
            host_dir: PathBuf::from("/deploys/web01"),
            host: None,
            result: Ok(SessionReport::default()),
        };
        assert_eq!(outcome.name(), "web01");
    }
}
