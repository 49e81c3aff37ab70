use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::descriptor::{Descriptor, FilePair, ParseMode, DESCRIPTOR_FILE};
use crate::error::SessionError;
use crate::logging::SessionLog;
use crate::outcome::{CommandRecord, Outcome, SessionReport};
use crate::pool::{Job, JobRunner};
use crate::transport::{AuthPolicy, KeyAuth, Target, Transport};

/// Connect timeout applied when the caller does not override it.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(20);

/// Settings shared by every session in one run.
#[derive(Clone, Debug)]
pub struct DeployConfig {
    pub known_hosts: PathBuf,
    pub parse_mode: ParseMode,
    pub connect_timeout: Duration,
    /// None preserves the historical no-deadline behavior
    pub command_timeout: Option<Duration>,
}

impl DeployConfig {
    pub fn new(known_hosts: PathBuf) -> Self {
        Self {
            known_hosts,
            parse_mode: ParseMode::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: None,
        }
    }
}

/**
 * Fully provision one host or fail cleanly.
 *
 * Every path is resolved absolute and scoped to this session (the
 * descriptor at `<host_dir>/deploy.yml`, upload sources against the host
 * directory); the process working directory is never read or mutated, so
 * concurrent sessions cannot interfere with each other. The connection is
 * closed on every exit path by dropping it.
 */
pub fn deploy_host(host_dir: &Path, transport: &dyn Transport, config: &DeployConfig) -> Outcome {
    let log = SessionLog::open(host_dir);
    let mut host = None;
    let result = run_session(host_dir, transport, config, &log, &mut host);

    match &result {
        Ok(report) => log.info(&format!(
            "deploy finished: {} file(s) uploaded, {} pair(s) skipped, {} command(s) run",
            report.uploads,
            report.skipped_pairs,
            report.commands.len()
        )),
        Err(err) => log.error(&format!("deploy aborted at {} step: {}", err.step(), err)),
    }

    Outcome {
        host_dir: host_dir.to_path_buf(),
        host,
        result,
    }
}

fn run_session(
    host_dir: &Path,
    transport: &dyn Transport,
    config: &DeployConfig,
    log: &SessionLog,
    host_out: &mut Option<String>,
) -> Result<SessionReport, SessionError> {
    let descriptor = Descriptor::load(&host_dir.join(DESCRIPTOR_FILE))?;
    *host_out = Some(descriptor.host.clone());
    log.info(&format!(
        "deploying to {}@{}:{}",
        descriptor.user, descriptor.host, descriptor.port
    ));

    let target = target_for(&descriptor, host_dir, config);
    let mut connection = transport.connect(&target)?;
    log.info("connected");

    let mut report = SessionReport::default();

    for raw in &descriptor.files {
        let pair = match FilePair::parse(raw) {
            Ok(pair) => pair,
            Err(err) => match config.parse_mode {
                ParseMode::Strict => return Err(err.into()),
                ParseMode::Lenient => {
                    log.warn(&format!("skipping: {}", err));
                    report.skipped_pairs += 1;
                    continue;
                }
            },
        };
        let local = pair.local_path(host_dir);
        connection.upload(&local, &pair.remote)?;
        log.info(&format!("uploaded {} to {}", local.display(), pair.remote));
        report.uploads += 1;
    }

    for command in &descriptor.cmds {
        log.info(&format!("running: {}", command));
        match connection.run(command) {
            Ok(ran) => {
                log.output(&ran.output);
                if ran.exit != 0 {
                    log.warn(&format!("command exited with status {}: {}", ran.exit, command));
                }
                report.commands.push(CommandRecord {
                    command: command.clone(),
                    exit: Some(ran.exit),
                    error: None,
                });
            }
            // a failed command never aborts the session
            Err(err) => {
                log.error(&format!("command failed: {}", err));
                report.commands.push(CommandRecord {
                    command: command.clone(),
                    exit: None,
                    error: Some(err.to_string()),
                });
            }
        }
    }

    Ok(report)
}

fn target_for(descriptor: &Descriptor, host_dir: &Path, config: &DeployConfig) -> Target {
    // key files travel with the host directory unless given absolute
    let key = descriptor.key_file.as_ref().map(|file| KeyAuth {
        file: if file.is_absolute() {
            file.clone()
        } else {
            host_dir.join(file)
        },
        passphrase: descriptor.key_pass.clone(),
    });

    Target {
        user: descriptor.user.clone(),
        host: descriptor.host.clone(),
        port: descriptor.port,
        auth: AuthPolicy {
            key,
            password: descriptor.password.clone(),
        },
        known_hosts: config.known_hosts.clone(),
        connect_timeout: config.connect_timeout,
        command_timeout: config.command_timeout,
    }
}

/// The JobRunner the dispatcher hands to the pool: one deploy session per
/// host-directory job.
pub struct DeployRunner {
    transport: Arc<dyn Transport>,
    config: DeployConfig,
}

impl DeployRunner {
    pub fn new(transport: Arc<dyn Transport>, config: DeployConfig) -> Self {
        Self { transport, config }
    }
}

impl JobRunner for DeployRunner {
    fn run(&self, job: Job) -> Outcome {
        deploy_host(&job, self.transport.as_ref(), &self.config)
    }
}
