use colored::*;
use gumdrop::Options;
use log::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use flotilla_model::descriptor::ParseMode;
use flotilla_model::pool;
use flotilla_model::session::{DeployConfig, DeployRunner};
use flotilla_model::transport::ssh::Ssh;
use flotilla_model::Outcome;

fn main() {
    pretty_env_logger::init();
    let opts = FlotillaOptions::parse_args_default_or_exit();

    let root = match &opts.dir {
        Some(dir) => dir.clone(),
        None => {
            eprintln!("{}", "Must specify the host directory with --dir!".red());
            std::process::exit(1);
        }
    };

    let known_hosts = match opts.known_hosts.clone().or_else(default_known_hosts) {
        Some(path) => path,
        None => {
            eprintln!(
                "{}",
                "Could not resolve a known hosts file, pass one with --known-hosts".red()
            );
            std::process::exit(1);
        }
    };

    let hosts = match enumerate_hosts(&root) {
        Ok(hosts) => hosts,
        Err(err) => {
            eprintln!(
                "{}",
                format!("Failed to read host directory {}: {}", root.display(), err).red()
            );
            std::process::exit(1);
        }
    };
    if hosts.is_empty() {
        println!("No host directories under {}, nothing to do", root.display());
        return;
    }
    info!("deploying {} host(s) with {} worker(s)", hosts.len(), opts.workers);

    let mut config = DeployConfig::new(known_hosts);
    config.parse_mode = if opts.strict {
        ParseMode::Strict
    } else {
        ParseMode::Lenient
    };
    config.connect_timeout = Duration::from_secs(opts.connect_timeout);
    if opts.command_timeout > 0 {
        config.command_timeout = Some(Duration::from_secs(opts.command_timeout));
    }

    let runner = Arc::new(DeployRunner::new(Arc::new(Ssh::default()), config));
    let outcomes = pool::run(hosts, opts.workers, runner);

    let failed = print_report(&outcomes);
    if opts.fail_on_error && failed > 0 {
        std::process::exit(1);
    }
}

/**
 * Enumerate the immediate subdirectories of the root, one job each.
 *
 * Paths come back absolute so sessions never depend on the process working
 * directory, and sorted by name so submission order is deterministic.
 */
fn enumerate_hosts(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut hosts = vec![];
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            hosts.push(entry.path().canonicalize()?);
        }
    }
    hosts.sort();
    Ok(hosts)
}

fn default_known_hosts() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".ssh").join("known_hosts"))
}

/// Print the per-host summary and return how many hosts failed.
fn print_report(outcomes: &[Outcome]) -> usize {
    let mut failed = 0;
    for outcome in outcomes {
        match &outcome.result {
            Ok(report) => {
                let commands_failed = report.commands.iter().filter(|c| !c.ok()).count();
                let mut line = format!(
                    "{}: ok ({} uploaded, {} command(s))",
                    outcome.name(),
                    report.uploads,
                    report.commands.len()
                );
                if commands_failed > 0 {
                    line.push_str(&format!(", {} command(s) failed", commands_failed));
                    println!("{}", line.yellow());
                } else {
                    println!("{}", line.green());
                }
            }
            Err(err) => {
                failed += 1;
                println!(
                    "{}",
                    format!("{}: failed at {} step: {}", outcome.name(), err.step(), err).red()
                );
            }
        }
    }
    if failed > 0 {
        println!(
            "{}",
            format!(
                "{} of {} host(s) failed, see each host's deploy.log for detail",
                failed,
                outcomes.len()
            )
            .red()
        );
    } else {
        println!("{}", format!("All {} host(s) deployed", outcomes.len()).green());
    }
    failed
}

#[derive(Debug, Options)]
struct FlotillaOptions {
    #[options(help = "print help message")]
    help: bool,

    #[options(help = "directory containing one subdirectory per host", meta = "DIR")]
    dir: Option<PathBuf>,

    #[options(help = "number of concurrent deploy workers", default = "4", meta = "N")]
    workers: usize,

    #[options(help = "treat a malformed file pair as fatal to its host's deploy")]
    strict: bool,

    #[options(help = "exit nonzero when any host fails to deploy")]
    fail_on_error: bool,

    #[options(help = "SSH connect timeout in seconds", default = "20", meta = "SECS")]
    connect_timeout: u64,

    #[options(
        help = "timeout for each remote operation in seconds, 0 disables",
        default = "0",
        meta = "SECS"
    )]
    command_timeout: u64,

    #[options(help = "known hosts file used to verify host identities", meta = "PATH")]
    known_hosts: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerate_skips_plain_files_and_sorts() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("web02")).unwrap();
        std::fs::create_dir(root.path().join("web01")).unwrap();
        std::fs::write(root.path().join("notes.txt"), "not a host").unwrap();

        let hosts = enumerate_hosts(root.path()).unwrap();

        assert_eq!(hosts.len(), 2);
        assert!(hosts[0].ends_with("web01"));
        assert!(hosts[1].ends_with("web02"));
        assert!(hosts.iter().all(|h| h.is_absolute()));
    }

    #[test]
    fn enumerate_missing_root_is_an_error() {
        assert!(enumerate_hosts(Path::new("/nonexistent/deploys")).is_err());
    }

    #[test]
    fn report_counts_failed_hosts() {
        use flotilla_model::error::{SessionError, TransportError};
        use flotilla_model::outcome::SessionReport;

        let outcomes = vec![
            Outcome {
                host_dir: PathBuf::from("/deploys/web01"),
                host: Some("web01.example.com".to_string()),
                result: Ok(SessionReport::default()),
            },
            Outcome {
                host_dir: PathBuf::from("/deploys/web02"),
                host: None,
                result: Err(SessionError::Transport(TransportError::Auth {
                    user: "admin".to_string(),
                    host: "web02.example.com".to_string(),
                })),
            },
        ];
        assert_eq!(print_report(&outcomes), 1);
    }
}
