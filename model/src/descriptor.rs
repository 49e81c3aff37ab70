use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::{FilePairError, SessionError};

/// Fixed name of the per-host deploy descriptor inside a host directory.
pub const DESCRIPTOR_FILE: &str = "deploy.yml";

/**
 * A Descriptor is the declarative deploy configuration for a single host:
 * who to log in as, how to authenticate, which files to push and which
 * commands to run once they are in place.
 *
 * One descriptor lives in each host directory as `deploy.yml` and is loaded
 * fresh for every job.
 */
#[derive(Clone, Debug, Deserialize)]
pub struct Descriptor {
    pub user: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub key_file: Option<PathBuf>,
    #[serde(default)]
    pub key_pass: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// `"<local>:<remote>"` pairs, uploaded in order
    #[serde(default)]
    pub files: Vec<String>,
    /// Shell commands, run in order after all uploads
    #[serde(default)]
    pub cmds: Vec<String>,
}

fn default_port() -> u16 {
    22
}

impl Descriptor {
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let file = File::open(path).map_err(|err| SessionError::Descriptor {
            path: path.to_path_buf(),
            source: Box::new(err),
        })?;
        serde_yaml::from_reader(BufReader::new(file)).map_err(|err| SessionError::Descriptor {
            path: path.to_path_buf(),
            source: Box::new(err),
        })
    }
}

/**
 * How to treat a malformed file pair within a descriptor.
 *
 * Lenient skips the offending pair with a warning and carries on; Strict
 * aborts the whole job. Lenient is the default.
 */
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseMode {
    Strict,
    Lenient,
}

impl Default for ParseMode {
    fn default() -> Self {
        ParseMode::Lenient
    }
}

/// A parsed `"<local>:<remote>"` upload entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilePair {
    pub local: String,
    pub remote: String,
}

impl FilePair {
    /// Exactly one `:` must separate the local and remote paths.
    pub fn parse(raw: &str) -> Result<Self, FilePairError> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 2 {
            return Err(FilePairError {
                raw: raw.to_string(),
            });
        }
        Ok(Self {
            local: parts[0].to_string(),
            remote: parts[1].to_string(),
        })
    }

    /// Upload source, resolved against the host directory when relative so
    /// that no session ever depends on the process working directory.
    pub fn local_path(&self, host_dir: &Path) -> PathBuf {
        let path = Path::new(&self.local);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            host_dir.join(path)
        }
    }
}
