use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::TransportError;

pub mod ssh;

/// Key-based authentication material.
#[derive(Clone, Debug)]
pub struct KeyAuth {
    pub file: PathBuf,
    pub passphrase: Option<String>,
}

/**
 * The authentication methods configured for a host, in fallback order: the
 * key is attempted first when present, and any key failure falls back to the
 * password unconditionally. If the key authenticates, the password is never
 * touched.
 */
#[derive(Clone, Debug)]
pub struct AuthPolicy {
    pub key: Option<KeyAuth>,
    pub password: Option<String>,
}

/// One authentication attempt handed to the transport by an AuthPolicy.
#[derive(Debug)]
pub enum AuthMethod<'a> {
    Key(&'a KeyAuth),
    Password(&'a str),
}

impl AuthPolicy {
    /**
     * Drive the key-then-password fallback. `attempt` performs one
     * authentication try against the transport; the first method it accepts
     * wins. Returns Err(()) when no configured method succeeded (including
     * when none was configured at all).
     */
    pub fn authenticate<E, F>(&self, mut attempt: F) -> Result<(), ()>
    where
        F: FnMut(AuthMethod) -> Result<(), E>,
    {
        if let Some(key) = &self.key {
            if attempt(AuthMethod::Key(key)).is_ok() {
                return Ok(());
            }
        }
        if let Some(password) = &self.password {
            if attempt(AuthMethod::Password(password)).is_ok() {
                return Ok(());
            }
        }
        Err(())
    }
}

/// Everything a transport needs to reach one host.
#[derive(Clone, Debug)]
pub struct Target {
    pub user: String,
    pub host: String,
    pub port: u16,
    pub auth: AuthPolicy,
    /// OpenSSH-format trust store used to verify the host's identity
    pub known_hosts: PathBuf,
    pub connect_timeout: Duration,
    /// Applied to every remote operation once connected; None means no deadline
    pub command_timeout: Option<Duration>,
}

impl Target {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Combined output and exit status of one remote command.
#[derive(Clone, Debug)]
pub struct CommandOutput {
    pub output: Vec<u8>,
    pub exit: i32,
}

/**
 * An established, authenticated connection to one host. Dropping a
 * connection closes it, which is how sessions guarantee the close happens
 * on every exit path.
 */
pub trait Connection: Send {
    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), TransportError>;
    fn run(&mut self, command: &str) -> Result<CommandOutput, TransportError>;
}

/**
 * The Transport trait allows for multiple transports to be implemented for
 * connecting to targets. Connecting covers the whole lifecycle up to a
 * usable session: TCP, handshake, host-key verification, authentication.
 */
pub trait Transport: Send + Sync {
    fn connect(&self, target: &Target) -> Result<Box<dyn Connection>, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(key: bool, password: bool) -> AuthPolicy {
        AuthPolicy {
            key: key.then(|| KeyAuth {
                file: PathBuf::from("/keys/id_ed25519"),
                passphrase: None,
            }),
            password: password.then(|| "hunter2".to_string()),
        }
    }

    fn label(method: &AuthMethod) -> &'static str {
        match method {
            AuthMethod::Key(_) => "key",
            AuthMethod::Password(_) => "password",
        }
    }

    #[test]
    fn valid_key_never_touches_the_password() {
        let mut attempts = vec![];
        let result = policy(true, true).authenticate(|method| {
            attempts.push(label(&method));
            Ok::<(), ()>(())
        });
        assert!(result.is_ok());
        assert_eq!(attempts, vec!["key"]);
    }

    #[test]
    fn key_failure_falls_back_to_password() {
        let mut attempts = vec![];
        let result = policy(true, true).authenticate(|method| {
            attempts.push(label(&method));
            match method {
                AuthMethod::Key(_) => Err(()),
                AuthMethod::Password(_) => Ok(()),
            }
        });
        assert!(result.is_ok());
        assert_eq!(attempts, vec!["key", "password"]);
    }

    #[test]
    fn no_method_configured_fails() {
        let result = policy(false, false).authenticate(|_| Ok::<(), ()>(()));
        assert!(result.is_err());
    }

    #[test]
    fn all_methods_rejected_fails() {
        let mut attempts = vec![];
        let result = policy(true, true).authenticate(|method| {
            attempts.push(label(&method));
            Err::<(), ()>(())
        });
        assert!(result.is_err());
        assert_eq!(attempts, vec!["key", "password"]);
    }
}
