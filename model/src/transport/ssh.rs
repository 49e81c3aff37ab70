use log::*;
use ssh2::{CheckResult, ExtendedData, KnownHostFileKind, Session};
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;

use crate::error::TransportError;
use crate::transport::{AuthMethod, CommandOutput, Connection, Target, Transport};

/// The production transport, backed by libssh2.
#[derive(Clone, Debug, Default)]
pub struct Ssh {}

impl Transport for Ssh {
    fn connect(&self, target: &Target) -> Result<Box<dyn Connection>, TransportError> {
        let addr = target.addr();
        let sockaddr = addr
            .to_socket_addrs()
            .map_err(|source| TransportError::Connect {
                addr: addr.clone(),
                source,
            })?
            .next()
            .ok_or_else(|| TransportError::Connect {
                addr: addr.clone(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "address resolved to nothing",
                ),
            })?;

        let tcp = TcpStream::connect_timeout(&sockaddr, target.connect_timeout).map_err(
            |source| TransportError::Connect {
                addr: addr.clone(),
                source,
            },
        )?;

        let mut session = Session::new().map_err(|err| TransportError::Handshake {
            addr: addr.clone(),
            source: Box::new(err),
        })?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|err| TransportError::Handshake {
                addr: addr.clone(),
                source: Box::new(err),
            })?;

        verify_host_key(&session, target)?;
        authenticate(&session, target)?;

        if let Some(timeout) = target.command_timeout {
            // bounds every blocking libssh2 call on this session
            session.set_timeout(timeout.as_millis() as u32);
        }

        debug!("connected to {}@{}", target.user, addr);
        Ok(Box::new(SshConnection { session }))
    }
}

fn verify_host_key(session: &Session, target: &Target) -> Result<(), TransportError> {
    let hostkey_err = |reason: &str| TransportError::HostKey {
        host: target.host.clone(),
        reason: reason.to_string(),
    };

    let mut known_hosts = session
        .known_hosts()
        .map_err(|err| hostkey_err(&format!("cannot init known hosts: {}", err)))?;
    known_hosts
        .read_file(&target.known_hosts, KnownHostFileKind::OpenSSH)
        .map_err(|err| {
            hostkey_err(&format!(
                "cannot read {}: {}",
                target.known_hosts.display(),
                err
            ))
        })?;

    let (key, _key_type) = session
        .host_key()
        .ok_or_else(|| hostkey_err("host presented no key"))?;

    match known_hosts.check_port(&target.host, target.port, key) {
        CheckResult::Match => Ok(()),
        CheckResult::NotFound => Err(hostkey_err("host not present in known hosts")),
        CheckResult::Mismatch => Err(hostkey_err("host key mismatch")),
        CheckResult::Failure => Err(hostkey_err("host key check failed")),
    }
}

fn authenticate(session: &Session, target: &Target) -> Result<(), TransportError> {
    target
        .auth
        .authenticate(|method| match method {
            AuthMethod::Key(key) => session
                .userauth_pubkey_file(&target.user, None, &key.file, key.passphrase.as_deref())
                .map_err(|err| {
                    debug!(
                        "key auth with {} failed for {}@{}, falling back: {}",
                        key.file.display(),
                        target.user,
                        target.host,
                        err
                    );
                }),
            AuthMethod::Password(password) => session
                .userauth_password(&target.user, password)
                .map_err(|err| {
                    debug!(
                        "password auth failed for {}@{}: {}",
                        target.user, target.host, err
                    );
                }),
        })
        .map_err(|_| TransportError::Auth {
            user: target.user.clone(),
            host: target.host.clone(),
        })
}

struct SshConnection {
    session: Session,
}

impl Connection for SshConnection {
    fn upload(&mut self, local: &Path, remote: &str) -> Result<(), TransportError> {
        let upload_err = |source: Box<dyn std::error::Error + Send + Sync>| {
            TransportError::Upload {
                local: local.to_path_buf(),
                remote: remote.to_string(),
                source,
            }
        };

        let contents = std::fs::read(local).map_err(|err| upload_err(Box::new(err)))?;
        let mut channel = self
            .session
            .scp_send(Path::new(remote), 0o644, contents.len() as u64, None)
            .map_err(|err| upload_err(Box::new(err)))?;
        channel
            .write_all(&contents)
            .map_err(|err| upload_err(Box::new(err)))?;
        channel.send_eof().map_err(|err| upload_err(Box::new(err)))?;
        channel.wait_eof().map_err(|err| upload_err(Box::new(err)))?;
        channel.close().map_err(|err| upload_err(Box::new(err)))?;
        channel
            .wait_close()
            .map_err(|err| upload_err(Box::new(err)))?;
        Ok(())
    }

    fn run(&mut self, command: &str) -> Result<CommandOutput, TransportError> {
        let exec_err = |source: Box<dyn std::error::Error + Send + Sync>| TransportError::Exec {
            source,
        };

        let mut channel = self
            .session
            .channel_session()
            .map_err(|err| exec_err(Box::new(err)))?;
        // interleave stderr into the captured output
        channel
            .handle_extended_data(ExtendedData::Merge)
            .map_err(|err| exec_err(Box::new(err)))?;
        channel.exec(command).map_err(|err| exec_err(Box::new(err)))?;

        let mut output = Vec::new();
        channel
            .read_to_end(&mut output)
            .map_err(|err| exec_err(Box::new(err)))?;
        channel
            .wait_close()
            .map_err(|err| exec_err(Box::new(err)))?;
        let exit = channel
            .exit_status()
            .map_err(|err| exec_err(Box::new(err)))?;

        Ok(CommandOutput { output, exit })
    }
}

// the Session (and its TcpStream) shut down when SshConnection drops
