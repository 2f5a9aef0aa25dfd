use core::str::FromStr;
use std::{fs::File, net::ToSocketAddrs, path::Path};

use chrono::{DateTime, Utc};
use suppaftp::{FtpError, FtpStream, Mode, Status, list, types::FileType};
use tracing::{info, warn};

use crate::config::FtpConfig;

use super::{BackendFailure, ContainerId, Entry, StorageBackend, StorageError, StorageSession};

/// Backups on an FTP server under `<remote_path>/<dataset>/`.
#[derive(Debug, Clone)]
pub struct FtpBackend {
    config: FtpConfig,
}

impl FtpBackend {
    /// A backend for the configured server.
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }
}

impl StorageBackend for FtpBackend {
    fn name(&self) -> &str {
        "ftp"
    }

    fn open(&self) -> Result<Box<dyn StorageSession + '_>, StorageError> {
        Ok(Box::new(FtpSession::connect(&self.config)?))
    }
}

/// A logged in FTP connection. Dropping the session logs out and closes the connection.
struct FtpSession<'a> {
    config: &'a FtpConfig,
    stream: FtpStream,
}

impl<'a> FtpSession<'a> {
    fn connect(config: &'a FtpConfig) -> Result<Self, StorageError> {
        let timeout = config.timeout();

        let address = (config.server.as_str(), config.port)
            .to_socket_addrs()
            .map_err(|e| StorageError::Unavailable(e.into()))?
            .next()
            .ok_or_else(|| {
                StorageError::Unavailable(BackendFailure::Unexpected(format!(
                    "'{}' did not resolve to an address",
                    config.server
                )))
            })?;

        let stream = FtpStream::connect_timeout(address, timeout)
            .map_err(|e| StorageError::Unavailable(e.into()))?;

        // Set timeouts
        {
            let socket = stream.get_ref();
            socket
                .set_read_timeout(Some(timeout))
                .map_err(|e| StorageError::Unavailable(e.into()))?;
            socket
                .set_write_timeout(Some(timeout))
                .map_err(|e| StorageError::Unavailable(e.into()))?;
        }

        // The session owns the connection from here, any failure below still quits on drop.
        let mut session = Self { config, stream };

        session
            .stream
            .login(config.user.as_str(), config.password.as_str())
            .map_err(|e| StorageError::Unavailable(e.into()))?;
        session.stream.set_mode(Mode::Passive);
        session
            .stream
            .transfer_type(FileType::Binary)
            .map_err(|e| StorageError::Unavailable(e.into()))?;

        info!("Connected to ftp://{}:{}", config.server, config.port);

        Ok(session)
    }

    fn list(&mut self, container: &ContainerId) -> Result<Vec<list::File>, StorageError> {
        let lines = self
            .stream
            .list(Some(container.0.as_str()))
            .map_err(|e| {
                classify(e, |failure| {
                    StorageError::ListFailed(container.0.clone(), failure)
                })
            })?;

        Ok(parse_listing(&lines))
    }
}

impl Drop for FtpSession<'_> {
    fn drop(&mut self) {
        if let Err(error) = self.stream.quit() {
            warn!(
                "Could not log out of ftp://{}:{}: {error}",
                self.config.server, self.config.port
            );
        }
    }
}

impl StorageSession for FtpSession<'_> {
    fn root(&self) -> ContainerId {
        ContainerId(self.config.remote_path.clone())
    }

    fn list_containers(&mut self, parent: &ContainerId) -> Result<Vec<String>, StorageError> {
        let mut names: Vec<String> = self
            .list(parent)?
            .into_iter()
            .filter(|file| file.is_directory() && !matches!(file.name(), "." | ".."))
            .map(|file| file.name().to_string())
            .collect();
        names.sort();

        Ok(names)
    }

    fn list_entries(&mut self, container: &ContainerId) -> Result<Vec<Entry>, StorageError> {
        let entries = self
            .list(container)?
            .into_iter()
            .filter(list::File::is_file)
            .map(|file| Entry {
                name: file.name().to_string(),
                modified: Some(DateTime::<Utc>::from(file.modified())),
                id: join_remote(&container.0, file.name()),
            })
            .collect();

        Ok(entries)
    }

    fn ensure_container(
        &mut self,
        name: &str,
        parent: &ContainerId,
    ) -> Result<ContainerId, StorageError> {
        let path = join_remote(&parent.0, name);

        let exists = self
            .list_containers(parent)
            .map_err(|error| match error {
                StorageError::ListFailed(_, failure) => {
                    StorageError::EnsureContainerFailed(path.clone(), failure)
                }
                other => other,
            })?
            .iter()
            .any(|existing| existing == name);

        if !exists {
            self.stream
                .mkdir(path.as_str())
                .map_err(|e| {
                    classify(e, |failure| {
                        StorageError::EnsureContainerFailed(path.clone(), failure)
                    })
                })?;
            info!("Created remote directory {path}");
        }

        Ok(ContainerId(path))
    }

    fn delete(&mut self, entry: &Entry) -> Result<(), StorageError> {
        self.stream
            .rm(entry.id.as_str())
            .map_err(|e| {
                classify(e, |failure| {
                    StorageError::DeleteFailed(entry.id.clone(), failure)
                })
            })
    }

    fn put(
        &mut self,
        local_path: &Path,
        container: &ContainerId,
        name: &str,
    ) -> Result<(), StorageError> {
        let remote_path = join_remote(&container.0, name);
        let failed = |failure: BackendFailure| {
            StorageError::UploadFailed(local_path.to_path_buf(), remote_path.clone(), failure)
        };

        let mut file = File::open(local_path).map_err(|e| failed(e.into()))?;
        self.stream
            .put_file(remote_path.as_str(), &mut file)
            .map_err(|e| classify(e, failed))?;

        Ok(())
    }
}

/// Lost connections, unreadable replies and a server closing the session make the whole backend
/// unavailable. Any other refusal only fails the item.
fn classify(
    error: FtpError,
    otherwise: impl FnOnce(BackendFailure) -> StorageError,
) -> StorageError {
    let unavailable = match &error {
        FtpError::ConnectionError(_) | FtpError::BadResponse => true,
        FtpError::UnexpectedResponse(response) => {
            matches!(response.status, Status::NotAvailable | Status::NotLoggedIn)
        }
        _ => false,
    };

    if unavailable {
        StorageError::Unavailable(error.into())
    } else {
        otherwise(error.into())
    }
}

/// Join a remote directory and a name with a single `/`.
fn join_remote(parent: &str, name: &str) -> String {
    format!("{}/{name}", parent.trim_end_matches('/'))
}

/// Parse the lines of a `LIST` response, skipping lines that are not understood.
fn parse_listing(lines: &[String]) -> Vec<list::File> {
    lines
        .iter()
        .filter_map(|line| match list::File::from_str(line) {
            Ok(file) => Some(file),
            Err(error) => {
                warn!("Could not parse listing line '{line}': {error}");
                None
            }
        })
        .collect()
}
