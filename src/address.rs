//! D-Bus server addresses.
//!
//! An address is a `;`-separated list of entries, each of the form
//! `transport:key=value,...`, where values may contain `%XX` escapes.

use std::path::PathBuf;

use crate::error::{Error, ErrorKind, Result};

/// A single parsed address entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Entry {
    transport: String,
    params: Vec<(String, String)>,
}

/// Where a listener should be bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Bind {
    /// A socket at a fixed filesystem path.
    UnixPath(PathBuf),
    /// A socket with a random name in a directory, in the abstract namespace
    /// if `abstract_namespace` is set.
    UnixDir {
        dir: PathBuf,
        abstract_namespace: bool,
    },
    /// A socket in the abstract namespace.
    UnixAbstract(String),
    /// A TCP socket, which requires a nonce to connect if `nonce` is set.
    Tcp {
        host: String,
        port: u16,
        nonce: bool,
    },
}

impl Entry {
    /// Get the value of a parameter.
    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Resolve what to bind, or `None` if the transport is not supported on
    /// this platform.
    pub(crate) fn bind(&self) -> Result<Option<Bind>> {
        let bind = match self.transport.as_str() {
            "unix" if cfg!(unix) => {
                if let Some(path) = self.get("path") {
                    Bind::UnixPath(PathBuf::from(path))
                } else if let Some(dir) = self.get("tmpdir") {
                    Bind::UnixDir {
                        dir: PathBuf::from(dir),
                        abstract_namespace: cfg!(any(target_os = "linux", target_os = "android")),
                    }
                } else if let Some(dir) = self.get("dir") {
                    Bind::UnixDir {
                        dir: PathBuf::from(dir),
                        abstract_namespace: false,
                    }
                } else if let Some(name) = self.get("abstract") {
                    if !cfg!(any(target_os = "linux", target_os = "android")) {
                        return Ok(None);
                    }

                    Bind::UnixAbstract(name.to_owned())
                } else {
                    return Err(invalid(self));
                }
            }
            transport @ ("tcp" | "nonce-tcp") => {
                let host = self.get("host").unwrap_or("localhost").to_owned();

                let port = match self.get("port") {
                    Some(port) => port.parse().map_err(|_| invalid(self))?,
                    None => 0,
                };

                Bind::Tcp {
                    host,
                    port,
                    nonce: transport == "nonce-tcp",
                }
            }
            _ => return Ok(None),
        };

        Ok(Some(bind))
    }
}

fn invalid(entry: &Entry) -> Error {
    let params = entry
        .params
        .iter()
        .map(|(k, v)| format!("{k}={}", escape(v)))
        .collect::<Vec<_>>();

    Error::new(ErrorKind::InvalidAddress(
        format!("{}:{}", entry.transport, params.join(",")).into(),
    ))
}

/// Parse an address into its entries.
pub(crate) fn parse(address: &str) -> Result<Vec<Entry>> {
    let error = || Error::new(ErrorKind::InvalidAddress(address.into()));

    let mut entries = Vec::new();

    for entry in address.split(';').filter(|e| !e.is_empty()) {
        let (transport, rest) = entry.split_once(':').ok_or_else(error)?;

        if transport.is_empty() {
            return Err(error());
        }

        let mut params = Vec::new();

        for param in rest.split(',').filter(|p| !p.is_empty()) {
            let (key, value) = param.split_once('=').ok_or_else(error)?;

            if key.is_empty() || params.iter().any(|(k, _)| k == key) {
                return Err(error());
            }

            params.push((key.to_owned(), unescape(value).ok_or_else(error)?));
        }

        entries.push(Entry {
            transport: transport.to_owned(),
            params,
        });
    }

    if entries.is_empty() {
        return Err(error());
    }

    Ok(entries)
}

/// Escape an address value.
pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());

    for b in value.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'/' | b'.' | b'\\' | b'*') {
            out.push(char::from(b));
        } else {
            out.push('%');
            out.push_str(&hex::encode([b]));
        }
    }

    out
}

fn unescape(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut n = 0;

    while let Some(&b) = bytes.get(n) {
        if b == b'%' {
            let hex = bytes.get(n + 1..n + 3)?;
            let mut decoded = [0u8];
            hex::decode_to_slice(hex, &mut decoded).ok()?;
            out.push(decoded[0]);
            n += 3;
        } else {
            out.push(b);
            n += 1;
        }
    }

    String::from_utf8(out).ok()
}

/// An address chosen when none was configured.
pub(crate) struct Allocated {
    pub(crate) address: String,
    /// A private directory to remove when the daemon finalizes.
    pub(crate) tmpdir: Option<tempfile::TempDir>,
    /// Require the connecting user to be the one running the daemon.
    pub(crate) same_user: bool,
    /// Accept the ANONYMOUS mechanism.
    pub(crate) anonymous: bool,
}

/// Choose a default address.
pub(crate) fn allocate() -> Result<Allocated> {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        Ok(Allocated {
            address: String::from("unix:tmpdir=/tmp/gdbus-daemon"),
            tmpdir: None,
            same_user: true,
            anonymous: false,
        })
    }

    #[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
    {
        use std::os::unix::fs::PermissionsExt;

        let tmpdir = tempfile::Builder::new()
            .prefix("gdbus-daemon-")
            .tempdir()?;

        std::fs::set_permissions(tmpdir.path(), std::fs::Permissions::from_mode(0o700))?;

        let path = tmpdir.path().to_string_lossy();

        Ok(Allocated {
            address: format!("unix:tmpdir={}", escape(&path)),
            tmpdir: Some(tmpdir),
            same_user: true,
            anonymous: false,
        })
    }

    #[cfg(not(unix))]
    {
        Ok(Allocated {
            address: String::from("nonce-tcp:"),
            tmpdir: None,
            same_user: false,
            anonymous: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{escape, parse, Bind};

    #[test]
    fn parse_entries() -> anyhow::Result<()> {
        let entries = parse("unix:path=/tmp/a%20b;tcp:host=127.0.0.1,port=4000")?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].get("path"), Some("/tmp/a b"));
        assert_eq!(
            entries[1].bind()?,
            Some(Bind::Tcp {
                host: String::from("127.0.0.1"),
                port: 4000,
                nonce: false,
            })
        );

        let entries = parse("nonce-tcp:")?;
        assert_eq!(
            entries[0].bind()?,
            Some(Bind::Tcp {
                host: String::from("localhost"),
                port: 0,
                nonce: true,
            })
        );

        let entries = parse("launchd:env=FOO")?;
        assert_eq!(entries[0].bind()?, None);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn unix_entries() -> anyhow::Result<()> {
        use std::path::PathBuf;

        let entries = parse("unix:dir=/run/x")?;
        assert_eq!(
            entries[0].bind()?,
            Some(Bind::UnixDir {
                dir: PathBuf::from("/run/x"),
                abstract_namespace: false,
            })
        );

        assert!(parse("unix:")?[0].bind().is_err());
        Ok(())
    }

    #[test]
    fn reject_invalid() {
        assert!(parse("").is_err());
        assert!(parse("unix").is_err());
        assert!(parse("unix:path").is_err());
        assert!(parse("unix:path=%zz").is_err());
        assert!(parse("unix:path=%2").is_err());
        assert!(parse("unix:path=a,path=b").is_err());
        assert!(parse("tcp:port=x")
            .and_then(|entries| entries[0].bind())
            .is_err());
    }

    #[test]
    fn escaping() {
        assert_eq!(escape("/tmp/gdbus-daemon"), "/tmp/gdbus-daemon");
        assert_eq!(escape("a b,c=d;"), "a%20b%2cc%3dd%3b");
    }
}
