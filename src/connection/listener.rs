use std::io::{self, Write};
use std::net;
use std::path::PathBuf;

use rand::distributions::Alphanumeric;
use rand::Rng;
use tempfile::NamedTempFile;
use tokio::net::{TcpListener, TcpStream};
#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use crate::address::{self, escape, Bind};
use crate::error::{Error, ErrorKind, Result};

use super::{ReadHalf, WriteHalf};

enum Inner {
    #[cfg(unix)]
    Unix(UnixListener),
    Tcp(TcpListener),
}

/// A nonce which clients of a `nonce-tcp` listener must send before anything
/// else, published through a private file.
struct Nonce {
    bytes: [u8; 16],
    file: NamedTempFile,
}

impl Nonce {
    fn create() -> io::Result<Self> {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill(&mut bytes);

        let mut file = tempfile::Builder::new()
            .prefix("gdbus-nonce-file-")
            .tempfile()?;

        file.write_all(&bytes)?;
        file.flush()?;
        Ok(Self { bytes, file })
    }
}

/// A bound server socket.
pub(crate) struct Listener {
    inner: Inner,
    /// The concrete address clients connect to.
    address: String,
    /// A socket file to remove when the listener is dropped.
    socket_path: Option<PathBuf>,
    nonce: Option<Nonce>,
}

impl Listener {
    /// Bind the first entry of `address` which is supported and can be
    /// bound, falling back to later entries on failure.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn bind(address: &str) -> Result<Self> {
        let mut last_error = None;

        for entry in address::parse(address)? {
            let bound = entry.bind().and_then(|bind| match bind {
                Some(bind) => Self::bind_one(bind).map(Some),
                None => Ok(None),
            });

            match bound {
                Ok(Some(listener)) => return Ok(listener),
                Ok(None) => {}
                Err(error) => {
                    tracing::debug!(%error, "Failed to bind address entry");
                    last_error = Some(error);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::new(ErrorKind::UnsupportedAddress(address.into()))))
    }

    fn bind_one(bind: Bind) -> Result<Self> {
        match bind {
            Bind::Tcp { host, port, nonce } => {
                let listener = net::TcpListener::bind((host.as_str(), port))?;
                listener.set_nonblocking(true)?;
                let listener = TcpListener::from_std(listener)?;
                let port = listener.local_addr()?.port();

                let (transport, nonce) = if nonce {
                    ("nonce-tcp", Some(Nonce::create()?))
                } else {
                    ("tcp", None)
                };

                let mut address = format!("{transport}:host={},port={port}", escape(&host));

                if let Some(nonce) = &nonce {
                    let path = nonce.file.path().to_string_lossy();
                    address.push_str(&format!(",noncefile={}", escape(&path)));
                }

                Ok(Self {
                    inner: Inner::Tcp(listener),
                    address,
                    socket_path: None,
                    nonce,
                })
            }
            #[cfg(unix)]
            Bind::UnixPath(path) => Self::bind_path(path),
            #[cfg(unix)]
            Bind::UnixDir {
                dir,
                abstract_namespace,
            } => {
                let path = dir.join(format!("dbus-{}", random_name()));

                if abstract_namespace {
                    Self::bind_abstract(path.to_string_lossy().into_owned())
                } else {
                    Self::bind_path(path)
                }
            }
            #[cfg(unix)]
            Bind::UnixAbstract(name) => Self::bind_abstract(name),
            #[cfg(not(unix))]
            bind => Err(Error::new(ErrorKind::UnsupportedAddress(
                format!("{bind:?}").into(),
            ))),
        }
    }

    #[cfg(unix)]
    fn bind_path(path: PathBuf) -> Result<Self> {
        let listener = UnixListener::bind(&path)?;
        let address = format!("unix:path={}", escape(&path.to_string_lossy()));

        Ok(Self {
            inner: Inner::Unix(listener),
            address,
            socket_path: Some(path),
            nonce: None,
        })
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn bind_abstract(name: String) -> Result<Self> {
        #[cfg(target_os = "android")]
        use std::os::android::net::SocketAddrExt;
        #[cfg(target_os = "linux")]
        use std::os::linux::net::SocketAddrExt;

        let addr = std::os::unix::net::SocketAddr::from_abstract_name(name.as_bytes())?;
        let listener = std::os::unix::net::UnixListener::bind_addr(&addr)?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            inner: Inner::Unix(UnixListener::from_std(listener)?),
            address: format!("unix:abstract={}", escape(&name)),
            socket_path: None,
            nonce: None,
        })
    }

    #[cfg(all(unix, not(any(target_os = "linux", target_os = "android"))))]
    fn bind_abstract(name: String) -> Result<Self> {
        Err(Error::new(ErrorKind::UnsupportedAddress(
            format!("unix:abstract={}", escape(&name)).into(),
        )))
    }

    /// The address clients connect to, without a guid.
    pub(crate) fn address(&self) -> &str {
        &self.address
    }

    /// The nonce clients must send first, if any.
    pub(crate) fn nonce(&self) -> Option<[u8; 16]> {
        self.nonce.as_ref().map(|nonce| nonce.bytes)
    }

    /// Accept the next connection.
    pub(crate) async fn accept(&self) -> io::Result<Stream> {
        match &self.inner {
            #[cfg(unix)]
            Inner::Unix(listener) => Ok(Stream::Unix(listener.accept().await?.0)),
            Inner::Tcp(listener) => Ok(Stream::Tcp(listener.accept().await?.0)),
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(path) = self.socket_path.take() {
            if let Err(error) = std::fs::remove_file(&path) {
                tracing::warn!(path = %path.display(), %error, "Failed to remove socket");
            }
        }
    }
}

fn random_name() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect()
}

/// An accepted connection.
pub(crate) enum Stream {
    #[cfg(unix)]
    Unix(UnixStream),
    Tcp(TcpStream),
}

impl Stream {
    /// The user id of the peer, if the transport can tell.
    pub(crate) fn peer_uid(&self) -> Option<u32> {
        match self {
            #[cfg(unix)]
            Stream::Unix(stream) => stream.peer_cred().ok().map(|cred| cred.uid()),
            Stream::Tcp(..) => None,
        }
    }

    pub(crate) fn into_split(self) -> (ReadHalf, WriteHalf) {
        match self {
            #[cfg(unix)]
            Stream::Unix(stream) => {
                let (read, write) = stream.into_split();
                (Box::new(read), Box::new(write))
            }
            Stream::Tcp(stream) => {
                let (read, write) = stream.into_split();
                (Box::new(read), Box::new(write))
            }
        }
    }
}
