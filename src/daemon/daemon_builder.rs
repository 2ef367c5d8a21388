use std::path::PathBuf;
use std::time::Duration;

use crate::address;
use crate::connection::Listener;
use crate::error::Result;
use crate::sasl::{CookiePolicy, Keyring, Policy};

use super::Daemon;

/// The default time the daemon waits after the last client disconnected
/// before signalling that it's idle.
pub(super) const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(3000);

/// Builder of a [`Daemon`].
#[derive(Debug, Clone)]
pub struct DaemonBuilder {
    address: Option<String>,
    idle_timeout: Duration,
    require_same_user: Option<bool>,
    allow_anonymous: Option<bool>,
    keyring_dir: Option<PathBuf>,
}

impl DaemonBuilder {
    /// Construct a new daemon builder.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_dbus_daemon::DaemonBuilder;
    ///
    /// let d = DaemonBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self {
            address: None,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            require_same_user: None,
            allow_anonymous: None,
            keyring_dir: None,
        }
    }

    /// Listen on the given D-Bus address, such as `unix:tmpdir=/tmp` or
    /// `tcp:host=127.0.0.1,port=0`.
    ///
    /// If no address is set, a private address is allocated for the current
    /// platform.
    ///
    /// # Examples
    ///
    /// ```
    /// use tokio_dbus_daemon::DaemonBuilder;
    ///
    /// # #[tokio::main] async fn main() -> tokio_dbus_daemon::Result<()> {
    /// let d = DaemonBuilder::new().address("tcp:host=127.0.0.1").build()?;
    /// assert!(d.client_address().starts_with("tcp:host=127.0.0.1,port="));
    /// # Ok(()) }
    /// ```
    pub fn address(&mut self, address: impl Into<String>) -> &mut Self {
        self.address = Some(address.into());
        self
    }

    /// Set how long to wait after the last client disconnected before the
    /// idle timeout fires. Defaults to three seconds.
    pub fn idle_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.idle_timeout = timeout;
        self
    }

    /// Require clients to authenticate as the user running the daemon.
    ///
    /// This is the default when the address is allocated on a Unix platform.
    pub fn require_same_user(&mut self, require: bool) -> &mut Self {
        self.require_same_user = Some(require);
        self
    }

    /// Accept the `ANONYMOUS` authentication mechanism.
    ///
    /// This is the default when the address is allocated on Windows.
    pub fn allow_anonymous(&mut self, allow: bool) -> &mut Self {
        self.allow_anonymous = Some(allow);
        self
    }

    /// Read `DBUS_COOKIE_SHA1` cookies from this directory.
    ///
    /// Defaults to `G_DBUS_COOKIE_SHA1_KEYRING_DIR` if set, otherwise
    /// `$HOME/.dbus-keyrings`. The mechanism lets clients running as the
    /// same user authenticate over TCP, where the peer credentials EXTERNAL
    /// relies on are not available.
    pub fn keyring_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.keyring_dir = Some(dir.into());
        self
    }

    /// Bind the listener and construct a [`Daemon`] with the current
    /// configuration.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(&self) -> Result<Daemon> {
        let (address, tmpdir, same_user, anonymous) = match &self.address {
            Some(address) => (address.clone(), None, false, false),
            None => {
                let allocated = address::allocate()?;

                (
                    allocated.address,
                    allocated.tmpdir,
                    allocated.same_user,
                    allocated.anonymous,
                )
            }
        };

        let same_user = if self.require_same_user.unwrap_or(same_user) {
            Some(effective_uid()?)
        } else {
            None
        };

        let keyring = match &self.keyring_dir {
            Some(dir) => Some(Keyring::new(dir)),
            None => Keyring::from_env(),
        };

        // Cookies are only handed out to the user running the daemon.
        let cookie = match (keyring, effective_uid()) {
            (Some(keyring), Ok(uid)) => Some(CookiePolicy { uid, keyring }),
            _ => None,
        };

        let policy = Policy {
            allow_anonymous: self.allow_anonymous.unwrap_or(anonymous),
            same_user,
            cookie,
        };

        let listener = Listener::bind(&address)?;
        let guid = generate_guid();

        let client_address = format!(
            "{},guid={}",
            listener.address(),
            address::escape(&guid)
        );

        tracing::debug!(%address, %client_address, ?policy, "Bound daemon");

        Ok(Daemon {
            listener,
            guid: guid.into(),
            client_address,
            policy,
            idle_timeout: self.idle_timeout,
            tmpdir,
        })
    }
}

impl Default for DaemonBuilder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

fn generate_guid() -> String {
    let bytes = rand::random::<[u8; 16]>();
    hex::encode(bytes)
}

#[cfg(all(unix, feature = "libc"))]
pub(super) fn effective_uid() -> Result<u32> {
    // SAFETY: geteuid is always successful and has no side effects.
    Ok(unsafe { libc::geteuid() })
}

#[cfg(not(all(unix, feature = "libc")))]
pub(super) fn effective_uid() -> Result<u32> {
    Err(crate::error::ErrorKind::SameUserUnsupported.into())
}
