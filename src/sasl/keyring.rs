//! The cookie keyring used by `DBUS_COOKIE_SHA1`.
//!
//! Cookies live in `~/.dbus-keyrings/<context>`, one per line as
//! `<id> <created> <hex cookie>`. Everyone able to read the file is trusted
//! to be the user who owns it. Access is serialized through a `.lock` file
//! next to the keyring, so all of this is blocking I/O.

use std::env;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;

/// The cookie context used by the daemon.
pub(crate) const CONTEXT: &str = "org_gtk_gdbus_general";

/// Cookies younger than this are handed out again.
const NEW_KEY_TIMEOUT: i64 = 300;
/// Cookies older than this are removed.
const EXPIRE_KEYS_TIMEOUT: i64 = 420;
/// Cookies created further in the future than this are removed.
const MAX_TIME_TRAVEL: i64 = 300;

const LOCK_ATTEMPTS: u32 = 50;
const LOCK_INTERVAL: Duration = Duration::from_millis(10);

const DIR_ENV: &str = "G_DBUS_COOKIE_SHA1_KEYRING_DIR";
const IGNORE_PERMISSION_ENV: &str = "G_DBUS_COOKIE_SHA1_KEYRING_DIR_IGNORE_PERMISSION";

/// A cookie from the keyring.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Cookie {
    pub(crate) id: u32,
    pub(crate) secret: String,
}

/// A directory of cookie keyrings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Keyring {
    dir: PathBuf,
}

impl Keyring {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The keyring directory of the current user, which is
    /// `G_DBUS_COOKIE_SHA1_KEYRING_DIR` if set and `$HOME/.dbus-keyrings`
    /// otherwise.
    pub(crate) fn from_env() -> Option<Self> {
        if let Some(dir) = env::var_os(DIR_ENV) {
            return Some(Self::new(dir));
        }

        let home = env::var_os("HOME").filter(|home| !home.is_empty())?;
        Some(Self::new(PathBuf::from(home).join(".dbus-keyrings")))
    }

    /// Get a recent cookie for `context`, generating a new one if there is
    /// none. Stale cookies are removed from the keyring.
    pub(crate) fn cookie(&self, context: &str) -> io::Result<Cookie> {
        self.ensure_dir()?;

        let path = self.dir.join(context);
        let _lock = Lock::acquire(&path)?;

        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => String::new(),
            Err(error) => return Err(error),
        };

        let now = unix_now();
        let mut kept = Vec::new();
        let mut changed = false;

        for (n, line) in contents.lines().enumerate() {
            if line.is_empty() {
                continue;
            }

            let entry = Entry::parse(line).ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("line {} of keyring {} is malformed", n + 1, path.display()),
                )
            })?;

            let expired = if entry.created > now {
                entry.created - now > MAX_TIME_TRAVEL
            } else {
                now - entry.created > EXPIRE_KEYS_TIMEOUT
            };

            if expired {
                tracing::debug!(id = entry.id, created = entry.created, "Removing stale cookie");
                changed = true;
            } else {
                kept.push(entry);
            }
        }

        let reusable = kept
            .iter()
            .find(|entry| now - entry.created < NEW_KEY_TIMEOUT)
            .map(|entry| Cookie {
                id: entry.id,
                secret: entry.secret.clone(),
            });

        let cookie = match reusable {
            Some(cookie) => cookie,
            None => {
                let id = kept
                    .iter()
                    .map(|entry| entry.id)
                    .max()
                    .unwrap_or(0)
                    .wrapping_add(1);

                let secret = hex::encode(rand::thread_rng().gen::<[u8; 32]>());

                kept.push(Entry {
                    id,
                    created: now,
                    secret: secret.clone(),
                });

                changed = true;
                Cookie { id, secret }
            }
        };

        if changed {
            let mut file = tempfile::NamedTempFile::new_in(&self.dir)?;

            for entry in &kept {
                writeln!(file, "{} {} {}", entry.id, entry.created, entry.secret)?;
            }

            file.as_file().sync_all()?;
            file.persist(&path).map_err(|error| error.error)?;
        }

        Ok(cookie)
    }

    /// Create the keyring directory, or check that an existing one is only
    /// accessible by its owner.
    fn ensure_dir(&self) -> io::Result<()> {
        match fs::metadata(&self.dir) {
            Ok(metadata) => {
                if !metadata.is_dir() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("keyring {} is not a directory", self.dir.display()),
                    ));
                }

                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;

                    let mode = metadata.permissions().mode() & 0o777;

                    if mode != 0o700 && env::var_os(IGNORE_PERMISSION_ENV).is_none() {
                        return Err(io::Error::new(
                            io::ErrorKind::PermissionDenied,
                            format!(
                                "keyring {} has mode {mode:o}, expected 700",
                                self.dir.display()
                            ),
                        ));
                    }
                }

                Ok(())
            }
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                let mut builder = fs::DirBuilder::new();
                builder.recursive(true);

                #[cfg(unix)]
                {
                    use std::os::unix::fs::DirBuilderExt;
                    builder.mode(0o700);
                }

                builder.create(&self.dir)
            }
            Err(error) => Err(error),
        }
    }
}

struct Entry {
    id: u32,
    created: i64,
    secret: String,
}

impl Entry {
    fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split(' ');
        let id = tokens.next()?.parse().ok()?;
        let created = tokens.next()?.parse().ok()?;
        let secret = tokens.next()?.to_owned();

        if tokens.next().is_some() {
            return None;
        }

        Some(Self {
            id,
            created,
            secret,
        })
    }
}

/// An exclusive lock on a keyring file, released when dropped.
struct Lock {
    path: PathBuf,
    _file: File,
}

impl Lock {
    fn acquire(keyring: &Path) -> io::Result<Self> {
        let mut path = OsString::from(keyring.as_os_str());
        path.push(".lock");
        let path = PathBuf::from(path);

        let mut attempts = 0;
        let mut modified = None;

        while attempts < LOCK_ATTEMPTS {
            match create_exclusive(&path) {
                Ok(file) => return Ok(Self { path, _file: file }),
                Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {}
                Err(error) => return Err(error),
            }

            thread::sleep(LOCK_INTERVAL);

            // A lock which is still being touched is held by a live process.
            let previous = modified;
            modified = fs::metadata(&path).and_then(|m| m.modified()).ok();

            if previous.is_none() || previous == modified {
                attempts += 1;
            }
        }

        tracing::warn!(path = %path.display(), "Removing stale keyring lock");
        fs::remove_file(&path)?;

        let file = create_exclusive(&path)?;
        Ok(Self { path, _file: file })
    }
}

impl Drop for Lock {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), %error, "Failed to remove keyring lock");
        }
    }
}

fn create_exclusive(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    options.open(path)
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;

    use super::{unix_now, Keyring, CONTEXT};

    #[test]
    fn cookie_is_reused() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let keyring = Keyring::new(dir.path().join("keyrings"));

        let first = keyring.cookie(CONTEXT)?;
        let second = keyring.cookie(CONTEXT)?;
        assert_eq!(first, second);
        assert_eq!(first.id, 1);
        assert_eq!(first.secret.len(), 64);

        let contents = fs::read_to_string(dir.path().join("keyrings").join(CONTEXT))?;
        assert_eq!(contents.lines().count(), 1);
        assert!(!dir.path().join("keyrings").join(format!("{CONTEXT}.lock")).exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mode = fs::metadata(dir.path().join("keyrings"))?.permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }

        Ok(())
    }

    #[test]
    fn stale_cookies_are_removed() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let keyring = Keyring::new(dir.path());
        let now = unix_now();

        let contents = format!(
            "1 {} aa\n7 {} bb\n3 {} cc\n",
            now - 1000,
            now - 350,
            now + 1000
        );

        fs::write(dir.path().join(CONTEXT), contents)?;

        // The remaining cookie is too old to be handed out again.
        let cookie = keyring.cookie(CONTEXT)?;
        assert_eq!(cookie.id, 8);

        let contents = fs::read_to_string(dir.path().join(CONTEXT))?;
        let ids = contents
            .lines()
            .map(|line| line.split(' ').next().unwrap_or_default())
            .collect::<Vec<_>>();

        assert_eq!(ids, ["7", "8"]);
        Ok(())
    }

    #[test]
    fn malformed_keyring() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let keyring = Keyring::new(dir.path());

        fs::write(dir.path().join(CONTEXT), "1 2\n")?;
        assert!(keyring.cookie(CONTEXT).is_err());

        fs::write(dir.path().join(CONTEXT), "x 2 aa\n")?;
        assert!(keyring.cookie(CONTEXT).is_err());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn open_directory_is_refused() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755))?;

        assert!(Keyring::new(dir.path()).cookie(CONTEXT).is_err());
        Ok(())
    }

    #[test]
    fn stale_lock_is_broken() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let keyring = Keyring::new(dir.path());
        let lock = dir.path().join(format!("{CONTEXT}.lock"));

        fs::write(&lock, "")?;
        keyring.cookie(CONTEXT)?;
        assert!(!lock.exists());
        Ok(())
    }
}
