use anyhow::{bail, Context, Result};
use sha1::{Digest, Sha1};

use super::{CookiePolicy, Keyring, Policy, SaslFailure, SaslServer, Step, CONTEXT};

const GUID: &str = "0123456789abcdef0123456789abcdef";

fn reply(line: &str) -> Step {
    Step::Reply(line.as_bytes().to_vec())
}

fn uid_hex(uid: u32) -> String {
    hex::encode(uid.to_string())
}

#[test]
fn external_with_initial_response() {
    let policy = Policy {
        allow_anonymous: false,
        same_user: Some(1000),
        cookie: None,
    };

    let mut sasl = SaslServer::new(GUID, policy, Some(1000));
    let line = format!("AUTH EXTERNAL {}\r\n", uid_hex(1000));

    assert_eq!(sasl.feed(line.as_bytes()), reply(&format!("OK {GUID}\r\n")));
    assert_eq!(sasl.feed(b"BEGIN\r\n"), Step::Begin);
}

#[test]
fn external_with_data() {
    let policy = Policy {
        allow_anonymous: false,
        same_user: None,
        cookie: None,
    };

    let mut sasl = SaslServer::new(GUID, policy, Some(42));
    assert_eq!(sasl.feed(b"AUTH EXTERNAL\r\n"), reply("DATA\r\n"));
    assert_eq!(sasl.feed(b"DATA\r\n"), reply(&format!("OK {GUID}\r\n")));
    assert_eq!(
        sasl.feed(b"NEGOTIATE_UNIX_FD\r\n"),
        reply("ERROR \"Unix fd passing is not supported\"\r\n")
    );
    assert_eq!(sasl.feed(b"BEGIN\r\n"), Step::Begin);
}

#[test]
fn external_wrong_user() {
    let policy = Policy {
        allow_anonymous: false,
        same_user: Some(1000),
        cookie: None,
    };

    let mut sasl = SaslServer::new(GUID, policy.clone(), Some(1001));
    let line = format!("AUTH EXTERNAL {}\r\n", uid_hex(1001));
    assert_eq!(sasl.feed(line.as_bytes()), reply("REJECTED EXTERNAL\r\n"));

    let mut sasl = SaslServer::new(GUID, policy, Some(1000));
    let line = format!("AUTH EXTERNAL {}\r\n", uid_hex(0));
    assert_eq!(sasl.feed(line.as_bytes()), reply("REJECTED EXTERNAL\r\n"));
}

#[test]
fn anonymous() {
    let allowed = Policy {
        allow_anonymous: true,
        same_user: None,
        cookie: None,
    };

    let mut sasl = SaslServer::new(GUID, allowed, None);
    assert_eq!(sasl.feed(b"AUTH\r\n"), reply("REJECTED ANONYMOUS\r\n"));
    assert_eq!(
        sasl.feed(b"AUTH EXTERNAL 31303030\r\n"),
        reply("REJECTED ANONYMOUS\r\n")
    );
    assert_eq!(
        sasl.feed(b"AUTH ANONYMOUS 7472616365\r\n"),
        reply(&format!("OK {GUID}\r\n"))
    );
    assert_eq!(sasl.feed(b"BEGIN\r\n"), Step::Begin);

    let denied = Policy {
        allow_anonymous: false,
        same_user: None,
        cookie: None,
    };

    let mut sasl = SaslServer::new(GUID, denied, Some(5));
    assert_eq!(
        sasl.feed(b"AUTH ANONYMOUS\r\n"),
        reply("REJECTED EXTERNAL\r\n")
    );
}

#[test]
fn protocol_errors() {
    let policy = Policy {
        allow_anonymous: true,
        same_user: None,
        cookie: None,
    };

    let mut sasl = SaslServer::new(GUID, policy.clone(), None);
    assert_eq!(
        sasl.feed(b"DATA 00\r\n"),
        reply("ERROR \"Unknown or unexpected command\"\r\n")
    );
    assert_eq!(
        sasl.feed(b"BEGIN\r\n"),
        Step::Close(SaslFailure::BeginWithoutAuth)
    );

    let mut sasl = SaslServer::new(GUID, policy, None);
    assert_eq!(
        sasl.feed(b"AUTH ANONYMOUS\r\n"),
        reply(&format!("OK {GUID}\r\n"))
    );
    assert_eq!(sasl.feed(b"CANCEL\r\n"), reply("REJECTED ANONYMOUS\r\n"));
    assert_eq!(
        sasl.feed(b"BEGIN\r\n"),
        Step::Close(SaslFailure::BeginWithoutAuth)
    );
}

#[test]
fn too_many_attempts() {
    let policy = Policy {
        allow_anonymous: false,
        same_user: None,
        cookie: None,
    };

    let mut sasl = SaslServer::new(GUID, policy, Some(1));

    for _ in 0..5 {
        assert_eq!(sasl.feed(b"AUTH FOO\r\n"), reply("REJECTED EXTERNAL\r\n"));
    }

    assert_eq!(
        sasl.feed(b"AUTH FOO\r\n"),
        Step::Close(SaslFailure::TooManyAttempts)
    );
}

fn cookie_policy(keyring: &Keyring) -> Policy {
    Policy {
        allow_anonymous: false,
        same_user: None,
        cookie: Some(CookiePolicy {
            uid: 1000,
            keyring: keyring.clone(),
        }),
    }
}

/// Start a cookie exchange, returning the id and server challenge sent to
/// the client.
fn start_cookie(sasl: &mut SaslServer<'_>, keyring: &Keyring) -> Result<(u32, String)> {
    let line = format!("AUTH DBUS_COOKIE_SHA1 {}\r\n", uid_hex(1000));
    assert_eq!(sasl.feed(line.as_bytes()), Step::LoadCookie(keyring.clone()));

    let Step::Reply(data) = sasl.challenge(keyring.cookie(CONTEXT)) else {
        bail!("expected DATA");
    };

    let data = String::from_utf8(data)?;
    let data = data
        .strip_prefix("DATA ")
        .and_then(|data| data.strip_suffix("\r\n"))
        .context("malformed DATA")?;

    let data = String::from_utf8(hex::decode(data)?)?;
    let mut tokens = data.split(' ');
    assert_eq!(tokens.next(), Some(CONTEXT));
    let id = tokens.next().context("id")?.parse()?;
    let challenge = tokens.next().context("challenge")?.to_owned();
    assert_eq!(challenge.len(), 16);
    assert!(tokens.next().is_none());
    Ok((id, challenge))
}

fn cookie_data(client_challenge: &str, digest: &str) -> String {
    format!("DATA {}\r\n", hex::encode(format!("{client_challenge} {digest}")))
}

#[test]
fn cookie_sha1() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let keyring = Keyring::new(dir.path().join("keyrings"));

    let mut sasl = SaslServer::new(GUID, cookie_policy(&keyring), None);
    let (id, challenge) = start_cookie(&mut sasl, &keyring)?;

    let cookie = keyring.cookie(CONTEXT)?;
    assert_eq!(cookie.id, id);

    let digest = hex::encode(Sha1::digest(
        format!("{challenge}:abcdef:{}", cookie.secret).as_bytes(),
    ));

    let line = cookie_data("abcdef", &digest);
    assert_eq!(sasl.feed(line.as_bytes()), reply(&format!("OK {GUID}\r\n")));
    assert_eq!(sasl.feed(b"BEGIN\r\n"), Step::Begin);
    Ok(())
}

#[test]
fn cookie_sha1_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let keyring = Keyring::new(dir.path());
    let mut sasl = SaslServer::new(GUID, cookie_policy(&keyring), None);

    // Another user, or no user at all.
    let line = format!("AUTH DBUS_COOKIE_SHA1 {}\r\n", uid_hex(0));
    assert_eq!(sasl.feed(line.as_bytes()), reply("REJECTED DBUS_COOKIE_SHA1\r\n"));
    assert_eq!(
        sasl.feed(b"AUTH DBUS_COOKIE_SHA1\r\n"),
        reply("REJECTED DBUS_COOKIE_SHA1\r\n")
    );

    // A digest computed with the wrong secret.
    let (_, challenge) = start_cookie(&mut sasl, &keyring)?;
    let digest = hex::encode(Sha1::digest(format!("{challenge}:abcdef:00").as_bytes()));
    let line = cookie_data("abcdef", &digest);
    assert_eq!(sasl.feed(line.as_bytes()), reply("REJECTED DBUS_COOKIE_SHA1\r\n"));

    // A response which isn't two words.
    start_cookie(&mut sasl, &keyring)?;
    let line = format!("DATA {}\r\n", hex::encode("abcdef"));
    assert_eq!(sasl.feed(line.as_bytes()), reply("REJECTED DBUS_COOKIE_SHA1\r\n"));

    // The exchange is over once rejected.
    assert_eq!(
        sasl.feed(line.as_bytes()),
        reply("ERROR \"Unknown or unexpected command\"\r\n")
    );
    Ok(())
}

#[test]
fn cookie_sha1_unreadable_keyring() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let file = dir.path().join("file");
    std::fs::write(&file, "")?;

    // The keyring directory is a regular file.
    let keyring = Keyring::new(&file);
    let mut sasl = SaslServer::new(GUID, cookie_policy(&keyring), None);

    let line = format!("AUTH DBUS_COOKIE_SHA1 {}\r\n", uid_hex(1000));
    assert_eq!(sasl.feed(line.as_bytes()), Step::LoadCookie(keyring.clone()));
    assert_eq!(
        sasl.challenge(keyring.cookie(CONTEXT)),
        reply("REJECTED DBUS_COOKIE_SHA1\r\n")
    );
    Ok(())
}
