use std::fmt;

use crate::message::Arg;
use crate::org_freedesktop_dbus::DESTINATION;
use crate::proto::MessageType;
use crate::Message;

use super::names::Names;

/// Error raised when a match rule can't be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct InvalidRule;

impl fmt::Display for InvalidRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid match rule")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Sender,
    Interface,
    Member,
    Path,
    PathNamespace,
    Destination,
    Arg0Namespace,
    Arg(usize),
    ArgPath(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Element {
    key: Key,
    value: Box<str>,
}

/// A parsed match rule as installed through `AddMatch`.
///
/// Two rules are equal if they have the same type, eavesdrop setting and
/// elements in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Match {
    eavesdrop: bool,
    message_type: Option<MessageType>,
    elements: Vec<Element>,
}

impl Match {
    /// Parse a match rule such as
    /// `type='signal',interface='com.example.I',arg0='hello'`.
    pub(crate) fn parse(rule: &str) -> Result<Self, InvalidRule> {
        let bytes = rule.as_bytes();

        let mut this = Self {
            eavesdrop: false,
            message_type: None,
            elements: Vec::new(),
        };

        let mut p = 0;

        while p < bytes.len() {
            while bytes.get(p).is_some_and(u8::is_ascii_whitespace) {
                p += 1;
            }

            let key_start = p;

            while bytes
                .get(p)
                .is_some_and(|&b| b != b'=' && !b.is_ascii_whitespace())
            {
                p += 1;
            }

            let key = &rule[key_start..p];

            while bytes.get(p).is_some_and(u8::is_ascii_whitespace) {
                p += 1;
            }

            if key.is_empty() {
                // Trailing whitespace.
                if p == bytes.len() {
                    break;
                }

                return Err(InvalidRule);
            }

            if bytes.get(p) != Some(&b'=') {
                return Err(InvalidRule);
            }

            p += 1;

            let (value, rest) = parse_value(&bytes[p..])?;
            p = bytes.len() - rest.len();

            match key {
                "eavesdrop" => {
                    this.eavesdrop = match value.as_str() {
                        "true" => true,
                        "false" => false,
                        _ => return Err(InvalidRule),
                    };
                }
                "type" => {
                    this.message_type = match value.as_str() {
                        "signal" => Some(MessageType::SIGNAL),
                        "method_call" => Some(MessageType::METHOD_CALL),
                        "method_return" => Some(MessageType::METHOD_RETURN),
                        "error" => Some(MessageType::ERROR),
                        _ => return Err(InvalidRule),
                    };
                }
                key => {
                    this.elements.push(Element {
                        key: parse_key(key)?,
                        value: value.into(),
                    });
                }
            }
        }

        Ok(this)
    }

    /// Test if the rule matches `message`.
    ///
    /// `has_destination` indicates that the message was routed to a resolved
    /// unicast recipient, in which case only eavesdropping rules match.
    pub(crate) fn matches(&self, message: &Message, has_destination: bool, names: &Names) -> bool {
        if has_destination && !self.eavesdrop {
            return false;
        }

        if let Some(message_type) = self.message_type {
            if message.message_type() != message_type {
                return false;
            }
        }

        self.elements
            .iter()
            .all(|element| element.matches(message, names))
    }
}

impl Element {
    fn matches(&self, message: &Message, names: &Names) -> bool {
        let value = &*self.value;

        match self.key {
            Key::Sender => {
                check_name(value, message.sender().unwrap_or(DESTINATION), names)
            }
            Key::Destination => match message.destination() {
                Some(destination) => check_name(value, destination, names),
                None => false,
            },
            Key::Interface => message.interface() == Some(value),
            Key::Member => message.member() == Some(value),
            Key::Path => message.path().is_some_and(|path| path.as_str() == value),
            Key::PathNamespace => match message.path() {
                Some(path) => value == "/" || is_prefix(value, path.as_str(), b'/'),
                None => false,
            },
            Key::Arg0Namespace => match message.body().arg(0) {
                Some(Arg::String(arg)) => is_prefix(value, arg, b'.'),
                _ => false,
            },
            Key::Arg(n) => match message.body().arg(n) {
                Some(Arg::String(arg)) => arg == value,
                _ => false,
            },
            Key::ArgPath(n) => match message.body().arg(n) {
                Some(Arg::String(arg) | Arg::ObjectPath(arg)) => is_path_related(value, arg),
                _ => false,
            },
        }
    }
}

/// Parse a possibly quoted value, returning it and the remaining input after
/// the terminating comma.
fn parse_value(bytes: &[u8]) -> Result<(String, &[u8]), InvalidRule> {
    let mut value = Vec::new();
    let mut quoted = false;
    let mut escaped = false;
    let mut p = 0;

    while let Some(&b) = bytes.get(p) {
        p += 1;

        if escaped {
            if b != b'\'' {
                value.push(b'\\');
            }

            value.push(b);
            escaped = false;
            continue;
        }

        match b {
            b'\'' => quoted = !quoted,
            b'\\' if !quoted => escaped = true,
            b',' if !quoted => break,
            b => value.push(b),
        }
    }

    if escaped {
        value.push(b'\\');
    }

    if quoted {
        return Err(InvalidRule);
    }

    let value = String::from_utf8(value).map_err(|_| InvalidRule)?;
    Ok((value, &bytes[p..]))
}

fn parse_key(key: &str) -> Result<Key, InvalidRule> {
    let key = match key {
        "sender" => Key::Sender,
        "interface" => Key::Interface,
        "member" => Key::Member,
        "path" => Key::Path,
        "path_namespace" => Key::PathNamespace,
        "destination" => Key::Destination,
        "arg0namespace" => Key::Arg0Namespace,
        key => {
            let Some(rest) = key.strip_prefix("arg") else {
                return Err(InvalidRule);
            };

            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();

            if digits == 0 {
                return Err(InvalidRule);
            }

            let n = rest[..digits].parse::<usize>().map_err(|_| InvalidRule)?;

            match &rest[digits..] {
                "" => Key::Arg(n),
                "path" => Key::ArgPath(n),
                _ => return Err(InvalidRule),
            }
        }
    };

    Ok(key)
}

/// Compare a sender or destination, resolving `expected` through the name
/// registry if it has an owner.
fn check_name(expected: &str, actual: &str, names: &Names) -> bool {
    match names.owner(expected) {
        Some(owner) => owner == actual,
        None => expected == actual,
    }
}

/// Test if `value` is `prefix` or continues with `separator` after it.
fn is_prefix(prefix: &str, value: &str, separator: u8) -> bool {
    match value.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.as_bytes()[0] == separator,
        None => false,
    }
}

fn is_path_related(a: &str, b: &str) -> bool {
    a == b || (b.ends_with('/') && a.starts_with(b)) || (a.ends_with('/') && b.starts_with(a))
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use crate::org_freedesktop_dbus::NameFlag;
    use crate::{BodyBuf, Message, ObjectPath};

    use super::super::names::Names;
    use super::{InvalidRule, Match};

    fn signal(path: &str, arg0: &str) -> Message {
        let mut body = BodyBuf::new();
        body.write(arg0);

        Message::signal(
            ObjectPath::new(path).expect("path"),
            "com.example.I",
            "S",
            NonZeroU32::MIN,
        )
        .with_sender(":1.1")
        .with_body(body)
    }

    fn matches(rule: &str, message: &Message) -> bool {
        let names = Names::new();
        Match::parse(rule).expect(rule).matches(message, false, &names)
    }

    #[test]
    fn parse_rules() {
        assert!(Match::parse("").is_ok());
        assert!(Match::parse("  type = 'signal' ,member='S'  ").is_err());
        assert!(Match::parse("type ='signal',member='S'  ").is_ok());
        assert!(Match::parse("type='signal',arg3='x',arg10path='/a/'").is_ok());
        assert!(Match::parse("eavesdrop=true").is_ok());

        assert_eq!(Match::parse("type='bogus'"), Err(InvalidRule));
        assert_eq!(Match::parse("eavesdrop=maybe"), Err(InvalidRule));
        assert_eq!(Match::parse("sender"), Err(InvalidRule));
        assert_eq!(Match::parse("sender='a"), Err(InvalidRule));
        assert_eq!(Match::parse("bogus='a'"), Err(InvalidRule));
        assert_eq!(Match::parse("argpath='/a'"), Err(InvalidRule));
        assert_eq!(Match::parse("arg1x='a'"), Err(InvalidRule));
        assert_eq!(Match::parse("='a'"), Err(InvalidRule));
    }

    #[test]
    fn rule_equality() {
        let a = Match::parse("type='signal',interface='com.example.I'");
        let b = Match::parse("type=signal,interface=com.example.I");
        assert_eq!(a, b);

        let c = Match::parse("interface='com.example.I',type='signal'");
        assert_eq!(a, c);

        let d = Match::parse("interface='com.example.I',member='S'");
        let e = Match::parse("member='S',interface='com.example.I'");
        assert_ne!(d, e);
    }

    #[test]
    fn quoting() {
        let m = signal("/", "it's");
        assert!(matches(r"arg0='it'\''s'", &m));
        assert!(matches(r"arg0=it\'s", &m));
        assert!(!matches("arg0='it'", &m));

        let m = signal("/", r"a\b");
        assert!(matches(r"arg0=a\b", &m));
        assert!(matches(r"arg0='a\b'", &m));

        let m = signal("/", "a,b");
        assert!(matches("arg0='a,b'", &m));
    }

    #[test]
    fn path_namespace() {
        let m = signal("/org/example/Foo", "x");
        assert!(matches("path_namespace='/'", &m));
        assert!(matches("path_namespace='/org/example'", &m));
        assert!(matches("path_namespace='/org/example/Foo'", &m));
        assert!(!matches("path_namespace='/org/exam'", &m));
        assert!(!matches("path_namespace='/org/example/Foo/Bar'", &m));
        assert!(matches("path='/org/example/Foo'", &m));
        assert!(!matches("path='/org/example'", &m));
    }

    #[test]
    fn arg0_namespace() {
        assert!(matches("arg0namespace='org.gtk'", &signal("/", "org.gtk")));
        assert!(matches("arg0namespace='org.gtk'", &signal("/", "org.gtk.Foo")));
        assert!(!matches("arg0namespace='org.gtk'", &signal("/", "org.gtkplus")));
        assert!(!matches("arg0namespace='org.gtk'", &signal("/", "org")));
    }

    #[test]
    fn arg_path() {
        let m = signal("/", "/aa/bb/");
        assert!(matches("arg0path='/'", &m));
        assert!(matches("arg0path='/aa/'", &m));
        assert!(matches("arg0path='/aa/bb/'", &m));
        assert!(matches("arg0path='/aa/bb/cc'", &m));
        assert!(!matches("arg0path='/aa/b'", &m));
        assert!(!matches("arg0path='/aa'", &m));

        let m = signal("/", "/aa/bb");
        assert!(matches("arg0path='/aa/'", &m));
        assert!(!matches("arg0path='/aa/bb/'", &m));

        // Missing arguments never match.
        assert!(!matches("arg1path='/'", &m));
        assert!(!matches("arg1=''", &m));
    }

    #[test]
    fn type_and_eavesdrop() {
        let names = Names::new();
        let m = signal("/", "x");

        let rule = Match::parse("type='signal'").expect("rule");
        assert!(rule.matches(&m, false, &names));
        assert!(!rule.matches(&m, true, &names));

        let rule = Match::parse("type='signal',eavesdrop='true'").expect("rule");
        assert!(rule.matches(&m, true, &names));

        let rule = Match::parse("type='method_call'").expect("rule");
        assert!(!rule.matches(&m, false, &names));
    }

    #[test]
    fn sender_resolution() {
        let mut names = Names::new();
        let mut events = Vec::new();
        names.request(":1.1", "com.example.S", NameFlag::default(), &mut events);

        let m = signal("/", "x");

        let rule = Match::parse("sender='com.example.S'").expect("rule");
        assert!(rule.matches(&m, false, &names));

        let rule = Match::parse("sender=':1.1'").expect("rule");
        assert!(rule.matches(&m, false, &names));

        let rule = Match::parse("sender='com.example.Other'").expect("rule");
        assert!(!rule.matches(&m, false, &names));

        // Messages without a sender are from the bus.
        let m = Message::signal(ObjectPath::ROOT, "com.example.I", "S", NonZeroU32::MIN);
        let rule = Match::parse("sender='org.freedesktop.DBus'").expect("rule");
        assert!(rule.matches(&m, false, &names));

        let rule = Match::parse("destination=':1.1'").expect("rule");
        assert!(!rule.matches(&m, false, &names));
    }
}
