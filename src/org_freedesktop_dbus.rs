//! Names and constants of the `org.freedesktop.DBus` interface served by the
//! bus.

use crate::proto::{raw_enum, raw_set};
use crate::ObjectPath;

/// Well known bus name of the message bus itself.
pub const DESTINATION: &str = "org.freedesktop.DBus";

/// Interface implemented by the message bus.
pub const INTERFACE: &str = "org.freedesktop.DBus";

/// Object path the message bus is served on.
pub const PATH: &ObjectPath = ObjectPath::new_const("/org/freedesktop/DBus");

/// The standard peer interface, answered on every path.
pub const PEER_INTERFACE: &str = "org.freedesktop.DBus.Peer";

/// The standard introspection interface.
pub const INTROSPECTABLE_INTERFACE: &str = "org.freedesktop.DBus.Introspectable";

raw_set! {
    /// The flags to a `RequestName` call.
    #[repr(u32)]
    pub enum NameFlag {
        /// The owner may be replaced by a later request which passes
        /// `REPLACE_EXISTING`.
        ALLOW_REPLACEMENT = 1,
        /// Take the name from the current owner if it allows replacement.
        REPLACE_EXISTING = 2,
        /// Fail rather than wait in the queue. An owner holding this flag
        /// which is replaced is dropped instead of requeued.
        DO_NOT_QUEUE = 4,
    }
}

raw_enum! {
    /// The reply to a `RequestName` call.
    #[repr(u32)]
    pub enum NameReply {
        /// The caller is now the primary owner of the name.
        PRIMARY_OWNER = 1,
        /// The caller was placed in the queue of the name.
        IN_QUEUE = 2,
        /// The name has an owner which could not be replaced, and the caller
        /// asked not to be queued.
        EXISTS = 3,
        /// The caller already owns the name.
        ALREADY_OWNER = 4,
    }
}

raw_enum! {
    /// The reply to a `ReleaseName` call.
    #[repr(u32)]
    pub enum ReleaseNameReply {
        /// The caller released the name, or left its queue.
        RELEASED = 1,
        /// No one owns the name.
        NON_EXISTENT = 2,
        /// The caller neither owns nor waits for the name.
        NOT_OWNER = 3,
    }
}

raw_enum! {
    /// The reply to a `StartServiceByName` call.
    #[repr(u32)]
    pub enum StartReply {
        /// The service was started.
        SUCCESS = 1,
        /// The name already had an owner.
        ALREADY_RUNNING = 2,
    }
}

/// Error names replied by the bus.
pub mod error {
    /// Generic failure.
    pub const FAILED: &str = "org.freedesktop.DBus.Error.Failed";
    /// Arguments to a method call were invalid.
    pub const INVALID_ARGS: &str = "org.freedesktop.DBus.Error.InvalidArgs";
    /// The destination of a message does not exist.
    pub const SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";
    /// A name passed to a query has no owner.
    pub const NAME_HAS_NO_OWNER: &str = "org.freedesktop.DBus.Error.NameHasNoOwner";
    /// A match rule could not be parsed.
    pub const MATCH_RULE_INVALID: &str = "org.freedesktop.DBus.Error.MatchRuleInvalid";
    /// A match rule to remove was not registered.
    pub const MATCH_RULE_NOT_FOUND: &str = "org.freedesktop.DBus.Error.MatchRuleNotFound";
    /// The user id of a connection is not available.
    pub const UNIX_PROCESS_ID_UNKNOWN: &str = "org.freedesktop.DBus.Error.UnixProcessIdUnknown";
    /// The security context of a connection is not available.
    pub const SELINUX_SECURITY_CONTEXT_UNKNOWN: &str =
        "org.freedesktop.DBus.Error.SELinuxSecurityContextUnknown";
    /// The bus serves no such object.
    pub const UNKNOWN_OBJECT: &str = "org.freedesktop.DBus.Error.UnknownObject";
    /// The object implements no such interface.
    pub const UNKNOWN_INTERFACE: &str = "org.freedesktop.DBus.Error.UnknownInterface";
    /// The interface has no such method.
    pub const UNKNOWN_METHOD: &str = "org.freedesktop.DBus.Error.UnknownMethod";
}
