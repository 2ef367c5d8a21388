use std::fmt::Write;

use crate::org_freedesktop_dbus::{INTERFACE, INTROSPECTABLE_INTERFACE, PEER_INTERFACE};

/// A method of an interface served by the bus.
pub(super) struct Method {
    pub(super) name: &'static str,
    pub(super) args: &'static [(&'static str, &'static str)],
    pub(super) returns: &'static [(&'static str, &'static str)],
}

impl Method {
    /// The body signature of a call to this method.
    pub(super) fn signature(&self) -> String {
        self.args.iter().map(|(_, ty)| *ty).collect()
    }
}

struct Signal {
    name: &'static str,
    args: &'static [(&'static str, &'static str)],
}

macro_rules! methods {
    ($($name:ident ($($arg:ident: $arg_ty:literal),*) -> ($($ret:ident: $ret_ty:literal),*);)*) => {
        &[$(Method {
            name: stringify!($name),
            args: &[$((stringify!($arg), $arg_ty)),*],
            returns: &[$((stringify!($ret), $ret_ty)),*],
        },)*]
    }
}

/// Methods of the `org.freedesktop.DBus` interface.
pub(super) const BUS: &[Method] = methods! {
    Hello() -> (assigned_name: "s");
    RequestName(name: "s", flags: "u") -> (value: "u");
    ReleaseName(name: "s") -> (value: "u");
    StartServiceByName(name: "s", flags: "u") -> (value: "u");
    UpdateActivationEnvironment(environment: "a{ss}") -> ();
    NameHasOwner(name: "s") -> (has_owner: "b");
    ListNames() -> (names: "as");
    ListActivatableNames() -> (activatable_names: "as");
    AddMatch(rule: "s") -> ();
    RemoveMatch(rule: "s") -> ();
    GetNameOwner(name: "s") -> (unique_name: "s");
    ListQueuedOwners(name: "s") -> (queued_owners: "as");
    GetConnectionUnixUser(name: "s") -> (uid: "u");
    GetConnectionUnixProcessID(name: "s") -> (pid: "u");
    GetConnectionSELinuxSecurityContext(name: "s") -> (security_context: "ay");
    ReloadConfig() -> ();
    GetId() -> (unique_id: "s");
};

/// Methods of the `org.freedesktop.DBus.Peer` interface.
pub(super) const PEER: &[Method] = methods! {
    Ping() -> ();
    GetMachineId() -> (machine_uuid: "s");
};

/// Methods of the `org.freedesktop.DBus.Introspectable` interface.
pub(super) const INTROSPECTABLE: &[Method] = methods! {
    Introspect() -> (xml_data: "s");
};

const SIGNALS: &[Signal] = &[
    Signal {
        name: "NameOwnerChanged",
        args: &[("name", "s"), ("old_owner", "s"), ("new_owner", "s")],
    },
    Signal {
        name: "NameLost",
        args: &[("name", "s")],
    },
    Signal {
        name: "NameAcquired",
        args: &[("name", "s")],
    },
];

/// Find a method by name.
pub(super) fn find<'a>(methods: &'a [Method], name: &str) -> Option<&'a Method> {
    methods.iter().find(|m| m.name == name)
}

/// Introspection data of the bus object.
pub(super) fn xml() -> String {
    let mut out = String::new();

    out.push_str(
        "<!DOCTYPE node PUBLIC \"-//freedesktop//DTD D-BUS Object Introspection 1.0//EN\"\n\
         \"http://www.freedesktop.org/standards/dbus/1.0/introspect.dtd\">\n",
    );

    out.push_str("<node>\n");
    interface(&mut out, PEER_INTERFACE, PEER, &[]);
    interface(&mut out, INTROSPECTABLE_INTERFACE, INTROSPECTABLE, &[]);
    interface(&mut out, INTERFACE, BUS, SIGNALS);
    out.push_str("</node>\n");
    out
}

fn interface(out: &mut String, name: &str, methods: &[Method], signals: &[Signal]) {
    // Writing to a string can't fail.
    let _ = writeln!(out, "  <interface name=\"{name}\">");

    for method in methods {
        let _ = writeln!(out, "    <method name=\"{}\">", method.name);

        for (name, ty) in method.args {
            let _ = writeln!(out, "      <arg type=\"{ty}\" name=\"{name}\" direction=\"in\"/>");
        }

        for (name, ty) in method.returns {
            let _ = writeln!(out, "      <arg type=\"{ty}\" name=\"{name}\" direction=\"out\"/>");
        }

        out.push_str("    </method>\n");
    }

    for signal in signals {
        let _ = writeln!(out, "    <signal name=\"{}\">", signal.name);

        for (name, ty) in signal.args {
            let _ = writeln!(out, "      <arg type=\"{ty}\" name=\"{name}\"/>");
        }

        out.push_str("    </signal>\n");
    }

    out.push_str("  </interface>\n");
}
