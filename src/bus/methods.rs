use std::fs;

use crate::name::{is_name, is_unique_name};
use crate::org_freedesktop_dbus::{
    error, NameFlag, StartReply, DESTINATION, INTERFACE,
    INTROSPECTABLE_INTERFACE, PATH, PEER_INTERFACE,
};
use crate::{BodyBuf, Error, Message};

use super::introspect::{self, Method};
use super::{Bus, Match};

/// An error replied to a method call on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MethodError {
    /// The D-Bus error name.
    pub(crate) name: &'static str,
    /// The human readable message sent as the body of the error.
    pub(crate) message: String,
}

impl MethodError {
    pub(crate) fn new(name: &'static str, message: impl Into<String>) -> Self {
        Self {
            name,
            message: message.into(),
        }
    }

    fn invalid_args(message: impl Into<String>) -> Self {
        Self::new(error::INVALID_ARGS, message)
    }
}

impl From<Error> for MethodError {
    #[inline]
    fn from(error: Error) -> Self {
        Self::invalid_args(error.to_string())
    }
}

/// A successful call on the bus.
pub(super) enum Response {
    Return(BodyBuf),
    /// The reply to `Hello`, after which `NameAcquired` is sent for the unique
    /// name of the caller.
    Hello(BodyBuf),
}

impl Bus {
    /// Call a method on the bus on behalf of client `id`.
    pub(super) fn call(&mut self, id: &str, message: &Message) -> Result<Response, MethodError> {
        let path = message.path().map(|path| path.as_str()).unwrap_or_default();
        let member = message.member().unwrap_or_default();

        match message.interface() {
            Some(PEER_INTERFACE) => {
                let method = lookup(introspect::PEER, member, message)?;
                return peer(method).map(Response::Return);
            }
            Some(INTROSPECTABLE_INTERFACE) => {
                check_path(path)?;
                lookup(introspect::INTROSPECTABLE, member, message)?;

                let mut body = BodyBuf::new();
                body.write(introspect::xml().as_str());
                return Ok(Response::Return(body));
            }
            None | Some(INTERFACE) => {
                check_path(path)?;
            }
            Some(interface) => {
                check_path(path)?;

                return Err(MethodError::new(
                    error::UNKNOWN_INTERFACE,
                    format!("No such interface '{interface}' on object at path {path}"),
                ));
            }
        }

        let method = lookup(introspect::BUS, member, message)?;
        let mut args = message.body();
        let mut body = BodyBuf::new();

        match method.name {
            "Hello" => {
                body.write(id);
                return Ok(Response::Hello(body));
            }
            "GetId" => {
                body.write(&*self.guid);
            }
            "RequestName" => {
                let name = args.read_str()?;
                let flags = NameFlag::from_bits(args.load::<u32>()?);
                check_name(name, "Requested", "acquire")?;

                if name == DESTINATION {
                    return Err(MethodError::invalid_args(format!(
                        "Cannot acquire a service named {DESTINATION}, because that is reserved"
                    )));
                }

                let mut events = Vec::new();
                let reply = self.names.request(id, name, flags, &mut events);
                tracing::debug!(client = id, name, ?flags, ?reply, "Request name");
                self.emit(events);
                body.store(reply.get());
            }
            "ReleaseName" => {
                let name = args.read_str()?;
                check_name(name, "Given", "release")?;

                if name == DESTINATION {
                    return Err(MethodError::invalid_args(format!(
                        "Cannot release a service named {DESTINATION}, because that is owned by the bus"
                    )));
                }

                let mut events = Vec::new();
                let reply = self.names.release(id, name, &mut events);
                tracing::debug!(client = id, name, ?reply, "Release name");
                self.emit(events);
                body.store(reply.get());
            }
            "StartServiceByName" => {
                let name = args.read_str()?;

                if !self.names.contains(name) {
                    return Err(MethodError::new(
                        error::SERVICE_UNKNOWN,
                        format!("No support for activation for name: {name}"),
                    ));
                }

                body.store(StartReply::ALREADY_RUNNING.get());
            }
            "UpdateActivationEnvironment" => {
                return Err(MethodError::new(
                    error::FAILED,
                    "UpdateActivationEnvironment not implemented",
                ));
            }
            "NameHasOwner" => {
                let name = args.read_str()?;
                let has_owner = name == DESTINATION
                    || self.names.contains(name)
                    || self.clients.contains(name);
                body.store(has_owner);
            }
            "ListNames" => {
                let mut names = self.clients.ids().collect::<Vec<_>>();
                names.extend(self.names.iter());
                body.write_array(names);
            }
            "ListActivatableNames" => {
                body.write_array::<_, str>([]);
            }
            "AddMatch" => {
                let rule = args.read_str()?;
                let parsed = parse_rule(rule)?;

                if let Some(client) = self.clients.get_mut(id) {
                    client.add_match(parsed);
                }
            }
            "RemoveMatch" => {
                let rule = args.read_str()?;
                let parsed = parse_rule(rule)?;

                let removed = match self.clients.get_mut(id) {
                    Some(client) => client.remove_match(&parsed),
                    None => false,
                };

                if !removed {
                    return Err(MethodError::new(
                        error::MATCH_RULE_NOT_FOUND,
                        "The given match rule wasn't found and can't be removed",
                    ));
                }
            }
            "GetNameOwner" => {
                let name = args.read_str()?;
                body.write(self.name_owner(name)?);
            }
            "ListQueuedOwners" => {
                let name = args.read_str()?;
                body.write_array(self.names.queued(name).unwrap_or_default());
            }
            "GetConnectionUnixUser" => {
                return Err(MethodError::new(
                    error::UNIX_PROCESS_ID_UNKNOWN,
                    "connection user not supported",
                ));
            }
            "GetConnectionUnixProcessID" => {
                return Err(MethodError::new(
                    error::UNIX_PROCESS_ID_UNKNOWN,
                    "connection pid not supported",
                ));
            }
            "GetConnectionSELinuxSecurityContext" => {
                return Err(MethodError::new(
                    error::SELINUX_SECURITY_CONTEXT_UNKNOWN,
                    "selinux context not supported",
                ));
            }
            _ => {}
        }

        Ok(Response::Return(body))
    }

    fn name_owner<'a>(&'a self, name: &'a str) -> Result<&'a str, MethodError> {
        if name == DESTINATION {
            return Ok(DESTINATION);
        }

        let owner = if name.starts_with(':') {
            self.clients.contains(name).then_some(name)
        } else {
            self.names.owner(name)
        };

        owner.ok_or_else(|| {
            MethodError::new(
                error::NAME_HAS_NO_OWNER,
                format!("Could not get owner of name '{name}': no such name"),
            )
        })
    }
}

fn peer(method: &Method) -> Result<BodyBuf, MethodError> {
    let mut body = BodyBuf::new();

    if method.name == "GetMachineId" {
        body.write(machine_id()?.as_str());
    }

    Ok(body)
}

/// Find `member` among `methods` and check the signature of the call.
fn lookup<'a>(
    methods: &'a [Method],
    member: &str,
    message: &Message,
) -> Result<&'a Method, MethodError> {
    let Some(method) = introspect::find(methods, member) else {
        return Err(MethodError::new(
            error::UNKNOWN_METHOD,
            format!("No such method '{member}'"),
        ));
    };

    let expected = method.signature();

    if message.signature() != expected.as_str() {
        return Err(MethodError::invalid_args(format!(
            "Type of message, '({})', does not match expected type '({expected})'",
            message.signature()
        )));
    }

    Ok(method)
}

fn check_path(path: &str) -> Result<(), MethodError> {
    if path != PATH.as_str() {
        return Err(MethodError::new(
            error::UNKNOWN_OBJECT,
            format!("No such object path '{path}'"),
        ));
    }

    Ok(())
}

/// Check that a name passed to `RequestName` or `ReleaseName` is a valid
/// well-known name.
fn check_name(name: &str, adjective: &str, verb: &str) -> Result<(), MethodError> {
    if !is_name(name) {
        return Err(MethodError::invalid_args(format!(
            "{adjective} bus name \"{name}\" is not valid"
        )));
    }

    if is_unique_name(name) {
        return Err(MethodError::invalid_args(format!(
            "Cannot {verb} a service starting with ':' such as \"{name}\""
        )));
    }

    Ok(())
}

fn parse_rule(rule: &str) -> Result<Match, MethodError> {
    Match::parse(rule).map_err(|_| {
        MethodError::new(error::MATCH_RULE_INVALID, format!("Invalid rule: {rule}"))
    })
}

fn machine_id() -> Result<String, MethodError> {
    const PATHS: [&str; 2] = ["/var/lib/dbus/machine-id", "/etc/machine-id"];

    for path in PATHS {
        if let Ok(id) = fs::read_to_string(path) {
            return Ok(id.trim().to_owned());
        }
    }

    Err(MethodError::new(
        error::FAILED,
        "Unable to load /var/lib/dbus/machine-id or /etc/machine-id",
    ))
}
