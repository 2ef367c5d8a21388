//! Object paths, as used in the `PATH` header and `path` match rules.

use self::validation::validate;
mod validation;

pub use self::object_path::{ObjectPath, ObjectPathError};
mod object_path;

#[cfg(test)]
mod tests;
