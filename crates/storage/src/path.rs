//! Object name validation.
//!
//! Object names are catalog-supplied keys such as `2019/node-12/IMG_0001.JPG`.
//! The same name is used as an S3 key and as a path below a local archive
//! directory, so it must never be able to escape that directory.

use std::path::{Component, Path};

use crate::error::{ErrorKind, Result};

/// Validates and normalizes an object name.
///
/// Ensures that names don't escape the backend root (no `..` traversal),
/// strips redundant `.` components and separators, and joins the result
/// with `/` regardless of platform.
///
/// > **Note:** Null bytes are explicitly rejected; backslashes are not
/// >           treated as separators on Unix.
///
/// # Examples
///
/// ```
/// use mediashift_storage::validate_object_name;
/// // Valid names
/// assert!(validate_object_name("2019/node-12/IMG_0001.JPG").is_ok());
/// assert!(validate_object_name("a/../IMG_0001.JPG").is_ok()); // (never leaves the root)
/// // Invalid names
/// assert!(validate_object_name("../etc/passwd").is_err());
/// assert!(validate_object_name("a\0b").is_err());
/// // Names get resolved
/// assert_eq!(
///     validate_object_name("/wrong/../2019/./IMG_0001.JPG").unwrap(),
///     "2019/IMG_0001.JPG"
/// );
/// ```
pub fn validate(name: impl AsRef<str>) -> Result<String> {
    let name = name.as_ref();
    let mut components = Vec::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls; reject them explicitly.
                let Some(part) = s.to_str().filter(|part| !part.contains('\0')) else {
                    exn::bail!(ErrorKind::InvalidObjectName(name.to_string()));
                };
                components.push(part)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidObjectName(name.to_string())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidObjectName(name.to_string()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidObjectName(name.to_string())),
        false => Ok(components.join("/")),
    }
}
