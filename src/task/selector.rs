//! Guest selection for the `on` key.
//!
//! A selector is a string or a list of strings. Each entry is a bare value
//! matching the guest name or role, or an explicit `name:<value>` /
//! `role:<value>` criterion. A guest is accepted when any entry matches.

use serde_json::Value;
use thiserror::Error;

use crate::guest::GuestProjection;

/// A selector that cannot be evaluated against a guest.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SelectorError {
    /// The selector names a guest attribute that does not exist.
    #[error("unknown guest attribute '{attribute}'")]
    UnknownAttribute {
        /// Attribute named by the selector.
        attribute: String,
    },
    /// The selector is not a string or a list of strings.
    #[error("selector must be a string or a list of strings, got {found}")]
    InvalidShape {
        /// Rendering of the offending value.
        found: String,
    },
}

enum Criterion<'a> {
    Any(&'a str),
    Name(&'a str),
    Role(&'a str),
}

impl<'a> Criterion<'a> {
    fn parse(entry: &'a str) -> Result<Self, SelectorError> {
        let Some((attribute, value)) = entry.split_once(':') else {
            return Ok(Self::Any(entry.trim()));
        };
        match attribute.trim() {
            "name" => Ok(Self::Name(value.trim())),
            "role" => Ok(Self::Role(value.trim())),
            other => Err(SelectorError::UnknownAttribute {
                attribute: other.to_owned(),
            }),
        }
    }

    fn matches(&self, guest: &GuestProjection<'_>) -> bool {
        match *self {
            Self::Any(value) => guest.name() == value || guest.role() == Some(value),
            Self::Name(value) => guest.name() == value,
            Self::Role(value) => guest.role() == Some(value),
        }
    }
}

/// Evaluates `selector` against `guest`.
///
/// An absent, `null`, or empty selector accepts every guest.
///
/// # Errors
///
/// Returns [`SelectorError`] when the selector is malformed or names an
/// unknown attribute.
pub fn accepts(
    selector: Option<&Value>,
    guest: &GuestProjection<'_>,
) -> Result<bool, SelectorError> {
    let entries: Vec<&str> = match selector {
        None | Some(Value::Null) => return Ok(true),
        Some(Value::String(single)) => vec![single.as_str()],
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().ok_or_else(|| SelectorError::InvalidShape {
                    found: item.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(SelectorError::InvalidShape {
                found: other.to_string(),
            });
        }
    };

    if entries.iter().all(|entry| entry.trim().is_empty()) {
        return Ok(true);
    }

    let mut accepted = false;
    for entry in entries.into_iter().filter(|entry| !entry.trim().is_empty()) {
        // Parse every entry so a typo is reported even after an earlier match.
        if Criterion::parse(entry)?.matches(guest) {
            accepted = true;
        }
    }
    Ok(accepted)
}
