//! The `format` keyword.
//!
//! Each supported format maps to a pre-defined regular expression attached
//! as a string-typed guard. The temporal formats additionally admit
//! `formatMaximum`/`formatMinimum` bounds, compiled as comparisons under the
//! matching Postgres cast.

use crate::filter::ValueCast;

/// The supported `format` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Date,
    DateTime,
    Time,
    Email,
    Hostname,
    Ipv4,
    Ipv6,
    JsonPointer,
    Uri,
    UriReference,
    UriTemplate,
    Uuid,
}

impl Format {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "date" => Some(Self::Date),
            "date-time" => Some(Self::DateTime),
            "time" => Some(Self::Time),
            "email" => Some(Self::Email),
            "hostname" => Some(Self::Hostname),
            "ipv4" => Some(Self::Ipv4),
            "ipv6" => Some(Self::Ipv6),
            "json-pointer" => Some(Self::JsonPointer),
            "uri" => Some(Self::Uri),
            "uri-reference" => Some(Self::UriReference),
            "uri-template" => Some(Self::UriTemplate),
            "uuid" => Some(Self::Uuid),
            _ => None,
        }
    }

    /// The POSIX regular expression guarding values of this format.
    pub fn pattern(self) -> &'static str {
        match self {
            Self::Date => r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$",
            Self::DateTime => {
                // The offset minutes are optional so the native Postgres
                // rendering ("... 00:00:00.000+00") also matches.
                r"^[0-9]{4}-[0-9]{2}-[0-9]{2}[Tt ][0-9]{2}:[0-9]{2}:[0-9]{2}(\.[0-9]+)?([Zz]|[+-][0-9]{2}(:?[0-9]{2})?)?$"
            }
            Self::Time => r"^[0-9]{2}:[0-9]{2}:[0-9]{2}(\.[0-9]+)?([Zz]|[+-][0-9]{2}:[0-9]{2})?$",
            Self::Email => r"^[^@\s]+@[^@\s]+\.[^@\s]+$",
            Self::Hostname => {
                r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$"
            }
            Self::Ipv4 => {
                r"^((25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)$"
            }
            Self::Ipv6 => r"^([0-9a-fA-F]{0,4}:){1,7}([0-9a-fA-F]{0,4}|[0-9.]+)$",
            Self::JsonPointer => r"^(/([^~/]|~0|~1)*)*$",
            Self::Uri => r"^[a-zA-Z][a-zA-Z0-9+.-]*:[^\s]*$",
            Self::UriReference => r"^[^\s]*$",
            Self::UriTemplate => r"^([^\s{}]|\{[^\s{}]*\})*$",
            Self::Uuid => {
                r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$"
            }
        }
    }

    /// The cast used by `formatMaximum`/`formatMinimum` bounds on this
    /// format, when the format is temporal.
    pub fn bound_cast(self) -> Option<ValueCast> {
        match self {
            Self::Date => Some(ValueCast::Date),
            Self::Time => Some(ValueCast::Time),
            Self::DateTime => Some(ValueCast::Timestamp),
            _ => None,
        }
    }
}
