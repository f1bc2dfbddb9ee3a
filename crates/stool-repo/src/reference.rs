//! Serializable pointers to directions
//!
//! A reference names where a [`Directions`] document comes from: the toolkit
//! catalogue, an inline document, or a label on a container image. The wire
//! form is `TYPE+base64(value)+base64(origin)` using the URL-safe alphabet, so
//! the separator never occurs inside the encoded parts.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use stool_core::{Directions, Toolkit};
use tracing::debug;

use crate::error::{RepoError, Result};
use crate::registry::Registry;

/// Image label holding a directions document, base64 encoded or plain
pub const DIRECTIONS_LABEL: &str = "stool-directions";

const SEPARATOR: char = '+';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Builtin,
    Inline,
    Image,
}

impl RefKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Builtin => "BUILTIN",
            Self::Inline => "INLINE",
            Self::Image => "IMAGE",
        }
    }
}

impl FromStr for RefKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "BUILTIN" => Ok(Self::Builtin),
            "INLINE" => Ok(Self::Inline),
            "IMAGE" => Ok(Self::Image),
            other => Err(format!("unknown reference type: {other}")),
        }
    }
}

/// Pointer to a directions document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectionsRef {
    /// Name in the toolkit catalogue
    Builtin { name: String, origin: String },
    /// Document text, read when the reference was created
    Inline { document: String, origin: String },
    /// Image whose label carries the document
    Image { image: String, origin: String },
}

impl DirectionsRef {
    pub fn new(kind: RefKind, value: impl Into<String>, origin: impl Into<String>) -> Self {
        let (value, origin) = (value.into(), origin.into());
        match kind {
            RefKind::Builtin => Self::Builtin { name: value, origin },
            RefKind::Inline => Self::Inline {
                document: value,
                origin,
            },
            RefKind::Image => Self::Image {
                image: value,
                origin,
            },
        }
    }

    /// Classify a command line argument.
    ///
    /// Paths (starting with `/` or `.`) are read immediately into an inline
    /// reference, anything else containing `/` is an image, the rest are builtin names.
    pub fn create(arg: &str) -> Result<Self> {
        if arg.starts_with('/') || arg.starts_with('.') {
            let document = std::fs::read_to_string(Path::new(arg))
                .map_err(|e| RepoError::resolving(arg, format!("cannot read directions: {e}")))?;
            Ok(Self::Inline {
                document,
                origin: arg.to_string(),
            })
        } else if arg.contains('/') {
            Ok(Self::Image {
                image: arg.to_string(),
                origin: arg.to_string(),
            })
        } else {
            Ok(Self::Builtin {
                name: arg.to_string(),
                origin: arg.to_string(),
            })
        }
    }

    pub fn kind(&self) -> RefKind {
        match self {
            Self::Builtin { .. } => RefKind::Builtin,
            Self::Inline { .. } => RefKind::Inline,
            Self::Image { .. } => RefKind::Image,
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::Builtin { name, .. } => name,
            Self::Inline { document, .. } => document,
            Self::Image { image, .. } => image,
        }
    }

    pub fn origin(&self) -> &str {
        match self {
            Self::Builtin { origin, .. } | Self::Inline { origin, .. } | Self::Image { origin, .. } => {
                origin
            }
        }
    }

    pub fn serialize(&self) -> String {
        format!(
            "{}{SEPARATOR}{}{SEPARATOR}{}",
            self.kind().as_str(),
            URL_SAFE.encode(self.value()),
            URL_SAFE.encode(self.origin())
        )
    }

    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |message: String| RepoError::InvalidReference {
            reference: s.to_string(),
            message,
        };
        let mut parts = s.splitn(3, SEPARATOR);
        let (Some(kind), Some(value), Some(origin)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid("expected TYPE+value+origin".to_string()));
        };
        let kind = kind.parse::<RefKind>().map_err(invalid)?;
        let decode = |part: &str| -> Result<String> {
            let bytes = URL_SAFE
                .decode(part)
                .map_err(|e| invalid(format!("invalid base64: {e}")))?;
            String::from_utf8(bytes).map_err(|e| invalid(format!("invalid UTF-8: {e}")))
        };
        Ok(Self::new(kind, decode(value)?, decode(origin)?))
    }

    /// Load the referenced directions. Errors carry the reference origin.
    pub async fn resolve(&self, toolkit: &Toolkit, registry: &dyn Registry) -> Result<Directions> {
        match self {
            Self::Builtin { name, .. } => Ok(toolkit.directions(name)?.clone()),
            Self::Inline { document, origin } => Directions::from_yaml_str(document)
                .map_err(|e| RepoError::resolving(origin, format!("failed to parse directions: {e}"))),
            Self::Image { image, origin } => {
                let info = registry.resolve(image).await?;
                let label = info
                    .labels
                    .get(DIRECTIONS_LABEL)
                    .filter(|l| !l.trim().is_empty())
                    .ok_or_else(|| RepoError::MissingLabel {
                        image: info.image(),
                        label: DIRECTIONS_LABEL.to_string(),
                    })?;
                debug!(image = %info.image(), "loading directions from image label");
                let mut directions = Directions::from_yaml_str(&decode_label(label))
                    .map_err(|e| RepoError::resolving(origin, format!("failed to parse directions: {e}")))?;
                directions.author = info.author.clone();
                directions.origin.get_or_insert_with(|| info.image());
                Ok(directions)
            }
        }
    }
}

/// Label content is base64 when it decodes to UTF-8, plain text otherwise
fn decode_label(label: &str) -> String {
    STANDARD
        .decode(label.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| label.to_string())
}

impl fmt::Display for DirectionsRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

impl FromStr for DirectionsRef {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
