//! Location Keys
//!
//! A `Location` is the structured address of a content node:
//! `tag://org/course/category/name[@revision]`.
//!
//! Any of `org`, `course`, `category`, `name` and `revision` may be unset.
//! An unset field is a wildcard, which turns the key into a *query pattern*.
//! Patterns are fine for lookups but never address a write; mutating
//! operations call [`Location::ensure_fully_specified`] first.
//!
//! # Examples
//!
//! ```rust
//! use coursestore_core::models::Location;
//!
//! let key = Location::new("orgA", "cs101", "problem", "p1").unwrap();
//! assert_eq!(key.to_string(), "i4x://orgA/cs101/problem/p1");
//!
//! let parsed = Location::parse("i4x://orgA/cs101/problem/p1@draft").unwrap();
//! assert_eq!(parsed.revision(), Some("draft"));
//! ```

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;
use uuid::Uuid;

/// Tag used for every key this store creates
pub const DEFAULT_TAG: &str = "i4x";

/// Revision of a staged, unpublished record
pub const DRAFT_REVISION: &str = "draft";

/// Text form of an unset field
const WILDCARD: &str = "*";

const URL_PATTERN: &str = r"^(?P<tag>[^:/]+)://(?P<org>[^/]+)/(?P<course>[^/]+)/(?P<category>[^/]+)/(?P<name>[^@/]+)(?:@(?P<revision>[^@/]+))?$";

const SEGMENT_PATTERN: &str = r"^[\w.\-]+$";

fn url_regex() -> &'static Regex {
    static URL_REGEX: OnceLock<Regex> = OnceLock::new();
    URL_REGEX.get_or_init(|| Regex::new(URL_PATTERN).unwrap())
}

fn segment_regex() -> &'static Regex {
    static SEGMENT_REGEX: OnceLock<Regex> = OnceLock::new();
    SEGMENT_REGEX.get_or_init(|| Regex::new(SEGMENT_PATTERN).unwrap())
}

/// Addressing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocationError {
    #[error("Malformed location key '{input}': {reason}")]
    Malformed { input: String, reason: String },

    #[error("Insufficiently specified location: {location}")]
    InsufficientSpecification { location: String },
}

impl LocationError {
    pub fn malformed(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Structured address of a content node
///
/// Equality, ordering and hashing cover every field, including `revision`,
/// so a draft and its published counterpart are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    tag: String,
    org: Option<String>,
    course: Option<String>,
    category: Option<String>,
    name: Option<String>,
    revision: Option<String>,
}

impl Location {
    /// Create a fully specified, published key
    ///
    /// # Errors
    ///
    /// Returns `LocationError::Malformed` if any segment contains characters
    /// outside `[\w.-]`.
    pub fn new(
        org: impl Into<String>,
        course: impl Into<String>,
        category: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, LocationError> {
        let (org, course, category, name): (String, String, String, String) =
            (org.into(), course.into(), category.into(), name.into());
        Self::pattern(
            Some(org.as_str()),
            Some(course.as_str()),
            Some(category.as_str()),
            Some(name.as_str()),
        )
    }

    /// Create a key where `None` segments are wildcards
    pub fn pattern(
        org: Option<&str>,
        course: Option<&str>,
        category: Option<&str>,
        name: Option<&str>,
    ) -> Result<Self, LocationError> {
        Ok(Self {
            tag: DEFAULT_TAG.to_string(),
            org: checked_segment("org", org)?,
            course: checked_segment("course", course)?,
            category: checked_segment("category", category)?,
            name: checked_segment("name", name)?,
            revision: None,
        })
    }

    /// Parse the canonical text form
    ///
    /// `*` in any segment parses to an unset (wildcard) field.
    pub fn parse(text: &str) -> Result<Self, LocationError> {
        let captures = url_regex().captures(text).ok_or_else(|| {
            LocationError::malformed(text, "expected tag://org/course/category/name[@revision]")
        })?;

        let segment = |field: &'static str| -> Result<Option<String>, LocationError> {
            match captures.name(field).map(|m| m.as_str()) {
                None | Some(WILDCARD) => Ok(None),
                Some(value) if segment_regex().is_match(value) => Ok(Some(value.to_string())),
                Some(_) => Err(LocationError::malformed(
                    text,
                    format!("invalid characters in {}", field),
                )),
            }
        };

        let tag = segment("tag")?
            .ok_or_else(|| LocationError::malformed(text, "tag cannot be a wildcard"))?;

        Ok(Self {
            tag,
            org: segment("org")?,
            course: segment("course")?,
            category: segment("category")?,
            name: segment("name")?,
            revision: segment("revision")?,
        })
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn org(&self) -> Option<&str> {
        self.org.as_deref()
    }

    pub fn course(&self) -> Option<&str> {
        self.course.as_deref()
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Canonical text form (same as `to_string()`)
    pub fn url(&self) -> String {
        self.to_string()
    }

    /// True when org, course, category and name are all set
    ///
    /// `revision` may be unset on a fully specified key; unset means
    /// "published" for point lookups.
    pub fn is_fully_specified(&self) -> bool {
        self.org.is_some() && self.course.is_some() && self.category.is_some() && self.name.is_some()
    }

    /// Fail with `InsufficientSpecification` unless fully specified
    pub fn ensure_fully_specified(&self) -> Result<&Self, LocationError> {
        if self.is_fully_specified() {
            Ok(self)
        } else {
            Err(LocationError::InsufficientSpecification {
                location: self.to_string(),
            })
        }
    }

    /// Query where every unset field matches anything
    pub fn as_query_pattern(&self) -> LocationQuery {
        LocationQuery {
            location: self.clone(),
            wildcard: true,
            pin_revision: false,
        }
    }

    /// Pattern query that only matches published records
    ///
    /// Unset org, course, category and name still match anything.
    pub fn as_published_pattern(&self) -> LocationQuery {
        LocationQuery {
            location: self.published(),
            wildcard: true,
            pin_revision: true,
        }
    }

    /// Query where unset fields only match unset fields
    pub fn as_exact_query(&self) -> LocationQuery {
        LocationQuery {
            location: self.clone(),
            wildcard: false,
            pin_revision: true,
        }
    }

    /// Copy of this key with a different revision
    ///
    /// # Errors
    ///
    /// Returns `LocationError::Malformed` if the revision is empty or has
    /// characters outside `[\w.-]`, which would not parse back.
    pub fn with_revision(&self, revision: Option<&str>) -> Result<Self, LocationError> {
        Ok(Self {
            revision: checked_segment("revision", revision)?,
            ..self.clone()
        })
    }

    /// Copy of this key at the draft revision
    pub fn draft(&self) -> Self {
        Self {
            revision: Some(DRAFT_REVISION.to_string()),
            ..self.clone()
        }
    }

    /// Copy of this key with the revision cleared
    pub fn published(&self) -> Self {
        Self {
            revision: None,
            ..self.clone()
        }
    }

    /// Sibling key in the same course with a new category and name
    pub fn with_category_and_name(&self, category: &str, name: &str) -> Result<Self, LocationError> {
        Ok(Self {
            category: checked_segment("category", Some(category))?,
            name: checked_segment("name", Some(name))?,
            revision: None,
            ..self.clone()
        })
    }

    /// Key for a brand new item in the same course, named by a fresh uuid
    pub fn with_generated_name(&self, category: &str) -> Result<Self, LocationError> {
        self.with_category_and_name(category, &Uuid::new_v4().simple().to_string())
    }

    /// `org/course/name`, the course identifier of a course key
    pub fn course_id(&self) -> Option<String> {
        Some(format!("{}/{}/{}", self.org()?, self.course()?, self.name()?))
    }

    fn field(&self, field: &str) -> Option<&str> {
        match field {
            "tag" => Some(self.tag.as_str()),
            "org" => self.org(),
            "course" => self.course(),
            "category" => self.category(),
            "name" => self.name(),
            "revision" => self.revision(),
            _ => None,
        }
    }
}

fn checked_segment(field: &str, value: Option<&str>) -> Result<Option<String>, LocationError> {
    match value {
        None => Ok(None),
        Some(value) if segment_regex().is_match(value) => Ok(Some(value.to_string())),
        Some(value) => Err(LocationError::malformed(
            value,
            format!("invalid characters in {}", field),
        )),
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let segment = |value: &Option<String>| value.clone().unwrap_or_else(|| WILDCARD.to_string());
        write!(
            f,
            "{}://{}/{}/{}/{}",
            self.tag,
            segment(&self.org),
            segment(&self.course),
            segment(&self.category),
            segment(&self.name)
        )?;
        if let Some(revision) = &self.revision {
            write!(f, "@{}", revision)?;
        }
        Ok(())
    }
}

impl FromStr for Location {
    type Err = LocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Location {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Location {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// Field order used by datastore queries, most specific last
pub const LOCATION_FIELDS: [&str; 6] = ["tag", "org", "course", "category", "name", "revision"];

/// A key turned into a datastore query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationQuery {
    location: Location,
    wildcard: bool,
    pin_revision: bool,
}

impl LocationQuery {
    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    /// `(field, expected value)` pairs the datastore must enforce
    ///
    /// In wildcard mode unset fields are left out entirely; otherwise they
    /// are required to be unset on the stored record.
    pub fn constraints(&self) -> Vec<(&'static str, Option<&str>)> {
        LOCATION_FIELDS
            .iter()
            .map(|field| (*field, self.location.field(field)))
            .filter(|(field, value)| {
                let pinned = self.pin_revision && *field == "revision";
                !(self.wildcard && value.is_none() && !pinned)
            })
            .collect()
    }

    pub fn matches(&self, candidate: &Location) -> bool {
        self.constraints()
            .into_iter()
            .all(|(field, expected)| candidate.field(field) == expected)
    }
}
