use super::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

/// Strong typing for timetable identifiers with phantom namespaces.
///
/// A class code and a teacher name live in distinct namespaces: an
/// `Id<ClassMarker>` can never be passed where an `Id<TeacherMarker>` is
/// expected, even when the text happens to look alike.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T> {
    value: String,
    _phantom: PhantomData<T>,
}

/// Marker types for the two identifier namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassMarker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TeacherMarker;

pub type ClassId = Id<ClassMarker>;
pub type TeacherId = Id<TeacherMarker>;

/// Namespace-specific syntax rules for an identifier.
pub trait Namespace {
    const KIND: ViewKind;

    /// Normalizes raw input into the canonical identifier text.
    fn normalize(input: &str) -> Result<String, ValidationError>;
}

/// Longest teacher name accepted; published names are a handful of characters.
const MAX_TEACHER_NAME_CHARS: usize = 32;

static CLASS_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,8}$").expect("class code regex is valid"));

impl Namespace for ClassMarker {
    const KIND: ViewKind = ViewKind::ClassView;

    fn normalize(input: &str) -> Result<String, ValidationError> {
        let cleaned = input.trim();
        if cleaned.is_empty() {
            return Err(ValidationError::InvalidIdentifier {
                input: input.to_string(),
                reason: "class code is empty".to_string(),
            });
        }
        if !CLASS_CODE.is_match(cleaned) {
            return Err(ValidationError::InvalidIdentifier {
                input: input.to_string(),
                reason: "class code must be 1-8 ASCII digits".to_string(),
            });
        }
        Ok(cleaned.to_string())
    }
}

impl Namespace for TeacherMarker {
    const KIND: ViewKind = ViewKind::TeacherView;

    fn normalize(input: &str) -> Result<String, ValidationError> {
        // Source pages pad names with layout whitespace, never meaningful spaces.
        let cleaned: String = input
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
            .collect();

        if cleaned.is_empty() {
            return Err(ValidationError::InvalidIdentifier {
                input: input.to_string(),
                reason: "teacher name is empty".to_string(),
            });
        }
        if cleaned.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::InvalidIdentifier {
                input: input.to_string(),
                reason: "an all-digit value is a class code, not a teacher name".to_string(),
            });
        }
        if cleaned.chars().count() > MAX_TEACHER_NAME_CHARS {
            return Err(ValidationError::InvalidIdentifier {
                input: input.to_string(),
                reason: format!("teacher name exceeds {} characters", MAX_TEACHER_NAME_CHARS),
            });
        }
        if cleaned
            .chars()
            .any(|c| c.is_control() || matches!(c, '/' | '\\' | '?' | '#' | '<' | '>'))
        {
            return Err(ValidationError::InvalidIdentifier {
                input: input.to_string(),
                reason: "teacher name contains reserved characters".to_string(),
            });
        }
        Ok(cleaned)
    }
}

impl<T: Namespace> Id<T> {
    /// Parses and normalizes an identifier in this namespace.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        Ok(Self {
            value: T::normalize(input)?,
            _phantom: PhantomData,
        })
    }

    /// The namespace this identifier belongs to.
    pub fn kind(&self) -> ViewKind {
        T::KIND
    }
}

impl<T> Id<T> {
    /// Get the ID as a string reference
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<T> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<T> Serialize for Id<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.value.serialize(serializer)
    }
}

impl<'de, T: Namespace> Deserialize<'de> for Id<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// Which page a grid came from: the per-class page or the per-teacher page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    ClassView,
    TeacherView,
}

impl ViewKind {
    /// The namespace of the identifiers a cell on this kind of page points at.
    pub fn counterpart(self) -> ViewKind {
        match self {
            ViewKind::ClassView => ViewKind::TeacherView,
            ViewKind::TeacherView => ViewKind::ClassView,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::ClassView => "class",
            ViewKind::TeacherView => "teacher",
        }
    }

    /// Guesses the namespace of free-form input: all digits is a class code.
    pub fn infer(input: &str) -> ViewKind {
        let trimmed = input.trim();
        if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) {
            ViewKind::ClassView
        } else {
            ViewKind::TeacherView
        }
    }
}

impl fmt::Display for ViewKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "class" | "class_view" => Ok(ViewKind::ClassView),
            "teacher" | "teacher_view" => Ok(ViewKind::TeacherView),
            other => Err(ValidationError::InvalidIdentifier {
                input: other.to_string(),
                reason: "kind must be \"class\" or \"teacher\"".to_string(),
            }),
        }
    }
}

/// A tagged timetable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Identifier {
    Class(ClassId),
    Teacher(TeacherId),
}

impl Identifier {
    /// Parses `input` in the namespace selected by `kind`.
    pub fn parse(input: &str, kind: ViewKind) -> Result<Self, ValidationError> {
        match kind {
            ViewKind::ClassView => ClassId::parse(input).map(Identifier::Class),
            ViewKind::TeacherView => TeacherId::parse(input).map(Identifier::Teacher),
        }
    }

    pub fn kind(&self) -> ViewKind {
        match self {
            Identifier::Class(_) => ViewKind::ClassView,
            Identifier::Teacher(_) => ViewKind::TeacherView,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Identifier::Class(id) => id.as_str(),
            Identifier::Teacher(id) => id.as_str(),
        }
    }

    pub fn as_class(&self) -> Option<&ClassId> {
        match self {
            Identifier::Class(id) => Some(id),
            Identifier::Teacher(_) => None,
        }
    }

    pub fn as_teacher(&self) -> Option<&TeacherId> {
        match self {
            Identifier::Teacher(id) => Some(id),
            Identifier::Class(_) => None,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.as_str())
    }
}

impl From<ClassId> for Identifier {
    fn from(id: ClassId) -> Self {
        Identifier::Class(id)
    }
}

impl From<TeacherId> for Identifier {
    fn from(id: TeacherId) -> Self {
        Identifier::Teacher(id)
    }
}
