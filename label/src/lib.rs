//! Class labels attached to rectangles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category id of a ground truth or predicted region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub usize);

impl ClassId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ground truth class assigned to a predicted region at matching time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrueClass {
    /// The region overlaps a ground truth region of this class.
    Class(ClassId),
    /// No ground truth region overlaps the region.
    Unmatched,
}

impl TrueClass {
    pub fn class(&self) -> Option<ClassId> {
        match *self {
            Self::Class(class) => Some(class),
            Self::Unmatched => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        matches!(self, Self::Class(_))
    }
}

impl From<Option<ClassId>> for TrueClass {
    fn from(from: Option<ClassId>) -> Self {
        from.map(Self::Class).unwrap_or(Self::Unmatched)
    }
}

impl fmt::Display for TrueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(class) => write!(f, "{}", class),
            Self::Unmatched => write!(f, "unmatched"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmatched_is_distinct_from_every_class() {
        assert_ne!(TrueClass::Unmatched, TrueClass::Class(ClassId(0)));
        assert_eq!(TrueClass::from(None), TrueClass::Unmatched);
        assert_eq!(TrueClass::from(Some(ClassId(3))).class(), Some(ClassId(3)));
        assert!(!TrueClass::Unmatched.is_matched());
    }
}
