//! Catalog metadata attached to products.

use serde::{Deserialize, Serialize};

use super::id::{CategoryId, SubcategoryId};

/// Errors when building a [`CategoryAssignment`] from raw columns.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CategoryAssignmentError {
    #[error("subcategory {0} given without a category")]
    SubcategoryWithoutCategory(SubcategoryId),
}

/// Where a product sits in the category taxonomy.
///
/// Stored as two nullable columns; this type rules out the
/// "subcategory without category" combination.
///
/// ```
/// use shelf_core::{CategoryAssignment, CategoryId, SubcategoryId};
///
/// let assignment = CategoryAssignment::from_columns(Some(CategoryId::new(1)), None).unwrap();
/// assert_eq!(assignment.category(), Some(CategoryId::new(1)));
///
/// assert!(CategoryAssignment::from_columns(None, Some(SubcategoryId::new(2))).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CategoryAssignment {
    #[default]
    Unassigned,
    Category {
        category: CategoryId,
    },
    #[serde(rename_all = "camelCase")]
    Subcategory {
        category: CategoryId,
        subcategory: SubcategoryId,
    },
}

impl CategoryAssignment {
    /// Build from the `category_id` / `subcategory_id` column pair.
    ///
    /// # Errors
    ///
    /// Returns an error if a subcategory is present without a category.
    pub const fn from_columns(
        category: Option<CategoryId>,
        subcategory: Option<SubcategoryId>,
    ) -> Result<Self, CategoryAssignmentError> {
        match (category, subcategory) {
            (None, None) => Ok(Self::Unassigned),
            (Some(category), None) => Ok(Self::Category { category }),
            (Some(category), Some(subcategory)) => Ok(Self::Subcategory {
                category,
                subcategory,
            }),
            (None, Some(subcategory)) => {
                Err(CategoryAssignmentError::SubcategoryWithoutCategory(subcategory))
            }
        }
    }

    /// Split back into the column pair.
    #[must_use]
    pub const fn to_columns(self) -> (Option<CategoryId>, Option<SubcategoryId>) {
        match self {
            Self::Unassigned => (None, None),
            Self::Category { category } => (Some(category), None),
            Self::Subcategory {
                category,
                subcategory,
            } => (Some(category), Some(subcategory)),
        }
    }

    #[must_use]
    pub const fn category(self) -> Option<CategoryId> {
        self.to_columns().0
    }

    #[must_use]
    pub const fn subcategory(self) -> Option<SubcategoryId> {
        self.to_columns().1
    }
}

/// Reference to an archive held by the file store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StoredFile {
    /// Name of the file inside the upload directory.
    pub name: String,
    /// Size in bytes recorded at upload time.
    pub size: i64,
}

impl StoredFile {
    /// Build from the `file_name` / `file_size` column pair.
    ///
    /// A missing size is recorded as zero; a missing name means no file.
    #[must_use]
    pub fn from_columns(name: Option<String>, size: Option<i64>) -> Option<Self> {
        name.filter(|n| !n.is_empty()).map(|name| Self {
            name,
            size: size.unwrap_or(0),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_roundtrip() {
        let cases = [
            CategoryAssignment::Unassigned,
            CategoryAssignment::Category {
                category: CategoryId::new(3),
            },
            CategoryAssignment::Subcategory {
                category: CategoryId::new(3),
                subcategory: SubcategoryId::new(9),
            },
        ];
        for case in cases {
            let (category, subcategory) = case.to_columns();
            assert_eq!(
                CategoryAssignment::from_columns(category, subcategory).unwrap(),
                case
            );
        }
    }

    #[test]
    fn test_orphan_subcategory_rejected() {
        let err = CategoryAssignment::from_columns(None, Some(SubcategoryId::new(4))).unwrap_err();
        assert_eq!(
            err,
            CategoryAssignmentError::SubcategoryWithoutCategory(SubcategoryId::new(4))
        );
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(CategoryAssignment::Subcategory {
            category: CategoryId::new(1),
            subcategory: SubcategoryId::new(2),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "subcategory", "category": 1, "subcategory": 2})
        );
        let unassigned: CategoryAssignment =
            serde_json::from_value(serde_json::json!({"kind": "unassigned"})).unwrap();
        assert_eq!(unassigned, CategoryAssignment::Unassigned);
    }

    #[test]
    fn test_stored_file_from_columns() {
        assert_eq!(StoredFile::from_columns(None, Some(10)), None);
        assert_eq!(StoredFile::from_columns(Some(String::new()), Some(10)), None);
        assert_eq!(
            StoredFile::from_columns(Some("a.zip".into()), None),
            Some(StoredFile {
                name: "a.zip".into(),
                size: 0
            })
        );
    }
}
