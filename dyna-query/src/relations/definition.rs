//! Relationship declarations.

use crate::inflector::singular;
use crate::schema::TableSchema;
use crate::types::OrderBy;

/// Many-to-one / one-to-one: this table holds the foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct BelongsTo {
    /// Related table name.
    pub related_table: String,
    /// Primary key of the related table, resolved at declaration.
    pub related_primary_key: String,
    /// Column on this table referencing the related primary key.
    pub foreign_key: String,
    /// Name the relationship is activated by and joined under.
    pub alias: String,
    /// Related table columns captured at declaration.
    pub related_schema: TableSchema,
}

/// One-to-many: the related table holds the foreign key.
#[derive(Debug, Clone, PartialEq)]
pub struct HasMany {
    /// Related table name.
    pub related_table: String,
    /// Primary key of the related table, resolved at declaration.
    pub related_primary_key: String,
    /// Column on the related table referencing this table's primary key.
    pub foreign_key: String,
    /// Name the relationship is activated by and attached under.
    pub alias: String,
    /// Ordering of the attached rows.
    pub order_by: OrderBy,
}

/// A declared relationship.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationSpec {
    /// Joined into the parent query.
    BelongsTo(BelongsTo),
    /// Loaded by a secondary query and attached per parent row.
    HasMany(HasMany),
}

impl RelationSpec {
    /// Alias of the relationship.
    pub fn alias(&self) -> &str {
        match self {
            Self::BelongsTo(r) => &r.alias,
            Self::HasMany(r) => &r.alias,
        }
    }

    /// Related table name.
    pub fn related_table(&self) -> &str {
        match self {
            Self::BelongsTo(r) => &r.related_table,
            Self::HasMany(r) => &r.related_table,
        }
    }

    /// Foreign key column.
    pub fn foreign_key(&self) -> &str {
        match self {
            Self::BelongsTo(r) => &r.foreign_key,
            Self::HasMany(r) => &r.foreign_key,
        }
    }
}

impl From<BelongsTo> for RelationSpec {
    fn from(r: BelongsTo) -> Self {
        Self::BelongsTo(r)
    }
}

impl From<HasMany> for RelationSpec {
    fn from(r: HasMany) -> Self {
        Self::HasMany(r)
    }
}

/// `authors` -> `author_id`.
pub fn default_foreign_key(table: &str) -> String {
    format!("{}_id", singular(table))
}

/// Output name for a joined column whose name collides with a parent column.
pub fn collision_name(alias: &str, column: &str) -> String {
    format!("{}_{}", singular(alias), column)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_foreign_key() {
        assert_eq!(default_foreign_key("authors"), "author_id");
        assert_eq!(default_foreign_key("categories"), "category_id");
        assert_eq!(default_foreign_key("blog_posts"), "blog_post_id");
    }

    #[test]
    fn test_collision_name_uses_alias() {
        assert_eq!(collision_name("writers", "id"), "writer_id");
        assert_eq!(collision_name("authors", "name"), "author_name");
    }
}
