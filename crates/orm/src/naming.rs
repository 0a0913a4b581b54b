/// Maps entity and property names onto table and column names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NamingStrategy {
    /// Columns keep the property name verbatim, tables are the lower-cased
    /// entity name.
    #[default]
    Raw,
    /// `totalPages` becomes `total_pages`, `BookAuthor` becomes `book_author`.
    UnderScoreSeparatedLowerCase,
}

impl NamingStrategy {
    /// Suffix appended to entity names to form join column names.
    pub const FOREIGN_KEY_SUFFIX: &'static str = "_id";

    /// Column name for a property.
    #[must_use]
    pub fn mapped_name(self, name: &str) -> String {
        match self {
            Self::Raw => name.to_string(),
            Self::UnderScoreSeparatedLowerCase => to_snake_case(name),
        }
    }

    /// Table name for an entity.
    #[must_use]
    pub fn mapped_entity_name(self, name: &str) -> String {
        match self {
            Self::Raw => name.to_lowercase(),
            Self::UnderScoreSeparatedLowerCase => to_snake_case(name),
        }
    }

    /// Default join column referencing the given entity, e.g. `book_id`.
    #[must_use]
    pub fn foreign_key_column(self, entity_name: &str) -> String {
        self.mapped_name(&format!("{}{}", decapitalize(entity_name), Self::FOREIGN_KEY_SUFFIX))
    }

    /// Default join table name for an association, e.g. `book_authors`.
    #[must_use]
    pub fn join_table_name(self, owner_name: &str, association_name: &str) -> String {
        self.mapped_name(&format!("{}_{association_name}", decapitalize(owner_name)))
    }
}

/// Upper-cases the first character.
#[must_use]
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| first.to_uppercase().chain(chars).collect())
}

/// Lower-cases the first character.
#[must_use]
pub fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| first.to_lowercase().chain(chars).collect())
}

fn to_snake_case(name: &str) -> String {
    let mut snake = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 && !snake.ends_with('_') {
                snake.push('_');
            }
            snake.extend(ch.to_lowercase());
        } else {
            snake.push(ch);
        }
    }
    snake
}
