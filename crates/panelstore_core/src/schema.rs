//! Table schema descriptors.
//!
//! A schema is pure metadata: the table name and its columns. Column types
//! are documentary - every value is stored as a string - and the only
//! flags that change storage behaviour are `indexed` and `fail_open`.

use panelstore_storage::escape_glob;

/// Prefix shared by every secondary index key.
pub const INDEX_PREFIX: &str = "idx";

/// Declared type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// Free-form text.
    String,
    /// Text expected to be unique across the table (not enforced).
    TextUnique,
    /// 32-bit integer.
    Int,
    /// 64-bit integer.
    Long,
    /// Floating point number.
    Double,
    /// Boolean flag.
    Boolean,
    /// Binary payload, stored base64-encoded.
    Blob,
}

/// A single column declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    /// Field name inside the record.
    pub name: &'static str,
    /// Declared type.
    pub column_type: ColumnType,
    /// Whether the field is mirrored into secondary index sets.
    pub indexed: bool,
    /// Whether a decryption failure on read returns the raw stored string
    /// instead of an error.
    pub fail_open: bool,
}

impl Column {
    /// Declares a non-indexed, fail-open column.
    #[must_use]
    pub const fn new(name: &'static str, column_type: ColumnType) -> Self {
        Self {
            name,
            column_type,
            indexed: false,
            fail_open: true,
        }
    }

    /// Marks the column as indexed.
    #[must_use]
    pub const fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Makes decryption failures on this column surface as errors.
    #[must_use]
    pub const fn strict(mut self) -> Self {
        self.fail_open = false;
        self
    }
}

/// Static description of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name, used as the key prefix.
    pub table_name: &'static str,
    /// Declared columns.
    pub columns: &'static [Column],
}

impl TableSchema {
    /// Creates a schema.
    #[must_use]
    pub const fn new(table_name: &'static str, columns: &'static [Column]) -> Self {
        Self {
            table_name,
            columns,
        }
    }

    /// Returns the declaration of `name`, if any.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the indexed columns.
    pub fn indexed_columns(&self) -> impl Iterator<Item = &Column> + '_ {
        self.columns.iter().filter(|c| c.indexed)
    }

    /// Returns true if `name` is declared and indexed.
    #[must_use]
    pub fn is_indexed(&self, name: &str) -> bool {
        self.column(name).is_some_and(|c| c.indexed)
    }

    /// Returns true if decryption failures on `name` are tolerated.
    ///
    /// Undeclared fields are tolerated.
    #[must_use]
    pub fn is_fail_open(&self, name: &str) -> bool {
        self.column(name).map_or(true, |c| c.fail_open)
    }

    /// Key of the primary record: `<table>:<id>`.
    #[must_use]
    pub fn record_key(&self, id: &str) -> String {
        format!("{}:{}", self.table_name, id)
    }

    /// Extracts the entity id from a primary record key.
    #[must_use]
    pub fn id_from_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.table_name)?.strip_prefix(':')
    }

    /// Key of a secondary index set: `idx:<table>:<field>:<value>`.
    #[must_use]
    pub fn index_key(&self, field: &str, token: &str) -> String {
        format!("{INDEX_PREFIX}:{}:{field}:{token}", self.table_name)
    }

    /// Scan pattern matching every primary record of the table.
    #[must_use]
    pub fn scan_pattern(&self) -> String {
        format!("{}:*", escape_glob(self.table_name))
    }

    /// Scan pattern matching every index set of the table.
    #[must_use]
    pub fn index_scan_pattern(&self) -> String {
        format!("{INDEX_PREFIX}:{}:*", escape_glob(self.table_name))
    }

    /// Splits an index key of this table into `(field, token)`.
    ///
    /// Only fields declared as indexed are recognised, so a token
    /// containing `:` is returned intact.
    #[must_use]
    pub fn parse_index_key<'a>(&self, key: &'a str) -> Option<(&'a str, &'a str)> {
        let rest = key
            .strip_prefix(INDEX_PREFIX)?
            .strip_prefix(':')?
            .strip_prefix(self.table_name)?
            .strip_prefix(':')?;
        self.indexed_columns().find_map(|column| {
            let token = rest.strip_prefix(column.name)?.strip_prefix(':')?;
            Some((&rest[..column.name.len()], token))
        })
    }
}
