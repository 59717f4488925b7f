//! redb table definitions for the routegrid document store.

use redb::TableDefinition;

/// Document bodies (JSON) keyed by document key.
pub const DOCUMENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("documents");

/// `(seq_no, primary_term)` of the stored body, keyed by document key.
pub const VERSIONS: TableDefinition<&str, (u64, u64)> = TableDefinition::new("versions");

/// Store-level counters. Holds [`PRIMARY_TERM_KEY`].
pub const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

/// Incremented every time the database is opened.
pub const PRIMARY_TERM_KEY: &str = "primary_term";
