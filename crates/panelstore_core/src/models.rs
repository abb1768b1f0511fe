//! Hosting panel entity kinds.
//!
//! These types carry schema metadata only. Use them through
//! [`crate::Store::table`].

use crate::entity::EntityKind;
use crate::schema::{Column, ColumnType, TableSchema};

/// A panel user account.
#[derive(Debug, Clone, Copy)]
pub struct Profile;

/// A machine running the game server daemon.
#[derive(Debug, Clone, Copy)]
pub struct Node;

/// A game server instance hosted on a node.
#[derive(Debug, Clone, Copy)]
pub struct Server;

/// A server software template (egg).
#[derive(Debug, Clone, Copy)]
pub struct Core;

/// A network address and port assigned to a node.
#[derive(Debug, Clone, Copy)]
pub struct Allocation;

static PROFILES: TableSchema = TableSchema::new(
    "profiles",
    &[
        Column::new("email", ColumnType::TextUnique).indexed(),
        Column::new("username", ColumnType::TextUnique).indexed(),
        Column::new("password", ColumnType::String),
        Column::new("admin", ColumnType::Boolean),
        Column::new("created_at", ColumnType::Long),
    ],
);

static NODES: TableSchema = TableSchema::new(
    "nodes",
    &[
        Column::new("name", ColumnType::String),
        Column::new("fqdn", ColumnType::TextUnique).indexed(),
        Column::new("port", ColumnType::Int),
        Column::new("ssl", ColumnType::Boolean),
        Column::new("token", ColumnType::String),
        Column::new("memory", ColumnType::Long),
        Column::new("disk", ColumnType::Long),
    ],
);

static SERVERS: TableSchema = TableSchema::new(
    "servers",
    &[
        Column::new("name", ColumnType::String),
        Column::new("owner_id", ColumnType::String).indexed(),
        Column::new("node_id", ColumnType::String).indexed(),
        Column::new("core_id", ColumnType::String),
        Column::new("memory", ColumnType::Long),
        Column::new("cpu", ColumnType::Double),
        Column::new("disk", ColumnType::Long),
        Column::new("suspended", ColumnType::Boolean),
    ],
);

static CORES: TableSchema = TableSchema::new(
    "cores",
    &[
        Column::new("name", ColumnType::TextUnique).indexed(),
        Column::new("docker_image", ColumnType::String),
        Column::new("startup_command", ColumnType::String),
        Column::new("variables", ColumnType::String),
    ],
);

static ALLOCATIONS: TableSchema = TableSchema::new(
    "allocations",
    &[
        Column::new("node_id", ColumnType::String).indexed(),
        Column::new("server_id", ColumnType::String).indexed(),
        Column::new("ip", ColumnType::String),
        Column::new("port", ColumnType::Int),
    ],
);

impl EntityKind for Profile {
    const SECRET_FIELDS: &'static [&'static str] = &["password"];

    fn schema() -> &'static TableSchema {
        &PROFILES
    }
}

impl EntityKind for Node {
    const SECRET_FIELDS: &'static [&'static str] = &["token"];

    fn schema() -> &'static TableSchema {
        &NODES
    }
}

impl EntityKind for Server {
    fn schema() -> &'static TableSchema {
        &SERVERS
    }
}

impl EntityKind for Core {
    fn schema() -> &'static TableSchema {
        &CORES
    }
}

impl EntityKind for Allocation {
    fn schema() -> &'static TableSchema {
        &ALLOCATIONS
    }
}

/// Every panel schema, for tooling that walks all tables.
#[must_use]
pub fn all_schemas() -> [&'static TableSchema; 5] {
    [
        Profile::schema(),
        Node::schema(),
        Server::schema(),
        Core::schema(),
        Allocation::schema(),
    ]
}

/// Looks up a panel schema by table name.
#[must_use]
pub fn schema_by_name(table: &str) -> Option<&'static TableSchema> {
    all_schemas().into_iter().find(|s| s.table_name == table)
}
