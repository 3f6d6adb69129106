//! Provisioning states of a managed database.
//!
//! ```text
//! Absent ──create──▶ Created ──schema──▶ SchemaApplied ──demo──▶ DemoUserGranted
//!   ▲                   │                      │                       │
//!   └───────────────────┴──────── drop ────────┴───────────────────────┘
//! ```
//!
//! Only the ready states are reported. A database that was created but whose
//! schema failed surfaces as `ProvisionError::SchemaNotApplied` and stays that
//! way until the schema is re-applied or the database is dropped.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseState {
    SchemaApplied,
    DemoUserGranted,
}
