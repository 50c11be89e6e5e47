//! Business logic services for the Cutover control plane.

pub mod migration;

pub use migration::{MigrationService, StartMigrationResponse, StartedMigration};
