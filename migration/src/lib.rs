//! Database migrations for the alerting migration engine.
//!
//! Creates the legacy alerting inputs, the unified alerting outputs and the
//! bookkeeping tables (key-value ledger, server locks) using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_01_01_000001_create_orgs_and_dashboards;
mod m2025_01_01_000002_create_resource_permissions;
mod m2025_01_01_000003_create_legacy_alerting;
mod m2025_01_01_000004_create_unified_alerting;
mod m2025_01_01_000005_create_kv_store_and_server_lock;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_01_000001_create_orgs_and_dashboards::Migration),
            Box::new(m2025_01_01_000002_create_resource_permissions::Migration),
            Box::new(m2025_01_01_000003_create_legacy_alerting::Migration),
            Box::new(m2025_01_01_000004_create_unified_alerting::Migration),
            Box::new(m2025_01_01_000005_create_kv_store_and_server_lock::Migration),
        ]
    }
}
