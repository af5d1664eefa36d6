//! # Repository Layer
//!
//! Repositories wrap SeaORM access to one group of tables. Each is generic
//! over [`sea_orm::ConnectionTrait`] so the migration engine can run them
//! against an open transaction or savepoint.

pub mod alert_rule;
pub mod alertmanager;
pub mod datasource;
pub mod folder;
pub mod kv_store;
pub mod legacy;
pub mod server_lock;

pub use alert_rule::AlertRuleRepository;
pub use alertmanager::AlertmanagerRepository;
pub use datasource::DatasourceRepository;
pub use folder::FolderRepository;
pub use kv_store::KvStoreRepository;
pub use legacy::LegacyRepository;
pub use server_lock::ServerLockRepository;
