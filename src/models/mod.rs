//! # Data Models
//!
//! SeaORM entities for the legacy alerting inputs, the unified alerting outputs
//! and the bookkeeping tables used by the migration engine.

pub mod alert;
pub mod alert_configuration;
pub mod alert_instance;
pub mod alert_notification;
pub mod alert_rule;
pub mod alert_rule_version;
pub mod dashboard;
pub mod dashboard_provisioning;
pub mod data_source;
pub mod folder;
pub mod kv_store;
pub mod ngalert_configuration;
pub mod org;
pub mod provenance_type;
pub mod resource_permission;
pub mod server_lock;

pub use alert::Entity as Alert;
pub use alert_configuration::Entity as AlertConfiguration;
pub use alert_instance::Entity as AlertInstance;
pub use alert_notification::Entity as AlertNotification;
pub use alert_rule::Entity as AlertRule;
pub use alert_rule_version::Entity as AlertRuleVersion;
pub use dashboard::Entity as Dashboard;
pub use dashboard_provisioning::Entity as DashboardProvisioning;
pub use data_source::Entity as DataSource;
pub use folder::Entity as Folder;
pub use kv_store::Entity as KvStore;
pub use ngalert_configuration::Entity as NgalertConfiguration;
pub use org::Entity as Org;
pub use provenance_type::Entity as ProvenanceType;
pub use resource_permission::Entity as ResourcePermission;
pub use server_lock::Entity as ServerLock;
