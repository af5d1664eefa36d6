//! # Unified Alerting Migration
//!
//! Upgrades legacy dashboard alerts and notification channels to unified
//! alerting rules, contact points and notification policies, and reverts
//! the upgrade. See [`upgrade::MigrationService`] for the operations.

pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod legacy;
pub mod models;
pub mod notifier;
pub mod repositories;
pub mod services;
pub mod telemetry;
pub mod unified;
pub mod upgrade;
pub use migration;
