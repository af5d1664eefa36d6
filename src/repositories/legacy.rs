//! # Legacy Alerting Repository
//!
//! Read-only access to dashboards, legacy alerts and notification channels.

use std::collections::BTreeMap;

use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::error::RepositoryError;
use crate::models::{
    alert, alert_notification, dashboard, dashboard_provisioning, org, Alert, AlertNotification,
    Dashboard, DashboardProvisioning, Org,
};

pub struct LegacyRepository<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> LegacyRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn list_orgs(&self) -> Result<Vec<org::Model>, RepositoryError> {
        Org::find()
            .order_by_asc(org::Column::Id)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn get_dashboard(
        &self,
        org_id: i64,
        dashboard_id: i64,
    ) -> Result<Option<dashboard::Model>, RepositoryError> {
        Dashboard::find()
            .filter(dashboard::Column::OrgId.eq(org_id))
            .filter(dashboard::Column::Id.eq(dashboard_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn is_provisioned(
        &self,
        org_id: i64,
        dashboard_uid: &str,
    ) -> Result<bool, RepositoryError> {
        let row = DashboardProvisioning::find()
            .filter(dashboard_provisioning::Column::OrgId.eq(org_id))
            .filter(dashboard_provisioning::Column::DashboardUid.eq(dashboard_uid))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)?;
        Ok(row.is_some())
    }

    /// All alerts of an org grouped by dashboard id.
    pub async fn dashboard_alerts_by_dashboard(
        &self,
        org_id: i64,
    ) -> Result<BTreeMap<i64, Vec<alert::Model>>, RepositoryError> {
        let alerts = Alert::find()
            .filter(alert::Column::OrgId.eq(org_id))
            .order_by_asc(alert::Column::DashboardId)
            .order_by_asc(alert::Column::Id)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)?;

        let mut mapped: BTreeMap<i64, Vec<alert::Model>> = BTreeMap::new();
        for alert in alerts {
            mapped.entry(alert.dashboard_id).or_default().push(alert);
        }
        Ok(mapped)
    }

    pub async fn dashboard_alerts(
        &self,
        org_id: i64,
        dashboard_id: i64,
    ) -> Result<Vec<alert::Model>, RepositoryError> {
        Alert::find()
            .filter(alert::Column::OrgId.eq(org_id))
            .filter(alert::Column::DashboardId.eq(dashboard_id))
            .order_by_asc(alert::Column::Id)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn dashboard_alert(
        &self,
        org_id: i64,
        dashboard_id: i64,
        panel_id: i64,
    ) -> Result<Option<alert::Model>, RepositoryError> {
        Alert::find()
            .filter(alert::Column::OrgId.eq(org_id))
            .filter(alert::Column::DashboardId.eq(dashboard_id))
            .filter(alert::Column::PanelId.eq(panel_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    /// Channels of an org, default channels first.
    pub async fn notification_channels(
        &self,
        org_id: i64,
    ) -> Result<Vec<alert_notification::Model>, RepositoryError> {
        AlertNotification::find()
            .filter(alert_notification::Column::OrgId.eq(org_id))
            .order_by_desc(alert_notification::Column::IsDefault)
            .order_by_asc(alert_notification::Column::Id)
            .all(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn notification_channel(
        &self,
        org_id: i64,
        channel_id: i64,
    ) -> Result<Option<alert_notification::Model>, RepositoryError> {
        AlertNotification::find()
            .filter(alert_notification::Column::OrgId.eq(org_id))
            .filter(alert_notification::Column::Id.eq(channel_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }

    pub async fn notification_channel_uid(
        &self,
        org_id: i64,
        channel_id: i64,
    ) -> Result<String, RepositoryError> {
        self.notification_channel(org_id, channel_id)
            .await?
            .map(|c| c.uid)
            .ok_or_else(|| RepositoryError::NotFound(format!("alert notification {channel_id}")))
    }
}
