use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

use crate::error::RepositoryError;
use crate::models::{data_source, DataSource};

pub struct DatasourceRepository<'a, C> {
    db: &'a C,
}

impl<'a, C: ConnectionTrait> DatasourceRepository<'a, C> {
    pub fn new(db: &'a C) -> Self {
        Self { db }
    }

    pub async fn get(
        &self,
        org_id: i64,
        datasource_id: i64,
    ) -> Result<Option<data_source::Model>, RepositoryError> {
        DataSource::find()
            .filter(data_source::Column::OrgId.eq(org_id))
            .filter(data_source::Column::Id.eq(datasource_id))
            .one(self.db)
            .await
            .map_err(RepositoryError::database_error)
    }
}
