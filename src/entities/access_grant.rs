use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_provider_access_grant")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub code: String,
    pub client_id: String,
    pub identity: String,
    pub scope: String,
    pub redirect_uri: Option<String>,
    pub expires_at: i64,
    pub granted_at: Option<i64>,
    pub revoked: Option<i64>,
    pub access_token: Option<String>, // set once exchanged
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
