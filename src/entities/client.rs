use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_provider_client")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub client_id: String,
    pub secret: String,
    pub display_name: String,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: String, // comma-joined, ordered
    pub notes: Option<String>,
    pub revoked: Option<i64>,
    pub tokens_granted: i64,
    pub tokens_revoked: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
