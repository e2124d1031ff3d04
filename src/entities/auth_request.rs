use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_provider_auth_request")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub client_id: String,
    pub scope: String, // as requested, not yet intersected
    pub redirect_uri: String,
    pub state: Option<String>,
    pub response_type: String, // "code" | "token"
    pub grant_code: Option<String>,
    pub access_token: Option<String>,
    pub authorized_at: Option<i64>,
    pub revoked: Option<i64>,
    pub created_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
