//! Registered client applications.
//!
//! Clients are never deleted. Revocation stamps `revoked` and stops new
//! grants and tokens from being issued; tokens already out keep working until
//! they expire or are revoked themselves.

use crate::context::OAuthContext;
use crate::entities;
use crate::errors::GrantorError;
use crate::scope::ScopeSet;
use crate::storage;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    pub secret: String,
    pub display_name: String,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: ScopeSet,
    pub notes: Option<String>,
    pub revoked: Option<i64>,
    pub tokens_granted: i64,
    pub tokens_revoked: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Client {
    pub fn is_revoked(&self) -> bool {
        self.revoked.is_some()
    }

    /// A client that registered a redirect URI only accepts that exact URI.
    pub fn permits_redirect(&self, uri: &str) -> bool {
        match &self.redirect_uri {
            Some(registered) => registered == uri,
            None => true,
        }
    }
}

impl From<entities::client::Model> for Client {
    fn from(model: entities::client::Model) -> Self {
        Client {
            client_id: model.client_id,
            secret: model.secret,
            display_name: model.display_name,
            link: model.link,
            image_url: model.image_url,
            redirect_uri: model.redirect_uri,
            scope: ScopeSet::parse(&model.scope),
            notes: model.notes,
            revoked: model.revoked,
            tokens_granted: model.tokens_granted,
            tokens_revoked: model.tokens_revoked,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Caller-supplied client attributes, used for registration and updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientAttributes {
    pub display_name: String,
    pub link: Option<String>,
    pub image_url: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: ScopeSet,
    pub notes: Option<String>,
}

pub async fn register(ctx: &OAuthContext, input: ClientAttributes) -> Result<Client, GrantorError> {
    let now = storage::now();

    for attempt in 1..=ctx.max_attempts() {
        let client = entities::client::ActiveModel {
            client_id: Set(ctx.secure_random()),
            secret: Set(ctx.secure_random()),
            display_name: Set(input.display_name.clone()),
            link: Set(input.link.clone()),
            image_url: Set(input.image_url.clone()),
            redirect_uri: Set(input.redirect_uri.clone()),
            scope: Set(input.scope.join()),
            notes: Set(input.notes.clone()),
            revoked: Set(None),
            tokens_granted: Set(0),
            tokens_revoked: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        };

        match client.insert(ctx.db()).await.map_err(GrantorError::from) {
            Ok(model) => {
                tracing::info!(client_id = %model.client_id, "Registered client");
                return Ok(model.into());
            }
            Err(GrantorError::UniqueConstraintConflict(detail)) => {
                tracing::warn!(attempt, %detail, "Client id collision, retrying");
            }
            Err(e) => return Err(e),
        }
    }

    Err(GrantorError::UniqueConstraintConflict(
        "could not generate a unique client id".to_string(),
    ))
}

pub async fn get_client(ctx: &OAuthContext, client_id: &str) -> Result<Option<Client>, GrantorError> {
    Ok(find_model(ctx.db(), client_id).await?.map(Client::from))
}

pub(crate) async fn require_client(
    ctx: &OAuthContext,
    client_id: &str,
) -> Result<Client, GrantorError> {
    get_client(ctx, client_id)
        .await?
        .ok_or_else(|| GrantorError::not_found("client", client_id))
}

/// Client credential check for the token endpoint.
pub async fn authenticate(
    ctx: &OAuthContext,
    client_id: &str,
    secret: &str,
) -> Result<Client, GrantorError> {
    use entities::client::{Column, Entity};

    let model = Entity::find()
        .filter(Column::ClientId.eq(client_id))
        .filter(Column::Secret.eq(secret))
        .one(ctx.db())
        .await?
        .ok_or_else(|| GrantorError::not_found("client", client_id))?;

    if model.revoked.is_some() {
        return Err(GrantorError::ClientRevoked(model.client_id));
    }
    Ok(model.into())
}

/// Replaces the client's descriptive attributes and allowed scope. A new
/// scope applies to authorizations that have not happened yet.
pub async fn update_client(
    ctx: &OAuthContext,
    client_id: &str,
    input: ClientAttributes,
) -> Result<Client, GrantorError> {
    let model = find_model(ctx.db(), client_id)
        .await?
        .ok_or_else(|| GrantorError::not_found("client", client_id))?;

    let mut active: entities::client::ActiveModel = model.into();
    active.display_name = Set(input.display_name);
    active.link = Set(input.link);
    active.image_url = Set(input.image_url);
    active.redirect_uri = Set(input.redirect_uri);
    active.scope = Set(input.scope.join());
    active.notes = Set(input.notes);
    active.updated_at = Set(storage::now());

    Ok(active.update(ctx.db()).await?.into())
}

pub async fn list_clients(ctx: &OAuthContext) -> Result<Vec<Client>, GrantorError> {
    use entities::client::{Column, Entity};

    Ok(Entity::find()
        .order_by_asc(Column::CreatedAt)
        .all(ctx.db())
        .await?
        .into_iter()
        .map(Client::from)
        .collect())
}

/// Stamps the client as revoked. Revoking twice keeps the first timestamp.
pub async fn revoke_client(ctx: &OAuthContext, client_id: &str) -> Result<Client, GrantorError> {
    use entities::client::{Column, Entity};

    let now = storage::now();
    let result = Entity::update_many()
        .col_expr(Column::Revoked, Expr::value(now))
        .col_expr(Column::UpdatedAt, Expr::value(now))
        .filter(Column::ClientId.eq(client_id))
        .filter(Column::Revoked.is_null())
        .exec(ctx.db())
        .await?;

    let client = require_client(ctx, client_id).await?;
    if result.rows_affected > 0 {
        tracing::info!(%client_id, "Revoked client");
    }
    Ok(client)
}

/// Increments `tokens_granted`. Must run in the transaction that creates the
/// token; fails for unknown or revoked clients so the token is rolled back.
pub async fn record_token_granted<C: ConnectionTrait>(
    conn: &C,
    client_id: &str,
) -> Result<(), GrantorError> {
    use entities::client::{Column, Entity};

    let result = Entity::update_many()
        .col_expr(
            Column::TokensGranted,
            Expr::col(Column::TokensGranted).add(1),
        )
        .filter(Column::ClientId.eq(client_id))
        .filter(Column::Revoked.is_null())
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(inactive_client_error(conn, client_id).await);
    }
    Ok(())
}

/// Increments `tokens_revoked`. Must run in the transaction that revokes the
/// token. Tokens of a revoked client can still be revoked.
pub async fn record_token_revoked<C: ConnectionTrait>(
    conn: &C,
    client_id: &str,
) -> Result<(), GrantorError> {
    use entities::client::{Column, Entity};

    let result = Entity::update_many()
        .col_expr(
            Column::TokensRevoked,
            Expr::col(Column::TokensRevoked).add(1),
        )
        .filter(Column::ClientId.eq(client_id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(GrantorError::not_found("client", client_id));
    }
    Ok(())
}

/// Fails unless the client exists and is not revoked, as seen by `conn`.
pub(crate) async fn ensure_active<C: ConnectionTrait>(
    conn: &C,
    client_id: &str,
) -> Result<(), GrantorError> {
    match find_model(conn, client_id).await? {
        Some(model) if model.revoked.is_none() => Ok(()),
        Some(model) => Err(GrantorError::ClientRevoked(model.client_id)),
        None => Err(GrantorError::not_found("client", client_id)),
    }
}

async fn inactive_client_error<C: ConnectionTrait>(conn: &C, client_id: &str) -> GrantorError {
    match ensure_active(conn, client_id).await {
        Err(e) => e,
        Ok(()) => GrantorError::InvalidState(format!("client {client_id} changed concurrently")),
    }
}

async fn find_model<C: ConnectionTrait>(
    conn: &C,
    client_id: &str,
) -> Result<Option<entities::client::Model>, GrantorError> {
    use entities::client::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::ClientId.eq(client_id))
        .one(conn)
        .await?)
}
