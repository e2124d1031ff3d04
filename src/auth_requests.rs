//! In-flight authorization requests.
//!
//! A request starts pending and moves exactly once: to authorized (carrying
//! either a grant code or an access token, by response type) or to revoked.
//! Denial is revocation of a pending request. The requested scope is stored as
//! asked and only narrowed to the client's scope when the user authorizes.

use crate::clients::{self, Client};
use crate::context::OAuthContext;
use crate::entities;
use crate::errors::GrantorError;
use crate::grants::{self, AccessGrant};
use crate::identity::Identity;
use crate::scope::ScopeSet;
use crate::storage;
use crate::tokens::{self, AccessToken, Expiry};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Authorization code flow
    Code,
    /// Implicit flow
    Token,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Code => "code",
            ResponseType::Token => "token",
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseType {
    type Err = GrantorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "code" => Ok(ResponseType::Code),
            "token" => Ok(ResponseType::Token),
            other => Err(GrantorError::InvalidArgument(format!(
                "Unsupported response type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Authorized,
    /// Denied by the user or revoked afterwards.
    Revoked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    pub id: String,
    pub client_id: String,
    pub scope: ScopeSet,
    pub redirect_uri: String,
    pub state: Option<String>,
    pub response_type: ResponseType,
    pub grant_code: Option<String>,
    pub access_token: Option<String>,
    pub authorized_at: Option<i64>,
    pub revoked: Option<i64>,
    pub created_at: i64,
}

impl AuthRequest {
    pub fn status(&self) -> RequestStatus {
        if self.revoked.is_some() {
            RequestStatus::Revoked
        } else if self.authorized_at.is_some() {
            RequestStatus::Authorized
        } else {
            RequestStatus::Pending
        }
    }
}

impl TryFrom<entities::auth_request::Model> for AuthRequest {
    type Error = GrantorError;

    fn try_from(model: entities::auth_request::Model) -> Result<Self, Self::Error> {
        Ok(AuthRequest {
            response_type: model.response_type.parse()?,
            id: model.id,
            client_id: model.client_id,
            scope: ScopeSet::parse(&model.scope),
            redirect_uri: model.redirect_uri,
            state: model.state,
            grant_code: model.grant_code,
            access_token: model.access_token,
            authorized_at: model.authorized_at,
            revoked: model.revoked,
            created_at: model.created_at,
        })
    }
}

/// What a successful authorization produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Code(AccessGrant),
    Token(AccessToken),
}

/// Records the start of an authorization flow. Without an explicit
/// `redirect_uri` the client's registered one is used.
pub async fn create_auth_request(
    ctx: &OAuthContext,
    client: &Client,
    scope: &ScopeSet,
    redirect_uri: Option<&str>,
    state: Option<&str>,
    response_type: ResponseType,
) -> Result<AuthRequest, GrantorError> {
    if client.is_revoked() {
        return Err(GrantorError::ClientRevoked(client.client_id.clone()));
    }
    let redirect_uri = match redirect_uri.or(client.redirect_uri.as_deref()) {
        Some(uri) if !uri.trim().is_empty() => uri.to_string(),
        _ => {
            return Err(GrantorError::InvalidArgument(
                "redirect_uri is required".to_string(),
            ))
        }
    };
    if !client.permits_redirect(&redirect_uri) {
        return Err(GrantorError::RedirectMismatch);
    }

    let now = storage::now();
    for attempt in 1..=ctx.max_attempts() {
        let request = entities::auth_request::ActiveModel {
            id: Set(ctx.secure_random()),
            client_id: Set(client.client_id.clone()),
            scope: Set(scope.join()),
            redirect_uri: Set(redirect_uri.clone()),
            state: Set(state.map(str::to_string)),
            response_type: Set(response_type.as_str().to_string()),
            grant_code: Set(None),
            access_token: Set(None),
            authorized_at: Set(None),
            revoked: Set(None),
            created_at: Set(now),
        };

        match request.insert(ctx.db()).await.map_err(GrantorError::from) {
            Ok(model) => return model.try_into(),
            Err(GrantorError::UniqueConstraintConflict(detail)) => {
                tracing::warn!(attempt, %detail, "Auth request id collision, retrying");
            }
            Err(e) => return Err(e),
        }
    }

    Err(GrantorError::UniqueConstraintConflict(
        "could not generate a unique auth request id".to_string(),
    ))
}

pub async fn get_auth_request(
    ctx: &OAuthContext,
    id: &str,
) -> Result<Option<AuthRequest>, GrantorError> {
    find_model(ctx.db(), id)
        .await?
        .map(AuthRequest::try_from)
        .transpose()
}

/// The user approved the request. Issues a grant (code flow) or a token
/// (implicit flow, reusing a live one) for the scope the client allows now.
pub async fn authorize(
    ctx: &OAuthContext,
    id: &str,
    identity: &Identity,
) -> Result<Authorization, GrantorError> {
    let request = require_request(ctx, id).await?;
    if request.status() != RequestStatus::Pending {
        return Err(GrantorError::InvalidState(format!(
            "auth request {id} is already {:?}",
            request.status()
        )));
    }
    let identity = identity.normalize()?;

    let client = clients::require_client(ctx, &request.client_id).await?;
    if client.is_revoked() {
        return Err(GrantorError::ClientRevoked(client.client_id));
    }
    let scope = request.scope.intersect(&client.scope);

    for attempt in 1..=ctx.max_attempts() {
        let candidate = ctx.secure_random();
        let txn = ctx.db().begin().await?;

        let outcome = match request.response_type {
            ResponseType::Code => {
                authorize_code(&txn, ctx, &request, &candidate, &identity, &scope).await
            }
            ResponseType::Token => {
                authorize_token(&txn, ctx, &request, &candidate, &identity, &scope).await
            }
        };

        match outcome {
            Ok(authorization) => {
                txn.commit().await?;
                tracing::info!(
                    client_id = %request.client_id,
                    response_type = %request.response_type,
                    "Authorized request"
                );
                return Ok(authorization);
            }
            Err(GrantorError::UniqueConstraintConflict(detail)) => {
                txn.rollback().await?;
                tracing::warn!(attempt, %detail, "Collision while authorizing, retrying");
            }
            Err(e) => return Err(e),
        }
    }

    Err(GrantorError::UniqueConstraintConflict(
        "could not generate a unique credential".to_string(),
    ))
}

async fn authorize_code<C: ConnectionTrait>(
    conn: &C,
    ctx: &OAuthContext,
    request: &AuthRequest,
    code: &str,
    identity: &str,
    scope: &ScopeSet,
) -> Result<Authorization, GrantorError> {
    use entities::auth_request::Column;

    mark_authorized(conn, &request.id, Column::GrantCode, code).await?;

    let grant = grants::insert_grant(
        conn,
        code.to_string(),
        &request.client_id,
        identity,
        scope,
        Some(&request.redirect_uri),
        ctx.tokens().grant_ttl,
    )
    .await?;
    Ok(Authorization::Code(grant.into()))
}

async fn authorize_token<C: ConnectionTrait>(
    conn: &C,
    ctx: &OAuthContext,
    request: &AuthRequest,
    candidate: &str,
    identity: &str,
    scope: &ScopeSet,
) -> Result<Authorization, GrantorError> {
    use entities::auth_request::{Column, Entity};

    mark_authorized(conn, &request.id, Column::AccessToken, candidate).await?;

    let now = storage::now();
    let token =
        match tokens::find_reusable(conn, identity, &request.client_id, scope, now).await? {
            Some(existing) => {
                Entity::update_many()
                    .col_expr(Column::AccessToken, Expr::value(existing.token.clone()))
                    .filter(Column::Id.eq(request.id.as_str()))
                    .exec(conn)
                    .await?;
                existing
            }
            None => {
                let expires_at = Expiry::Default.expires_at(ctx.tokens().access_token_ttl, now)?;
                tokens::insert_token(
                    conn,
                    candidate.to_string(),
                    &request.client_id,
                    Some(identity.to_string()),
                    scope,
                    expires_at,
                    now,
                )
                .await?
            }
        };
    Ok(Authorization::Token(token.into()))
}

/// Moves a pending request to authorized, setting `column` to `value`. Fails
/// with InvalidState if another caller moved it first.
async fn mark_authorized<C: ConnectionTrait>(
    conn: &C,
    id: &str,
    column: entities::auth_request::Column,
    value: &str,
) -> Result<(), GrantorError> {
    use entities::auth_request::{Column, Entity};

    let result = Entity::update_many()
        .col_expr(Column::AuthorizedAt, Expr::value(storage::now()))
        .col_expr(column, Expr::value(value.to_string()))
        .filter(Column::Id.eq(id))
        .filter(Column::AuthorizedAt.is_null())
        .filter(Column::Revoked.is_null())
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(GrantorError::InvalidState(format!(
            "auth request {id} is no longer pending"
        )));
    }
    Ok(())
}

/// The user refused. Only a pending request can be denied.
pub async fn deny(ctx: &OAuthContext, id: &str) -> Result<AuthRequest, GrantorError> {
    use entities::auth_request::{Column, Entity};

    let result = Entity::update_many()
        .col_expr(Column::Revoked, Expr::value(storage::now()))
        .filter(Column::Id.eq(id))
        .filter(Column::AuthorizedAt.is_null())
        .filter(Column::Revoked.is_null())
        .exec(ctx.db())
        .await?;

    finish_transition(ctx, id, result.rows_affected, "denied").await
}

/// Invalidates a pending or authorized request. Grants and tokens it already
/// produced are left alone.
pub async fn revoke(ctx: &OAuthContext, id: &str) -> Result<AuthRequest, GrantorError> {
    use entities::auth_request::{Column, Entity};

    let result = Entity::update_many()
        .col_expr(Column::Revoked, Expr::value(storage::now()))
        .filter(Column::Id.eq(id))
        .filter(Column::Revoked.is_null())
        .exec(ctx.db())
        .await?;

    finish_transition(ctx, id, result.rows_affected, "revoked").await
}

async fn finish_transition(
    ctx: &OAuthContext,
    id: &str,
    rows_affected: u64,
    action: &str,
) -> Result<AuthRequest, GrantorError> {
    let request = require_request(ctx, id).await?;
    if rows_affected == 0 {
        return Err(GrantorError::InvalidState(format!(
            "auth request {id} cannot be {action}, it is {:?}",
            request.status()
        )));
    }
    tracing::info!(client_id = %request.client_id, "Auth request {action}");
    Ok(request)
}

async fn require_request(ctx: &OAuthContext, id: &str) -> Result<AuthRequest, GrantorError> {
    get_auth_request(ctx, id)
        .await?
        .ok_or_else(|| GrantorError::not_found("auth request", id))
}

async fn find_model<C: ConnectionTrait>(
    conn: &C,
    id: &str,
) -> Result<Option<entities::auth_request::Model>, GrantorError> {
    use entities::auth_request::Entity;

    Ok(Entity::find_by_id(id.to_string()).one(conn).await?)
}
