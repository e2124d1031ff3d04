//! Access tokens: the bearer credentials resources check.
//!
//! Issuing a token and bumping the owning client's `tokens_granted` happen in
//! one transaction, as do revoking a token and bumping `tokens_revoked`.
//! Tokens are never deleted.

use crate::clients::{self, Client};
use crate::context::OAuthContext;
use crate::entities;
use crate::errors::GrantorError;
use crate::identity::Identity;
use crate::scope::ScopeSet;
use crate::storage;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};

/// How long a newly issued token lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Expiry {
    /// The server-wide `tokens.access_token_ttl`. Unset or 0 never expires.
    #[default]
    Default,
    /// Never expires.
    Never,
    /// Expires this many seconds from now. `In(0)` is expired on arrival.
    In(i64),
}

impl Expiry {
    /// Absolute expiry for a token issued at `now`. Fails when the lifetime
    /// does not fit in a unix timestamp.
    pub fn expires_at(
        self,
        default_ttl: Option<i64>,
        now: i64,
    ) -> Result<Option<i64>, GrantorError> {
        let secs = match self {
            Expiry::Default => match default_ttl {
                None | Some(0) => return Ok(None),
                Some(ttl) => ttl,
            },
            Expiry::Never => return Ok(None),
            Expiry::In(secs) => secs,
        };
        storage::offset(now, secs).map(Some)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub identity: Option<String>,
    pub scope: ScopeSet,
    pub expires_at: Option<i64>,
    pub revoked: Option<i64>,
    pub last_access: Option<i64>,
    pub prev_access: Option<i64>,
    pub created_at: i64,
}

impl AccessToken {
    pub fn is_active(&self) -> bool {
        self.revoked.is_none()
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(expires_at) if expires_at <= now)
    }

    /// Active and not expired at `now`.
    pub fn is_valid_at(&self, now: i64) -> bool {
        self.is_active() && !self.is_expired_at(now)
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(storage::now())
    }

    /// Seconds until expiry, for `expires_in` in token responses.
    pub fn expires_in(&self, now: i64) -> Option<i64> {
        self.expires_at.map(|at| at.saturating_sub(now).max(0))
    }
}

impl From<entities::access_token::Model> for AccessToken {
    fn from(model: entities::access_token::Model) -> Self {
        AccessToken {
            token: model.token,
            client_id: model.client_id,
            identity: model.identity,
            scope: ScopeSet::parse(&model.scope),
            expires_at: model.expires_at,
            revoked: model.revoked,
            last_access: model.last_access,
            prev_access: model.prev_access,
            created_at: model.created_at,
        }
    }
}

// Query builders matching the predicates on AccessToken.

pub fn active() -> Condition {
    Condition::all().add(entities::access_token::Column::Revoked.is_null())
}

pub fn revoked() -> Condition {
    Condition::all().add(entities::access_token::Column::Revoked.is_not_null())
}

pub fn not_expired(now: i64) -> Condition {
    use entities::access_token::Column;

    Condition::any()
        .add(Column::ExpiresAt.is_null())
        .add(Column::ExpiresAt.gt(now))
}

/// Reporting filter. Unset fields do not constrain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenFilter {
    /// Only tokens created within this many days.
    pub days: Option<i64>,
    /// Only revoked (`true`) or only unrevoked (`false`) tokens.
    pub revoked: Option<bool>,
    pub client_id: Option<String>,
}

impl TokenFilter {
    fn condition(&self, now: i64) -> Result<Condition, GrantorError> {
        use entities::access_token::Column;

        let mut cond = Condition::all();
        if let Some(days) = self.days {
            if days < 0 {
                return Err(GrantorError::InvalidArgument(format!(
                    "days must not be negative, got {days}"
                )));
            }
            // Windows wider than the clock simply include everything.
            let since = now.saturating_sub(days.saturating_mul(86_400));
            cond = cond.add(Column::CreatedAt.gte(since));
        }
        match self.revoked {
            Some(true) => cond = cond.add(revoked()),
            Some(false) => cond = cond.add(active()),
            None => {}
        }
        if let Some(client_id) = &self.client_id {
            cond = cond.add(Column::ClientId.eq(client_id.as_str()));
        }
        Ok(cond)
    }
}

/// Returns a live token for `(identity, client, scope)`, creating one if none
/// exists. The requested scope is narrowed to what the client allows.
///
/// Reuse compares the comma-joined scope exactly, so the same names in a
/// different order produce a separate token. The remaining lifetime of a
/// reused token is not compared against `expires`.
pub async fn get_token_for(
    ctx: &OAuthContext,
    identity: &Identity,
    client: &Client,
    requested: &ScopeSet,
    expires: Expiry,
) -> Result<AccessToken, GrantorError> {
    let identity_str = identity.normalize()?;
    let scope = requested.intersect(&client.scope);

    if let Some(existing) =
        find_reusable(ctx.db(), &identity_str, &client.client_id, &scope, storage::now()).await?
    {
        tracing::debug!(client_id = %client.client_id, "Reusing access token");
        return Ok(existing.into());
    }

    create_token_for(ctx, client, &scope, Some(identity), expires).await
}

/// Always issues a new token and counts it against the client.
pub async fn create_token_for(
    ctx: &OAuthContext,
    client: &Client,
    scope: &ScopeSet,
    identity: Option<&Identity>,
    expires: Expiry,
) -> Result<AccessToken, GrantorError> {
    let identity = identity.map(Identity::normalize).transpose()?;
    let scope = scope.intersect(&client.scope);
    let now = storage::now();
    let expires_at = expires.expires_at(ctx.tokens().access_token_ttl, now)?;

    for attempt in 1..=ctx.max_attempts() {
        let txn = ctx.db().begin().await?;
        let issued = insert_token(
            &txn,
            ctx.secure_random(),
            &client.client_id,
            identity.clone(),
            &scope,
            expires_at,
            now,
        )
        .await;

        match issued {
            Ok(model) => {
                txn.commit().await?;
                tracing::info!(client_id = %client.client_id, scope = %scope, "Issued access token");
                return Ok(model.into());
            }
            Err(GrantorError::UniqueConstraintConflict(detail)) => {
                txn.rollback().await?;
                tracing::warn!(attempt, %detail, "Access token collision, retrying");
            }
            Err(e) => return Err(e),
        }
    }

    Err(GrantorError::UniqueConstraintConflict(
        "could not generate a unique access token".to_string(),
    ))
}

/// Counts the token against its client and inserts it, on `conn`. The caller
/// owns the transaction.
pub(crate) async fn insert_token<C: ConnectionTrait>(
    conn: &C,
    token: String,
    client_id: &str,
    identity: Option<String>,
    scope: &ScopeSet,
    expires_at: Option<i64>,
    now: i64,
) -> Result<entities::access_token::Model, GrantorError> {
    clients::record_token_granted(conn, client_id).await?;

    let access_token = entities::access_token::ActiveModel {
        token: Set(token),
        client_id: Set(client_id.to_string()),
        identity: Set(identity),
        scope: Set(scope.join()),
        expires_at: Set(expires_at),
        revoked: Set(None),
        last_access: Set(None),
        prev_access: Set(None),
        created_at: Set(now),
    };

    Ok(access_token.insert(conn).await?)
}

pub(crate) async fn find_reusable<C: ConnectionTrait>(
    conn: &C,
    identity: &str,
    client_id: &str,
    scope: &ScopeSet,
    now: i64,
) -> Result<Option<entities::access_token::Model>, GrantorError> {
    use entities::access_token::{Column, Entity};

    Ok(Entity::find()
        .filter(active())
        .filter(not_expired(now))
        .filter(Column::Identity.eq(identity))
        .filter(Column::ClientId.eq(client_id))
        .filter(Column::Scope.eq(scope.join()))
        .order_by_asc(Column::CreatedAt)
        .one(conn)
        .await?)
}

/// Exact lookup. Revoked and expired tokens are returned too; check
/// [`AccessToken::is_valid`] before granting access.
pub async fn from_token(ctx: &OAuthContext, token: &str) -> Result<Option<AccessToken>, GrantorError> {
    use entities::access_token::Entity;

    Ok(Entity::find_by_id(token.to_string())
        .one(ctx.db())
        .await?
        .map(AccessToken::from))
}

/// All tokens issued on behalf of `identity`, oldest first.
pub async fn from_identity(
    ctx: &OAuthContext,
    identity: &Identity,
) -> Result<Vec<AccessToken>, GrantorError> {
    use entities::access_token::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::Identity.eq(identity.canonical()))
        .order_by_asc(Column::CreatedAt)
        .all(ctx.db())
        .await?
        .into_iter()
        .map(AccessToken::from)
        .collect())
}

/// A page of the client's tokens, oldest first.
pub async fn for_client(
    ctx: &OAuthContext,
    client_id: &str,
    offset: u64,
    limit: u64,
) -> Result<Vec<AccessToken>, GrantorError> {
    use entities::access_token::{Column, Entity};

    Ok(Entity::find()
        .filter(Column::ClientId.eq(client_id))
        .order_by_asc(Column::CreatedAt)
        .order_by_asc(Column::Token)
        .offset(offset)
        .limit(limit)
        .all(ctx.db())
        .await?
        .into_iter()
        .map(AccessToken::from)
        .collect())
}

/// Records a resource access. Writes at most once per UTC day; returns
/// whether `last_access` changed.
pub async fn record_access(ctx: &OAuthContext, token: &str) -> Result<bool, GrantorError> {
    use entities::access_token::{Column, Entity};

    let now = storage::now();
    let today = storage::start_of_day(now);

    let result = Entity::update_many()
        .col_expr(Column::LastAccess, Expr::value(now))
        .filter(Column::Token.eq(token))
        .filter(
            Condition::any()
                .add(Column::LastAccess.is_null())
                .add(Column::LastAccess.lt(today)),
        )
        .exec(ctx.db())
        .await?;

    if result.rows_affected > 0 {
        return Ok(true);
    }
    if from_token(ctx, token).await?.is_none() {
        return Err(GrantorError::not_found("access token", token));
    }
    tracing::debug!("Access already recorded today");
    Ok(false)
}

/// Revokes the token and counts it against its client in one transaction.
/// Revoking an already revoked token changes nothing.
pub async fn revoke_token(ctx: &OAuthContext, token: &str) -> Result<AccessToken, GrantorError> {
    use entities::access_token::{Column, Entity};

    let txn = ctx.db().begin().await?;

    let result = Entity::update_many()
        .col_expr(Column::Revoked, Expr::value(storage::now()))
        .filter(Column::Token.eq(token))
        .filter(Column::Revoked.is_null())
        .exec(&txn)
        .await?;

    let model = Entity::find_by_id(token.to_string())
        .one(&txn)
        .await?
        .ok_or_else(|| GrantorError::not_found("access token", token))?;

    if result.rows_affected > 0 {
        clients::record_token_revoked(&txn, &model.client_id).await?;
        txn.commit().await?;
        tracing::info!(client_id = %model.client_id, "Revoked access token");
    } else {
        txn.commit().await?;
    }

    Ok(model.into())
}

pub async fn count(ctx: &OAuthContext, filter: &TokenFilter) -> Result<u64, GrantorError> {
    use entities::access_token::Entity;

    Ok(Entity::find()
        .filter(filter.condition(storage::now())?)
        .count(ctx.db())
        .await?)
}

/// Tokens matching `filter`, oldest first.
pub async fn historical(
    ctx: &OAuthContext,
    filter: &TokenFilter,
) -> Result<Vec<AccessToken>, GrantorError> {
    use entities::access_token::{Column, Entity};

    Ok(Entity::find()
        .filter(filter.condition(storage::now())?)
        .order_by_asc(Column::CreatedAt)
        .all(ctx.db())
        .await?
        .into_iter()
        .map(AccessToken::from)
        .collect())
}
