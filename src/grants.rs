//! Authorization codes.
//!
//! A grant is spent by exchanging it for an access token. Spending is a
//! conditional update on the grant row inside the same transaction that
//! creates the token, so two concurrent exchanges of one code can never both
//! succeed.

use crate::clients::{self, Client};
use crate::context::OAuthContext;
use crate::entities;
use crate::errors::GrantorError;
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub code: String,
    pub client_id: String,
    pub identity: String,
    pub scope: ScopeSet,
    pub redirect_uri: Option<String>,
    pub expires_at: i64,
    pub granted_at: Option<i64>,
    pub revoked: Option<i64>,
    pub access_token: Option<String>,
    pub created_at: i64,
}

impl AccessGrant {
    pub fn is_spent(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.is_some()
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    /// Checks, in order: unspent, unrevoked, unexpired, and the redirect URI
    /// when the caller supplies one.
    pub fn check_exchangeable(
        &self,
        redirect_uri: Option<&str>,
        now: i64,
    ) -> Result<(), GrantorError> {
        if self.is_spent() {
            return Err(GrantorError::GrantAlreadyUsed);
        }
        if self.is_revoked() {
            return Err(GrantorError::GrantRevoked);
        }
        if self.is_expired_at(now) {
            return Err(GrantorError::GrantExpired);
        }
        if let Some(uri) = redirect_uri {
            if self.redirect_uri.as_deref() != Some(uri) {
                return Err(GrantorError::RedirectMismatch);
            }
        }
        Ok(())
    }
}

impl From<entities::access_grant::Model> for AccessGrant {
    fn from(model: entities::access_grant::Model) -> Self {
        AccessGrant {
            code: model.code,
            client_id: model.client_id,
            identity: model.identity,
            scope: ScopeSet::parse(&model.scope),
            redirect_uri: model.redirect_uri,
            expires_at: model.expires_at,
            granted_at: model.granted_at,
            revoked: model.revoked,
            access_token: model.access_token,
            created_at: model.created_at,
        }
    }
}

/// Issues an authorization code for `identity`. The scope is narrowed to
/// what the client allows; `expires_in` defaults to `tokens.grant_ttl`.
pub async fn create_grant(
    ctx: &OAuthContext,
    client: &Client,
    identity: &Identity,
    scope: &ScopeSet,
    redirect_uri: Option<&str>,
    expires_in: Option<i64>,
) -> Result<AccessGrant, GrantorError> {
    let identity = identity.normalize()?;
    let scope = scope.intersect(&client.scope);
    let ttl = expires_in.unwrap_or(ctx.tokens().grant_ttl);

    for attempt in 1..=ctx.max_attempts() {
        let txn = ctx.db().begin().await?;
        let issued = insert_grant(
            &txn,
            ctx.secure_random(),
            &client.client_id,
            &identity,
            &scope,
            redirect_uri,
            ttl,
        )
        .await;

        match issued {
            Ok(model) => {
                txn.commit().await?;
                tracing::info!(client_id = %client.client_id, "Issued authorization code");
                return Ok(model.into());
            }
            Err(GrantorError::UniqueConstraintConflict(detail)) => {
                txn.rollback().await?;
                tracing::warn!(attempt, %detail, "Authorization code collision, retrying");
            }
            Err(e) => return Err(e),
        }
    }

    Err(GrantorError::UniqueConstraintConflict(
        "could not generate a unique authorization code".to_string(),
    ))
}

/// Inserts a grant on `conn`, failing if the client is unknown or revoked.
pub(crate) async fn insert_grant<C: ConnectionTrait>(
    conn: &C,
    code: String,
    client_id: &str,
    identity: &str,
    scope: &ScopeSet,
    redirect_uri: Option<&str>,
    ttl: i64,
) -> Result<entities::access_grant::Model, GrantorError> {
    let now = storage::now();
    let expires_at = storage::offset(now, ttl)?;

    let grant = entities::access_grant::ActiveModel {
        code: Set(code),
        client_id: Set(client_id.to_string()),
        identity: Set(identity.to_string()),
        scope: Set(scope.join()),
        redirect_uri: Set(redirect_uri.map(str::to_string)),
        expires_at: Set(expires_at),
        granted_at: Set(None),
        revoked: Set(None),
        access_token: Set(None),
        created_at: Set(now),
    };

    let model = grant.insert(conn).await?;
    clients::ensure_active(conn, client_id).await?;
    Ok(model)
}

pub async fn get_grant(ctx: &OAuthContext, code: &str) -> Result<Option<AccessGrant>, GrantorError> {
    Ok(find_model(ctx.db(), code).await?.map(AccessGrant::from))
}

/// Trades an authorization code for an access token. Exactly one caller can
/// win a given code; every other attempt fails with
/// [`GrantorError::GrantAlreadyUsed`].
pub async fn exchange(
    ctx: &OAuthContext,
    code: &str,
    redirect_uri: Option<&str>,
) -> Result<AccessToken, GrantorError> {
    use entities::access_grant::{Column, Entity};

    let grant: AccessGrant = find_model(ctx.db(), code)
        .await?
        .ok_or_else(|| GrantorError::not_found("access grant", code))?
        .into();
    grant.check_exchangeable(redirect_uri, storage::now())?;

    let client = clients::require_client(ctx, &grant.client_id).await?;
    let scope = grant.scope.intersect(&client.scope);

    for attempt in 1..=ctx.max_attempts() {
        let now = storage::now();
        let token = ctx.secure_random();
        let txn = ctx.db().begin().await?;

        let spent = Entity::update_many()
            .col_expr(Column::GrantedAt, Expr::value(now))
            .col_expr(Column::AccessToken, Expr::value(token.clone()))
            .filter(Column::Code.eq(code))
            .filter(Column::AccessToken.is_null())
            .filter(Column::Revoked.is_null())
            .filter(Column::ExpiresAt.gt(now))
            .exec(&txn)
            .await?;

        if spent.rows_affected == 0 {
            txn.rollback().await?;
            return Err(lost_exchange_error(ctx, code).await);
        }

        let expires_at = Expiry::Default.expires_at(ctx.tokens().access_token_ttl, now)?;
        let issued = tokens::insert_token(
            &txn,
            token,
            &grant.client_id,
            Some(grant.identity.clone()),
            &scope,
            expires_at,
            now,
        )
        .await;

        match issued {
            Ok(model) => {
                txn.commit().await?;
                tracing::info!(client_id = %grant.client_id, "Exchanged authorization code");
                return Ok(model.into());
            }
            Err(GrantorError::UniqueConstraintConflict(detail)) => {
                txn.rollback().await?;
                tracing::warn!(attempt, %detail, "Access token collision during exchange, retrying");
            }
            Err(e) => return Err(e),
        }
    }

    Err(GrantorError::UniqueConstraintConflict(
        "could not generate a unique access token".to_string(),
    ))
}

/// Explains why the guarded spend matched no row: another exchange won, or
/// the grant was revoked or expired in the meantime.
async fn lost_exchange_error(ctx: &OAuthContext, code: &str) -> GrantorError {
    match find_model(ctx.db(), code).await {
        Ok(Some(model)) => {
            let grant = AccessGrant::from(model);
            match grant.check_exchangeable(None, storage::now()) {
                Err(e) => e,
                Ok(()) => GrantorError::GrantAlreadyUsed,
            }
        }
        Ok(None) => GrantorError::not_found("access grant", code),
        Err(e) => e,
    }
}

/// Revokes an unspent or spent grant. Tokens already issued from it are not
/// affected. Revoking twice keeps the first timestamp.
pub async fn revoke_grant(ctx: &OAuthContext, code: &str) -> Result<AccessGrant, GrantorError> {
    use entities::access_grant::{Column, Entity};

    let result = Entity::update_many()
        .col_expr(Column::Revoked, Expr::value(storage::now()))
        .filter(Column::Code.eq(code))
        .filter(Column::Revoked.is_null())
        .exec(ctx.db())
        .await?;

    let grant = find_model(ctx.db(), code)
        .await?
        .ok_or_else(|| GrantorError::not_found("access grant", code))?;
    if result.rows_affected > 0 {
        tracing::info!(client_id = %grant.client_id, "Revoked authorization code");
    }
    Ok(grant.into())
}

async fn find_model<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Option<entities::access_grant::Model>, GrantorError> {
    use entities::access_grant::Entity;

    Ok(Entity::find_by_id(code.to_string()).one(conn).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{register, ClientAttributes};
    use crate::storage::test_support::TestDb;

    const REDIRECT: &str = "https://client.example.com/callback";

    async fn seed_client(ctx: &OAuthContext, scope: &str) -> Client {
        register(
            ctx,
            ClientAttributes {
                display_name: "Test Client".to_string(),
                redirect_uri: Some(REDIRECT.to_string()),
                scope: ScopeSet::parse(scope),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to register client")
    }

    fn grant_with(expires_at: i64, revoked: Option<i64>, access_token: Option<&str>) -> AccessGrant {
        AccessGrant {
            code: "code".into(),
            client_id: "client".into(),
            identity: "user".into(),
            scope: ScopeSet::parse("read"),
            redirect_uri: Some(REDIRECT.into()),
            expires_at,
            granted_at: access_token.map(|_| 1),
            revoked,
            access_token: access_token.map(str::to_string),
            created_at: 0,
        }
    }

    #[test]
    fn test_check_exchangeable_order() {
        let now = 1_000;

        // Spent wins over everything else
        let grant = grant_with(now - 1, Some(now - 2), Some("tok"));
        assert!(matches!(
            grant.check_exchangeable(Some("other"), now),
            Err(GrantorError::GrantAlreadyUsed)
        ));

        // Revoked wins over expired and redirect
        let grant = grant_with(now - 1, Some(now - 2), None);
        assert!(matches!(
            grant.check_exchangeable(Some("other"), now),
            Err(GrantorError::GrantRevoked)
        ));

        // Expired wins over redirect
        let grant = grant_with(now, None, None);
        assert!(matches!(
            grant.check_exchangeable(Some("other"), now),
            Err(GrantorError::GrantExpired)
        ));

        let grant = grant_with(now + 60, None, None);
        assert!(matches!(
            grant.check_exchangeable(Some("other"), now),
            Err(GrantorError::RedirectMismatch)
        ));
        assert!(grant.check_exchangeable(Some(REDIRECT), now).is_ok());
        assert!(grant.check_exchangeable(None, now).is_ok());
    }

    #[tokio::test]
    async fn test_create_grant_narrows_scope() {
        let test_db = TestDb::new().await;
        let ctx = test_db.context();
        let client = seed_client(&ctx, "read write").await;

        let grant = create_grant(
            &ctx,
            &client,
            &Identity::from(42i64),
            &ScopeSet::parse("write admin read"),
            Some(REDIRECT),
            None,
        )
        .await
        .expect("Failed to create grant");

        assert_eq!(grant.scope, ScopeSet::from(["write", "read"]));
        assert_eq!(grant.identity, "42");
        assert_eq!(grant.expires_at - grant.created_at, 300);
        assert!(!grant.is_spent());
    }

    #[tokio::test]
    async fn test_create_grant_for_revoked_client() {
        let test_db = TestDb::new().await;
        let ctx = test_db.context();
        let client = seed_client(&ctx, "read").await;
        clients::revoke_client(&ctx, &client.client_id)
            .await
            .expect("Failed to revoke client");

        let err = create_grant(
            &ctx,
            &client,
            &Identity::from("user"),
            &ScopeSet::parse("read"),
            Some(REDIRECT),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GrantorError::ClientRevoked(_)));
    }

    #[tokio::test]
    async fn test_create_grant_rejects_out_of_range_lifetime() {
        let test_db = TestDb::new().await;
        let ctx = test_db.context();
        let client = seed_client(&ctx, "read").await;

        let err = create_grant(
            &ctx,
            &client,
            &Identity::from("user"),
            &ScopeSet::parse("read"),
            Some(REDIRECT),
            Some(i64::MAX),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GrantorError::InvalidArgument(_)));

        let stored = entities::access_grant::Entity::find()
            .all(test_db.connection())
            .await
            .expect("Query failed");
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_exchange_spends_grant() {
        let test_db = TestDb::new().await;
        let ctx = test_db.context();
        let client = seed_client(&ctx, "read").await;

        let grant = create_grant(
            &ctx,
            &client,
            &Identity::from("user"),
            &ScopeSet::parse("read"),
            Some(REDIRECT),
            None,
        )
        .await
        .expect("Failed to create grant");

        let token = exchange(&ctx, &grant.code, Some(REDIRECT))
            .await
            .expect("Exchange failed");
        assert_eq!(token.identity.as_deref(), Some("user"));
        assert_eq!(token.scope, ScopeSet::parse("read"));

        let spent = get_grant(&ctx, &grant.code)
            .await
            .expect("Query failed")
            .expect("Grant not found");
        assert!(spent.granted_at.is_some());
        assert_eq!(spent.access_token.as_deref(), Some(token.token.as_str()));

        let err = exchange(&ctx, &grant.code, Some(REDIRECT)).await.unwrap_err();
        assert!(matches!(err, GrantorError::GrantAlreadyUsed));

        let client = clients::require_client(&ctx, &client.client_id)
            .await
            .expect("Client not found");
        assert_eq!(client.tokens_granted, 1);
    }

    #[tokio::test]
    async fn test_exchange_expired_grant() {
        let test_db = TestDb::new().await;
        let ctx = test_db.context();
        let client = seed_client(&ctx, "read").await;

        let grant = create_grant(
            &ctx,
            &client,
            &Identity::from("user"),
            &ScopeSet::parse("read"),
            Some(REDIRECT),
            None,
        )
        .await
        .expect("Failed to create grant");

        use entities::access_grant::{Column, Entity};
        Entity::update_many()
            .col_expr(Column::ExpiresAt, Expr::value(storage::now() - 600))
            .filter(Column::Code.eq(&grant.code))
            .exec(test_db.connection())
            .await
            .expect("Failed to update expiry");

        let err = exchange(&ctx, &grant.code, None).await.unwrap_err();
        assert!(matches!(err, GrantorError::GrantExpired));

        let client = clients::require_client(&ctx, &client.client_id)
            .await
            .expect("Client not found");
        assert_eq!(client.tokens_granted, 0);
    }

    #[tokio::test]
    async fn test_exchange_revoked_grant() {
        let test_db = TestDb::new().await;
        let ctx = test_db.context();
        let client = seed_client(&ctx, "read").await;

        let grant = create_grant(
            &ctx,
            &client,
            &Identity::from("user"),
            &ScopeSet::parse("read"),
            Some(REDIRECT),
            None,
        )
        .await
        .expect("Failed to create grant");

        let revoked = revoke_grant(&ctx, &grant.code)
            .await
            .expect("Failed to revoke grant");
        assert!(revoked.is_revoked());

        let err = exchange(&ctx, &grant.code, None).await.unwrap_err();
        assert!(matches!(err, GrantorError::GrantRevoked));
    }

    #[tokio::test]
    async fn test_exchange_redirect_mismatch() {
        let test_db = TestDb::new().await;
        let ctx = test_db.context();
        let client = seed_client(&ctx, "read").await;

        let grant = create_grant(
            &ctx,
            &client,
            &Identity::from("user"),
            &ScopeSet::parse("read"),
            Some(REDIRECT),
            None,
        )
        .await
        .expect("Failed to create grant");

        let err = exchange(&ctx, &grant.code, Some("https://evil.example.com/cb"))
            .await
            .unwrap_err();
        assert!(matches!(err, GrantorError::RedirectMismatch));

        // A rejected attempt does not spend the code
        exchange(&ctx, &grant.code, Some(REDIRECT))
            .await
            .expect("Exchange failed");
    }

    #[tokio::test]
    async fn test_exchange_unknown_code() {
        let test_db = TestDb::new().await;
        let ctx = test_db.context();

        let err = exchange(&ctx, "missing", None).await.unwrap_err();
        assert!(matches!(err, GrantorError::NotFound { .. }));
        assert_eq!(err.oauth_error_code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_exchange_uses_current_client_scope() {
        let test_db = TestDb::new().await;
        let ctx = test_db.context();
        let client = seed_client(&ctx, "read write").await;

        let grant = create_grant(
            &ctx,
            &client,
            &Identity::from("user"),
            &ScopeSet::parse("read write"),
            None,
            None,
        )
        .await
        .expect("Failed to create grant");

        clients::update_client(
            &ctx,
            &client.client_id,
            ClientAttributes {
                display_name: "Test Client".to_string(),
                scope: ScopeSet::parse("read"),
                ..Default::default()
            },
        )
        .await
        .expect("Failed to update client");

        let token = exchange(&ctx, &grant.code, None)
            .await
            .expect("Exchange failed");
        assert_eq!(token.scope, ScopeSet::parse("read"));
    }
}
