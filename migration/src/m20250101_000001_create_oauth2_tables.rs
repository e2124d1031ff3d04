use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Registered clients
        manager
            .create_table(
                Table::create()
                    .table(Client::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Client::ClientId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Client::Secret))
                    .col(string(Client::DisplayName))
                    .col(string_null(Client::Link))
                    .col(string_null(Client::ImageUrl))
                    .col(string_null(Client::RedirectUri))
                    .col(string(Client::Scope))
                    .col(string_null(Client::Notes))
                    .col(big_integer_null(Client::Revoked))
                    .col(
                        ColumnDef::new(Client::TokensGranted)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Client::TokensRevoked)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(big_integer(Client::CreatedAt))
                    .col(big_integer(Client::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_client_credentials")
                    .table(Client::Table)
                    .col(Client::ClientId)
                    .col(Client::Secret)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Authorization requests
        manager
            .create_table(
                Table::create()
                    .table(AuthRequest::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthRequest::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(AuthRequest::ClientId))
                    .col(string(AuthRequest::Scope))
                    .col(string(AuthRequest::RedirectUri))
                    .col(string_null(AuthRequest::State))
                    .col(string(AuthRequest::ResponseType))
                    .col(string_null(AuthRequest::GrantCode))
                    .col(string_null(AuthRequest::AccessToken))
                    .col(big_integer_null(AuthRequest::AuthorizedAt))
                    .col(big_integer_null(AuthRequest::Revoked))
                    .col(big_integer(AuthRequest::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Authorization codes
        manager
            .create_table(
                Table::create()
                    .table(AccessGrant::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AccessGrant::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(AccessGrant::ClientId))
                    .col(string(AccessGrant::Identity))
                    .col(string(AccessGrant::Scope))
                    .col(string_null(AccessGrant::RedirectUri))
                    .col(big_integer(AccessGrant::ExpiresAt))
                    .col(big_integer_null(AccessGrant::GrantedAt))
                    .col(big_integer_null(AccessGrant::Revoked))
                    .col(string_null(AccessGrant::AccessToken))
                    .col(big_integer(AccessGrant::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Access tokens
        manager
            .create_table(
                Table::create()
                    .table(AccessToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AccessToken::Token)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(AccessToken::ClientId))
                    .col(string_null(AccessToken::Identity))
                    .col(string(AccessToken::Scope))
                    .col(big_integer_null(AccessToken::ExpiresAt))
                    .col(big_integer_null(AccessToken::Revoked))
                    .col(big_integer_null(AccessToken::LastAccess))
                    .col(big_integer_null(AccessToken::PrevAccess))
                    .col(big_integer(AccessToken::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // Reuse lookup in get_token_for
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_access_token_lookup")
                    .table(AccessToken::Table)
                    .col(AccessToken::ClientId)
                    .col(AccessToken::Identity)
                    .col(AccessToken::Scope)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_access_token_created")
                    .table(AccessToken::Table)
                    .col(AccessToken::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AccessToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AccessGrant::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuthRequest::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Client::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Client {
    #[sea_orm(iden = "oauth2_provider_client")]
    Table,
    ClientId,
    Secret,
    DisplayName,
    Link,
    ImageUrl,
    RedirectUri,
    Scope,
    Notes,
    Revoked,
    TokensGranted,
    TokensRevoked,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum AuthRequest {
    #[sea_orm(iden = "oauth2_provider_auth_request")]
    Table,
    Id,
    ClientId,
    Scope,
    RedirectUri,
    State,
    ResponseType,
    GrantCode,
    AccessToken,
    AuthorizedAt,
    Revoked,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AccessGrant {
    #[sea_orm(iden = "oauth2_provider_access_grant")]
    Table,
    Code,
    ClientId,
    Identity,
    Scope,
    RedirectUri,
    ExpiresAt,
    GrantedAt,
    Revoked,
    AccessToken,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AccessToken {
    #[sea_orm(iden = "oauth2_provider_access_token")]
    Table,
    Token,
    ClientId,
    Identity,
    Scope,
    ExpiresAt,
    Revoked,
    LastAccess,
    PrevAccess,
    CreatedAt,
}
