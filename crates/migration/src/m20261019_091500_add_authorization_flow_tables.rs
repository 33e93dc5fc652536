//! Creates the short-lived tables used while an authorization flow is in progress,
//! plus the append-only email verification attempt log.

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. Authorization requests, one per /auth call
        manager
            .create_table(
                Table::create()
                    .table(AuthorizationRequest::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthorizationRequest::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string_null(AuthorizationRequest::LoginKeyHash))
                    .col(text(AuthorizationRequest::RawQuery))
                    .col(string(AuthorizationRequest::ClientId))
                    .col(string(AuthorizationRequest::RedirectUri))
                    .col(string_null(AuthorizationRequest::State))
                    .col(string_null(AuthorizationRequest::Scope))
                    .col(string_null(AuthorizationRequest::Nonce))
                    .col(timestamp_with_time_zone(AuthorizationRequest::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // 2. Approved but not yet redeemed codes
        manager
            .create_table(
                Table::create()
                    .table(PendingCode::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PendingCode::Code)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(text(PendingCode::Claims))
                    .col(timestamp_with_time_zone(PendingCode::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // 3. Issued access tokens
        manager
            .create_table(
                Table::create()
                    .table(AccessToken::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AccessToken::TokenHash)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(AccessToken::IdentityId))
                    .col(timestamp_with_time_zone(AccessToken::IssuedAt))
                    .col(big_integer(AccessToken::LifetimeSecs))
                    .col(string(AccessToken::AuthorizationCode))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_access_token_authorization_code")
                    .table(AccessToken::Table)
                    .col(AccessToken::AuthorizationCode)
                    .to_owned(),
            )
            .await?;

        // 4. Outstanding email codes
        manager
            .create_table(
                Table::create()
                    .table(EmailValidationRequest::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(EmailValidationRequest::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(EmailValidationRequest::Email))
                    .col(string(EmailValidationRequest::CodeHash))
                    .col(timestamp_with_time_zone(EmailValidationRequest::CreatedAt))
                    .to_owned(),
            )
            .await?;

        // 5. Admission log for email verification
        manager
            .create_table(
                Table::create()
                    .table(EmailValidationAttempt::Table)
                    .if_not_exists()
                    .col(pk_auto(EmailValidationAttempt::Id))
                    .col(string(EmailValidationAttempt::HashedRequesterId))
                    .col(string(EmailValidationAttempt::HashedEmail))
                    .col(
                        timestamp_with_time_zone(EmailValidationAttempt::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_email_validation_attempt_created_at")
                    .table(EmailValidationAttempt::Table)
                    .col(EmailValidationAttempt::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_email_validation_attempt_created_at")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(EmailValidationAttempt::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EmailValidationRequest::Table).to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_access_token_authorization_code")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(AccessToken::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PendingCode::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuthorizationRequest::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum AuthorizationRequest {
    Table,
    Id,
    LoginKeyHash,
    RawQuery,
    ClientId,
    RedirectUri,
    State,
    Scope,
    Nonce,
    CreatedAt,
}

#[derive(DeriveIden)]
enum PendingCode {
    Table,
    Code,
    Claims,
    CreatedAt,
}

#[derive(DeriveIden)]
enum AccessToken {
    Table,
    TokenHash,
    IdentityId,
    IssuedAt,
    LifetimeSecs,
    AuthorizationCode,
}

#[derive(DeriveIden)]
enum EmailValidationRequest {
    Table,
    Id,
    Email,
    CodeHash,
    CreatedAt,
}

#[derive(DeriveIden)]
enum EmailValidationAttempt {
    Table,
    Id,
    HashedRequesterId,
    HashedEmail,
    CreatedAt,
}
