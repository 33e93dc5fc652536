//! Creates the long-lived identity tables:
//! - identity: verified end-user accounts
//! - login_session: live browser sessions, keyed by hashed login key
//! - login_mapping: which identities a session has authenticated
//! - signing_key: RSA keys used for ID token signatures

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Identity::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Identity::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(string(Identity::Email))
                    .col(string(Identity::Provider))
                    .col(string(Identity::ProviderId))
                    .col(timestamp_with_time_zone(Identity::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_identity_provider_subject")
                    .table(Identity::Table)
                    .col(Identity::Provider)
                    .col(Identity::ProviderId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LoginSession::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LoginSession::LoginKeyHash)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(timestamp_with_time_zone(LoginSession::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LoginMapping::Table)
                    .if_not_exists()
                    .col(pk_auto(LoginMapping::Id))
                    .col(string(LoginMapping::LoginKeyHash))
                    .col(string(LoginMapping::IdentityId))
                    .col(timestamp_with_time_zone(LoginMapping::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_login_mapping_pair")
                    .table(LoginMapping::Table)
                    .col(LoginMapping::LoginKeyHash)
                    .col(LoginMapping::IdentityId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SigningKey::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SigningKey::Kid)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(integer(SigningKey::Position))
                    .col(text(SigningKey::PrivateKeyPem))
                    .col(timestamp_with_time_zone(SigningKey::CreatedAt))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SigningKey::Table).to_owned())
            .await?;
        manager
            .drop_index(Index::drop().name("idx_login_mapping_pair").to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LoginMapping::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LoginSession::Table).to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_identity_provider_subject")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Identity::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Identity {
    Table,
    Id,
    Email,
    Provider,
    ProviderId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum LoginSession {
    Table,
    LoginKeyHash,
    CreatedAt,
}

#[derive(DeriveIden)]
enum LoginMapping {
    Table,
    Id,
    LoginKeyHash,
    IdentityId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum SigningKey {
    Table,
    Kid,
    Position,
    PrivateKeyPem,
    CreatedAt,
}
