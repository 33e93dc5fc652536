pub use sea_orm_migration::prelude::*;

mod m20261019_090000_add_identity_tables;
mod m20261019_091500_add_authorization_flow_tables;
mod m20261019_094500_add_email_request_attempts;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261019_090000_add_identity_tables::Migration),
            Box::new(m20261019_091500_add_authorization_flow_tables::Migration),
            Box::new(m20261019_094500_add_email_request_attempts::Migration),
        ]
    }
}
