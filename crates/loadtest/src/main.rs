use goose::prelude::*;
use std::env;

const DEFAULT_CLIENT_ID: &str = "https://client.example.org/";

fn client_id() -> String {
    env::var("CLIENT_ID").unwrap_or_else(|_| DEFAULT_CLIENT_ID.to_string())
}

async fn health_check(user: &mut GooseUser) -> TransactionResult {
    let _goose_metrics = user.get("/healthz").await?;
    Ok(())
}

async fn get_discovery(user: &mut GooseUser) -> TransactionResult {
    let _goose_metrics = user.get("/.well-known/openid-configuration").await?;
    Ok(())
}

async fn get_jwks(user: &mut GooseUser) -> TransactionResult {
    let _goose_metrics = user.get("/jwks").await?;
    Ok(())
}

/// Each call stores an authorization request, so this also exercises database writes.
async fn start_authorization(user: &mut GooseUser) -> TransactionResult {
    let client_id = client_id();
    let redirect_uri = format!("{client_id}callback");
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs([
            ("client_id", client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", "openid email"),
            ("state", "loadtest"),
        ])
        .finish();
    let path = format!("/auth?{query}");
    let _goose_metrics = user.get(&path).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), GooseError> {
    println!("Client id for authorization requests: {}", client_id());

    GooseAttack::initialize()?
        .register_scenario(
            scenario!("HealthCheck").register_transaction(transaction!(health_check)),
        )
        .register_scenario(
            scenario!("Discovery")
                .register_transaction(transaction!(get_discovery))
                .register_transaction(transaction!(get_jwks)),
        )
        .register_scenario(
            scenario!("Authorization").register_transaction(transaction!(start_authorization)),
        )
        .execute()
        .await?;

    Ok(())
}
