use std::sync::Arc;

use anyhow::bail;
use clap::{Args, Subcommand};
use owo_colors::OwoColorize;

use crate::auth::credential_store::CredentialStore;
use crate::auth::models::Role;
use crate::auth::principal::CreatePrincipalRequest;
use crate::config::DatabaseConfig;
use crate::storage::{create_pool, Repositories};

#[derive(Subcommand, Debug)]
pub enum PrincipalCommands {
    /// Create an administrator account
    CreateAdmin(CreateAdminArgs),
}

#[derive(Args, Debug)]
pub struct CreateAdminArgs {
    /// Login name (3-50 characters: letters, digits, '.', '_' or '-')
    #[arg(long)]
    pub username: String,

    /// Display name
    #[arg(long)]
    pub full_name: String,

    /// Initial password. Without it the account waits for its first credential.
    #[arg(long)]
    pub password: Option<String>,

    /// Contact address for password resets
    #[arg(long)]
    pub email: Option<String>,
}

impl CreateAdminArgs {
    fn into_request(self) -> CreatePrincipalRequest {
        CreatePrincipalRequest {
            username: self.username,
            full_name: self.full_name,
            password: self.password,
            role: Role::Admin,
            require_password_change: false,
            disable_password_change: false,
            show_in_selection: true,
            accessible_users: Vec::new(),
            available_organizations: Vec::new(),
            emails: self.email.into_iter().collect(),
            phones: Vec::new(),
            avatar_url: None,
            position: None,
            department: None,
            comment: None,
            timezone: None,
        }
    }
}

pub async fn handle_principal_command(
    command: PrincipalCommands,
    database: &DatabaseConfig,
) -> anyhow::Result<()> {
    let pool = create_pool(database).await?;
    let repositories = Repositories::postgres(pool);

    match command {
        PrincipalCommands::CreateAdmin(args) => create_admin(&repositories, args).await,
    }
}

async fn create_admin(repositories: &Repositories, args: CreateAdminArgs) -> anyhow::Result<()> {
    if repositories.principals.get_by_username(&args.username).await?.is_some() {
        bail!("A principal named '{}' already exists", args.username);
    }

    let store = CredentialStore::new(
        Arc::clone(&repositories.principals),
        Arc::clone(&repositories.audit),
    );
    let principal = store.create(args.into_request(), None).await?;

    println!("{}", "Administrator created".green());
    println!("  ID: {}", principal.id);
    println!("  Username: {}", principal.username);
    if principal.awaiting_first_credential() {
        println!(
            "  {}",
            "No password set: the account is provisioned but not activated".bright_yellow()
        );
    }

    Ok(())
}
