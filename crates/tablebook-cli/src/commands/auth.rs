//! Google account connection for calendar sync.

use clap::Subcommand;
use tablebook_core::integrations::oauth::{self, OAuthConfig};
use tablebook_core::integrations::GoogleOAuth;
use tablebook_core::sync;
use tablebook_core::Config;

use super::{block_on, open, print_json, CliResult};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Google: login / logout / status
    Google {
        #[command(subcommand)]
        action: AuthOp,
    },
}

#[derive(Subcommand)]
pub enum AuthOp {
    /// Run the consent flow in the browser and store the refresh token
    Login {
        /// Client ID (saved to config.toml)
        #[arg(long)]
        client_id: Option<String>,
        /// Client secret (saved to config.toml)
        #[arg(long)]
        client_secret: Option<String>,
    },
    /// Revoke the token and disconnect
    Logout,
    /// Check connection status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

pub fn run(action: AuthAction) -> CliResult {
    match action {
        AuthAction::Google { action } => handle_google(action),
    }
}

fn handle_google(op: AuthOp) -> CliResult {
    match op {
        AuthOp::Login {
            client_id,
            client_secret,
        } => {
            let mut config = Config::load()?;
            if let Some(id) = client_id {
                config.set("google.client_id", &id)?;
            }
            if let Some(secret) = client_secret {
                config.set("google.client_secret", &secret)?;
            }
            if !config.google.has_client_credentials() {
                return Err("--client-id and --client-secret required for Google".into());
            }

            let (_, db) = open()?;
            let oauth_config = OAuthConfig::from_google(&config.google);
            let email = block_on(async {
                let tokens = oauth::authorize(&oauth_config).await?;
                let email = match oauth::fetch_account_email(&oauth_config, &tokens.access_token).await {
                    Ok(email) => email,
                    Err(e) => {
                        tracing::warn!(error = %e, "could not read account email");
                        None
                    }
                };
                sync::connect(db.as_ref(), &tokens, email.clone())?;
                Ok::<_, tablebook_core::CoreError>(email)
            })??;
            match email {
                Some(email) => println!("Google connected as {email}"),
                None => println!("Google connected"),
            }
        }
        AuthOp::Logout => {
            let (config, db) = open()?;
            let oauth = GoogleOAuth::from_google(&config.google);
            block_on(sync::disconnect(db.as_ref(), &oauth))??;
            println!("Google disconnected");
        }
        AuthOp::Status { json } => {
            let (_, db) = open()?;
            let status = sync::connection_status(db.as_ref())?;
            if json {
                print_json(&status)?;
            } else if status.connected {
                println!(
                    "connected{}",
                    status.email.map(|e| format!(" as {e}")).unwrap_or_default()
                );
            } else if status.reconnection_needed {
                println!(
                    "reconnection needed: {}",
                    status.sync_error.unwrap_or_default()
                );
            } else {
                println!("not connected");
            }
        }
    }
    Ok(())
}
