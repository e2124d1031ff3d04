use clap::{Args, Parser, Subcommand};
use grantor::clients::{self, ClientAttributes};
use grantor::tokens::{self, Expiry, TokenFilter};
use grantor::{settings, storage, GrantorError, Identity, OAuthContext, ScopeSet};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "grantor",
    version,
    about = "OAuth2 provider administration"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations
    Migrate,
    /// Manage registered clients
    #[command(subcommand)]
    Client(ClientCommand),
    /// Manage access tokens
    #[command(subcommand)]
    Token(TokenCommand),
    /// Access token counts
    Stats {
        #[arg(long)]
        client: Option<String>,
        /// Only tokens created within this many days
        #[arg(long)]
        days: Option<i64>,
    },
}

#[derive(Subcommand, Debug)]
enum ClientCommand {
    Register(RegisterArgs),
    Show { client_id: String },
    List,
    Revoke { client_id: String },
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    name: String,
    /// Allowed scope, space or comma separated
    #[arg(long, default_value = "")]
    scope: String,
    #[arg(long)]
    redirect_uri: Option<String>,
    #[arg(long)]
    link: Option<String>,
    #[arg(long)]
    image_url: Option<String>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Subcommand, Debug)]
enum TokenCommand {
    Issue(IssueArgs),
    Inspect { token: String },
    Revoke { token: String },
}

#[derive(Args, Debug)]
struct IssueArgs {
    #[arg(long)]
    client: String,
    #[arg(long)]
    identity: String,
    #[arg(long, default_value = "")]
    scope: String,
    /// Lifetime in seconds; defaults to tokens.access_token_ttl
    #[arg(long, conflicts_with = "never_expires")]
    expires_in: Option<i64>,
    #[arg(long)]
    never_expires: bool,
    /// Always mint a new token instead of reusing a live one
    #[arg(long)]
    new: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    // load settings
    let settings = settings::Settings::load(&cli.config)?;
    tracing::debug!(?settings, "Loaded configuration");

    // init storage (database)
    let db = storage::init(&settings.database).await?;
    storage::migrate(&db).await?;

    let ctx = OAuthContext::new(db, settings.tokens.clone());

    match cli.command {
        Command::Migrate => {
            tracing::info!("Schema is up to date");
        }
        Command::Client(cmd) => run_client(&ctx, cmd).await?,
        Command::Token(cmd) => run_token(&ctx, cmd).await?,
        Command::Stats { client, days } => {
            let days = days.unwrap_or(settings.tokens.historical_days);
            let base = TokenFilter {
                days: Some(days),
                client_id: client.clone(),
                revoked: None,
            };
            let revoked = TokenFilter {
                revoked: Some(true),
                ..base.clone()
            };
            print_json(&json!({
                "client_id": client,
                "days": days,
                "granted": tokens::count(&ctx, &base).await?,
                "revoked": tokens::count(&ctx, &revoked).await?,
            }))?;
        }
    }
    Ok(())
}

async fn run_client(ctx: &OAuthContext, cmd: ClientCommand) -> Result<()> {
    match cmd {
        ClientCommand::Register(args) => {
            let client = clients::register(
                ctx,
                ClientAttributes {
                    display_name: args.name,
                    link: args.link,
                    image_url: args.image_url,
                    redirect_uri: args.redirect_uri,
                    scope: ScopeSet::parse(&args.scope),
                    notes: args.notes,
                },
            )
            .await?;
            print_json(&client)
        }
        ClientCommand::Show { client_id } => {
            let client = clients::get_client(ctx, &client_id)
                .await?
                .ok_or_else(|| GrantorError::NotFound {
                    kind: "client",
                    id: client_id,
                })?;
            print_json(&client)
        }
        ClientCommand::List => print_json(&clients::list_clients(ctx).await?),
        ClientCommand::Revoke { client_id } => {
            print_json(&clients::revoke_client(ctx, &client_id).await?)
        }
    }
}

async fn run_token(ctx: &OAuthContext, cmd: TokenCommand) -> Result<()> {
    match cmd {
        TokenCommand::Issue(args) => {
            let client = clients::get_client(ctx, &args.client)
                .await?
                .ok_or_else(|| GrantorError::NotFound {
                    kind: "client",
                    id: args.client.clone(),
                })?;
            let expires = match (args.never_expires, args.expires_in) {
                (true, _) => Expiry::Never,
                (false, Some(secs)) => Expiry::In(secs),
                (false, None) => Expiry::Default,
            };
            let identity = Identity::from(args.identity);
            let scope = ScopeSet::parse(&args.scope);

            let token = if args.new {
                tokens::create_token_for(ctx, &client, &scope, Some(&identity), expires).await?
            } else {
                tokens::get_token_for(ctx, &identity, &client, &scope, expires).await?
            };
            print_json(&token)
        }
        TokenCommand::Inspect { token } => {
            let found = tokens::from_token(ctx, &token)
                .await?
                .ok_or_else(|| GrantorError::NotFound {
                    kind: "access token",
                    id: token,
                })?;
            let valid = found.is_valid();
            print_json(&json!({ "token": found, "valid": valid }))
        }
        TokenCommand::Revoke { token } => print_json(&tokens::revoke_token(ctx, &token).await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}
