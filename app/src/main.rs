use clap::{Parser, Subcommand};
use pm_config::Config;
use pm_core::{telemetry, Role};
use pm_db::{CreateUserRequest, Db, UserRepository};
use pm_obs::{Metrics, ObsState};
use pm_web::{auth::PasswordAuth, AppState};
use std::{process, sync::Arc};

#[derive(Parser)]
#[command(name = "planmarket", about = "Marketplace backend for digital plans", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API and observability servers (default)
    Serve,
    /// Create an administrator account; the password is read from the terminal
    CreateAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: Option<String>,
    },
    /// Block a user from logging in
    DeactivateUser {
        #[arg(long)]
        email: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration - exit with non-zero if invalid
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    telemetry::init_tracing(&config.environment, "planmarket");
    tracing::debug!(?config, "Configuration loaded successfully");

    let db = match Db::connect(&config.database.path, config.database.pool_size).await {
        Ok(db) => db,
        Err(e) => {
            tracing::error!("Failed to initialize database: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, db).await,
        Command::CreateAdmin { email, username } => create_admin(&db, &email, username).await,
        Command::DeactivateUser { email } => deactivate_user(&db, &email).await,
    };

    if let Err(e) = result {
        tracing::error!("planmarket exited with error: {}", e);
        process::exit(1);
    }
}

async fn serve(config: Config, db: Db) -> pm_core::Result<()> {
    db.health_check().await?;
    let stats = db.stats().await?;
    tracing::info!(tables = ?stats.table_counts, "Database ready");

    if !config.is_production() && config.security.jwt_secret.starts_with("INSECURE-") {
        tracing::warn!("Using a generated JWT secret; sessions will not survive a restart");
    }

    let metrics = Arc::new(Metrics::new());
    let processor = pm_pay::create_processor((&config.payments).into());
    tracing::info!(processor = processor.name(), "Payment processor ready");

    let obs_state = ObsState::with_metrics(metrics.clone());
    let web_state = AppState::new(db, &config, processor, metrics);

    let obs_bind_addr = format!("0.0.0.0:{}", config.server.obs_port);
    let web_bind_addr = format!("{}:{}", config.server.host, config.server.port);

    tracing::info!(
        web = %web_bind_addr,
        obs = %obs_bind_addr,
        fee_bps = config.marketplace.platform_fee_bps,
        currency = %config.marketplace.default_currency,
        "planmarket starting"
    );

    let readiness = obs_state.readiness.clone();
    let obs_future = pm_obs::start_server(&obs_bind_addr, obs_state);
    let web_future = pm_web::start_server(&web_bind_addr, web_state);
    readiness.set_ready(true);

    // Either server exiting brings the process down
    tokio::select! {
        obs_result = obs_future => {
            tracing::error!("Observability server exited");
            obs_result
        }
        web_result = web_future => {
            tracing::error!("Web server exited");
            web_result
        }
    }
}

async fn create_admin(db: &Db, email: &str, username: Option<String>) -> pm_core::Result<()> {
    let users = UserRepository::new(db.pool());
    if users.find_by_email(email).await?.is_some() {
        return Err(pm_core::Error::Conflict(format!("User {} already exists", email)));
    }
    if !users.has_any_users().await? {
        tracing::info!("Empty database, bootstrapping the first account");
    }

    let password = rpassword::prompt_password("Admin password: ")?;
    if password.len() < 8 {
        return Err(pm_core::Error::Validation(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        return Err(pm_core::Error::Validation("Passwords do not match".to_string()));
    }

    let username = username.unwrap_or_else(|| {
        email
            .split('@')
            .next()
            .unwrap_or(email)
            .to_string()
    });

    let user = users
        .create(CreateUserRequest {
            username,
            email: email.to_string(),
            password_hash: PasswordAuth::hash_password(&password)?,
            role: Role::Admin.to_string(),
        })
        .await?;

    tracing::info!(user_id = %user.id, email = %user.email, "Admin account created");
    println!("Created admin {} ({})", user.email, user.id);
    Ok(())
}

async fn deactivate_user(db: &Db, email: &str) -> pm_core::Result<()> {
    let users = UserRepository::new(db.pool());
    let user = users
        .find_by_email(email)
        .await?
        .ok_or_else(|| pm_core::Error::NotFound(format!("User {} not found", email)))?;

    users.deactivate(&user.id).await?;

    tracing::warn!(user_id = %user.id, email = %user.email, "User deactivated");
    println!("Deactivated {} ({})", user.email, user.id);
    Ok(())
}
