use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use shopchat_cli::chat::QueryRequest;
use shopchat_cli::transport::cli::{self as commands, QueryOptions};
use shopchat_cli::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "shopchat")]
#[command(author, version, about = "shopchat - conversational product search", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Backend base URL (overrides config and SHOPCHAT_API_BASE)
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, global = true, default_value = "table")]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the access token
    Login {
        #[arg(short, long)]
        username: Option<String>,

        /// Prompted for when omitted
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Create a new account
    Signup {
        #[arg(short, long)]
        username: String,

        #[arg(short, long)]
        email: String,

        /// Prompted for when omitted
        #[arg(short, long)]
        password: Option<String>,
    },

    /// Forget the stored login
    Logout,

    /// Ask for products in plain text
    Ask {
        /// What you are looking for
        query: String,

        #[arg(short, long)]
        category: Option<String>,

        /// Maximum number of products
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Search with a picture (file path, data URI or base64)
    Image {
        image: String,

        /// Optional text to refine the picture search
        #[arg(short, long)]
        query: Option<String>,

        #[arg(short, long)]
        category: Option<String>,
    },

    /// Find products similar to a description
    Similar {
        description: String,

        /// Optional reference picture (file path, data URI or base64)
        #[arg(short, long)]
        image: Option<String>,

        #[arg(short, long)]
        category: Option<String>,

        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Show the conversation of a chat session
    History {
        /// Session id (default: a new session for the current login)
        #[arg(short, long)]
        session: Option<String>,
    },

    /// Check that the backend is up
    Health,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "shopchat_cli=debug,shopchat=debug"
    } else {
        "shopchat_cli=info,shopchat=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if let Some(hint) = commands::error_hint(&e) {
            eprintln!("{}", hint.dimmed());
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load()?;
    if let Some(api_base) = cli.api_base {
        config.api.base_url = api_base;
    }

    let options = |category: Option<String>, limit: Option<u32>| QueryOptions {
        category,
        limit,
        format: cli.format.clone(),
    };

    match cli.command {
        Commands::Login { username, password } => {
            commands::run_login(&config, username, password).await?;
        }
        Commands::Signup {
            username,
            email,
            password,
        } => {
            commands::run_signup(&config, &username, &email, password).await?;
        }
        Commands::Logout => {
            commands::run_logout(&config)?;
        }
        Commands::Ask {
            query,
            category,
            limit,
        } => {
            let request = QueryRequest::text(query);
            commands::run_query(&config, request, &options(category, limit)).await?;
        }
        Commands::Image {
            image,
            query,
            category,
        } => {
            let image = commands::image_from_arg(&image)?;
            let request = match query {
                Some(query) => QueryRequest::text_image(query, image),
                None => QueryRequest::image(image),
            };
            commands::run_query(&config, request, &options(category, None)).await?;
        }
        Commands::Similar {
            description,
            image,
            category,
            limit,
        } => {
            let mut request = QueryRequest::similarity(description);
            if let Some(image) = image {
                request = request.with_image(commands::image_from_arg(&image)?);
            }
            commands::run_query(&config, request, &options(category, limit)).await?;
        }
        Commands::History { session } => {
            commands::run_history(&config, session, &cli.format).await?;
        }
        Commands::Health => {
            commands::run_health(&config, &cli.format).await?;
        }
    }

    Ok(())
}
