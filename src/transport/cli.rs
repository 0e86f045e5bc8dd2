//! CLI transport for direct terminal interaction

use crate::api::ClientError;
use crate::auth::{CredentialStore, FileCredentialStore};
use crate::chat::{ImageInput, ImageSource, NormalizedResponse, ProductResult, QueryRequest};
use crate::client::{ChatHistory, HealthStatus, ShopClient};
use crate::config::Config;
use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

/// Product query options shared by `ask`, `image` and `similar`
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub category: Option<String>,
    pub limit: Option<u32>,
    pub format: String,
}

fn client(config: &Config) -> Result<ShopClient> {
    ShopClient::from_config(config).context("Failed to initialize the shop client")
}

/// Read one line from stdin after printing `label`
fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn value_or_prompt(value: Option<String>, label: &str) -> Result<String> {
    match value {
        Some(value) => Ok(value),
        None => prompt(label),
    }
}

/// Accept a file path, a data URI or bare base64
pub fn image_from_arg(arg: &str) -> Result<ImageInput> {
    let path = Path::new(arg);
    if path.is_file() {
        return ImageInput::from_path(path).map_err(Into::into);
    }
    Ok(ImageInput::from_text(arg))
}

pub async fn run_login(
    config: &Config,
    username: Option<String>,
    password: Option<String>,
) -> Result<()> {
    let client = client(config)?;
    let username = value_or_prompt(username.or_else(|| config.auth.username.clone()), "Username: ")?;
    let password = value_or_prompt(password, "Password: ")?;

    let credentials = client.login(&username, &password).await?;

    println!(
        "{} Logged in as {}",
        "✓".green(),
        credentials.username.as_deref().unwrap_or(&username).bold()
    );
    if let Some(user_id) = &credentials.user_id {
        println!("User id: {}", user_id);
    }
    println!("Token preview: {}", credentials.token_preview().dimmed());
    Ok(())
}

pub async fn run_signup(
    config: &Config,
    username: &str,
    email: &str,
    password: Option<String>,
) -> Result<()> {
    let client = client(config)?;
    let password = value_or_prompt(password, "Password: ")?;

    let receipt = client.signup(username, email, &password).await?;

    println!(
        "{} {}",
        "✓".green(),
        if receipt.message.is_empty() {
            "Account created"
        } else {
            receipt.message.as_str()
        }
    );
    if let Some(user_id) = &receipt.user_id {
        println!("User id: {}", user_id);
    }
    println!();
    println!("{}", "Tip:".bold());
    println!("  • Log in: shopchat login --username {}", username);
    Ok(())
}

/// Local wipe of the stored credentials; needs no backend
pub fn run_logout(config: &Config) -> Result<()> {
    let store = FileCredentialStore::for_config(&config.auth)?;
    tracing::debug!("Clearing credential store at {:?}", store.path());
    store.clear();
    println!("{} Logged out, stored credentials removed", "✓".green());
    Ok(())
}

/// Build a request from the command line and print the normalized answer
pub async fn run_query(config: &Config, request: QueryRequest, options: &QueryOptions) -> Result<()> {
    let client = client(config)?;

    let mut request = request;
    if let Some(category) = &options.category {
        request = request.with_category(category.clone());
    }
    request = request.with_limit(options.limit.unwrap_or(client.default_limit()))?;

    let response = client.dispatch(request).await?;

    match options.format.as_str() {
        "json" => {
            let output = serde_json::json!({
                "session_id": client.session().session_id(),
                "response": response,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => print_response(&response),
    }

    if let Some(session_id) = client.session().session_id() {
        tracing::debug!("Chat session {}", session_id);
    }
    Ok(())
}

pub async fn run_history(config: &Config, session_id: Option<String>, format: &str) -> Result<()> {
    let client = client(config)?;

    let history = match session_id {
        Some(session_id) => client.history_of(&session_id).await?,
        None => {
            // A fresh process has no session yet; open one so the call is well-defined
            client.session().ensure_authenticated().await?;
            client.session().ensure_session().await?;
            client.history().await?
        }
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&history)?),
        _ => print_history(&history),
    }
    Ok(())
}

pub async fn run_health(config: &Config, format: &str) -> Result<()> {
    let client = client(config)?;
    let health: HealthStatus = client.health().await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&health)?),
        _ => {
            let status = if health.is_healthy() {
                health.status.green()
            } else {
                health.status.yellow()
            };
            println!("{} {}", "Backend status:".bold(), status);
            if let Some(timestamp) = &health.timestamp {
                println!("Checked at: {}", timestamp);
            }
        }
    }
    Ok(())
}

/// User-facing hint for errors that need a follow-up action
pub fn error_hint(error: &anyhow::Error) -> Option<&'static str> {
    match error.downcast_ref::<ClientError>()? {
        ClientError::AuthExpired => Some("Your login expired. Run `shopchat login` again."),
        ClientError::Authentication(_) => Some("Check your username and password."),
        ClientError::Configuration(_) => {
            Some("Set [api] base_url in the config file or pass --api-base.")
        }
        ClientError::Network(_) | ClientError::SessionCreation(_) => {
            Some("The service may be busy; try again in a moment.")
        }
        ClientError::Query(_) => None,
    }
}

#[derive(Tabled)]
struct ProductRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Score")]
    score: String,
    #[tabled(rename = "Image")]
    image: String,
}

impl ProductRow {
    fn new(index: usize, product: &ProductResult) -> Self {
        Self {
            index,
            name: product.display_name().to_string(),
            price: product.price.clone().unwrap_or_else(|| "-".to_string()),
            category: product.category.clone().unwrap_or_else(|| "-".to_string()),
            score: product
                .score
                .map(|s| format!("{:.2}", s))
                .unwrap_or_else(|| "-".to_string()),
            image: describe_image(&product.image_source),
        }
    }
}

fn describe_image(source: &ImageSource) -> String {
    match source {
        ImageSource::Url(url) => url.clone(),
        ImageSource::DataUri(uri) => format!("inline ({} bytes)", uri.len()),
        ImageSource::Placeholder => "(none)".to_string(),
    }
}

fn print_products(products: &[ProductResult]) {
    if products.is_empty() {
        println!("{}", "No matching products.".yellow());
        return;
    }

    let rows: Vec<ProductRow> = products
        .iter()
        .enumerate()
        .map(|(i, p)| ProductRow::new(i + 1, p))
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
}

fn print_response(response: &NormalizedResponse) {
    if !response.assistant_text.is_empty() {
        println!("\n{}", response.assistant_text);
    }
    println!();
    println!("{}", "=== PRODUCTS ===".bold().cyan());
    println!();
    print_products(&response.products);
    println!();
}

fn print_history(history: &ChatHistory) {
    println!(
        "\n{} {}",
        "=== CHAT HISTORY ===".bold().cyan(),
        history.session_id.dimmed()
    );
    println!();

    if history.messages.is_empty() {
        println!("{}", "No messages yet.".yellow());
        return;
    }

    for message in &history.messages {
        let role = match message.role.as_str() {
            "user" => message.role.green().bold(),
            _ => message.role.blue().bold(),
        };
        match &message.timestamp {
            Some(ts) => println!("{} {}", role, ts.dimmed()),
            None => println!("{}", role),
        }
        println!("{}", message.content);
        if !message.products.is_empty() {
            print_products(&message.products);
        }
        println!();
    }
}
