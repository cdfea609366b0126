//! pharmadmin - terminal front end for the pharmacy admin platform.
//!
//! Each subcommand maps one admin screen onto the core library: it checks
//! the logged-in role, calls the typed API client and prints the result.

use std::io;
use std::path::Path;

use anyhow::{bail, Context, Result};
use futures::future::try_join;
use pharmadmin_core::models::{Drug, GeoPoint, InventoryDraft, NewDrug, PharmacyDrug};
use pharmadmin_core::utils::object_from_pairs;
use pharmadmin_core::{ApiClient, ApiError, Config, Feature, Role, Session};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: pharmadmin <command> [args]

Commands:
  login [email]                 Log in (password is prompted)
  signup <name> <email> <role>  Create an account (role: pharmacist, doctor_admin, super_admin)
  logout                        End the session and remove cached credentials
  whoami                        Show the logged-in user
  dashboard                     Summary for the logged-in role
  drugs                         List the drug catalog
  drug-add key=value...         Add a catalog drug (name is required)
  drug-update <id> key=value... Edit a catalog drug
  drug-delete <id>              Delete a catalog drug
  inventory [search]            List pharmacy stock
  inventory-add key=value...    Add a stock row (drug_id is required)
  inventory-update <id> key=value...
                                Edit a stock row
  inventory-delete <id>         Delete a stock row
  upload-bill <file> [options]  Upload a bill image and review the matched drugs
      --save                    Save every matched drug to stock
      --save-id <id>            Save one matched drug
      --delete-id <id>          Delete one matched drug
  chat <message> [--at lat,lng] Ask the assistant
";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprint!("{}", USAGE);
        return Ok(());
    };
    // Usage needs neither config nor a cache directory
    if wants_help(command) {
        print!("{}", USAGE);
        return Ok(());
    }
    let rest: Vec<&str> = args[1..].iter().map(String::as_str).collect();

    let mut config = Config::load()?;
    let client = ApiClient::new(&config)?;
    info!(command = %command, base_url = %config.base_url(), "pharmadmin starting");

    let result = match command.as_str() {
        "login" => login(&client, &mut config, &rest).await,
        "signup" => signup(&client, &rest).await,
        "logout" => {
            client.logout();
            println!("Logged out.");
            Ok(())
        }
        "whoami" => whoami(&client),
        "dashboard" => dashboard(&client).await,
        "drugs" => list_drugs(&client).await,
        "drug-add" => add_drug(&client, &rest).await,
        "drug-update" => update_drug(&client, &rest).await,
        "drug-delete" => delete_drug(&client, &rest).await,
        "inventory" => list_inventory(&client, &rest).await,
        "inventory-add" => add_inventory(&client, &rest).await,
        "inventory-update" => update_inventory(&client, &rest).await,
        "inventory-delete" => delete_inventory(&client, &rest).await,
        "upload-bill" => upload_bill(&client, &rest).await,
        "chat" => chat(&client, &rest).await,
        other => bail!("unknown command '{}'\n\n{}", other, USAGE),
    };

    if let Err(e) = result {
        report(&e);
        std::process::exit(1);
    }
    Ok(())
}

fn wants_help(command: &str) -> bool {
    matches!(command, "help" | "--help" | "-h")
}

/// Print an error the way the admin screens phrase it.
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<ApiError>() {
        Some(api) if api.is_session_expired() => {
            eprintln!("Session expired. Please log in again.");
        }
        Some(ApiError::Validation(fields)) => {
            eprintln!("The server rejected the submission:");
            for (field, messages) in fields.fields() {
                for message in messages {
                    eprintln!("  {}: {}", field, message);
                }
            }
        }
        _ => eprintln!("Error: {:#}", err),
    }
}

fn require(client: &ApiClient, feature: Feature) -> Result<Session> {
    let Some(session) = client.session_store().session() else {
        bail!("Not logged in. Run `pharmadmin login` first.");
    };
    if !session.can(feature) {
        bail!(
            "{:?} is not available to the {} role (dashboard: {})",
            feature,
            session.role,
            session.role.dashboard_path()
        );
    }
    Ok(session)
}

/// Overlay `key=value` arguments on `base`. Numbers typed for a text field
/// stay text, so `strength=500` edits a string.
fn with_fields<T: Serialize + DeserializeOwned>(base: &T, args: &[&str]) -> Result<T> {
    let fields = object_from_pairs(args.iter().copied()).map_err(anyhow::Error::msg)?;
    let Value::Object(mut merged) = serde_json::to_value(base)? else {
        bail!("record is not an object");
    };
    for (key, value) in fields {
        let value = match (merged.get(&key), value) {
            (Some(Value::String(_)), Value::Number(n)) => Value::String(n.to_string()),
            (_, value) => value,
        };
        merged.insert(key, value);
    }
    serde_json::from_value(Value::Object(merged)).context("Unrecognised or mistyped field")
}

fn parse_id(args: &[&str], usage: &str) -> Result<i64> {
    let Some(id) = args.first() else {
        bail!("usage: {}", usage);
    };
    id.parse().with_context(|| format!("id must be a number, got '{}'", id))
}

async fn login(client: &ApiClient, config: &mut Config, args: &[&str]) -> Result<()> {
    let email = match args.first() {
        Some(email) => email.to_string(),
        None => config
            .last_email
            .clone()
            .context("No email given and none remembered; use `pharmadmin login <email>`")?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", email))?;

    let session = client.login(&email, &password).await?;
    config.last_email = Some(email);
    config.save()?;

    println!(
        "Logged in as {} ({}). Dashboard: {}",
        session.display_name,
        session.role,
        session.role.dashboard_path()
    );
    Ok(())
}

async fn signup(client: &ApiClient, args: &[&str]) -> Result<()> {
    let [name, email, role] = args else {
        bail!("usage: pharmadmin signup <name> <email> <role>");
    };
    let role: Role = role.parse().map_err(anyhow::Error::msg)?;
    let password = rpassword::prompt_password("Choose a password: ")?;
    let confirm = rpassword::prompt_password("Repeat password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }

    let session = client.signup(name, email, role, &password).await?;
    println!("Account created for {} ({}).", session.email, session.role);
    Ok(())
}

fn whoami(client: &ApiClient) -> Result<()> {
    match client.session_store().session() {
        Some(session) => {
            println!("{} <{}>", session.display_name, session.email);
            println!("Role:      {}", session.role);
            println!("Dashboard: {}", session.role.dashboard_path());
        }
        None => println!("Not logged in."),
    }
    Ok(())
}

async fn dashboard(client: &ApiClient) -> Result<()> {
    let session = require(client, Feature::Dashboard)?;
    println!("Welcome, {}.", session.display_name);

    if session.can(Feature::Inventory) {
        // Both calls may hit an expired token at once; they share one renewal
        let (catalog, stock) = try_join(client.fetch_drugs(), client.fetch_inventory(None)).await?;
        let unpriced = stock.iter().filter(|d| d.sell_rate.is_none()).count();
        println!("Catalog entries:   {}", catalog.len());
        println!("Stock rows:        {}", stock.len());
        println!("Rows without rate: {}", unpriced);
    }
    if session.can(Feature::Chat) {
        println!("Assistant available: pharmadmin chat <message>");
    }
    Ok(())
}

async fn list_drugs(client: &ApiClient) -> Result<()> {
    require(client, Feature::DrugCatalog)?;
    let drugs = client.fetch_drugs().await?;
    for drug in &drugs {
        println!(
            "{:>6}  {:<40} {:>10}  {}",
            drug.id,
            drug.display_label(),
            drug.unit_price.as_deref().unwrap_or("-"),
            if drug.in_stock { "in stock" } else { "out of stock" }
        );
    }
    println!("{} drugs", drugs.len());
    Ok(())
}

async fn add_drug(client: &ApiClient, args: &[&str]) -> Result<()> {
    require(client, Feature::DrugCatalog)?;
    let form: NewDrug = with_fields(&NewDrug::default(), args)?;
    let drug = client.create_drug(&form).await?;
    println!("Added {} (id {}).", drug.display_label(), drug.id);
    Ok(())
}

async fn update_drug(client: &ApiClient, args: &[&str]) -> Result<()> {
    require(client, Feature::DrugCatalog)?;
    let id = parse_id(args, "pharmadmin drug-update <id> key=value...")?;
    let drugs = client.fetch_drugs().await?;
    let current = drugs
        .iter()
        .find(|d| d.id == id)
        .with_context(|| format!("No catalog drug with id {}", id))?;
    let edited: Drug = with_fields(current, &args[1..])?;
    let saved = client.update_drug(&edited).await?;
    println!("Updated {}.", saved.display_label());
    Ok(())
}

async fn delete_drug(client: &ApiClient, args: &[&str]) -> Result<()> {
    require(client, Feature::DrugCatalog)?;
    let id = parse_id(args, "pharmadmin drug-delete <id>")?;
    client.delete_drug(id).await?;
    println!("Drug deleted.");
    Ok(())
}

async fn list_inventory(client: &ApiClient, args: &[&str]) -> Result<()> {
    require(client, Feature::Inventory)?;
    let search = args.join(" ");
    let rows = client.fetch_inventory(Some(&search)).await?;
    for row in &rows {
        println!(
            "{:>6}  {:<30} {:<15} {:>8} {:>8} {:>5}%",
            row.resource_id(),
            row.display_name(),
            row.brand.as_deref().unwrap_or("-"),
            row.actual_rate.as_deref().unwrap_or("-"),
            row.sell_rate.as_deref().unwrap_or("-"),
            row.discount_percentage.as_deref().unwrap_or("0"),
        );
    }
    println!("{} rows", rows.len());
    Ok(())
}

async fn add_inventory(client: &ApiClient, args: &[&str]) -> Result<()> {
    require(client, Feature::Inventory)?;
    let fields = object_from_pairs(args.iter().copied()).map_err(anyhow::Error::msg)?;
    let draft: InventoryDraft = serde_json::from_value(serde_json::Value::Object(fields))
        .context("Unrecognised inventory field")?;
    let row = client.add_inventory(&draft).await?;
    println!("Added {} (id {}).", row.display_name(), row.id);
    Ok(())
}

async fn update_inventory(client: &ApiClient, args: &[&str]) -> Result<()> {
    require(client, Feature::Inventory)?;
    let id = parse_id(args, "pharmadmin inventory-update <id> key=value...")?;
    let rows = client.fetch_inventory(None).await?;
    let current = rows
        .iter()
        .find(|row| row.resource_id() == id)
        .with_context(|| format!("No stock row with id {}", id))?;
    let edited: PharmacyDrug = with_fields(current, &args[1..])?;
    client.update_inventory(&edited).await?;
    println!("{} saved.", edited.display_name());
    Ok(())
}

async fn delete_inventory(client: &ApiClient, args: &[&str]) -> Result<()> {
    require(client, Feature::Inventory)?;
    let id = parse_id(args, "pharmadmin inventory-delete <id>")?;
    client.delete_inventory(id).await?;
    println!("Drug deleted.");
    Ok(())
}

async fn upload_bill(client: &ApiClient, args: &[&str]) -> Result<()> {
    require(client, Feature::BillUpload)?;
    let mut path = None;
    let mut save_all = false;
    let mut to_save = Vec::new();
    let mut to_delete = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match *arg {
            "--save" => save_all = true,
            "--save-id" | "--delete-id" => {
                let raw = iter.next().with_context(|| format!("{} needs an id", arg))?;
                let id: i64 = raw.parse().with_context(|| format!("id must be a number, got '{}'", raw))?;
                if *arg == "--save-id" {
                    to_save.push(id);
                } else {
                    to_delete.push(id);
                }
            }
            other if other.starts_with("--") => bail!("unknown option '{}'", other),
            other => path = Some(other),
        }
    }
    let Some(path) = path else {
        bail!("Please select a file to upload.");
    };
    let path = Path::new(path);
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("File name is not valid UTF-8")?;

    let mut upload = client.upload_bill(file_name, bytes).await?;
    println!("{} uploaded successfully.", upload.invoice_filename);
    for drug in &upload.matched_drugs {
        println!(
            "  {:>6}  {:<30} {}",
            drug.id,
            drug.display_name(),
            drug.strength.as_deref().unwrap_or("")
        );
    }

    for id in to_delete {
        let Some(drug) = upload.take_matched(id) else {
            println!("No matched drug with id {}.", id);
            continue;
        };
        client.delete_inventory(drug.id).await?;
        println!("{} deleted.", drug.display_name());
    }

    if save_all {
        to_save = upload.matched_drugs.iter().map(|d| d.id).collect();
    }
    for id in to_save {
        let Some(drug) = upload.take_matched(id) else {
            println!("No matched drug with id {}.", id);
            continue;
        };
        client.save_matched_drug(&drug).await?;
        println!("{} saved.", drug.display_name());
    }
    Ok(())
}

async fn chat(client: &ApiClient, args: &[&str]) -> Result<()> {
    require(client, Feature::Chat)?;
    let mut location = None;
    let mut words = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if *arg == "--at" {
            let raw = iter.next().context("--at needs lat,lng")?;
            location = Some(parse_location(raw)?);
        } else {
            words.push(*arg);
        }
    }

    let reply = client.chat(&words.join(" "), location).await?;
    println!("{}", reply.response);
    for suggestion in &reply.suggestions {
        println!("  > {}", suggestion);
    }
    Ok(())
}

fn parse_location(raw: &str) -> Result<GeoPoint> {
    let (lat, lng) = raw.split_once(',').context("expected lat,lng")?;
    Ok(GeoPoint {
        lat: lat.trim().parse().context("invalid latitude")?,
        lng: lng.trim().parse().context("invalid longitude")?,
    })
}
