//! Hostel management admin CLI
//!
//! Maintenance tool for the hostel database: seeding the room layout,
//! checking and repairing roster drift, and managing API tokens.
//!
//! # Usage
//!
//! ```bash
//! hostelmgr-admin seed-rooms
//! hostelmgr-admin diagnose
//! hostelmgr-admin diagnose --fix
//! hostelmgr-admin reconcile
//! hostelmgr-admin unassign-all
//! hostelmgr-admin token add <user-id> --role warden
//! hostelmgr-admin token list
//! hostelmgr-admin token remove <token>
//! ```

use clap::{Args, Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use hostelmgr::assignment::AssignmentService;
use hostelmgr::config::Config;
use hostelmgr::db::{init_db, RoomRepository};

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "hostelmgr-admin")]
#[command(version)]
#[command(about = "Hostel management administration tool")]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create any rooms missing from the configured layout
    SeedRooms,
    /// Report roster drift in both directions
    Diagnose {
        /// Rebuild the rosters from the student records
        #[arg(long)]
        fix: bool,
    },
    /// Drop stale roster entries and re-derive occupancy counts
    Reconcile,
    /// Vacate every room
    UnassignAll,
    /// Manage API tokens
    Token(TokenCommand),
}

#[derive(Args)]
struct TokenCommand {
    #[command(subcommand)]
    command: TokenSubcommand,
}

#[derive(Subcommand)]
enum TokenSubcommand {
    /// Add a token for a user
    Add {
        /// User id the token authenticates as
        user_id: String,
        /// Role claim: admin, warden or student
        #[arg(long, short, default_value = "student")]
        role: String,
    },
    /// List all tokens
    List,
    /// Remove a token
    Remove {
        /// The token string
        token: String,
    },
}

// ============================================================================
// Tokens file
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct TokenEntry {
    token: String,
    user_id: String,
    role: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TokensFile {
    #[serde(default)]
    tokens: Vec<TokenEntry>,
}

fn load_tokens(path: &PathBuf) -> Result<TokensFile, Box<dyn std::error::Error>> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    } else {
        Ok(TokensFile::default())
    }
}

fn save_tokens(path: &PathBuf, file: &TokensFile) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_yaml::to_string(file)?)?;
    Ok(())
}

// ============================================================================
// Commands
// ============================================================================

async fn seed_rooms(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let pool = init_db(Some(config.database_path.clone())).await?;
    let created = RoomRepository::new(pool).seed(&config.rooms).await?;

    if created == 0 {
        println!("All {} rooms already exist.", config.rooms.last_room);
    } else {
        println!("Created {} room(s).", created);
    }
    Ok(())
}

async fn diagnose(config: &Config, fix: bool) -> Result<(), Box<dyn std::error::Error>> {
    let pool = init_db(Some(config.database_path.clone())).await?;
    let service = AssignmentService::new(pool);

    let report = service.diagnose().await?;

    if report.is_clean() {
        println!("No drift found. Rosters and student records agree.");
        return Ok(());
    }

    println!("Drift detected:");
    println!("  Stale roster entries:  {}", report.stale_roster_entries);
    println!("  Mismatched pointers:   {}", report.mismatched_pointers);
    println!("  Count mismatches:      {}", report.count_mismatches);
    println!("  Orphaned students:     {}", report.orphaned_students);
    println!();
    for detail in &report.details {
        println!("  - {}", detail);
    }

    if fix {
        println!();
        let rebuilt = service.rebuild().await?;
        println!(
            "Rebuilt {} room(s) from {} student record(s).",
            rebuilt.rooms_rebuilt, rebuilt.students_placed
        );
    } else {
        println!();
        println!("Run again with --fix to rebuild the rosters from the student records.");
    }
    Ok(())
}

async fn reconcile(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let pool = init_db(Some(config.database_path.clone())).await?;
    let report = AssignmentService::new(pool).reconcile().await?;

    println!("Checked {} room(s).", report.rooms_checked);
    if report.rooms_repaired == 0 {
        println!("Nothing to repair.");
    } else {
        println!(
            "Repaired {} room(s), removed {} stale roster entr(ies).",
            report.rooms_repaired, report.stale_entries_removed
        );
    }
    Ok(())
}

async fn unassign_all(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let pool = init_db(Some(config.database_path.clone())).await?;
    let cleared = AssignmentService::new(pool).remove_all().await?;
    println!("Unassigned {} student(s).", cleared);
    Ok(())
}

fn add_token(
    config: &Config,
    user_id: String,
    role: String,
) -> Result<(), Box<dyn std::error::Error>> {
    match role.as_str() {
        "admin" | "warden" | "student" => {}
        other => {
            eprintln!("Error: unknown role '{}'", other);
            std::process::exit(1);
        }
    }

    let mut file = load_tokens(&config.tokens_path)?;
    let token = Uuid::new_v4().simple().to_string();
    file.tokens.push(TokenEntry {
        token: token.clone(),
        user_id: user_id.clone(),
        role: role.clone(),
    });
    save_tokens(&config.tokens_path, &file)?;

    println!("Added token for user {}", user_id);
    println!("  Role:  {}", role);
    println!("  Token: {}", token);
    Ok(())
}

fn list_tokens(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let file = load_tokens(&config.tokens_path)?;

    if file.tokens.is_empty() {
        println!("No tokens registered.");
        return Ok(());
    }

    println!("{:<36} {:<40} {:<10}", "TOKEN", "USER", "ROLE");
    println!("{}", "-".repeat(86));
    for entry in &file.tokens {
        println!(
            "{:<36} {:<40} {:<10}",
            entry.token, entry.user_id, entry.role
        );
    }
    println!();
    println!("Total: {} token(s)", file.tokens.len());
    Ok(())
}

fn remove_token(config: &Config, token: String) -> Result<(), Box<dyn std::error::Error>> {
    let mut file = load_tokens(&config.tokens_path)?;
    let before = file.tokens.len();
    file.tokens.retain(|entry| entry.token != token);

    if file.tokens.len() == before {
        eprintln!("Error: token not found");
        std::process::exit(1);
    }

    save_tokens(&config.tokens_path, &file)?;
    println!("Removed token.");
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::load(cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::SeedRooms => seed_rooms(&config).await,
        Commands::Diagnose { fix } => diagnose(&config, fix).await,
        Commands::Reconcile => reconcile(&config).await,
        Commands::UnassignAll => unassign_all(&config).await,
        Commands::Token(token_cmd) => match token_cmd.command {
            TokenSubcommand::Add { user_id, role } => add_token(&config, user_id, role),
            TokenSubcommand::List => list_tokens(&config),
            TokenSubcommand::Remove { token } => remove_token(&config, token),
        },
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
