//! Diagnostics command.

use anyhow::Result;
use colored::Colorize;
use projdash_core::enrich::{self, ClaudeCliEnricher};
use projdash_core::github::{GhCli, GitHubSource};
use projdash_core::{Config, Database};

pub async fn execute(config: &Config) -> Result<()> {
    println!("{}", "projdash Doctor".cyan().bold());
    println!("{}", "─".repeat(50));
    println!();

    let mut issues = Vec::new();

    // Check git
    print!("  git: ");
    match which::which("git") {
        Ok(_) => println!("{}", "✓ installed".green()),
        Err(_) => {
            println!("{}", "✗ not found".red());
            issues.push("git is not installed; repository facts will be empty".to_string());
        }
    }

    // Check config file
    print!("  Config file: ");
    if config.data_dir.join("config.toml").exists() {
        println!("{}", "✓ exists".green());
    } else {
        println!("{}", "○ not found (using defaults)".yellow());
    }

    // Check dev root
    print!("  Dev root ({}): ", config.scan.dev_root.display());
    if config.scan.dev_root.is_dir() {
        println!("{}", "✓ exists".green());
    } else {
        println!("{}", "✗ not found".red());
        issues.push("Dev root does not exist; set DEV_ROOT or scan.dev_root".to_string());
    }

    // Check database
    print!("  Database: ");
    match Database::open_path(&config.database_path()).and_then(|db| {
        db.ping()?;
        db.list_projects(false).map(|p| p.len())
    }) {
        Ok(count) => println!("{}", format!("✓ connected ({} projects)", count).green()),
        Err(e) => {
            println!("{}", format!("✗ {}", e).red());
            issues.push("Database not accessible".to_string());
        }
    }

    // Check server
    print!("  Server PID file: ");
    if config.pid_file().exists() {
        println!("{}", "✓ present".green());
    } else {
        println!("{}", "○ not running".yellow());
    }

    // Check enrichment
    println!();
    println!("  {}", "LLM enrichment:".cyan());
    if !config.llm.enabled {
        println!("    {}", "○ disabled (FEATURE_LLM=false)".yellow());
    } else {
        println!("    Provider: {}", config.llm.provider);
        if let Err(e) = enrich::from_config(&config.llm) {
            println!("    {}", format!("✗ {}", e).red());
            issues.push(format!("Enrichment misconfigured: {}", e));
        }
        if config.llm.provider == "claude-cli" {
            print!("    claude: ");
            match ClaudeCliEnricher::new(None).locate() {
                Ok(path) => println!("{}", format!("✓ {}", path.display()).green()),
                Err(e) => {
                    println!("{}", format!("✗ {}", e).red());
                    issues.push("claude CLI not found on PATH".to_string());
                }
            }
        }
        println!("    Timeout: {}s", config.llm.timeout_secs);
        println!(
            "    Available providers: {}",
            enrich::available_providers().join(", ")
        );
    }

    // Check GitHub
    println!();
    println!("  {}", "GitHub data:".cyan());
    if !config.github.enabled {
        println!("    {}", "○ disabled (FEATURE_GITHUB=false)".yellow());
    } else {
        print!("    gh: ");
        if GhCli::new().is_available().await {
            println!("{}", "✓ logged in".green());
        } else {
            println!("{}", "○ missing or not logged in, GitHub data will be skipped".yellow());
        }
    }

    // Summary
    println!();
    if issues.is_empty() {
        println!("{}", "✓ All checks passed".green().bold());
    } else {
        println!("{}", format!("✗ {} issue(s) found:", issues.len()).red().bold());
        for issue in &issues {
            println!("  • {}", issue);
        }
    }

    Ok(())
}
