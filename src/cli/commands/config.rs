//! Config command - show or initialize configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::TokenResult;
use console::style;

/// Execute the config command
///
/// Only `show` needs a valid config file; `path` and `init` work without one.
pub async fn execute(args: ConfigArgs, manager: &ConfigManager) -> TokenResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(manager).await?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
    }

    Ok(())
}

async fn show_config(manager: &ConfigManager) -> TokenResult<()> {
    let config = manager.load().await?;
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> TokenResult<()> {
    let path = manager.path();

    if path.exists() && !force {
        println!(
            "{} Config already exists at {}",
            style("!").yellow(),
            path.display()
        );
        println!("  Use --force to overwrite");
        return Ok(());
    }

    manager.save(&Config::default()).await?;

    println!(
        "{} Configuration initialized at {}",
        style("✓").green(),
        path.display()
    );
    Ok(())
}
