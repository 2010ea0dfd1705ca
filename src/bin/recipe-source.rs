//! recipe-source CLI
//!
//! Usage:
//!   recipe-source install [recipe]     Fetch and resolve sources of recipe instances
//!   recipe-source show [recipe]        Show parsed sources, no network or VCS access
//!
//! Freezing: `recipe-source -o install --freeze-to frozen.toml`, then replay
//! with `recipe-source -c frozen.toml install`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recipe_source::acquire::{Vcs, VcsRegistry};
use recipe_source::core::config::DEFAULT_CONFIG_NAME;
use recipe_source::{
    FreezeSession, Installer, Recipe, RecipeConfig, RecipeOptions, ReportOnly, output,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recipe-source")]
#[command(about = "Fetch, cache and freeze the sources of installation recipes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file
    #[arg(short, long, global = true, env = "RECIPE_CONFIG", default_value = DEFAULT_CONFIG_NAME)]
    config: PathBuf,

    /// Never access the network; required for freezing
    #[arg(short, long, global = true)]
    offline: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch sources and resolve addons paths
    Install {
        /// Recipe instance name (all if not specified)
        recipe: Option<String>,

        /// Write pinned versions and revisions to this file
        #[arg(long)]
        freeze_to: Option<PathBuf>,
    },

    /// Show the parsed sources of recipe instances
    Show {
        /// Recipe instance name (all if not specified)
        recipe: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = RecipeConfig::read(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    let buildout = config.buildout(&cli.config, cli.offline);
    let registry = VcsRegistry::with_defaults();
    let kinds = registry.supported_kinds();

    match cli.command {
        Commands::Install { recipe, freeze_to } => {
            let freeze_to = freeze_to
                .map(std::path::absolute)
                .transpose()
                .context("Failed to resolve --freeze-to")?;
            let installer = Installer::new(&buildout, &registry, &ReportOnly);
            let mut session = FreezeSession::new();

            for (name, mut options) in select(&config, recipe.as_deref())? {
                if let Some(out) = &freeze_to {
                    options.freeze_to = Some(out.clone());
                }
                let recipe = Recipe::new(&name, options, &buildout, &kinds)
                    .with_context(|| format!("Invalid options for {}", name))?;
                installer
                    .install(&recipe, &mut session)
                    .with_context(|| format!("Failed to install {}", name))?;
            }
        }

        Commands::Show { recipe } => {
            for (name, options) in select(&config, recipe.as_deref())? {
                let recipe = Recipe::new(&name, options, &buildout, &kinds)
                    .with_context(|| format!("Invalid options for {}", name))?;
                show(&recipe);
            }
        }
    }

    Ok(())
}

/// Recipe instances to work on, in declaration order
fn select(config: &RecipeConfig, name: Option<&str>) -> Result<Vec<(String, RecipeOptions)>> {
    if config.recipes.is_empty() {
        anyhow::bail!("No recipe instance declared");
    }
    match name {
        Some(name) => {
            let options = config
                .recipes
                .get(name)
                .with_context(|| format!("No recipe instance named {}", name))?;
            Ok(vec![(name.to_string(), options.clone())])
        }
        None => Ok(config
            .recipes
            .iter()
            .map(|(name, options)| (name.clone(), options.clone()))
            .collect()),
    }
}

fn show(recipe: &Recipe) {
    output::action(&recipe.name);
    output::field("version", &recipe.version.wanted);
    output::field("main", &recipe.sources.main().to_string());
    if let Some(archive) = &recipe.version.archive {
        output::field("archive", &archive.path.display().to_string());
        output::field("caching", &recipe.version.caching.to_string());
    }
    if let Some(dir) = &recipe.version.software_dir {
        output::field("directory", &dir.display().to_string());
    }

    for (dir, entry) in recipe.sources.addons() {
        let mut line = entry.descriptor.to_string();
        for (key, value) in entry.options.iter() {
            line.push_str(&format!(" {key}={value}"));
        }
        output::field(&dir.display().to_string(), &line);
    }
}
