use std::path::{Path, PathBuf};
use std::process::ExitCode;

use aip_packager::config::{AppConfig, ConfigOverrides};
use aip_packager::core::{AccountId, DirectoryModel, MetadataAssembler, Packager, RecordKind};
use aip_packager::logging::{self, LogConfig};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "aip-packager")]
#[command(about = "Assemble email account data into Archival Information Packages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML config file (defaults to ./aip-packager.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the AIP for one account
    Package(PackageArgs),
    /// Print a directory tree, or the entries matching a pattern
    Tree {
        path: PathBuf,
        #[arg(long)]
        search: Option<String>,
    },
    /// Check an event log and summarize its records
    Events { log: PathBuf },
    /// Print the resolved configuration
    Config,
}

#[derive(Args)]
struct PackageArgs {
    account_id: String,
    source_dir: PathBuf,
    destination_dir: PathBuf,

    #[arg(long)]
    manifest_template: Option<PathBuf>,

    #[arg(long)]
    manifest_list_template: Option<PathBuf>,

    #[arg(long)]
    events_log: Option<PathBuf>,

    #[arg(long)]
    rdf_source: Option<PathBuf>,

    #[arg(long)]
    charset: Option<String>,

    /// Skip moving source data; only validate what is already in place
    #[arg(long)]
    no_move: bool,

    #[arg(long)]
    verbose: bool,

    #[arg(long)]
    json_logs: bool,

    #[arg(long)]
    silent: bool,
}

impl PackageArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            charset: self.charset.clone(),
            move_data: self.no_move.then_some(false),
            manifest_template: self.manifest_template.clone(),
            manifest_list_template: self.manifest_list_template.clone(),
            events_log: self.events_log.clone(),
            rdf_source: self.rdf_source.clone(),
            json_logs: self.json_logs.then_some(true),
            verbose: self.verbose.then_some(true),
            silent: self.silent.then_some(true),
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let overrides = match &cli.command {
        Commands::Package(args) => args.overrides(),
        _ => ConfigOverrides::default(),
    };
    let config = AppConfig::new(cli.config.as_deref(), &overrides)?;

    logging::init(LogConfig {
        json: config.json_logs,
        verbose: config.verbose,
        silent: config.silent,
    });

    match cli.command {
        Commands::Package(args) => run_package(&config, args).context("Failed to package account"),
        Commands::Tree { path, search } => {
            run_tree(&path, search.as_deref()).context("Failed to read directory tree")?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Events { log } => {
            run_events(&log).context("Failed to read event log")?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_package(config: &AppConfig, args: PackageArgs) -> Result<ExitCode> {
    let account_id = AccountId::new(args.account_id)?;
    let options = config.to_options(account_id, args.source_dir, args.destination_dir);

    let outcome = Packager::new(options).package(config.move_data)?;

    println!("{}", outcome.root.display());
    if outcome.valid {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(2))
    }
}

fn run_tree(path: &Path, search: Option<&str>) -> Result<()> {
    let model = DirectoryModel::snapshot(path)?;

    match search {
        Some(pattern) => {
            for index in model.search(pattern)? {
                if let Some(node) = model.get(index) {
                    println!("{}", node.name);
                }
            }
        }
        None => print!("{}", model.render()),
    }
    Ok(())
}

fn run_events(log: &Path) -> Result<()> {
    let metadata = MetadataAssembler::from_file(log)?;

    for kind in [RecordKind::Agent, RecordKind::Event, RecordKind::Object] {
        let records = metadata.records(kind);
        println!("{}: {}", kind.as_str(), records.len());
        for record in records {
            println!("  {} {}", record.alias, record.timestamp);
        }
    }
    Ok(())
}
