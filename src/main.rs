use clap::{Parser, Subcommand, ValueEnum};
use colpersist::{explain, render_text, MappingConfig, MappingRegistry};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "colpersist")]
#[command(about = "Collection persistence - compile and inspect collection mapping SQL", long_about = None)]
struct Args {
    /// Directory containing colpersist.toml (and an optional .env)
    #[arg(long, default_value = ".")]
    mapping_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build every collection persister and report the result
    Check,
    /// Print the compiled statements of one or all collections
    Explain {
        /// Collection role, e.g. Order.lines
        #[arg(long)]
        role: Option<String>,

        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "colpersist=info,colpersist_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = MappingConfig::load(&args.mapping_dir)?;
    tracing::info!(
        "Loaded mapping from {} ({} collections, {:?} parameters)",
        args.mapping_dir.display(),
        config.collections.len(),
        config.parameter_style
    );
    let registry = MappingRegistry::build(&config)?;

    match args.command {
        Command::Check => {
            println!(
                "{} collections, {} statements compiled",
                registry.len(),
                registry.statement_count()
            );
            for persister in registry.persisters() {
                for reason in persister.unsupported_operations() {
                    println!("  {}: unsupported: {}", persister.role(), reason);
                }
            }
        }
        Command::Explain { role, format } => {
            let explained = explain(&registry, role.as_deref())?;
            match format {
                OutputFormat::Text => print!("{}", render_text(&explained)),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&explained)?),
            }
        }
    }

    Ok(())
}
