use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use clap::error::ErrorKind;

use promconfigmgr::{
    ConfigGenerator, Document, FragmentStore, KubeSource, Orchestrator, ReloadNotifier, Settings,
    logging,
};

#[derive(Parser, Debug)]
#[command(name = "promconfigmgr", version)]
#[command(about = "Merge annotated ConfigMaps into a Prometheus configuration and reload Prometheus")]
struct Cli {
    /// Base Prometheus configuration to extend
    source: PathBuf,

    /// Directory receiving the generated configuration and rule files
    target_dir: PathBuf,

    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            println!("{}", e.render());
            std::process::exit(1);
        }
    };

    if let Err(e) = run(cli).await {
        tracing::error!("{e:#}");
        println!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    logging::init_with_config(&settings.logging);

    let base = load_base(&cli.source)?;
    let notifier = ReloadNotifier::from_config(&settings.reload).context("configuring reload")?;
    let generator = ConfigGenerator::new(&cli.target_dir, &settings);

    let source = KubeSource::connect(&settings.source)
        .await
        .context("connecting to kubernetes")?;

    let store = Arc::new(FragmentStore::new());
    let orchestrator = Orchestrator::new(store, generator, notifier, base, &settings);

    tokio::select! {
        result = orchestrator.run(Box::new(source)) => result?,
        _ = tokio::signal::ctrl_c() => {
            promconfigmgr::log_event!("main", "interrupted, exiting");
        }
    }
    Ok(())
}

fn load_base(path: &Path) -> anyhow::Result<Document> {
    let text = fs::read_to_string(path).with_context(|| format!("loading {}", path.display()))?;
    Document::parse(&text).with_context(|| format!("parsing {}", path.display()))
}
