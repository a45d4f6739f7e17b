use std::fs;
use std::io::{self, Write};

use anyhow::Context;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use rsv_core::{
    collect_testbed, run_save, save_collected_builds, CollectRequest, Config, SaveRequest,
    SystemEffects,
};
use rsv_domain::render_json;

mod cli;

use cli::{CollectArgs, RsvCli, RsvCommand, SaveArgs};

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = RsvCli::parse();
    init_tracing(cli.global_options().log_level());

    let outcome = match &cli.command {
        RsvCommand::Collect(args) => collect(args),
        RsvCommand::Save(args) => save(args),
    };
    outcome.map_err(|err| eyre!("{err:?}"))
}

fn init_tracing(level: &str) {
    let filter = format!("rsv={level},rsv_core={level},rsv_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn collect(args: &CollectArgs) -> anyhow::Result<()> {
    let config = Config::from_env()?.with_overrides(args.repo.as_deref(), args.jobs);
    let effects = SystemEffects::from_config(&config)?;
    let request = CollectRequest {
        results_dir: args.results.clone(),
        matrix: args.matrix.clone(),
        repo: config.testbed_repo().to_string(),
        run_id: args.run_id,
        attempt: args.attempt,
        workers: config.workers(),
    };
    let collection = collect_testbed(&effects, &request)?;
    if let Some(index_dir) = &args.index_dir {
        save_collected_builds(index_dir, &collection.results)?;
    }

    let manifest = render_json(&collection.results)?;
    match &args.output {
        Some(path) => {
            fs::write(path, manifest).with_context(|| format!("writing {}", path.display()))?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(manifest.as_bytes())
                .and_then(|()| stdout.flush())
                .context("writing manifest to stdout")?;
        }
    }
    Ok(())
}

fn save(args: &SaveArgs) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let effects = SystemEffects::from_config(&config)?;
    let request = SaveRequest {
        manifest: args.results.clone(),
        index_dir: args.index.clone(),
    };
    run_save(&effects, &request)?;
    Ok(())
}
