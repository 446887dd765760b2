use anyhow::Context;
use clap::Parser;
use gui_bridge::bridge::GuiBridge;
use gui_bridge::model::VisualizationModel;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use vitalcore::processing::DisplayMode;
use workflow::config::WorkflowConfig;
use workflow::runner::Runner;

mod generator;
mod gui_bridge;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Synthetic driver for the vital radar pipeline")]
struct Args {
    /// Load a workflow config from YAML
    #[arg(long)]
    workflow: Option<PathBuf>,
    /// Number of triggers processed by the offline pass
    #[arg(long)]
    cycles: Option<usize>,
    /// Surfaced stage: raw, baseband, range-profile or physiological
    #[arg(long)]
    mode: Option<String>,
    /// Keep ticking at the trigger period until Ctrl+C
    #[arg(long, default_value_t = false)]
    live: bool,
    /// Write the offline summary as JSON
    #[arg(long)]
    report: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mode = args
        .mode
        .as_deref()
        .map(str::parse::<DisplayMode>)
        .transpose()
        .context("parsing --mode")?;
    let base = match args.workflow {
        Some(path) => WorkflowConfig::load(path)?,
        None => WorkflowConfig::default(),
    };
    let workflow_config = base.with_overrides(args.cycles, mode);

    let mut runner = Runner::new(&workflow_config)?;
    let gui_bridge = GuiBridge::new();

    if args.live {
        let period = Duration::from_secs_f64(runner.scene().trigger_period_s());
        gui_bridge.publish_status(&format!(
            "Live acquisition every {:?} in {} mode (Ctrl+C to stop)...",
            period, workflow_config.mode
        ));
        let runtime = TokioBuilder::new_current_thread()
            .enable_all()
            .build()
            .context("creating runtime for live ticks")?;
        runtime.block_on(async {
            let mut ticker = tokio::time::interval(period);
            let ctrl_c = signal::ctrl_c();
            tokio::pin!(ctrl_c);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = runner.tick();
                        gui_bridge.publish(&VisualizationModel::from(&report))?;
                    }
                    res = &mut ctrl_c => {
                        res.context("awaiting Ctrl+C to exit")?;
                        break;
                    }
                }
            }
            Ok::<(), anyhow::Error>(())
        })?;
        let metrics = runner.pipeline().metrics();
        gui_bridge.publish_status(&format!(
            "Live acquisition stopped after {} cycles ({} acquisition failures).",
            metrics.processed + metrics.acquisition_failures,
            metrics.acquisition_failures
        ));
        return Ok(());
    }

    let result = runner.run_offline(workflow_config.cycles);
    if let Some(report) = result.last_report.as_ref() {
        gui_bridge.publish(&VisualizationModel::from(report))?;
    }
    println!(
        "Offline run -> cycles {}, disconnected {}, distance {}, breathing {}",
        result.cycles,
        result.disconnected_cycles,
        result
            .distance_m
            .map(|d| format!("{:.3} m", d))
            .unwrap_or_else(|| "n/a".into()),
        result
            .breathing_per_minute
            .map(|r| format!("{:.1} /min", r))
            .unwrap_or_else(|| "n/a".into()),
    );

    if let Some(path) = args.report {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating report directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(&result).context("serializing offline report")?;
        fs::write(&path, json).with_context(|| format!("writing report {}", path.display()))?;
        gui_bridge.publish_status(&format!("Report written to {}", path.display()));
    }

    Ok(())
}
