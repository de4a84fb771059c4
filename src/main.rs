use anyhow::{bail, Context};
use autoflow_rs::bundle::{self, Bundle};
use autoflow_rs::config::EngineConfig;
use autoflow_rs::flow::executor::FlowExecutor;
use autoflow_rs::flow::generate::{descriptors_from_experiments, ExperimentInput};
use autoflow_rs::flow::layout::{apply_layout, layout};
use autoflow_rs::flow::loader::{FlowDocument, FlowLoader};
use autoflow_rs::flow::recipe::{RecipeBuilder, RecipeFlows, RecipeStructure};
use autoflow_rs::flow::runner::ScriptedRunner;
use autoflow_rs::flow::types::UnitConfig;
use autoflow_rs::flow::validator::validate;
use autoflow_rs::server;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a flow file and print the report
    Validate {
        /// Flow document (YAML or JSON)
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Print auto-layout positions for a flow file
    Layout {
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Export a flow file as a four-file bundle
    Export {
        #[arg(short, long)]
        file: PathBuf,

        /// Output directory, or a `.zip` archive
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Import a bundle and print the flow
    Import {
        /// Bundle directory or `.zip` archive
        #[arg(short, long)]
        dir: PathBuf,
    },
    /// Build a flow from recipe files and export it as a bundle
    Recipe {
        /// Structure file (JSON)
        #[arg(long)]
        structure: PathBuf,

        /// Flows file (JSON)
        #[arg(long)]
        flows: PathBuf,

        /// Per-flow INI overrides
        #[arg(long)]
        overrides: Option<PathBuf>,

        /// Root structure key
        #[arg(long)]
        root: String,

        #[arg(short, long)]
        out: PathBuf,
    },
    /// Generate a linear flow from a JSON experiment or list of experiments
    Generate {
        #[arg(short, long)]
        experiments: PathBuf,

        /// Leave out the Boot node
        #[arg(long)]
        no_boot: bool,

        #[arg(long)]
        unit_ip: Option<String>,

        #[arg(long)]
        unit_com: Option<String>,

        #[arg(long)]
        unit_product: Option<String>,

        /// Write the flow document here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Dry-run a flow with scripted outcomes
    Simulate {
        #[arg(short, long)]
        file: PathBuf,

        /// JSON map of node id or name to outcomes, e.g. {"T1": ["FAIL"]}
        #[arg(short, long)]
        script: Option<PathBuf>,

        /// Start node id (defaults to the first Start node)
        #[arg(long)]
        start: Option<String>,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::from_env()?,
    };
    Ok(config)
}

fn load_flow(path: &Path) -> anyhow::Result<FlowDocument> {
    FlowLoader::new()
        .load_descriptors(path)
        .with_context(|| format!("Failed to load flow {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn is_archive(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
}

fn write_bundle(bundle: &Bundle, out: &Path) -> anyhow::Result<()> {
    if is_archive(out) {
        bundle.write_zip(out)?;
    } else {
        bundle.write_dir(out)?;
    }
    Ok(())
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Commands::Validate { file } => {
            let (graph, _) = load_flow(&file)?.build()?;
            let report = validate(&graph);
            print_json(&json!(report))?;
            if !report.is_valid() {
                bail!("Flow {} is invalid", file.display());
            }
        }
        Commands::Layout { file } => {
            let (graph, _) = load_flow(&file)?.build()?;
            print_json(&json!(layout(&graph, &config.layout)))?;
        }
        Commands::Export { file, out } => {
            let doc = load_flow(&file)?;
            let (graph, bindings) = doc.build()?;

            let report = validate(&graph);
            for warning in &report.warnings {
                log::warn!("{}", warning);
            }
            if !report.is_valid() {
                for error in &report.errors {
                    log::error!("{}", error);
                }
                bail!("Refusing to export invalid flow {}", file.display());
            }

            let bundle = bundle::export(&graph, &bindings, &doc.unit_config, &config.export_options())?;
            write_bundle(&bundle, &out)?;
            println!("Exported {} nodes to {}", graph.len(), out.display());
        }
        Commands::Import { dir } => {
            let bundle = if is_archive(&dir) {
                Bundle::read_zip(&dir)?
            } else {
                Bundle::read_dir(&dir)?
            };
            let (graph, bindings, unit_config) = bundle::import(&bundle, &config.export)?;
            print_json(&json!({
                "nodes": graph.nodes(),
                "connections": graph.connections(),
                "bindings": bindings,
                "unit_config": unit_config,
                "validation": validate(&graph),
            }))?;
        }
        Commands::Recipe {
            structure,
            flows,
            overrides,
            root,
            out,
        } => {
            let structure: RecipeStructure = read_json(&structure)?;
            let flows: RecipeFlows = read_json(&flows)?;

            let mut builder = RecipeBuilder::new(&structure, &flows);
            if let Some(path) = overrides {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                builder = builder.with_overrides(&text);
            }
            let (mut graph, bindings) = builder.build(&root)?;
            apply_layout(&mut graph, &config.layout)?;

            let bundle = bundle::export(
                &graph,
                &bindings,
                &UnitConfig::default(),
                &config.export_options(),
            )?;
            write_bundle(&bundle, &out)?;
            println!("Exported {} nodes to {}", graph.len(), out.display());
        }
        Commands::Generate {
            experiments,
            no_boot,
            unit_ip,
            unit_com,
            unit_product,
            out,
        } => {
            let experiments = read_json::<ExperimentInput>(&experiments)?.into_vec();
            let mut doc = descriptors_from_experiments(&experiments, !no_boot);
            doc.unit_config = UnitConfig {
                ip_address: unit_ip,
                com_port: unit_com,
                product: unit_product,
                ..doc.unit_config
            };
            let yaml = serde_yaml::to_string(&doc)?;
            match out {
                Some(path) => {
                    fs::write(&path, yaml)?;
                    println!("Wrote {} nodes to {}", doc.nodes.len(), path.display());
                }
                None => print!("{}", yaml),
            }
        }
        Commands::Simulate {
            file,
            script,
            start,
        } => {
            let (graph, bindings) = load_flow(&file)?.build()?;
            let runner = match script {
                Some(path) => ScriptedRunner::from_file(&path)
                    .map_err(|e| anyhow::anyhow!("Failed to load script {}: {}", path.display(), e))?,
                None => ScriptedRunner::new(Default::default()),
            };

            let start = match start {
                Some(id) => id,
                None => match graph.start_nodes().first() {
                    Some(node) => node.id.clone(),
                    None => bail!("Flow {} has no Start node", file.display()),
                },
            };

            let executor = FlowExecutor::new(Arc::new(runner), config.executor.clone());
            let report = executor.execute(&graph, &bindings, &start).await?;
            print_json(&json!(report))?;
        }
        Commands::Serve { port } => {
            server::serve(port, config)
                .await
                .map_err(|e| anyhow::anyhow!("Server failed: {}", e))?;
        }
    }

    Ok(())
}
