use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use leadflow::config::EditorConfig;
use leadflow::editor::EditorSession;
use leadflow::model::{Flow, FlowId};
use leadflow::persistence::{self, FsFlowStore, PersistenceAdapter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Manage and edit lead-engagement flows", long_about = None)]
struct Cli {
    /// Directory holding the flow documents (overrides the config file)
    #[arg(short = 's', long = "store", value_name = "DIR")]
    store: Option<Utf8PathBuf>,

    /// JSON editor configuration
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<Utf8PathBuf>,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List stored flows
    List,
    /// Print a flow's nodes, connections and validation report
    Show {
        id: String,
        /// Print the raw flow document instead
        #[arg(long)]
        json: bool,
    },
    /// Create an empty draft flow
    Create { name: String },
    /// Store a flow document read from a JSON file
    Import {
        file: Utf8PathBuf,
        /// Give the imported flow a new id instead of replacing one with the same id
        #[arg(long)]
        new_id: bool,
    },
    /// Write a flow document to stdout or a file
    Export {
        id: String,
        #[arg(short = 'o', long = "output")]
        output: Option<Utf8PathBuf>,
    },
    /// Validate a stored flow (by id) or a flow document (by path)
    Validate { target: String },
    /// Copy a flow as a new draft
    Duplicate { id: String },
    Activate { id: String },
    Deactivate { id: String },
    Delete { id: String },
    /// Open a flow in the interactive editor (requires the `egui` feature)
    Edit {
        id: Option<String>,
        /// Start a new flow with this name instead
        #[arg(long = "new", value_name = "NAME", conflicts_with = "id")]
        new: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "leadflow=debug" } else { "leadflow=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => EditorConfig::load(path)?,
        None => EditorConfig::default(),
    };
    if let Some(dir) = &cli.store {
        config.store_dir = dir.clone();
    }
    let store = FsFlowStore::open(config.store_dir.clone())?;
    let mut adapter = PersistenceAdapter::new(store);

    match cli.command {
        Command::List => {
            for f in adapter.list()? {
                let updated = f
                    .updated_at
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {:<8}  {:>3} nodes  {}  {}",
                    f.id,
                    format!("{:?}", f.status).to_lowercase(),
                    f.node_count,
                    updated,
                    f.name
                );
            }
        }
        Command::Show { id, json } => {
            let flow = adapter.load(&FlowId::from(id.as_str()))?;
            if json {
                println!("{}", persistence::to_json(&flow)?);
            } else {
                print_flow(&flow);
            }
        }
        Command::Create { name } => {
            let flow = adapter.create(&name)?;
            println!("{}", flow.id);
        }
        Command::Import { file, new_id } => {
            let mut flow = read_flow_file(&file)?;
            if new_id {
                flow.id = FlowId::generate();
            }
            let stored = adapter
                .save(&flow)
                .with_context(|| format!("Failed to import {}", file))?;
            println!("{}", stored.id);
        }
        Command::Export { id, output } => {
            let flow = adapter.load(&FlowId::from(id.as_str()))?;
            let json = persistence::to_json(&flow)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path))?
                }
                None => println!("{}", json),
            }
        }
        Command::Validate { target } => {
            let path = Utf8PathBuf::from(&target);
            let flow = if path.is_file() {
                read_flow_file(&path)?
            } else {
                adapter.load(&FlowId::from(target.as_str()))?
            };
            let issues = flow.graph.validate();
            for issue in &issues {
                let level = if issue.is_error() { "error" } else { "warning" };
                println!("{}: {}", level, issue);
            }
            let errors = issues.iter().filter(|i| i.is_error()).count();
            if errors > 0 {
                anyhow::bail!("{} has {} error(s)", flow.name, errors);
            }
            println!("{}: ok", flow.name);
        }
        Command::Duplicate { id } => {
            let copy = adapter.duplicate(&FlowId::from(id.as_str()))?;
            println!("{}", copy.id);
        }
        Command::Activate { id } => {
            adapter.set_active(&FlowId::from(id.as_str()), true)?;
        }
        Command::Deactivate { id } => {
            adapter.set_active(&FlowId::from(id.as_str()), false)?;
        }
        Command::Delete { id } => {
            adapter.delete(&FlowId::from(id.as_str()))?;
        }
        Command::Edit { id, new } => {
            let session = match (id, new) {
                (Some(id), _) => {
                    EditorSession::open(adapter.load(&FlowId::from(id.as_str()))?, config)
                }
                // Not stored yet, so the session starts out unsaved.
                (None, Some(name)) => EditorSession::new(name, config),
                (None, None) => anyhow::bail!("Pass a flow id or --new <NAME>"),
            };
            edit(session)?;
        }
    }
    Ok(())
}

fn read_flow_file(path: &Utf8PathBuf) -> Result<Flow> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    persistence::from_json(&text).with_context(|| format!("Failed to parse {}", path))
}

fn print_flow(flow: &Flow) {
    println!("{} ({:?})", flow.name, flow.status);
    for n in &flow.graph.nodes {
        println!(
            "  node {:>3}  {:<10} at ({}, {}){}",
            n.id,
            n.node_type(),
            n.x,
            n.y,
            if n.collapsed { " collapsed" } else { "" }
        );
    }
    for c in &flow.graph.connections {
        let label = flow
            .graph
            .node(c.source_node_id)
            .and_then(|n| n.kind.output_label(c.output_index))
            .unwrap_or_default();
        println!(
            "  edge {:>3}  {} [{}] {} -> {}",
            c.id, c.source_node_id, c.output_index, label, c.target_node_id
        );
    }
    for issue in flow.graph.validate() {
        println!("  {}: {}", if issue.is_error() { "error" } else { "warning" }, issue);
    }
}

#[cfg(feature = "egui")]
fn edit(session: EditorSession) -> Result<()> {
    let store = FsFlowStore::open(session.config.store_dir.clone())?;
    leadflow::ui::run(session, store)
}

#[cfg(not(feature = "egui"))]
fn edit(_session: EditorSession) -> Result<()> {
    anyhow::bail!("The interactive editor requires the 'egui' feature. Try: cargo run --features egui -- edit <ID>")
}
