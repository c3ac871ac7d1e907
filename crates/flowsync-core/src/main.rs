use anyhow::Context;
use clap::{value_parser, Arg, ArgMatches, Command};
use flowsync_core::{
    GraphSession, GraphUpdate, ImportError, Importer, NewNode, NodeEditor, NodeUpdate,
    SessionScope, SyncConfig, SyncError, UpdateSink,
};
use flowsync_gateway::{GraphStore, MemoryStore, ObjectStore, RequiredFieldsValidator};
use flowsync_model::{ComponentRef, PortRef};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Writes every presentation event to stdout as one JSON line
struct JsonLines;

impl JsonLines {
    fn emit(value: &impl Serialize) {
        match serde_json::to_string(value) {
            Ok(line) => println!("{line}"),
            Err(err) => tracing::warn!(error = %err, "could not encode event"),
        }
    }
}

impl UpdateSink for JsonLines {
    fn graph_update(&self, update: GraphUpdate) {
        Self::emit(&update);
    }

    fn node_update(&self, update: NodeUpdate) {
        Self::emit(&update);
    }

    fn stream_failed(&self, error: &SyncError) {
        tracing::error!(error = %error, "change stream failed");
        Self::emit(&serde_json::json!({ "type": "STREAM_FAILED", "error": error.to_string() }));
    }
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("TOML file with session settings")
}

fn load_config(args: &ArgMatches) -> anyhow::Result<SyncConfig> {
    let Some(path) = args.get_one::<PathBuf>("config") else {
        return Ok(SyncConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    Ok(SyncConfig::from_toml_str(&raw)?)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn simulate(args: &ArgMatches) -> anyhow::Result<()> {
    let config = load_config(args)?;
    let project = args
        .get_one::<String>("project")
        .map_or("demo", String::as_str);
    let count = args.get_one::<usize>("nodes").copied().unwrap_or(3);
    let hold = Duration::from_millis(args.get_one::<u64>("hold-ms").copied().unwrap_or(2_500));

    let store = MemoryStore::new();
    let shared: Arc<dyn ObjectStore> = Arc::new(store.clone());
    let graph = store.create_graph(project, "Simulation").await?;

    let session = GraphSession::new(
        Arc::clone(&shared),
        Arc::new(RequiredFieldsValidator),
        Arc::new(JsonLines),
        config.clone(),
    );
    let initial = session
        .start(SessionScope::new(project, graph.name.as_str()))
        .await?;
    JsonLines::emit(&initial);

    let editor = NodeEditor::new(shared, config);
    let mut names = Vec::with_capacity(count);
    for i in 0..count {
        let component = if i == 0 { "source" } else { "filter" };
        #[allow(clippy::cast_precision_loss)]
        let request = NewNode::new(project, graph.name.as_str(), ComponentRef::new("common", component))
            .at(i as f64 * 160.0, 0.0);
        names.push(editor.add_node(request).await?.name);
    }
    for pair in names.windows(2) {
        editor
            .connect(&PortRef::new(pair[0].as_str(), "out"), &PortRef::new(pair[1].as_str(), "in"), None)
            .await?;
    }
    if let Some(first) = names.first() {
        editor.rotate_node(first).await?;
        editor.rename_node(first, "Entry").await?;
    }
    if let Some(last) = names.last() {
        editor.delete_node(last).await?;
    }

    tokio::time::sleep(hold).await;
    session.stop().await;
    Ok(())
}

async fn import(args: &ArgMatches) -> anyhow::Result<bool> {
    let config = load_config(args)?;
    let project = args
        .get_one::<String>("project")
        .map_or("imported", String::as_str);
    let path = args
        .get_one::<PathBuf>("path")
        .context("missing document path")?;
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading document {}", path.display()))?;

    let store = MemoryStore::new();
    let importer = Importer::new(&store, &config);
    match importer.import_json(project, &raw).await {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(true)
        }
        Err(ImportError::Partial { report }) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            tracing::error!(summary = %report.failure_summary(), "import partially failed");
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Command::new("flowsync")
        .version(flowsync_core::VERSION)
        .about("Flow graph synchronization core")
        .subcommand_required(true)
        .subcommand(
            Command::new("simulate")
                .about("Run a scripted editing session against an in-memory store")
                .arg(config_arg())
                .arg(
                    Arg::new("project")
                        .long("project")
                        .default_value("demo")
                        .help("Project to create the graph in"),
                )
                .arg(
                    Arg::new("nodes")
                        .long("nodes")
                        .default_value("3")
                        .value_parser(value_parser!(usize))
                        .help("Number of nodes to add and chain"),
                )
                .arg(
                    Arg::new("hold-ms")
                        .long("hold-ms")
                        .default_value("2500")
                        .value_parser(value_parser!(u64))
                        .help("How long to keep the session open after the script"),
                ),
        )
        .subcommand(
            Command::new("import")
                .about("Import an export document into an in-memory project")
                .arg(config_arg())
                .arg(
                    Arg::new("project")
                        .long("project")
                        .default_value("imported")
                        .help("Target project"),
                )
                .arg(
                    Arg::new("path")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Export document (JSON)"),
                ),
        );

    let matches = cli.get_matches();
    init_tracing();

    match matches.subcommand() {
        Some(("simulate", args)) => simulate(args).await,
        Some(("import", args)) => {
            if !import(args).await? {
                std::process::exit(1);
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
