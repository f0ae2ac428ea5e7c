pub mod count;
pub mod find_in;
pub mod ping;
pub mod search;

use std::path::Path;

use anyhow::{Context, bail};
use mongrid::MongoConfig;
use mongrid::mongodb::bson::{Bson, Document};

/// Database and collection a command operates on.
#[derive(clap::Args, Debug, Clone)]
pub struct Target {
    /// Database name
    #[arg(long)]
    pub db: String,
    /// Collection name
    #[arg(long)]
    pub coll: String,
}

/// Read configuration from `path` (or the environment) and apply CLI overrides.
pub fn load_config(
    path: Option<&Path>,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<MongoConfig> {
    let mut config = match path {
        Some(path) => MongoConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => MongoConfig::from_env().context("reading MONGRID_* environment")?,
    };
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    Ok(config)
}

/// Split `field=value`. The field must be non-empty; the value may be.
pub fn parse_pair(arg: &str) -> anyhow::Result<(String, String)> {
    match arg.split_once('=') {
        Some((field, value)) if !field.is_empty() => Ok((field.to_string(), value.to_string())),
        _ => bail!("expected FIELD=VALUE, got {arg:?}"),
    }
}

/// One JSON line per document, relaxed extended JSON.
pub fn print_documents(documents: Vec<Document>) -> anyhow::Result<()> {
    for document in documents {
        println!("{}", serde_json::to_string(&document_to_json(document))?);
    }
    Ok(())
}

pub fn document_to_json(document: Document) -> serde_json::Value {
    Bson::Document(document).into_relaxed_extjson()
}
