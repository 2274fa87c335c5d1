use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use service_model::config::Config;
use service_model::repository::{
    state_from_directives, RecordMetadata, RelationMode, Value,
};
use service_model::Error;

pub async fn execute(model: &str, directives: &Path, config: Option<&Path>) -> Result<()> {
    let config = super::load_config(config)?;
    let raw = fs::read_to_string(directives)
        .with_context(|| format!("Failed to read directives from {}", directives.display()))?;

    let explained = explain(&config, model, &raw)?;
    println!("{}", serde_json::to_string_pretty(&explained)?);
    Ok(())
}

/// Resolve `raw` directives for `model` into a JSON description of the query
fn explain(config: &Config, model: &str, raw: &str) -> Result<serde_json::Value> {
    let definition = config
        .model(model)
        .ok_or_else(|| Error::ModelNotFound(model.to_string()))?;

    let directives: Value = serde_json::from_str(raw).context("Directives are not valid JSON")?;
    let mut state = state_from_directives(&directives)?;
    state.select_default(&definition.default_columns());

    let required = definition
        .required_relations()?
        .resolve(RelationMode::EagerLoad)?;

    Ok(serde_json::json!({
        "model": model,
        "table": definition.table(),
        "key": definition.key_name(),
        "query": state,
        "required_with": required,
    }))
}
