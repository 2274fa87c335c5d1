use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use service_model::config::Config;
use service_model::repository::RecordMetadata;

pub async fn execute(config: Option<&Path>) -> Result<()> {
    let config = super::load_config(config)?;
    print!("{}", render(&config));
    Ok(())
}

fn render(config: &Config) -> String {
    if config.models.is_empty() {
        return format!("{}\n", "No models configured".yellow());
    }

    let mut out = String::new();
    for (name, model) in &config.models {
        out.push_str(&format!("{}\n", name.green().bold()));
        out.push_str(&format!("  table:    {}\n", model.table()));
        out.push_str(&format!("  key:      {}\n", model.key_name()));
        out.push_str(&format!("  fillable: {}\n", model.fillable().join(", ")));
        if config.rules_for(name).is_some() {
            out.push_str(&format!("  {}\n", "validated".cyan()));
        }
    }
    out
}
