use crate::utils;
use colored::Colorize;
use perconaflow_cluster::ClusterFacade;
use std::path::Path;
use std::time::Duration;

pub async fn handle(config: Option<&Path>) -> anyhow::Result<()> {
    let (path, config) = utils::load_config(config)?;
    utils::print_loaded_config(&path);

    let cancel = utils::cancel_on_ctrl_c();
    let cloud = utils::build_provider(&config.provider, cancel.clone())?;
    let facade = ClusterFacade::new(cloud, cancel);

    eprintln!(
        "{} {} on {}",
        "Creating".green().bold(),
        config.product.to_string().cyan(),
        config.provider.cloud
    );
    let created = match facade.create(&config).await {
        Ok(created) => created,
        Err(e) => {
            eprintln!("{}", "✗ Create failed".red().bold());
            if let Some(resource_id) = e.resource_id() {
                eprintln!("  ResourceID: {}", resource_id.to_string().cyan());
                eprintln!("  clean up with: perconaflow destroy --id {}", resource_id);
            }
            return Err(e.into());
        }
    };

    eprintln!(
        "{} {} in {}s",
        "✓ Created".green().bold(),
        created.resource_id.to_string().cyan(),
        created.duration_ms / 1000
    );
    eprintln!(
        "  destroy with: perconaflow destroy --id {}",
        created.resource_id
    );
    println!("{}", serde_json::to_string_pretty(&created)?);

    facade.flush_telemetry(Duration::from_secs(5)).await;
    Ok(())
}
