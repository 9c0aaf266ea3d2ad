use crate::utils;
use colored::Colorize;
use perconaflow_cloud::ResourceId;
use perconaflow_cluster::ClusterFacade;
use std::path::Path;

pub async fn handle(config: Option<&Path>, id: &str) -> anyhow::Result<()> {
    let id = id.trim();
    if id.is_empty() {
        anyhow::bail!("--id must not be empty");
    }
    let resource_id = ResourceId::new(id);

    let (path, config) = utils::load_config(config)?;
    utils::print_loaded_config(&path);

    let cancel = utils::cancel_on_ctrl_c();
    let cloud = utils::build_provider(&config.provider, cancel.clone())?;
    let facade = ClusterFacade::new(cloud, cancel);

    eprintln!(
        "{} {} on {}",
        "Destroying".yellow().bold(),
        resource_id.to_string().cyan(),
        config.provider.cloud
    );
    facade.destroy(&config, &resource_id).await?;
    eprintln!("{} {}", "✓ Destroyed".green().bold(), resource_id);
    Ok(())
}
