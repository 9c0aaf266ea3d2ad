use crate::utils;
use colored::Colorize;
use std::path::Path;

pub fn handle(config: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", "Validating cluster file...".blue());

    let (path, config) = match utils::load_config(config) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Invalid configuration".red().bold());
            eprintln!("  {:#}", e);
            std::process::exit(1);
        }
    };

    println!("{}", "✓ Cluster file is valid".green().bold());
    println!();
    println!("Summary:");
    println!("  File: {}", path.display().to_string().cyan());
    println!("  Provider: {}", config.provider.cloud.to_string().cyan());
    if let Some(region) = &config.provider.region {
        println!("    region: {}", region);
    }
    if let Some(zone) = &config.provider.zone {
        println!("    zone: {}", zone);
    }
    println!("  Product: {}", config.product.to_string().cyan());
    if config.product.needs_infrastructure() {
        println!(
            "    key pair: {}",
            config.infra.private_key_path().display()
        );
        if let Some(instance_type) = &config.infra.instance_type {
            println!("    instance type: {}", instance_type);
        }
    }
    match config.product {
        perconaflow_config::Product::PerconaServer => {
            println!("    nodes: {}", config.cluster.size);
            println!("    replication: {}", config.cluster.replication_type.as_str());
            if config.cluster.orchestrator_size > 0 {
                println!("    orchestrator nodes: {}", config.cluster.orchestrator_size);
            }
        }
        perconaflow_config::Product::XtraDbCluster => {
            println!("    nodes: {}", config.cluster.size);
        }
        perconaflow_config::Product::Monitoring | perconaflow_config::Product::MonitoringRds => {}
    }
    if let Some(version) = &config.cluster.version {
        println!("    version: {}", version);
    }

    Ok(())
}
