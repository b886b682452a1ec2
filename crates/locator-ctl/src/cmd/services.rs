//! Service table and resolution.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
struct ServicesResponse {
    services: BTreeMap<String, ServiceInfo>,
}

#[derive(Deserialize)]
struct ServiceInfo {
    endpoint: Endpoint,
    version: u32,
    methods: BTreeMap<u32, String>,
}

#[derive(Deserialize)]
struct Endpoint {
    host: String,
    port: u16,
}

fn print_service(name: &str, info: &ServiceInfo) {
    println!("  ┌─ {}", name);
    println!("  │  endpoint : {}:{}", info.endpoint.host, info.endpoint.port);
    println!("  │  version  : {}", info.version);
    if info.methods.is_empty() {
        println!("  └─ methods  : none");
    } else {
        let methods: Vec<String> = info
            .methods
            .iter()
            .map(|(id, name)| format!("{}={}", id, name))
            .collect();
        println!("  └─ methods  : {}", methods.join(", "));
    }
}

pub async fn cmd_services(port: u16) -> Result<()> {
    let resp: ServicesResponse = get_json(&format!("{}/services", base_url(port))).await?;

    if resp.services.is_empty() {
        println!("No services attached.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Local Services ({})", resp.services.len());
    println!("═══════════════════════════════════════");
    for (name, info) in &resp.services {
        print_service(name, info);
    }

    Ok(())
}

pub async fn cmd_resolve(port: u16, name: &str) -> Result<()> {
    let info: ServiceInfo = get_json(&format!("{}/services/{}", base_url(port), name)).await?;
    print_service(name, &info);
    Ok(())
}
