use anyhow::{Context, Result};
use serde_json::json;
use std::path::PathBuf;

use crate::cli_utils::{format_bytes, format_unix_timestamp, open_reader};

pub fn cmd_inspect(database: PathBuf, json_output: bool, mmap: bool) -> Result<()> {
    let reader = open_reader(&database, mmap)?;
    let metadata = reader
        .metadata()
        .context("Database was closed while inspecting")?;

    // On-disk size, compressed for .gz files
    let file_size = std::fs::metadata(&database)
        .map(|m| m.len() as usize)
        .unwrap_or(0);

    if json_output {
        let output = json!({
            "file": database.display().to_string(),
            "file_size": file_size,
            "metadata": metadata,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("Database:  {}", database.display());
    println!("File size: {}", format_bytes(file_size));
    println!();
    println!("Metadata:");
    println!("  Database type:   {}", metadata.database_type);
    println!(
        "  Format version:  {}.{}",
        metadata.binary_format_major_version, metadata.binary_format_minor_version
    );
    println!("  IP version:      IPv{}", metadata.ip_version);
    println!("  Node count:      {}", metadata.node_count);
    println!("  Record size:     {} bits", metadata.record_size);
    println!(
        "  Build time:      {} ({})",
        format_unix_timestamp(metadata.build_epoch),
        metadata.build_epoch
    );
    if !metadata.languages.is_empty() {
        println!("  Languages:       {}", metadata.languages.join(", "));
    }
    if !metadata.description.is_empty() {
        println!("  Description:");
        for (lang, desc) in &metadata.description {
            println!("    {}: {}", lang, desc);
        }
    }

    Ok(())
}
