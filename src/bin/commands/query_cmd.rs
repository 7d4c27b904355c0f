use anyhow::{Context, Result};
use geolookup::fields::{
    asn_from_record, city_from_record, country_from_record, whois_from_result,
};
use geolookup::LookupResult;
use serde_json::json;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::cli_utils::open_reader;
use crate::Field;

pub fn cmd_query(
    database: PathBuf,
    ip: String,
    field: Field,
    quiet: bool,
    mmap: bool,
) -> Result<()> {
    let ip: IpAddr = ip
        .trim()
        .parse()
        .with_context(|| format!("Invalid IP address: {}", ip))?;

    let reader = open_reader(&database, mmap)?;

    let result = reader
        .lookup(ip)
        .with_context(|| format!("Query failed for: {}", ip))?;
    let found = result.is_some();

    if quiet {
        std::process::exit(if found { 0 } else { 1 });
    }

    // Field views print their zero value on a miss, raw prints null
    let output = match (field, &result) {
        (Field::Raw, Some(result)) => raw_json(result),
        (Field::Raw, None) => serde_json::Value::Null,
        (Field::Country, r) => json!({
            "country": r.as_ref().map(|r| country_from_record(&r.data)).unwrap_or_default()
        }),
        (Field::Asn, r) => serde_json::to_value(
            r.as_ref().map(|r| asn_from_record(&r.data)).unwrap_or_default(),
        )?,
        (Field::City, r) => serde_json::to_value(
            r.as_ref().map(|r| city_from_record(&r.data)).unwrap_or_default(),
        )?,
        (Field::Whois, r) => {
            serde_json::to_value(r.as_ref().map(whois_from_result).unwrap_or_default())?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);

    std::process::exit(if found { 0 } else { 1 });
}

fn raw_json(result: &LookupResult) -> serde_json::Value {
    json!({
        "network": result.network,
        "prefix_len": result.prefix_len,
        "data": result.data.to_json(),
    })
}
