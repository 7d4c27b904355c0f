//! Field extraction for GeoIP records
//!
//! Each adapter pulls a few well-known keys out of a decoded record and
//! tolerates both the modern nested GeoIP2 schema and flat/legacy layouts
//! by trying alternate keys in a fixed order. Missing keys yield the
//! field's zero value.
//!
//! The `Reader::lookup_*` methods never return errors: an unknown address,
//! a closed reader or a corrupt record all produce an empty result, so
//! access-control callers can treat "unknown" uniformly.

use crate::data_section::DecodedValue;
use crate::reader::{LookupResult, Reader};
use serde::Serialize;
use std::net::IpAddr;

/// Autonomous system of an address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AsnInfo {
    /// AS number, 0 when unknown
    pub number: u32,
    /// Organization operating the AS
    pub organization: String,
}

/// City-level location of an address
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CityInfo {
    /// English city name
    pub city: String,
    /// English name of the first (largest) subdivision
    pub region: String,
    /// Postal code
    pub postal_code: String,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// IANA time zone, e.g. "Europe/Berlin"
    pub time_zone: String,
}

/// Registration (WHOIS) information of an address
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WhoisInfo {
    /// Organization the network is registered to
    pub organization: String,
    /// Registered network block in CIDR notation
    pub net_block: String,
}

const COUNTRY_PATHS: &[&[&str]] = &[
    &["country", "iso_code"],
    &["iso_code"],
    &["country_code"],
    &["registered_country", "iso_code"],
];

const ASN_NUMBER_KEYS: &[&str] = &["autonomous_system_number", "asn"];
const ASN_ORG_KEYS: &[&str] = &["autonomous_system_organization", "as_org", "name"];

const WHOIS_ORG_KEYS: &[&str] = &[
    "organization",
    "org",
    "org_name",
    "isp",
    "autonomous_system_organization",
    "name",
];
const WHOIS_NET_KEYS: &[&str] = &["network", "net_block", "netblock", "cidr", "route"];

/// First non-empty string found under any of `paths`
fn first_string(record: &DecodedValue, paths: &[&[&str]]) -> Option<String> {
    paths
        .iter()
        .filter_map(|path| record.path(path).and_then(DecodedValue::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_key_string(record: &DecodedValue, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.get(key).and_then(DecodedValue::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Country ISO code from a record
pub fn country_from_record(record: &DecodedValue) -> String {
    if let Some(code) = first_string(record, COUNTRY_PATHS) {
        return code;
    }
    match record.as_str() {
        Some(code) if code.chars().count() == 2 => code.to_string(),
        _ => String::new(),
    }
}

/// AS number and organization from a record
pub fn asn_from_record(record: &DecodedValue) -> AsnInfo {
    let number = ASN_NUMBER_KEYS
        .iter()
        .filter_map(|key| record.get(key))
        .find_map(as_number)
        .unwrap_or(0);

    AsnInfo {
        number,
        organization: first_key_string(record, ASN_ORG_KEYS).unwrap_or_default(),
    }
}

/// AS numbers appear as integers of any width or as strings like "AS13335"
fn as_number(value: &DecodedValue) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    let s = value.as_str()?.trim();
    let digits = s
        .strip_prefix("AS")
        .or_else(|| s.strip_prefix("as"))
        .unwrap_or(s);
    digits.parse().ok()
}

/// City, region, postal code, coordinates and time zone from a record
///
/// Every field is extracted independently; partial records are normal.
pub fn city_from_record(record: &DecodedValue) -> CityInfo {
    let string_at = |path: &[&str]| {
        record
            .path(path)
            .and_then(DecodedValue::as_str)
            .unwrap_or_default()
            .to_string()
    };
    let float_at = |path: &[&str]| {
        record
            .path(path)
            .and_then(DecodedValue::as_f64)
            .unwrap_or(0.0)
    };

    let region = record
        .get("subdivisions")
        .and_then(DecodedValue::as_array)
        .and_then(|subdivisions| subdivisions.first())
        .and_then(|first| first.path(&["names", "en"]))
        .and_then(DecodedValue::as_str)
        .unwrap_or_default()
        .to_string();

    CityInfo {
        city: string_at(&["city", "names", "en"]),
        region,
        postal_code: string_at(&["postal", "code"]),
        latitude: float_at(&["location", "latitude"]),
        longitude: float_at(&["location", "longitude"]),
        time_zone: string_at(&["location", "time_zone"]),
    }
}

/// Registered organization and network block from a lookup result
///
/// Without an explicit network key the matched trie network is used.
pub fn whois_from_result(result: &LookupResult) -> WhoisInfo {
    let record = &result.data;
    WhoisInfo {
        organization: first_key_string(record, WHOIS_ORG_KEYS).unwrap_or_default(),
        net_block: first_key_string(record, WHOIS_NET_KEYS)
            .unwrap_or_else(|| result.network.clone()),
    }
}

impl Reader {
    /// Run a lookup and map the record, swallowing misses and errors
    fn extract<T: Default>(&self, ip: IpAddr, f: impl FnOnce(&LookupResult) -> T) -> T {
        match self.lookup(ip) {
            Ok(Some(result)) => f(&result),
            Ok(None) => T::default(),
            Err(e) => {
                tracing::debug!(%ip, error = %e, "GeoIP lookup failed, returning empty result");
                T::default()
            }
        }
    }

    /// ISO 3166-1 country code of an address, empty when unknown
    pub fn lookup_country(&self, ip: IpAddr) -> String {
        self.extract(ip, |r| country_from_record(&r.data))
    }

    /// Autonomous system of an address, zero/empty when unknown
    pub fn lookup_asn(&self, ip: IpAddr) -> AsnInfo {
        self.extract(ip, |r| asn_from_record(&r.data))
    }

    /// City-level location of an address, zero/empty when unknown
    pub fn lookup_city(&self, ip: IpAddr) -> CityInfo {
        self.extract(ip, |r| city_from_record(&r.data))
    }

    /// Registration info of an address, empty when unknown
    pub fn lookup_whois(&self, ip: IpAddr) -> WhoisInfo {
        self.extract(ip, whois_from_result)
    }
}
