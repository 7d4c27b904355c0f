#![no_main]
use geolookup::Reader;
use libfuzzer_sys::fuzz_target;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

fuzz_target!(|data: &[u8]| {
    let Ok(reader) = Reader::from_bytes(data.to_vec()) else {
        return;
    };

    // Derive probe addresses from the input so the walk varies
    let mut v6 = [0u8; 16];
    for (dst, src) in v6.iter_mut().zip(data.iter().rev()) {
        *dst = *src;
    }
    let v4 = Ipv4Addr::new(v6[0], v6[1], v6[2], v6[3]);

    for ip in [IpAddr::V4(v4), IpAddr::V6(Ipv6Addr::from(v6))] {
        let _ = reader.lookup(ip);
        let _ = reader.lookup_country(ip);
        let _ = reader.lookup_city(ip);
        let _ = reader.lookup_asn(ip);
        let _ = reader.lookup_whois(ip);
    }

    reader.close();
    let _ = reader.lookup_country(IpAddr::V4(v4));
});
