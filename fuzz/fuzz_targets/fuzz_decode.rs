#![no_main]
use geolookup::Decoder;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte picks the pointer base, the rest is the buffer
    let base = data[0] as usize;
    let buffer = &data[1..];
    let decoder = Decoder::new(buffer, base);

    let mut offset = 0;
    while offset < buffer.len() {
        match decoder.decode(offset) {
            Ok((_, next)) if next > offset => offset = next,
            _ => break,
        }
    }
});
