//! Decoder fuzz target: arbitrary bytes against the registry of the demo schemas.
//! Decoding must fail with a CodecError, never panic or over-allocate.
//! Build with: cargo fuzz run decode_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
static REGISTRY: std::sync::OnceLock<bluepacket::Registry> = std::sync::OnceLock::new();

#[cfg(fuzzing)]
fn registry() -> &'static bluepacket::Registry {
    REGISTRY.get_or_init(|| {
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../tests/data");
        let files = [dir.join("DemoPacket.bp"), dir.join("DemoPacket2.bp"), dir.join("DemoEnum260.bp")];
        let schema = bluepacket::parse_files(&files).expect("parse demo schemas");
        let codec = bluepacket::Codec::new(bluepacket::ResolvedSchema::resolve(schema).expect("resolve"));
        codec.registry().expect("registry")
    })
}

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let _ = registry().deserialize(data);
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run decode_fuzz");
}
