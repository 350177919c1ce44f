#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary frame payloads must never panic the parser
    let frame = String::from_utf8_lossy(data);
    if let Ok(cmd) = chatrelay::protocol::parse_command(&frame) {
        assert!(!cmd.name().is_empty());
    }
});
