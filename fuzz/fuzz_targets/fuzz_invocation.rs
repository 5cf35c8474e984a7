#![no_main]

use libfuzzer_sys::fuzz_target;
use planning_poker_client::protocol::Invocation;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(invocation) = serde_json::from_str::<Invocation>(s) {
            let _ = invocation.command.name();
        }
    }
});
