#![no_main]

use libfuzzer_sys::fuzz_target;
use sessionkeep_core::config::Config;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Whatever parses and validates must render and parse back identically.
    if let Ok(config) = Config::from_toml(text) {
        let rendered = config.to_toml().expect("valid config renders");
        let reparsed = Config::from_toml(&rendered).expect("rendered config parses");
        assert_eq!(reparsed, config);
    }
});
