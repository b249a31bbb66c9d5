#![no_main]

use libfuzzer_sys::fuzz_target;
use sessionkeep_core::snapshot::SnapshotExtractor;
use sessionkeep_core::topology::{SessionName, TopologyModel};
use sessionkeep_core::watcher::WatchEvent;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(session) = SessionName::new("fuzz") else {
        return;
    };

    // Any payload either fails cleanly or yields a model that survives the
    // store encoding unchanged.
    if let Ok(model) = SnapshotExtractor::default().extract(&session, text) {
        assert!(model.validate().is_ok());
        let doc = model.tabs_json().expect("valid model encodes");
        let decoded = TopologyModel::from_tabs_json(session.clone(), &doc)
            .expect("encoded model decodes")
            .expect("encoded model is valid");
        assert_eq!(decoded, model);
    }

    // Event decoding shares the same untrusted input path.
    let _ = serde_json::from_str::<WatchEvent>(text);
});
