#![no_main]
use libfuzzer_sys::fuzz_target;
use tardelta::hash::config::SIMILARITY_PERCENT;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let args: Vec<String> = text
        .split_whitespace()
        .take(32)
        .map(str::to_string)
        .collect();
    let analyze = args.iter().any(|a| a == "analyze");

    // Whatever parses must resolve to usable analysis options.
    if let Some(opts) = tardelta::cli::fuzz_try_parse_args(&args) {
        assert!(opts.similarity_percent <= 100);
        if !analyze {
            assert_eq!(opts.similarity_percent, SIMILARITY_PERCENT);
            assert!(opts.scratch_dir.is_none());
        }
    }
});
