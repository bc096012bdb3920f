#![no_main]
use libfuzzer_sys::fuzz_target;
use tardelta::archive::scan::scan_archive;

fuzz_target!(|data: &[u8]| {
    // Arbitrary (possibly gzip-framed) bytes: the scanner may reject them,
    // but every inventory it does return must be internally consistent.
    if let Ok(inventory) = scan_archive(data) {
        let mut last = 0;
        for file in inventory.files() {
            assert!(file.size > 0);
            assert!(file.size >= last);
            last = file.size;
            assert_eq!(file.chunks.iter().map(|c| c.size).sum::<u64>(), file.size);
        }
    }
});
