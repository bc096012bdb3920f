#![no_main]
use libfuzzer_sys::fuzz_target;
use tardelta::hash::chunker::{Chunker, chunk_bytes, verify_coverage};
use tardelta::hash::config::WINDOW_SIZE;
use tardelta::hash::rolling::Rollsum;

fuzz_target!(|data: &[u8]| {
    // Chunks must tile the input whatever its content.
    let chunks = chunk_bytes(data);
    verify_coverage(&chunks, data.len() as u64).unwrap();

    // Feeding the same bytes in two writes must not move any boundary.
    let split = data.first().map_or(0, |&b| b as usize).min(data.len());
    let mut chunker = Chunker::new();
    chunker.update(&data[..split]);
    chunker.update(&data[split..]);
    assert_eq!(chunker.finish(), chunks);

    // The rollsum only remembers its window.
    if data.len() >= WINDOW_SIZE {
        let mut whole = Rollsum::new();
        data.iter().for_each(|&b| whole.roll(b));
        let mut tail = Rollsum::new();
        data[data.len() - WINDOW_SIZE..]
            .iter()
            .for_each(|&b| tail.roll(b));
        assert_eq!(whole.digest(), tail.digest());
    }
});
