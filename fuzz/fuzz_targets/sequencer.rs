#![no_main]

use functor_pool::{PoolError, Sequencer};
use libfuzzer_sys::fuzz_target;

const MAX_SEQ: u64 = 64;

fuzz_target!(|data: &[u8]| {
    let mut sequencer = Sequencer::new();
    let mut seen = [false; MAX_SEQ as usize];
    let mut expected = 0u64;

    for &byte in data {
        let seq = u64::from(byte) % MAX_SEQ;
        match sequencer.submit(seq, seq) {
            Ok(released) => {
                assert!(!seen[seq as usize], "duplicate {} accepted", seq);
                seen[seq as usize] = true;
                for payload in released {
                    assert_eq!(payload, expected);
                    expected += 1;
                }
            }
            Err(PoolError::DuplicateSequence { .. }) => {
                assert!(seen[seq as usize], "fresh {} rejected", seq);
            }
            Err(other) => panic!("unexpected error: {}", other),
        }
    }

    assert_eq!(sequencer.next_expected(), expected);
});
