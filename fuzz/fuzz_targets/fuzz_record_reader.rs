#![no_main]

use libfuzzer_sys::fuzz_target;
use milli_tls::tcp_tls::record::{self, RecordReader};

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let chunk = (split as usize).max(1);

    let mut reader = RecordReader::new();
    'feed: for piece in rest.chunks(chunk) {
        reader.feed(piece);
        loop {
            match reader.next_record() {
                Ok(Some(r)) => {
                    assert_eq!(r.payload.len(), r.header.length as usize);
                    let _ = record::split_inner_plaintext(&r.payload);
                }
                Ok(None) => break,
                Err(_) => break 'feed,
            }
        }
    }
    assert!(reader.buffered() <= rest.len());
});
