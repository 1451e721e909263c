#![no_main]

use libfuzzer_sys::fuzz_target;
use milli_tls::tls::{extensions, messages};

fuzz_target!(|data: &[u8]| {
    // Parsers must never panic on any input.
    if let Ok((msg_type, body_len)) = messages::read_handshake_header(data) {
        if data.len() >= 4 + body_len {
            let body = &data[4..4 + body_len];
            match messages::HandshakeType::from_u8(msg_type) {
                Some(messages::HandshakeType::ServerHello) => {
                    if let Ok(sh) = messages::parse_server_hello(body) {
                        let _ = extensions::parse_server_hello_extensions(sh.extensions);
                    }
                }
                Some(messages::HandshakeType::Finished) => {
                    let _ = messages::parse_finished(body);
                }
                _ => {}
            }
        }
    }

    let _ = messages::parse_server_hello(data);
    let _ = extensions::parse_server_hello_extensions(data);

    let mut reassembler = messages::HandshakeReassembler::new();
    for piece in data.chunks(7) {
        reassembler.push(piece);
        while let Ok(Some(_)) = reassembler.next_message() {}
    }
});
