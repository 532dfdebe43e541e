#![no_main]

use libfuzzer_sys::fuzz_target;

use dnspipe_collector::decoder::dns_wire::DnsWireDecoder;
use dnspipe_collector::decoder::{DecodeContext, PayloadDecoder};

fuzz_target!(|data: &[u8]| {
    let ctx = DecodeContext::new("fuzz", "[::1]:6002".parse().unwrap());
    let record = DnsWireDecoder.decode(data, &ctx);

    assert_eq!(record.length, data.len());
    let _ = record.to_text_line();
});
