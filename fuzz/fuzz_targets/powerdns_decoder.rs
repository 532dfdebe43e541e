#![no_main]

use libfuzzer_sys::fuzz_target;

use dnspipe_collector::decoder::powerdns::PowerDnsDecoder;
use dnspipe_collector::decoder::{DecodeContext, PayloadDecoder};

fuzz_target!(|data: &[u8]| {
    let ctx = DecodeContext::new("fuzz", "127.0.0.1:6001".parse().unwrap());
    let record = PowerDnsDecoder.decode(data, &ctx);

    // 손상 레코드도 길이는 보존
    if record.malformed {
        assert_eq!(record.length, data.len());
    }
    let _ = record.to_text_line();
    let _ = record.to_json();
});
