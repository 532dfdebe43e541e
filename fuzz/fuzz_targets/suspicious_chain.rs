#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use dnspipe_core::record::{Record, SuspiciousFlag};
use dnspipe_transform::{SuspiciousConfigBuilder, TransformConfig, TransformerChain};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    qname: String,
    qtype: String,
    length: u16,
    malformed: bool,
    threshold_qname_len: u8,
    threshold_packet_len: u16,
    threshold_max_labels: u8,
    lowercase: bool,
}

fuzz_target!(|input: FuzzInput| {
    let Ok(suspicious) = SuspiciousConfigBuilder::new()
        .enabled(true)
        .threshold_qname_len(usize::from(input.threshold_qname_len))
        .threshold_packet_len(usize::from(input.threshold_packet_len))
        .threshold_max_labels(usize::from(input.threshold_max_labels))
        .build()
    else {
        return;
    };
    let mut config = TransformConfig::default();
    config.suspicious = suspicious;
    config.normalize.qname_lowercase = input.lowercase;

    let mut record = Record::new("fuzz");
    record.qname = input.qname;
    record.qtype = input.qtype;
    record.length = usize::from(input.length);
    record.malformed = input.malformed;

    let mut chain = TransformerChain::from_config(&config);
    chain.process(&mut record);

    let block = record.suspicious().expect("suspicious block is always attached");
    assert_eq!(block.score() as usize, block.flags().len());
    assert_eq!(block.is_set(SuspiciousFlag::MalformedPacket), input.malformed);
    assert!(!block.is_set(SuspiciousFlag::SlowDomain));
});
