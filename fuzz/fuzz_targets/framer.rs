#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use dnspipe_collector::config::{CollectorConfigBuilder, CollectorMode, LengthPrefix};
use dnspipe_collector::decoder::DecodeContext;
use dnspipe_collector::{Framer, StreamEnd};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    wide_prefix: bool,
    dns_mode: bool,
    /// 최대 프레임 크기 (0은 1로 보정)
    max_frame: u16,
    stream: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let prefix = if input.wide_prefix {
        LengthPrefix::U32
    } else {
        LengthPrefix::U16
    };
    let mode = if input.dns_mode {
        CollectorMode::DnsWire
    } else {
        CollectorMode::PowerDns
    };
    let Ok(config) = CollectorConfigBuilder::new()
        .name("fuzz")
        .mode(mode)
        .length_prefix(prefix)
        .max_frame_size(usize::from(input.max_frame.max(1)))
        .build()
    else {
        return;
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    runtime.block_on(async {
        let ctx = DecodeContext::new("fuzz", "127.0.0.1:6001".parse().unwrap());
        let framer = Framer::new(&config, ctx);
        // 입력이 모두 레코드가 되어도 막히지 않을 만큼의 용량
        let (tx, mut rx) = mpsc::channel(input.stream.len() / 3 + 1);
        let cancel = CancellationToken::new();

        let mut reader = input.stream.as_slice();
        let result = framer.run(&mut reader, &tx, &cancel).await;
        drop(tx);

        // 프레임마다 최소 접두어 + 1바이트
        let mut records = 0usize;
        while rx.recv().await.is_some() {
            records += 1;
        }
        assert!(records <= input.stream.len() / (prefix.width() + 1));

        if let Ok(end) = result {
            assert_eq!(end, StreamEnd::Eof);
        }
    });
});
