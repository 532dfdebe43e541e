//! 도메인 정규화 단계

use dnspipe_core::pipeline::{TransformOutcome, Transformer};
use dnspipe_core::record::Record;

/// qname 소문자 변환 단계 이름
pub const TRANSFORM_QNAME_LOWERCASE: &str = "qname-lowercase";

/// qname을 ASCII 소문자로 변환합니다.
///
/// 결과 블록을 만들지 않고 레코드 필드를 직접 수정합니다.
#[derive(Debug, Default)]
pub struct QnameLowercase;

impl Transformer for QnameLowercase {
    fn name(&self) -> &str {
        TRANSFORM_QNAME_LOWERCASE
    }

    fn process(&mut self, record: &mut Record) -> TransformOutcome {
        record.qname.make_ascii_lowercase();
        TransformOutcome::Keep
    }
}
