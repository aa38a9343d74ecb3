//! 16비트 1의 보수 체크섬
//!
//! 송신자와 수신자가 동일한 함수로 생성/검증한다.

/// 버퍼 전체의 체크섬 계산
///
/// 연속된 두 바이트를 big-endian 16비트 워드로 묶어 mod 2^16으로 더하고
/// (자리올림은 버림), 길이가 홀수이면 마지막 바이트 뒤를 0으로 채운다.
/// 결과는 합의 1의 보수. 빈 버퍼는 `!0 = 0xFFFF`.
pub fn checksum(data: &[u8]) -> u16 {
    !word_sum(data)
}

/// 수신 데이터 검증
pub fn verify(data: &[u8], expected: u16) -> bool {
    checksum(data) == expected
}

fn word_sum(data: &[u8]) -> u16 {
    let mut words = data.chunks_exact(2);
    let mut sum = (&mut words).fold(0u16, |sum, word| {
        sum.wrapping_add(u16::from_be_bytes([word[0], word[1]]))
    });
    if let [last] = words.remainder() {
        sum = sum.wrapping_add(u16::from_be_bytes([*last, 0]));
    }
    sum
}
