//! 세그먼트 분할 계획
//!
//! 길이 `len`의 스트림은 `ceil(len / mss)`개의 데이터 세그먼트(시퀀스 0부터)와
//! 그 다음 번호의 0바이트 종료 마커로 나뉜다. `len`이 `mss`의 배수여도
//! 여분의 풀사이즈 읽기는 없다.

use crate::{Error, Result};

/// 세그먼트 하나
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRange {
    pub sequence: i32,
    pub offset: u64,
    pub len: usize,
}

impl SegmentRange {
    pub fn is_end_of_stream(&self) -> bool {
        self.len == 0
    }
}

/// 스트림 길이와 MSS로부터 만든 세그먼트 계획
#[derive(Debug, Clone, Copy)]
pub struct SegmentPlan {
    length: u64,
    mss: usize,
    data_segments: u64,
}

impl SegmentPlan {
    pub fn new(length: u64, mss: usize) -> Result<Self> {
        if mss == 0 {
            return Err(Error::InvalidConfig("mss는 0일 수 없음".into()));
        }

        let data_segments = length.div_ceil(mss as u64);
        // 종료 마커까지 i32 시퀀스 공간 안에 들어가야 함
        if data_segments >= i32::MAX as u64 {
            return Err(Error::TooManySegments {
                count: data_segments + 1,
            });
        }

        Ok(Self {
            length,
            mss,
            data_segments,
        })
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    /// 데이터 세그먼트 수 (종료 마커 제외)
    pub fn data_segments(&self) -> u64 {
        self.data_segments
    }

    /// 종료 마커 포함 전체 세그먼트 수
    pub fn total_segments(&self) -> u64 {
        self.data_segments + 1
    }

    /// 종료 마커의 시퀀스 번호
    pub fn end_sequence(&self) -> i32 {
        self.data_segments as i32
    }

    /// 시퀀스 순서대로 모든 세그먼트 (마지막은 종료 마커)
    pub fn iter(&self) -> impl Iterator<Item = SegmentRange> + '_ {
        (0..self.total_segments()).map(move |index| {
            let offset = (index * self.mss as u64).min(self.length);
            let len = (self.length - offset).min(self.mss as u64) as usize;
            SegmentRange {
                sequence: index as i32,
                offset,
                len,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lens(plan: &SegmentPlan) -> Vec<usize> {
        plan.iter().map(|s| s.len).collect()
    }

    #[test]
    fn test_empty_stream() {
        let plan = SegmentPlan::new(0, 500).unwrap();
        assert_eq!(plan.total_segments(), 1);
        assert_eq!(plan.end_sequence(), 0);

        let only = plan.iter().next().unwrap();
        assert!(only.is_end_of_stream());
        assert_eq!(only.sequence, 0);
    }

    #[test]
    fn test_exact_multiple() {
        let plan = SegmentPlan::new(1000, 500).unwrap();
        assert_eq!(plan.data_segments(), 2);
        assert_eq!(lens(&plan), vec![500, 500, 0]);
        assert_eq!(plan.end_sequence(), 2);
    }

    #[test]
    fn test_exactly_one_mss() {
        let plan = SegmentPlan::new(500, 500).unwrap();
        assert_eq!(lens(&plan), vec![500, 0]);
    }

    #[test]
    fn test_remainder() {
        let plan = SegmentPlan::new(1201, 500).unwrap();
        assert_eq!(plan.data_segments(), 3);
        assert_eq!(lens(&plan), vec![500, 500, 201, 0]);

        let offsets: Vec<u64> = plan.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0, 500, 1000, 1201]);

        let sequences: Vec<i32> = plan.iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_sequence_space_exhausted() {
        let err = SegmentPlan::new(u64::MAX / 2, 1).unwrap_err();
        assert!(matches!(err, Error::TooManySegments { .. }));
    }
}
