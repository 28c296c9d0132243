//! Knowledge Context - 状态码判定
//!
//! 知识服务对两类作业返回整型状态码，语义各自独立:
//!
//! 切片 (indexType = 0):
//! - 0 / 3: 处理中
//! - 1: 失败
//! - 2: 切片完成，等待审核
//! - 5: 成功
//!
//! 向量化 (indexType = 1):
//! - 4: 失败
//! - 5: 成功
//! - 其余: 处理中
//!
//! 注意: 切片轮询在 1 / 2 / 5 任一出现时结束，向量化轮询只认 4 / 5。
//! 两套判定不要合并——状态码 2 只对切片阶段有"结束轮询"的含义。

use super::entities::FileStatus;

/// 切片: 该状态码是否结束轮询
pub fn slice_code_terminal(code: i32) -> bool {
    matches!(code, 1 | 2 | 5)
}

/// 切片: 该状态码是否为失败
pub fn slice_code_failed(code: i32) -> bool {
    code == 1
}

/// 向量化: 该状态码是否结束轮询
pub fn embed_code_terminal(code: i32) -> bool {
    matches!(code, 4 | 5)
}

/// 向量化: 该状态码是否为失败
pub fn embed_code_failed(code: i32) -> bool {
    code == 4
}

/// 向量化: 该状态码是否为成功
pub fn embed_code_success(code: i32) -> bool {
    code == 5
}

/// 快照中任一文件到达切片终态即停止轮询
///
/// 多文件批次中先完成的文件会结束循环，调用方必须再看
/// [`slice_failed_subset`] 才能知道整体成败，不能只看循环是否结束
pub fn slice_poll_finished(snapshot: &[FileStatus]) -> bool {
    snapshot.iter().any(|s| slice_code_terminal(s.status))
}

/// 每次快照重新推导的失败文件子集
pub fn slice_failed_subset(snapshot: &[FileStatus]) -> Vec<FileStatus> {
    snapshot
        .iter()
        .filter(|s| slice_code_failed(s.status))
        .cloned()
        .collect()
}

/// 快照中任一文件到达向量化终态即停止轮询
pub fn embed_poll_finished(snapshot: &[FileStatus]) -> bool {
    snapshot.iter().any(|s| embed_code_terminal(s.status))
}

/// 向量化失败的文件子集
pub fn embed_failed_subset(snapshot: &[FileStatus]) -> Vec<FileStatus> {
    snapshot
        .iter()
        .filter(|s| embed_code_failed(s.status))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::FileId;

    fn snap(codes: &[i32]) -> Vec<FileStatus> {
        codes
            .iter()
            .enumerate()
            .map(|(i, &code)| FileStatus::new(FileId::new(format!("f{}", i + 1)), code))
            .collect()
    }

    // 固定两套判定的精确码集，重构时若改动会在这里被拦下
    #[test]
    fn test_slice_terminal_codes_exact_set() {
        for code in 0..=6 {
            let expected = code == 1 || code == 2 || code == 5;
            assert_eq!(slice_code_terminal(code), expected, "code {}", code);
        }
    }

    #[test]
    fn test_slice_failed_only_code_1() {
        for code in 0..=6 {
            assert_eq!(slice_code_failed(code), code == 1, "code {}", code);
        }
    }

    #[test]
    fn test_embed_terminal_codes_exact_set() {
        for code in 0..=6 {
            let expected = code == 4 || code == 5;
            assert_eq!(embed_code_terminal(code), expected, "code {}", code);
        }
    }

    // 状态码 2 结束切片轮询但不结束向量化轮询
    #[test]
    fn test_code_2_asymmetry_between_stages() {
        assert!(slice_code_terminal(2));
        assert!(!embed_code_terminal(2));
    }

    #[test]
    fn test_slice_poll_finished_on_any_terminal() {
        assert!(!slice_poll_finished(&snap(&[0, 3])));
        assert!(slice_poll_finished(&snap(&[0, 5])));
        assert!(slice_poll_finished(&snap(&[2])));
        assert!(slice_poll_finished(&snap(&[1, 0])));
    }

    #[test]
    fn test_failed_subset_distinct_from_finish_signal() {
        // 循环结束信号来自 f2 的 5，但失败子集里只有 f1
        let snapshot = snap(&[1, 5, 0]);
        assert!(slice_poll_finished(&snapshot));
        let failed = slice_failed_subset(&snapshot);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].file_id, FileId::new("f1"));
    }

    #[test]
    fn test_embed_subsets() {
        let snapshot = snap(&[4, 5]);
        assert!(embed_poll_finished(&snapshot));
        assert_eq!(embed_failed_subset(&snapshot).len(), 1);
        assert!(embed_code_success(5));
        assert!(!embed_code_success(4));
    }
}
