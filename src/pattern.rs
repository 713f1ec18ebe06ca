//! Byte-subsequence search over raw class bytes.

/// Returns the lowest index at which `needle` occurs in `haystack`.
///
/// Exact byte comparison, left to right. `None` when there is no occurrence,
/// which includes a needle longer than the haystack. An empty needle matches
/// at 0.
pub fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
