//! Fuzzy text similarity for OCR results

use unicode_normalization::UnicodeNormalization;

/// Length-normalized longest-common-subsequence ratio in `[0, 1]`
///
/// Both strings are NFKC-normalized, stripped of whitespace and lowercased
/// first. An empty recognition never matches.
pub fn text_similarity(recognized: &str, expected: &str) -> f32 {
    let a: Vec<char> = normalize(recognized).chars().collect();
    let b: Vec<char> = normalize(expected).chars().collect();

    let max_len = a.len().max(b.len());
    if max_len == 0 || a.is_empty() {
        return 0.0;
    }

    lcs_len(&a, &b) as f32 / max_len as f32
}

/// Normalization: NFKC folds full-width forms, OCR often inserts spaces
pub fn normalize(s: &str) -> String {
    let mut normalized: String = s.nfkc().collect();
    normalized.retain(|c| !c.is_whitespace());
    normalized.to_lowercase()
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert_eq!(text_similarity("返回", "返回"), 1.0);
    }

    #[test]
    fn test_one_char_corruption() {
        assert_eq!(text_similarity("返冈", "返回"), 0.5);
    }

    #[test]
    fn test_empty_recognition() {
        assert_eq!(text_similarity("", "返回"), 0.0);
        assert_eq!(text_similarity("   ", "Start"), 0.0);
    }

    #[test]
    fn test_normalization() {
        assert_eq!(text_similarity(" S T A R T ", "start"), 1.0);
        // full-width latin folds under NFKC
        assert_eq!(text_similarity("ＯＫ", "ok"), 1.0);
    }

    #[test]
    fn test_longer_recognition_is_penalized() {
        // 2 common of 4
        assert_eq!(text_similarity("返回主页", "返回"), 0.5);
    }

    #[test]
    fn test_subsequence_not_substring() {
        assert_eq!(lcs_len(&['a', 'x', 'b', 'c'], &['a', 'b', 'c']), 3);
    }
}
