//! @dose
//! purpose: Splits a document into groups of whole lines for per-group token caching.
//!
//! invariants:
//!     - Concatenating the chunks reproduces the input exactly (line terminators stay attached)
//!     - Every chunk except possibly the last holds exactly lines_per_chunk lines
//!     - Empty input yields no chunks

/// Split `text` into slices of `lines_per_chunk` lines each.
///
/// A `lines_per_chunk` of zero is treated as one.
pub fn split_into_line_chunks(text: &str, lines_per_chunk: usize) -> Vec<&str> {
    let lines_per_chunk = lines_per_chunk.max(1);
    let mut chunks = Vec::new();
    let mut chunk_start = 0;
    let mut lines_in_chunk = 0;

    for (index, byte) in text.bytes().enumerate() {
        if byte != b'\n' {
            continue;
        }
        lines_in_chunk += 1;
        if lines_in_chunk == lines_per_chunk {
            chunks.push(&text[chunk_start..=index]);
            chunk_start = index + 1;
            lines_in_chunk = 0;
        }
    }

    if chunk_start < text.len() {
        chunks.push(&text[chunk_start..]);
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(split_into_line_chunks("", 500).is_empty());
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(split_into_line_chunks("a\nb\nc", 500), vec!["a\nb\nc"]);
    }

    #[test]
    fn test_groups_by_line_count() {
        let chunks = split_into_line_chunks("1\n2\n3\n4\n5\n", 2);
        assert_eq!(chunks, vec!["1\n2\n", "3\n4\n", "5\n"]);
    }

    #[test]
    fn test_exact_multiple_has_no_trailing_empty_chunk() {
        let chunks = split_into_line_chunks("1\n2\n3\n4\n", 2);
        assert_eq!(chunks, vec!["1\n2\n", "3\n4\n"]);
    }

    #[test]
    fn test_crlf_stays_with_line() {
        let chunks = split_into_line_chunks("a\r\nb\r\nc", 1);
        assert_eq!(chunks, vec!["a\r\n", "b\r\n", "c"]);
    }

    #[test]
    fn test_zero_lines_per_chunk_means_one() {
        assert_eq!(split_into_line_chunks("a\nb", 0), vec!["a\n", "b"]);
    }

    #[test]
    fn test_multibyte_text_splits_on_char_boundaries() {
        let text = "héllo\nwörld\n世界\n";
        let chunks = split_into_line_chunks(text, 2);
        assert_eq!(chunks, vec!["héllo\nwörld\n", "世界\n"]);
        assert_eq!(chunks.concat(), text);
    }
}
