use crate::error::{AppError, Result};

/// Split text into windows of `size` characters whose starts are `stride`
/// characters apart.
///
/// Every window start below the text length produces a chunk, so the tail
/// windows may be shorter than `size`. Empty text yields no chunks. Sizes
/// count `char`s, never bytes, so multi-byte text is never split mid-character.
pub fn chunk_text(text: &str, size: usize, stride: usize) -> Result<Vec<String>> {
    if size == 0 || stride == 0 || stride > size {
        return Err(AppError::Config(format!(
            "Invalid chunking parameters: size={size}, stride={stride}"
        )));
    }

    // Byte offset of every char boundary, plus the end of the string
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(offset, _)| offset)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = boundaries.len() - 1;

    let chunks = (0..char_count)
        .step_by(stride)
        .map(|start| {
            let end = (start + size).min(char_count);
            text[boundaries[start]..boundaries[end]].to_string()
        })
        .collect();

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_windows_keep_tail() {
        let chunks = chunk_text("abcdefgh", 5, 3).unwrap();
        assert_eq!(chunks, vec!["abcde", "defgh", "gh"]);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text("", 5, 3).unwrap().is_empty());
    }

    #[test]
    fn test_no_overlap() {
        let chunks = chunk_text("abcdefg", 3, 3).unwrap();
        assert_eq!(chunks, vec!["abc", "def", "g"]);
    }

    #[test]
    fn test_short_text_single_chunk() {
        assert_eq!(chunk_text("hi", 1000, 800).unwrap(), vec!["hi"]);
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let chunks = chunk_text("ñandú sol", 4, 4).unwrap();
        assert_eq!(chunks, vec!["ñand", "ú so", "l"]);
    }

    #[test]
    fn test_deterministic() {
        let text = "lorem ipsum dolor sit amet ".repeat(40);
        assert_eq!(
            chunk_text(&text, 100, 80).unwrap(),
            chunk_text(&text, 100, 80).unwrap()
        );
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        assert!(chunk_text("abc", 0, 1).is_err());
        assert!(chunk_text("abc", 3, 0).is_err());
        assert!(chunk_text("abc", 3, 4).is_err());
    }
}
