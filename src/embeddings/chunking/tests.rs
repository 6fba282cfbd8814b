use super::*;

fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkingConfig {
    ChunkingConfig {
        chunk_size,
        chunk_overlap,
    }
}

fn sample_text(sentences: usize) -> String {
    (0..sentences)
        .map(|i| {
            if i % 7 == 6 {
                format!("Sentence number {} closes a paragraph.\n\n", i)
            } else {
                format!("Sentence number {} talks about retrieval. ", i)
            }
        })
        .collect()
}

fn char_slice(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end - start).collect()
}

#[test]
fn empty_text_yields_no_chunks() {
    let segments = split_text("", &config(100, 10)).expect("valid config");
    assert!(segments.is_empty());
}

#[test]
fn short_text_yields_single_chunk() {
    let text = "The sky is blue.";
    let segments = split_text(text, &config(100, 10)).expect("valid config");

    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].text, text);
    assert_eq!(segments[0].start, 0);
    assert_eq!(segments[0].end, text.chars().count());
}

#[test]
fn text_exactly_chunk_size_is_one_chunk() {
    let text = "a".repeat(100);
    let segments = split_text(&text, &config(100, 10)).expect("valid config");
    assert_eq!(segments.len(), 1);
}

#[test]
fn invalid_configuration_is_rejected() {
    assert!(matches!(
        split_text("text", &config(0, 0)),
        Err(ConfigError::InvalidChunkSize(0))
    ));
    assert!(matches!(
        split_text("text", &config(100, 100)),
        Err(ConfigError::InvalidChunkOverlap {
            overlap: 100,
            size: 100
        })
    ));
    assert!(split_text("text", &config(100, 150)).is_err());
}

#[test]
fn segments_cover_text_without_gaps() {
    let text = sample_text(120);
    let total = text.chars().count();

    for (size, overlap) in [(50, 10), (100, 1), (200, 50), (333, 100), (1000, 200)] {
        let segments = split_text(&text, &config(size, overlap)).expect("valid config");

        assert_eq!(segments[0].start, 0);
        assert_eq!(segments.last().map(|s| s.end), Some(total));

        for segment in &segments {
            assert!(segment.end > segment.start);
            assert!(segment.end - segment.start <= size);
            assert_eq!(segment.text, char_slice(&text, segment.start, segment.end));
        }

        for pair in segments.windows(2) {
            assert!(pair[1].start > pair[0].start, "start must advance");
            assert!(pair[1].start <= pair[0].end, "no gap between chunks");
            assert_eq!(pair[1].start, pair[0].end - overlap);
        }
    }
}

#[test]
fn overlap_repeats_tail_of_previous_chunk() {
    let text = sample_text(40);
    let overlap = 30;
    let segments = split_text(&text, &config(200, overlap)).expect("valid config");
    assert!(segments.len() > 1);

    for pair in segments.windows(2) {
        let tail: String = pair[0]
            .text
            .chars()
            .skip(pair[0].text.chars().count() - overlap)
            .collect();
        assert!(pair[1].text.starts_with(&tail));
    }
}

#[test]
fn prefers_paragraph_break() {
    let text = format!("{}\n\n{}", "x".repeat(43), "y".repeat(100));
    let segments = split_text(&text, &config(50, 0)).expect("valid config");
    assert_eq!(segments[0].end, 45);
    assert!(segments[0].text.ends_with("\n\n"));
}

#[test]
fn prefers_sentence_break_over_whitespace() {
    let text = format!("{}. {} {}", "a".repeat(42), "b".repeat(3), "c".repeat(100));
    let segments = split_text(&text, &config(50, 0)).expect("valid config");
    assert_eq!(segments[0].end, 44);
    assert_eq!(segments[0].text, format!("{}. ", "a".repeat(42)));
}

#[test]
fn falls_back_to_whitespace_outside_sentence_window() {
    let text = format!("{}. {} {}", "a".repeat(20), "b".repeat(25), "c".repeat(100));
    let segments = split_text(&text, &config(50, 0)).expect("valid config");
    assert_eq!(segments[0].end, 48);
}

#[test]
fn hard_cut_without_any_boundary() {
    let text = "a".repeat(200);
    let segments = split_text(&text, &config(50, 10)).expect("valid config");

    assert_eq!(segments[0].end, 50);
    assert_eq!(segments[1].start, 40);
    assert!(segments.iter().all(|s| s.text.chars().count() <= 50));
}

#[test]
fn large_overlap_still_advances() {
    let text = "word ".repeat(40);
    let segments = split_text(&text, &config(10, 9)).expect("valid config");

    for pair in segments.windows(2) {
        assert!(pair[1].start > pair[0].start);
    }
    assert_eq!(segments.last().map(|s| s.end), Some(text.chars().count()));
}

#[test]
fn offsets_count_characters_not_bytes() {
    let text = "é".repeat(120);
    let segments = split_text(&text, &config(50, 5)).expect("valid config");

    assert_eq!(segments[0].end, 50);
    assert_eq!(segments[0].text.chars().count(), 50);
    assert_eq!(segments.last().map(|s| s.end), Some(120));
}

#[test]
fn chunk_count_tracks_stride() {
    let text = sample_text(400);
    let total = text.chars().count();
    let segments = split_text(&text, &config(1000, 200)).expect("valid config");

    // The last chunk may hold a full chunk_size of text
    let expected = (total - 200).div_ceil(800);
    let upper = total.div_ceil(600) + 1;
    assert!(
        segments.len() >= expected && segments.len() <= upper,
        "{} chunks for {} chars",
        segments.len(),
        total
    );
}

#[test]
fn chunk_document_splits_per_page() {
    let document = Document::from_pages(
        "facts.pdf",
        vec![
            "The sky is blue.".to_string(),
            "Water is wet.".to_string(),
            "Fire is hot.".to_string(),
        ],
    );

    let chunks = chunk_document(&document, &ChunkingConfig::default()).expect("valid config");

    assert_eq!(chunks.len(), 3);
    assert_eq!(chunks[0].text, "The sky is blue.");
    assert_eq!(chunks[1].text, "Water is wet.");
    assert_eq!(chunks[2].text, "Fire is hot.");

    let full_text = document.text();
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.ordinal, i);
        assert_eq!(chunk.page_number, Some(i as u32 + 1));
        assert_eq!(chunk.id, format!("{}:{}", document.id, i));
        assert_eq!(chunk.document_id, document.id);
        assert_eq!(chunk.source_name, "facts.pdf");
        assert_eq!(chunk.text, char_slice(&full_text, chunk.start, chunk.end));
    }
}

#[test]
fn chunk_document_skips_blank_pages() {
    let document = Document::from_pages(
        "gaps.pdf",
        vec![
            "First page.".to_string(),
            "   \n ".to_string(),
            "Third page.".to_string(),
        ],
    );

    let chunks = chunk_document(&document, &ChunkingConfig::default()).expect("valid config");

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1].page_number, Some(3));
    assert_eq!(chunks[1].ordinal, 1);
    assert_eq!(
        chunks[1].text,
        char_slice(&document.text(), chunks[1].start, chunks[1].end)
    );
}

#[test]
fn chunk_document_with_empty_document() {
    let document = Document::from_pages("empty.pdf", Vec::new());
    let chunks = chunk_document(&document, &ChunkingConfig::default()).expect("valid config");
    assert!(chunks.is_empty());
}
