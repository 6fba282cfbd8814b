use criterion::{Criterion, criterion_group, criterion_main};
use pdf_rag::embeddings::HashingEmbedder;
use pdf_rag::embeddings::chunking::{ChunkingConfig, chunk_document, split_text};
use pdf_rag::extraction::Document;
use std::hint::black_box;

fn sample_page(page: usize) -> String {
    (0..60)
        .map(|i| {
            if i % 8 == 7 {
                format!("Page {page} sentence {i} ends a paragraph about retrieval.\n\n")
            } else {
                format!("Page {page} sentence {i} describes vectors and chunks. ")
            }
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let pages: Vec<String> = (1..=40).map(sample_page).collect();
    let document = Document::from_pages("bench.pdf", pages.clone());
    let config = ChunkingConfig::default();

    c.bench_function("split_text", |b| {
        b.iter(|| split_text(black_box(&pages[0]), black_box(&config)))
    });

    c.bench_function("chunk_document", |b| {
        b.iter(|| chunk_document(black_box(&document), black_box(&config)))
    });

    let embedder = HashingEmbedder::default();
    c.bench_function("hashing_embed", |b| {
        b.iter(|| embedder.embed_text(black_box(&pages[0])))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
