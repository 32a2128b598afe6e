//! Relevance ranking properties over generated document sets.

use chrono::{DateTime, Duration, TimeZone, Utc};
use evolver_core::ranker::{format_context, rank_at, CONTEXT_CHAR_BUDGET, TRUNCATION_MARKER};
use evolver_core::{
    retrieve_context, DocumentFilter, DocumentOrigin, KnowledgeDocument, MemoryKnowledgeStore,
    ScoredDocument,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const VOCABULARY: &[&str] = &[
    "hook", "memo", "state", "render", "effect", "cache", "ref", "props", "async", "fetch",
];

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

fn generated_corpus(seed: u64, size: usize) -> Vec<KnowledgeDocument> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..size)
        .map(|i| {
            let words = rng.gen_range(0..40);
            let content = (0..words)
                .map(|_| VOCABULARY[rng.gen_range(0..VOCABULARY.len())])
                .collect::<Vec<_>>()
                .join(" ");
            let age = Duration::days(rng.gen_range(0..800));
            KnowledgeDocument::new(format!("doc{i}.ts"), content, DocumentOrigin::External, "typescript")
                .created_at(now() - age)
        })
        .collect()
}

#[test]
fn ranked_results_are_bounded_positive_and_sorted() {
    for seed in 0..20 {
        let docs = generated_corpus(seed, 30);
        for limit in [0, 1, 3, 10, 50] {
            let ranked = rank_at("memo render cache", &docs, limit, now());
            assert!(ranked.len() <= limit);
            assert!(ranked.iter().all(|s| s.score > 0.0));
            assert!(ranked.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }
}

#[test]
fn ranking_is_deterministic() {
    let docs = generated_corpus(42, 40);
    let first = rank_at("hook state effect", &docs, 10, now());
    let second = rank_at("hook state effect", &docs, 10, now());
    let ids = |r: Vec<ScoredDocument>| r.into_iter().map(|s| s.document.id).collect::<Vec<_>>();
    assert_eq!(ids(first), ids(second));
}

#[test]
fn equal_scores_keep_retrieval_order() {
    let at = now() - Duration::days(500);
    let docs: Vec<_> = (0..6)
        .map(|i| {
            KnowledgeDocument::new(format!("same{i}.ts"), "useMemo wrapper", DocumentOrigin::Upload, "typescript")
                .created_at(at)
        })
        .collect();

    let ranked = rank_at("usememo", &docs, 6, now());
    let names: Vec<_> = ranked.iter().map(|s| s.document.file_name.as_str()).collect();
    assert_eq!(names, ["same0.ts", "same1.ts", "same2.ts", "same3.ts", "same4.ts", "same5.ts"]);
}

#[test]
fn repetition_helps_until_the_cap() {
    let at = now() - Duration::days(400);
    let once = KnowledgeDocument::new("a.ts", "selector", DocumentOrigin::External, "typescript").created_at(at);
    let five = KnowledgeDocument::new("b.ts", "selector ".repeat(5), DocumentOrigin::External, "typescript")
        .created_at(at);
    let twenty = KnowledgeDocument::new("c.ts", "selector ".repeat(20), DocumentOrigin::External, "typescript")
        .created_at(at);
    let ninety = KnowledgeDocument::new("d.ts", "selector ".repeat(90), DocumentOrigin::External, "typescript")
        .created_at(at);

    let ranked = rank_at("selector", &[once, five, twenty, ninety], 4, now());
    let score = |name: &str| {
        ranked
            .iter()
            .find(|s| s.document.file_name == name)
            .map(|s| s.score)
            .unwrap()
    };

    assert!(score("b.ts") > score("a.ts"));
    assert!((score("c.ts") - score("d.ts")).abs() < 1e-9);
    assert!((score("d.ts") - score("a.ts") - 1.9).abs() < 1e-9);
}

#[test]
fn fresh_document_outranks_stale_twin() {
    let stale = KnowledgeDocument::new("x.ts", "reducer pattern", DocumentOrigin::External, "typescript")
        .created_at(now() - Duration::days(420));
    let fresh = KnowledgeDocument::new("x.ts", "reducer pattern", DocumentOrigin::External, "typescript")
        .created_at(now());

    let ranked = rank_at("reducer", &[stale.clone(), fresh.clone()], 2, now());
    assert_eq!(ranked[0].document.id, fresh.id);
    assert!((ranked[0].score - ranked[1].score - 1.0).abs() < 1e-9);
}

#[test]
fn unmatched_old_documents_are_dropped() {
    let old = KnowledgeDocument::new("x.ts", "nothing relevant", DocumentOrigin::External, "typescript")
        .created_at(now() - Duration::days(400));
    assert!(rank_at("selector", &[old], 5, now()).is_empty());
}

#[test]
fn context_truncates_each_document() {
    let big = KnowledgeDocument::new("big.ts", "q".repeat(CONTEXT_CHAR_BUDGET + 50), DocumentOrigin::External, "typescript")
        .created_at(now());
    let ranked = rank_at("qqq", &[big], 1, now());
    let context = format_context(&ranked);

    assert!(context.contains(TRUNCATION_MARKER));
    assert_eq!(context.matches('q').count(), CONTEXT_CHAR_BUDGET);
}

#[tokio::test]
async fn retrieval_respects_language_filter() {
    let store = MemoryKnowledgeStore::with_documents(vec![
        KnowledgeDocument::new("hooks.ts", "custom hook helpers", DocumentOrigin::Upload, "typescript"),
        KnowledgeDocument::new("hooks.py", "custom hook helpers", DocumentOrigin::Upload, "python"),
    ]);

    let retrieved = retrieve_context(&store, "custom hook", &DocumentFilter::all().language("python"), 3)
        .await
        .unwrap();

    assert_eq!(retrieved.documents.len(), 1);
    assert_eq!(retrieved.documents[0].document.file_name, "hooks.py");
    assert!(retrieved.context.starts_with("### hooks.py"));
}
