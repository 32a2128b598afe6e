//! Trait contract tests for KnowledgeStore.
//!
//! Every conforming implementation must pass these; they run against both
//! the in-memory fake and the JSON-file store.

use chrono::{Duration, Utc};
use knowledge_store::{
    DocumentFilter, DocumentOrigin, JsonFileKnowledgeStore, KnowledgeDocument, KnowledgeStore,
    MemoryKnowledgeStore, StoreError, UpsertOutcome, WatchedRepo,
};

fn doc(name: &str, language: &str, origin: DocumentOrigin, age_days: i64) -> KnowledgeDocument {
    KnowledgeDocument::new(name, format!("content of {name}"), origin, language)
        .created_at(Utc::now() - Duration::days(age_days))
}

async fn check_query_newest_first(store: &dyn KnowledgeStore) {
    store
        .insert(doc("old.ts", "typescript", DocumentOrigin::Upload, 30))
        .await
        .unwrap();
    store
        .insert(doc("new.ts", "typescript", DocumentOrigin::Upload, 1))
        .await
        .unwrap();
    store
        .insert(doc("mid.ts", "typescript", DocumentOrigin::Upload, 10))
        .await
        .unwrap();

    let names: Vec<String> = store
        .query(&DocumentFilter::all())
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.file_name)
        .collect();
    assert_eq!(names, vec!["new.ts", "mid.ts", "old.ts"]);
}

async fn check_query_filters_and_limits(store: &dyn KnowledgeStore) {
    for i in 0..5 {
        store
            .insert(doc(&format!("f{i}.py"), "python", DocumentOrigin::Repository, i))
            .await
            .unwrap();
    }
    store
        .insert(doc("g.ts", "typescript", DocumentOrigin::Repository, 0))
        .await
        .unwrap();
    store
        .insert(doc("h.py", "python", DocumentOrigin::Upload, 0))
        .await
        .unwrap();

    let python = store
        .query(&DocumentFilter::all().language("python"))
        .await
        .unwrap();
    assert_eq!(python.len(), 6);

    let repo_python = store
        .query(
            &DocumentFilter::all()
                .language("python")
                .origin(DocumentOrigin::Repository)
                .limit(3),
        )
        .await
        .unwrap();
    assert_eq!(repo_python.len(), 3);
    assert!(repo_python
        .iter()
        .all(|d| d.language == "python" && d.origin == DocumentOrigin::Repository));
}

async fn check_delete(store: &dyn KnowledgeStore) {
    let d = doc("gone.rs", "rust", DocumentOrigin::External, 0);
    let id = d.id.clone();
    store.insert(d).await.unwrap();
    store.delete(&id).await.unwrap();

    assert!(matches!(
        store.get(&id).await.unwrap_err(),
        StoreError::DocumentNotFound { .. }
    ));
    assert!(matches!(
        store.delete(&id).await.unwrap_err(),
        StoreError::DocumentNotFound { .. }
    ));
}

async fn check_upsert(store: &dyn KnowledgeStore) {
    let first = KnowledgeDocument::new("lib.rs", "v1", DocumentOrigin::Repository, "rust")
        .with_path("src/lib.rs")
        .with_repository("tokio-rs", "tokio");
    let id = first.id.clone();
    assert_eq!(
        store.upsert_repository_file(first).await.unwrap(),
        UpsertOutcome::Inserted
    );

    let same = KnowledgeDocument::new("lib.rs", "v1", DocumentOrigin::Repository, "rust")
        .with_path("src/lib.rs")
        .with_repository("tokio-rs", "tokio");
    assert_eq!(
        store.upsert_repository_file(same).await.unwrap(),
        UpsertOutcome::Unchanged
    );

    let changed = KnowledgeDocument::new("lib.rs", "v2", DocumentOrigin::Repository, "rust")
        .with_path("src/lib.rs")
        .with_repository("tokio-rs", "tokio");
    assert_eq!(
        store.upsert_repository_file(changed).await.unwrap(),
        UpsertOutcome::Updated
    );

    let stored = store.get(&id).await.unwrap();
    assert_eq!(stored.content, "v2");
    assert_eq!(store.query(&DocumentFilter::all()).await.unwrap().len(), 1);
}

async fn check_repo_registry(store: &dyn KnowledgeStore) {
    let repo = store
        .add_repo(WatchedRepo::new("google", "jax", "main"))
        .await
        .unwrap();

    let dup = store
        .add_repo(WatchedRepo::new("google", "jax", "dev"))
        .await
        .unwrap_err();
    assert!(matches!(dup, StoreError::AlreadyExists { .. }));

    let synced = store.record_sync(&repo.id, 42).await.unwrap();
    assert_eq!(synced.files_count, 42);
    assert!(synced.last_sync.is_some());

    store.remove_repo(&repo.id).await.unwrap();
    assert!(store.list_repos().await.unwrap().is_empty());
    assert!(matches!(
        store.record_sync(&repo.id, 1).await.unwrap_err(),
        StoreError::RepoNotFound { .. }
    ));
}

macro_rules! contract_suite {
    ($module:ident, $make:expr) => {
        mod $module {
            use super::*;

            #[tokio::test]
            async fn query_newest_first() {
                let (_guard, store) = $make.await;
                check_query_newest_first(&store).await;
            }

            #[tokio::test]
            async fn query_filters_and_limits() {
                let (_guard, store) = $make.await;
                check_query_filters_and_limits(&store).await;
            }

            #[tokio::test]
            async fn delete_removes_document() {
                let (_guard, store) = $make.await;
                check_delete(&store).await;
            }

            #[tokio::test]
            async fn upsert_keys_on_repository_path() {
                let (_guard, store) = $make.await;
                check_upsert(&store).await;
            }

            #[tokio::test]
            async fn repo_registry_lifecycle() {
                let (_guard, store) = $make.await;
                check_repo_registry(&store).await;
            }
        }
    };
}

async fn memory_store() -> ((), MemoryKnowledgeStore) {
    ((), MemoryKnowledgeStore::new())
}

async fn file_store() -> (tempfile::TempDir, JsonFileKnowledgeStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileKnowledgeStore::open(dir.path().join("kb.json"))
        .await
        .unwrap();
    (dir, store)
}

contract_suite!(memory, memory_store());
contract_suite!(json_file, file_store());

#[tokio::test]
async fn stats_count_by_origin() {
    let store = MemoryKnowledgeStore::new();
    store
        .insert(doc("a.ts", "typescript", DocumentOrigin::Upload, 0))
        .await
        .unwrap();
    store
        .insert(
            doc("b.ts", "typescript", DocumentOrigin::Repository, 0).with_repository("o", "r"),
        )
        .await
        .unwrap();
    store
        .insert(doc("c.md", "markdown", DocumentOrigin::External, 0))
        .await
        .unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total, 3);
    assert_eq!((stats.uploaded, stats.repository, stats.external), (1, 1, 1));
    assert_eq!(stats.by_language[0], ("typescript".to_string(), 2));
    assert_eq!(stats.by_repo, vec![("r".to_string(), 1)]);
}
