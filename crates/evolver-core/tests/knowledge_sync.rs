//! Repository sync and pull-latest against in-memory collaborators.

use std::time::Duration;

use evolver_core::fakes::MemorySourceControl;
use evolver_core::{
    pull_latest, pull_latest_and_restart, sync_repository, DocumentFilter, DocumentOrigin, KnowledgeStore,
    MemoryKnowledgeStore, RepositoryTarget, RestartReason, SyncOptions, WatchedRepo,
};

fn options() -> SyncOptions {
    SyncOptions {
        fetch_delay: Duration::ZERO,
        ..SyncOptions::default()
    }
}

#[tokio::test]
async fn sync_ingests_knowledge_files_only() {
    let repo_source = MemorySourceControl::new()
        .with_file("src/hooks.ts", "export function useCache() {}")
        .with_file("lib/parse.rs", "pub fn parse() {}")
        .with_file("assets/logo.png", "binary")
        .with_file("big.json", "x".repeat(100_000));
    let store = MemoryKnowledgeStore::new();
    let watched = store.add_repo(WatchedRepo::new("facebook", "react", "main")).await.unwrap();

    let report = sync_repository(&repo_source, &store, &watched, &options()).await.unwrap();

    assert_eq!(report.total_files, 2);
    assert_eq!(report.synced, 2);
    assert_eq!(report.failed, 0);

    let docs = store.query(&DocumentFilter::all()).await.unwrap();
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|d| d.origin == DocumentOrigin::Repository));
    let hooks = docs.iter().find(|d| d.file_name == "hooks.ts").unwrap();
    assert_eq!(hooks.language, "typescript");
    assert_eq!(hooks.file_path, "src/hooks.ts");
    assert_eq!(hooks.repository_slug().as_deref(), Some("facebook/react"));

    let refreshed = store.get_repo(&watched.id).await.unwrap();
    assert_eq!(refreshed.files_count, 2);
    assert!(refreshed.last_sync.is_some());
}

#[tokio::test]
async fn resync_updates_in_place() {
    let repo_source = MemorySourceControl::new().with_file("a.ts", "export const a = 1;");
    let store = MemoryKnowledgeStore::new();
    let watched = store.add_repo(WatchedRepo::new("acme", "lib", "main")).await.unwrap();

    sync_repository(&repo_source, &store, &watched, &options()).await.unwrap();
    let unchanged = sync_repository(&repo_source, &store, &watched, &options()).await.unwrap();
    assert_eq!(unchanged.unchanged, 1);

    repo_source.set_file("a.ts", "export const a = 2;");
    let changed = sync_repository(&repo_source, &store, &watched, &options()).await.unwrap();
    assert_eq!(changed.synced, 1);
    assert_eq!(changed.unchanged, 0);

    let docs = store.query(&DocumentFilter::all()).await.unwrap();
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].content, "export const a = 2;");
}

#[tokio::test]
async fn unreadable_files_are_counted_and_skipped() {
    let repo_source = MemorySourceControl::new()
        .with_file("a.ts", "export const a = 1;")
        .with_file("b.ts", "export const b = 1;")
        .with_unreadable("a.ts");
    let store = MemoryKnowledgeStore::new();
    let watched = store.add_repo(WatchedRepo::new("acme", "lib", "main")).await.unwrap();

    let report = sync_repository(&repo_source, &store, &watched, &options()).await.unwrap();

    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(store.get_repo(&watched.id).await.unwrap().files_count, 1);
}

#[tokio::test]
async fn per_run_cap_limits_fetches() {
    let mut repo_source = MemorySourceControl::new();
    for i in 0..5 {
        repo_source = repo_source.with_file(format!("f{i}.md"), "# doc");
    }
    let store = MemoryKnowledgeStore::new();
    let watched = store.add_repo(WatchedRepo::new("acme", "docs", "main")).await.unwrap();
    let options = SyncOptions {
        max_files: 3,
        fetch_delay: Duration::ZERO,
    };

    let report = sync_repository(&repo_source, &store, &watched, &options).await.unwrap();

    assert_eq!(report.total_files, 5);
    assert_eq!(report.synced, 3);
    assert_eq!(repo_source.calls().get_file, 3);
}

#[tokio::test(start_paused = true)]
async fn fetches_are_spaced_by_the_delay() {
    let repo_source = MemorySourceControl::new()
        .with_file("a.md", "a")
        .with_file("b.md", "b")
        .with_file("c.md", "c");
    let store = MemoryKnowledgeStore::new();
    let watched = store.add_repo(WatchedRepo::new("acme", "docs", "main")).await.unwrap();

    let started = tokio::time::Instant::now();
    sync_repository(&repo_source, &store, &watched, &SyncOptions::default())
        .await
        .unwrap();

    assert_eq!(started.elapsed(), Duration::from_millis(200));
}

#[tokio::test]
async fn pull_latest_summarises_newest_commit() {
    let long_message = format!("{}\n\nbody", "Refactor ".repeat(10));
    let repo_source = MemorySourceControl::new()
        .with_commit("0000000aaaa", "Old", "first")
        .with_commit("1234567890abcdef", "Grace", long_message);

    let latest = pull_latest(&repo_source, &RepositoryTarget::new("acme", "site", "main"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(latest.short_sha(), "1234567");
    assert_eq!(latest.author, "Grace");
    assert_eq!(latest.headline.chars().count(), 60);
    assert!(!latest.headline.contains('\n'));
    assert_eq!(latest.restart_request().reason, RestartReason::PulledLatest);
}

#[tokio::test]
async fn pull_latest_on_empty_branch_is_none() {
    let repo_source = MemorySourceControl::new();
    let latest = pull_latest(&repo_source, &RepositoryTarget::new("acme", "site", "main"))
        .await
        .unwrap();
    assert!(latest.is_none());
}

#[tokio::test]
async fn pull_latest_requests_restart_onto_newest_commit() {
    let repo_source = MemorySourceControl::new()
        .with_commit("0000000aaaa", "Old", "first")
        .with_commit("1234567890abcdef", "Grace", "Cache tree lookups");
    let (restart_tx, mut restart_rx) = tokio::sync::mpsc::channel(1);

    let latest = pull_latest_and_restart(
        &repo_source,
        &RepositoryTarget::new("acme", "site", "main"),
        &restart_tx,
    )
    .await
    .unwrap()
    .unwrap();

    let request = restart_rx.try_recv().unwrap();
    assert_eq!(request.reason, RestartReason::PulledLatest);
    assert_eq!(request.commit_sha, latest.sha);
    assert_eq!(request.commit_sha, "1234567890abcdef");
}

#[tokio::test]
async fn empty_branch_requests_no_restart() {
    let (restart_tx, mut restart_rx) = tokio::sync::mpsc::channel(1);

    let latest = pull_latest_and_restart(
        &MemorySourceControl::new(),
        &RepositoryTarget::new("acme", "site", "main"),
        &restart_tx,
    )
    .await
    .unwrap();

    assert!(latest.is_none());
    assert!(restart_rx.try_recv().is_err());
}
