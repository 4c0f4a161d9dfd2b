mod common;

use std::sync::atomic::Ordering;

use common::{Harness, words};
use docsift::model::{IndexState, IngestStatus};
use docsift::store::{CorpusStore, DocumentStore};

#[tokio::test]
async fn thousand_words_make_five_chunks() {
    let harness = Harness::new();
    let report = harness
        .pipeline
        .ingest("alice", &words(1000), "long.txt", "text/plain")
        .await
        .expect("ingest");

    assert_eq!(report.status, IngestStatus::Created);
    assert_eq!(report.total_chunk_count, 5);
    assert_eq!(report.indexed_chunk_count, 5);
    let document = report.document.expect("document");
    assert_eq!(document.index_state, IndexState::Indexed);
    assert_eq!(harness.vectors.inner.count_for_document(&document.id).await, 5);
    assert_eq!(harness.texts.inner.count_for_document(&document.id).await, 5);
}

#[tokio::test]
async fn identical_content_is_blocked() {
    let harness = Harness::new();
    let text = "Refund policy: items may be returned within thirty days.";
    let first = harness
        .pipeline
        .ingest("alice", text, "policy.txt", "text/plain")
        .await
        .expect("first ingest");
    let first_id = first.document_id.clone().expect("id");

    let second = harness
        .pipeline
        .ingest("alice", text, "policy-copy.txt", "text/plain")
        .await
        .expect("second ingest");

    assert_eq!(second.status, IngestStatus::Duplicate);
    assert_eq!(second.document_id.as_deref(), Some(first_id.as_str()));
    assert_eq!(
        harness.stores.documents.list_by_owner("alice").await.expect("list").len(),
        1
    );
    assert_eq!(harness.vectors.inner.count_for_document(&first_id).await, 1);
    assert_eq!(harness.pipeline.metrics().snapshot().duplicates_rejected, 1);
}

#[tokio::test]
async fn same_content_for_another_owner_is_not_a_duplicate() {
    let harness = Harness::new();
    let text = "shared onboarding checklist";
    for owner in ["alice", "bob"] {
        let report = harness
            .pipeline
            .ingest(owner, text, "checklist.txt", "text/plain")
            .await
            .expect("ingest");
        assert_eq!(report.status, IngestStatus::Created, "{owner}");
    }
}

#[tokio::test]
async fn similar_filename_still_ingests() {
    let harness = Harness::new();
    harness
        .pipeline
        .ingest("alice", "old refund terms", "Refund_Policy_2024.txt", "text/plain")
        .await
        .expect("first ingest");

    let report = harness
        .pipeline
        .ingest("alice", "new refund terms", "refund-policy-2025.txt", "text/plain")
        .await
        .expect("second ingest");

    assert_eq!(report.status, IngestStatus::Created);
    assert_eq!(report.similar_candidates.len(), 1);
    assert_eq!(report.similar_candidates[0].original_name, "Refund_Policy_2024.txt");
}

#[tokio::test]
async fn embedding_outage_leaves_document_unindexed_but_stored() {
    let harness = Harness::new();
    harness.embedder.set_failing(true);

    let report = harness
        .pipeline
        .ingest("alice", &words(450), "outage.txt", "text/plain")
        .await
        .expect("ingest");

    assert_eq!(report.status, IngestStatus::Partial);
    assert!(report.unindexed);
    assert_eq!(report.total_chunk_count, 3);
    assert_eq!(report.warning_count(), 3);
    let document = report.document.expect("document");
    assert_eq!(document.index_state, IndexState::Unindexed);
    let stored = harness.stores.corpus.read(&document).await.expect("source");
    assert_eq!(stored, words(450));
}

#[tokio::test]
async fn failing_text_index_marks_document_partial() {
    let harness = Harness::new();
    harness.texts.faults.failing_writes.store(true, Ordering::SeqCst);

    let report = harness
        .pipeline
        .ingest("alice", &words(250), "partial.txt", "text/plain")
        .await
        .expect("ingest");

    assert_eq!(report.status, IngestStatus::Partial);
    assert_eq!(report.indexed_chunk_count, 0);
    assert_eq!(report.total_chunk_count, 2);
    let snapshot = harness.pipeline.metrics().snapshot();
    assert_eq!(snapshot.documents_partial, 1);
    assert_eq!(snapshot.chunks_failed, 2);
}

#[tokio::test]
async fn transient_write_failures_are_retried() {
    let harness = Harness::new();
    harness
        .vectors
        .faults
        .transient_write_failures
        .store(2, Ordering::SeqCst);

    let report = harness
        .pipeline
        .ingest("alice", &words(100), "flaky.txt", "text/plain")
        .await
        .expect("ingest");

    assert_eq!(report.status, IngestStatus::Created);
    assert_eq!(report.indexed_chunk_count, 1);
}

#[tokio::test]
async fn empty_document_is_created_without_chunks() {
    let harness = Harness::new();
    let report = harness
        .pipeline
        .ingest("alice", "   \n ", "blank.txt", "text/plain")
        .await
        .expect("ingest");

    assert_eq!(report.status, IngestStatus::Created);
    assert_eq!(report.total_chunk_count, 0);
    assert_eq!(
        report.document.expect("document").index_state,
        IndexState::Empty
    );
}

#[tokio::test]
async fn different_files_without_text_are_not_duplicates() {
    let harness = Harness::new();
    let first = harness
        .pipeline
        .ingest("alice", "", "scan-1.png", "image/png")
        .await
        .expect("first ingest");
    let second = harness
        .pipeline
        .ingest("alice", "  ", "holiday-photo.jpg", "image/jpeg")
        .await
        .expect("second ingest");

    assert_eq!(first.status, IngestStatus::Created);
    assert_eq!(second.status, IngestStatus::Created);
    assert_ne!(first.document_id, second.document_id);
    assert_eq!(
        harness.stores.documents.list_by_owner("alice").await.expect("list").len(),
        2
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_identical_uploads_create_one_document() {
    let harness = Harness::new();
    let text = words(300);
    let (a, b) = tokio::join!(
        harness.pipeline.ingest("alice", &text, "a.txt", "text/plain"),
        harness.pipeline.ingest("alice", &text, "b.txt", "text/plain"),
    );
    let mut statuses = vec![a.expect("a").status, b.expect("b").status];
    statuses.sort_by_key(|status| *status == IngestStatus::Duplicate);

    assert_eq!(statuses, [IngestStatus::Created, IngestStatus::Duplicate]);
    assert_eq!(
        harness.stores.documents.list_by_owner("alice").await.expect("list").len(),
        1
    );
}

#[tokio::test]
async fn blank_owner_is_rejected() {
    let harness = Harness::new();
    let error = harness
        .pipeline
        .ingest(" ", "text", "a.txt", "text/plain")
        .await
        .expect_err("invalid");
    assert!(error.to_string().contains("owner id"));
}
