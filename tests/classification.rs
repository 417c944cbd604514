// tests/classification.rs

mod common;

use changewatch::storage::{SnapshotReader, SnapshotWriter};
use changewatch::types::Verb;
use changewatch::worker::Outcome;
use changewatch_test_utils::builders::JobBuilder;
use changewatch_test_utils::fake_fetcher::{ScriptedFetcher, Step};
use changewatch_test_utils::init_tracing;
use common::{local_backends, run_job, run_once};

async fn tries(storage: &dyn SnapshotWriter, guid: &str) -> u32 {
    storage.load(guid, Some(0)).await.unwrap().state.tries
}

#[tokio::test]
async fn first_run_is_new_then_unchanged_then_changed() {
    init_tracing();
    for (backend, storage) in local_backends().await {
        let fetcher = ScriptedFetcher::constant("v1");
        let job = JobBuilder::new("job-a", fetcher.clone()).name("A").build();
        let guid = job.guid.clone();

        let outcome = run_job(storage.clone(), job.clone()).await;
        assert_eq!(outcome, Outcome::Reported(Verb::New), "{backend}");
        let loaded = storage.load(&guid, None).await.unwrap();
        assert_eq!(loaded.snapshots.len(), 1, "{backend}");
        assert_eq!(loaded.snapshots[0].data, "v1", "{backend}");

        let outcome = run_job(storage.clone(), job.clone()).await;
        assert_eq!(outcome, Outcome::Reported(Verb::Unchanged), "{backend}");
        let loaded = storage.load(&guid, None).await.unwrap();
        assert_eq!(loaded.snapshots.len(), 1, "{backend}");
        assert_eq!(loaded.state.tries, 0, "{backend}");
        assert_eq!(loaded.state.name.as_deref(), Some("A"), "{backend}");
        assert_eq!(loaded.state.location.as_deref(), Some("job-a"), "{backend}");

        fetcher.set([Step::content("v2")]);
        let outcome = run_job(storage.clone(), job).await;
        assert_eq!(outcome, Outcome::Reported(Verb::Changed), "{backend}");
        let loaded = storage.load(&guid, None).await.unwrap();
        assert_eq!(loaded.snapshots.len(), 2, "{backend}");
        assert_eq!(loaded.snapshots[0].data, "v2", "{backend}");
    }
}

#[tokio::test]
async fn reversion_to_recent_version_is_unchanged() {
    init_tracing();
    for (backend, storage) in local_backends().await {
        let job = JobBuilder::new("job-b", ScriptedFetcher::constant("v1"))
            .compared_versions(2)
            .build();
        storage.save(&job.guid, "v1", 1.0).await.unwrap();
        storage.save(&job.guid, "v2", 2.0).await.unwrap();

        let outcome = run_job(storage.clone(), job.clone()).await;
        assert_eq!(outcome, Outcome::Reported(Verb::Unchanged), "{backend}");
        let loaded = storage.load(&job.guid, None).await.unwrap();
        assert_eq!(loaded.snapshots.len(), 2, "{backend}");
        assert_eq!(loaded.snapshots[0].data, "v2", "{backend}");
    }
}

#[tokio::test]
async fn reversion_outside_window_is_changed() {
    init_tracing();
    for (backend, storage) in local_backends().await {
        let job = JobBuilder::new("job-b1", ScriptedFetcher::constant("v1"))
            .compared_versions(1)
            .build();
        storage.save(&job.guid, "v1", 1.0).await.unwrap();
        storage
            .save(&job.guid, "something else entirely", 2.0)
            .await
            .unwrap();

        let outcome = run_job(storage.clone(), job.clone()).await;
        assert_eq!(outcome, Outcome::Reported(Verb::Changed), "{backend}");
        let count = storage.load(&job.guid, None).await.unwrap().snapshots.len();
        assert_eq!(count, 3, "{backend}");
    }
}

#[tokio::test]
async fn small_edit_on_long_page_is_changed_and_stored() {
    init_tracing();
    let page = |price: &str| {
        format!(
            "Welcome to the shop. Today's special offer is listed below.\n\
             Product: Deluxe widget, blue, large size, with free manual.\n\
             Price: {price} EUR\n\
             Shipping within three working days to most countries.\n"
        )
    };
    for (backend, storage) in local_backends().await {
        let fetcher = ScriptedFetcher::constant(&page("10"));
        let job = JobBuilder::new("job-price", fetcher.clone()).build();

        assert_eq!(run_job(storage.clone(), job.clone()).await, Outcome::Reported(Verb::New));

        fetcher.set([Step::content(&page("19"))]);
        let (outcomes, report) = run_once(storage.clone(), vec![job.clone()]).await;
        assert_eq!(outcomes, vec![Outcome::Reported(Verb::Changed)], "{backend}");
        let diff = report.entries[0].cached_diff().unwrap_or_default();
        assert!(diff.contains("+Price: 19 EUR"), "{backend}: {diff}");

        let loaded = storage.load(&job.guid, None).await.unwrap();
        assert_eq!(loaded.snapshots.len(), 2, "{backend}");
        assert_eq!(loaded.snapshots[0].data, page("19"), "{backend}");
    }
}

#[tokio::test]
async fn whitespace_only_drift_is_unchanged() {
    init_tracing();
    for (backend, storage) in local_backends().await {
        let fetcher = ScriptedFetcher::constant("a page\nwith words\n");
        let job = JobBuilder::new("job-ws", fetcher.clone()).build();
        run_job(storage.clone(), job.clone()).await;

        fetcher.set([Step::content("a  page\n\nwith words  \n")]);
        assert_eq!(
            run_job(storage.clone(), job.clone()).await,
            Outcome::Reported(Verb::Unchanged),
            "{backend}"
        );
        assert_eq!(storage.load(&job.guid, None).await.unwrap().snapshots.len(), 1);
    }
}

#[tokio::test]
async fn failures_count_tries_until_budget_is_spent() {
    init_tracing();
    for (backend, storage) in local_backends().await {
        let fetcher = ScriptedFetcher::new([Step::Connection]);
        let job = JobBuilder::new("job-c", fetcher.clone()).max_tries(2).build();
        let guid = job.guid.clone();

        assert_eq!(run_job(storage.clone(), job.clone()).await, Outcome::Retrying { tries: 1 });
        assert_eq!(tries(storage.as_ref(), &guid).await, 1, "{backend}");
        assert_eq!(run_job(storage.clone(), job.clone()).await, Outcome::Retrying { tries: 2 });
        assert_eq!(tries(storage.as_ref(), &guid).await, 2, "{backend}");
        assert_eq!(run_job(storage.clone(), job.clone()).await, Outcome::Reported(Verb::Error));
        assert_eq!(tries(storage.as_ref(), &guid).await, 3, "{backend}");
        assert!(storage.load(&guid, None).await.unwrap().snapshots.is_empty());

        fetcher.set([Step::content("back")]);
        assert_eq!(run_job(storage.clone(), job).await, Outcome::Reported(Verb::New));
        assert_eq!(tries(storage.as_ref(), &guid).await, 0, "{backend}");
    }
}

#[tokio::test]
async fn zero_max_tries_reports_first_failure() {
    init_tracing();
    for (backend, storage) in local_backends().await {
        let job = JobBuilder::new("job-d", ScriptedFetcher::new([Step::Http(500)])).build();
        assert_eq!(run_job(storage, job).await, Outcome::Reported(Verb::Error), "{backend}");
    }
}

#[tokio::test]
async fn ignored_errors_write_nothing() {
    init_tracing();
    for (backend, storage) in local_backends().await {
        let job = JobBuilder::new("job-e", ScriptedFetcher::new([Step::Http(404)]))
            .ignore_http("4xx")
            .build();
        let guid = job.guid.clone();

        let (outcomes, report) = run_once(storage.clone(), vec![job]).await;
        assert_eq!(outcomes, vec![Outcome::Ignored], "{backend}");
        assert!(report.is_empty());
        assert!(!storage.get_guids().await.unwrap().contains(&guid), "{backend}");
    }
}

#[tokio::test]
async fn not_modified_resets_tries_and_sends_etag() {
    init_tracing();
    for (backend, storage) in local_backends().await {
        let fetcher = ScriptedFetcher::new([
            Step::ContentWithEtag("v1".into(), "\"abc\"".into()),
            Step::Connection,
            Step::NotModified,
        ]);
        let job = JobBuilder::new("job-f", fetcher.clone()).max_tries(3).build();
        let guid = job.guid.clone();

        assert_eq!(run_job(storage.clone(), job.clone()).await, Outcome::Reported(Verb::New));
        assert_eq!(run_job(storage.clone(), job.clone()).await, Outcome::Retrying { tries: 1 });
        assert_eq!(run_job(storage.clone(), job).await, Outcome::Reported(Verb::Unchanged));

        let loaded = storage.load(&guid, None).await.unwrap();
        assert_eq!(loaded.state.tries, 0, "{backend}");
        assert_eq!(loaded.state.etag.as_deref(), Some("\"abc\""), "{backend}");
        assert_eq!(loaded.snapshots.len(), 1, "{backend}");

        let requests = fetcher.requests();
        assert_eq!(requests[0].etag, None);
        assert_eq!(requests[2].etag.as_deref(), Some("\"abc\""));
        assert!(requests[2].since.is_some());
    }
}

#[tokio::test]
async fn etag_is_cleared_when_server_stops_sending_it() {
    init_tracing();
    for (backend, storage) in local_backends().await {
        let fetcher = ScriptedFetcher::new([
            Step::ContentWithEtag("v1".into(), "\"abc\"".into()),
            Step::content("v2"),
        ]);
        let job = JobBuilder::new("job-etag", fetcher.clone()).build();

        run_job(storage.clone(), job.clone()).await;
        let state = storage.load(&job.guid, Some(0)).await.unwrap().state;
        assert_eq!(state.etag.as_deref(), Some("\"abc\""), "{backend}");

        run_job(storage.clone(), job.clone()).await;
        let state = storage.load(&job.guid, Some(0)).await.unwrap().state;
        assert_eq!(state.etag, None, "{backend}");
    }
}

#[tokio::test]
async fn changed_jobs_carry_a_unified_diff() {
    init_tracing();
    for (backend, storage) in local_backends().await {
        let fetcher = ScriptedFetcher::new([Step::content("a\nb\n"), Step::content("a\nc\n")]);
        let job = JobBuilder::new("job-g", fetcher).build();

        run_job(storage.clone(), job.clone()).await;
        let (_, report) = run_once(storage.clone(), vec![job]).await;

        assert_eq!(report.count(Verb::Changed), 1, "{backend}");
        let diff = report.entries[0].cached_diff().unwrap_or_default();
        assert!(diff.contains("-b"));
        assert!(diff.contains("+c"));
    }
}

#[cfg(unix)]
#[tokio::test]
async fn failing_diff_tool_keeps_previous_snapshot_and_counts_a_try() {
    init_tracing();
    for (backend, storage) in local_backends().await {
        let fetcher = ScriptedFetcher::new([Step::content("old\n"), Step::content("new\n")]);
        let broken = JobBuilder::new("job-difftool", fetcher.clone())
            .diff_tool("exit 7 #")
            .build();

        run_job(storage.clone(), broken.clone()).await;
        let (outcomes, report) = run_once(storage.clone(), vec![broken.clone()]).await;
        assert_eq!(outcomes, vec![Outcome::Reported(Verb::Error)], "{backend}");
        let traceback = report.entries[0].traceback.as_deref().unwrap_or_default();
        assert!(traceback.contains("exit code 7"), "{backend}: {traceback}");

        let loaded = storage.load(&broken.guid, None).await.unwrap();
        assert_eq!(loaded.snapshots.len(), 1, "{backend}");
        assert_eq!(loaded.snapshots[0].data, "old\n", "{backend}");
        assert_eq!(loaded.state.tries, 1, "{backend}");

        // Same location, working diff: the change is still delivered.
        let fixed = JobBuilder::new("job-difftool", fetcher).build();
        let (outcomes, report) = run_once(storage.clone(), vec![fixed]).await;
        assert_eq!(outcomes, vec![Outcome::Reported(Verb::Changed)], "{backend}");
        assert!(report.entries[0].cached_diff().unwrap_or_default().contains("+new"));
        let loaded = storage.load(&broken.guid, None).await.unwrap();
        assert_eq!(loaded.snapshots.len(), 2, "{backend}");
        assert_eq!(loaded.state.tries, 0, "{backend}");
    }
}

#[tokio::test]
async fn filters_apply_before_classification() {
    init_tracing();
    for (backend, storage) in local_backends().await {
        let fetcher = ScriptedFetcher::new([
            Step::content("keep 1\ndrop x\n"),
            Step::content("keep 1\ndrop y\n"),
        ]);
        let job = JobBuilder::new("job-h", fetcher).filter("grep:keep").build();

        assert_eq!(run_job(storage.clone(), job.clone()).await, Outcome::Reported(Verb::New));
        assert_eq!(
            run_job(storage.clone(), job).await,
            Outcome::Reported(Verb::Unchanged),
            "{backend}"
        );
    }
}
