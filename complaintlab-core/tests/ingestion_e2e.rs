//! End-to-end ingestion runs against a scripted transport.

use chrono::NaiveDate;
use complaintlab_core::ingest::{
    DataIngestion, DataIngestionConfig, FeatureStore, IngestError, IngestionMetadataStore,
    IngestionSettings, RawResponse, Sleeper, Transport,
};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_dir() -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let dir = std::env::temp_dir().join(format!(
        "complaintlab_ingestion_e2e_{}_{id}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    dir
}

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Pops one scripted response per call; the last one repeats.
struct Scripted {
    responses: Mutex<VecDeque<RawResponse>>,
    urls: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(responses: Vec<RawResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            urls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.urls.lock().unwrap().len()
    }
}

impl Transport for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn get(&self, url: &str) -> Result<RawResponse, IngestError> {
        self.urls.lock().unwrap().push(url.to_string());
        let mut queue = self.responses.lock().unwrap();
        Ok(if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        })
    }
}

#[derive(Default)]
struct RecordingSleeper(Mutex<Vec<Duration>>);

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.0.lock().unwrap().push(duration);
    }
}

fn complaints(ids: &[u32]) -> RawResponse {
    let hits: Vec<String> = ids
        .iter()
        .map(|id| {
            format!(
                r#"{{"_index": "complaint", "_source": {{"complaint_id": "{id}", "product": "Mortgage", "consumer_disputed": "No"}}}}"#
            )
        })
        .collect();
    RawResponse::ok(format!("[{}]", hits.join(",")))
}

fn settings(from: &str, to: &str, retries: u32) -> IngestionSettings {
    IngestionSettings {
        from_date: Some(from.to_string()),
        to_date: Some(to.to_string()),
        retry_budget: retries,
        ..Default::default()
    }
}

fn run(
    pipeline_dir: &Path,
    run_timestamp: &str,
    settings: &IngestionSettings,
    transport: Arc<Scripted>,
    sleeper: Arc<RecordingSleeper>,
) -> (DataIngestion, complaintlab_core::DataIngestionArtifact) {
    let config =
        DataIngestionConfig::resolve(pipeline_dir, run_timestamp, settings, d("2023-01-01"))
            .unwrap();
    let mut service = DataIngestion::new(config, transport, sleeper);
    let artifact = service.run().unwrap();
    (service, artifact)
}

#[test]
fn short_window_is_one_request_one_append_one_record() {
    let dir = temp_dir();
    let transport = Scripted::new(vec![complaints(&[1, 2, 3])]);

    let (service, artifact) = run(
        &dir,
        "20230101_000000",
        &settings("2022-07-01", "2022-07-05", 5),
        transport.clone(),
        Arc::new(RecordingSleeper::default()),
    );

    assert_eq!(transport.calls(), 1);
    assert!(service.failed_downloads().is_empty());
    assert!(artifact
        .download_dir
        .join("finance_complaint_2022-07-01_2022-07-05.json")
        .exists());

    let store = FeatureStore::new(&artifact.feature_store_path);
    assert_eq!(store.part_count().unwrap(), 1);
    let df = store.read(None).unwrap();
    assert_eq!(df.height(), 3);
    assert!(df.column("_index").is_err());

    let record = IngestionMetadataStore::new(&artifact.metadata_file_path)
        .read()
        .unwrap();
    assert_eq!(record.from_date, d("2022-07-01"));
    assert_eq!(record.to_date, d("2022-07-05"));
    assert_eq!(record.data_file_path, artifact.feature_store_path);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn second_run_resumes_from_recorded_to_date() {
    let dir = temp_dir();

    let (_, first) = run(
        &dir,
        "run_1",
        &settings("2022-07-01", "2022-07-05", 5),
        Scripted::new(vec![complaints(&[1, 2])]),
        Arc::new(RecordingSleeper::default()),
    );

    // Caller asks for an older window again; metadata wins.
    let transport = Scripted::new(vec![complaints(&[3])]);
    let (_, second) = run(
        &dir,
        "run_2",
        &settings("2022-01-01", "2022-07-09", 5),
        transport.clone(),
        Arc::new(RecordingSleeper::default()),
    );

    assert_eq!(first.feature_store_path, second.feature_store_path);
    let urls = transport.urls.lock().unwrap().clone();
    assert_eq!(urls.len(), 1);
    assert!(urls[0].contains("date_received_min=2022-07-05"));
    assert!(urls[0].contains("date_received_max=2022-07-09"));

    let store = FeatureStore::new(&second.feature_store_path);
    assert_eq!(store.part_count().unwrap(), 2);
    assert_eq!(store.read(None).unwrap().height(), 3);

    let record = IngestionMetadataStore::new(&second.metadata_file_path)
        .read()
        .unwrap();
    assert_eq!(record.from_date, d("2022-07-05"));
    assert_eq!(record.to_date, d("2022-07-09"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn retries_sleep_for_hint_and_keep_dead_letters() {
    let dir = temp_dir();
    let throttled = RawResponse {
        status: 429,
        body: b"Too many requests, try again in 4 seconds".to_vec(),
    };
    let transport = Scripted::new(vec![throttled.clone(), throttled, complaints(&[7])]);
    let sleeper = Arc::new(RecordingSleeper::default());

    let (service, artifact) = run(
        &dir,
        "20230101_000000",
        &settings("2022-07-01", "2022-07-05", 5),
        transport.clone(),
        sleeper.clone(),
    );

    assert_eq!(transport.calls(), 3);
    assert!(service.failed_downloads().is_empty());
    assert_eq!(
        *sleeper.0.lock().unwrap(),
        vec![Duration::from_secs(6), Duration::from_secs(6)]
    );

    let failed_dir = artifact.download_dir.parent().unwrap().join("failed_downloaded_files");
    let mut dead: Vec<String> = fs::read_dir(&failed_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    dead.sort();
    assert_eq!(
        dead,
        vec!["finance_complaint_2022-07-01_2022-07-05.json"]
    );
    let letter = fs::read_to_string(failed_dir.join(&dead[0])).unwrap();
    assert!(letter.contains("try again in 4 seconds"));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn long_wait_hint_is_honoured_by_default() {
    let dir = temp_dir();
    let throttled = RawResponse {
        status: 429,
        body: br#"{"message": "rate limit exceeded, retry in 1000 seconds"}"#.to_vec(),
    };
    let transport = Scripted::new(vec![throttled, complaints(&[1])]);
    let sleeper = Arc::new(RecordingSleeper::default());

    let (service, _) = run(
        &dir,
        "20230101_000000",
        &settings("2022-07-01", "2022-07-05", 5),
        transport,
        sleeper.clone(),
    );

    assert!(service.failed_downloads().is_empty());
    assert_eq!(*sleeper.0.lock().unwrap(), vec![Duration::from_secs(1002)]);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn exhausted_interval_is_skipped_and_others_still_land() {
    let dir = temp_dir();
    // Weekly plan: three sub-windows. The first exhausts a budget of 1
    // (two attempts), the remaining two succeed.
    let bad = RawResponse {
        status: 500,
        body: b"internal error".to_vec(),
    };
    let transport = Scripted::new(vec![bad.clone(), bad, complaints(&[1]), complaints(&[2])]);

    let (service, artifact) = run(
        &dir,
        "20230101_000000",
        &settings("2022-07-01", "2022-07-20", 1),
        transport.clone(),
        Arc::new(RecordingSleeper::default()),
    );

    assert_eq!(transport.calls(), 4);
    assert_eq!(service.failed_downloads().len(), 1);
    assert!(service.failed_downloads()[0]
        .url
        .contains("date_received_max=2022-07-08"));

    let store = FeatureStore::new(&artifact.feature_store_path);
    assert_eq!(store.part_count().unwrap(), 2);

    // The resume point still moves to the requested to_date.
    let record = IngestionMetadataStore::new(&artifact.metadata_file_path)
        .read()
        .unwrap();
    assert_eq!(record.to_date, d("2022-07-20"));

    let _ = fs::remove_dir_all(&dir);
}
