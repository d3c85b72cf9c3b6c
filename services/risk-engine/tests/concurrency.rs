use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use chrono::NaiveDate;
use risk_engine::artifact::{FeatureSchemaDoc, ModelBundle, VersionMeta};
use risk_engine::predictor::{LinearModel, PredictorSpec};
use risk_engine::scoring::{score, ScoreRequest};
use risk_engine::store::{ArtifactStore, VersionDocuments};
use risk_engine::{ModelHandle, RiskService};
use tempfile::TempDir;

const FEATURES: [&str; 3] = ["a", "b", "c"];

fn docs(weight: f64) -> VersionDocuments {
    let features: Vec<String> = FEATURES.iter().map(|s| s.to_string()).collect();
    VersionDocuments {
        bundle: ModelBundle {
            model: PredictorSpec::Linear(LinearModel { coefficients: vec![weight; 3], intercept: 0.0 }),
            scaler: None,
            model_type: "LogisticRegression".into(),
            feature_columns: features.clone(),
            fill_values: BTreeMap::new(),
            feature_weights: features.iter().map(|f| (f.clone(), weight)).collect(),
            horizon_days: None,
        },
        meta: VersionMeta::default(),
        schema: FeatureSchemaDoc::Plain { features },
        metrics: serde_json::json!({}),
        model_card: None,
    }
}

fn request() -> ScoreRequest {
    ScoreRequest {
        drive_id: "d".into(),
        day: NaiveDate::from_ymd_opt(2026, 2, 20).unwrap(),
        features: FEATURES.iter().map(|f| (f.to_string(), Some(1.0))).collect(),
    }
}

#[test]
fn concurrent_scores_on_stable_snapshot_agree() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::open(tmp.path()).unwrap();
    store.publish_version("v1", &docs(0.4)).unwrap();
    let handle = Arc::new(ModelHandle::new(store, None));
    let snapshot = handle.get_or_load().unwrap();
    let expected = score(&snapshot, &request().features).unwrap();

    let workers: Vec<_> = (0..8)
        .map(|_| {
            let snap = snapshot.clone();
            thread::spawn(move || (0..200).map(|_| score(&snap, &request().features).unwrap()).collect::<Vec<_>>())
        })
        .collect();
    for w in workers {
        for got in w.join().unwrap() {
            assert_eq!(got, expected);
        }
    }
}

#[test]
fn first_use_races_bootstrap_once() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::open(tmp.path()).unwrap();
    let handle = Arc::new(ModelHandle::new(store.clone(), None));

    let workers: Vec<_> = (0..6)
        .map(|_| {
            let h = handle.clone();
            thread::spawn(move || h.get_or_load().unwrap().version_id.clone())
        })
        .collect();
    let ids: Vec<String> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    assert!(ids.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(store.list_versions().unwrap().len(), 1);
}

#[test]
fn reload_never_exposes_a_partial_model() {
    let tmp = TempDir::new().unwrap();
    let store = ArtifactStore::open(tmp.path()).unwrap();
    store.publish_version("v1", &docs(0.4)).unwrap();
    store.publish_version("v2", &docs(-0.4)).unwrap();
    store.set_active("v1").unwrap();
    let service = RiskService::new(Arc::new(ModelHandle::new(store.clone(), None)));
    service.get_model_info().unwrap();

    let scorers: Vec<_> = (0..4)
        .map(|_| {
            let svc = service.clone();
            thread::spawn(move || {
                for _ in 0..300 {
                    let res = svc.score(&request()).unwrap();
                    // every reason must agree in sign with the version that produced it
                    let up = res.risk_score > 0.5;
                    assert!(res.top_reasons.iter().all(|r| (r.contribution > 0.0) == up), "{res:?}");
                }
            })
        })
        .collect();

    for i in 0..40 {
        store.set_active(if i % 2 == 0 { "v2" } else { "v1" }).unwrap();
        service.reload().unwrap();
    }
    for s in scorers {
        s.join().unwrap();
    }
}
