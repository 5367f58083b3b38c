//! End-to-end runs on a tiny synthetic X-ray dataset

use std::fs;
use std::path::Path;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;
use image::{GrayImage, Luma};

use covidx_train::training::history::EpochLog;
use covidx_train::{run_training, History, Metric, TrainError, TrainingConfig};

type TestBackend = Autodiff<NdArray>;

const CLASSES: [&str; 2] = ["covid-19", "normal"];

fn write_split(root: &Path, split: &str, per_class: &[usize]) {
    for (label, (&class, &count)) in CLASSES.iter().zip(per_class).enumerate() {
        let dir = root.join(split).join(class);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            let shade = 30 + 150 * label as u8 + (i as u8 % 5) * 5;
            GrayImage::from_pixel(40, 40, Luma([shade]))
                .save(dir.join(format!("{:03}.png", i)))
                .unwrap();
        }
    }
}

fn tiny_config() -> TrainingConfig {
    TrainingConfig {
        epochs: 2,
        epochs_ft: 1,
        image_size: 32,
        batch_size: 2,
        base_width: 2,
        hidden_units: 4,
        ..Default::default()
    }
}

#[test]
fn test_full_run_writes_all_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    let model_dir = dir.path().join("model");
    write_split(&data, "train", &[2, 4]);
    write_split(&data, "validation", &[1, 2]);

    let config = TrainingConfig {
        class_weights: true,
        ..tiny_config()
    };
    let summary = run_training::<TestBackend>(&data, &model_dir, &config, None, Default::default()).unwrap();

    assert_eq!(summary.class_names, vec!["covid-19", "normal"]);
    let weights = summary.class_weights.unwrap();
    assert!((weights[0] - 1.5).abs() < 1e-6);
    assert!((weights[1] - 0.75).abs() < 1e-6);

    assert!(model_dir.join("model_no_ft.mpk").is_file());
    assert!(model_dir.join("model.mpk").is_file());
    for epoch in ["01", "02", "03"] {
        assert!(model_dir.join("checkpoints").join(format!("{}.mpk", epoch)).is_file());
    }
    for metric in Metric::ALL {
        assert!(model_dir.join("training").join(format!("{}.svg", metric.name())).is_file());
    }
    assert!(model_dir.join("logs").join("config.json").is_file());

    // fine-tuning picks up where the classifier phase stopped
    assert_eq!(summary.history.classifier.epochs(), vec![0, 1]);
    assert_eq!(summary.history.fine_tune.epochs(), vec![2]);

    let records = EpochLog::read_all(&model_dir.join("logs").join("epochs.jsonl")).unwrap();
    let phases: Vec<&str> = records.iter().map(|r| r.phase.as_str()).collect();
    assert_eq!(phases, vec!["classifier", "classifier", "fine_tune"]);

    let history = History::load_json(&model_dir.join("logs").join("history.json")).unwrap();
    assert_eq!(history.epochs(), vec![0, 1, 2]);
    assert_eq!(history.records[2].phase, "fine_tune");

    // every validation image lands in the final confusion matrix
    assert_eq!(summary.confusion_matrix.total(), 3);
}

#[test]
fn test_existing_output_directory_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    write_split(&data, "train", &[1, 1]);
    write_split(&data, "validation", &[1, 1]);
    let model_dir = dir.path().join("model");
    fs::create_dir(&model_dir).unwrap();

    let err = run_training::<TestBackend>(&data, &model_dir, &tiny_config(), None, Default::default()).unwrap_err();

    assert!(matches!(err, TrainError::OutputExists(_)));
    assert!(!model_dir.join("checkpoints").exists());
}

#[test]
fn test_missing_covid_class_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    for split in ["train", "validation"] {
        let class_dir = data.join(split).join("normal");
        fs::create_dir_all(&class_dir).unwrap();
        GrayImage::from_pixel(8, 8, Luma([100])).save(class_dir.join("a.png")).unwrap();
    }

    let err = run_training::<TestBackend>(
        &data,
        &dir.path().join("model"),
        &tiny_config(),
        None,
        Default::default(),
    )
    .unwrap_err();

    assert!(matches!(err, TrainError::MissingClass(name) if name == "covid-19"));
}
