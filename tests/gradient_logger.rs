use std::{fs, num::NonZeroUsize};

use neuraltrack::logging::{
    EpochGradientRecord, EpochLog, GradientLogger, NamedParameter, ParameterSource,
};

/// A tiny two layer model whose second layer took no part in the last backward pass.
struct Model {
    fc1_weight: Vec<f32>,
    fc1_bias: Vec<f32>,
}

impl ParameterSource for Model {
    fn named_parameters(&self) -> Vec<NamedParameter<'_>> {
        vec![
            NamedParameter {
                name: "fc1.weight",
                grad: Some(self.fc1_weight.as_slice()),
            },
            NamedParameter {
                name: "fc1.bias",
                grad: Some(self.fc1_bias.as_slice()),
            },
            NamedParameter {
                name: "fc2.weight",
                grad: None,
            },
            NamedParameter {
                name: "fc2.bias",
                grad: Some(&[][..]),
            },
        ]
    }
}

fn model() -> Model {
    Model {
        fc1_weight: vec![1.0, -2.0, 3.0, 0.0],
        fc1_bias: vec![0.5],
    }
}

fn interval(n: usize) -> NonZeroUsize {
    NonZeroUsize::new(n).unwrap()
}

#[test]
fn off_interval_epochs_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gradient_log.json");
    let mut logger = GradientLogger::new(&path, interval(10)).unwrap();

    assert!(!logger.log_gradients(5, &model()).unwrap());

    assert!(logger.get_gradient_data().is_empty());
    assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
}

#[test]
fn interval_epochs_snapshot_every_parameter_with_a_gradient() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gradient_log.json");
    let mut logger = GradientLogger::new(&path, interval(10)).unwrap();
    let model = model();

    logger.log_gradients(5, &model).unwrap();
    assert!(logger.log_gradients(10, &model).unwrap());

    let log = logger.get_gradient_data();
    assert_eq!(log.epochs().collect::<Vec<_>>(), [10]);

    let record = log.get(10).unwrap();
    assert_eq!(record.layers().collect::<Vec<_>>(), ["fc1", "fc1 (bias)"]);

    let fc1 = record.get("fc1").unwrap();
    assert_eq!(fc1.mean, 0.5);
    assert_eq!(fc1.median, 0.5);
    assert_eq!(fc1.max, 3.0);
    assert_eq!(fc1.min, -2.0);
    assert_eq!(record.get("fc1 (bias)").unwrap().mean, 0.5);
}

#[test]
fn epoch_zero_is_always_logged() {
    let dir = tempfile::tempdir().unwrap();
    let mut logger = GradientLogger::new(dir.path().join("g.json"), interval(3)).unwrap();

    assert!(logger.log_gradients(0, &model()).unwrap());
    assert!(!logger.log_gradients(1, &model()).unwrap());
    assert!(logger.log_gradients(3, &model()).unwrap());

    assert_eq!(logger.get_gradient_data().len(), 2);
}

#[test]
fn log_file_is_rewritten_synchronously() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gradient_log.json");
    let mut logger = GradientLogger::new(&path, interval(1)).unwrap();

    logger.log_gradients(1, &model()).unwrap();
    logger.log_gradients(2, &model()).unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\n    \"epoch_1\": {\n        \"fc1\": {\n            \"mean\": 0.5,"));

    let on_disk: EpochLog<EpochGradientRecord> = serde_json::from_str(&raw).unwrap();
    assert_eq!(&on_disk, logger.get_gradient_data());
}

#[test]
fn parameter_lists_are_sources() {
    let dir = tempfile::tempdir().unwrap();
    let mut logger = GradientLogger::new(dir.path().join("g.json"), interval(10)).unwrap();
    let params = vec![
        ("encoder.weight".to_string(), Some(vec![2.0_f32, 4.0])),
        ("encoder.bias".to_string(), None),
    ];

    logger.log_gradients(20, &params).unwrap();

    let record = logger.get_gradient_data().get(20).unwrap();
    assert_eq!(record.len(), 1);
    assert_eq!(record.get("encoder").unwrap().median, 3.0);
}

#[test]
fn repeated_reads_are_equal() {
    let dir = tempfile::tempdir().unwrap();
    let mut logger = GradientLogger::new(dir.path().join("g.json"), interval(10)).unwrap();
    logger.log_gradients(0, &model()).unwrap();

    assert_eq!(logger.get_gradient_data(), logger.get_gradient_data());
}

#[test]
fn layers_keep_the_model_order_past_ten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gradient_log.json");
    let mut logger = GradientLogger::new(&path, interval(1)).unwrap();
    let params: Vec<_> = (1..=12)
        .map(|i| (format!("layer{i}.weight"), Some(vec![i as f32])))
        .collect();
    let expected: Vec<String> = (1..=12).map(|i| format!("layer{i}")).collect();

    logger.log_gradients(1, &params).unwrap();

    let record = logger.get_gradient_data().get(1).unwrap();
    assert_eq!(record.layers().collect::<Vec<_>>(), expected);

    let raw = fs::read_to_string(&path).unwrap();
    let positions: Vec<usize> = expected
        .iter()
        .map(|layer| raw.find(&format!("\"{layer}\"")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    let on_disk: EpochLog<EpochGradientRecord> = serde_json::from_str(&raw).unwrap();
    assert_eq!(on_disk.get(1).unwrap().layers().collect::<Vec<_>>(), expected);
}

#[test]
fn non_finite_gradients_survive_the_log_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gradient_log.json");
    let mut logger = GradientLogger::new(&path, interval(1)).unwrap();
    let params = vec![("fc.weight", Some(vec![1.0_f32, f32::NAN, f32::INFINITY]))];

    logger.log_gradients(1, &params).unwrap();

    let raw = fs::read_to_string(&path).unwrap();
    assert!(raw.contains("\"mean\": \"NaN\""));
    assert!(raw.contains("\"median\": \"Infinity\""));
    assert!(!raw.contains("null"));

    let on_disk: EpochLog<EpochGradientRecord> = serde_json::from_str(&raw).unwrap();
    let stats = on_disk.get(1).unwrap().get("fc").unwrap();
    assert!(stats.mean.is_nan());
    assert_eq!(stats.median, f64::INFINITY);
    assert!(stats.max.is_nan());
    assert_eq!(stats.min, 1.0);
}
