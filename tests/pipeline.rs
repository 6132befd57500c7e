use embclust::cluster::{AssignmentPolicy, Kernel, SeedDecoder};
use embclust::config::{DecoderConfig, LossConfig};
use embclust::loss::{build_loss, LossKind, Term};
use embclust::metrics::{adjusted_rand_index, evaluate, purity_efficiency, write_json_lines};
use embclust::points::{NetworkOutput, PointLabels, Replica};
use rand::prelude::*;

const CENTERS: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [0.0, 10.0, 0.0]];

/// Three tight blobs of `per_blob` points each, jittered by at most 0.3 per axis.
fn blobs(rng: &mut StdRng, per_blob: usize) -> (Vec<Vec<f32>>, Vec<i64>) {
    let mut embeddings = Vec::new();
    let mut truth = Vec::new();
    for (g, c) in CENTERS.iter().enumerate() {
        for _ in 0..per_blob {
            embeddings.push(c.iter().map(|v| v + rng.random_range(-0.3f32..0.3)).collect());
            truth.push(g as i64);
        }
    }
    (embeddings, truth)
}

#[test]
fn separated_blobs_decode_perfectly() {
    let mut rng = StdRng::seed_from_u64(7);
    let (embeddings, truth) = blobs(&mut rng, 20);
    let n = embeddings.len();
    let seediness: Vec<f32> = (0..n).map(|_| rng.random::<f32>()).collect();

    for policy in [AssignmentPolicy::FirstClaim, AssignmentPolicy::BestFit] {
        for kernel in [Kernel::Gaussian, Kernel::Ellipsoidal] {
            let margins = vec![vec![1.0; kernel.bandwidth_len(3)]; n];
            let out = SeedDecoder::new(0.0, 0.5)
                .with_kernel(kernel)
                .with_policy(policy)
                .fit_predict(&embeddings, &seediness, &margins)
                .unwrap();

            assert_eq!(out.num_clusters(), 3, "{policy}/{kernel}");
            let (p, e) = purity_efficiency(&out.labels, &truth).unwrap();
            assert_eq!((p, e), (1.0, 1.0));
            let ari = adjusted_rand_index(&out.labels, &truth).unwrap();
            assert!((ari - 1.0).abs() < 1e-12);
        }
    }
}

fn two_event_labels() -> PointLabels {
    // Event 0: class 1 with two instances, class 3 with one.
    // Event 1: class 1 with one instance.
    let coords = vec![
        [0.0, 0.0, 0.0],
        [1.0, 0.0, 0.0],
        [50.0, 0.0, 0.0],
        [51.0, 0.0, 0.0],
        [9.0, 9.0, 9.0],
        [2.0, 2.0, 2.0],
        [2.0, 4.0, 2.0],
    ];
    PointLabels {
        coords,
        batch: vec![0, 0, 0, 0, 0, 1, 1],
        semantic: vec![1, 1, 1, 1, 3, 1, 1],
        group: vec![0, 0, 1, 1, 0, 4, 4],
    }
}

fn perfect_output(labels: &PointLabels) -> NetworkOutput {
    let embeddings: Vec<Vec<f32>> = labels
        .group
        .iter()
        .zip(&labels.semantic)
        .map(|(&g, &c)| vec![g as f32 * 10.0, c as f32 * 10.0])
        .collect();
    let n = embeddings.len();
    NetworkOutput {
        embeddings,
        seediness: vec![1.0; n],
        margins: vec![vec![0.5]; n],
        ..NetworkOutput::default()
    }
}

#[test]
fn evaluation_rows_per_true_cluster() {
    let labels = two_event_labels();
    let output = perfect_output(&labels);
    let rows = evaluate(&output, &labels, &DecoderConfig::default()).unwrap();

    // (0, 1): 2 rows, (0, 3): 1 row, (1, 1): 1 row
    assert_eq!(rows.len(), 4);
    assert_eq!(
        rows.iter().map(|r| (r.index, r.class)).collect::<Vec<_>>(),
        vec![(0, 1), (0, 1), (0, 3), (1, 1)]
    );
    for r in &rows {
        assert_eq!((r.purity, r.efficiency, r.fscore), (1.0, 1.0, 1.0));
        assert!((r.margin - 0.5).abs() < 1e-9);
    }
    assert_eq!(rows[0].num_clusters, 2);
    assert_eq!(rows[0].seed_threshold, 0.92);
    assert!((rows[0].true_size - 0.0).abs() < 1e-9);
    assert!((rows[3].true_size - 0.0).abs() < 1e-9);

    let mut buf = Vec::new();
    write_json_lines(&rows, &mut buf).unwrap();
    let text = String::from_utf8(buf).unwrap();
    assert_eq!(text.lines().count(), 4);
    let first: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
    assert_eq!(first["Class"], 1);
    assert_eq!(first["FScore"], 1.0);
}

#[test]
fn every_loss_runs_on_a_replica() {
    let labels = two_event_labels();
    let mut output = perfect_output(&labels);
    output.segmentation = labels
        .semantic
        .iter()
        .map(|&c| {
            let mut row = vec![0.0; 5];
            row[c] = 5.0;
            row
        })
        .collect();

    for kind in LossKind::ALL {
        let mut output = output.clone();
        if kind == LossKind::FixedCentroid {
            output.embeddings = labels.coords.iter().map(|c| c.iter().map(|v| v / 512.0).collect()).collect();
        }
        if kind == LossKind::Bivariate {
            let d = output.embeddings[0].len();
            output.margins = vec![vec![0.5; d]; labels.len()];
        }
        let cfg = LossConfig {
            loss: kind,
            ..LossConfig::default()
        };
        let loss = build_loss(&cfg).unwrap();
        let replicas = vec![Replica::new(output, labels.clone())];
        let report = loss.compute(&replicas).unwrap();

        assert!(report.loss.is_finite(), "{kind}");
        assert!(report.per_class.get(1).unwrap().is_some(), "{kind}");
        assert!(report.per_class.get(3).unwrap().is_some(), "{kind}");
        assert!(report.per_class.get(0).unwrap().is_none(), "{kind}");
        if kind == LossKind::MultiScale {
            assert!(report.segmentation_accuracy.is_some());
            assert!(report.terms.contains_key(&Term::Segmentation));
        }
    }
}

#[test]
fn replicas_average_equally() {
    let labels = two_event_labels();
    let output = perfect_output(&labels);
    let loss = build_loss(&LossConfig::default()).unwrap();

    let one = loss.compute(&[Replica::new(output.clone(), labels.clone())]).unwrap();
    let empty = Replica::new(NetworkOutput::default(), PointLabels::default());
    let two = loss
        .compute(&[
            Replica::new(output.clone(), labels.clone()),
            empty,
            Replica::new(output, labels),
        ])
        .unwrap();
    assert!((one.loss - two.loss).abs() < 1e-6);
    assert_eq!(one.accuracy, two.accuracy);
}
