use embclust::cluster::{cluster_remainder, find_cluster_means, AssignmentPolicy, SeedDecoder};
use embclust::loss::{inter_cluster_loss, intra_cluster_loss};
use embclust::metrics::{adjusted_rand_index, f_score, purity_efficiency};
use proptest::prelude::*;

fn labelled_points() -> impl Strategy<Value = Vec<(i64, Vec<f32>)>> {
    prop::collection::vec(
        (-1i64..4, prop::collection::vec(-10.0f32..10.0, 2)),
        1..30,
    )
}

proptest! {
    #[test]
    fn prop_centroids_are_group_means(points in labelled_points()) {
        let labels: Vec<i64> = points.iter().map(|p| p.0).collect();
        let features: Vec<Vec<f32>> = points.iter().map(|p| p.1.clone()).collect();
        let (groups, means) = find_cluster_means(&features, &labels).unwrap();

        prop_assert_eq!(groups.len(), means.len());
        prop_assert!(groups.windows(2).all(|w| w[0] < w[1]));
        for (g, m) in groups.iter().zip(&means) {
            let members: Vec<&Vec<f32>> = features
                .iter()
                .zip(&labels)
                .filter(|(_, l)| *l == g)
                .map(|(f, _)| f)
                .collect();
            prop_assert!(!members.is_empty());
            for k in 0..2 {
                let expected = members.iter().map(|f| f[k]).sum::<f32>() / members.len() as f32;
                prop_assert!((m[k] - expected).abs() < 1e-3);
            }
        }
    }

    #[test]
    fn prop_discriminative_terms_are_non_negative(
        points in labelled_points(),
        intra in 0.0f32..2.0,
        inter in 0.0f32..3.0,
    ) {
        let labels: Vec<i64> = points.iter().map(|p| p.0).collect();
        let features: Vec<Vec<f32>> = points.iter().map(|p| p.1.clone()).collect();
        let (_, means) = find_cluster_means(&features, &labels).unwrap();

        prop_assert!(intra_cluster_loss(&features, &labels, &means, intra, 2.0) >= 0.0);
        prop_assert!(inter_cluster_loss(&means, inter, 2.0) >= 0.0);
        prop_assert_eq!(inter_cluster_loss(&means[..1], inter, 2.0), 0.0);
    }

    #[test]
    fn prop_partition_scores_are_bounded(
        pairs in prop::collection::vec((0usize..5, 0i64..5), 1..50)
    ) {
        let pred: Vec<usize> = pairs.iter().map(|p| p.0).collect();
        let truth: Vec<i64> = pairs.iter().map(|p| p.1).collect();
        let (p, e) = purity_efficiency(&pred, &truth).unwrap();
        prop_assert!((0.0..=1.0).contains(&p));
        prop_assert!((0.0..=1.0).contains(&e));
        prop_assert!((0.0..=1.0).contains(&f_score(p, e)));
        prop_assert!(adjusted_rand_index(&pred, &truth).unwrap() <= 1.0 + 1e-9);
    }

    #[test]
    fn prop_every_point_labelled_when_all_seeds_pass(
        points in prop::collection::vec(
            (prop::collection::vec(-5.0f32..5.0, 3), 0.0f32..1.0, 0.05f32..2.0),
            1..25,
        ),
        best_fit in any::<bool>(),
    ) {
        let embeddings: Vec<Vec<f32>> = points.iter().map(|p| p.0.clone()).collect();
        let seediness: Vec<f32> = points.iter().map(|p| p.1).collect();
        let margins: Vec<Vec<f32>> = points.iter().map(|p| vec![p.2]).collect();
        let policy = if best_fit { AssignmentPolicy::BestFit } else { AssignmentPolicy::FirstClaim };

        // BestFit may stop before every point is peeled; cluster_all covers the rest.
        let out = SeedDecoder::new(0.0, 0.5)
            .with_policy(policy)
            .with_cluster_all(best_fit)
            .fit_predict(&embeddings, &seediness, &margins)
            .unwrap();

        prop_assert!(out.num_clusters() >= 1);
        prop_assert!(out.num_clusters() <= embeddings.len());
        for l in &out.labels {
            let k = l.expect("every point is labelled when every seed passes");
            prop_assert!(k < out.num_clusters());
        }
    }

    #[test]
    fn prop_remainder_fills_only_gaps(
        rows in prop::collection::vec(
            (prop::collection::vec(-5.0f32..5.0, 2), prop::option::of(0usize..3)),
            1..30,
        )
    ) {
        let embeddings: Vec<Vec<f32>> = rows.iter().map(|r| r.0.clone()).collect();
        let labels: Vec<Option<usize>> = rows.iter().map(|r| r.1).collect();
        let out = cluster_remainder(&embeddings, &labels).unwrap();

        prop_assert_eq!(out.len(), labels.len());
        for (before, after) in labels.iter().zip(&out) {
            if before.is_some() {
                prop_assert_eq!(before, after);
            }
        }
        if labels.iter().any(|l| l.is_some()) {
            prop_assert!(out.iter().all(|l| l.is_some()));
            for l in out.iter().flatten() {
                prop_assert!(labels.contains(&Some(*l)));
            }
        } else {
            prop_assert_eq!(out, labels);
        }
    }
}
