//! Decode a synthetic two-event point cloud and print evaluation rows.
//!
//! Set `RUST_LOG=embclust=debug` to see per-slice decoder output.

use embclust::cluster::SeedDecoder;
use embclust::config::DecoderConfig;
use embclust::metrics::{evaluate, write_json_lines};
use embclust::points::{NetworkOutput, PointLabels};
use tracing_subscriber::EnvFilter;

fn main() -> embclust::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Event 0 holds two tracks (class 1), event 1 one shower (class 2).
    let labels = PointLabels {
        coords: vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [2.0, 0.0, 0.0],
            [20.0, 5.0, 0.0],
            [21.0, 5.0, 0.0],
            [8.0, 8.0, 8.0],
            [9.0, 8.0, 8.0],
        ],
        batch: vec![0, 0, 0, 0, 0, 1, 1],
        semantic: vec![1, 1, 1, 1, 1, 2, 2],
        group: vec![0, 0, 0, 1, 1, 0, 0],
    };
    let output = NetworkOutput {
        embeddings: vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![0.0, 0.1],
            vec![3.0, 3.0],
            vec![3.1, 3.0],
            vec![-2.0, 1.0],
            vec![-2.1, 1.0],
        ],
        seediness: vec![0.95, 0.9, 0.7, 0.99, 0.6, 0.97, 0.9],
        margins: vec![vec![0.5]; 7],
        ..NetworkOutput::default()
    };

    // Decode event 0 directly.
    let decoded = SeedDecoder::new(0.5, 0.5).fit_predict(
        &output.embeddings[..5],
        &output.seediness[..5],
        &output.margins[..5],
    )?;
    println!("event 0 labels: {:?}", decoded.labels_i64());
    for (k, sphere) in decoded.spheres.iter().enumerate() {
        println!("  cluster {k}: centroid {:?} sigma {:?}", sphere.centroid, sphere.sigma);
    }

    // Full evaluation with per-class thresholds.
    let rows = evaluate(&output, &labels, &DecoderConfig::default())?;
    write_json_lines(&rows, std::io::stdout().lock())?;
    Ok(())
}
