//! Register a synthetic room model against a displaced, cluttered scan.
//!
//! Run with `RUST_LOG=debug cargo run --example register_room` to see the
//! per-level and per-seed progress.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scanalign::{register, transform_points, PointSet, RegistrationConfig, RigidPose, SurfaceModel};

fn room() -> PointSet {
    let s = 0.03;
    let mut pts = Vec::new();
    for i in 0..67 {
        let x = 0.6 + i as f32 * s;
        for j in 0..50 {
            pts.push([x, -0.4, -0.75 + j as f32 * s]);
        }
        for k in 1..40 {
            pts.push([x, -0.4 + k as f32 * s, -0.75]);
        }
    }
    for j in 0..50 {
        for k in 1..40 {
            pts.push([2.6, -0.4 + k as f32 * s, -0.75 + j as f32 * s]);
        }
    }
    PointSet::from_points(&pts)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // y-up, the default convention
    let up = [0.0, 1.0, 0.0];
    let truth = RigidPose::from_axis_angle(up, 8f32.to_radians())
        .compose(&RigidPose::from_translation([0.06, 0.01, -0.04]));

    let model_points = room();
    let mut scan_points: Vec<[f32; 3]> = transform_points(&model_points, &truth)
        .iter_points()
        .collect();

    let mut rng = StdRng::seed_from_u64(3);
    for _ in 0..scan_points.len() / 5 {
        scan_points.push([
            rng.gen_range(0.3f32..3.0),
            rng.gen_range(-0.6f32..1.0),
            rng.gen_range(-1.0f32..1.0),
        ]);
    }
    let scan = PointSet::from_points(&scan_points);
    let model = SurfaceModel::new("room", model_points);

    let config = RegistrationConfig::default().with_levels(vec![0.09, 0.06, 0.03], vec![0.25, 0.15, 0.08]);

    match register(&scan, &model, &config) {
        Ok(result) => {
            let err = result.pose.compose(&truth.inverse());
            println!("Model:           {}", result.model_id);
            println!("Seeds evaluated: {}", result.seeds_evaluated);
            println!("Iterations:      {}", result.metrics.iterations);
            println!("RMSE:            {:.5} m", result.metrics.rmse);
            println!("Inlier fraction: {:.3}", result.metrics.inlier_fraction);
            println!("Low confidence:  {}", result.low_confidence);
            println!("Elapsed:         {:?}", result.metrics.elapsed);
            println!(
                "Error vs truth:  {:.3} deg, [{:.4}, {:.4}, {:.4}] m",
                err.rotation_angle().to_degrees(),
                err.translation[0],
                err.translation[1],
                err.translation[2]
            );
            for row in result.to_row_major() {
                println!("  [{:8.4} {:8.4} {:8.4} {:8.4}]", row[0], row[1], row[2], row[3]);
            }
        }
        Err(err) => eprintln!("registration failed: {err}"),
    }
}
