use scanalign::filters::{
    confidence_filter, finite_filter, radius_outlier_removal, range_filter, voxel_downsample,
    ConfidenceLevel,
};
use scanalign::PointSet;

fn main() {
    // Synthetic depth frame: 1000 scattered points, every 7th unreliable
    let n = 1000;
    let x: Vec<f32> = (0..n).map(|i| (i as f32 * 0.731) % 6.0 - 3.0).collect();
    let y: Vec<f32> = (0..n).map(|i| (i as f32 * 0.419) % 6.0 - 3.0).collect();
    let z: Vec<f32> = (0..n).map(|i| (i as f32 * 0.257) % 6.0).collect();
    let confidence: Vec<f32> = (0..n).map(|i| if i % 7 == 0 { 0.0 } else { 2.0 }).collect();
    let mut set = PointSet::from_xyz(x, y, z).with_confidence(confidence);
    set.x[3] = f32::NAN;
    println!("Original: {} points", set.len());

    let finite = finite_filter(&set);
    println!("After finite filter: {} points", finite.len());

    let confident = confidence_filter(&finite, ConfidenceLevel::Medium.threshold());
    println!("After confidence filter (medium): {} points", confident.len());

    let ranged = range_filter(&confident, [0.0; 3], 0.25, 5.0);
    println!("After range filter [0.25, 5.0] m: {} points", ranged.len());

    let cleaned = radius_outlier_removal(&ranged, 0.5, 2);
    println!("After speckle removal (r=0.5, min 2): {} points", cleaned.len());

    let downsampled = voxel_downsample(&cleaned, 1.0);
    println!("After voxel downsample (size=1.0): {} points", downsampled.len());

    let aabb = downsampled.aabb();
    println!("Bounding box: min={:?}, max={:?}", aabb.min, aabb.max);
}
