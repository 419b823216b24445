//! Viewpoint decoding and rotation error statistics.

use crate::data::PoseLabel;
use crate::model::{BinHead, RawPoseOutput};

/// Predictions within this geodesic error (pi/6) count as correct.
pub const ACCURACY_THRESHOLD_DEG: f64 = 30.0;

type Matrix3 = [[f64; 3]; 3];

/// Decode one angle: the arg-max bin shifted by its bounded regression delta.
///
/// `angle = (bin + 0.5 + tanh(delta[bin]) / 2) * bin_size`
pub fn decode_angle(head: &BinHead, bin_size: f64) -> f64 {
    let bin = head
        .logits
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (idx, &logit)| match best {
            Some((_, top)) if top >= logit => best,
            _ => Some((idx, logit)),
        })
        .map_or(0, |(idx, _)| idx);
    let delta = head.deltas.get(bin).copied().unwrap_or(0.0) as f64;
    (bin as f64 + 0.5 + delta.tanh() / 2.0) * bin_size
}

/// Decode a full viewpoint prediction in label space.
pub fn decode_pose(output: &RawPoseOutput, bin_size: f64) -> PoseLabel {
    PoseLabel::new(
        decode_angle(&output.azimuth, bin_size),
        decode_angle(&output.elevation, bin_size),
        decode_angle(&output.inplane, bin_size),
    )
}

/// Rotation matrix of a viewpoint given in radians (azimuth, elevation, in-plane).
pub fn angles_to_matrix(azimuth: f64, elevation: f64, inplane: f64) -> Matrix3 {
    let (sa, ca) = azimuth.sin_cos();
    let (se, ce) = elevation.sin_cos();
    let (sr, cr) = inplane.sin_cos();
    [
        [cr * ca - sr * ce * sa, sr * ca + cr * ce * sa, se * sa],
        [-cr * sa - sr * ce * ca, -sr * sa + cr * ce * ca, se * ca],
        [sr * se, -cr * se, ce],
    ]
}

/// Geodesic distance between predicted and ground-truth rotations, in degrees.
pub fn rotation_error(pred: &PoseLabel, label: &PoseLabel) -> f64 {
    let [pa, pe, pr] = pred.to_radians();
    let [ga, ge, gr] = label.to_radians();
    let rp = angles_to_matrix(pa, pe, pr);
    let rg = angles_to_matrix(ga, ge, gr);

    // trace(Rp^T Rg) is the element-wise dot product of the two matrices.
    let trace: f64 = rp
        .iter()
        .flatten()
        .zip(rg.iter().flatten())
        .map(|(a, b)| a * b)
        .sum();
    ((trace.clamp(-1.0, 3.0) - 1.0) / 2.0).acos().to_degrees()
}

/// Fraction of errors at or below `threshold` degrees. `None` for no errors.
pub fn accuracy(errors: &[f64], threshold: f64) -> Option<f64> {
    if errors.is_empty() {
        return None;
    }
    let hits = errors.iter().filter(|&&e| e <= threshold).count();
    Some(hits as f64 / errors.len() as f64)
}

/// Median of the errors; even counts average the two middle values.
pub fn median(errors: &[f64]) -> Option<f64> {
    if errors.is_empty() {
        return None;
    }
    let mut sorted = errors.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Arithmetic mean. `None` for an empty input.
pub fn mean<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(logits: Vec<f32>, deltas: Vec<f32>) -> BinHead {
        BinHead { logits, deltas }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_decode_angle_bin_centre() {
        let h = head(vec![0.1, 3.0, 0.2], vec![0.0, 0.0, 0.0]);
        assert!(close(decode_angle(&h, 15.0), 22.5));
    }

    #[test]
    fn test_decode_angle_uses_delta_of_winning_bin() {
        let h = head(vec![0.0, 0.0, 5.0], vec![9.0, -9.0, 100.0]);
        // tanh saturates at 1, so the angle reaches the upper edge of bin 2.
        assert!(close(decode_angle(&h, 10.0), 30.0));
        let h = head(vec![0.0, 5.0], vec![0.0, -100.0]);
        assert!(close(decode_angle(&h, 10.0), 10.0));
    }

    #[test]
    fn test_decode_angle_ties_take_first_bin() {
        let h = head(vec![1.0, 1.0], vec![0.0, 0.0]);
        assert!(close(decode_angle(&h, 90.0), 45.0));
    }

    #[test]
    fn test_identity_matrix_at_zero() {
        // Zero angles in radians map to the canonical camera frame.
        let m = angles_to_matrix(0.0, 0.0, 0.0);
        assert!(close(m[0][0], 1.0));
        assert!(close(m[1][1], 1.0));
        assert!(close(m[2][2], 1.0));
        assert!(close(m[0][1], 0.0));
    }

    #[test]
    fn test_matrix_is_orthonormal() {
        let m = angles_to_matrix(0.7, -0.3, 2.1);
        for i in 0..3 {
            for j in 0..3 {
                let dot: f64 = (0..3).map(|k| m[i][k] * m[j][k]).sum();
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((dot - expected).abs() < 1e-9, "row {i}.{j} = {dot}");
            }
        }
    }

    #[test]
    fn test_rotation_error_zero_for_same_pose() {
        let pose = PoseLabel::new(123.0, 100.0, 200.0);
        assert!(rotation_error(&pose, &pose) < 1e-4);
    }

    #[test]
    fn test_rotation_error_pure_azimuth() {
        let a = PoseLabel::new(10.0, 90.0, 180.0);
        let b = PoseLabel::new(50.0, 90.0, 180.0);
        assert!((rotation_error(&a, &b) - 40.0).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_error_wraps_around() {
        let a = PoseLabel::new(355.0, 90.0, 180.0);
        let b = PoseLabel::new(5.0, 90.0, 180.0);
        assert!((rotation_error(&a, &b) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_rotation_error_pure_inplane() {
        let a = PoseLabel::new(0.0, 90.0, 180.0);
        let b = PoseLabel::new(0.0, 90.0, 150.0);
        assert!((rotation_error(&a, &b) - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_accuracy_threshold_is_inclusive() {
        let errors = [10.0, 30.0, 30.5, 90.0];
        assert_eq!(accuracy(&errors, ACCURACY_THRESHOLD_DEG), Some(0.5));
        assert_eq!(accuracy(&[], ACCURACY_THRESHOLD_DEG), None);
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean([1.0, 2.0, 6.0]), Some(3.0));
        assert_eq!(mean(Vec::<f64>::new()), None);
    }
}
