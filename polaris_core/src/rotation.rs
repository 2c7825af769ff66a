// polaris_core/src/rotation.rs

use crate::types::EulerAngles;
use nalgebra::{Matrix3, Quaternion, Vector3};

// Below this scalar-part magnitude the trace-based extraction divides by a
// vanishing 4·q0, so the diagonal-based branch takes over.
const TRACE_BRANCH_THRESHOLD: f64 = 1e-4;

/// Converts a body-to-earth rotation matrix into a unit quaternion.
///
/// The scalar part is taken non-negative by convention. Away from 180° the
/// vector part comes from the off-diagonal differences; near 180° (where the
/// trace path degenerates) the magnitudes come from the diagonal and each
/// sign is resolved from the corresponding off-diagonal pair.
pub fn dcm_to_quaternion(r: &Matrix3<f64>) -> Quaternion<f64> {
    let trace = r[(0, 0)] + r[(1, 1)] + r[(2, 2)];
    let q0_sq = (trace + 1.0) / 4.0;
    let q0 = q0_sq.abs().sqrt();

    let q = if q0 > TRACE_BRANCH_THRESHOLD {
        let inv = 1.0 / (4.0 * q0);
        Quaternion::new(
            q0,
            (r[(2, 1)] - r[(1, 2)]) * inv,
            (r[(0, 2)] - r[(2, 0)]) * inv,
            (r[(1, 0)] - r[(0, 1)]) * inv,
        )
    } else {
        // Rotation angle near pi. The diagonal gives the component
        // magnitudes; the off-diagonal sums (4·q1·q2, 4·q1·q3, 4·q2·q3)
        // fix the relative signs. The sums are anchored to the largest
        // component, pinned non-negative, so the anchor never vanishes:
        // near pi the largest component is at least 1/sqrt(3).
        let q1_sq = (1.0 + r[(0, 0)] - r[(1, 1)] - r[(2, 2)]).abs() / 4.0;
        let q2_sq = (1.0 - r[(0, 0)] + r[(1, 1)] - r[(2, 2)]).abs() / 4.0;
        let q3_sq = (1.0 - r[(0, 0)] - r[(1, 1)] + r[(2, 2)]).abs() / 4.0;
        let s12 = r[(0, 1)] + r[(1, 0)];
        let s13 = r[(0, 2)] + r[(2, 0)];
        let s23 = r[(1, 2)] + r[(2, 1)];

        let (q1, q2, q3) = if q1_sq >= q2_sq && q1_sq >= q3_sq {
            (
                q1_sq.sqrt(),
                q2_sq.sqrt().copysign(s12),
                q3_sq.sqrt().copysign(s13),
            )
        } else if q2_sq >= q3_sq {
            (
                q1_sq.sqrt().copysign(s12),
                q2_sq.sqrt(),
                q3_sq.sqrt().copysign(s23),
            )
        } else {
            (
                q1_sq.sqrt().copysign(s13),
                q2_sq.sqrt().copysign(s23),
                q3_sq.sqrt(),
            )
        };
        Quaternion::new(q0, q1, q2, q3)
    };

    // Final numerical-safety step: the input matrix is only approximately
    // orthonormal, so the result is only approximately unit length.
    q.normalize()
}

/// Builds the body-to-earth rotation matrix from a unit quaternion
/// (standard closed form).
pub fn quaternion_to_dcm(q: &Quaternion<f64>) -> Matrix3<f64> {
    let (w, x, y, z) = (q.w, q.i, q.j, q.k);
    Matrix3::new(
        w * w + x * x - y * y - z * z,
        2.0 * (x * y - w * z),
        2.0 * (x * z + w * y),
        2.0 * (x * y + w * z),
        w * w - x * x + y * y - z * z,
        2.0 * (y * z - w * x),
        2.0 * (x * z - w * y),
        2.0 * (y * z + w * x),
        w * w - x * x - y * y + z * z,
    )
}

/// Rotates a vector through the quaternion sandwich product q ⊗ v ⊗ q⁻¹.
/// For a body-to-earth attitude quaternion this maps body-frame vectors
/// into the earth frame; pass the conjugate for the inverse mapping.
pub fn rotate_vector(q: &Quaternion<f64>, v: &Vector3<f64>) -> Vector3<f64> {
    let rotated = q * Quaternion::from_imag(*v) * q.conjugate();
    rotated.imag()
}

/// Extracts intrinsic Z-Y-X yaw/pitch/roll, in radians, from a unit
/// quaternion. The pitch argument is clamped against roundoff pushing it
/// outside asin's domain at gimbal lock.
pub fn euler_from_quaternion(q: &Quaternion<f64>) -> EulerAngles {
    let (w, x, y, z) = (q.w, q.i, q.j, q.k);
    EulerAngles {
        yaw: (2.0 * (x * y + w * z)).atan2(w * w + x * x - y * y - z * z),
        pitch: (2.0 * (w * y - x * z)).clamp(-1.0, 1.0).asin(),
        roll: (2.0 * (y * z + w * x)).atan2(w * w - x * x - y * y + z * z),
    }
}
