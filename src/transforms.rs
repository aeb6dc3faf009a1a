use na::geometry::{Isometry3, Translation3, UnitQuaternion};
use nalgebra as na;

pub mod std_msgs {
    use serde_derive::{Deserialize, Serialize};

    #[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
    pub struct Time {
        pub secs: u32,
        pub nsecs: u32,
    }

    #[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct Header {
        pub seq: u32,
        pub stamp: Time,
        pub frame_id: String,
    }
}

pub mod geometry_msgs {
    use serde_derive::{Deserialize, Serialize};

    use super::std_msgs::Header;

    #[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct Vector3 {
        pub x: f64,
        pub y: f64,
        pub z: f64,
    }

    #[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct Quaternion {
        pub x: f64,
        pub y: f64,
        pub z: f64,
        pub w: f64,
    }

    #[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct Transform {
        pub translation: Vector3,
        pub rotation: Quaternion,
    }

    #[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct TransformStamped {
        pub header: Header,
        pub child_frame_id: String,
        pub transform: Transform,
    }
}

pub mod tf2_msgs {
    use serde_derive::{Deserialize, Serialize};

    use super::geometry_msgs::TransformStamped;

    #[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
    pub struct TFMessage {
        pub transforms: Vec<TransformStamped>,
    }
}

use geometry_msgs::{Quaternion, Transform, TransformStamped, Vector3};
use std_msgs::{Header, Time};

pub fn isometry_from_transform(tf: &Transform) -> Isometry3<f64> {
    let trans = Translation3::new(tf.translation.x, tf.translation.y, tf.translation.z);
    let rot = UnitQuaternion::new_normalize(na::geometry::Quaternion::new(
        tf.rotation.w,
        tf.rotation.x,
        tf.rotation.y,
        tf.rotation.z,
    ));

    Isometry3::from_parts(trans, rot)
}

pub fn isometry_to_transform(iso: Isometry3<f64>) -> Transform {
    Transform {
        translation: Vector3 {
            x: iso.translation.x,
            y: iso.translation.y,
            z: iso.translation.z,
        },
        rotation: Quaternion {
            x: iso.rotation.i,
            y: iso.rotation.j,
            z: iso.rotation.k,
            w: iso.rotation.w,
        },
    }
}

pub fn get_inverse(trans: &TransformStamped) -> TransformStamped {
    TransformStamped {
        header: Header {
            seq: 1u32,
            stamp: trans.header.stamp,
            frame_id: trans.child_frame_id.clone(),
        },
        child_frame_id: trans.header.frame_id.clone(),
        transform: isometry_to_transform(isometry_from_transform(&trans.transform).inverse()),
    }
}

/// Chain multiple transforms together. The slice should be in order of
/// desired transformations, parent-most first.
pub fn chain_transforms(transforms: &[Transform]) -> Transform {
    let mut final_transform = Isometry3::identity();
    for t in transforms {
        final_transform *= isometry_from_transform(t);
    }
    isometry_to_transform(final_transform)
}

/// Blend two transforms, `ratio` 0.0 gives `t1` and 1.0 gives `t2`.
/// Translation is interpolated linearly, rotation spherically.
pub fn interpolate(t1: &Transform, t2: &Transform, ratio: f64) -> Transform {
    let translation = Vector3 {
        x: t1.translation.x * (1.0 - ratio) + t2.translation.x * ratio,
        y: t1.translation.y * (1.0 - ratio) + t2.translation.y * ratio,
        z: t1.translation.z * (1.0 - ratio) + t2.translation.z * ratio,
    };
    let r1 = UnitQuaternion::from_quaternion(na::geometry::Quaternion::new(
        t1.rotation.w,
        t1.rotation.x,
        t1.rotation.y,
        t1.rotation.z,
    ));
    let r2 = UnitQuaternion::from_quaternion(na::geometry::Quaternion::new(
        t2.rotation.w,
        t2.rotation.x,
        t2.rotation.y,
        t2.rotation.z,
    ));
    let rotation = match r1.try_slerp(&r2, ratio, 1e-9) {
        Some(qt) => Quaternion {
            x: qt.coords[0],
            y: qt.coords[1],
            z: qt.coords[2],
            w: qt.coords[3],
        },
        // antipodal rotations have no unique path, snap to the nearer endpoint
        None => {
            if ratio < 0.5 {
                t1.rotation
            } else {
                t2.rotation
            }
        }
    };
    Transform {
        translation,
        rotation,
    }
}

pub fn has_nan(tf: &Transform) -> bool {
    tf.translation.x.is_nan()
        || tf.translation.y.is_nan()
        || tf.translation.z.is_nan()
        || tf.rotation.x.is_nan()
        || tf.rotation.y.is_nan()
        || tf.rotation.z.is_nan()
        || tf.rotation.w.is_nan()
}

pub fn to_transform_stamped(tf: Transform, from: String, to: String, stamp: Time) -> TransformStamped {
    TransformStamped {
        header: Header {
            frame_id: from,
            stamp,
            seq: 1u32,
        },
        child_frame_id: to,
        transform: tf,
    }
}
