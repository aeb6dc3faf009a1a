use std::collections::HashMap;
use std::time::SystemTime;

use anyhow::Context;
use chrono::TimeDelta;
use serde_derive::{Deserialize, Serialize};

use crate::transforms::{geometry_msgs, std_msgs::Time, tf2_msgs};

pub fn to_stamp(secs: u32, nsecs: u32) -> Time {
    Time { secs, nsecs }
}

pub fn duration_now() -> TimeDelta {
    let elapsed = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap();
    TimeDelta::new(elapsed.as_secs() as i64, elapsed.subsec_nanos()).unwrap()
}

pub fn duration_to_stamp(time: TimeDelta) -> Time {
    to_stamp(time.num_seconds() as u32, time.subsec_nanos() as u32)
}

pub fn f64_to_stamp(seconds: f64) -> Time {
    let secs = seconds as u32;
    let nsecs = ((seconds - secs as f64) * 1e9) as u32;
    to_stamp(secs, nsecs)
}

pub fn stamp_now() -> Time {
    duration_to_stamp(duration_now())
}

pub fn stamp_to_duration(stamp: &Time) -> TimeDelta {
    // a hand-built stamp may carry nsecs beyond 1e9, which TimeDelta rejects
    let mut secs = stamp.secs;
    let mut nsecs = stamp.nsecs;
    let nsecs_per_sec = 1e9 as u32;
    secs += nsecs / nsecs_per_sec;
    nsecs %= nsecs_per_sec;
    TimeDelta::new(secs.into(), nsecs).unwrap_or_else(|| panic!("secs: {secs} nsecs: {nsecs}"))
}

pub fn duration_to_f64(time: TimeDelta) -> f64 {
    time.num_seconds() as f64 + (time.subsec_nanos() as f64 / 1e9)
}

pub fn stamp_to_f64(stamp: &Time) -> f64 {
    stamp.secs as f64 + (stamp.nsecs as f64) / 1e9
}

pub fn quat_msg_to_rpy(quat_msg: geometry_msgs::Quaternion) -> (f64, f64, f64) {
    let quat = nalgebra::UnitQuaternion::new_normalize(nalgebra::geometry::Quaternion::new(
        quat_msg.w, quat_msg.x, quat_msg.y, quat_msg.z,
    ));
    let (roll, pitch, yaw) = quat.euler_angles();
    (roll, pitch, yaw)
}

pub fn rpy_to_quat_msg(roll: f64, pitch: f64, yaw: f64) -> geometry_msgs::Quaternion {
    let unit_quat = nalgebra::UnitQuaternion::from_euler_angles(roll, pitch, yaw);
    let quat = unit_quat.quaternion();
    geometry_msgs::Quaternion {
        x: quat.coords[0],
        y: quat.coords[1],
        z: quat.coords[2],
        w: quat.coords[3],
    }
}

/// use for loading from a toml
#[derive(Deserialize, Serialize, Debug)]
struct TransformRaw {
    frame: String,
    child_frame: String,
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    roll: Option<f64>,
    pitch: Option<f64>,
    yaw: Option<f64>,
}

impl TransformRaw {
    fn from_transform_stamped(tfs: geometry_msgs::TransformStamped) -> Self {
        let (roll, pitch, yaw) = quat_msg_to_rpy(tfs.transform.rotation);

        let tr = tfs.transform.translation;
        let (x, y, z) = (tr.x, tr.y, tr.z);

        Self {
            frame: tfs.header.frame_id,
            child_frame: tfs.child_frame_id,
            x: Some(x),
            y: Some(y),
            z: Some(z),
            roll: Some(roll),
            pitch: Some(pitch),
            yaw: Some(yaw),
        }
    }
}

pub fn transforms_to_toml(tfm: &tf2_msgs::TFMessage) -> Result<String, anyhow::Error> {
    let mut tf_vec = Vec::new();
    for tfs in &tfm.transforms {
        tf_vec.push(TransformRaw::from_transform_stamped(tfs.clone()));
    }

    let mut tf_data = HashMap::new();
    tf_data.insert("tf", tf_vec);

    Ok(toml::to_string(&tf_data)?)
}

/// Stamps are not stored in the toml; the caller sets them before feeding
/// the transforms into a buffer.
pub fn transforms_from_toml_str(contents: &str) -> Result<tf2_msgs::TFMessage, anyhow::Error> {
    let tf_data: HashMap<String, Vec<TransformRaw>> = toml::from_str(contents)?;

    let mut tfm = tf2_msgs::TFMessage::default();
    for tfr in tf_data.get("tf").ok_or(anyhow::anyhow!("no tfs"))? {
        let mut transform = geometry_msgs::TransformStamped::default();
        transform.header.frame_id = tfr.frame.clone();
        transform.child_frame_id = tfr.child_frame.clone();

        transform.transform.translation.x = tfr.x.unwrap_or(0.0);
        transform.transform.translation.y = tfr.y.unwrap_or(0.0);
        transform.transform.translation.z = tfr.z.unwrap_or(0.0);

        let roll = tfr.roll.unwrap_or(0.0);
        let pitch = tfr.pitch.unwrap_or(0.0);
        let yaw = tfr.yaw.unwrap_or(0.0);
        transform.transform.rotation = rpy_to_quat_msg(roll, pitch, yaw);

        tfm.transforms.push(transform);
    }

    Ok(tfm)
}

pub fn get_transforms_from_toml(filename: &str) -> Result<tf2_msgs::TFMessage, anyhow::Error> {
    let contents = std::fs::read_to_string(filename)
        .with_context(|| format!("could not read file '{filename}'"))?;
    transforms_from_toml_str(&contents)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_time_conversion() {
        let base_stamp = Time {
            secs: 1_002_003_000,
            nsecs: 0,
        };

        for i in 0..1000 {
            let offset = i as f64 * 0.1;
            // see if there's a panic within this
            let _stamp = f64_to_stamp(stamp_to_f64(&base_stamp) + offset);
        }
    }

    #[test]
    fn test_stamp_duration_roundtrip() {
        let stamp = to_stamp(12, 300_000_000);
        let duration = stamp_to_duration(&stamp);
        assert_eq!(duration.num_seconds(), 12);
        assert_eq!(duration.subsec_nanos(), 300_000_000);
        assert_eq!(duration_to_stamp(duration), stamp);
    }

    #[test]
    fn test_overlong_nsecs_normalized() {
        let stamp = Time {
            secs: 1,
            nsecs: 1_500_000_000,
        };
        let duration = stamp_to_duration(&stamp);
        assert_eq!(duration.num_seconds(), 2);
        assert_eq!(duration.subsec_nanos(), 500_000_000);
    }

    #[test]
    fn test_toml_roundtrip() {
        let mut tfm = tf2_msgs::TFMessage::default();
        let mut tfs = geometry_msgs::TransformStamped::default();
        tfs.header.frame_id = "base".to_string();
        tfs.child_frame_id = "sensor".to_string();
        tfs.transform.translation.x = 1.0;
        tfs.transform.translation.y = -0.7;
        tfs.transform.translation.z = 3.0;
        tfs.transform.rotation = rpy_to_quat_msg(0.1, -0.2, 0.3);
        tfm.transforms.push(tfs);

        let toml_text = transforms_to_toml(&tfm).unwrap();
        let loaded = transforms_from_toml_str(&toml_text).unwrap();
        assert_eq!(loaded.transforms.len(), 1);

        let tfs = &loaded.transforms[0];
        assert_eq!(tfs.header.frame_id, "base");
        assert_eq!(tfs.child_frame_id, "sensor");
        assert!((tfs.transform.translation.x - 1.0).abs() < 1e-9);
        assert!((tfs.transform.translation.y - -0.7).abs() < 1e-9);
        assert!((tfs.transform.translation.z - 3.0).abs() < 1e-9);

        let (roll, pitch, yaw) = quat_msg_to_rpy(tfs.transform.rotation);
        assert!((roll - 0.1).abs() < 1e-9);
        assert!((pitch - -0.2).abs() < 1e-9);
        assert!((yaw - 0.3).abs() < 1e-9);
    }
}
