//! A buffer for time-varying coordinate frame transforms, modeled on the
//! [ROS tf library](http://wiki.ros.org/tf). Publishers stream in
//! timestamped parent to child transforms; lookups compose the chain
//! between any two frames at a requested time, interpolating each link
//! inside its recorded history.
//!
//! Transport and message serialization are out of scope here; feed
//! transforms in from whatever source with [`TfBuffer::set_transform`].
//!
//! Example usage:
//!
//! ```
//! use tf_buffer_core::TfBuffer;
//! use tf_buffer_core::tf_util::to_stamp;
//! use tf_buffer_core::transforms::geometry_msgs::TransformStamped;
//!
//! let buffer = TfBuffer::new();
//!
//! let mut tfs = TransformStamped::default();
//! tfs.header.frame_id = "base_link".to_string();
//! tfs.header.stamp = to_stamp(10, 0);
//! tfs.child_frame_id = "camera".to_string();
//! tfs.transform.translation.x = 0.25;
//! tfs.transform.rotation.w = 1.0;
//! assert!(buffer.set_transform(&tfs, "example"));
//!
//! // None asks for the latest time the chain is valid at
//! let tf = buffer.lookup_transform("base_link", "camera", None).unwrap();
//! assert_eq!(tf.header.stamp, to_stamp(10, 0));
//! assert_eq!(tf.transform.translation.x, 0.25);
//! ```

use crate::transforms::{geometry_msgs::TransformStamped, std_msgs::Time};

/// Common seam for anything that can answer transform queries, whether a
/// bare [`TfBuffer`] or a wrapper that owns one.
pub trait LookupTransform {
    fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: Option<Time>,
    ) -> Result<TransformStamped, tf_error::TfError>;

    fn lookup_transform_with_time_travel(
        &self,
        target_frame: &str,
        target_stamp: Option<Time>,
        source_frame: &str,
        source_stamp: Option<Time>,
        fixed_frame: &str,
    ) -> Result<TransformStamped, tf_error::TfError>;
}

mod tf_buffer;
mod tf_error;
mod tf_frame_registry;
mod tf_time_cache;
pub mod tf_util;
pub mod transforms;

pub use tf_buffer::TfBuffer;
pub use tf_error::{TfError, TfErrorCode};
