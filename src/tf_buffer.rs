use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use chrono::TimeDelta;
use nalgebra::Isometry3;

use crate::{
    tf_error::TfError,
    tf_frame_registry::{TfFrameRegistry, NO_PARENT},
    tf_time_cache::{SampleMode, TfTimeCache, TransformSample},
    tf_util::{duration_to_f64, duration_to_stamp, stamp_to_duration, stamp_to_f64, to_stamp},
    transforms::{
        chain_transforms, has_nan, isometry_from_transform, isometry_to_transform,
        to_transform_stamped,
        geometry_msgs::TransformStamped,
        std_msgs::{Header, Time},
        tf2_msgs::TFMessage,
    },
    LookupTransform,
};

/// Hop limit for the upward walks; only a loop in the graph gets close.
const MAX_GRAPH_DEPTH: u32 = 1000;

const DEFAULT_CACHE_DURATION_SECONDS: u16 = 10;

type CacheHandle = Arc<Mutex<TfTimeCache>>;

/// Registry, cache handles and authorities, guarded as one unit so readers
/// can take a coherent snapshot. The cache vector is indexed by frame id;
/// slot 0 is the `NO_PARENT` placeholder and never holds a cache.
#[derive(Debug)]
struct FrameTable {
    registry: TfFrameRegistry,
    caches: Vec<Option<CacheHandle>>,
    authorities: HashMap<u32, String>,
}

impl FrameTable {
    fn new() -> Self {
        Self {
            registry: TfFrameRegistry::new(),
            caches: vec![None],
            authorities: HashMap::new(),
        }
    }
}

/// One hop of a chain between two frames: the sample asserting `child_num`'s
/// pose in `sample.parent_id` at the walk time, plus how the cache got it.
#[derive(Clone, Debug)]
struct TfChainStep {
    child_num: u32,
    sample: TransformSample,
    mode: SampleMode,
}

#[derive(Debug, Default)]
struct TransformLists {
    /// Path from the source frame toward the root.
    inverse: Vec<TfChainStep>,
    /// Path from the target frame toward the root.
    forward: Vec<TfChainStep>,
}

/// Time-indexed store of coordinate frame relationships.
///
/// Publishers feed timestamped parent to child transforms in with
/// [`TfBuffer::set_transform`], consumers compose transforms between any
/// two frames with [`TfBuffer::lookup_transform`]. All methods take
/// `&self`; writers and readers may run concurrently from any number of
/// threads.
#[derive(Debug)]
pub struct TfBuffer {
    cache_time: TimeDelta,
    max_extrapolation: TimeDelta,
    frames: Mutex<FrameTable>,
}

impl Default for TfBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl TfBuffer {
    pub fn new() -> Self {
        Self::new_with_duration(TimeDelta::new(DEFAULT_CACHE_DURATION_SECONDS.into(), 0).unwrap())
    }

    /// Extrapolation stays disabled; any query outside the recorded history
    /// of some chain link is rejected.
    pub fn new_with_duration(cache_time: TimeDelta) -> Self {
        Self::new_with_durations(cache_time, TimeDelta::zero())
    }

    pub fn new_with_durations(cache_time: TimeDelta, max_extrapolation: TimeDelta) -> Self {
        TfBuffer {
            cache_time,
            max_extrapolation,
            frames: Mutex::new(FrameTable::new()),
        }
    }

    /// Store one transform sample under its child frame.
    ///
    /// Returns false and logs when the sample is invalid (self transform,
    /// unset frame ids, nan values) or older than the child's retention
    /// window; nothing is mutated in that case. `authority` identifies the
    /// publisher for diagnostics only.
    pub fn set_transform(&self, tfs: &TransformStamped, authority: &str) -> bool {
        let child_frame_id = &tfs.child_frame_id;
        let frame_id = &tfs.header.frame_id;

        let mut error_exists = false;
        if child_frame_id == frame_id {
            log::error!(
                "TF_SELF_TRANSFORM: Ignoring transform from authority \"{authority}\" with frame_id and child_frame_id \"{child_frame_id}\" because they are the same"
            );
            error_exists = true;
        }
        if child_frame_id.is_empty() || child_frame_id == "/" {
            log::error!(
                "TF_NO_CHILD_FRAME_ID: Ignoring transform from authority \"{authority}\" because child_frame_id not set"
            );
            error_exists = true;
        }
        if frame_id.is_empty() || frame_id == "/" {
            log::error!(
                "TF_NO_FRAME_ID: Ignoring transform with child_frame_id \"{child_frame_id}\" from authority \"{authority}\" because frame_id not set"
            );
            error_exists = true;
        }
        if has_nan(&tfs.transform) {
            log::error!(
                "TF_NAN_INPUT: Ignoring transform for child_frame_id \"{child_frame_id}\" from authority \"{authority}\" because of a nan value in the transform"
            );
            error_exists = true;
        }
        if error_exists {
            return false;
        }

        let mut frames = self.frames.lock().unwrap();
        let child_num = self.lookup_or_insert_frame(&mut frames, child_frame_id);
        let parent_num = self.lookup_or_insert_frame(&mut frames, frame_id);
        let sample = TransformSample {
            stamp: stamp_to_duration(&tfs.header.stamp),
            transform: tfs.transform,
            parent_id: parent_num,
        };
        let accepted = match &frames.caches[child_num as usize] {
            Some(cache) => cache.lock().unwrap().insert(sample),
            // the reserved NO_PARENT id has no cache to write into
            None => {
                log::error!(
                    "TF_NO_CHILD_FRAME_ID: Ignoring transform from authority \"{authority}\" because child_frame_id \"{child_frame_id}\" is reserved"
                );
                false
            }
        };
        if accepted {
            frames.authorities.insert(child_num, authority.to_string());
            true
        } else {
            log::warn!(
                "TF_OLD_DATA: ignoring data from the past for frame {child_frame_id} at time {:.3} according to authority {authority}",
                stamp_to_f64(&tfs.header.stamp)
            );
            false
        }
    }

    /// Feed a whole message of transforms through [`TfBuffer::set_transform`],
    /// true when every one was accepted.
    pub fn set_transforms(&self, tfm: &TFMessage, authority: &str) -> bool {
        let mut all_accepted = true;
        for tfs in &tfm.transforms {
            all_accepted &= self.set_transform(tfs, authority);
        }
        all_accepted
    }

    /// Looks up the transform from `source_frame` to `target_frame` at the
    /// given time; `None` means the latest time the whole chain is valid at.
    /// The result carries the resolved time and maps a point expressed in
    /// the source frame into the target frame.
    pub fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: Option<Time>,
    ) -> Result<TransformStamped, TfError> {
        validate_frame_id(target_frame)?;
        validate_frame_id(source_frame)?;

        // allow zero length lookups on frames that were never published
        if target_frame == source_frame {
            let mut tfs = TransformStamped::default();
            tfs.header.frame_id = target_frame.to_string();
            tfs.header.stamp = stamp.unwrap_or_else(|| to_stamp(0, 0));
            tfs.header.seq = 1;
            tfs.child_frame_id = source_frame.to_string();
            tfs.transform.rotation.w = 1.0;
            return Ok(tfs);
        }

        let latest = stamp.is_none();
        let time = match stamp {
            Some(stamp) => stamp_to_duration(&stamp),
            None => match self.get_latest_common_time(target_frame, source_frame)? {
                Some(stamp) => stamp_to_duration(&stamp),
                // only identical frames have no common samples, and those
                // short-circuited above
                None => TimeDelta::zero(),
            },
        };

        let (target_num, source_num, caches) =
            self.resolve_and_snapshot(target_frame, source_frame)?;
        let lists = self.lookup_lists(&caches, target_num, source_num, Some(time))?;

        if let Some(error) = self.test_extrapolation(time, &lists) {
            // with a latest request the common time already clamped to the
            // recorded history, running out of range means some link never
            // overlaps the others
            if latest {
                return Err(TfError::Connectivity(format!(
                    "Could not find a common time between '{source_frame}' and '{target_frame}'."
                )));
            }
            return Err(TfError::Extrapolation(error));
        }

        let output = compute_transform_from_lists(&lists);
        Ok(TransformStamped {
            header: Header {
                seq: 1,
                stamp: duration_to_stamp(time),
                frame_id: target_frame.to_string(),
            },
            child_frame_id: source_frame.to_string(),
            transform: isometry_to_transform(output),
        })
    }

    /// Looks up a transform between two frames observed at two different
    /// times, bridged through a frame assumed fixed over the interval.
    pub fn lookup_transform_with_time_travel(
        &self,
        target_frame: &str,
        target_stamp: Option<Time>,
        source_frame: &str,
        source_stamp: Option<Time>,
        fixed_frame: &str,
    ) -> Result<TransformStamped, TfError> {
        let fixed_to_source = self.lookup_transform(fixed_frame, source_frame, source_stamp)?;
        let target_to_fixed = self.lookup_transform(target_frame, fixed_frame, target_stamp)?;
        let output = chain_transforms(&[target_to_fixed.transform, fixed_to_source.transform]);
        Ok(to_transform_stamped(
            output,
            target_frame.to_string(),
            source_frame.to_string(),
            target_to_fixed.header.stamp,
        ))
    }

    /// Whether [`TfBuffer::lookup_transform`] with the same arguments would
    /// succeed.
    pub fn can_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: Option<Time>,
    ) -> bool {
        self.can_transform_with_diagnostic(target_frame, source_frame, stamp)
            .0
    }

    /// Like [`TfBuffer::can_transform`] but reporting why the lookup would
    /// fail.
    pub fn can_transform_with_diagnostic(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: Option<Time>,
    ) -> (bool, Option<String>) {
        match self.lookup_transform(target_frame, source_frame, stamp) {
            Ok(_) => (true, None),
            Err(err) => (false, Some(err.to_string())),
        }
    }

    pub fn can_transform_with_time_travel(
        &self,
        target_frame: &str,
        target_stamp: Option<Time>,
        source_frame: &str,
        source_stamp: Option<Time>,
        fixed_frame: &str,
    ) -> bool {
        self.lookup_transform_with_time_travel(
            target_frame,
            target_stamp,
            source_frame,
            source_stamp,
            fixed_frame,
        )
        .is_ok()
    }

    /// Latest time at which the whole chain between the two frames has
    /// data, i.e. the minimum over the newest sample of every link the
    /// chain uses. `Ok(None)` is returned for a zero length chain.
    pub fn get_latest_common_time(
        &self,
        target_frame: &str,
        source_frame: &str,
    ) -> Result<Option<Time>, TfError> {
        let (target_num, source_num, caches) =
            self.resolve_and_snapshot(target_frame, source_frame)?;
        let lists = self.lookup_lists(&caches, target_num, source_num, None)?;

        let mut common_time: Option<TimeDelta> = None;
        for step in lists.inverse.iter().chain(lists.forward.iter()) {
            let stamp = step.sample.stamp;
            common_time = Some(match common_time {
                Some(time) => time.min(stamp),
                None => stamp,
            });
        }
        Ok(common_time.map(duration_to_stamp))
    }

    /// Empties every frame's history; names, ids and authorities survive.
    pub fn clear(&self) {
        let frames = self.frames.lock().unwrap();
        for cache in frames.caches.iter().flatten() {
            cache.lock().unwrap().clear_list();
        }
    }

    /// One `Frame <child> exists with parent <parent>.` line per frame,
    /// parents taken from the latest sample of each cache.
    pub fn all_frames_as_string(&self) -> String {
        let frames = self.frames.lock().unwrap();
        let mut out = String::new();
        for num in 1..frames.caches.len() as u32 {
            let parent_num = frames.caches[num as usize]
                .as_ref()
                .and_then(|cache| cache.lock().unwrap().parent_id(None))
                .unwrap_or(NO_PARENT);
            let child = frames.registry.name(num).unwrap_or("?");
            let parent = frames.registry.name(parent_num).unwrap_or("?");
            let _ = writeln!(out, "Frame {child} exists with parent {parent}.");
        }
        out
    }

    pub fn frame_exists(&self, frame_id: &str) -> bool {
        self.frames.lock().unwrap().registry.lookup(frame_id).is_ok()
    }

    /// Every frame name ever published, the `NO_PARENT` sentinel excluded.
    pub fn frame_names(&self) -> Vec<String> {
        let frames = self.frames.lock().unwrap();
        frames.registry.names().iter().skip(1).cloned().collect()
    }

    /// Parent of `frame_id` effective at the given time, `None` request
    /// time for latest. Yields nothing when the frame is unknown, has no
    /// samples, or sits at the top of its tree.
    pub fn parent(&self, frame_id: &str, stamp: Option<Time>) -> Option<String> {
        let frames = self.frames.lock().unwrap();
        let num = frames.registry.lookup(frame_id).ok()?;
        let parent_num = frames
            .caches
            .get(num as usize)?
            .as_ref()?
            .lock()
            .unwrap()
            .parent_id(stamp.map(|stamp| stamp_to_duration(&stamp)))?;
        if parent_num == NO_PARENT {
            return None;
        }
        frames.registry.name(parent_num).ok().map(str::to_string)
    }

    /// Authority string of the last publisher that set this frame.
    pub fn frame_authority(&self, frame_id: &str) -> Option<String> {
        let frames = self.frames.lock().unwrap();
        let num = frames.registry.lookup(frame_id).ok()?;
        frames.authorities.get(&num).cloned()
    }

    fn lookup_or_insert_frame(&self, frames: &mut FrameTable, frame_id: &str) -> u32 {
        let (num, inserted) = frames.registry.lookup_or_insert(frame_id);
        if inserted {
            frames
                .caches
                .push(Some(Arc::new(Mutex::new(TfTimeCache::new(self.cache_time)))));
            debug_assert_eq!(frames.caches.len(), frames.registry.len());
        }
        num
    }

    /// Resolve both names and snapshot the cache handles under one brief
    /// table lock; the walk itself then only touches leaf cache mutexes.
    fn resolve_and_snapshot(
        &self,
        target_frame: &str,
        source_frame: &str,
    ) -> Result<(u32, u32, Vec<Option<CacheHandle>>), TfError> {
        let frames = self.frames.lock().unwrap();
        let target_num = frames.registry.lookup(target_frame)?;
        let source_num = frames.registry.lookup(source_frame)?;
        Ok((target_num, source_num, frames.caches.clone()))
    }

    fn frame_name(&self, num: u32) -> String {
        self.frames
            .lock()
            .unwrap()
            .registry
            .name(num)
            .map(str::to_string)
            .unwrap_or_else(|_| format!("#{num}"))
    }

    /// Climb from `start` toward the root, sampling each frame's cache at
    /// `time`. Stops at the first frame with no usable data (or at
    /// `NO_PARENT`) and reports that frame alongside the collected steps.
    fn walk_to_root(
        &self,
        caches: &[Option<CacheHandle>],
        start: u32,
        time: Option<TimeDelta>,
    ) -> Result<(Vec<TfChainStep>, u32), TfError> {
        let mut steps = Vec::new();
        let mut frame = start;
        let mut counter = 0u32;
        loop {
            if frame == NO_PARENT {
                return Ok((steps, frame));
            }
            let got = {
                let cache = match caches.get(frame as usize).and_then(|cache| cache.as_ref()) {
                    Some(cache) => cache,
                    None => return Ok((steps, frame)),
                };
                let guard = cache.lock().unwrap();
                guard.get(time)
            };
            let Some((sample, mode)) = got else {
                return Ok((steps, frame));
            };
            let parent = sample.parent_id;
            steps.push(TfChainStep {
                child_num: frame,
                sample,
                mode,
            });
            frame = parent;

            counter += 1;
            if counter > MAX_GRAPH_DEPTH {
                return Err(TfError::Lookup(format!(
                    "The tf tree is invalid because it contains a loop.\n{}",
                    self.all_frames_as_string()
                )));
            }
        }
    }

    /// Two-sided walk: source and target each climb toward the root, then
    /// the termination cases decide connectivity and the shared suffix is
    /// popped so the lowest common ancestor and everything above it drop
    /// out of the chain.
    fn lookup_lists(
        &self,
        caches: &[Option<CacheHandle>],
        target_num: u32,
        source_num: u32,
        time: Option<TimeDelta>,
    ) -> Result<TransformLists, TfError> {
        if target_num == source_num {
            return Ok(TransformLists::default());
        }

        let (inverse, last_inverse) = self.walk_to_root(caches, source_num, time)?;
        let (forward, last_forward) = self.walk_to_root(caches, target_num, time)?;

        let connectivity_error = || {
            TfError::Connectivity(format!(
                "Could not find a connection between '{}' and '{}' because they are not part of the same tree. Tf has two or more unconnected trees.",
                self.frame_name(target_num),
                self.frame_name(source_num),
            ))
        };

        if inverse.is_empty() && forward.is_empty() {
            return Err(connectivity_error());
        }
        if inverse.is_empty() {
            // the target side must have walked down onto the source itself
            if last_forward != source_num {
                return Err(connectivity_error());
            }
            return Ok(TransformLists { inverse, forward });
        }
        if forward.is_empty() {
            if last_inverse != target_num {
                return Err(connectivity_error());
            }
            return Ok(TransformLists { inverse, forward });
        }

        if last_forward != last_inverse {
            return Err(connectivity_error());
        }
        // meeting at the sentinel joins nothing, the frames sit in
        // different trees
        if inverse.last().map(|step| step.sample.parent_id) == Some(NO_PARENT)
            || forward.last().map(|step| step.sample.parent_id) == Some(NO_PARENT)
        {
            return Err(connectivity_error());
        }

        let mut lists = TransformLists { inverse, forward };
        while let (Some(inv), Some(fwd)) = (lists.inverse.last(), lists.forward.last()) {
            if inv.child_num != fwd.child_num {
                break;
            }
            lists.inverse.pop();
            lists.forward.pop();
        }
        Ok(lists)
    }

    /// Apply the extrapolation tolerance to every step of a composed chain,
    /// yielding the diagnostic of the first violation.
    fn test_extrapolation(&self, time: TimeDelta, lists: &TransformLists) -> Option<String> {
        for step in lists.inverse.iter().chain(lists.forward.iter()) {
            let stamp = step.sample.stamp;
            match step.mode {
                SampleMode::Exact | SampleMode::Interpolated => {}
                SampleMode::OneValue => {
                    if stamp - time > self.max_extrapolation
                        || time - stamp > self.max_extrapolation
                    {
                        return Some(format!(
                            "You requested a transform at time {:.3}, but the tf buffer only contains a single transform at time {:.3}.{}",
                            duration_to_f64(time),
                            duration_to_f64(stamp),
                            self.extrapolation_limit_note()
                        ));
                    }
                }
                SampleMode::ExtrapolateBack => {
                    if stamp - time > self.max_extrapolation {
                        return Some(format!(
                            "Extrapolating into the past. You requested a transform at time {:.3}, but the tf buffer only has a history until {:.3}.{}",
                            duration_to_f64(time),
                            duration_to_f64(stamp),
                            self.extrapolation_limit_note()
                        ));
                    }
                }
                SampleMode::ExtrapolateForward => {
                    if time - stamp > self.max_extrapolation {
                        return Some(format!(
                            "Extrapolating into the future. You requested a transform at time {:.3}, but the most recent transform in the tf buffer is at {:.3}.{}",
                            duration_to_f64(time),
                            duration_to_f64(stamp),
                            self.extrapolation_limit_note()
                        ));
                    }
                }
            }
        }
        None
    }

    fn extrapolation_limit_note(&self) -> String {
        if self.max_extrapolation > TimeDelta::zero() {
            format!(
                " The extrapolation distance is set to {:.3} seconds.",
                duration_to_f64(self.max_extrapolation)
            )
        } else {
            String::new()
        }
    }
}

impl LookupTransform for TfBuffer {
    fn lookup_transform(
        &self,
        target_frame: &str,
        source_frame: &str,
        stamp: Option<Time>,
    ) -> Result<TransformStamped, TfError> {
        TfBuffer::lookup_transform(self, target_frame, source_frame, stamp)
    }

    fn lookup_transform_with_time_travel(
        &self,
        target_frame: &str,
        target_stamp: Option<Time>,
        source_frame: &str,
        source_stamp: Option<Time>,
        fixed_frame: &str,
    ) -> Result<TransformStamped, TfError> {
        TfBuffer::lookup_transform_with_time_travel(
            self,
            target_frame,
            target_stamp,
            source_frame,
            source_stamp,
            fixed_frame,
        )
    }
}

fn validate_frame_id(frame_id: &str) -> Result<(), TfError> {
    if frame_id.is_empty() || frame_id == "/" {
        return Err(TfError::InvalidArgument(format!(
            "Invalid frame id '{frame_id}', frame ids must be non-empty"
        )));
    }
    Ok(())
}

/// Fold both halves of the chain into one rigid transform: the inverse
/// list accumulates source up to the common ancestor, the forward list is
/// applied inverted to come back down to the target.
fn compute_transform_from_lists(lists: &TransformLists) -> Isometry3<f64> {
    let mut output = Isometry3::identity();
    for step in lists.inverse.iter().rev() {
        output *= isometry_from_transform(&step.sample.transform);
    }
    for step in lists.forward.iter().rev() {
        output = isometry_from_transform(&step.sample.transform).inverse() * output;
    }
    output
}
