use std::collections::HashMap;

use crate::tf_error::TfError;

/// Reserved frame id that terminates every upward traversal.
pub(crate) const NO_PARENT: u32 = 0;

const NO_PARENT_NAME: &str = "NO_PARENT";

/// Bidirectional mapping between frame names and dense ids.
///
/// Ids are handed out strictly increasing and never recycled, so callers
/// may hold on to them for the lifetime of the owning buffer. Id 0 is
/// pre-bound to `NO_PARENT` and owns no transform history.
#[derive(Clone, Debug)]
pub(crate) struct TfFrameRegistry {
    frame_ids: HashMap<String, u32>,
    frame_names: Vec<String>,
}

impl TfFrameRegistry {
    pub(crate) fn new() -> Self {
        let mut frame_ids = HashMap::new();
        frame_ids.insert(NO_PARENT_NAME.to_string(), NO_PARENT);
        Self {
            frame_ids,
            frame_names: vec![NO_PARENT_NAME.to_string()],
        }
    }

    pub(crate) fn lookup(&self, frame_id: &str) -> Result<u32, TfError> {
        self.frame_ids.get(frame_id).copied().ok_or_else(|| {
            TfError::Lookup(format!("Frame '{frame_id}' does not exist in tf tree."))
        })
    }

    /// Returns the id for `frame_id`, allocating the next dense id when the
    /// name is new; the flag tells the caller to append the matching cache
    /// slot so index and id stay aligned.
    pub(crate) fn lookup_or_insert(&mut self, frame_id: &str) -> (u32, bool) {
        if let Some(num) = self.frame_ids.get(frame_id) {
            return (*num, false);
        }
        let num = self.frame_names.len() as u32;
        self.frame_ids.insert(frame_id.to_string(), num);
        self.frame_names.push(frame_id.to_string());
        (num, true)
    }

    pub(crate) fn name(&self, num: u32) -> Result<&str, TfError> {
        self.frame_names
            .get(num as usize)
            .map(String::as_str)
            .ok_or_else(|| TfError::Lookup(format!("Reverse lookup of frame id {num} failed.")))
    }

    pub(crate) fn len(&self) -> usize {
        self.frame_names.len()
    }

    pub(crate) fn names(&self) -> &[String] {
        &self.frame_names
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reserved_no_parent() {
        let registry = TfFrameRegistry::new();
        assert_eq!(registry.lookup(NO_PARENT_NAME).unwrap(), NO_PARENT);
        assert_eq!(registry.name(NO_PARENT).unwrap(), NO_PARENT_NAME);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_dense_ids_roundtrip() {
        let mut registry = TfFrameRegistry::new();
        let (base, inserted) = registry.lookup_or_insert("base");
        assert!(inserted);
        assert_eq!(base, 1);
        let (leaf, inserted) = registry.lookup_or_insert("leaf");
        assert!(inserted);
        assert_eq!(leaf, 2);

        // repeat lookups keep the same id
        let (base_again, inserted) = registry.lookup_or_insert("base");
        assert!(!inserted);
        assert_eq!(base_again, base);

        for name in ["base", "leaf"] {
            let num = registry.lookup(name).unwrap();
            assert_eq!(registry.name(num).unwrap(), name);
        }

        assert!(registry.lookup("never_published").is_err());
        assert!(registry.name(17).is_err());
        assert_eq!(registry.names().len(), 3);
    }
}
