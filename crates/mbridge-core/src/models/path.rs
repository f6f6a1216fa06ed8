//! Node identifiers and attribute/event/command paths

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StackError;

/// Logical address of a target device
pub type NodeId = u64;

/// Address of one attribute, event or command on a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemPath {
    pub endpoint_id: u16,
    pub cluster_id: u32,
    /// Attribute, event or command id depending on the operation
    pub id: u32,
}

impl ItemPath {
    pub fn new(endpoint_id: u16, cluster_id: u32, id: u32) -> Self {
        Self {
            endpoint_id,
            cluster_id,
            id,
        }
    }
}

impl fmt::Display for ItemPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/0x{:08X}/0x{:08X}",
            self.endpoint_id, self.cluster_id, self.id
        )
    }
}

/// Upper bound on the number of paths one request may address
pub const MAX_PATHS: usize = 1024;

/// A request for several paths, expressed as three id lists.
///
/// The paths addressed are the cartesian product of the lists, in
/// endpoint-major order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSet {
    pub endpoint_ids: Vec<u16>,
    pub cluster_ids: Vec<u32>,
    pub ids: Vec<u32>,
}

impl PathSet {
    pub fn new(endpoint_ids: Vec<u16>, cluster_ids: Vec<u32>, ids: Vec<u32>) -> Self {
        Self {
            endpoint_ids,
            cluster_ids,
            ids,
        }
    }

    /// A set addressing exactly one path
    pub fn single(path: ItemPath) -> Self {
        Self::new(vec![path.endpoint_id], vec![path.cluster_id], vec![path.id])
    }

    /// Number of paths addressed, saturating at `usize::MAX`
    pub fn len(&self) -> usize {
        self.checked_len().unwrap_or(usize::MAX)
    }

    fn checked_len(&self) -> Option<usize> {
        self.endpoint_ids
            .len()
            .checked_mul(self.cluster_ids.len())?
            .checked_mul(self.ids.len())
    }

    /// Reject sets that address no path or more than [`MAX_PATHS`]
    pub fn check_bounds(&self) -> Result<usize, StackError> {
        match self.checked_len() {
            Some(0) => Err(StackError::InvalidArgument(
                "path set addresses no paths".to_string(),
            )),
            Some(len) if len <= MAX_PATHS => Ok(len),
            _ => Err(StackError::InvalidArgument(format!(
                "path set addresses {} x {} x {} paths, limit is {}",
                self.endpoint_ids.len(),
                self.cluster_ids.len(),
                self.ids.len(),
                MAX_PATHS
            ))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Expand into individual paths
    pub fn expand(&self) -> Vec<ItemPath> {
        let mut paths = Vec::with_capacity(self.len().min(MAX_PATHS));
        for &endpoint_id in &self.endpoint_ids {
            for &cluster_id in &self.cluster_ids {
                for &id in &self.ids {
                    paths.push(ItemPath::new(endpoint_id, cluster_id, id));
                }
            }
        }
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_expand_is_endpoint_major() {
        let set = PathSet::new(vec![1, 2], vec![6], vec![0, 0x4000]);
        assert_eq!(set.len(), 4);
        assert_eq!(
            set.expand(),
            vec![
                ItemPath::new(1, 6, 0),
                ItemPath::new(1, 6, 0x4000),
                ItemPath::new(2, 6, 0),
                ItemPath::new(2, 6, 0x4000),
            ]
        );
    }

    #[test]
    fn test_empty_list_empties_set() {
        let set = PathSet::new(vec![1], vec![], vec![0]);
        assert!(set.is_empty());
        assert!(set.expand().is_empty());
    }

    #[test]
    fn test_oversized_product_is_rejected() {
        let ids: Vec<u32> = (0..3000).collect();
        let set = PathSet::new((0..3000).collect(), ids.clone(), ids);
        assert!(set.len() > MAX_PATHS);
        assert!(matches!(
            set.check_bounds(),
            Err(StackError::InvalidArgument(_))
        ));

        let set = PathSet::new(vec![1], vec![6], (0..MAX_PATHS as u32).collect());
        assert_eq!(set.check_bounds(), Ok(MAX_PATHS));
        assert!(PathSet::new(vec![1], vec![], vec![0]).check_bounds().is_err());
    }

    #[test]
    fn test_path_display() {
        let path = ItemPath::new(1, 0x0006, 0x0000);
        assert_eq!(path.to_string(), "1/0x00000006/0x00000000");
    }
}
