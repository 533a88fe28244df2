use crate::types::WorkItem;

/// Builds `count` items with ids `1..=count`, named after the demo files of the relay.
pub fn work_items(count: u64) -> Vec<WorkItem> {
    (1..=count)
        .map(|id| WorkItem::new(id, format!("file_{}.pdf", 99 + id)))
        .collect()
}
