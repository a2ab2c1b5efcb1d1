use std::path::PathBuf;

use eframe::egui::ColorImage;
use thiserror::Error;

use crate::preview::{LoadedImage, SourceFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShelfError {
    #[error("You can only select up to {capacity} images (got {requested}).")]
    CapacityExceeded { requested: usize, capacity: usize },
    #[error("Finish rearranging images before adding new ones.")]
    DragInProgress,
    #[error("Image position {index} is out of range (shelf holds {len}).")]
    SlotOutOfRange { index: usize, len: usize },
}

#[derive(Clone)]
pub enum SlotContent {
    Reading,
    Ready {
        preview: ColorImage,
        source: SourceFile,
    },
    Failed(String),
}

#[derive(Clone)]
pub struct ImageSlot {
    id: SlotId,
    label: String,
    content: SlotContent,
}

impl ImageSlot {
    pub fn id(&self) -> SlotId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn content(&self) -> &SlotContent {
        &self.content
    }

    pub fn source(&self) -> Option<&SourceFile> {
        match &self.content {
            SlotContent::Ready { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn preview(&self) -> Option<&ColorImage> {
        match &self.content {
            SlotContent::Ready { preview, .. } => Some(preview),
            _ => None,
        }
    }

    pub fn is_reading(&self) -> bool {
        matches!(self.content, SlotContent::Reading)
    }
}

/// A file read the shelf is waiting on; completions are matched by slot id,
/// not by position, so they may arrive in any order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub slot: SlotId,
    pub path: PathBuf,
}

/// Ordered images chosen for the next submission. A slot's order position is
/// its index; removals and moves keep the list contiguous.
pub struct ImageShelf {
    capacity: usize,
    slots: Vec<ImageSlot>,
    next_slot_id: u64,
    drag_source: Option<SlotId>,
}

impl ImageShelf {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: Vec::new(),
            next_slot_id: 0,
            drag_source: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[ImageSlot] {
        &self.slots
    }

    pub fn has_pending_reads(&self) -> bool {
        self.slots.iter().any(ImageSlot::is_reading)
    }

    /// Replaces the shelf with a new picker batch. An oversized batch is
    /// rejected whole and the current slots stay as they were.
    pub fn select_files(&mut self, paths: Vec<PathBuf>) -> Result<Vec<ReadRequest>, ShelfError> {
        if paths.len() > self.capacity {
            return Err(ShelfError::CapacityExceeded {
                requested: paths.len(),
                capacity: self.capacity,
            });
        }
        self.drag_source = None;
        self.slots.clear();
        Ok(self.push_reading_slots(paths))
    }

    /// Appends files dropped onto the window from outside. Refused while an
    /// internal drag is active so a reorder never grows the shelf.
    pub fn append_files(&mut self, paths: Vec<PathBuf>) -> Result<Vec<ReadRequest>, ShelfError> {
        if self.drag_source.is_some() {
            return Err(ShelfError::DragInProgress);
        }
        let requested = self.slots.len() + paths.len();
        if requested > self.capacity {
            return Err(ShelfError::CapacityExceeded {
                requested,
                capacity: self.capacity,
            });
        }
        Ok(self.push_reading_slots(paths))
    }

    fn push_reading_slots(&mut self, paths: Vec<PathBuf>) -> Vec<ReadRequest> {
        let mut requests = Vec::with_capacity(paths.len());
        for path in paths {
            let id = SlotId(self.next_slot_id);
            self.next_slot_id += 1;
            let label = path
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_else(|| path.display().to_string());
            self.slots.push(ImageSlot {
                id,
                label,
                content: SlotContent::Reading,
            });
            requests.push(ReadRequest { slot: id, path });
        }
        requests
    }

    /// Returns false when the slot is gone (removed, or replaced by a newer batch).
    pub fn complete_read(&mut self, slot: SlotId, result: Result<LoadedImage, String>) -> bool {
        let Some(target) = self.slots.iter_mut().find(|candidate| candidate.id == slot) else {
            return false;
        };
        target.content = match result {
            Ok(loaded) => SlotContent::Ready {
                preview: loaded.preview,
                source: loaded.source,
            },
            Err(err) => SlotContent::Failed(err),
        };
        true
    }

    /// Moves the slot at `from` so that it ends up at position `to`.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), ShelfError> {
        let len = self.slots.len();
        for index in [from, to] {
            if index >= len {
                return Err(ShelfError::SlotOutOfRange { index, len });
            }
        }
        if from != to {
            let slot = self.slots.remove(from);
            self.slots.insert(to, slot);
        }
        Ok(())
    }

    pub fn can_move_left(&self, index: usize) -> bool {
        index > 0 && index < self.slots.len()
    }

    pub fn can_move_right(&self, index: usize) -> bool {
        index + 1 < self.slots.len()
    }

    pub fn move_left(&mut self, index: usize) -> Result<(), ShelfError> {
        if !self.can_move_left(index) {
            return Err(ShelfError::SlotOutOfRange {
                index,
                len: self.slots.len(),
            });
        }
        self.slots.swap(index - 1, index);
        Ok(())
    }

    pub fn move_right(&mut self, index: usize) -> Result<(), ShelfError> {
        if !self.can_move_right(index) {
            return Err(ShelfError::SlotOutOfRange {
                index,
                len: self.slots.len(),
            });
        }
        self.slots.swap(index, index + 1);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<ImageSlot, ShelfError> {
        if index >= self.slots.len() {
            return Err(ShelfError::SlotOutOfRange {
                index,
                len: self.slots.len(),
            });
        }
        let removed = self.slots.remove(index);
        if self.drag_source == Some(removed.id) {
            self.drag_source = None;
        }
        Ok(removed)
    }

    pub fn begin_drag(&mut self, index: usize) -> Result<(), ShelfError> {
        let slot = self.slots.get(index).ok_or(ShelfError::SlotOutOfRange {
            index,
            len: self.slots.len(),
        })?;
        self.drag_source = Some(slot.id);
        Ok(())
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_source.is_some()
    }

    pub fn drag_source_index(&self) -> Option<usize> {
        let source = self.drag_source?;
        self.slots.iter().position(|slot| slot.id == source)
    }

    /// Ends the drag session by moving the dragged slot onto `target`.
    /// Returns whether a move happened.
    pub fn drop_onto(&mut self, target: usize) -> bool {
        let Some(from) = self.drag_source_index() else {
            self.drag_source = None;
            return false;
        };
        self.drag_source = None;
        let target = target.min(self.slots.len().saturating_sub(1));
        if from == target {
            return false;
        }
        self.reorder(from, target).is_ok()
    }

    pub fn cancel_drag(&mut self) {
        self.drag_source = None;
    }

    /// Files to upload, left to right, skipping slots that are still reading or failed.
    pub fn ordered_files(&self) -> Vec<SourceFile> {
        self.slots
            .iter()
            .filter_map(ImageSlot::source)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use eframe::egui::ColorImage;

    use super::*;

    fn loaded(name: &str) -> LoadedImage {
        LoadedImage {
            preview: ColorImage::new([1, 1], eframe::egui::Color32::WHITE),
            source: SourceFile {
                name: name.to_string(),
                mime: "image/png".to_string(),
                bytes: Arc::from(name.as_bytes()),
            },
        }
    }

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    fn ready_shelf(names: &[&str]) -> ImageShelf {
        let mut shelf = ImageShelf::new(6);
        let requests = shelf.select_files(paths(names)).expect("batch fits");
        for request in requests {
            let name = request.path.to_string_lossy().to_string();
            assert!(shelf.complete_read(request.slot, Ok(loaded(&name))));
        }
        shelf
    }

    fn names(shelf: &ImageShelf) -> Vec<String> {
        shelf
            .ordered_files()
            .into_iter()
            .map(|file| file.name)
            .collect()
    }

    #[test]
    fn moving_last_image_to_front_reorders_files() {
        let mut shelf = ready_shelf(&["A", "B", "C"]);
        shelf.reorder(2, 0).expect("indices are valid");
        assert_eq!(names(&shelf), vec!["C", "A", "B"]);
    }

    #[test]
    fn ordered_files_tracks_visual_order_after_any_moves() {
        let mut shelf = ready_shelf(&["A", "B", "C", "D", "E", "F"]);
        let moves = [(0, 5), (3, 1), (5, 5), (2, 4), (4, 0)];
        let mut expected = vec!["A", "B", "C", "D", "E", "F"];
        for (from, to) in moves {
            shelf.reorder(from, to).expect("indices are valid");
            let moved = expected.remove(from);
            expected.insert(to, moved);
            let visual = shelf
                .slots()
                .iter()
                .map(|slot| slot.label().to_string())
                .collect::<Vec<_>>();
            assert_eq!(names(&shelf), visual);
        }
        assert_eq!(names(&shelf), expected);
    }

    #[test]
    fn oversized_batch_leaves_shelf_unchanged() {
        let mut shelf = ready_shelf(&["A", "B"]);
        let error = shelf
            .select_files(paths(&["1", "2", "3", "4", "5", "6", "7"]))
            .expect_err("batch exceeds capacity");
        assert_eq!(
            error,
            ShelfError::CapacityExceeded {
                requested: 7,
                capacity: 6
            }
        );
        assert_eq!(names(&shelf), vec!["A", "B"]);
    }

    #[test]
    fn new_selection_clears_previous_slots_and_ignores_stale_reads() {
        let mut shelf = ImageShelf::new(5);
        let first = shelf.select_files(paths(&["A", "B", "C"])).expect("fits");
        let second = shelf.select_files(paths(&["D"])).expect("fits");
        assert_eq!(shelf.len(), 1);
        assert!(!shelf.complete_read(first[0].slot, Ok(loaded("A"))));
        assert!(shelf.complete_read(second[0].slot, Ok(loaded("D"))));
        assert_eq!(names(&shelf), vec!["D"]);
    }

    #[test]
    fn out_of_order_reads_land_in_their_own_slots() {
        let mut shelf = ImageShelf::new(6);
        let requests = shelf.select_files(paths(&["A", "B", "C"])).expect("fits");
        assert!(shelf.has_pending_reads());
        assert!(shelf.complete_read(requests[2].slot, Ok(loaded("C"))));
        assert_eq!(names(&shelf), vec!["C"]);
        assert!(shelf.complete_read(requests[0].slot, Ok(loaded("A"))));
        assert!(shelf.complete_read(requests[1].slot, Err("corrupt".to_string())));
        assert!(!shelf.has_pending_reads());
        assert_eq!(names(&shelf), vec!["A", "C"]);
        assert!(matches!(
            shelf.slots()[1].content(),
            SlotContent::Failed(reason) if reason == "corrupt"
        ));
    }

    #[test]
    fn remove_compacts_positions() {
        let mut shelf = ready_shelf(&["A", "B", "C"]);
        let removed = shelf.remove(1).expect("index is valid");
        assert_eq!(removed.label(), "B");
        assert_eq!(names(&shelf), vec!["A", "C"]);
        assert!(shelf.remove(2).is_err());
    }

    #[test]
    fn move_buttons_follow_edges() {
        let mut shelf = ready_shelf(&["A", "B", "C"]);
        assert!(!shelf.can_move_left(0));
        assert!(shelf.can_move_right(0));
        assert!(!shelf.can_move_right(2));
        shelf.move_right(0).expect("can move right");
        shelf.move_left(2).expect("can move left");
        assert_eq!(names(&shelf), vec!["B", "C", "A"]);
        assert!(shelf.move_left(0).is_err());
    }

    #[test]
    fn drag_reorder_never_adds_a_slot() {
        let mut shelf = ready_shelf(&["A", "B", "C"]);
        shelf.begin_drag(0).expect("index is valid");
        assert_eq!(
            shelf.append_files(paths(&["A"])),
            Err(ShelfError::DragInProgress)
        );
        assert!(shelf.drop_onto(2));
        assert!(!shelf.is_dragging());
        assert_eq!(shelf.len(), 3);
        assert_eq!(names(&shelf), vec!["B", "C", "A"]);
    }

    #[test]
    fn external_drop_appends_within_capacity() {
        let mut shelf = ready_shelf(&["A", "B"]);
        let requests = shelf.append_files(paths(&["C"])).expect("fits");
        assert!(shelf.complete_read(requests[0].slot, Ok(loaded("C"))));
        assert_eq!(names(&shelf), vec!["A", "B", "C"]);

        let error = shelf
            .append_files(paths(&["D", "E", "F", "G"]))
            .expect_err("exceeds capacity");
        assert_eq!(
            error,
            ShelfError::CapacityExceeded {
                requested: 7,
                capacity: 6
            }
        );
        assert_eq!(shelf.len(), 3);
    }

    #[test]
    fn drop_without_drag_session_is_ignored() {
        let mut shelf = ready_shelf(&["A", "B"]);
        assert!(!shelf.drop_onto(0));
        shelf.begin_drag(1).expect("index is valid");
        shelf.cancel_drag();
        assert!(!shelf.drop_onto(0));
        assert_eq!(names(&shelf), vec!["A", "B"]);
    }
}
