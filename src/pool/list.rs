//! Intrusive frame lists.
//!
//! The free and LRU lists link frames through the `FrameLink` slot embedded
//! in each frame, so list operations are O(1) and allocation-free. The list
//! head/tail live here; the links and the membership discriminator live in
//! the frames themselves.

use super::frame::{Frame, FrameId, FrameLink, ListTag};

/// A doubly-linked list of frames, threaded through the frame slab.
///
/// Every operation takes the slab so it can patch neighbor links. A frame
/// may be on at most one list; the `ListTag` recorded in its link slot names
/// which, and is checked in debug builds.
pub(super) struct FrameList {
    tag: ListTag,
    head: Option<FrameId>,
    tail: Option<FrameId>,
    len: usize,
}

impl FrameList {
    pub(super) fn new(tag: ListTag) -> Self {
        Self {
            tag,
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.len
    }

    /// Links `frame_id` at the front of the list.
    pub(super) fn push_front(&mut self, frames: &mut [Frame], frame_id: FrameId) {
        self.check_unlinked(frames, frame_id);

        let link = &mut frames[frame_id.as_usize()].link;
        link.list = Some(self.tag);
        link.prev = None;
        link.next = self.head;

        match self.head {
            Some(head) => frames[head.as_usize()].link.prev = Some(frame_id),
            None => self.tail = Some(frame_id),
        }
        self.head = Some(frame_id);
        self.len += 1;
    }

    /// Links `frame_id` at the back of the list.
    pub(super) fn push_back(&mut self, frames: &mut [Frame], frame_id: FrameId) {
        self.check_unlinked(frames, frame_id);

        let link = &mut frames[frame_id.as_usize()].link;
        link.list = Some(self.tag);
        link.prev = self.tail;
        link.next = None;

        match self.tail {
            Some(tail) => frames[tail.as_usize()].link.next = Some(frame_id),
            None => self.head = Some(frame_id),
        }
        self.tail = Some(frame_id);
        self.len += 1;
    }

    /// Unlinks and returns the frame at the front of the list.
    pub(super) fn pop_front(&mut self, frames: &mut [Frame]) -> Option<FrameId> {
        let frame_id = self.head?;
        self.remove(frames, frame_id);
        Some(frame_id)
    }

    /// Unlinks `frame_id` from any position in the list.
    pub(super) fn remove(&mut self, frames: &mut [Frame], frame_id: FrameId) {
        let link = frames[frame_id.as_usize()].link;
        debug_assert_eq!(link.list, Some(self.tag), "frame is not on this list");

        match link.prev {
            Some(prev) => frames[prev.as_usize()].link.next = link.next,
            None => self.head = link.next,
        }
        match link.next {
            Some(next) => frames[next.as_usize()].link.prev = link.prev,
            None => self.tail = link.prev,
        }

        frames[frame_id.as_usize()].link = FrameLink::default();
        self.len -= 1;
    }

    fn check_unlinked(&self, frames: &[Frame], frame_id: FrameId) {
        let link = &frames[frame_id.as_usize()].link;
        debug_assert!(link.list.is_none(), "frame is already on a list");
        debug_assert!(link.prev.is_none() && link.next.is_none());
    }
}
