//! Out-of-order reassembly of multi-part intercepted transmissions.
//!
//! Fragments of one message share a (submarine, timestamp) key and carry a
//! 1-based part number plus the declared total. A [`FragmentBuffer`] holds
//! the slots until every part has arrived, then yields the in-order join —
//! whatever order the network delivered them in.

/// Outcome of feeding one fragment into a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentOutcome {
    /// Fragment stored (or silently ignored as a duplicate); more parts
    /// are still missing.
    Pending,
    /// Duplicate of an already-filled slot; nothing changed.
    Duplicate,
    /// Part number outside `[1, total_parts]`; nothing stored.
    Rejected,
    /// All parts present: the complete encrypted text, joined in order.
    /// The buffer is spent and must be discarded by the owner.
    Complete(String),
}

/// Reassembly buffer for one in-flight multi-part message.
///
/// Slot count is fixed at creation from the first fragment's declared
/// total. Duplicate deliveries of a filled slot never double-count.
#[derive(Debug, Clone)]
pub struct FragmentBuffer {
    slots: Vec<Option<String>>,
    filled: usize,
}

impl FragmentBuffer {
    /// Create a buffer sized for `total_parts` fragments.
    pub fn new(total_parts: u32) -> Self {
        Self {
            slots: vec![None; total_parts as usize],
            filled: 0,
        }
    }

    /// Declared part count.
    pub fn total_parts(&self) -> usize {
        self.slots.len()
    }

    /// Number of distinct parts received so far.
    pub fn filled(&self) -> usize {
        self.filled
    }

    /// Insert the fragment for 1-based `part_number`.
    ///
    /// Completion consumes the slots: after `Complete` is returned the
    /// buffer is empty and the owner is expected to drop it.
    pub fn insert(&mut self, part_number: u32, fragment: &str) -> FragmentOutcome {
        if part_number == 0 || part_number as usize > self.slots.len() {
            return FragmentOutcome::Rejected;
        }
        let slot = &mut self.slots[part_number as usize - 1];
        if slot.is_some() {
            return FragmentOutcome::Duplicate;
        }
        *slot = Some(fragment.to_string());
        self.filled += 1;

        if self.filled == self.slots.len() {
            let joined = self.slots.drain(..).flatten().collect::<String>();
            FragmentOutcome::Complete(joined)
        } else {
            FragmentOutcome::Pending
        }
    }
}
