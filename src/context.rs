//! Context accumulator: reference images from already-verified components.
//!
//! Later generation and QC requests see these to bias output toward
//! stylistic consistency with what has already passed.

use crate::stage::Snapshot;

/// Ordered collection of one reference snapshot per verified component,
/// in verification order.
#[derive(Debug, Default)]
pub struct ContextAccumulator {
    images: Vec<Snapshot>,
}

impl ContextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a verified component's reference image (by convention its
    /// first captured view).
    pub fn push(&mut self, snapshot: Snapshot) {
        self.images.push(snapshot);
    }

    /// The accumulated references, oldest first.
    pub fn images(&self) -> &[Snapshot] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::ViewAngle;

    fn snapshot(tag: u8) -> Snapshot {
        Snapshot { view: ViewAngle::index(0), data: vec![tag] }
    }

    #[test]
    fn accumulates_in_push_order() {
        let mut ctx = ContextAccumulator::new();
        assert!(ctx.is_empty());
        ctx.push(snapshot(1));
        ctx.push(snapshot(2));
        ctx.push(snapshot(3));
        assert_eq!(ctx.len(), 3);
        let tags: Vec<u8> = ctx.images().iter().map(|s| s.data[0]).collect();
        assert_eq!(tags, vec![1, 2, 3]);
    }
}
