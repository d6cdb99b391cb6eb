/// What caused a redraw request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewEvent {
    Pan,
    Zoom,
    Resize,
    ConfigApplied,
    DataChanged,
}

/// Single-slot redraw flag: any number of requests between two frames
/// produce exactly one frame.
#[derive(Debug, Default)]
pub struct FrameCoalescer {
    pending: bool,
    requests: u64,
    frames: u64,
}

impl FrameCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a redraw request. Returns `true` only for the first request of a
    /// frame; the caller must schedule the frame callback in that case.
    pub fn request(&mut self) -> bool {
        self.requests += 1;
        if self.pending {
            return false;
        }
        self.pending = true;
        true
    }

    /// Consume the pending flag at frame time. Returns whether a redraw is due.
    pub fn take_frame(&mut self) -> bool {
        if !self.pending {
            return false;
        }
        self.pending = false;
        self.frames += 1;
        true
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::FrameCoalescer;

    #[test]
    fn burst_of_requests_yields_one_frame() {
        let mut coalescer = FrameCoalescer::new();
        // pan + zoom + resize within one frame
        assert!(coalescer.request());
        assert!(!coalescer.request());
        assert!(!coalescer.request());

        assert!(coalescer.take_frame());
        assert!(!coalescer.take_frame());
        assert_eq!(coalescer.frames(), 1);
        assert_eq!(coalescer.requests(), 3);
    }

    #[test]
    fn request_after_frame_schedules_again() {
        let mut coalescer = FrameCoalescer::new();
        assert!(coalescer.request());
        assert!(coalescer.take_frame());
        assert!(coalescer.request());
        assert!(coalescer.is_pending());
    }
}
