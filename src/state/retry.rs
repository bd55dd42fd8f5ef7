use std::time::Duration;

/// Reconnect delays in whole seconds following the Fibonacci sequence
/// (0, 1, 1, 2, 3, 5, ...) until a value reaches `cap`, then `cap` forever.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    current: u64,
    next: u64,
    cap: u64,
    capped: bool,
}

impl FibonacciBackoff {
    pub fn new(cap: Duration) -> Self {
        Self { current: 0, next: 1, cap: cap.as_secs(), capped: false }
    }

    pub fn next_delay(&mut self) -> Duration {
        if self.capped {
            return Duration::from_secs(self.cap);
        }
        let value = self.current;
        if value >= self.cap {
            self.capped = true;
            return Duration::from_secs(self.cap);
        }
        let following = self.current.saturating_add(self.next);
        self.current = self.next;
        self.next = following;
        Duration::from_secs(value)
    }

    pub fn reset(&mut self) {
        self.current = 0;
        self.next = 1;
        self.capped = false;
    }
}
