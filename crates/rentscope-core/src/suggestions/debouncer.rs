use std::time::Duration;

/// Where the debouncer currently is. Times are offsets from an epoch chosen
/// by the driver.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DebounceState {
    Idle,
    Pending {
        seq: u64,
        due_at: Duration,
        text: String,
    },
    InFlight {
        seq: u64,
    },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum KeystrokeEffect {
    /// Input too short: the list is cleared and nothing is scheduled.
    Cleared,
    Scheduled { seq: u64, due_at: Duration },
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IssuedRequest {
    pub seq: u64,
    pub text: String,
}

/// Sequence-numbered debounce state machine. Every keystroke allocates a new
/// sequence number; only the response carrying the newest number may be
/// applied.
#[derive(Clone, Debug)]
pub struct SuggestionDebouncer {
    delay: Duration,
    min_chars: usize,
    seq: u64,
    state: DebounceState,
}

impl SuggestionDebouncer {
    pub fn new(delay: Duration, min_chars: usize) -> Self {
        Self {
            delay,
            min_chars,
            seq: 0,
            state: DebounceState::Idle,
        }
    }

    pub fn state(&self) -> &DebounceState {
        &self.state
    }

    pub fn keystroke(&mut self, text: &str, now: Duration) -> KeystrokeEffect {
        self.seq = self.seq.saturating_add(1);

        let trimmed = text.trim();
        if trimmed.chars().count() < self.min_chars {
            self.state = DebounceState::Idle;
            return KeystrokeEffect::Cleared;
        }

        let due_at = now.saturating_add(self.delay);
        self.state = DebounceState::Pending {
            seq: self.seq,
            due_at,
            text: trimmed.to_string(),
        };
        KeystrokeEffect::Scheduled {
            seq: self.seq,
            due_at,
        }
    }

    /// Issues the pending request once its deadline has passed.
    pub fn poll(&mut self, now: Duration) -> Option<IssuedRequest> {
        let DebounceState::Pending { seq, due_at, text } = &self.state else {
            return None;
        };
        if now < *due_at {
            return None;
        }

        let request = IssuedRequest {
            seq: *seq,
            text: text.clone(),
        };
        self.state = DebounceState::InFlight { seq: request.seq };
        Some(request)
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        match &self.state {
            DebounceState::Pending { due_at, .. } => Some(*due_at),
            _ => None,
        }
    }

    /// True when the response for `seq` may be applied.
    pub fn accept(&mut self, seq: u64) -> bool {
        self.resolve(seq)
    }

    /// Records a failed request; the caller keeps the last list either way.
    pub fn fail(&mut self, seq: u64) -> bool {
        self.resolve(seq)
    }

    fn resolve(&mut self, seq: u64) -> bool {
        if self.state != (DebounceState::InFlight { seq }) || seq != self.seq {
            return false;
        }
        self.state = DebounceState::Idle;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn short_input_clears_and_cancels_pending() {
        let mut debouncer = SuggestionDebouncer::new(ms(300), 2);
        debouncer.keystroke("bos", ms(0));
        assert_eq!(debouncer.keystroke(" b ", ms(10)), KeystrokeEffect::Cleared);
        assert_eq!(debouncer.poll(ms(1_000)), None);
        assert_eq!(debouncer.state(), &DebounceState::Idle);
    }

    #[test]
    fn stale_response_is_rejected_after_new_keystroke() {
        let mut debouncer = SuggestionDebouncer::new(ms(300), 2);
        debouncer.keystroke("bo", ms(0));
        let first = debouncer.poll(ms(300)).unwrap();
        debouncer.keystroke("bos", ms(310));
        assert!(!debouncer.accept(first.seq));

        let second = debouncer.poll(ms(610)).unwrap();
        assert_eq!(second.text, "bos");
        assert!(debouncer.accept(second.seq));
        assert!(!debouncer.accept(second.seq));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let mut debouncer = SuggestionDebouncer::new(ms(300), 2);
        assert_eq!(debouncer.keystroke("é", ms(0)), KeystrokeEffect::Cleared);
        assert!(matches!(
            debouncer.keystroke("év", ms(0)),
            KeystrokeEffect::Scheduled { .. }
        ));
    }
}
