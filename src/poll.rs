//! Line cursor over a growing long-poll response body.
//!
//! A check looks at the response as it stands right now (phase, status, bytes
//! received so far) and delivers every complete, non-blank line past the
//! cursor exactly once. Running the same check again on an unchanged body
//! delivers nothing.

/// How far along the current request is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePhase {
    /// Sent, no headers yet.
    Opened,
    /// Headers received, body still growing.
    Receiving,
    /// Body fully received.
    Complete,
}

#[derive(Debug, Clone, Copy)]
pub struct ResponseSnapshot<'a> {
    pub phase: ResponsePhase,
    pub status: u16,
    pub body: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Nothing to look at yet, or a failing response still streaming.
    Pending,
    /// Keep reading the current response.
    Continue,
    /// Body grew past the line threshold; drop this request and open a new one.
    Reconnect,
    /// Server finished a successful response.
    Finished,
    /// Server finished with a non-success status.
    Failed(u16),
}

#[derive(Debug, Clone)]
pub struct PollCursor {
    next_line: usize,
    line_threshold: usize,
}

impl PollCursor {
    pub fn new(line_threshold: usize) -> Self {
        Self {
            next_line: 0,
            line_threshold,
        }
    }

    /// Index of the first line not yet consumed.
    pub fn position(&self) -> usize {
        self.next_line
    }

    pub fn reset(&mut self) {
        self.next_line = 0;
    }

    pub fn check<F>(&mut self, snapshot: ResponseSnapshot<'_>, mut on_message: F) -> CheckOutcome
    where
        F: FnMut(&str),
    {
        let success = (200..300).contains(&snapshot.status);
        match snapshot.phase {
            ResponsePhase::Opened => return CheckOutcome::Pending,
            ResponsePhase::Receiving if !success => return CheckOutcome::Pending,
            ResponsePhase::Complete if !success => return CheckOutcome::Failed(snapshot.status),
            _ => {}
        }

        let lines: Vec<&[u8]> = snapshot.body.split(|byte| *byte == b'\n').collect();
        // The segment after the last newline may still be growing.
        let consumable = match snapshot.phase {
            ResponsePhase::Complete => lines.len(),
            _ => lines.len().saturating_sub(1),
        };

        for (index, raw) in lines
            .iter()
            .enumerate()
            .take(consumable)
            .skip(self.next_line)
        {
            let line = String::from_utf8_lossy(raw);
            let line = line.trim();
            if !line.is_empty() {
                on_message(line);
            }
            self.next_line = index + 1;
        }

        if lines.len() > self.line_threshold {
            return CheckOutcome::Reconnect;
        }
        match snapshot.phase {
            ResponsePhase::Complete => CheckOutcome::Finished,
            _ => CheckOutcome::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receiving(body: &str) -> ResponseSnapshot<'_> {
        ResponseSnapshot {
            phase: ResponsePhase::Receiving,
            status: 200,
            body: body.as_bytes(),
        }
    }

    fn run(cursor: &mut PollCursor, snapshot: ResponseSnapshot<'_>) -> (CheckOutcome, Vec<String>) {
        let mut seen = Vec::new();
        let outcome = cursor.check(snapshot, |line| seen.push(line.to_string()));
        (outcome, seen)
    }

    #[test]
    fn two_progress_events_deliver_two_messages() {
        let mut cursor = PollCursor::new(100);
        let (_, first) = run(&mut cursor, receiving("msg1\n"));
        let (_, second) = run(&mut cursor, receiving("msg1\nmsg2\n"));
        assert_eq!(first, vec!["msg1"]);
        assert_eq!(second, vec!["msg2"]);
    }

    #[test]
    fn rescanning_unchanged_body_delivers_nothing() {
        let mut cursor = PollCursor::new(100);
        let body = "a\nb\n\nc\n";
        let (_, first) = run(&mut cursor, receiving(body));
        assert_eq!(first, vec!["a", "b", "c"]);
        let position = cursor.position();
        for _ in 0..5 {
            let (outcome, again) = run(&mut cursor, receiving(body));
            assert_eq!(outcome, CheckOutcome::Continue);
            assert!(again.is_empty());
        }
        assert_eq!(cursor.position(), position);
    }

    #[test]
    fn appended_lines_arrive_once_in_order() {
        let mut cursor = PollCursor::new(100);
        let mut body = String::new();
        let mut all = Vec::new();
        for (index, chunk) in ["one\n", "  \n", "two\nthr", "ee\n", "\n\nfour\n"]
            .iter()
            .enumerate()
        {
            body.push_str(chunk);
            // several checks between appends, as the interval timer would do
            for _ in 0..=index {
                let (_, seen) = run(&mut cursor, receiving(&body));
                all.extend(seen);
            }
        }
        assert_eq!(all, vec!["one", "two", "three", "four"]);
    }

    #[test]
    fn unterminated_tail_waits_for_newline_or_completion() {
        let mut cursor = PollCursor::new(100);
        let (_, seen) = run(&mut cursor, receiving("done\npart"));
        assert_eq!(seen, vec!["done"]);

        let (outcome, seen) = run(
            &mut cursor,
            ResponseSnapshot {
                phase: ResponsePhase::Complete,
                status: 200,
                body: b"done\npartial",
            },
        );
        assert_eq!(seen, vec!["partial"]);
        assert_eq!(outcome, CheckOutcome::Finished);
    }

    #[test]
    fn opened_request_is_not_inspected() {
        let mut cursor = PollCursor::new(100);
        let (outcome, seen) = run(
            &mut cursor,
            ResponseSnapshot {
                phase: ResponsePhase::Opened,
                status: 0,
                body: b"ghost\n",
            },
        );
        assert_eq!(outcome, CheckOutcome::Pending);
        assert!(seen.is_empty());
    }

    #[test]
    fn error_body_is_never_delivered() {
        let mut cursor = PollCursor::new(100);
        let body = b"<html>\nboom\n";
        let (outcome, seen) = run(
            &mut cursor,
            ResponseSnapshot {
                phase: ResponsePhase::Receiving,
                status: 500,
                body,
            },
        );
        assert_eq!(outcome, CheckOutcome::Pending);
        assert!(seen.is_empty());

        let (outcome, seen) = run(
            &mut cursor,
            ResponseSnapshot {
                phase: ResponsePhase::Complete,
                status: 500,
                body,
            },
        );
        assert_eq!(outcome, CheckOutcome::Failed(500));
        assert!(seen.is_empty());
        assert_eq!(cursor.position(), 0);
    }

    #[test]
    fn crossing_threshold_requests_reconnect_and_reset_starts_fresh() {
        let mut cursor = PollCursor::new(100);
        let body: String = (0..100).map(|i| format!("m{i}\n")).collect();
        // 100 newlines split into 101 segments
        let (outcome, seen) = run(&mut cursor, receiving(&body));
        assert_eq!(outcome, CheckOutcome::Reconnect);
        assert_eq!(seen.len(), 100);
        assert_eq!(seen.first().map(String::as_str), Some("m0"));
        assert_eq!(seen.last().map(String::as_str), Some("m99"));

        cursor.reset();
        assert_eq!(cursor.position(), 0);
        let (outcome, seen) = run(&mut cursor, receiving("fresh\n"));
        assert_eq!(outcome, CheckOutcome::Continue);
        assert_eq!(seen, vec!["fresh"]);
    }

    #[test]
    fn at_threshold_keeps_connection() {
        let mut cursor = PollCursor::new(100);
        let body: String = (0..99).map(|i| format!("m{i}\n")).collect();
        let (outcome, seen) = run(&mut cursor, receiving(&body));
        assert_eq!(outcome, CheckOutcome::Continue);
        assert_eq!(seen.len(), 99);
    }
}
