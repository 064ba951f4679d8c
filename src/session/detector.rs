//! Completion detection
//!
//! Session processes never say when a command is finished, so completion is
//! inferred from output timing: the gap since the last chunk (quiescence),
//! the time since the command started, and the shape of the transcript tail.
//!
//! ```text
//! AwaitingFirstOutput --chunk--> Running --quiet > between_output--> Done
//!        |                          |
//!        |                          +--dialog tail, quiet > dialog--> AwaitingDialog
//!        +--no output > first_output, process idle--> Done
//! any state --elapsed > max_exec--> TimedOut
//! any state --shell prompt echoed--> Done
//! ```
//!
//! The detector is a pure state machine over `(chunk, now)` observations so
//! it can be driven by the session loop and by tests with synthetic clocks.

use std::time::{Duration, Instant};

use super::prompt::{PromptClassifier, ends_with_dialog, ends_with_shell_prompt};
use crate::types::Timeouts;

/// Minimum spacing between two activity probes of a silent command
const PROBE_INTERVAL: Duration = Duration::from_secs(1);
/// Bytes of transcript tail inspected for prompts
const TAIL_WINDOW: usize = 4096;

/// Reports whether a silent process is still doing work
pub trait ActivityProbe {
    /// True while the command has live work (children, or running itself)
    fn is_busy(&self) -> bool;
}

/// Execution state of the command in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionState {
    /// Output is flowing
    #[default]
    Running,
    /// Submitted, nothing printed yet
    AwaitingFirstOutput,
    /// Output stopped on an interactive prompt
    AwaitingDialog,
    /// Command is considered finished
    Done,
    /// Max execution timeout hit; the process keeps running
    TimedOut,
}

impl CompletionState {
    /// Whether the completion loop stops in this state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::AwaitingDialog | Self::Done | Self::TimedOut)
    }

    /// Get status string for API responses
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::AwaitingFirstOutput => "awaiting_first_output",
            Self::AwaitingDialog => "awaiting_dialog",
            Self::Done => "done",
            Self::TimedOut => "timed_out",
        }
    }
}

impl std::fmt::Display for CompletionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the completion loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// No new output for the between-output timeout
    Quiescent,
    /// The transcript ends with a shell or REPL prompt
    PromptDetected,
    /// Nothing printed within the first-output timeout and the process is idle
    NoOutput,
    /// Output paused on a dialog-looking line
    Dialog,
    /// Max execution timeout reached
    MaxTimeout,
}

impl Termination {
    /// Terminal state this reason maps to
    pub fn state(self) -> CompletionState {
        match self {
            Self::Quiescent | Self::PromptDetected | Self::NoOutput => CompletionState::Done,
            Self::Dialog => CompletionState::AwaitingDialog,
            Self::MaxTimeout => CompletionState::TimedOut,
        }
    }
}

/// Completion detector for one submitted command
#[derive(Debug)]
pub struct CompletionDetector<'a> {
    timeouts: Timeouts,
    classifier: &'a dyn PromptClassifier,
    /// Prompt that ends the transcript even without a trailing newline
    prompt_suffix: Option<&'a str>,
    started: Instant,
    last_output: Instant,
    next_probe: Option<Instant>,
    state: CompletionState,
    termination: Option<Termination>,
    transcript: Vec<u8>,
}

impl<'a> CompletionDetector<'a> {
    /// Start detecting for a command submitted at `started`
    pub fn new(timeouts: Timeouts, classifier: &'a dyn PromptClassifier, started: Instant) -> Self {
        Self {
            timeouts,
            classifier,
            prompt_suffix: None,
            started,
            last_output: started,
            next_probe: None,
            state: CompletionState::AwaitingFirstOutput,
            termination: None,
            transcript: Vec::new(),
        }
    }

    /// Also complete when the raw transcript ends with `suffix`
    ///
    /// REPLs print their prompt right after the last output byte, so it is not
    /// always on a line of its own.
    pub fn with_prompt_suffix(mut self, suffix: &'a str) -> Self {
        self.prompt_suffix = Some(suffix);
        self
    }

    /// Feed one polling tick
    ///
    /// `chunk` is whatever arrived since the previous tick (possibly empty).
    /// Returns the termination reason once a terminal state is reached; the
    /// result is sticky.
    pub fn observe(
        &mut self,
        chunk: &[u8],
        now: Instant,
        probe: &dyn ActivityProbe,
    ) -> Option<Termination> {
        if self.termination.is_some() {
            return self.termination;
        }

        if !chunk.is_empty() {
            self.transcript.extend_from_slice(chunk);
            self.last_output = now;
            self.state = CompletionState::Running;

            let suffix_seen = self
                .prompt_suffix
                .is_some_and(|suffix| self.transcript.ends_with(suffix.as_bytes()));
            if suffix_seen || ends_with_shell_prompt(self.classifier, &self.tail_text()) {
                return self.finish(Termination::PromptDetected);
            }
        }

        if now.duration_since(self.started) > self.timeouts.max_exec {
            return self.finish(Termination::MaxTimeout);
        }

        match self.state {
            CompletionState::AwaitingFirstOutput => {
                if now.duration_since(self.started) > self.timeouts.first_output
                    && self.next_probe.is_none_or(|at| now >= at)
                {
                    if !probe.is_busy() {
                        return self.finish(Termination::NoOutput);
                    }
                    // Alive and working, only the max ceiling applies now
                    self.next_probe = Some(now + PROBE_INTERVAL);
                }
            }
            CompletionState::Running => {
                let quiet = now.duration_since(self.last_output);
                if quiet > self.timeouts.between_output {
                    return self.finish(Termination::Quiescent);
                }
                // Fresh output this tick means the process is progressing
                if chunk.is_empty()
                    && quiet > self.timeouts.dialog
                    && ends_with_dialog(self.classifier, &self.tail_text())
                {
                    return self.finish(Termination::Dialog);
                }
            }
            _ => {}
        }

        None
    }

    /// Current state
    pub fn state(&self) -> CompletionState {
        self.state
    }

    /// Bytes observed so far for this command
    pub fn transcript(&self) -> &[u8] {
        &self.transcript
    }

    /// Consume the detector, returning the transcript
    pub fn into_transcript(self) -> Vec<u8> {
        self.transcript
    }

    fn finish(&mut self, termination: Termination) -> Option<Termination> {
        self.state = termination.state();
        self.termination = Some(termination);
        self.termination
    }

    fn tail_text(&self) -> String {
        let start = self.transcript.len().saturating_sub(TAIL_WINDOW);
        String::from_utf8_lossy(&self.transcript[start..]).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RegexPromptClassifier;

    struct Idle;
    impl ActivityProbe for Idle {
        fn is_busy(&self) -> bool {
            false
        }
    }

    struct Busy;
    impl ActivityProbe for Busy {
        fn is_busy(&self) -> bool {
            true
        }
    }

    fn timeouts() -> Timeouts {
        Timeouts {
            first_output: Duration::from_secs(30),
            between_output: Duration::from_secs(15),
            dialog: Duration::from_secs(5),
            max_exec: Duration::from_secs(180),
        }
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_silent_command_completes_when_idle() {
        let classifier = RegexPromptClassifier;
        let t0 = Instant::now();
        let mut d = CompletionDetector::new(timeouts(), &classifier, t0);

        assert_eq!(d.observe(b"", t0 + secs(10), &Idle), None);
        assert_eq!(d.state(), CompletionState::AwaitingFirstOutput);

        assert_eq!(d.observe(b"", t0 + secs(31), &Idle), Some(Termination::NoOutput));
        assert_eq!(d.state(), CompletionState::Done);
        assert!(d.transcript().is_empty());
    }

    #[test]
    fn test_silent_busy_command_escalates_to_timeout() {
        let classifier = RegexPromptClassifier;
        let t0 = Instant::now();
        let mut d = CompletionDetector::new(timeouts(), &classifier, t0);

        assert_eq!(d.observe(b"", t0 + secs(31), &Busy), None);
        assert_eq!(d.observe(b"", t0 + secs(120), &Busy), None);
        assert_eq!(d.state(), CompletionState::AwaitingFirstOutput);
        assert_eq!(
            d.observe(b"", t0 + secs(181), &Busy),
            Some(Termination::MaxTimeout)
        );
        assert_eq!(d.state(), CompletionState::TimedOut);
    }

    #[test]
    fn test_continuous_output_is_never_quiescent() {
        let classifier = RegexPromptClassifier;
        let t0 = Instant::now();
        let mut d = CompletionDetector::new(timeouts(), &classifier, t0);

        // A chunk every 10s for 150s: far beyond between_output in total
        for i in 1..=15 {
            let now = t0 + secs(i * 10);
            assert_eq!(d.observe(b"progress\n", now, &Idle), None, "tick {i}");
            assert_eq!(d.state(), CompletionState::Running);
        }

        let last = t0 + secs(150);
        assert_eq!(d.observe(b"", last + secs(9), &Idle), None);
        assert_eq!(d.observe(b"", last + secs(16), &Idle), Some(Termination::Quiescent));
        assert_eq!(d.state(), CompletionState::Done);
    }

    #[test]
    fn test_max_timeout_with_partial_output() {
        let classifier = RegexPromptClassifier;
        let t0 = Instant::now();
        let mut d = CompletionDetector::new(timeouts(), &classifier, t0);

        for i in 1..=18 {
            d.observe(b"tick\n", t0 + secs(i * 10), &Idle);
        }
        assert_eq!(
            d.observe(b"tick\n", t0 + secs(181), &Idle),
            Some(Termination::MaxTimeout)
        );
        assert!(!d.transcript().is_empty());
    }

    #[test]
    fn test_dialog_detected_after_dialog_timeout() {
        let classifier = RegexPromptClassifier;
        let t0 = Instant::now();
        let mut d = CompletionDetector::new(timeouts(), &classifier, t0);

        let prompt_at = t0 + secs(1);
        assert_eq!(
            d.observe(b"rm: remove regular file 'x'? ", prompt_at, &Idle),
            None
        );
        assert_eq!(d.observe(b"", prompt_at + secs(3), &Idle), None);
        assert_eq!(
            d.observe(b"", prompt_at + secs(6), &Idle),
            Some(Termination::Dialog)
        );
        assert_eq!(d.state(), CompletionState::AwaitingDialog);
    }

    #[test]
    fn test_new_output_beats_stale_dialog_suspicion() {
        let classifier = RegexPromptClassifier;
        let t0 = Instant::now();
        let mut d = CompletionDetector::new(timeouts(), &classifier, t0);

        d.observe(b"Continue? ", t0 + secs(1), &Idle);
        // Output arrives in the very tick the dialog timeout would fire
        assert_eq!(d.observe(b"Proceed? ", t0 + secs(7), &Idle), None);
        assert_eq!(d.state(), CompletionState::Running);
        // Dialog clock restarts from the latest chunk
        assert_eq!(d.observe(b"", t0 + secs(11), &Idle), None);
        assert_eq!(
            d.observe(b"", t0 + secs(13), &Idle),
            Some(Termination::Dialog)
        );
    }

    #[test]
    fn test_plain_output_pause_is_not_a_dialog() {
        let classifier = RegexPromptClassifier;
        let t0 = Instant::now();
        let mut d = CompletionDetector::new(timeouts(), &classifier, t0);

        d.observe(b"building...\n", t0 + secs(1), &Idle);
        assert_eq!(d.observe(b"", t0 + secs(10), &Idle), None);
        assert_eq!(d.state(), CompletionState::Running);
    }

    #[test]
    fn test_shell_prompt_echo_completes_immediately() {
        let classifier = RegexPromptClassifier;
        let t0 = Instant::now();
        let mut d = CompletionDetector::new(timeouts(), &classifier, t0);

        assert_eq!(d.observe(b"hello\n", t0 + secs(1), &Idle), None);
        assert_eq!(
            d.observe(b">>> ", t0 + secs(1), &Idle),
            Some(Termination::PromptDetected)
        );
        assert_eq!(d.state(), CompletionState::Done);
        assert_eq!(d.into_transcript(), b"hello\n>>> ".to_vec());
    }

    #[test]
    fn test_prompt_suffix_without_newline() {
        let classifier = RegexPromptClassifier;
        let t0 = Instant::now();

        let mut plain = CompletionDetector::new(timeouts(), &classifier, t0);
        assert_eq!(plain.observe(b"x>>> ", t0 + secs(1), &Idle), None);

        let mut repl = CompletionDetector::new(timeouts(), &classifier, t0).with_prompt_suffix(">>> ");
        assert_eq!(
            repl.observe(b"x>>> ", t0 + secs(1), &Idle),
            Some(Termination::PromptDetected)
        );
        assert_eq!(repl.into_transcript(), b"x>>> ".to_vec());
    }

    #[test]
    fn test_termination_is_sticky() {
        let classifier = RegexPromptClassifier;
        let t0 = Instant::now();
        let mut d = CompletionDetector::new(timeouts(), &classifier, t0);

        d.observe(b"", t0 + secs(31), &Idle);
        assert_eq!(
            d.observe(b"late\n", t0 + secs(32), &Idle),
            Some(Termination::NoOutput)
        );
        assert!(d.transcript().is_empty());
    }

    #[test]
    fn test_state_strings() {
        assert_eq!(CompletionState::Done.as_str(), "done");
        assert_eq!(CompletionState::TimedOut.as_str(), "timed_out");
        assert_eq!(CompletionState::AwaitingDialog.to_string(), "awaiting_dialog");
        assert!(CompletionState::Done.is_terminal());
        assert!(!CompletionState::AwaitingFirstOutput.is_terminal());
        assert_eq!(Termination::Dialog.state(), CompletionState::AwaitingDialog);
    }
}
