//! Prompt classification
//!
//! Recognises shell-prompt echoes (the command is over) and interactive
//! dialogs (the command is waiting for input) in the tail of a transcript.
//! Kept apart from the timing state machine so the pattern set can change
//! without touching completion logic.

use once_cell::sync::Lazy;
use regex::Regex;

/// Number of trailing lines inspected for a shell prompt
pub const PROMPT_TAIL_LINES: usize = 3;
/// Number of trailing lines inspected for a dialog
pub const DIALOG_TAIL_LINES: usize = 2;

/// Classifies transcript lines
pub trait PromptClassifier: Send + Sync + std::fmt::Debug {
    /// Whether `line` is a prompt printed by an idle shell or interpreter
    fn is_shell_prompt(&self, line: &str) -> bool;

    /// Whether `line` looks like a question waiting on user input
    fn is_dialog(&self, line: &str) -> bool;
}

static SHELL_PROMPTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // (venv) user@host:~$
        r"\(venv\).+[$#] ?$",
        // root@container:~#
        r"root@[^:]+:[^#]+# ?$",
        // user@host:~$
        r"[a-zA-Z0-9_.-]+@[^:]+:[^$#]+[$#] ?$",
        // bash-5.2$
        r"bash-\d+\.\d+\$ ?$",
        // Python REPL
        r"^>>> ?$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid shell prompt pattern"))
    .collect()
});

static DIALOGS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r"(?i)Y/N", r"(?i)yes/no", r":\s*$", r"\?\s*$"]
        .iter()
        .map(|p| Regex::new(p).expect("valid dialog pattern"))
        .collect()
});

/// Default regex-based classifier
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexPromptClassifier;

impl PromptClassifier for RegexPromptClassifier {
    fn is_shell_prompt(&self, line: &str) -> bool {
        let line = line.trim();
        SHELL_PROMPTS.iter().any(|re| re.is_match(line))
    }

    fn is_dialog(&self, line: &str) -> bool {
        let line = line.trim();
        DIALOGS.iter().any(|re| re.is_match(line))
    }
}

/// Whether any of the last [`PROMPT_TAIL_LINES`] lines is a shell prompt
pub fn ends_with_shell_prompt(classifier: &dyn PromptClassifier, text: &str) -> bool {
    tail_lines(text, PROMPT_TAIL_LINES)
        .iter()
        .any(|line| classifier.is_shell_prompt(line))
}

/// Whether any of the last [`DIALOG_TAIL_LINES`] lines looks like a dialog
pub fn ends_with_dialog(classifier: &dyn PromptClassifier, text: &str) -> bool {
    tail_lines(text, DIALOG_TAIL_LINES)
        .iter()
        .any(|line| classifier.is_dialog(line))
}

/// Last `n` non-blank lines, most recent first
fn tail_lines(text: &str, n: usize) -> Vec<&str> {
    text.lines()
        .rev()
        .filter(|line| !line.trim().is_empty())
        .take(n)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_prompts() {
        let c = RegexPromptClassifier;
        assert!(c.is_shell_prompt("root@4f2a9c:~# "));
        assert!(c.is_shell_prompt("alice@devbox:~/src$"));
        assert!(c.is_shell_prompt("(venv) alice@devbox:~/src$ "));
        assert!(c.is_shell_prompt("bash-5.2$ "));
        assert!(c.is_shell_prompt(">>> "));

        assert!(!c.is_shell_prompt("hello"));
        assert!(!c.is_shell_prompt("total 42"));
        assert!(!c.is_shell_prompt(">>> print(1)"));
    }

    #[test]
    fn test_dialogs() {
        let c = RegexPromptClassifier;
        assert!(c.is_dialog("Do you want to continue? [Y/n]"));
        assert!(c.is_dialog("Are you sure (yes/no)"));
        assert!(c.is_dialog("Password: "));
        assert!(c.is_dialog("rm: remove regular empty file 'x'? "));

        assert!(!c.is_dialog("Compiling foo v0.1.0"));
        assert!(!c.is_dialog("done."));
    }

    #[test]
    fn test_tail_inspection() {
        let c = RegexPromptClassifier;
        let text = "line one\nline two\nroot@box:/# \n";
        assert!(ends_with_shell_prompt(&c, text));

        let old_prompt = "root@box:/# \na\nb\nc\n";
        assert!(!ends_with_shell_prompt(&c, old_prompt));

        assert!(ends_with_dialog(&c, "Installing...\nProceed? "));
        assert!(!ends_with_dialog(&c, "Proceed?\nyes\nok\n"));
    }
}
