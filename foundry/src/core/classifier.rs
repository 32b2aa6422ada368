//! Deterministic detection of assistant replies that wait on a human.

/// Decides whether an assistant reply needs a human answer before the loop continues.
pub trait InputClassifier {
    fn needs_input(&self, text: &str) -> bool;
}

impl<T: InputClassifier + ?Sized> InputClassifier for Box<T> {
    fn needs_input(&self, text: &str) -> bool {
        (**self).needs_input(text)
    }
}

/// Closings that end in a question mark but are not real questions.
const POLITE_CLOSINGS: [&str; 5] = [
    "let me know if",
    "feel free to",
    "anything else",
    "any other questions",
    "any questions",
];

/// Local classifier: the reply's final paragraph ends with a genuine question.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuestionHeuristic;

impl InputClassifier for QuestionHeuristic {
    fn needs_input(&self, text: &str) -> bool {
        ends_with_question(text)
    }
}

/// True when the last paragraph of `text` ends in a question that is not a polite closing.
pub fn ends_with_question(text: &str) -> bool {
    let Some(paragraph) = text
        .rsplit("\n\n")
        .map(str::trim)
        .find(|p| !p.is_empty())
    else {
        return false;
    };
    let last_line = paragraph.lines().last().unwrap_or(paragraph);
    let stripped = last_line.trim_end_matches(|c: char| c.is_whitespace() || "*_`)\"'".contains(c));
    if !stripped.ends_with('?') {
        return false;
    }
    let lower = stripped.to_lowercase();
    !POLITE_CLOSINGS.iter().any(|closing| lower.contains(closing))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_needs_no_input() {
        assert!(!ends_with_question(""));
        assert!(!ends_with_question("   \n\n  "));
    }

    #[test]
    fn trailing_question_needs_input() {
        let text = "I read the project brief.\n\nShould I use SQLite or Postgres?";
        assert!(ends_with_question(text));
    }

    #[test]
    fn markdown_wrapped_question_needs_input() {
        assert!(ends_with_question("**Which language should I use?**"));
    }

    #[test]
    fn statement_needs_no_input() {
        assert!(!ends_with_question(
            "Created three task files. Moving on to assignment."
        ));
    }

    #[test]
    fn question_in_earlier_paragraph_is_ignored() {
        let text = "Should I split this task?\n\nI decided to keep it whole and finished it.";
        assert!(!ends_with_question(text));
    }

    #[test]
    fn polite_closing_needs_no_input() {
        assert!(!ends_with_question(
            "All done.\n\nLet me know if you have any questions?"
        ));
    }

    #[test]
    fn heuristic_implements_trait() {
        assert!(QuestionHeuristic.needs_input("What is the deadline?"));
    }
}
