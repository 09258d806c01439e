// src/utils/sanitize.rs

use crate::models::test::Question;

/// Strips unsafe markup from author-supplied text.
///
/// Whitelist based: formatting tags survive, `<script>` (with its body),
/// `<iframe>` and event-handler attributes are removed.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Sanitizes every free-text field of a question in place.
/// Image URLs are validated separately and left untouched.
pub fn sanitize_question(question: &mut Question) {
    question.text = clean_html(&question.text);
    for option in &mut question.options {
        option.text = clean_html(&option.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test::AnswerOption;

    #[test]
    fn test_script_removed() {
        assert_eq!(clean_html("<b>2+2</b><script>alert(1)</script>"), "<b>2+2</b>");
    }

    #[test]
    fn test_sanitize_question_cleans_options() {
        let mut q = Question {
            text: "<p onclick=\"x()\">Pick</p>".to_string(),
            image: None,
            options: vec![AnswerOption {
                text: "<img src=x onerror=alert(1)>four".to_string(),
                image: None,
                is_correct: true,
            }],
            marks: None,
        };
        sanitize_question(&mut q);

        assert_eq!(q.text, "<p>Pick</p>");
        assert!(!q.options[0].text.contains("onerror"));
        assert!(q.options[0].text.ends_with("four"));
        assert!(q.options[0].is_correct);
    }
}
