use docrag_core::types::RetrievalResult;

/// Returned by `query` when there is nothing to search.
pub const EMPTY_CORPUS_RESPONSE: &str = "Agent is empty. Please load documents or configure connection.";

/// Prefix of answers that report a backend failure instead of an answer.
pub const ERROR_PREFIX: &str = "Error:";

/// Retrieved chunk texts, most relevant first, separated by blank lines.
pub fn format_context(result: &RetrievalResult) -> String {
    result.chunks().map(|c| c.text.trim()).collect::<Vec<_>>().join("\n\n")
}

/// Instructs the generator to answer from the supplied context only.
pub fn build_prompt(context: &str, question: &str) -> String {
    format!("Answer the question based only on the following context:\n{context}\n\nQuestion: {question}\n")
}

pub fn error_answer(err: &impl std::fmt::Display) -> String {
    format!("{ERROR_PREFIX} {err}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrag_core::types::{Chunk, Meta, SearchHit, SourceKind};

    fn hit(text: &str) -> SearchHit {
        SearchHit {
            chunk: Chunk { id: text.into(), text: text.into(), metadata: Meta::new() },
            score: 1.0,
            source: SourceKind::Vector,
        }
    }

    #[test]
    fn prompt_carries_context_and_question() {
        let context = format_context(&RetrievalResult::new(vec![hit(" first \n"), hit("second")]));
        assert_eq!(context, "first\n\nsecond");
        let prompt = build_prompt(&context, "What is first?");
        assert!(prompt.starts_with("Answer the question based only on the following context:\nfirst"));
        assert!(prompt.ends_with("Question: What is first?\n"));
    }

    #[test]
    fn error_answers_are_prefixed() {
        assert_eq!(error_answer(&"timeout"), "Error: timeout");
    }
}
