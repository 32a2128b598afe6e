//! Prompt templates for the self-dialogue and the mutation request.

/// Self-critique question prompt.
pub const QUESTION_PROMPT: &str =
    "Ask yourself one deep technical question about your own React architecture. Output just the question.";

/// Upper bound on answer length requested from the model.
pub const ANSWER_WORD_LIMIT: usize = 80;

pub fn answer_prompt(question: &str) -> String {
    format!(
        "Answer your own question: \"{question}\". Be actionable and technical. Under {ANSWER_WORD_LIMIT} words."
    )
}

pub fn decision_prompt(question: &str, answer: &str) -> String {
    format!(
        "You asked: \"{question}\". Based on: \"{answer}\", should you mutate your code now to implement these improvements? Reply YES or NO."
    )
}

/// Affirmative only when the reply contains `YES` in any casing.
pub fn is_affirmative(reply: &str) -> bool {
    reply.to_uppercase().contains("YES")
}

const MUTATION_RULES: &str = "Rules:
1. Apply best practices from knowledge base references above
2. Improve this React/JS/TS file for performance, logic, and aesthetic resilience
3. Return ONLY the new code. No markdown blocks.
4. Code must be syntactically perfect.
5. Maintain core functionality but optimize everything.";

/// Build the rewrite request for one file.
///
/// The references section is omitted when `context` is empty.
pub fn mutation_prompt(path: &str, original: &str, context: &str) -> String {
    let mut prompt = format!(
        "You are a self-improving AI with access to a knowledge base of best practices from major repositories.\n\n\
         Target File: {path}\n\n\
         ORIGINAL CODE:\n{original}\n\n"
    );
    if !context.is_empty() {
        prompt.push_str("KNOWLEDGE BASE REFERENCES:\n");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }
    prompt.push_str(MUTATION_RULES);
    prompt
}

/// Knowledge query for a file: its path followed by the first 500 characters.
pub fn retrieval_query(path: &str, content: &str) -> String {
    let head: String = content.chars().take(500).collect();
    format!("{path} {head}")
}

pub fn commit_message(cycle: u64, path: &str) -> String {
    format!("Mutation Cycle {}: Optimized {path} with knowledge base", cycle + 1)
}
