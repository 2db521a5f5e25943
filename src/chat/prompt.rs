use crate::semantic::RelevanceResult;

use super::Turn;

/// System instruction with the retrieved portfolio context appended.
pub fn system_prompt(owner: &str, context: &[RelevanceResult]) -> String {
    let mut prompt = format!(
        "You are a friendly assistant on {owner}'s portfolio website. \
         Answer questions about {owner}'s background, skills, experience, education, \
         projects, certificates and contact details, using only the portfolio context below. \
         If a question is unrelated to {owner}'s portfolio, politely explain that you can \
         only help with portfolio topics. If the context does not contain the answer, \
         say so instead of guessing. Keep answers concise."
    );

    prompt.push_str("\n\nPortfolio context:\n");
    if context.is_empty() {
        prompt.push_str("(no relevant portfolio content was found)\n");
    }
    for result in context {
        let section = result.chunk.section.name().to_uppercase();
        prompt.push_str(&format!("[{section}] {}\n", result.chunk.content));
    }

    prompt
}

/// Conversation sent to the generator: the last `max_history` non-blank
/// history turns in order, followed by the current query.
pub fn conversation(history: &[Turn], query: &str, max_history: usize) -> Vec<Turn> {
    let usable: Vec<&Turn> = history
        .iter()
        .filter(|turn| !turn.text.trim().is_empty())
        .collect();
    let skip = usable.len().saturating_sub(max_history);

    usable
        .into_iter()
        .skip(skip)
        .cloned()
        .chain(std::iter::once(Turn::user(query.trim())))
        .collect()
}
