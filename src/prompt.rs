//! Grounded prompt construction.

/// Build the prompt sent to the generator.
///
/// The retrieved chunks are concatenated in ranked order inside a
/// `<context>` block. The instructions restrict the model to that context
/// and to `language`, and ask for the answer alone.
pub fn compose_prompt(context: &[&str], question: &str, language: &str) -> String {
    format!(
        "Based only on the provided context, answer the question directly and concisely. \
         Answer in {language} only. Do not add extra information, restate the question, \
         or generate additional questions. Start your response immediately with the answer.\n\
         <context>\n{context}\n</context>\n\
         Question: {question}\n\
         Answer:",
        language = language,
        context = context.join("\n\n"),
        question = question.trim(),
    )
}
