use crate::rag::store::SearchHit;

/// Streamed as the entire reply when retrieval comes back empty.
pub const NO_ARTICLES_REPLY: &str = "Sorry I couldn't find any relevant articles.";

/// Fixed refusal the model is instructed to use when the context is thin.
pub const DONT_KNOW_REPLY: &str = "I don't know based on the provided articles.";

const SNIPPET_CHARS: usize = 500;

/// Build the grounding prompt: one block per retrieved article plus the
/// instruction block constraining the model to the provided context.
pub fn build_grounding_prompt(articles: &[SearchHit], question: &str) -> String {
    let context = articles
        .iter()
        .map(|hit| {
            format!(
                "Title: {}\nURL: {}\nSnippet: {}...",
                hit.title,
                hit.url,
                snippet(&hit.text)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a knowledgeable assistant specialized in news summaries. \
         Use the context below to answer the user's question accurately.\n\n\
         Context:\n{context}\n\n\
         Instructions:\n\
         - Only use information present in the context.\n\
         - Provide a clear, concise answer in 2-4 sentences.\n\
         - Include the title and URL of any source you reference in your answer.\n\
         - If the answer cannot be found in the context, respond with: \"{DONT_KNOW_REPLY}\"\n\n\
         Question:\n{question}\n\n\
         Answer:"
    )
}

fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}
