//! Centralized prompt definitions
//!
//! Every instruction sent to the language model lives here, along with the
//! small builders that splice request data into them.

/// Instruction lines for the insights commentary, followed by `Data:` and
/// the JSON projection of the aggregate.
pub const SUMMARY_PROMPT_LINES: [&str; 4] = [
    "You are an analyst summarizing workshop registration responses.",
    "Craft a short, upbeat commentary (2-3 sentences) highlighting notable trends, recurring themes, or surprises.",
    "Avoid repeating raw numbers; interpret them instead.",
    "Data:",
];

/// System prompt used when no form data could be loaded for the chat.
pub const CHAT_DATA_UNAVAILABLE_PROMPT: &str = r#"You are a helpful assistant. The workshop registration form data is currently unavailable due to a temporary issue.
Politely inform the user that the data cannot be accessed right now and suggest they refresh the page to try again."#;

const CHAT_ANALYST_INTRO: &str = r#"You are a helpful assistant analyzing workshop registration form responses.
You have access to all the form submissions and can answer questions about the data.

Here is the form data:"#;

const CHAT_ANALYST_GUIDELINES: &str = r#"When answering questions:
- Be concise and informative
- Reference specific responses when relevant
- Identify trends or patterns in the data
- If asked about something not in the data, politely say you don't have that information
- Format your responses clearly with bullet points or numbers when appropriate"#;

/// System prompt for the networking analyst.
pub const CONNECTION_SYSTEM_PROMPT: &str = r#"You are a professional networking analyst. Your task is to analyze LinkedIn profiles and identify:
1. Common connections and mutual contacts
2. Shared interests, skills, or professional backgrounds
3. Potential collaboration opportunities
4. Conversation starters and networking recommendations
5. Common groups, companies, or educational institutions

Be specific, actionable, and focus on creating meaningful professional connections."#;

const CONNECTION_INSTRUCTIONS: &str = r#"Please provide:
1. A list of commonalities (shared connections, interests, background, skills, education, location, etc.)
2. Specific recommendations for how they can connect meaningfully
3. Suggested conversation starters based on their profiles

Format your response as JSON with these keys:
{
  "commonalities": ["list", "of", "common", "points"],
  "recommendations": "detailed recommendations paragraph",
  "conversationStarters": ["starter 1", "starter 2", "starter 3"]
}"#;

/// Build the commentary prompt around a JSON data payload.
pub fn summary_prompt(data_json: &str) -> String {
    let mut lines: Vec<&str> = SUMMARY_PROMPT_LINES.to_vec();
    lines.push(data_json);
    lines.join("\n")
}

/// Build the chat system prompt from `Q:`/`A:` context blocks.
///
/// An empty context selects [`CHAT_DATA_UNAVAILABLE_PROMPT`].
pub fn chat_system_prompt(context: &str) -> String {
    if context.trim().is_empty() {
        return CHAT_DATA_UNAVAILABLE_PROMPT.to_string();
    }
    format!(
        "{}\n{}\n\n{}",
        CHAT_ANALYST_INTRO, context, CHAT_ANALYST_GUIDELINES
    )
}

/// Build the connection analysis prompt from two formatted profiles.
pub fn connection_prompt(person1: &str, person2: &str) -> String {
    format!(
        "Analyze these two LinkedIn profiles and provide a detailed connection analysis:\n\n\
         ===== PERSON 1 =====\n{}\n\n\
         ===== PERSON 2 =====\n{}\n\n{}",
        person1, person2, CONNECTION_INSTRUCTIONS
    )
}
