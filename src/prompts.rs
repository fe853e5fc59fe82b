//! Structured-output prompts for speech analysis
//!
//! The primary prompt describes the exact JSON shape the result parser
//! validates. The strict variant is only used for the single retry after the
//! model answered with something that did not parse.

/// Schema and scoring rules shared by both prompt variants.
pub const ANALYSIS_PROMPT: &str = r#"You are an assistant that transcribes an audio clip and rates the speaker with objective numeric scores.
Output MUST be valid JSON and nothing else. Follow this JSON schema exactly:
{
  "transcript": "<string>",
  "scores": {
    "overall": <integer 0-100>,
    "fluency": <integer 0-100>,
    "confidence": <integer 0-100>,
    "filler": <integer 0-100>,
    "filler_rate_per_min": <number >= 0>,
    "tone": "<neutral|positive|negative|anxious|angry|happy>",
    "keyword_coverage_pct": <number 0-100 or null>
  },
  "counts": {
    "total_words": <integer>,
    "total_fillers": <integer>,
    "long_pauses": <integer>
  },
  "suggestions": ["<short suggestion strings>"]
}
REQUIREMENTS:
- "fluency" and "confidence" MUST be integers between 0 and 100. Do not return null.
- "filler_rate_per_min" MUST be a number (decimals allowed) estimating filler words per minute. Do not return null.
- Count filler words as occurrences of: "um", "uh", "like" (when used as a filler), "you know", "I mean". Do NOT count words used with clear semantic meaning.
- "total_fillers" is the integer count of detected filler occurrences in the transcript.
- "long_pauses" is the number of silences longer than about two seconds.
- If you cannot determine a metric, estimate conservatively rather than returning null.
- Provide integers for 0-100 scores; use one decimal place for filler_rate_per_min.
"#;

/// Prefix that turns the primary prompt into the strict retry prompt.
pub const STRICT_PREFIX: &str = "ONLY OUTPUT A SINGLE JSON OBJECT following the schema below. \
Respond with JSON only, no prose, no markdown, no code fences. Do not add ANY explanatory text.\n\n";

/// Primary prompt, with keyword coverage instructions.
pub fn analysis_prompt(keywords: &[String]) -> String {
    let mut prompt = String::from(ANALYSIS_PROMPT);
    prompt.push_str(&keyword_instructions(keywords));
    prompt
}

/// Stricter variant used for the single retry.
pub fn strict_analysis_prompt(keywords: &[String]) -> String {
    format!("{}{}", STRICT_PREFIX, analysis_prompt(keywords))
}

fn keyword_instructions(keywords: &[String]) -> String {
    if keywords.is_empty() {
        return "- No keywords were supplied: \"keyword_coverage_pct\" MUST be null.\n".to_string();
    }

    let quoted: Vec<String> = keywords.iter().map(|k| format!("\"{}\"", k)).collect();
    format!(
        "- Keywords to check for coverage: {}\n\
         - \"keyword_coverage_pct\" is the percentage of these keywords spoken at least once.\n",
        quoted.join(", ")
    )
}
