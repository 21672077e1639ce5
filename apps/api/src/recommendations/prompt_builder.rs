//! Deterministic prompt construction.
//!
//! `build_prompts` is a pure function of the CV text, the request and the
//! compiled-in templates: no clock, no randomness, no map iteration order.
//! Identical inputs always yield byte-identical prompts.

use crate::collaborators::CvDocument;
use crate::llm_client::prompts::{GROUNDING_INSTRUCTION, JSON_ONLY_SYSTEM};
use crate::llm_client::{Prompt, PromptPair};
use crate::models::recommendation::{RecommendationRequest, RequestedDepth};
use crate::recommendations::prompts::{
    DEEP_DEPTH_GUIDANCE, RECOMMENDATION_PROMPT_TEMPLATE, RECOMMENDATION_SYSTEM,
    SIMPLIFIED_PROMPT_TEMPLATE, STANDARD_DEPTH_GUIDANCE,
};

/// Max CV characters sent to the secondary provider.
const SIMPLIFIED_CV_CHARS: usize = 6_000;
const SIMPLIFIED_COUNT: usize = 3;
const SIMPLIFIED_OUTPUT_TOKENS: u32 = 1_000;

const UNSPECIFIED: &str = "not specified";

fn output_tokens(depth: RequestedDepth) -> u32 {
    match depth {
        RequestedDepth::Standard => 1_500,
        RequestedDepth::Deep => 3_000,
    }
}

pub fn build_prompts(cv: &CvDocument, request: &RecommendationRequest) -> PromptPair {
    let depth = request.requested_depth();
    let system = format!("{RECOMMENDATION_SYSTEM} {JSON_ONLY_SYSTEM}");
    let target_role = request.target_role().unwrap_or(UNSPECIFIED);

    let depth_guidance = match depth {
        RequestedDepth::Standard => STANDARD_DEPTH_GUIDANCE,
        RequestedDepth::Deep => DEEP_DEPTH_GUIDANCE,
    };

    let count = depth.target_count().to_string();
    let full_user = render(
        RECOMMENDATION_PROMPT_TEMPLATE,
        &[
            ("grounding_instruction", GROUNDING_INSTRUCTION),
            ("target_role", target_role),
            (
                "target_industry",
                request.target_industry().unwrap_or(UNSPECIFIED),
            ),
            (
                "career_level",
                request.career_level().map(|l| l.as_str()).unwrap_or(UNSPECIFIED),
            ),
            ("depth_guidance", depth_guidance),
            ("count", count.as_str()),
            ("cv_text", cv.content.trim()),
        ],
    );

    let simplified_count = SIMPLIFIED_COUNT.min(depth.target_count()).to_string();
    let simplified_user = render(
        SIMPLIFIED_PROMPT_TEMPLATE,
        &[
            ("target_role", target_role),
            ("count", simplified_count.as_str()),
            (
                "cv_text",
                truncate_chars(cv.content.trim(), SIMPLIFIED_CV_CHARS),
            ),
        ],
    );

    PromptPair {
        full: Prompt {
            system: system.clone(),
            user: full_user,
            max_output_tokens: output_tokens(depth),
        },
        simplified: Prompt {
            system,
            user: simplified_user,
            max_output_tokens: SIMPLIFIED_OUTPUT_TOKENS,
        },
    }
}

/// Fills `{name}` placeholders in one pass over the template. Substituted
/// values are never rescanned; unknown `{...}` sequences are copied as-is.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}
