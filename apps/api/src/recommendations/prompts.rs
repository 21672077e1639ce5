// All LLM prompt constants for CV recommendations.
// Reuses cross-cutting fragments from llm_client::prompts.
//
// Bump PROMPT_VERSION whenever a template or the expected output schema
// changes: it is part of every cache key, so old entries stop matching.

pub const PROMPT_VERSION: &str = "rec-v3";

/// System prompt for the full analysis.
pub const RECOMMENDATION_SYSTEM: &str = "You are an expert career coach and recruiter who \
    reviews CVs and produces concrete, prioritized improvement recommendations.";

/// Full analysis prompt.
/// Replace: {grounding_instruction}, {count}, {target_role}, {target_industry},
///          {career_level}, {depth_guidance}, {cv_text}
pub const RECOMMENDATION_PROMPT_TEMPLATE: &str = r#"{grounding_instruction}

TARGET ROLE: {target_role}
TARGET INDUSTRY: {target_industry}
CAREER LEVEL: {career_level}

{depth_guidance}

Return a JSON ARRAY with exactly {count} recommendations, most impactful first:
[
  {
    "type": "content",
    "title": "Quantify results in your current role",
    "description": "Rewrite the three bullets under your current role to lead with measurable outcomes.",
    "reasoning": "Recruiters skim for evidence of impact; bullets that list duties without results read as junior.",
    "impact": "high",
    "confidence": 0.85,
    "before_example": "Responsible for the billing service",
    "after_example": "Cut billing failures 40% by redesigning retry handling in the billing service"
  }
]

HARD RULES:
1. "type" is one of: "content", "structure", "keyword", "ats", "formatting"
2. "impact" is one of: "low", "medium", "high", "critical"
3. "confidence" is a number between 0 and 1
4. "title" is a short imperative sentence; "reasoning" explains why it matters for the target role
5. "before_example" / "after_example" are optional; omit them rather than inventing facts
6. Do NOT repeat the same advice under different titles

CV:
<<<
{cv_text}
>>>"#;

/// Depth-specific guidance. Standard keeps the review to the essentials.
pub const STANDARD_DEPTH_GUIDANCE: &str = "Focus on the highest-leverage fixes a recruiter \
    would notice in the first 30 seconds.";

pub const DEEP_DEPTH_GUIDANCE: &str = "Perform a thorough review: cover content, structure, \
    keyword alignment with the target role, applicant-tracking-system compatibility and \
    formatting. Include before/after examples wherever the CV provides material for them.";

/// Simplified prompt for the secondary provider: fewer items, no examples.
/// Replace: {count}, {target_role}, {cv_text}
pub const SIMPLIFIED_PROMPT_TEMPLATE: &str = r#"Review this CV for the target role "{target_role}".
Return a JSON ARRAY of exactly {count} objects with keys
"type" (content|structure|keyword|ats|formatting), "title", "description", "reasoning",
"impact" (low|medium|high|critical) and "confidence" (0-1).

CV:
<<<
{cv_text}
>>>"#;
