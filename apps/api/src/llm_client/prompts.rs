// Cross-cutting prompt fragments shared by every provider call.
// Feature prompts live next to the feature (see recommendations::prompts).

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON value. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Keeps advice anchored to what the CV actually says.
pub const GROUNDING_INSTRUCTION: &str = "\
    CRITICAL: Every recommendation must be justified by something present in, or \
    clearly missing from, the CV below. Do NOT invent employers, dates, degrees or \
    metrics. Example rewrites must only rephrase facts the CV already states.";
