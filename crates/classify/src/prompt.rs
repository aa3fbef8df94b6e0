use crate::schema::ClassificationRequest;

/// System message for chat-style hosted models.
pub const SYSTEM_PROMPT: &str = "You are an expert at classifying blocks in architectural CAD drawings. \
You answer with a single JSON object and nothing else.";

/// Neighbour names beyond this are left out of the prompt.
const MAX_PROMPT_NEIGHBORS: usize = 5;

pub fn build_classification_prompt(request: &ClassificationRequest) -> String {
    let neighbors = if request.neighboring_identifiers.is_empty() {
        "N/A".to_string()
    } else {
        request
            .neighboring_identifiers
            .iter()
            .take(MAX_PROMPT_NEIGHBORS)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };

    format!(
        r#"You classify blocks from architectural CAD drawings (parking garages and building floor plans).
Block names are often Korean or abbreviated, and nested names use "$" as a separator
(e.g. "B1F$0$PARK_일반"). Areas are in drawing units, usually mm².

BLOCK:
- name: {name}
- geometry: {kind}
- area: {area:.2}
- vertices: {vertices}
- nearby blocks: {neighbors}

CATEGORIES AND TYPES:
- parking: basic, disabled, electric, women, compact, large
- structure: column, wall, beam
- circulation: entrance, exit, ramp, stairs, elevator
- facility: restroom, storage, mechanical, electrical, recreation, room
- other: unclassified

RULES:
- Pick exactly one category and one type from the list above
- confidence is a number between 0 and 1
- reasoning is one short sentence
- Output ONLY the JSON object, no markdown, no explanations

SCHEMA:
{{"category": "parking", "type": "basic", "confidence": 0.9, "reasoning": "brief reason"}}

JSON OUTPUT:"#,
        name = request.block_identifier,
        kind = request.geometry_kind.as_str(),
        area = request.area,
        vertices = request.vertex_count,
        neighbors = neighbors,
    )
}

pub fn build_retry_prompt(invalid_json: &str) -> String {
    format!(
        r#"The following JSON is invalid or incomplete:

{}

Fix it so it has exactly the fields "category", "type", "confidence" (number between 0 and 1) and "reasoning". Output only valid JSON with no markdown formatting, no code blocks, no explanations. Just the raw JSON object."#,
        invalid_json
    )
}
