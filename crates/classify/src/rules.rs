//! Offline keyword and geometry rules, for runs without a model server.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::classifier::Classifier;
use crate::error::ClassifierError;
use crate::schema::{ClassificationRequest, ClassifierResponse};

/// Scores at or below this are reported as unclassified.
const MIN_RULE_CONFIDENCE: f64 = 0.5;
const UNMATCHED_CONFIDENCE: f64 = 0.3;

struct Rule {
    category: &'static str,
    kind: &'static str,
    confidence: f64,
    keywords: Vec<Regex>,
    area_range: Option<(f64, f64)>,
    vertex_range: Option<(usize, usize)>,
}

impl Rule {
    fn new(
        category: &'static str,
        kind: &'static str,
        confidence: f64,
        keywords: &[&str],
        area_range: Option<(f64, f64)>,
    ) -> Self {
        let keywords = keywords
            .iter()
            .map(|k| Regex::new(&format!("(?i){}", k)).expect("built-in rule pattern"))
            .collect();
        Self {
            category,
            kind,
            confidence,
            keywords,
            area_range,
            vertex_range: None,
        }
    }

    fn with_vertices(mut self, min: usize, max: usize) -> Self {
        self.vertex_range = Some((min, max));
        self
    }

    /// 1.0 when any keyword hits the full name or one of its `$` parts.
    fn keyword_score(&self, name: &str) -> f64 {
        let hit = self
            .keywords
            .iter()
            .any(|re| re.is_match(name) || name.split('$').any(|part| re.is_match(part)));
        if hit { 1.0 } else { 0.0 }
    }

    fn geometry_score(&self, request: &ClassificationRequest) -> f64 {
        let mut score = 1.0;

        if let Some((min, max)) = self.area_range {
            let area = request.area;
            if area > 0.0 && !(min..=max).contains(&area) {
                score *= if area < min * 0.5 || area > max * 2.0 {
                    0.3
                } else {
                    0.7
                };
            }
        }

        if let Some((min, max)) = self.vertex_range {
            if !(min..=max).contains(&request.vertex_count) {
                score *= 0.5;
            }
        }

        score
    }
}

// Areas are mm² (drawing units); 1 m² = 1_000_000.
static DEFAULT_RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        Rule::new(
            "circulation",
            "exit",
            0.95,
            &["FSD", "FIRE.?SAFETY", "소방", "방화", "비상"],
            Some((1.0, 1e8)),
        ),
        Rule::new("circulation", "stairs", 0.98, &["계단", "STAIR", "층계", "STA_"], Some((5.0, 1e8))),
        Rule::new(
            "parking",
            "disabled",
            0.95,
            &["장애", "DISABLED?", "HANDICAP", "배리어프리", "BARRIER.?FREE", "ACCESSIBLE"],
            Some((15e6, 20e6)),
        ),
        Rule::new(
            "parking",
            "electric",
            0.95,
            &["전기차", "ELECTRIC.?CAR", "충전", "CHARGE", "환경친화", "PARK.?EC", "EC.?PARK"],
            Some((10e6, 15e6)),
        ),
        Rule::new(
            "parking",
            "women",
            0.95,
            &["여성", "WOMEN", "WOMAN", "FEMALE", "가족", "배려", "교통약자"],
            Some((10e6, 15e6)),
        ),
        Rule::new("parking", "compact", 0.95, &["경차", "COMPACT", "소형"], Some((7e6, 10e6))),
        Rule::new("parking", "large", 0.90, &["확장", "LARGE", "EXTENDED", "대형", "SUV"], Some((13e6, 18e6))),
        Rule::new(
            "parking",
            "basic",
            0.90,
            &["일반", "주차", "PARK", "STANDARD", "NORMAL", "CAR.?SPACE"],
            Some((10e6, 15e6)),
        ),
        Rule::new(
            "structure",
            "column",
            0.95,
            &["기둥", "COLUMN", "PILLAR", "^C\\d+$", "^C-", "\\d+x\\d+"],
            Some((1e5, 1e9)),
        )
        .with_vertices(4, 100),
        // the two-digit ranges below read as m², so mm² drawings score them down
        Rule::new("structure", "wall", 0.95, &["벽", "WALL", "PARTITION", "칸막이"], Some((0.1, 100.0))),
        Rule::new("structure", "beam", 0.90, &["BEAM", "GIRDER", "^B-"], Some((0.5, 10.0))),
        Rule::new(
            "circulation",
            "entrance",
            0.95,
            &["출입구", "ENTRANCE", "ENTRY", "GATE", "입구", "자동문", "AUTO.?DOOR"],
            Some((1e4, 5e7)),
        ),
        Rule::new("circulation", "exit", 0.95, &["출구", "EXIT", "EGRESS", "EMERGENCY"], Some((1e4, 5e7))),
        Rule::new("circulation", "ramp", 0.95, &["경사로", "RAMP", "SLOPE", "램프"], Some((10.0, 100.0))),
        Rule::new(
            "circulation",
            "stairs",
            0.95,
            &["계단", "STAIRS?", "STEP", "STAIRWAY", "STAIRCASE"],
            Some((5.0, 30.0)),
        ),
        Rule::new(
            "circulation",
            "elevator",
            0.95,
            &["엘리베이터", "ELEVATOR", "LIFT", "승강기"],
            Some((3.0, 10.0)),
        ),
        Rule::new(
            "facility",
            "restroom",
            0.95,
            &["화장실", "RESTROOM", "TOILET", "^WC", "변기", "세면대", "LAVATORY"],
            Some((1e3, 5e7)),
        ),
        Rule::new("facility", "storage", 0.90, &["창고", "STORAGE", "LOCKER", "수납", "신발장"], Some((1e5, 2e7))),
        Rule::new("facility", "mechanical", 0.90, &["기계실", "MECHANICAL", "설비실", "M/R"], Some((1e6, 5e7))),
        Rule::new("facility", "electrical", 0.90, &["전기실", "ELECTRICAL", "E/R", "배전"], Some((1e6, 5e7))),
        Rule::new("facility", "recreation", 0.85, &["골프", "GOLF", "GYM", "FITNESS", "휴게"], Some((5e6, 1e8))),
        Rule::new("facility", "room", 0.70, &["ROOM", "^B-?\\d{3}$"], Some((1e5, 1e8))),
    ]
});

/// Keyword and geometry rule table over block names.
///
/// Every rule is scored as `confidence * keyword * geometry`; the best score
/// above 0.5 wins, earlier rules winning ties.
pub struct RuleClassifier {
    rules: &'static [Rule],
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleClassifier {
    pub fn new() -> Self {
        Self {
            rules: DEFAULT_RULES.as_slice(),
        }
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn evaluate(&self, request: &ClassificationRequest) -> ClassifierResponse {
        let name = request.block_identifier.as_str();
        let mut best: Option<(&Rule, f64, f64)> = None;

        for rule in self.rules {
            let keyword = rule.keyword_score(name);
            if keyword == 0.0 {
                continue;
            }
            let geometry = rule.geometry_score(request);
            let score = rule.confidence * keyword * geometry;
            if best.is_none_or(|(_, best_score, _)| score > best_score) {
                best = Some((rule, score, geometry));
            }
        }

        match best {
            Some((rule, score, geometry)) if score > MIN_RULE_CONFIDENCE => {
                let reasoning = if geometry < 1.0 {
                    format!("keyword match, geometry check {:.0}%", geometry * 100.0)
                } else {
                    "keyword match".to_string()
                };
                build(rule.category, rule.kind, score, reasoning)
            }
            _ => build(
                extract::FALLBACK_CATEGORY,
                extract::FALLBACK_TYPE,
                UNMATCHED_CONFIDENCE,
                "no rule matched".to_string(),
            ),
        }
    }
}

fn build(category: &str, kind: &str, confidence: f64, reasoning: String) -> ClassifierResponse {
    // rule confidences are products of values in [0, 1]
    ClassifierResponse::new(category, kind, confidence.clamp(0.0, 1.0), reasoning)
        .expect("rule table yields valid responses")
}

#[async_trait]
impl Classifier for RuleClassifier {
    fn name(&self) -> &str {
        "rules"
    }

    async fn classify(
        &self,
        request: &ClassificationRequest,
    ) -> Result<ClassifierResponse, ClassifierError> {
        Ok(self.evaluate(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use extract::GeometryKind;

    fn request(name: &str, area: f64, vertex_count: usize) -> ClassificationRequest {
        ClassificationRequest {
            block_identifier: name.to_string(),
            geometry_kind: GeometryKind::ClosedPolyline,
            area,
            vertex_count,
            neighboring_identifiers: Vec::new(),
        }
    }

    #[test]
    fn test_basic_parking() {
        let r = RuleClassifier::new().evaluate(&request("PARK_일반", 12_500_000.0, 4));
        assert_eq!(r.category(), "parking");
        assert_eq!(r.kind(), "basic");
        assert!((r.confidence() - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_nested_name_parts() {
        let r = RuleClassifier::new().evaluate(&request("지하1층평면도$0$C12", 250_000.0, 4));
        assert_eq!(r.category(), "structure");
        assert_eq!(r.kind(), "column");
    }

    #[test]
    fn test_more_specific_rule_wins() {
        let r = RuleClassifier::new().evaluate(&request("장애인주차", 17_000_000.0, 4));
        assert_eq!(r.kind(), "disabled");
    }

    #[test]
    fn test_area_far_off_drops_below_threshold() {
        let r = RuleClassifier::new().evaluate(&request("PARK_일반", 1_000.0, 4));
        assert_eq!(r.category(), "other");
        assert_eq!(r.kind(), "unclassified");
    }

    #[test]
    fn test_unknown_name() {
        let r = RuleClassifier::new().evaluate(&request("XYZ", 5_000.0, 4));
        assert_eq!(r.category(), "other");
        assert_eq!(r.confidence(), 0.3);
    }

    #[test]
    fn test_step_falls_through_to_second_stairs_rule() {
        let r = RuleClassifier::new().evaluate(&request("STEP_UP", 20.0, 4));
        assert_eq!(r.kind(), "stairs");
        assert!((r.confidence() - 0.95).abs() < 1e-9);

        // far outside 5..30 scores 0.95 * 0.3
        let r = RuleClassifier::new().evaluate(&request("STEP_UP", 1_000_000.0, 4));
        assert_eq!(r.category(), "other");
    }

    #[test]
    fn test_stair_keeps_first_rule() {
        let r = RuleClassifier::new().evaluate(&request("B1F계단", 20.0, 4));
        assert_eq!(r.kind(), "stairs");
        assert!((r.confidence() - 0.98).abs() < 1e-9);
    }

    #[test]
    fn test_wall_area_range() {
        let r = RuleClassifier::new().evaluate(&request("WALL_A", 50.0, 4));
        assert_eq!(r.kind(), "wall");

        // slightly outside 0.1..100 scores 0.95 * 0.7
        let r = RuleClassifier::new().evaluate(&request("WALL_A", 150.0, 4));
        assert_eq!(r.kind(), "wall");
        assert!((r.confidence() - 0.665).abs() < 1e-9);
    }

    #[test]
    fn test_vertex_range_penalty() {
        let r = RuleClassifier::new().evaluate(&request("COLUMN", 250_000.0, 200));
        // 0.95 * 0.5 is not enough
        assert_eq!(r.category(), "other");
    }
}
