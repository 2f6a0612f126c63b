//! Heuristic explanation synthesis.
//!
//! This is an approximate stand-in for real attribution methods (SHAP/LIME
//! style feature importance is imitated with randomized heuristics, not
//! computed genuinely). It sits behind the [`ExplanationMethod`] trait so a
//! grounded attribution method could be substituted without touching the
//! orchestrator, and all randomness flows through the injectable
//! [`RandomSource`] seam so tests can be deterministic.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;
use regex::Regex;

use crate::error::{PrecomputeError, Result};
use crate::types::{
    Alternative, ConceptEdge, ConceptGraph, ConceptNode, Explanation, ExplanationTab, Feature,
};

/// Maximum features kept per explanation, in scan order.
const MAX_FEATURES: usize = 8;
/// Maximum nodes in the concept graph, in first-match order.
const MAX_CONCEPT_NODES: usize = 6;
/// Maximum suggested follow-up prompts.
const MAX_SUGGESTED_PROMPTS: usize = 4;
/// Occurrence counts are capped here before normalizing to [0, 1].
const MAX_KEYWORD_OCCURRENCES: usize = 10;

const TACTICAL_TERMS: &[&str] = &[
    "intercept", "threat", "radar", "missile", "patrol", "engage", "escort", "formation",
    "scramble",
];

const TEMPORAL_TERMS: &[&str] = &[
    "now", "current", "immediate", "window", "eta", "minutes", "hours", "duration",
];

const GEOGRAPHIC_TERMS: &[&str] = &[
    "north", "south", "east", "west", "sector", "border", "airspace", "altitude", "corridor",
];

/// Concept categories matched against the combined query+answer text.
const CONCEPT_PATTERNS: &[(&str, &str)] = &[
    ("aircraft", r"\b(aircraft|jet|fighter|bomber|drone|uav|bandit|bogey)\b"),
    ("threat", r"\b(threat|hostile|missile|sam|enemy|incursion)\b"),
    ("intercept", r"\b(intercept\w*|scramble|engage\w*|escort|vector)\b"),
    ("sensor", r"\b(radar|sensor|track\w*|detection|iff|signature)\b"),
    ("kinematics", r"\b(speed|altitude|heading|velocity|mach|climb|range)\b"),
    ("geography", r"\b(sector|zone|border|airspace|corridor|coast\w*)\b"),
    ("time", r"\b(time|minute\w*|hour\w*|eta|window|duration)\b"),
    ("decision", r"\b(decision|option\w*|recommend\w*|priority|order\w*|authoriz\w*)\b"),
];

/// Source of uniform randomness in [0, 1).
pub trait RandomSource: Send + Sync {
    fn next_f64(&self) -> f64;
}

/// Process randomness via `rand::thread_rng`.
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_f64(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Deterministic source cycling through a fixed value sequence. Test fixture.
pub struct SequenceRandom {
    values: Vec<f64>,
    index: AtomicUsize,
}

impl SequenceRandom {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            index: AtomicUsize::new(0),
        }
    }
}

impl RandomSource for SequenceRandom {
    fn next_f64(&self) -> f64 {
        if self.values.is_empty() {
            return 0.5;
        }
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        self.values[i % self.values.len()]
    }
}

/// Trait for explanation derivation methods.
pub trait ExplanationMethod: Send + Sync {
    /// Derive an explanation from a query/answer pair.
    fn synthesize(&self, query: &str, answer: &str) -> Result<Explanation>;

    /// Get a description of this method for logging
    fn description(&self) -> String;
}

/// The randomized keyword/regex stand-in method.
pub struct HeuristicSynthesizer {
    random: Box<dyn RandomSource>,
    concept_patterns: Vec<(&'static str, Regex)>,
}

impl HeuristicSynthesizer {
    pub fn new(random: Box<dyn RandomSource>) -> Self {
        let concept_patterns = CONCEPT_PATTERNS
            .iter()
            .map(|(name, pattern)| (*name, Regex::new(pattern).unwrap()))
            .collect();

        Self {
            random,
            concept_patterns,
        }
    }

    /// Route the query to its primary tab based on phrasing.
    fn select_tab(query: &str) -> ExplanationTab {
        let q = query.to_lowercase();
        if q.contains("why") || q.contains("how") || q.contains("because") {
            ExplanationTab::Reasoning
        } else if q.contains("what if") || q.contains("predict") || q.contains("future") {
            ExplanationTab::Projection
        } else {
            ExplanationTab::Insight
        }
    }

    /// Extract up to [`MAX_FEATURES`] keyword features from the combined text.
    fn extract_features(&self, combined: &str) -> Vec<Feature> {
        let half = combined.len() / 2;
        let mut features = Vec::new();

        let sets = [TACTICAL_TERMS, TEMPORAL_TERMS, GEOGRAPHIC_TERMS];
        for set in sets {
            for keyword in set {
                if features.len() >= MAX_FEATURES {
                    return features;
                }
                let Some(first_pos) = combined.find(keyword) else {
                    continue;
                };

                let count = combined.matches(keyword).count();
                let frequency = count.min(MAX_KEYWORD_OCCURRENCES) as f64
                    / MAX_KEYWORD_OCCURRENCES as f64;
                let boost = if first_pos < half { 1.2 } else { 1.0 };
                let weight = frequency * boost;

                // Uniform perturbation in [-0.4, 0.4]. Intentional simulation
                // of an attribution score, not a measurement.
                let base_random = self.random.next_f64() * 0.8 - 0.4;
                let importance = (base_random * weight).clamp(-1.0, 1.0);

                features.push(Feature {
                    name: (*keyword).to_string(),
                    importance,
                });
            }
        }

        features
    }

    /// Build the concept graph: deduped category nodes in first-match order,
    /// chained linearly, with one feedback edge when more than 3 nodes exist.
    fn build_concept_graph(&self, combined: &str) -> ConceptGraph {
        let mut matched: Vec<(usize, &str)> = self
            .concept_patterns
            .iter()
            .filter_map(|(name, regex)| regex.find(combined).map(|m| (m.start(), *name)))
            .collect();
        matched.sort_by_key(|(pos, _)| *pos);
        matched.truncate(MAX_CONCEPT_NODES);

        let nodes: Vec<ConceptNode> = matched
            .iter()
            .map(|(_, name)| ConceptNode {
                id: (*name).to_string(),
                label: capitalize(name),
            })
            .collect();

        let mut edges: Vec<ConceptEdge> = nodes
            .windows(2)
            .map(|pair| ConceptEdge {
                from: pair[0].id.clone(),
                to: pair[1].id.clone(),
            })
            .collect();

        if nodes.len() > 3 {
            edges.push(ConceptEdge {
                from: nodes[0].id.clone(),
                to: nodes[nodes.len() - 1].id.clone(),
            });
        }

        ConceptGraph { nodes, edges }
    }

    /// Three fixed scenario templates, content-independent beyond the domain.
    fn alternatives() -> Vec<Alternative> {
        vec![
            Alternative {
                title: "Optimal response".to_string(),
                details: "All assets respond within nominal timelines; the situation \
                          resolves with full coverage maintained."
                    .to_string(),
            },
            Alternative {
                title: "Delayed response".to_string(),
                details: "Reaction is slowed by tasking or weather; the engagement \
                          window narrows and fallback options come into play."
                    .to_string(),
            },
            Alternative {
                title: "Resource-constrained response".to_string(),
                details: "Fewer assets are available than requested; priorities are \
                          re-ordered and secondary sectors accept reduced coverage."
                    .to_string(),
            },
        ]
    }

    /// `min(95, 20 + length term (cap 50) + importance term (cap 30))`.
    fn confidence(answer_len: usize, features: &[Feature]) -> f64 {
        let length_term = (answer_len as f64 / 500.0 * 50.0).min(50.0);
        let importance_sum: f64 = features.iter().map(|f| f.importance.abs()).sum();
        let importance_term = (importance_sum * 100.0).min(30.0);
        (20.0 + length_term + importance_term).min(95.0)
    }

    fn suggested_prompts(tab: ExplanationTab, graph: &ConceptGraph) -> Vec<String> {
        let mut prompts = vec![match tab {
            ExplanationTab::Insight => "What else should I watch in this picture?".to_string(),
            ExplanationTab::Reasoning => "Why is this the recommended course of action?".to_string(),
            ExplanationTab::Projection => "What happens if the situation holds for an hour?".to_string(),
        }];

        for node in &graph.nodes {
            if prompts.len() >= MAX_SUGGESTED_PROMPTS {
                break;
            }
            prompts.push(format!("How does {} influence the assessment?", node.label));
        }

        prompts
    }

    fn tab_text(query: &str, feature_count: usize) -> (String, String, String) {
        let insight = format!(
            "Key factors behind the answer to \"{}\", ranked by estimated influence ({} signals considered).",
            query, feature_count
        );
        let reasoning = "The answer follows from the detected tactical signals: matched terms are \
                         weighted by frequency and position, then combined into the assessment."
            .to_string();
        let projection = "If current conditions persist, the dominant factors above are expected \
                          to drive the outcome; the alternative scenarios bound the spread."
            .to_string();
        (insight, reasoning, projection)
    }
}

impl ExplanationMethod for HeuristicSynthesizer {
    fn synthesize(&self, query: &str, answer: &str) -> Result<Explanation> {
        if query.trim().is_empty() {
            return Err(PrecomputeError::Synthesis("empty query".to_string()));
        }

        let combined = format!("{} {}", query, answer).to_lowercase();

        let primary_tab = Self::select_tab(query);
        let features = self.extract_features(&combined);
        let concept_graph = self.build_concept_graph(&combined);
        let confidence = Self::confidence(answer.len(), &features);
        let suggested_prompts = Self::suggested_prompts(primary_tab, &concept_graph);
        let (insight, reasoning, projection) = Self::tab_text(query, features.len());

        Ok(Explanation {
            primary_tab,
            insight,
            reasoning,
            projection,
            features,
            concept_graph,
            alternatives: Self::alternatives(),
            confidence,
            suggested_prompts,
        })
    }

    fn description(&self) -> String {
        "heuristic keyword/regex synthesizer (randomized stand-in)".to_string()
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(value: f64) -> HeuristicSynthesizer {
        // next_f64() -> value; importance base becomes value * 0.8 - 0.4
        HeuristicSynthesizer::new(Box::new(SequenceRandom::new(vec![value])))
    }

    #[test]
    fn test_tab_routing() {
        assert_eq!(
            HeuristicSynthesizer::select_tab("Why did the intercept fail?"),
            ExplanationTab::Reasoning
        );
        assert_eq!(
            HeuristicSynthesizer::select_tab("What if the bandit turns south?"),
            ExplanationTab::Projection
        );
        assert_eq!(
            HeuristicSynthesizer::select_tab("Give me the current picture"),
            ExplanationTab::Insight
        );
    }

    #[test]
    fn test_empty_query_is_synthesis_error() {
        let s = fixed(0.5);
        let err = s.synthesize("   ", "answer").unwrap_err();
        assert!(matches!(err, PrecomputeError::Synthesis(_)));
    }

    #[test]
    fn test_feature_extraction_caps_at_eight() {
        let s = fixed(0.5);
        // Mentions far more than 8 keywords across all three sets.
        let text = "intercept threat radar missile patrol engage escort formation \
                    scramble now current window north south east west sector";
        let explanation = s.synthesize(text, text).unwrap();
        assert_eq!(explanation.features.len(), 8);
    }

    #[test]
    fn test_importance_is_deterministic_with_sequence_random() {
        // next_f64 = 1.0 => base_random = 0.4 (upper bound of the interval)
        let s = fixed(1.0);
        // One occurrence of "radar" in each of query and answer => count 2,
        // frequency 0.2, first occurrence in first half => x1.2 weight.
        let explanation = s.synthesize("radar status?", "radar is green").unwrap();

        let radar = explanation
            .features
            .iter()
            .find(|f| f.name == "radar")
            .unwrap();
        let expected = 0.4 * (2.0 / 10.0) * 1.2;
        assert!((radar.importance - expected).abs() < 1e-9);
    }

    #[test]
    fn test_importance_within_bounds() {
        for value in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let s = fixed(value);
            let text = "intercept threat radar now sector border";
            let explanation = s.synthesize(text, text).unwrap();
            for feature in &explanation.features {
                assert!(feature.importance >= -1.0 && feature.importance <= 1.0);
            }
        }
    }

    #[test]
    fn test_concept_graph_chain_and_feedback_edge() {
        let s = fixed(0.5);
        let explanation = s
            .synthesize(
                "intercept the hostile aircraft",
                "radar track shows speed mach 1.2 near the border sector",
            )
            .unwrap();

        let graph = &explanation.concept_graph;
        assert!(graph.nodes.len() > 3);
        assert!(graph.nodes.len() <= 6);

        // Linear chain plus one feedback edge.
        assert_eq!(graph.edges.len(), graph.nodes.len());
        let feedback = graph.edges.last().unwrap();
        assert_eq!(feedback.from, graph.nodes[0].id);
        assert_eq!(feedback.to, graph.nodes.last().unwrap().id);
    }

    #[test]
    fn test_concept_graph_small_has_no_feedback_edge() {
        let s = fixed(0.5);
        let explanation = s.synthesize("status of the jet", "steady").unwrap();
        let graph = &explanation.concept_graph;
        assert!(graph.nodes.len() <= 3);
        if graph.nodes.is_empty() {
            assert!(graph.edges.is_empty());
        } else {
            assert_eq!(graph.edges.len(), graph.nodes.len() - 1);
        }
    }

    #[test]
    fn test_concept_nodes_are_deduped_in_first_match_order() {
        let s = fixed(0.5);
        // "radar" (sensor) appears before "intercept"; both repeat.
        let explanation = s
            .synthesize("radar radar", "intercept now, intercept with radar support")
            .unwrap();
        let ids: Vec<&str> = explanation
            .concept_graph
            .nodes
            .iter()
            .map(|n| n.id.as_str())
            .collect();

        let mut deduped = ids.clone();
        deduped.dedup();
        assert_eq!(ids, deduped);
        assert!(ids.iter().position(|&i| i == "sensor") < ids.iter().position(|&i| i == "intercept"));
    }

    #[test]
    fn test_confidence_formula() {
        // No features, short answer: floor of 20 plus the length term.
        assert_eq!(HeuristicSynthesizer::confidence(0, &[]), 20.0);
        assert_eq!(HeuristicSynthesizer::confidence(250, &[]), 45.0);
        // Length term caps at 50.
        assert_eq!(HeuristicSynthesizer::confidence(10_000, &[]), 70.0);

        // Importance term caps at 30, total at 95.
        let heavy = vec![
            Feature {
                name: "a".into(),
                importance: 0.9,
            },
            Feature {
                name: "b".into(),
                importance: -0.9,
            },
        ];
        assert_eq!(HeuristicSynthesizer::confidence(10_000, &heavy), 95.0);
    }

    #[test]
    fn test_alternatives_are_three_fixed_templates() {
        let s = fixed(0.5);
        let explanation = s.synthesize("anything", "anything").unwrap();
        let titles: Vec<&str> = explanation
            .alternatives
            .iter()
            .map(|a| a.title.as_str())
            .collect();
        assert_eq!(
            titles,
            vec![
                "Optimal response",
                "Delayed response",
                "Resource-constrained response"
            ]
        );
    }

    #[test]
    fn test_suggested_prompts_capped_at_four() {
        let s = fixed(0.5);
        let explanation = s
            .synthesize(
                "intercept the hostile aircraft",
                "radar track shows speed mach 1.2 near the border sector at this time",
            )
            .unwrap();
        assert!(!explanation.suggested_prompts.is_empty());
        assert!(explanation.suggested_prompts.len() <= 4);
    }

    #[test]
    fn test_sequence_random_cycles() {
        let r = SequenceRandom::new(vec![0.1, 0.9]);
        assert_eq!(r.next_f64(), 0.1);
        assert_eq!(r.next_f64(), 0.9);
        assert_eq!(r.next_f64(), 0.1);
    }
}
