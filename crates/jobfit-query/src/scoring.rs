//! Recommendation scoring: per-candidate raw signals, min/max ranges over the
//! candidate set, then a weighted composite of the normalized subscores.

use jobfit_core::{CandidatePosting, Coordinates, PostingId, PostingSummary, UserPreference};
use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_KM: f64 = 6371.0;

pub const DISTANCE_WEIGHT: f64 = 0.4;
pub const STACK_WEIGHT: f64 = 0.5;
pub const KEYWORD_WEIGHT: f64 = 0.3;
pub const SALARY_WEIGHT: f64 = 0.1;
pub const AVG_SALARY_WEIGHT: f64 = 0.05;

/// How a candidate's keywords must relate to the viewer's liked keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordMatchMode {
    /// Non-empty, and every keyword is among the liked ones.
    Subset,
    /// At least one keyword is among the liked ones.
    #[default]
    Overlap,
}

impl KeywordMatchMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "subset" => Some(Self::Subset),
            "overlap" => Some(Self::Overlap),
            _ => None,
        }
    }
}

/// Great-circle distance in kilometres.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Signals {
    pub distance_km: Option<f64>,
    pub stack_matches: Option<f64>,
    pub keyword_matches: Option<f64>,
    pub salary: Option<f64>,
    pub avg_salary: Option<f64>,
}

impl Signals {
    pub fn collect(candidate: &CandidatePosting, preference: &UserPreference) -> Self {
        let distance_km = match (preference.location, candidate.location) {
            (Some(user), Some(posting)) => Some(haversine_km(user, posting)),
            _ => None,
        };
        let stack_matches = candidate
            .stack_ids
            .iter()
            .filter(|id| preference.stack_ids.contains(*id))
            .count();
        let keyword_matches = candidate
            .summary
            .keyword_codes
            .iter()
            .filter(|code| preference.keyword_codes.contains(*code))
            .count();

        Self {
            distance_km,
            stack_matches: Some(stack_matches as f64),
            keyword_matches: Some(keyword_matches as f64),
            salary: candidate.summary.salary.map(|s| s as f64),
            avg_salary: candidate.avg_salary.map(|s| s as f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Range {
    min: f64,
    max: f64,
}

impl Range {
    fn over(values: impl Iterator<Item = Option<f64>>) -> Option<Self> {
        values.flatten().fold(None, |acc, v| match acc {
            None => Some(Range { min: v, max: v }),
            Some(r) => Some(Range {
                min: r.min.min(v),
                max: r.max.max(v),
            }),
        })
    }

    /// `(v - min) / (max - min)`; 0 for a null value or a range with `max == min`.
    fn normalize(range: Option<Self>, value: Option<f64>) -> f64 {
        match (range, value) {
            (Some(r), Some(v)) if r.max > r.min => (v - r.min) / (r.max - r.min),
            _ => 0.0,
        }
    }

    /// Closer is better: `1 - normalize`, with the same zero rule.
    fn normalize_inverted(range: Option<Self>, value: Option<f64>) -> f64 {
        match (range, value) {
            (Some(r), Some(v)) if r.max > r.min => 1.0 - (v - r.min) / (r.max - r.min),
            _ => 0.0,
        }
    }
}

/// Per-signal ranges over one candidate set.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalRanges {
    distance: Option<Range>,
    stack: Option<Range>,
    keyword: Option<Range>,
    salary: Option<Range>,
    avg_salary: Option<Range>,
}

impl SignalRanges {
    pub fn over<'a>(signals: impl Iterator<Item = &'a Signals> + Clone) -> Self {
        Self {
            distance: Range::over(signals.clone().map(|s| s.distance_km)),
            stack: Range::over(signals.clone().map(|s| s.stack_matches)),
            keyword: Range::over(signals.clone().map(|s| s.keyword_matches)),
            salary: Range::over(signals.clone().map(|s| s.salary)),
            avg_salary: Range::over(signals.map(|s| s.avg_salary)),
        }
    }

    pub fn subscores(&self, signals: &Signals) -> Subscores {
        Subscores {
            distance: Range::normalize_inverted(self.distance, signals.distance_km),
            stack: Range::normalize(self.stack, signals.stack_matches),
            keyword: Range::normalize(self.keyword, signals.keyword_matches),
            salary: Range::normalize(self.salary, signals.salary),
            avg_salary: Range::normalize(self.avg_salary, signals.avg_salary),
        }
    }
}

/// Normalized components, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Subscores {
    pub distance: f64,
    pub stack: f64,
    pub keyword: f64,
    pub salary: f64,
    pub avg_salary: f64,
}

impl Subscores {
    pub fn composite(&self) -> f64 {
        DISTANCE_WEIGHT * self.distance
            + STACK_WEIGHT * self.stack
            + KEYWORD_WEIGHT * self.keyword
            + SALARY_WEIGHT * self.salary
            + AVG_SALARY_WEIGHT * self.avg_salary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredPosting {
    pub posting: PostingSummary,
    pub score: f64,
    pub subscores: Subscores,
    pub signals: Signals,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub ranked: Vec<ScoredPosting>,
    pub total_candidates: usize,
    pub liked_posting_ids: Vec<PostingId>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine {
    keyword_match: KeywordMatchMode,
}

impl ScoringEngine {
    pub fn new(keyword_match: KeywordMatchMode) -> Self {
        Self { keyword_match }
    }

    pub fn keyword_match(&self) -> KeywordMatchMode {
        self.keyword_match
    }

    pub fn is_candidate(&self, candidate: &CandidatePosting, preference: &UserPreference) -> bool {
        if !candidate
            .stack_ids
            .iter()
            .any(|id| preference.stack_ids.contains(id))
        {
            return false;
        }
        let codes = &candidate.summary.keyword_codes;
        match self.keyword_match {
            KeywordMatchMode::Subset => {
                !codes.is_empty() && codes.iter().all(|c| preference.keyword_codes.contains(c))
            }
            KeywordMatchMode::Overlap => codes.iter().any(|c| preference.keyword_codes.contains(c)),
        }
    }

    /// Filters to the candidate set, scores it and returns the best `limit` postings
    /// with the pre-truncation candidate count. Equal scores keep input order.
    pub fn rank(
        &self,
        preference: &UserPreference,
        candidates: Vec<CandidatePosting>,
        limit: usize,
    ) -> (Vec<ScoredPosting>, usize) {
        let eligible = candidates
            .into_iter()
            .filter(|c| self.is_candidate(c, preference))
            .map(|c| {
                let signals = Signals::collect(&c, preference);
                (c, signals)
            })
            .collect::<Vec<_>>();

        let ranges = SignalRanges::over(eligible.iter().map(|(_, s)| s));
        let mut scored = eligible
            .into_iter()
            .map(|(candidate, signals)| {
                let subscores = ranges.subscores(&signals);
                ScoredPosting {
                    posting: candidate.summary,
                    score: subscores.composite(),
                    subscores,
                    signals,
                }
            })
            .collect::<Vec<_>>();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        let total = scored.len();
        scored.truncate(limit);
        (scored, total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    const PYTHON: i64 = 1;
    const GO: i64 = 2;

    fn user() -> UserPreference {
        UserPreference {
            user_id: 1,
            location: Some(Coordinates {
                latitude: 37.50,
                longitude: 127.03,
            }),
            stack_ids: BTreeSet::from([PYTHON]),
            keyword_codes: BTreeSet::from(["BE".to_string()]),
        }
    }

    fn candidate(id: i64, latitude: f64, stacks: &[i64], keywords: &[&str]) -> CandidatePosting {
        CandidatePosting {
            summary: PostingSummary {
                posting_id: id,
                company_name: Some("Other Co".into()),
                original_img_url: None,
                title: format!("posting {id}"),
                keywords: vec![],
                keyword_codes: keywords.iter().map(|k| k.to_string()).collect(),
                stacks: vec![],
                stack_img_urls: vec![],
                likes_count: 0,
                views: 0,
                salary: Some(5000),
                deadline_dtm: None,
                address_upper: None,
                address_lower: None,
                original_address: None,
            },
            stack_ids: stacks.to_vec(),
            location: Some(Coordinates {
                latitude,
                longitude: 127.03,
            }),
            avg_salary: Some(6000),
        }
    }

    // One degree of latitude is ~111.2 km; 2 km north of the user.
    const TWO_KM_NORTH: f64 = 37.50 + 2.0 / 111.195;

    #[test]
    fn weights_are_fixed() {
        let all = Subscores {
            distance: 1.0,
            stack: 1.0,
            keyword: 1.0,
            salary: 1.0,
            avg_salary: 1.0,
        };
        assert!((all.composite() - 1.35).abs() < 1e-12);
        assert_eq!(
            Subscores {
                stack: 1.0,
                ..Default::default()
            }
            .composite(),
            0.5
        );
    }

    #[test]
    fn haversine_matches_known_distance() {
        let user = user().location.expect("location");
        let d = haversine_km(
            user,
            Coordinates {
                latitude: TWO_KM_NORTH,
                longitude: 127.03,
            },
        );
        assert!((d - 2.0).abs() < 0.01, "{d}");
        assert_eq!(haversine_km(user, user), 0.0);
    }

    #[test]
    fn single_candidate_scores_zero_everywhere() {
        let engine = ScoringEngine::default();
        let (ranked, total) = engine.rank(
            &user(),
            vec![candidate(10, TWO_KM_NORTH, &[PYTHON], &["BE"])],
            10,
        );
        assert_eq!(total, 1);
        assert_eq!(ranked[0].subscores, Subscores::default());
        assert_eq!(ranked[0].score, 0.0);
        assert!((ranked[0].signals.distance_km.expect("distance") - 2.0).abs() < 0.01);
    }

    #[test]
    fn second_candidate_differs_by_the_distance_weight() {
        let engine = ScoringEngine::default();
        let (ranked, total) = engine.rank(
            &user(),
            vec![
                candidate(10, 37.60, &[PYTHON], &["BE"]),
                candidate(11, TWO_KM_NORTH, &[PYTHON], &["BE"]),
            ],
            10,
        );
        assert_eq!(total, 2);
        assert_eq!(ranked[0].posting.posting_id, 11);
        assert_eq!(ranked[0].subscores.distance, 1.0);
        assert_eq!(ranked[1].subscores.distance, 0.0);
        assert_eq!(ranked[0].score - ranked[1].score, DISTANCE_WEIGHT);
    }

    #[test]
    fn constant_signal_contributes_nothing() {
        let engine = ScoringEngine::default();
        let mut a = candidate(1, 37.51, &[PYTHON], &["BE"]);
        let mut b = candidate(2, 37.55, &[PYTHON], &["BE"]);
        a.summary.salary = Some(4000);
        b.summary.salary = Some(8000);
        let (with_avg, _) = engine.rank(&user(), vec![a.clone(), b.clone()], 10);

        a.avg_salary = None;
        b.avg_salary = None;
        let (without_avg, _) = engine.rank(&user(), vec![a, b], 10);

        for (x, y) in with_avg.iter().zip(&without_avg) {
            assert_eq!(x.subscores.avg_salary, 0.0);
            assert_eq!(x.score, y.score);
        }
    }

    #[test]
    fn null_signal_scores_zero_and_others_still_normalize() {
        let engine = ScoringEngine::default();
        let mut a = candidate(1, 37.51, &[PYTHON], &["BE"]);
        let b = candidate(2, 37.51, &[PYTHON], &["BE"]);
        let mut c = candidate(3, 37.51, &[PYTHON], &["BE"]);
        a.summary.salary = None;
        c.summary.salary = Some(9000);
        let (ranked, _) = engine.rank(&user(), vec![a, b, c], 10);

        let by_id = |id| {
            ranked
                .iter()
                .find(|s| s.posting.posting_id == id)
                .expect("ranked")
        };
        assert_eq!(by_id(1).subscores.salary, 0.0);
        assert_eq!(by_id(2).subscores.salary, 0.0);
        assert_eq!(by_id(3).subscores.salary, 1.0);
    }

    #[test]
    fn stack_overlap_is_required_and_keyword_mode_decides_the_rest() {
        let mut preference = user();
        preference.stack_ids.insert(GO);
        let candidates = vec![
            candidate(1, 37.51, &[GO], &["BE"]),
            candidate(2, 37.51, &[3], &["BE"]),
            candidate(3, 37.51, &[PYTHON], &["BE", "FE"]),
            candidate(4, 37.51, &[PYTHON], &[]),
        ];

        let subset = ScoringEngine::new(KeywordMatchMode::Subset);
        let (ranked, total) = subset.rank(&preference, candidates.clone(), 10);
        assert_eq!(total, 1);
        assert_eq!(ranked[0].posting.posting_id, 1);

        let overlap = ScoringEngine::new(KeywordMatchMode::Overlap);
        let (ranked, total) = overlap.rank(&preference, candidates, 10);
        assert_eq!(total, 2);
        assert_eq!(
            ranked.iter().map(|s| s.posting.posting_id).collect::<Vec<_>>(),
            vec![1, 3]
        );
    }

    #[test]
    fn ties_keep_input_order_and_truncation_keeps_the_total() {
        let engine = ScoringEngine::default();
        let candidates = (1..=5)
            .map(|id| candidate(id, 37.51, &[PYTHON], &["BE"]))
            .collect::<Vec<_>>();
        let (ranked, total) = engine.rank(&user(), candidates, 3);
        assert_eq!(total, 5);
        assert_eq!(
            ranked.iter().map(|s| s.posting.posting_id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn raising_a_subscore_raises_the_composite() {
        let base = Subscores {
            distance: 0.2,
            stack: 0.2,
            keyword: 0.2,
            salary: 0.2,
            avg_salary: 0.2,
        };
        let bumps: [fn(&mut Subscores); 5] = [
            |s| s.distance += 0.1,
            |s| s.stack += 0.1,
            |s| s.keyword += 0.1,
            |s| s.salary += 0.1,
            |s| s.avg_salary += 0.1,
        ];
        for bump in bumps {
            let mut raised = base;
            bump(&mut raised);
            assert!(raised.composite() > base.composite());
        }
    }

    #[test]
    fn empty_candidate_set_is_not_an_error() {
        let (ranked, total) = ScoringEngine::default().rank(&user(), vec![], 10);
        assert!(ranked.is_empty());
        assert_eq!(total, 0);
    }

    #[test]
    fn keyword_mode_defaults_to_overlap() {
        assert_eq!(KeywordMatchMode::default(), KeywordMatchMode::Overlap);
        let mut preference = user();
        preference.stack_ids.insert(GO);
        let mixed = vec![candidate(1, 37.51, &[PYTHON], &["BE", "FE"])];
        let (_, total) = ScoringEngine::default().rank(&preference, mixed, 10);
        assert_eq!(total, 1);
    }

    #[test]
    fn keyword_mode_parses() {
        assert_eq!(KeywordMatchMode::parse("Overlap"), Some(KeywordMatchMode::Overlap));
        assert_eq!(KeywordMatchMode::parse("subset"), Some(KeywordMatchMode::Subset));
        assert_eq!(KeywordMatchMode::parse("any"), None);
    }
}
