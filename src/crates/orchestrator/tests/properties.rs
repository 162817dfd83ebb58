//! Property checks over the public engine surface.

use orchestrator::state::ConfidenceThresholds;
use orchestrator::testing::healthy_capabilities;
use orchestrator::{Engine, Grade, OrchestratorConfig, Request};
use proptest::prelude::*;

proptest! {
    #[test]
    fn grade_matches_the_threshold_table(score in 0.0f64..=1.0) {
        let thresholds = ConfidenceThresholds::default();
        let expected = if score >= 0.90 {
            Grade::A
        } else if score >= 0.75 {
            Grade::B
        } else if score >= 0.60 {
            Grade::C
        } else if score >= 0.45 {
            Grade::D
        } else {
            Grade::F
        };
        prop_assert_eq!(Grade::from_score(score, &thresholds), expected);
    }
}

proptest! {
    // Whole-engine runs are comparatively slow; a handful of cases is
    // enough to catch panics and range violations on odd inputs.
    #![proptest_config(ProptestConfig::with_cases(12))]
    #[test]
    fn any_query_terminates_with_bounded_confidence(query in "\\PC{0,64}") {
        let rt = tokio::runtime::Runtime::new().expect("runtime");
        let response = rt.block_on(async {
            let engine = Engine::new(healthy_capabilities(), OrchestratorConfig::default())
                .expect("graph must build");
            engine.orchestrate(Request::new(query, "s", "u")).await
        });
        prop_assert!((0.0..=1.0).contains(&response.confidence));
        prop_assert!(!response.reply.is_empty());
    }
}
