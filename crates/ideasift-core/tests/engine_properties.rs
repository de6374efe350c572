//! Integration tests for end-to-end engine behavior.
//!
//! Each test drives the public API against a real store and checks one
//! property that must hold regardless of data.

use chrono::{Duration, Utc};
use ideasift_core::experiment::ExperimentEvent;
use ideasift_core::preference::build_vector;
use ideasift_core::stats::Sample;
use ideasift_core::strategy::{mmr_select, ContentBasedStrategy};
use ideasift_core::{
    ActionType, BehaviorEvent, BehaviorMetadata, DataStore, EngineConfig, ExperimentAction,
    ExperimentAnalysis,
    ExperimentStatus, InMemoryStore, Item, NewExperiment, RecommendationService,
    RecommendationStrategy, ScoredCandidate, SqliteStore, StatisticalEngine, StrategyContext,
    StrategyKind, UserPreferenceVector, Variant,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

fn service(store: Arc<dyn DataStore>) -> RecommendationService {
    let config = EngineConfig::builder()
        .in_memory()
        .refresh_on_track(false)
        .build();
    RecommendationService::new(config, store).unwrap()
}

async fn like(store: &dyn DataStore, user: &str, item: &str) {
    store
        .append_behavior(&BehaviorEvent::new(user, item, ActionType::Like))
        .await
        .unwrap();
}

/// Preference weights are a distribution whenever there is behavior.
#[test]
fn test_preference_weights_are_normalized() {
    let now = Utc::now();
    let actions = [
        ActionType::View,
        ActionType::Like,
        ActionType::Bookmark,
        ActionType::GenerateArtifact,
        ActionType::Share,
        ActionType::Copy,
        ActionType::Click,
    ];
    let categories = ["tools", "art", "finance"];
    let communities = ["SideProject", "startups"];

    let events: Vec<BehaviorEvent> = (0..40)
        .map(|i| {
            BehaviorEvent::new("u1", format!("i{i}"), actions[i % actions.len()]).with_metadata(
                BehaviorMetadata {
                    category: Some(categories[i % categories.len()].to_string()),
                    community: Some(communities[i % communities.len()].to_string()),
                    complexity: Some((i % 10) as f64 / 10.0),
                    source: None,
                },
            )
        })
        .collect();

    let vector = build_vector("u1", &events, now).unwrap();
    let category_sum: f64 = vector.category_weights.values().sum();
    let community_sum: f64 = vector.community_weights.values().sum();
    assert!((category_sum - 1.0).abs() < 1e-9);
    assert!((community_sum - 1.0).abs() < 1e-9);
    assert!(vector.category_weights.values().all(|w| *w >= 0.0));
    assert!((0.0..=1.0).contains(&vector.complexity_preference));
    assert!(build_vector("u1", &[], now).is_none());
}

/// Assignments survive split changes, on the SQLite backend.
#[tokio::test]
async fn test_assignment_is_sticky() {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn DataStore> = Arc::new(SqliteStore::new(dir.path().join("sift.db")).unwrap());
    let svc = service(store);

    let exp = svc
        .create_experiment(NewExperiment::new(
            "sticky",
            StrategyKind::Hybrid,
            StrategyKind::Diversity,
        ))
        .await
        .unwrap();
    svc.transition_experiment(&exp.id, ExperimentStatus::Active)
        .await
        .unwrap();

    let mut first: HashMap<String, Variant> = HashMap::new();
    for i in 0..30 {
        let user = format!("user-{i}");
        let variant = svc.assign_variant(&user, &exp.id).await;
        first.insert(user, variant);
    }

    for split in [0.01, 0.99] {
        svc.update_traffic_split(&exp.id, split).await.unwrap();
        for (user, variant) in &first {
            assert_eq!(svc.assign_variant(user, &exp.id).await, *variant);
        }
    }
}

/// No strategy ever serves an item the user already touched.
#[tokio::test]
async fn test_no_self_recommendation() {
    let store: Arc<dyn DataStore> = Arc::new(InMemoryStore::new());
    let catalog = [
        ("a", "tools", "SideProject"),
        ("b", "tools", "startups"),
        ("c", "art", "SideProject"),
        ("d", "finance", "startups"),
        ("e", "art", "Entrepreneur"),
        ("f", "health", "Entrepreneur"),
    ];
    for (id, category, community) in catalog {
        store
            .upsert_item(
                &Item::new(id, id)
                    .with_category(category)
                    .with_community(community)
                    .with_content_length(1500),
            )
            .await
            .unwrap();
    }
    let svc = service(store.clone());

    for item in ["a", "b"] {
        svc.track_behavior("me", item, ActionType::Like, None, None)
            .await
            .unwrap();
    }
    svc.track_behavior("me", "c", ActionType::View, None, None)
        .await
        .unwrap();
    for (user, items) in [("u2", vec!["a", "b", "d"]), ("u3", vec!["a", "e", "f"])] {
        for item in items {
            like(store.as_ref(), user, item).await;
        }
    }

    let seen = store.interacted_item_ids("me").await.unwrap();
    for kind in StrategyKind::SELECTABLE {
        let recs = svc.get_recommendations("me", 10, Some(kind), None).await;
        for rec in &recs {
            assert!(
                !seen.contains(&rec.item.id),
                "{kind} recommended seen item {}",
                rec.item.id
            );
        }
        let unique: HashSet<&str> = recs.iter().map(|r| r.item_id()).collect();
        assert_eq!(unique.len(), recs.len(), "{kind} returned duplicates");
    }
}

/// With no behavior, asking for collaborative yields the trending list.
#[tokio::test]
async fn test_fallback_for_new_user() {
    let store: Arc<dyn DataStore> = Arc::new(InMemoryStore::new());
    for id in ["a", "b", "c"] {
        store.upsert_item(&Item::new(id, id)).await.unwrap();
    }
    like(store.as_ref(), "fan1", "a").await;
    like(store.as_ref(), "fan2", "a").await;
    like(store.as_ref(), "fan2", "b").await;
    let svc = service(store);

    let ids = |recs: Vec<ScoredCandidate>| -> Vec<String> {
        recs.into_iter().map(|r| r.item.id).collect()
    };
    let collaborative = ids(svc
        .get_recommendations("newcomer", 5, Some(StrategyKind::Collaborative), None)
        .await);
    let trending = ids(svc
        .get_recommendations("newcomer", 5, Some(StrategyKind::Trending), None)
        .await);
    let generic = ids(svc.get_recommendations("newcomer", 5, None, None).await);

    assert_eq!(collaborative, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(collaborative, trending);
    assert_eq!(collaborative, generic);
}

/// Content-based candidates must clear 0.30 strictly.
#[tokio::test]
async fn test_content_threshold_boundary() {
    let store: Arc<dyn DataStore> = Arc::new(InMemoryStore::new());
    for (id, category) in [("above", "c76"), ("below", "c74"), ("at", "c75")] {
        store
            .upsert_item(&Item::new(id, id).with_category(category))
            .await
            .unwrap();
    }
    let profile = UserPreferenceVector {
        user_id: "u1".into(),
        category_weights: [("c76", 0.76), ("c74", 0.74), ("c75", 0.75)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        community_weights: HashMap::new(),
        complexity_preference: 0.5,
        novelty_preference: 0.0,
        interaction_count: 3,
        last_updated: Utc::now(),
    };

    let strategy = ContentBasedStrategy::new(store, 0.3, 200);
    let ctx = StrategyContext::new("u1", 10).with_profile(Some(profile));
    let recs = strategy.recommend(&ctx).await.unwrap();
    let ids: Vec<&str> = recs.iter().map(|r| r.item_id()).collect();
    assert_eq!(ids, vec!["above"]);
}

/// lambda = 1 keeps relevance order; lambda = 0 chases distance.
#[test]
fn test_mmr_degenerate_weights() {
    let now = Utc::now();
    let pool = vec![
        ScoredCandidate::new(
            Item::new("a", "a").with_category("tools").created_at(now),
            0.9,
            StrategyKind::Hybrid,
            "r",
        ),
        ScoredCandidate::new(
            Item::new("b", "b").with_category("tools").created_at(now),
            0.8,
            StrategyKind::Hybrid,
            "r",
        ),
        ScoredCandidate::new(
            Item::new("c", "c")
                .with_category("art")
                .created_at(now - Duration::days(60)),
            0.1,
            StrategyKind::Hybrid,
            "r",
        ),
    ];

    let relevance: Vec<String> = mmr_select(pool.clone(), 3, 1.0)
        .into_iter()
        .map(|c| c.item.id)
        .collect();
    assert_eq!(relevance, vec!["a", "b", "c"]);

    let diverse: Vec<String> = mmr_select(pool, 2, 0.0)
        .into_iter()
        .map(|c| c.item.id)
        .collect();
    // First pick ties on distance and keeps the earliest; the second is the
    // farthest from it.
    assert_eq!(diverse, vec!["a", "c"]);
}

/// Swapping control and treatment flips the sign and nothing else.
#[test]
fn test_significance_symmetry() {
    let engine = StatisticalEngine::default();
    let now = Utc::now();
    for (ma, na, mb, nb) in [(0.1, 1000, 0.14, 1000), (0.3, 50, 0.2, 80), (0.05, 10, 0.05, 10)] {
        let ab = engine
            .welch_test("x", "ctr", Sample::new(ma, na), Sample::new(mb, nb), 0.05, now)
            .unwrap();
        let ba = engine
            .welch_test("x", "ctr", Sample::new(mb, nb), Sample::new(ma, na), 0.05, now)
            .unwrap();
        assert!((ab.t_statistic + ba.t_statistic).abs() < 1e-12);
        assert_eq!(ab.p_value, ba.p_value);
        assert_eq!(ab.is_significant, ba.is_significant);
    }
}

/// Log 1000 impressions per variant with the given click counts and analyze
/// the experiment under the default confidence level.
async fn analyze_ctr_experiment(
    control_clicks: usize,
    treatment_clicks: usize,
) -> (Arc<dyn DataStore>, String, ExperimentAnalysis) {
    let store: Arc<dyn DataStore> = Arc::new(InMemoryStore::new());
    let svc = service(store.clone());
    let exp = svc
        .create_experiment(
            NewExperiment::new("ctr", StrategyKind::Hybrid, StrategyKind::Diversity)
                .with_min_sample_size(1000),
        )
        .await
        .unwrap();
    svc.transition_experiment(&exp.id, ExperimentStatus::Active)
        .await
        .unwrap();

    for (variant, clicks) in [(Variant::A, control_clicks), (Variant::B, treatment_clicks)] {
        for i in 0..1000 {
            let user = format!("{variant}-{i}");
            svc.log_experiment_event(ExperimentEvent::new(
                exp.id.clone(),
                user.clone(),
                variant,
                ExperimentAction::Impression,
                "i1",
            ))
            .await
            .unwrap();
            if i < clicks {
                svc.log_experiment_event(ExperimentEvent::new(
                    exp.id.clone(),
                    user,
                    variant,
                    ExperimentAction::Click,
                    "i1",
                ))
                .await
                .unwrap();
            }
        }
    }

    let analysis = svc.analyze_experiment(&exp.id).await.unwrap();
    (store, exp.id, analysis)
}

/// CTR 10% vs 14% over 1000 impressions each, through the experiment log.
#[tokio::test]
async fn test_ctr_experiment_end_to_end() {
    let (store, exp_id, analysis) = analyze_ctr_experiment(100, 140).await;
    let ctr = &analysis.statistical_tests[0];
    assert_eq!(ctr.metric_name, "ctr");
    assert!((ctr.control_mean - 0.10).abs() < 1e-12);
    assert!((ctr.treatment_mean - 0.14).abs() < 1e-12);
    assert!(ctr.t_statistic > 2.58 && ctr.t_statistic < 3.0);
    assert_eq!(ctr.p_value, 0.01);
    assert!(ctr.is_significant);
    assert_eq!(analysis.winner, Some(Variant::B));
    assert!(analysis.sample_size_reached);
    assert_eq!(store.test_results(&exp_id).await.unwrap().len(), 2);
}

/// CTR 10% vs 13% sits in the p = 0.05 band, which is not below alpha at
/// the default 0.95 confidence level.
#[tokio::test]
async fn test_ctr_at_alpha_is_not_significant() {
    let (_, _, analysis) = analyze_ctr_experiment(100, 130).await;
    let ctr = &analysis.statistical_tests[0];
    assert!(ctr.t_statistic > 1.96 && ctr.t_statistic < 2.58);
    assert_eq!(ctr.p_value, 0.05);
    assert!(!ctr.is_significant);
    assert_eq!(analysis.winner, None);
    assert_eq!(analysis.confidence, 0.0);
    assert!(!analysis.recommendation.contains("wins"));
}
