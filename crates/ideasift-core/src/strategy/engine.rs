//! Strategy dispatch.

use std::sync::Arc;
use tracing::debug;

use super::{
    CollaborativeStrategy, ContentBasedStrategy, DiversityStrategy, HybridStrategy,
    PersonalizedTrendingStrategy, RecentStrategy, RecommendationStrategy, SerendipityStrategy,
    StrategyContext, TrendingStrategy,
};
use crate::config::StrategyConfig;
use crate::similarity::SimilarityFinder;
use crate::traits::DataStore;
use crate::types::{StrategyKind, StrategyOutcome};

/// Owns one instance of every strategy and runs them by kind.
pub struct StrategyEngine {
    collaborative: Arc<CollaborativeStrategy>,
    content: Arc<ContentBasedStrategy>,
    hybrid: Arc<HybridStrategy>,
    trending: Arc<TrendingStrategy>,
    personalized: PersonalizedTrendingStrategy,
    diversity: DiversityStrategy,
    serendipity: SerendipityStrategy,
    recent: RecentStrategy,
}

impl StrategyEngine {
    /// Wire every strategy against `store` with the given tuning.
    pub fn new(store: Arc<dyn DataStore>, config: &StrategyConfig) -> Self {
        let finder = SimilarityFinder::new(
            store.clone(),
            config.similarity_threshold,
            config.similar_user_limit,
        );
        let collaborative = Arc::new(CollaborativeStrategy::new(store.clone(), finder));
        let content = Arc::new(ContentBasedStrategy::new(
            store.clone(),
            config.content_threshold,
            config.candidate_pool_size,
        ));
        let hybrid = Arc::new(HybridStrategy::new(
            collaborative.clone(),
            content.clone(),
            config.hybrid_oversample,
        ));
        let trending = Arc::new(TrendingStrategy::new(
            store.clone(),
            config.trending_window_days,
        ));

        Self {
            personalized: PersonalizedTrendingStrategy::new(
                trending.clone(),
                config.candidate_pool_size,
            ),
            diversity: DiversityStrategy::new(hybrid.clone(), config.diversity_oversample),
            serendipity: SerendipityStrategy::new(
                store.clone(),
                config.candidate_pool_size,
                config.serendipity_threshold,
                config.quality_threshold,
            ),
            recent: RecentStrategy::new(store),
            collaborative,
            content,
            hybrid,
            trending,
        }
    }

    /// The strategy implementing `kind`.
    pub fn strategy(&self, kind: StrategyKind) -> &dyn RecommendationStrategy {
        match kind {
            StrategyKind::Collaborative => self.collaborative.as_ref(),
            StrategyKind::ContentBased => self.content.as_ref(),
            StrategyKind::Hybrid => self.hybrid.as_ref(),
            StrategyKind::Trending => self.trending.as_ref(),
            StrategyKind::PersonalizedTrending => &self.personalized,
            StrategyKind::Diversity => &self.diversity,
            StrategyKind::Serendipity => &self.serendipity,
            StrategyKind::Recent => &self.recent,
        }
    }

    /// Run one strategy.
    pub async fn run(&self, kind: StrategyKind, ctx: &StrategyContext) -> StrategyOutcome {
        let outcome = self.strategy(kind).recommend(ctx).await;
        match &outcome {
            Ok(candidates) => debug!(
                strategy = %kind,
                user_id = %ctx.user_id,
                count = candidates.len(),
                "strategy produced candidates"
            ),
            Err(reason) => debug!(
                strategy = %kind,
                user_id = %ctx.user_id,
                %reason,
                "strategy produced nothing"
            ),
        }
        outcome
    }
}
