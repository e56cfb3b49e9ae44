//! Per-index subscription expansion.
//!
//! Each tracked index starts `UNSEEN`. The first reading observed for
//! it flips the state to `EXPANDED`, committed before any await so a
//! racing reading cannot re-trigger the expansion, and derives the
//! at-the-money strike ladder, resolving an instrument token and
//! subscribing for every (strike, option type) pair. Later readings
//! only refresh the last-known price.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use core_types::config::SubscriptionConfig;
use core_types::transport::Subscriber;
use core_types::types::{atm_strike, index_topic, option_topic, strike_ladder, OptionType};
use log::{debug, error, info, warn};
use token_client::TokenResolver;

#[derive(Debug, Default)]
struct IndexState {
    expanded: bool,
    last_ltp: Option<f64>,
    atm_strike: Option<i64>,
}

pub struct SubscriptionManager {
    cfg: SubscriptionConfig,
    resolver: Arc<dyn TokenResolver>,
    subscriber: Arc<dyn Subscriber>,
    states: HashMap<String, IndexState>,
    active: HashSet<String>,
}

impl SubscriptionManager {
    pub fn new(
        cfg: SubscriptionConfig,
        resolver: Arc<dyn TokenResolver>,
        subscriber: Arc<dyn Subscriber>,
    ) -> Self {
        let states = cfg
            .indices
            .iter()
            .map(|spec| (spec.name.clone(), IndexState::default()))
            .collect();
        Self {
            cfg,
            resolver,
            subscriber,
            states,
            active: HashSet::new(),
        }
    }

    pub fn is_tracked(&self, index: &str) -> bool {
        self.states.contains_key(index)
    }

    pub fn last_price(&self, index: &str) -> Option<f64> {
        self.states.get(index).and_then(|state| state.last_ltp)
    }

    pub fn active_topics(&self) -> &HashSet<String> {
        &self.active
    }

    /// First connect subscribes the index topics; a reconnect re-issues
    /// every active subscription (the broker forgot them).
    pub async fn on_connected(&mut self) {
        if self.active.is_empty() {
            self.subscribe_indices().await;
        } else {
            self.resubscribe_active().await;
        }
    }

    pub async fn subscribe_indices(&mut self) {
        let topics: Vec<String> = self
            .cfg
            .indices
            .iter()
            .map(|spec| index_topic(&self.cfg.index_prefix, &spec.name))
            .collect();
        for topic in topics {
            info!("subscribing to index topic {}", topic);
            match self.subscriber.subscribe(&topic).await {
                Ok(()) => {
                    self.active.insert(topic);
                }
                Err(err) => error!("failed to subscribe to {}: {}", topic, err),
            }
        }
    }

    async fn resubscribe_active(&self) {
        info!("re-subscribing {} active topics", self.active.len());
        let topics: Vec<String> = self.active.iter().cloned().collect();
        for topic in topics {
            if let Err(err) = self.subscriber.subscribe(&topic).await {
                error!("failed to re-subscribe to {}: {}", topic, err);
            }
        }
    }

    /// Handle one reading for a tracked index. Expansion fires on
    /// exactly the first reading; a failed ladder slot is skipped, the
    /// rest of the ladder proceeds.
    pub async fn on_index_reading(&mut self, index: &str, ltp: f64) {
        let Some(spec) = self.cfg.index(index).cloned() else {
            return;
        };
        let atm = {
            let Some(state) = self.states.get_mut(index) else {
                return;
            };
            state.last_ltp = Some(ltp);
            if state.expanded {
                return;
            }
            // Latch synchronously, ahead of every await below.
            state.expanded = true;
            let atm = atm_strike(ltp, spec.strike_step);
            state.atm_strike = Some(atm);
            atm
        };
        info!(
            "first reading for {} at {}; expanding ladder around ATM {}",
            index, ltp, atm
        );
        for strike in strike_ladder(atm, spec.strike_step, self.cfg.strike_range) {
            for option_type in OptionType::BOTH {
                match self
                    .resolver
                    .resolve(index, &spec.expiry_date, option_type, strike)
                    .await
                {
                    Ok(token) => {
                        self.subscribe_option(index, &token, option_type, strike)
                            .await
                    }
                    Err(err) => warn!(
                        "token resolution failed for {} {} {}: {}",
                        index, option_type, strike, err
                    ),
                }
            }
        }
    }

    async fn subscribe_option(
        &mut self,
        index: &str,
        token: &str,
        option_type: OptionType,
        strike: i64,
    ) {
        let topic = option_topic(&self.cfg.index_prefix, token);
        if self.active.contains(&topic) {
            debug!("already subscribed to {}, skipping", topic);
            return;
        }
        match self.subscriber.subscribe(&topic).await {
            Ok(()) => {
                info!(
                    "subscribed to {} ({} {} {} @ {})",
                    topic, index, spec_label(option_type), strike, token
                );
                self.active.insert(topic);
            }
            Err(err) => error!("failed to subscribe to {}: {}", topic, err),
        }
    }
}

fn spec_label(option_type: OptionType) -> &'static str {
    match option_type {
        OptionType::Ce => "CE",
        OptionType::Pe => "PE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use core_types::transport::TransportError;
    use core_types::types::IndexSpec;
    use std::sync::Mutex;
    use token_client::TokenError;

    struct StubResolver {
        fail: Option<(i64, OptionType)>,
        fixed_token: Option<String>,
    }

    impl StubResolver {
        fn ok() -> Self {
            Self {
                fail: None,
                fixed_token: None,
            }
        }

        fn failing(strike: i64, option_type: OptionType) -> Self {
            Self {
                fail: Some((strike, option_type)),
                fixed_token: None,
            }
        }

        fn fixed(token: &str) -> Self {
            Self {
                fail: None,
                fixed_token: Some(token.to_string()),
            }
        }
    }

    #[async_trait]
    impl TokenResolver for StubResolver {
        async fn resolve(
            &self,
            index: &str,
            _expiry_date: &str,
            option_type: OptionType,
            strike: i64,
        ) -> Result<String, TokenError> {
            if self.fail == Some((strike, option_type)) {
                return Err(TokenError::MissingToken {
                    index: index.to_string(),
                    option_type,
                    strike,
                });
            }
            Ok(self
                .fixed_token
                .clone()
                .unwrap_or_else(|| format!("{}-{}-{}", index, strike, option_type)))
        }
    }

    #[derive(Default)]
    struct RecordingSubscriber {
        topics: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Subscriber for RecordingSubscriber {
        async fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
            self.topics.lock().unwrap().push(topic.to_string());
            Ok(())
        }
    }

    fn cfg() -> SubscriptionConfig {
        SubscriptionConfig {
            index_prefix: "index".to_string(),
            token_api_url: "https://api.trado.trade/token".to_string(),
            strike_range: 1,
            indices: vec![
                IndexSpec {
                    name: "NIFTY".to_string(),
                    strike_step: 50,
                    expiry_date: "22-05-2025".to_string(),
                },
                IndexSpec {
                    name: "BANKNIFTY".to_string(),
                    strike_step: 100,
                    expiry_date: "22-05-2025".to_string(),
                },
            ],
        }
    }

    fn manager(
        resolver: StubResolver,
        subscriber: Arc<RecordingSubscriber>,
    ) -> SubscriptionManager {
        SubscriptionManager::new(cfg(), Arc::new(resolver), subscriber)
    }

    #[tokio::test]
    async fn first_reading_expands_the_full_ladder() {
        let subscriber = Arc::new(RecordingSubscriber::default());
        let mut manager = manager(StubResolver::ok(), subscriber.clone());

        manager.on_index_reading("NIFTY", 24987.0).await;

        let topics = subscriber.topics.lock().unwrap().clone();
        assert_eq!(topics.len(), 6);
        let unique: HashSet<&String> = topics.iter().collect();
        assert_eq!(unique.len(), 6);
        for strike in [24950, 25000, 25050] {
            for side in ["ce", "pe"] {
                let expected = format!("index/NSE_FO|NIFTY-{}-{}", strike, side);
                assert!(topics.contains(&expected), "missing {expected}");
            }
        }
    }

    #[tokio::test]
    async fn failed_ladder_slot_is_skipped_not_fatal() {
        let subscriber = Arc::new(RecordingSubscriber::default());
        let mut manager = manager(
            StubResolver::failing(25050, OptionType::Pe),
            subscriber.clone(),
        );

        manager.on_index_reading("NIFTY", 24987.0).await;

        let topics = subscriber.topics.lock().unwrap().clone();
        assert_eq!(topics.len(), 5);
        assert!(!topics.contains(&"index/NSE_FO|NIFTY-25050-pe".to_string()));
    }

    #[tokio::test]
    async fn expansion_fires_exactly_once() {
        let subscriber = Arc::new(RecordingSubscriber::default());
        let mut manager = manager(StubResolver::ok(), subscriber.clone());

        manager.on_index_reading("NIFTY", 24987.0).await;
        manager.on_index_reading("NIFTY", 25100.0).await;
        manager.on_index_reading("NIFTY", 25200.0).await;

        assert_eq!(subscriber.topics.lock().unwrap().len(), 6);
        assert_eq!(manager.last_price("NIFTY"), Some(25200.0));
    }

    #[tokio::test]
    async fn duplicate_topics_are_subscribed_at_most_once() {
        let subscriber = Arc::new(RecordingSubscriber::default());
        let mut manager = manager(StubResolver::fixed("53001"), subscriber.clone());

        manager.on_index_reading("NIFTY", 24987.0).await;

        // Every ladder slot resolved to the same token; only the first
        // subscribe goes out.
        assert_eq!(
            subscriber.topics.lock().unwrap().clone(),
            vec!["index/NSE_FO|53001".to_string()]
        );
    }

    #[tokio::test]
    async fn untracked_index_is_ignored() {
        let subscriber = Arc::new(RecordingSubscriber::default());
        let mut manager = manager(StubResolver::ok(), subscriber.clone());

        manager.on_index_reading("SENSEX", 81000.0).await;

        assert!(subscriber.topics.lock().unwrap().is_empty());
        assert!(!manager.is_tracked("SENSEX"));
    }

    #[tokio::test]
    async fn reconnect_reissues_active_subscriptions() {
        let subscriber = Arc::new(RecordingSubscriber::default());
        let mut manager = manager(StubResolver::ok(), subscriber.clone());

        manager.on_connected().await;
        assert_eq!(subscriber.topics.lock().unwrap().len(), 2);
        assert_eq!(manager.active_topics().len(), 2);

        manager.on_connected().await;
        assert_eq!(subscriber.topics.lock().unwrap().len(), 4);
        assert_eq!(manager.active_topics().len(), 2);
    }
}
