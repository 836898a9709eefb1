use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use mailroom_db::{CampaignStore, Store};

use crate::dispatcher::CampaignDispatcher;
use crate::error::DispatchError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Promotes due SCHEDULED campaigns into dispatch.
pub struct DispatchScheduler {
    store: Arc<dyn Store>,
    dispatcher: CampaignDispatcher,
    period: Duration,
}

impl DispatchScheduler {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: CampaignDispatcher,
        period: Duration,
    ) -> Result<Self, DispatchError> {
        if period.is_zero() {
            return Err(DispatchError::validation(
                "Scheduler interval must be greater than zero.",
            ));
        }
        Ok(Self {
            store,
            dispatcher,
            period,
        })
    }

    /// Background loop. Never returns.
    pub async fn run(self) {
        let mut interval = tokio::time::interval(self.period);
        info!("Dispatch scheduler polling every {:?}", self.period);

        loop {
            interval.tick().await;

            match self.tick(Utc::now()) {
                Ok(claimed) => {
                    if !claimed.is_empty() {
                        info!("Scheduler: started {} campaign(s) {:?}", claimed.len(), claimed);
                    }
                }
                Err(e) => {
                    warn!("Scheduler error: {}", e);
                }
            }
        }
    }

    /// Claims every campaign due at `now` and spawns its dispatch.
    ///
    /// The claim is a conditional SCHEDULED → SENDING write that re-checks the
    /// send time, so a campaign picked up by an overlapping tick, sent manually
    /// or rescheduled since the listing is not claimed.
    /// A failure on one campaign is logged and the rest of the tick proceeds.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<Vec<i64>, DispatchError> {
        let due = self.store.due_campaigns(now)?;
        let mut claimed = Vec::with_capacity(due.len());

        for campaign in due {
            match self.store.claim_due_campaign(campaign.id, now) {
                Ok(true) => {
                    info!(campaign_id = campaign.id, "Claimed scheduled campaign");
                    self.dispatcher.spawn(campaign.id);
                    claimed.push(campaign.id);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(campaign_id = campaign.id, "Failed to claim campaign: {}", e);
                }
            }
        }

        Ok(claimed)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use mailroom_db::{ContactStore, MemoryStore};
    use mailroom_types::models::{Campaign, CampaignStatus, Contact, NewContact};

    use super::*;
    use crate::batch::BatchConfig;
    use crate::test_support::FailingStore;
    use crate::transport::{MailTransport, TransportError};

    struct NullTransport;

    #[async_trait]
    impl MailTransport for NullTransport {
        async fn send(&self, _: &Campaign, _: &Contact, _: &str) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn scheduler() -> (Arc<MemoryStore>, DispatchScheduler) {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = CampaignDispatcher::new(
            store.clone(),
            Arc::new(NullTransport),
            Arc::new(BatchConfig::default()),
        );
        let scheduler =
            DispatchScheduler::new(store.clone(), dispatcher, DEFAULT_POLL_INTERVAL).unwrap();
        (store, scheduler)
    }

    fn campaign(store: &MemoryStore) -> Campaign {
        store
            .insert_campaign("Weekly", "News", "<p>News</p>", Utc::now())
            .unwrap()
    }

    #[tokio::test]
    async fn claims_only_due_campaigns() {
        let (store, scheduler) = scheduler();
        let now = Utc::now();

        let due = campaign(&store);
        store.schedule_campaign(due.id, now - ChronoDuration::minutes(1)).unwrap();
        let exactly_now = campaign(&store);
        store.schedule_campaign(exactly_now.id, now).unwrap();
        let later = campaign(&store);
        store.schedule_campaign(later.id, now + ChronoDuration::hours(1)).unwrap();
        let draft = campaign(&store);

        let mut claimed = scheduler.tick(now).unwrap();
        claimed.sort();

        assert_eq!(claimed, vec![due.id, exactly_now.id]);
        assert_eq!(
            store.get_campaign(later.id).unwrap().unwrap().status,
            CampaignStatus::Scheduled
        );
        assert_eq!(
            store.get_campaign(draft.id).unwrap().unwrap().status,
            CampaignStatus::Draft
        );
    }

    #[tokio::test]
    async fn second_tick_claims_nothing() {
        let (store, scheduler) = scheduler();
        let now = Utc::now();
        let due = campaign(&store);
        store.schedule_campaign(due.id, now - ChronoDuration::seconds(5)).unwrap();

        assert_eq!(scheduler.tick(now).unwrap(), vec![due.id]);
        assert!(scheduler.tick(now).unwrap().is_empty());
    }

    #[tokio::test]
    async fn claimed_campaign_is_dispatched_to_finished() {
        let (store, scheduler) = scheduler();
        store
            .insert_contact(
                &NewContact {
                    name: "ana".into(),
                    email: "ana@example.com".into(),
                    consent: true,
                    subscribed_to_list: true,
                },
                Utc::now(),
            )
            .unwrap();
        let now = Utc::now();
        let due = campaign(&store);
        store.schedule_campaign(due.id, now).unwrap();

        scheduler.tick(now).unwrap();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(
            store.get_campaign(due.id).unwrap().unwrap().status,
            CampaignStatus::Finished
        );
    }

    #[test]
    fn zero_interval_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let dispatcher = CampaignDispatcher::new(
            store.clone(),
            Arc::new(NullTransport),
            Arc::new(BatchConfig::default()),
        );

        assert!(matches!(
            DispatchScheduler::new(store.clone(), dispatcher.clone(), Duration::ZERO),
            Err(DispatchError::Validation(_))
        ));
        assert!(DispatchScheduler::new(store, dispatcher, Duration::from_millis(1)).is_ok());
    }

    #[tokio::test]
    async fn claim_error_does_not_block_other_campaigns() {
        let mut store = FailingStore::default();
        let now = Utc::now();
        let ids: Vec<i64> = (0..3)
            .map(|_| {
                let c = campaign(&store.inner);
                store
                    .inner
                    .schedule_campaign(c.id, now - ChronoDuration::minutes(1))
                    .unwrap();
                c.id
            })
            .collect();
        store.fail_claim_for.insert(ids[1]);
        let store = Arc::new(store);

        let dispatcher = CampaignDispatcher::new(
            store.clone(),
            Arc::new(NullTransport),
            Arc::new(BatchConfig::default()),
        );
        let scheduler =
            DispatchScheduler::new(store.clone(), dispatcher, DEFAULT_POLL_INTERVAL).unwrap();

        let mut claimed = scheduler.tick(now).unwrap();
        claimed.sort();

        assert_eq!(claimed, vec![ids[0], ids[2]]);
        assert_eq!(
            store.get_campaign(ids[1]).unwrap().unwrap().status,
            CampaignStatus::Scheduled
        );
    }
}
