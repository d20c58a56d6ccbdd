//! The sequential dispatch engine.

use std::{sync::Arc, time::Duration};

use {
    serde::Serialize,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use {
    recado_common::types::{Address, Direction, Label},
    recado_session::{MessageSender, SendPayload},
    recado_store::{ContactRegistry, MessageStore, NewMessage},
};

use crate::{
    catalog::{CampaignCatalog, render_variant},
    error::{Error, Result},
};

/// Inter-item delays. Campaign sends use a wide uniform draw so batches
/// do not pace like a machine; the other modes use the short fixed delay.
#[derive(Debug, Clone)]
pub struct Pacing {
    pub fixed_delay: Duration,
    pub campaign_min: Duration,
    pub campaign_max: Duration,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            fixed_delay: Duration::from_millis(200),
            campaign_min: Duration::from_secs(1),
            campaign_max: Duration::from_secs(61),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Sent,
    Failed,
    Cancelled,
}

/// Outcome for one target, in target order.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchItem {
    pub address: String,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result of one batch: exactly one item per target.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub items: Vec<DispatchItem>,
}

impl DispatchReport {
    fn from_items(items: Vec<DispatchItem>) -> Self {
        let succeeded = items.iter().filter(|i| i.status == ItemStatus::Sent).count();
        let failed = items
            .iter()
            .filter(|i| i.status == ItemStatus::Failed)
            .count();
        Self {
            total: items.len(),
            succeeded,
            failed,
            items,
        }
    }
}

enum Delay {
    Fixed,
    Campaign,
}

/// Sends message batches through the session, one recipient at a time.
pub struct OutboundDispatcher {
    sender: Arc<dyn MessageSender>,
    registry: ContactRegistry,
    messages: MessageStore,
    catalog: Arc<CampaignCatalog>,
    pacing: Pacing,
}

impl OutboundDispatcher {
    pub fn new(
        sender: Arc<dyn MessageSender>,
        registry: ContactRegistry,
        messages: MessageStore,
        catalog: Arc<CampaignCatalog>,
        pacing: Pacing,
    ) -> Self {
        Self {
            sender,
            registry,
            messages,
            catalog,
            pacing,
        }
    }

    /// Send one fixed text to an explicit target list.
    pub async fn send_list(
        &self,
        targets: &[Address],
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport> {
        if targets.is_empty() {
            return Err(Error::EmptyTargetList);
        }
        if message.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        if !self.sender.is_connected() {
            return Err(Error::NotConnected);
        }
        let jobs = targets
            .iter()
            .map(|t| (t.clone(), message.to_string()))
            .collect();
        Ok(self.run_batch(jobs, Delay::Fixed, cancel).await)
    }

    /// Send one fixed text to every active contact carrying any of the
    /// given labels.
    pub async fn send_segment(
        &self,
        labels: &[Label],
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport> {
        if message.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        if !self.sender.is_connected() {
            return Err(Error::NotConnected);
        }
        let contacts = self.registry.list_by_labels(labels).await?;
        if contacts.is_empty() {
            return Err(Error::EmptySegment);
        }
        let jobs = contacts
            .into_iter()
            .map(|c| (c.address, message.to_string()))
            .collect();
        Ok(self.run_batch(jobs, Delay::Fixed, cancel).await)
    }

    /// Send one fixed text to every active contact, regardless of label.
    /// An empty registry yields an empty report, not an error.
    pub async fn send_active(
        &self,
        message: &str,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport> {
        if message.trim().is_empty() {
            return Err(Error::EmptyMessage);
        }
        if !self.sender.is_connected() {
            return Err(Error::NotConnected);
        }
        let contacts = self.registry.list_active().await?;
        let jobs = contacts
            .into_iter()
            .map(|c| (c.address, message.to_string()))
            .collect();
        Ok(self.run_batch(jobs, Delay::Fixed, cancel).await)
    }

    /// Send a campaign: each target gets a uniformly drawn variant, with
    /// the agent name substituted when one is supplied.
    pub async fn send_campaign(
        &self,
        targets: &[Address],
        locale: Option<&str>,
        name: &str,
        agent: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport> {
        if targets.is_empty() {
            return Err(Error::EmptyTargetList);
        }
        if !self.sender.is_connected() {
            return Err(Error::NotConnected);
        }
        let Some(variants) = self.catalog.variants(locale, name) else {
            return Err(Error::CampaignNotFound(name.to_string()));
        };

        let jobs = targets
            .iter()
            .map(|target| {
                let variant = {
                    let mut rng = rand::rng();
                    let index = rand::Rng::random_range(&mut rng, 0..variants.len());
                    &variants[index]
                };
                (target.clone(), render_variant(variant, agent))
            })
            .collect();
        Ok(self.run_batch(jobs, Delay::Campaign, cancel).await)
    }

    /// Strictly sequential send loop. Never fails: every target yields
    /// exactly one report item.
    async fn run_batch(
        &self,
        jobs: Vec<(Address, String)>,
        delay: Delay,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let total = jobs.len();
        let mut items = Vec::with_capacity(total);

        for (index, (address, text)) in jobs.into_iter().enumerate() {
            if cancel.is_cancelled() {
                info!(processed = index, total, "dispatch cancelled");
                items.push(DispatchItem {
                    address: address.as_str().to_string(),
                    status: ItemStatus::Cancelled,
                    reason: None,
                });
                continue;
            }

            items.push(self.send_one(&address, &text).await);

            let last = index + 1 == total;
            if !last && !cancel.is_cancelled() {
                tokio::time::sleep(self.delay_for(&delay)).await;
            }
        }

        let report = DispatchReport::from_items(items);
        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            "dispatch batch finished"
        );
        report
    }

    async fn send_one(&self, address: &Address, text: &str) -> DispatchItem {
        let failed = |reason: String| DispatchItem {
            address: address.as_str().to_string(),
            status: ItemStatus::Failed,
            reason: Some(reason),
        };

        if let Err(e) = self.registry.ensure_exists(address).await {
            warn!(address = %address, error = %e, "contact upsert failed");
            return failed(e.to_string());
        }

        if let Err(e) = self.sender.send(address, &SendPayload::text(text)).await {
            warn!(address = %address, error = %e, "send failed");
            return failed(e.to_string());
        }

        // The message went out; a failed log write must not turn the item
        // into a failure.
        if let Err(e) = self
            .messages
            .append(NewMessage::text(
                address.clone(),
                Direction::Outbound,
                text,
            ))
            .await
        {
            warn!(address = %address, error = %e, "outbound message not persisted");
        }

        DispatchItem {
            address: address.as_str().to_string(),
            status: ItemStatus::Sent,
            reason: None,
        }
    }

    fn delay_for(&self, delay: &Delay) -> Duration {
        match delay {
            Delay::Fixed => self.pacing.fixed_delay,
            Delay::Campaign => {
                let min = self.pacing.campaign_min.as_millis() as u64;
                let max = self.pacing.campaign_max.as_millis() as u64;
                if max <= min {
                    return self.pacing.campaign_min;
                }
                let mut rng = rand::rng();
                Duration::from_millis(rand::Rng::random_range(&mut rng, min..max))
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use {async_trait::async_trait, sqlx::sqlite::SqlitePoolOptions};

    use super::*;

    /// Sender that records every payload and can fail chosen addresses.
    struct MockSender {
        connected: bool,
        fail_addresses: Vec<String>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl MockSender {
        fn connected() -> Self {
            Self {
                connected: true,
                fail_addresses: Vec::new(),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MessageSender for MockSender {
        fn is_connected(&self) -> bool {
            self.connected
        }

        async fn send(
            &self,
            address: &Address,
            payload: &SendPayload,
        ) -> recado_session::Result<()> {
            if self.fail_addresses.iter().any(|a| a == address.as_str()) {
                return Err(recado_session::Error::SendFailed("number not on app".into()));
            }
            let SendPayload::Text { body } = payload else {
                return Err(recado_session::Error::SendFailed("unexpected payload".into()));
            };
            self.sent
                .lock()
                .unwrap()
                .push((address.as_str().to_string(), body.clone()));
            Ok(())
        }
    }

    struct Fixture {
        dispatcher: OutboundDispatcher,
        sender: Arc<MockSender>,
        registry: ContactRegistry,
        messages: MessageStore,
    }

    async fn fixture_with(sender: MockSender, catalog: CampaignCatalog) -> Fixture {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        recado_store::run_migrations(&pool).await.unwrap();
        let registry = ContactRegistry::new(pool.clone());
        let messages = MessageStore::new(pool);
        let sender = Arc::new(sender);
        let pacing = Pacing {
            fixed_delay: Duration::from_millis(1),
            campaign_min: Duration::from_millis(1),
            campaign_max: Duration::from_millis(2),
        };
        let dispatcher = OutboundDispatcher::new(
            Arc::clone(&sender) as Arc<dyn MessageSender>,
            registry.clone(),
            messages.clone(),
            Arc::new(catalog),
            pacing,
        );
        Fixture {
            dispatcher,
            sender,
            registry,
            messages,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(MockSender::connected(), CampaignCatalog::empty("es")).await
    }

    fn addr(n: u64) -> Address {
        Address::parse(&format!("52155{n:08}@s.whatsapp.net")).unwrap()
    }

    fn no_cancel() -> CancellationToken {
        CancellationToken::new()
    }

    #[tokio::test]
    async fn list_validations_reject_before_any_send() {
        let f = fixture().await;

        assert!(matches!(
            f.dispatcher.send_list(&[], "hola", &no_cancel()).await,
            Err(Error::EmptyTargetList)
        ));
        assert!(matches!(
            f.dispatcher.send_list(&[addr(1)], "   ", &no_cancel()).await,
            Err(Error::EmptyMessage)
        ));

        let disconnected = fixture_with(
            MockSender {
                connected: false,
                fail_addresses: Vec::new(),
                sent: Mutex::new(Vec::new()),
            },
            CampaignCatalog::empty("es"),
        )
        .await;
        assert!(matches!(
            disconnected
                .dispatcher
                .send_list(&[addr(1)], "hola", &no_cancel())
                .await,
            Err(Error::NotConnected)
        ));
        assert!(disconnected.sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_sends_create_contacts_and_persist_messages() {
        let f = fixture().await;
        let targets = [addr(1), addr(2)];
        let report = f
            .dispatcher
            .send_list(&targets, "promo de hoy", &no_cancel())
            .await
            .unwrap();

        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(f.sender.sent.lock().unwrap().len(), 2);

        for target in &targets {
            assert!(f.registry.get(target).await.unwrap().is_some());
            let history = f.messages.list_for(target).await.unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].direction, Direction::Outbound);
            assert_eq!(history[0].body, "promo de hoy");
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_abort_the_batch() {
        let f = fixture_with(
            MockSender {
                connected: true,
                fail_addresses: vec![addr(2).as_str().to_string()],
                sent: Mutex::new(Vec::new()),
            },
            CampaignCatalog::empty("es"),
        )
        .await;

        let report = f
            .dispatcher
            .send_list(&[addr(1), addr(2), addr(3)], "hola", &no_cancel())
            .await
            .unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.items[1].status, ItemStatus::Failed);
        assert!(report.items[1].reason.as_deref().unwrap().contains("not on app"));
        // The failed recipient's contact still exists; no outbound row.
        assert!(f.registry.get(&addr(2)).await.unwrap().is_some());
        assert!(f.messages.list_for(&addr(2)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn segment_targets_by_label() {
        let f = fixture().await;
        f.registry.ensure_exists(&addr(1)).await.unwrap();
        f.registry
            .set_label(&addr(1), &Label::Callback, false)
            .await
            .unwrap();
        f.registry.ensure_exists(&addr(2)).await.unwrap();

        let report = f
            .dispatcher
            .send_segment(&[Label::Callback], "seguimos pendientes", &no_cancel())
            .await
            .unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.items[0].address, addr(1).as_str());

        assert!(matches!(
            f.dispatcher
                .send_segment(&[Label::Analyst], "hola", &no_cancel())
                .await,
            Err(Error::EmptySegment)
        ));
    }

    #[tokio::test]
    async fn active_broadcast_skips_archived_contacts() {
        let f = fixture().await;
        f.registry.ensure_exists(&addr(1)).await.unwrap();
        f.registry.ensure_exists(&addr(2)).await.unwrap();
        f.registry.ensure_exists(&addr(3)).await.unwrap();
        f.registry
            .set_label(&addr(3), &Label::Analyst, true)
            .await
            .unwrap();

        let report = f
            .dispatcher
            .send_active("aviso general", &no_cancel())
            .await
            .unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 2);
        let sent = f.sender.sent.lock().unwrap();
        assert!(!sent.iter().any(|(a, _)| a == addr(3).as_str()));
    }

    #[tokio::test]
    async fn active_broadcast_on_empty_registry_reports_nothing() {
        let f = fixture().await;
        let report = f
            .dispatcher
            .send_active("aviso general", &no_cancel())
            .await
            .unwrap();
        assert_eq!(report.total, 0);
        assert!(report.items.is_empty());

        assert!(matches!(
            f.dispatcher.send_active("  ", &no_cancel()).await,
            Err(Error::EmptyMessage)
        ));
    }

    #[tokio::test]
    async fn campaign_substitutes_agent_and_misses_unknown_names() {
        let catalog =
            CampaignCatalog::parse("[es]\nbienvenida = [\"Hola, soy {agent}.\"]\n", "es").unwrap();
        let f = fixture_with(MockSender::connected(), catalog).await;

        let report = f
            .dispatcher
            .send_campaign(&[addr(1)], Some("pt"), "bienvenida", Some("Laura"), &no_cancel())
            .await
            .unwrap();
        assert_eq!(report.succeeded, 1);
        let sent = f.sender.sent.lock().unwrap();
        assert_eq!(sent[0].1, "Hola, soy Laura.");
        drop(sent);

        assert!(matches!(
            f.dispatcher
                .send_campaign(&[addr(1)], None, "nope", None, &no_cancel())
                .await,
            Err(Error::CampaignNotFound(_))
        ));
    }

    #[tokio::test]
    async fn campaign_variant_draw_is_not_degenerate() {
        let catalog = CampaignCatalog::parse(
            "[es]\npromo = [\"variante uno\", \"variante dos\"]\n",
            "es",
        )
        .unwrap();
        let f = fixture_with(MockSender::connected(), catalog).await;
        let targets: Vec<Address> = (1..=16).map(addr).collect();

        let report = f
            .dispatcher
            .send_campaign(&targets, None, "promo", None, &no_cancel())
            .await
            .unwrap();
        assert_eq!(report.succeeded, 16);

        let sent = f.sender.sent.lock().unwrap();
        assert!(sent.iter().all(|(_, body)| {
            body == "variante uno" || body == "variante dos"
        }));
        let distinct: std::collections::HashSet<&str> =
            sent.iter().map(|(_, body)| body.as_str()).collect();
        assert!(distinct.len() > 1, "all 16 draws picked the same variant");
    }

    #[tokio::test]
    async fn cancellation_marks_remaining_targets() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = f
            .dispatcher
            .send_list(&[addr(1), addr(2)], "hola", &cancel)
            .await
            .unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failed, 0);
        assert!(report.items.iter().all(|i| i.status == ItemStatus::Cancelled));
        assert!(f.sender.sent.lock().unwrap().is_empty());
    }
}
