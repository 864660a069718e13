use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Cloneable handle used by services to publish domain events.
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// True once the processor has dropped its receiver
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Sends an event after a committed change. Delivery failures are logged
    /// and swallowed so they never fail the request that produced them.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "Dropping domain event");
        }
    }
}

/// Domain events emitted after a transaction commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    InventoryMoved {
        product_id: Uuid,
        from_bin_id: Uuid,
        to_bin_id: Uuid,
        qty: i32,
        source_remaining: i32,
        actor_id: Option<Uuid>,
    },
    InventoryAdjusted {
        product_id: Uuid,
        bin_id: Uuid,
        qty_before: i32,
        qty_after: i32,
        actor_id: Option<Uuid>,
    },
    ImportCompleted {
        rows_total: usize,
        inventory_updated: u64,
        errors_count: u64,
        actor_id: Option<Uuid>,
    },
    StockCountStarted {
        count_id: Uuid,
        name: String,
        zones: usize,
        items: usize,
        actor_id: Option<Uuid>,
    },
    StockCountCompleted {
        count_id: Uuid,
        name: String,
        adjustments: usize,
        actor_id: Option<Uuid>,
    },
    StockCountDeleted {
        count_id: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::InventoryMoved { .. } => "inventory_moved",
            Event::InventoryAdjusted { .. } => "inventory_adjusted",
            Event::ImportCompleted { .. } => "import_completed",
            Event::StockCountStarted { .. } => "stock_count_started",
            Event::StockCountCompleted { .. } => "stock_count_completed",
            Event::StockCountDeleted { .. } => "stock_count_deleted",
        }
    }
}

/// Consumers of the event stream.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: &Event) -> Result<(), String>;
}

/// Drains the channel until every sender is dropped, passing each event to
/// every handler in order.
pub async fn process_events(mut rx: mpsc::Receiver<Event>, handlers: Vec<Arc<dyn EventHandler>>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        info!(event = event.name(), "Received event");

        for handler in &handlers {
            if let Err(e) = handler.handle_event(&event).await {
                error!(event = event.name(), error = %e, "Event handler failed");
            }
        }
    }

    warn!("Event processing loop has ended");
}
