//! Membership events and the event bus that delivers them.
//!
//! The reconciler posts events here; a dedicated task fans them out to
//! subscribers so a slow subscriber can never block the scheduler task
//! that drives reconciliation.

use tokio::sync::mpsc;

use crate::model::ImmutableMember;

#[derive(Debug, Clone)]
pub enum MembershipEvent {
    MemberAdded(ImmutableMember),
    MemberRemoved(ImmutableMember),
    ReachabilityChanged(ImmutableMember),
    MetadataChanged(ImmutableMember),
}

/// Handle returned to callers of `add_listener`: a receiver for
/// membership events, wrapped so it can be matched on by `subscription
/// id` when removed.
pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<MembershipEvent>,
}

/// Posts events from the scheduler task and fans them out to
/// subscribers on a dedicated task.
pub struct EventBus {
    post_tx: mpsc::Sender<MembershipEvent>,
    control_tx: mpsc::Sender<Control>,
}

enum Control {
    Subscribe(u64, mpsc::Sender<MembershipEvent>),
    Unsubscribe(u64),
}

impl EventBus {
    pub fn spawn() -> Self {
        let (post_tx, mut post_rx) = mpsc::channel::<MembershipEvent>(1_024);
        let (control_tx, mut control_rx) = mpsc::channel::<Control>(64);

        tokio::spawn(async move {
            let mut subscribers: Vec<(u64, mpsc::Sender<MembershipEvent>)> = Vec::new();

            loop {
                tokio::select! {
                    event = post_rx.recv() => {
                        let Some(event) = event else { break };
                        subscribers.retain(|(_, tx)| !tx.is_closed());
                        for (_, tx) in &subscribers {
                            let _ = tx.send(event.clone()).await;
                        }
                    }
                    ctl = control_rx.recv() => {
                        match ctl {
                            Some(Control::Subscribe(id, tx)) => subscribers.push((id, tx)),
                            Some(Control::Unsubscribe(id)) => subscribers.retain(|(sid, _)| *sid != id),
                            None => break,
                        }
                    }
                }
            }
        });

        Self { post_tx, control_tx }
    }

    pub async fn post(&self, event: MembershipEvent) {
        let _ = self.post_tx.send(event).await;
    }

    pub async fn subscribe(&self, id: u64) -> mpsc::Receiver<MembershipEvent> {
        let (tx, rx) = mpsc::channel(256);
        let _ = self.control_tx.send(Control::Subscribe(id, tx)).await;
        rx
    }

    pub async fn unsubscribe(&self, id: u64) {
        let _ = self.control_tx.send(Control::Unsubscribe(id)).await;
    }
}
